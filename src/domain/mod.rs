// Domain layer: core game, queue, and bracket rules.

pub mod bracket;
pub mod pong;
pub mod queue;

pub use bracket::{Entrant, Tournament};
pub use pong::{PongState, Side, Snapshot};
pub use queue::{MatchQueue, QueueEntry};
