// Use cases layer: application workflows wiring domain rules to connections.

pub mod director;
pub mod engine;
pub mod hub;
pub mod manager;
pub mod matchmaking;

pub use director::TournamentDirector;
pub use engine::{MatchEnd, match_task};
pub use hub::{ConnState, ConnectionHandle, Hub, OutboundFrame};
pub use manager::GameManager;
pub use matchmaking::Matchmaking;
