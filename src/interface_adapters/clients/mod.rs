// Outbound clients for external collaborators.

pub mod stats;

pub use stats::StatsClient;
