use crate::interface_adapters::clients::StatsClient;
use crate::interface_adapters::metrics::Metrics;
use crate::use_cases::{GameManager, Hub, Matchmaking, TournamentDirector};
use std::sync::Arc;

/// Shared application state handed to every handler and background task.
#[derive(Clone)]
pub struct AppState {
    // Registry of live connections and the lobby broadcast group.
    pub hub: Arc<Hub>,
    // Matchmaking queue.
    pub matchmaking: Arc<Matchmaking>,
    // Match rooms and their engines.
    pub manager: Arc<GameManager>,
    // Tournament brackets.
    pub director: Arc<TournamentDirector>,
    // Outbound stats sink for completed matches.
    pub stats: Arc<StatsClient>,
    // Process-wide observability counters.
    pub metrics: Arc<Metrics>,
}
