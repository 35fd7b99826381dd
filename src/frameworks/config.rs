use std::{env, time::Duration};

// Runtime/server constants (not gameplay tuning).

pub fn http_port() -> u16 {
    env::var("PONG_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001)
}

pub fn stats_service_url() -> String {
    env::var("STATS_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:8000/api".to_string())
}

pub fn stats_timeout() -> Duration {
    let millis = env::var("STATS_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(1500);
    Duration::from_millis(millis)
}

/// Simulation and snapshot cadence: 60 Hz.
pub const TICK_INTERVAL: Duration = Duration::from_millis(1000 / 60);
/// Nominal frame duration the delta factor is measured against.
pub const FRAME_DURATION: Duration = TICK_INTERVAL;

pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;
pub const ENGINE_INPUT_CAPACITY: usize = 1024;
pub const MATCH_END_CHANNEL_CAPACITY: usize = 64;

/// How long an ended room stays around for late snapshot requests.
pub const GAME_DISPOSE_GRACE: Duration = Duration::from_secs(5);
/// Pause between a recorded result and the next bracket match.
pub const TOURNAMENT_ADVANCE_DELAY: Duration = Duration::from_millis(500);
