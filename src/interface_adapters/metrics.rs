// Process-local counters, gauges and histograms.
//
// Purely observational: values are kept in atomics and reported through
// structured tracing snapshots rather than an exposition endpoint.

use crate::interface_adapters::protocol::MESSAGE_KINDS;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fixed-bucket duration histogram (seconds).
#[derive(Debug)]
pub struct Histogram {
    bounds: &'static [f64],
    counts: Vec<AtomicU64>,
    sum_millis: AtomicU64,
}

impl Histogram {
    fn new(bounds: &'static [f64]) -> Self {
        // One extra bucket catches observations past the last bound.
        let counts = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts,
            sum_millis: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        let index = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        self.counts[index].fetch_add(1, Ordering::Relaxed);
        self.sum_millis
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn sum_seconds(&self) -> f64 {
        self.sum_millis.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

const GAME_DURATION_BOUNDS: [f64; 6] = [30.0, 60.0, 120.0, 300.0, 600.0, 1800.0];

/// All server metrics, shared process-wide.
#[derive(Debug)]
pub struct Metrics {
    pub ws_connections: Gauge,
    pub waiting_players: Gauge,
    pub games_started: Counter,
    pub games_completed: Counter,
    pub tournaments_created: Counter,
    pub game_duration: Histogram,
    messages: [Counter; MESSAGE_KINDS.len()],
    unknown_messages: Counter,
    malformed_messages: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ws_connections: Gauge::default(),
            waiting_players: Gauge::default(),
            games_started: Counter::default(),
            games_completed: Counter::default(),
            tournaments_created: Counter::default(),
            game_duration: Histogram::new(&GAME_DURATION_BOUNDS),
            messages: std::array::from_fn(|_| Counter::default()),
            unknown_messages: Counter::default(),
            malformed_messages: Counter::default(),
        }
    }

    /// Count one inbound message of a known kind.
    pub fn record_message(&self, kind: &str) {
        match MESSAGE_KINDS.iter().position(|k| *k == kind) {
            Some(index) => self.messages[index].record(),
            None => self.unknown_messages.record(),
        }
    }

    pub fn record_unknown_message(&self) {
        self.unknown_messages.record();
    }

    pub fn record_malformed_message(&self) {
        self.malformed_messages.record();
    }

    pub fn message_count(&self, kind: &str) -> u64 {
        MESSAGE_KINDS
            .iter()
            .position(|k| *k == kind)
            .map(|index| self.messages[index].get())
            .unwrap_or(0)
    }

    pub fn messages_total(&self) -> u64 {
        self.messages.iter().map(Counter::get).sum()
    }

    /// Emit the current values as one structured log line.
    pub fn log_summary(&self) {
        debug!(
            ws_connections = self.ws_connections.get(),
            waiting_players = self.waiting_players.get(),
            games_started = self.games_started.get(),
            games_completed = self.games_completed.get(),
            tournaments_created = self.tournaments_created.get(),
            games_timed = self.game_duration.count(),
            game_seconds_total = self.game_duration.sum_seconds(),
            messages_total = self.messages_total(),
            unknown_messages = self.unknown_messages.get(),
            malformed_messages = self.malformed_messages.get(),
            "metrics snapshot"
        );
    }
}
