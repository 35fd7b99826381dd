// In-memory matchmaking queue bucketed by requested round count.

use std::collections::VecDeque;

/// A player waiting to be paired.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub conn: u64,
    pub nickname: String,
    pub rounds: u32,
}

/// One row of the lobby waiting-list broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingPlayer {
    pub nickname: String,
    pub rounds: u32,
}

/// Outcome of enqueueing a player.
#[derive(Debug)]
pub enum JoinOutcome {
    /// No partner with the same round count yet; the entry was appended.
    Waiting,
    /// Paired with the oldest waiting entry requesting the same rounds.
    Paired { opponent: QueueEntry },
}

#[derive(Debug, PartialEq, Eq)]
pub enum QueueError {
    AlreadyQueued,
}

/// FIFO queue that pairs players requesting the same number of rounds.
#[derive(Debug, Default)]
pub struct MatchQueue {
    entries: VecDeque<QueueEntry>,
}

impl MatchQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Enqueue a player and attempt to pair immediately.
    ///
    /// Pairing is FIFO within the rounds bucket: the oldest entry with the
    /// same `rounds` wins. The caller ends up on the RIGHT side, the prior
    /// waiter on the LEFT (the pairing code relies on this tie-break).
    pub fn join(&mut self, entry: QueueEntry) -> Result<JoinOutcome, QueueError> {
        if self.entries.iter().any(|e| e.conn == entry.conn) {
            return Err(QueueError::AlreadyQueued);
        }

        if let Some(index) = self.entries.iter().position(|e| e.rounds == entry.rounds) {
            // remove() preserves the relative order of the remaining entries.
            if let Some(opponent) = self.entries.remove(index) {
                return Ok(JoinOutcome::Paired { opponent });
            }
        }

        self.entries.push_back(entry);
        Ok(JoinOutcome::Waiting)
    }

    /// Remove a waiting entry; returns true if the player was queued.
    pub fn remove(&mut self, conn: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.conn != conn);
        self.entries.len() != before
    }

    pub fn contains(&self, conn: u64) -> bool {
        self.entries.iter().any(|e| e.conn == conn)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot used for the lobby waiting-list broadcast.
    pub fn waiting_list(&self) -> Vec<WaitingPlayer> {
        self.entries
            .iter()
            .map(|e| WaitingPlayer {
                nickname: e.nickname.clone(),
                rounds: e.rounds,
            })
            .collect()
    }
}
