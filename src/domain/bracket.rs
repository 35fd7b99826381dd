// Single-elimination bracket state machine for 4/6/8 player tournaments.

/// One registered tournament player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entrant {
    pub conn: u64,
    pub nickname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Pending,
    Active,
    Completed,
}

/// Downstream coordinates a node's winner is written into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextSlot {
    pub round: u32,
    pub position: u32,
    pub slot: usize,
}

/// One match node of the bracket tree.
#[derive(Debug, Clone)]
pub struct BracketNode {
    pub round: u32,
    pub position: u32,
    pub slots: [Option<Entrant>; 2],
    pub winner: Option<Entrant>,
    pub next: Option<NextSlot>,
    pub status: NodeStatus,
}

impl BracketNode {
    fn selectable(&self) -> bool {
        self.status == NodeStatus::Pending
            && self.winner.is_none()
            && self.slots[0].is_some()
            && self.slots[1].is_some()
    }
}

/// Result of a recorded bracket match, for notification fan-out.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub winner: Entrant,
    pub loser: Entrant,
    pub tournament_complete: bool,
}

/// A player removal, with the forfeit result if they were mid-match.
#[derive(Debug, Clone)]
pub struct PlayerRemoval {
    pub entrant: Entrant,
    pub forfeit: Option<MatchOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    AlreadyStarted,
    NicknameTaken,
    AlreadyEntered,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    AlreadyStarted,
    WrongPlayerCount,
}

pub const VALID_SIZES: [usize; 3] = [4, 6, 8];

/// A tournament: registration list plus, once started, the bracket tree.
#[derive(Debug)]
pub struct Tournament {
    pub id: String,
    pub name: String,
    pub creator: u64,
    pub size: usize,
    /// Target rounds for every constituent match.
    pub rounds: u32,
    pub players: Vec<Entrant>,
    pub started: bool,
    pub winner: Option<String>,
    pub nodes: Vec<BracketNode>,
    active: Option<(u32, u32)>,
}

impl Tournament {
    pub fn new(id: String, name: String, creator: Entrant, size: usize, rounds: u32) -> Self {
        Self {
            id,
            name,
            creator: creator.conn,
            size,
            rounds,
            players: vec![creator],
            started: false,
            winner: None,
            nodes: Vec::new(),
            active: None,
        }
    }

    pub fn add_player(&mut self, entrant: Entrant) -> Result<(), JoinError> {
        if self.started {
            return Err(JoinError::AlreadyStarted);
        }
        if self.players.iter().any(|p| p.nickname == entrant.nickname) {
            return Err(JoinError::NicknameTaken);
        }
        if self.players.iter().any(|p| p.conn == entrant.conn) {
            return Err(JoinError::AlreadyEntered);
        }
        if self.players.len() >= self.size {
            return Err(JoinError::Full);
        }
        self.players.push(entrant);
        Ok(())
    }

    pub fn contains(&self, conn: u64) -> bool {
        self.players.iter().any(|p| p.conn == conn)
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Validate and seed the bracket from a shuffled entrant order.
    ///
    /// The registration list itself keeps its order; only the bracket is
    /// seeded from `order`.
    pub fn start(&mut self, order: Vec<Entrant>) -> Result<(), StartError> {
        if self.started {
            return Err(StartError::AlreadyStarted);
        }
        if self.players.len() != self.size || !VALID_SIZES.contains(&self.players.len()) {
            return Err(StartError::WrongPlayerCount);
        }
        debug_assert_eq!(order.len(), self.players.len());

        self.build_bracket(&order);
        self.started = true;
        Ok(())
    }

    // Seed first-round nodes pairwise, create later rounds empty, and place
    // bye players (non-power-of-two sizes) directly into round-1 slots.
    fn build_bracket(&mut self, order: &[Entrant]) {
        let n = order.len();
        let depth = n.next_power_of_two().trailing_zeros();
        let byes = n.next_power_of_two() - n;
        let first_round_matches = (n - byes) / 2;

        self.nodes.clear();
        self.winner = None;
        self.active = None;

        for position in 0..first_round_matches as u32 {
            let left = order[position as usize * 2].clone();
            let right = order[position as usize * 2 + 1].clone();
            self.nodes.push(BracketNode {
                round: 0,
                position,
                slots: [Some(left), Some(right)],
                winner: None,
                next: next_slot(0, position, depth),
                status: NodeStatus::Pending,
            });
        }

        for round in 1..depth {
            for position in 0..(1u32 << (depth - round - 1)) {
                self.nodes.push(BracketNode {
                    round,
                    position,
                    slots: [None, None],
                    winner: None,
                    next: next_slot(round, position, depth),
                    status: NodeStatus::Pending,
                });
            }
        }

        // A bye player occupies a virtual first-round position past the real
        // matches; their advancement target follows the same p/2 rule, so no
        // round-1 slot is supplied twice.
        for (i, entrant) in order[first_round_matches * 2..].iter().enumerate() {
            let virtual_position = first_round_matches as u32 + i as u32;
            let target = NextSlot {
                round: 1,
                position: virtual_position / 2,
                slot: (virtual_position % 2) as usize,
            };
            if let Some(node) = self.node_mut(target.round, target.position) {
                node.slots[target.slot] = Some(entrant.clone());
            }
        }
    }

    pub fn node(&self, round: u32, position: u32) -> Option<&BracketNode> {
        self.nodes
            .iter()
            .find(|n| n.round == round && n.position == position)
    }

    fn node_mut(&mut self, round: u32, position: u32) -> Option<&mut BracketNode> {
        self.nodes
            .iter_mut()
            .find(|n| n.round == round && n.position == position)
    }

    pub fn active_node(&self) -> Option<&BracketNode> {
        self.active.and_then(|(r, p)| self.node(r, p))
    }

    /// Mark the earliest-round playable node as the active match.
    ///
    /// Returns the chosen node, or None when nothing is playable (either the
    /// bracket is finished or later slots are still unfilled).
    pub fn select_next(&mut self) -> Option<&BracketNode> {
        if self.active.is_some() {
            return self.active_node();
        }

        let candidate = self
            .nodes
            .iter_mut()
            .filter(|n| n.selectable())
            .min_by_key(|n| (n.round, n.position))?;
        candidate.status = NodeStatus::Active;
        let key = (candidate.round, candidate.position);
        self.active = Some(key);
        self.node(key.0, key.1)
    }

    /// Record the active match's winner by connection id and propagate it.
    pub fn record_result(&mut self, winner_conn: u64) -> Option<MatchOutcome> {
        let (round, position) = self.active?;
        let node = self.node_mut(round, position)?;

        let winner_slot = node
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|e| e.conn == winner_conn))?;
        let winner = node.slots[winner_slot].clone()?;
        let loser = node.slots[1 - winner_slot].clone()?;

        node.winner = Some(winner.clone());
        node.status = NodeStatus::Completed;
        let next = node.next;
        self.active = None;

        match next {
            Some(target) => {
                if let Some(next_node) = self.node_mut(target.round, target.position) {
                    next_node.slots[target.slot] = Some(winner.clone());
                }
            }
            // The root node completed: the tournament has its champion.
            None => self.winner = Some(winner.nickname.clone()),
        }

        Some(MatchOutcome {
            winner,
            loser,
            tournament_complete: self.winner.is_some(),
        })
    }

    /// Remove a player; mid-match removal forfeits to the opposite slot.
    pub fn remove_player(&mut self, conn: u64) -> Option<PlayerRemoval> {
        let index = self.players.iter().position(|p| p.conn == conn)?;
        let entrant = self.players.remove(index);

        let mut forfeit = None;
        if self.started {
            if let Some(node) = self.active_node() {
                let in_match = node.slots.iter().flatten().any(|e| e.conn == conn);
                let opponent = node
                    .slots
                    .iter()
                    .flatten()
                    .find(|e| e.conn != conn)
                    .cloned();
                if in_match {
                    if let Some(opponent) = opponent {
                        forfeit = self.record_result(opponent.conn);
                    }
                }
            }
        }

        Some(PlayerRemoval { entrant, forfeit })
    }

    /// Forfeit a node that never became playable because an occupant is gone
    /// (e.g. a bye player disconnected before their match was selected).
    pub fn forfeit_active(&mut self, absent_conn: u64) -> Option<MatchOutcome> {
        let node = self.active_node()?;
        let opponent = node
            .slots
            .iter()
            .flatten()
            .find(|e| e.conn != absent_conn)?
            .clone();
        self.record_result(opponent.conn)
    }

    /// Best-known winner for defensive completion: the deepest recorded one.
    pub fn resolve_stalled(&mut self) -> Option<String> {
        let best = self
            .nodes
            .iter()
            .filter(|n| n.winner.is_some())
            .max_by_key(|n| n.round)?;
        let nickname = best.winner.as_ref().map(|e| e.nickname.clone());
        self.winner = nickname.clone();
        nickname
    }

    pub fn has_selectable(&self) -> bool {
        self.nodes.iter().any(|n| n.selectable())
    }
}

fn next_slot(round: u32, position: u32, depth: u32) -> Option<NextSlot> {
    if round + 1 >= depth {
        return None;
    }
    Some(NextSlot {
        round: round + 1,
        position: position / 2,
        slot: (position % 2) as usize,
    })
}
