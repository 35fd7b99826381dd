// Wire protocol DTOs and conversions for the websocket surface.
//
// Every frame is a JSON object whose `type` field selects the variant; the
// field names below are load-bearing for client compatibility.

use crate::domain::bracket::Tournament;
use crate::domain::pong::{Side, Snapshot};
use crate::domain::queue::WaitingPlayer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        nickname: String,
        // Carried for the stats side channel; not validated in-core.
        #[serde(default)]
        #[allow(dead_code)]
        token: Option<String>,
        rounds: u32,
    },
    LeaveQueue,
    GameUpdate {
        data: PaddleUpdate,
    },
    // Legacy client end-of-game signal. The engine is authoritative, so the
    // payload is not read.
    GameOver,
    CreateTournament {
        nickname: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        rounds: Option<u32>,
        #[serde(default)]
        size: Option<usize>,
    },
    JoinTournament {
        tournament_id: String,
        nickname: String,
    },
    StartTournament {
        tournament_id: String,
    },
    LeaveTournament,
    GetTournaments,
    GetState,
}

/// Every inbound message kind, in vocabulary order.
pub const MESSAGE_KINDS: [&str; 10] = [
    "join",
    "leave_queue",
    "game_update",
    "game_over",
    "create_tournament",
    "join_tournament",
    "start_tournament",
    "leave_tournament",
    "get_tournaments",
    "get_state",
];

impl ClientMessage {
    /// Stable label used for per-kind message counters.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::LeaveQueue => "leave_queue",
            ClientMessage::GameUpdate { .. } => "game_update",
            ClientMessage::GameOver => "game_over",
            ClientMessage::CreateTournament { .. } => "create_tournament",
            ClientMessage::JoinTournament { .. } => "join_tournament",
            ClientMessage::StartTournament { .. } => "start_tournament",
            ClientMessage::LeaveTournament => "leave_tournament",
            ClientMessage::GetTournaments => "get_tournaments",
            ClientMessage::GetState => "get_state",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaddleUpdate {
    #[serde(rename = "paddleY")]
    pub paddle_y: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    WaitingList {
        waiting_list: Vec<WaitingPlayerDto>,
    },
    TournamentList {
        tournaments: Vec<TournamentSummaryDto>,
    },
    QueueUpdate {
        message: String,
    },
    StartGame {
        message: String,
        room: String,
        rounds: u32,
        is_tournament: bool,
        player_side: &'static str,
    },
    GameStateUpdate {
        state: GameStateDto,
    },
    GameOver {
        score: u32,
        winner: &'static str,
    },
    OpponentLeft {
        message: String,
    },
    TournamentCreated {
        tournament: TournamentStateDto,
    },
    TournamentJoined {
        tournament: TournamentStateDto,
    },
    TournamentUpdate {
        tournament: TournamentStateDto,
    },
    TournamentLeft {
        message: String,
    },
    TournamentMatchReady {
        message: String,
    },
    TournamentMatchResult {
        won: bool,
        opponent: String,
        tournament_complete: bool,
    },
    TournamentEliminated {
        winner: String,
    },
    TournamentVictory,
    TournamentComplete {
        winner: String,
    },
    TournamentError {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitingPlayerDto {
    pub nickname: String,
    pub rounds: u32,
}

impl From<&WaitingPlayer> for WaitingPlayerDto {
    fn from(player: &WaitingPlayer) -> Self {
        Self {
            nickname: player.nickname.clone(),
            rounds: player.rounds,
        }
    }
}

/// One row of the lobby `tournament_list` broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct TournamentSummaryDto {
    pub id: String,
    pub name: String,
    pub players: usize,
    pub size: usize,
    pub started: bool,
}

impl From<&Tournament> for TournamentSummaryDto {
    fn from(tournament: &Tournament) -> Self {
        Self {
            id: tournament.id.clone(),
            name: tournament.name.clone(),
            players: tournament.players.len(),
            size: tournament.size,
            started: tournament.started,
        }
    }
}

/// Full tournament state carried by `tournament_update` and friends.
#[derive(Debug, Clone, Serialize)]
pub struct TournamentStateDto {
    pub id: String,
    pub name: String,
    pub size: usize,
    pub players: Vec<String>,
    pub started: bool,
    pub current_match: Option<CurrentMatchDto>,
    pub matches: Vec<BracketMatchDto>,
    pub winner: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentMatchDto {
    pub player1: Option<String>,
    pub player2: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BracketMatchDto {
    pub round: u32,
    pub position: u32,
    pub player1: Option<String>,
    pub player2: Option<String>,
    pub winner: Option<String>,
}

impl From<&Tournament> for TournamentStateDto {
    fn from(tournament: &Tournament) -> Self {
        let nickname = |slot: &Option<crate::domain::Entrant>| {
            slot.as_ref().map(|e| e.nickname.clone())
        };
        Self {
            id: tournament.id.clone(),
            name: tournament.name.clone(),
            size: tournament.size,
            players: tournament
                .players
                .iter()
                .map(|p| p.nickname.clone())
                .collect(),
            started: tournament.started,
            current_match: tournament.active_node().map(|node| CurrentMatchDto {
                player1: nickname(&node.slots[0]),
                player2: nickname(&node.slots[1]),
            }),
            matches: tournament
                .nodes
                .iter()
                .map(|node| BracketMatchDto {
                    round: node.round,
                    position: node.position,
                    player1: nickname(&node.slots[0]),
                    player2: nickname(&node.slots[1]),
                    winner: node.winner.as_ref().map(|e| e.nickname.clone()),
                })
                .collect(),
            winner: tournament.winner.clone(),
        }
    }
}

/// Physics snapshot in the exact wire shape clients render from.
#[derive(Debug, Clone, Serialize)]
pub struct GameStateDto {
    pub ball: BallDto,
    pub paddles: PaddlesDto,
    pub score: ScoreDto,
    pub dimensions: DimensionsDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct BallDto {
    pub x: f64,
    pub y: f64,
    pub radius: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaddlesDto {
    pub left: PaddleDto,
    pub right: PaddleDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaddleDto {
    pub y: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreDto {
    pub left: u32,
    pub right: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionsDto {
    pub width: u32,
    pub height: u32,
}

impl From<&Snapshot> for GameStateDto {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            ball: BallDto {
                x: snapshot.ball_x,
                y: snapshot.ball_y,
                radius: snapshot.ball_radius,
            },
            paddles: PaddlesDto {
                left: PaddleDto {
                    y: snapshot.left_paddle_y,
                    width: snapshot.paddle_width,
                    height: snapshot.paddle_height,
                },
                right: PaddleDto {
                    y: snapshot.right_paddle_y,
                    width: snapshot.paddle_width,
                    height: snapshot.paddle_height,
                },
            },
            score: ScoreDto {
                left: snapshot.left_score,
                right: snapshot.right_score,
            },
            dimensions: DimensionsDto {
                width: snapshot.width,
                height: snapshot.height,
            },
        }
    }
}

impl ServerMessage {
    pub fn game_over(score: u32, winner: Side) -> Self {
        ServerMessage::GameOver {
            score,
            winner: winner.as_str(),
        }
    }
}
