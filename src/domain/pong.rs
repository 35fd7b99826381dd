// Domain-level Pong simulation: arena rules, ball/paddle physics, scoring.

use rand::Rng;
use std::f64::consts::PI;

pub const ARENA_WIDTH: f64 = 800.0;
pub const ARENA_HEIGHT: f64 = 450.0;
pub const PADDLE_WIDTH: f64 = 15.0;
pub const PADDLE_HEIGHT: f64 = 100.0;
pub const BALL_RADIUS: f64 = 10.0;
pub const INITIAL_BALL_SPEED: f64 = 5.0;
// Added to the ball speed on every paddle hit.
pub const SPEED_INCREMENT: f64 = 0.2;
// Maximum bounce deflection off a paddle edge.
const MAX_BOUNCE_ANGLE: f64 = PI / 4.0;

/// The two player slots of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

/// Observation of the simulation sent to clients every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub ball_x: f64,
    pub ball_y: f64,
    pub ball_radius: u32,
    pub left_paddle_y: f64,
    pub right_paddle_y: f64,
    pub paddle_width: u32,
    pub paddle_height: u32,
    pub left_score: u32,
    pub right_score: u32,
    pub width: u32,
    pub height: u32,
}

/// Mutable physics state of one match.
///
/// Pure data plus synchronous update rules; the async engine task owns an
/// instance and drives it at the tick rate.
#[derive(Debug)]
pub struct PongState {
    pub target_rounds: u32,

    pub ball_x: f64,
    pub ball_y: f64,
    pub ball_vx: f64,
    pub ball_vy: f64,
    pub ball_speed: f64,

    pub left_paddle_y: f64,
    pub right_paddle_y: f64,

    pub left_score: u32,
    pub right_score: u32,
    pub winner: Option<Side>,
}

impl PongState {
    /// New state with a randomized opening serve.
    pub fn new(target_rounds: u32) -> Self {
        let mut rng = rand::rng();
        let direction = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
        let vertical: f64 = rng.random_range(-0.5..0.5);
        Self::with_serve(target_rounds, direction, vertical)
    }

    /// Deterministic constructor: `direction` is the horizontal sign of the
    /// opening serve, `vertical` the vy fraction of ball speed in [-0.5, 0.5).
    pub fn with_serve(target_rounds: u32, direction: f64, vertical: f64) -> Self {
        Self {
            target_rounds,
            ball_x: ARENA_WIDTH / 2.0,
            ball_y: ARENA_HEIGHT / 2.0,
            ball_vx: INITIAL_BALL_SPEED * direction.signum(),
            ball_vy: INITIAL_BALL_SPEED * vertical,
            ball_speed: INITIAL_BALL_SPEED,
            left_paddle_y: (ARENA_HEIGHT - PADDLE_HEIGHT) / 2.0,
            right_paddle_y: (ARENA_HEIGHT - PADDLE_HEIGHT) / 2.0,
            left_score: 0,
            right_score: 0,
            winner: None,
        }
    }

    /// The score at which a side wins: ceil(target_rounds / 2).
    pub fn win_score(&self) -> u32 {
        self.target_rounds.div_ceil(2)
    }

    /// Clamp and store a paddle target position.
    pub fn set_paddle(&mut self, side: Side, y: f64) {
        // Non-finite input is treated as "no movement" rather than an error.
        if !y.is_finite() {
            return;
        }
        let y = y.clamp(0.0, ARENA_HEIGHT - PADDLE_HEIGHT);
        match side {
            Side::Left => self.left_paddle_y = y,
            Side::Right => self.right_paddle_y = y,
        }
    }

    /// Advance one frame. `delta_factor` is the elapsed time divided by the
    /// nominal frame duration, so a late tick moves the ball further.
    ///
    /// Returns the side that scored this frame, if any.
    pub fn update(&mut self, delta_factor: f64) -> Option<Side> {
        if self.winner.is_some() {
            return None;
        }

        self.ball_x += self.ball_vx * delta_factor;
        self.ball_y += self.ball_vy * delta_factor;

        // Top and bottom walls: flip vy and clamp back into the arena.
        if self.ball_y - BALL_RADIUS < 0.0 || self.ball_y + BALL_RADIUS > ARENA_HEIGHT {
            self.ball_vy = -self.ball_vy;
            if self.ball_y - BALL_RADIUS < 0.0 {
                self.ball_y = BALL_RADIUS;
            } else {
                self.ball_y = ARENA_HEIGHT - BALL_RADIUS;
            }
        }

        // Scoring edges.
        let mut scored = None;
        if self.ball_x - BALL_RADIUS < 0.0 {
            self.right_score += 1;
            scored = Some(Side::Right);
            self.check_game_over();
            self.reset_ball();
        } else if self.ball_x + BALL_RADIUS > ARENA_WIDTH {
            self.left_score += 1;
            scored = Some(Side::Left);
            self.check_game_over();
            self.reset_ball();
        }

        self.check_paddle_collisions();
        scored
    }

    // Serve from center toward the side that just conceded, with a random
    // deflection in [-45deg, 45deg]. Accumulated ball speed is retained.
    fn reset_ball(&mut self) {
        self.ball_x = ARENA_WIDTH / 2.0;
        self.ball_y = ARENA_HEIGHT / 2.0;
        let angle: f64 = rand::rng().random_range(-MAX_BOUNCE_ANGLE..MAX_BOUNCE_ANGLE);
        let direction = if self.ball_vx < 0.0 { -1.0 } else { 1.0 };
        self.ball_vx = self.ball_speed * angle.cos() * direction;
        self.ball_vy = self.ball_speed * angle.sin();
    }

    fn check_paddle_collisions(&mut self) {
        if self.ball_x - BALL_RADIUS < PADDLE_WIDTH
            && self.ball_y > self.left_paddle_y
            && self.ball_y < self.left_paddle_y + PADDLE_HEIGHT
        {
            // Offset from paddle center, normalized to [-1, 1].
            let hit = (self.ball_y - (self.left_paddle_y + PADDLE_HEIGHT / 2.0))
                / (PADDLE_HEIGHT / 2.0);
            let bounce = hit * MAX_BOUNCE_ANGLE;
            self.ball_speed += SPEED_INCREMENT;
            self.ball_vx = (self.ball_speed * bounce.cos()).abs();
            self.ball_vy = self.ball_speed * bounce.sin();
            // Teleport past the paddle face so the next frame cannot re-collide.
            self.ball_x = PADDLE_WIDTH + BALL_RADIUS;
        } else if self.ball_x + BALL_RADIUS > ARENA_WIDTH - PADDLE_WIDTH
            && self.ball_y > self.right_paddle_y
            && self.ball_y < self.right_paddle_y + PADDLE_HEIGHT
        {
            let hit = (self.ball_y - (self.right_paddle_y + PADDLE_HEIGHT / 2.0))
                / (PADDLE_HEIGHT / 2.0);
            let bounce = hit * MAX_BOUNCE_ANGLE;
            self.ball_speed += SPEED_INCREMENT;
            self.ball_vx = -(self.ball_speed * bounce.cos()).abs();
            self.ball_vy = self.ball_speed * bounce.sin();
            self.ball_x = ARENA_WIDTH - PADDLE_WIDTH - BALL_RADIUS;
        }
    }

    fn check_game_over(&mut self) {
        let win = self.win_score();
        if self.left_score >= win {
            self.winner = Some(Side::Left);
        } else if self.right_score >= win {
            self.winner = Some(Side::Right);
        }
    }

    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left_score,
            Side::Right => self.right_score,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            ball_x: self.ball_x,
            ball_y: self.ball_y,
            ball_radius: BALL_RADIUS as u32,
            left_paddle_y: self.left_paddle_y,
            right_paddle_y: self.right_paddle_y,
            paddle_width: PADDLE_WIDTH as u32,
            paddle_height: PADDLE_HEIGHT as u32,
            left_score: self.left_score,
            right_score: self.right_score,
            width: ARENA_WIDTH as u32,
            height: ARENA_HEIGHT as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_right(target_rounds: u32) -> PongState {
        PongState::with_serve(target_rounds, 1.0, 0.0)
    }

    #[test]
    fn win_score_rounds_up() {
        assert_eq!(serve_right(1).win_score(), 1);
        assert_eq!(serve_right(3).win_score(), 2);
        assert_eq!(serve_right(4).win_score(), 2);
        assert_eq!(serve_right(5).win_score(), 3);
    }

    #[test]
    fn paddle_positions_are_clamped() {
        let mut state = serve_right(3);
        state.set_paddle(Side::Left, -50.0);
        assert_eq!(state.left_paddle_y, 0.0);
        state.set_paddle(Side::Left, 10_000.0);
        assert_eq!(state.left_paddle_y, ARENA_HEIGHT - PADDLE_HEIGHT);
        state.set_paddle(Side::Right, f64::NAN);
        assert_eq!(state.right_paddle_y, (ARENA_HEIGHT - PADDLE_HEIGHT) / 2.0);
    }

    #[test]
    fn ball_bounces_off_top_wall() {
        let mut state = serve_right(3);
        state.ball_y = BALL_RADIUS + 1.0;
        state.ball_vy = -5.0;
        state.update(1.0);
        assert!(state.ball_vy > 0.0);
        assert!(state.ball_y >= BALL_RADIUS);
    }

    #[test]
    fn crossing_left_edge_scores_for_right_and_resets() {
        let mut state = serve_right(5);
        // Park the paddle away from the ball path so nothing intercepts.
        state.left_paddle_y = ARENA_HEIGHT - PADDLE_HEIGHT;
        state.ball_x = BALL_RADIUS - 1.0;
        state.ball_y = 40.0;
        state.ball_vx = -5.0;
        state.update(1.0);
        assert_eq!(state.right_score, 1);
        assert_eq!(state.left_score, 0);
        assert_eq!(state.ball_x, ARENA_WIDTH / 2.0);
        assert_eq!(state.ball_y, ARENA_HEIGHT / 2.0);
        // Serve heads back toward the side that conceded.
        assert!(state.ball_vx < 0.0);
    }

    #[test]
    fn serve_keeps_accumulated_speed() {
        let mut state = serve_right(9);
        state.ball_speed = 8.0;
        state.left_paddle_y = ARENA_HEIGHT - PADDLE_HEIGHT;
        state.ball_x = BALL_RADIUS - 1.0;
        state.ball_y = 40.0;
        state.ball_vx = -8.0;
        state.update(1.0);
        let speed = (state.ball_vx * state.ball_vx + state.ball_vy * state.ball_vy).sqrt();
        assert!((speed - 8.0).abs() < 1e-9);
    }

    #[test]
    fn center_paddle_hit_reflects_flat_and_speeds_up() {
        let mut state = serve_right(3);
        state.ball_x = PADDLE_WIDTH + BALL_RADIUS - 1.0;
        state.ball_y = state.left_paddle_y + PADDLE_HEIGHT / 2.0;
        state.ball_vx = -5.0;
        state.ball_vy = 0.0;
        // Position already intersects the paddle; a zero-length frame isolates
        // the collision response.
        state.update(0.0);
        assert!((state.ball_speed - (INITIAL_BALL_SPEED + SPEED_INCREMENT)).abs() < 1e-9);
        assert!(state.ball_vx > 0.0);
        assert!(state.ball_vy.abs() < 1e-9);
        assert_eq!(state.ball_x, PADDLE_WIDTH + BALL_RADIUS);
    }

    #[test]
    fn edge_paddle_hit_deflects_toward_the_edge() {
        let mut state = serve_right(3);
        state.ball_x = ARENA_WIDTH - PADDLE_WIDTH - BALL_RADIUS + 1.0;
        // Near the lower edge of the right paddle.
        state.ball_y = state.right_paddle_y + PADDLE_HEIGHT - 1.0;
        state.ball_vx = 5.0;
        state.ball_vy = 0.0;
        state.update(0.0);
        assert!(state.ball_vx < 0.0);
        assert!(state.ball_vy > 0.0);
        assert_eq!(state.ball_x, ARENA_WIDTH - PADDLE_WIDTH - BALL_RADIUS);
    }

    #[test]
    fn first_point_wins_with_single_round() {
        let mut state = serve_right(1);
        state.right_paddle_y = 0.0;
        state.ball_x = ARENA_WIDTH - BALL_RADIUS + 1.0;
        state.ball_y = ARENA_HEIGHT - 20.0;
        state.ball_vx = 5.0;
        state.update(0.0);
        assert_eq!(state.left_score, 1);
        assert_eq!(state.winner, Some(Side::Left));
    }

    #[test]
    fn even_target_rounds_win_at_half() {
        // Regression for the ambiguous integer/float formula: 4 rounds -> 2.
        let mut state = serve_right(4);
        for _ in 0..2 {
            state.right_paddle_y = 0.0;
            state.ball_x = ARENA_WIDTH - BALL_RADIUS + 1.0;
            state.ball_y = ARENA_HEIGHT - 20.0;
            state.ball_vx = 5.0;
            state.update(0.0);
        }
        assert_eq!(state.left_score, 2);
        assert_eq!(state.winner, Some(Side::Left));
    }

    #[test]
    fn no_updates_after_game_over() {
        let mut state = serve_right(1);
        state.right_paddle_y = 0.0;
        state.ball_x = ARENA_WIDTH - BALL_RADIUS + 1.0;
        state.ball_y = ARENA_HEIGHT - 20.0;
        state.ball_vx = 5.0;
        state.update(0.0);
        assert!(state.winner.is_some());
        let snapshot = state.snapshot();
        assert!(state.update(1.0).is_none());
        assert_eq!(state.snapshot(), snapshot);
    }

    #[test]
    fn score_sum_is_monotonic() {
        let mut state = serve_right(99);
        let mut last_total = 0;
        for _ in 0..5_000 {
            state.update(1.0);
            let total = state.left_score + state.right_score;
            assert!(total >= last_total);
            last_total = total;
            // Ball stays within the arena between events.
            assert!(state.ball_x >= 0.0 && state.ball_x <= ARENA_WIDTH);
            assert!(state.ball_y >= BALL_RADIUS - 1e-9);
            assert!(state.ball_y <= ARENA_HEIGHT - BALL_RADIUS + 1e-9);
        }
    }

    #[test]
    fn snapshot_reports_arena_dimensions() {
        let snapshot = serve_right(3).snapshot();
        assert_eq!(snapshot.width, 800);
        assert_eq!(snapshot.height, 450);
        assert_eq!(snapshot.ball_radius, 10);
        assert_eq!(snapshot.paddle_width, 15);
        assert_eq!(snapshot.paddle_height, 100);
    }
}
