//! Presentation boundary.
//!
//! The state machine never draws anything itself. It issues abstract
//! commands to a [`RenderSink`], which owns every presentation side effect
//! (DOM, terminal, test recorder, ...).

use std::fmt::Write as _;

use crate::protocol::{AnswerResult, LeaderboardEntry, Question, RoomState};
use crate::screen::PlayerStats;

/// The four ways a question can end for this player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOutcome {
    Correct,
    Incorrect,
    /// Wrong answer that knocked the player out. Never auto-returns.
    Eliminated,
    /// The countdown ran out before an answer was sent.
    Timeout,
}

impl ResultOutcome {
    pub fn icon(self) -> &'static str {
        match self {
            Self::Correct => "✅",
            Self::Incorrect | Self::Eliminated => "❌",
            Self::Timeout => "⏱️",
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            Self::Correct => "CORRECT!",
            Self::Incorrect | Self::Eliminated => "WRONG!",
            Self::Timeout => "Time's up!",
        }
    }

    /// Whether the result screen returns to waiting on its own.
    pub fn auto_returns(self) -> bool {
        !matches!(self, Self::Eliminated)
    }
}

/// Text and numbers shown on the result screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDetails {
    pub headline: String,
    pub detail: String,
    /// Points awarded for this answer.
    pub score_delta: Option<u64>,
    pub streak: u32,
    /// New level, when this answer levelled the player up.
    pub level_up: Option<u32>,
    pub xp_gained: Option<u64>,
}

impl ResultDetails {
    /// Classify an answer result and build its screen content.
    pub fn from_answer(result: &AnswerResult) -> (ResultOutcome, Self) {
        let outcome = if result.correct {
            ResultOutcome::Correct
        } else if result.is_eliminated() {
            ResultOutcome::Eliminated
        } else {
            ResultOutcome::Incorrect
        };

        let level_up = match (result.leveled_up, result.level) {
            (Some(true), Some(level)) => Some(level),
            _ => None,
        };
        let xp_gained = result.xp_gained.filter(|xp| *xp > 0);

        let detail = match outcome {
            ResultOutcome::Correct => {
                let mut detail = format!("+{} points", result.score.unwrap_or(0));
                if let Some(level) = level_up {
                    let _ = write!(detail, " | LEVEL UP! Level {level}");
                }
                if let Some(xp) = xp_gained {
                    let _ = write!(detail, " | +{xp} XP");
                }
                detail
            }
            ResultOutcome::Eliminated => "You have been eliminated!".to_string(),
            _ => "Streak reset".to_string(),
        };

        let details = Self {
            headline: outcome.headline().to_string(),
            detail,
            score_delta: result.score,
            streak: result.streak,
            level_up,
            xp_gained,
        };
        (outcome, details)
    }

    /// Content for a question that ran out of time.
    pub fn timeout(streak: u32) -> Self {
        Self {
            headline: ResultOutcome::Timeout.headline().to_string(),
            detail: String::new(),
            score_delta: None,
            streak,
            level_up: None,
            xp_gained: None,
        }
    }
}

/// User-facing notices that are not screens of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// An admin removed the player; the session is over.
    Kicked,
    /// The server reported a non-fatal error.
    ServerError(String),
    /// The channel dropped; the session continues once it recovers.
    ConnectionLost(Option<String>),
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kicked => write!(f, "You were removed from the game by the admin"),
            Self::ServerError(message) => write!(f, "Server error: {message}"),
            Self::ConnectionLost(Some(reason)) => write!(f, "Connection lost ({reason})"),
            Self::ConnectionLost(None) => write!(f, "Connection lost"),
        }
    }
}

/// Receives presentation commands from the controller.
///
/// All methods are called from the controller's single event loop, one at a
/// time.
pub trait RenderSink: Send {
    fn show_waiting(&mut self);

    /// Show a new question with all answers selectable.
    fn show_question(&mut self, question: &Question);

    /// Enable or disable answer selection on the question screen.
    fn set_answers_enabled(&mut self, enabled: bool);

    fn show_result(&mut self, outcome: ResultOutcome, details: &ResultDetails);

    fn show_finished(&mut self, stats: &PlayerStats, leaderboard: &[LeaderboardEntry]);

    /// `percentage` is in `[0, 1]`.
    fn set_timer_display(&mut self, remaining: u32, percentage: f64);

    fn set_wake_lock_indicator(&mut self, active: bool);

    fn set_effect_active(&mut self, active: bool);

    fn update_stats(&mut self, stats: &PlayerStats);

    fn show_notice(&mut self, notice: &Notice);

    /// Room snapshots are informational; ignored unless overridden.
    fn show_room_state(&mut self, _room: &RoomState) {}
}
