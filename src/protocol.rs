//! Wire types for the NeonMind game channel.
//!
//! Every message is a JSON text frame, adjacently tagged as
//! `{"event": "<snake_case name>", "data": {...}}`. The game server still
//! emits some question fields under their legacy names (`frage_text`,
//! `antworten`, `zeit_sekunden`); those are accepted as aliases and never
//! produced.

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Server-assigned question identifier.
pub type QuestionId = u64;

/// Server-assigned answer identifier, unique across questions.
pub type AnswerId = u64;

/// Identifier of a registered player.
pub type UserId = u64;

// ── Question ────────────────────────────────────────────────────────

/// One selectable answer of a [`Question`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: AnswerId,
    pub text: String,
}

/// A question as pushed by the server. The correct answer is never included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(alias = "frage_text")]
    pub text: String,
    /// Source code shown above the answers, if the question has any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
    /// Answers in display order.
    #[serde(alias = "antworten")]
    pub answers: Vec<AnswerOption>,
    /// Countdown length for this question.
    #[serde(alias = "zeit_sekunden")]
    pub duration_seconds: u32,
    /// 1-based position of the question within the game.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_number: Option<u32>,
    /// Question kind (`mc`, `text`, `order`, `math`).
    #[serde(default, rename = "typ", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Question {
    /// Returns `true` if `answer_id` is one of this question's answers.
    pub fn has_answer(&self, answer_id: AnswerId) -> bool {
        self.answers.iter().any(|a| a.id == answer_id)
    }
}

// ── Payload structs ─────────────────────────────────────────────────

/// Outcome of this client's answer, computed by the server.
///
/// `total_score`, `streak` and `level` are authoritative: the client adopts
/// them as-is and never derives them locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub correct: bool,
    pub total_score: u64,
    pub streak: u32,
    /// Points awarded for this answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leveled_up: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp_gained: Option<u64>,
    /// Set in survival modes once a wrong answer knocks the player out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated: Option<bool>,
}

impl AnswerResult {
    /// Returns `true` if the server eliminated the player with this answer.
    pub fn is_eliminated(&self) -> bool {
        self.eliminated.unwrap_or(false)
    }
}

/// A player listed in a [`RoomState`] snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomPlayer {
    pub user_id: UserId,
    pub username: String,
}

/// Informational room snapshot sent after joining.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoomState {
    #[serde(default)]
    pub players: Vec<RoomPlayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Snapshot sent in reply to `reconnect_game`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<Question>,
    #[serde(default)]
    pub score: u64,
    #[serde(default)]
    pub streak: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl GameStateSnapshot {
    /// Returns `true` if the server reports the game as over.
    pub fn is_finished(&self) -> bool {
        self.status.as_deref() == Some("finished")
    }
}

/// One row of the final leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub username: String,
    pub score: u64,
    #[serde(default)]
    pub streak_max: u32,
}

/// Payload of `game_finished`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameFinished {
    /// Final ranking, best first.
    #[serde(default)]
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Payload of `jammer_attack`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JammerAttack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<UserId>,
    /// Overlay duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// Payload of `kicked`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Kicked {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Messages sent from the controller to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the room on initial connect.
    JoinGame { room_code: String },
    /// Re-enter the room after the channel dropped while backgrounded.
    ReconnectGame { room_code: String },
    /// Answer the current question.
    SubmitAnswer {
        room_code: String,
        answer_id: AnswerId,
        /// Seconds (fractional) between showing the question and answering.
        time_taken: f64,
    },
}

impl ClientMessage {
    /// The wire event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinGame { .. } => "join_game",
            Self::ReconnectGame { .. } => "reconnect_game",
            Self::SubmitAnswer { .. } => "submit_answer",
        }
    }
}

/// Messages sent from the server to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting after the socket is accepted.
    Connected { user_id: UserId },
    /// Room snapshot (informational).
    RoomState(RoomState),
    /// Another player entered the room.
    PlayerJoined { user_id: UserId, username: String },
    /// A new question starts now.
    NewQuestion(Question),
    /// Outcome of this client's submission.
    AnswerResult(AnswerResult),
    /// Someone in the room answered (broadcast to the host view).
    PlayerAnswered { user_id: UserId, correct: bool },
    /// Stats snapshot in reply to `reconnect_game`.
    GameState(GameStateSnapshot),
    /// The game is over.
    GameFinished(GameFinished),
    /// Another player jammed this screen.
    JammerAttack(JammerAttack),
    /// An admin removed this player from the game.
    Kicked(Option<Kicked>),
    /// Non-fatal server-side error.
    Error { message: String },
}

impl ServerMessage {
    /// The wire event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::RoomState(_) => "room_state",
            Self::PlayerJoined { .. } => "player_joined",
            Self::NewQuestion(_) => "new_question",
            Self::AnswerResult(_) => "answer_result",
            Self::PlayerAnswered { .. } => "player_answered",
            Self::GameState(_) => "game_state",
            Self::GameFinished(_) => "game_finished",
            Self::JammerAttack(_) => "jammer_attack",
            Self::Kicked(_) => "kicked",
            Self::Error { .. } => "error",
        }
    }
}
