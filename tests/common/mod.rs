#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the controller integration tests.
//!
//! Provides a channel-driven [`MockTransport`] with a [`MockServer`] handle,
//! a [`RecordingSink`] that captures render commands, a wake-lock provider
//! that hands its lease to the test, and builders for common server messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use neonmind_controller::protocol::{
    AnswerOption, AnswerResult, ClientMessage, GameFinished, JammerAttack, LeaderboardEntry,
    Question, ServerMessage,
};
use neonmind_controller::render::{Notice, RenderSink, ResultDetails, ResultOutcome};
use neonmind_controller::wake_lock::{WakeLockHandle, WakeLockLease, WakeLockProvider};
use neonmind_controller::{ControllerError, PlayerStats, Transport};
use tokio::sync::{mpsc, oneshot};

// ── MockTransport ───────────────────────────────────────────────────

/// Transport whose server side is driven by a [`MockServer`].
///
/// `recv` yields whatever the server pushes and returns `None` once the
/// server handle is closed or dropped.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Result<String, ControllerError>>,
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

/// Test-side handle of a [`MockTransport`].
pub struct MockServer {
    tx: Option<mpsc::UnboundedSender<Result<String, ControllerError>>>,
    sent: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> (Self, MockServer) {
        let (tx, incoming) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming,
            sent: sent_tx,
            closed: Arc::clone(&closed),
        };
        let server = MockServer {
            tx: Some(tx),
            sent: sent_rx,
            closed,
        };
        (transport, server)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), ControllerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ControllerError::TransportClosed);
        }
        let _ = self.sent.send(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ControllerError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self) -> Result<(), ControllerError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

impl MockServer {
    /// Push a server message to the controller.
    pub fn push(&self, msg: &ServerMessage) {
        self.push_raw(&serde_json::to_string(msg).unwrap());
    }

    /// Push a raw text frame.
    pub fn push_raw(&self, text: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Ok(text.to_owned()));
        }
    }

    /// Simulate a dropped link.
    pub fn drop_link(&self, reason: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Err(ControllerError::TransportReceive(reason.into())));
        }
    }

    /// End the channel for good.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Wait for the next message the controller sent.
    pub async fn next_sent(&mut self) -> ClientMessage {
        let text = tokio::time::timeout(Duration::from_secs(60), self.sent.recv())
            .await
            .expect("timed out waiting for a client message")
            .expect("transport dropped");
        serde_json::from_str(&text).unwrap()
    }

    /// Messages sent so far that have not been consumed by `next_sent`.
    pub fn drain_sent(&mut self) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        while let Ok(text) = self.sent.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ── RecordingSink ───────────────────────────────────────────────────

/// A render command as seen by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Waiting,
    Question(u64),
    AnswersEnabled(bool),
    Result(ResultOutcome, ResultDetails),
    Finished(PlayerStats, Vec<LeaderboardEntry>),
    Timer(u32, f64),
    WakeLock(bool),
    Effect(bool),
    Stats(PlayerStats),
    Notice(Notice),
}

/// Render sink that records every command.
pub struct RecordingSink {
    log: Arc<StdMutex<Vec<RenderCommand>>>,
    tx: mpsc::UnboundedSender<RenderCommand>,
}

/// Test-side view of a [`RecordingSink`].
pub struct RenderLog {
    log: Arc<StdMutex<Vec<RenderCommand>>>,
    rx: mpsc::UnboundedReceiver<RenderCommand>,
}

impl RecordingSink {
    pub fn new() -> (Self, RenderLog) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                log: Arc::clone(&log),
                tx,
            },
            RenderLog { log, rx },
        )
    }

    fn record(&mut self, cmd: RenderCommand) {
        self.log.lock().unwrap().push(cmd.clone());
        let _ = self.tx.send(cmd);
    }
}

impl RenderSink for RecordingSink {
    fn show_waiting(&mut self) {
        self.record(RenderCommand::Waiting);
    }

    fn show_question(&mut self, question: &Question) {
        self.record(RenderCommand::Question(question.id));
    }

    fn set_answers_enabled(&mut self, enabled: bool) {
        self.record(RenderCommand::AnswersEnabled(enabled));
    }

    fn show_result(&mut self, outcome: ResultOutcome, details: &ResultDetails) {
        self.record(RenderCommand::Result(outcome, details.clone()));
    }

    fn show_finished(&mut self, stats: &PlayerStats, leaderboard: &[LeaderboardEntry]) {
        self.record(RenderCommand::Finished(*stats, leaderboard.to_vec()));
    }

    fn set_timer_display(&mut self, remaining: u32, percentage: f64) {
        self.record(RenderCommand::Timer(remaining, percentage));
    }

    fn set_wake_lock_indicator(&mut self, active: bool) {
        self.record(RenderCommand::WakeLock(active));
    }

    fn set_effect_active(&mut self, active: bool) {
        self.record(RenderCommand::Effect(active));
    }

    fn update_stats(&mut self, stats: &PlayerStats) {
        self.record(RenderCommand::Stats(*stats));
    }

    fn show_notice(&mut self, notice: &Notice) {
        self.record(RenderCommand::Notice(notice.clone()));
    }
}

impl RenderLog {
    /// Wait until a command matching `pred` is rendered and return it.
    /// Commands before it are consumed.
    pub async fn wait_for<F>(&mut self, pred: F) -> RenderCommand
    where
        F: Fn(&RenderCommand) -> bool,
    {
        let deadline = Duration::from_secs(600);
        tokio::time::timeout(deadline, async {
            loop {
                let cmd = self.rx.recv().await.expect("render sink dropped");
                if pred(&cmd) {
                    return cmd;
                }
            }
        })
        .await
        .expect("timed out waiting for render command")
    }

    /// Everything rendered so far, in order.
    pub fn all(&self) -> Vec<RenderCommand> {
        self.log.lock().unwrap().clone()
    }

    /// Commands not yet consumed by `wait_for`.
    pub fn drain(&mut self) -> Vec<RenderCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.rx.try_recv() {
            out.push(cmd);
        }
        out
    }
}

// ── Wake lock ───────────────────────────────────────────────────────

/// Grants the wake lock and hands the platform-side lease to the test.
pub struct GrantingWakeLock {
    lease_tx: Option<oneshot::Sender<WakeLockLease>>,
}

impl GrantingWakeLock {
    pub fn new() -> (Self, oneshot::Receiver<WakeLockLease>) {
        let (tx, rx) = oneshot::channel();
        (Self { lease_tx: Some(tx) }, rx)
    }
}

#[async_trait]
impl WakeLockProvider for GrantingWakeLock {
    async fn request(&mut self) -> Result<WakeLockHandle, ControllerError> {
        let (handle, lease) = WakeLockHandle::pair();
        if let Some(tx) = self.lease_tx.take() {
            let _ = tx.send(lease);
        }
        Ok(handle)
    }
}

// ── Message builders ────────────────────────────────────────────────

/// A two-answer question; answer ids are `id * 10 + 1` and `id * 10 + 2`.
pub fn question(id: u64, seconds: u32) -> ServerMessage {
    ServerMessage::NewQuestion(Question {
        id,
        text: format!("Question {id}?"),
        code_snippet: None,
        answers: vec![
            AnswerOption {
                id: id * 10 + 1,
                text: "A".into(),
            },
            AnswerOption {
                id: id * 10 + 2,
                text: "B".into(),
            },
        ],
        duration_seconds: seconds,
        question_number: Some(u32::try_from(id).unwrap_or(0)),
        kind: Some("mc".into()),
    })
}

pub fn answer_result(correct: bool, total_score: u64, streak: u32) -> AnswerResult {
    AnswerResult {
        correct,
        total_score,
        streak,
        score: None,
        level: None,
        leveled_up: None,
        xp_gained: None,
        eliminated: None,
    }
}

pub fn correct(total_score: u64, streak: u32, score: u64) -> ServerMessage {
    ServerMessage::AnswerResult(AnswerResult {
        score: Some(score),
        ..answer_result(true, total_score, streak)
    })
}

pub fn eliminated(total_score: u64) -> ServerMessage {
    ServerMessage::AnswerResult(AnswerResult {
        eliminated: Some(true),
        ..answer_result(false, total_score, 0)
    })
}

pub fn game_finished(leaderboard: Vec<LeaderboardEntry>) -> ServerMessage {
    ServerMessage::GameFinished(GameFinished { leaderboard })
}

pub fn jammer(duration_ms: Option<u64>) -> ServerMessage {
    ServerMessage::JammerAttack(JammerAttack {
        from_user_id: Some(99),
        duration: duration_ms,
    })
}
