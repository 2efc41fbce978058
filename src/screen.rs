//! Screen state machine.
//!
//! # State Diagram
//!
//! ```text
//!                 new_question
//!   ┌─────────┐ ─────────────────▶ ┌──────────┐  select answer  ┌────────────┐
//!   │ Waiting │                    │ Question │ ──────────────▶ │ Submitting │
//!   └─────────┘ ◀──┐               └──────────┘                 └────────────┘
//!        ▲         │ auto-return       │ timer expiry               │ answer_result
//!        │         │ (not eliminated)  ▼                            ▼
//!        │         │               ┌──────────────────────────────────┐
//!        │         └────────────── │              Result              │
//!        │                         └──────────────────────────────────┘
//!        │                                  │ new_question (not eliminated)
//!        └──────────────────────────────────┴───────▶ Question
//!
//!   any ── game_finished ──▶ Finished (terminal, absorbs everything but `kicked`)
//! ```
//!
//! The machine runs on the controller's single event loop. Deferred work
//! (countdown ticks, auto-return, overlay expiry) is scheduled on tokio and
//! comes back as [`ControllerInput`]s tagged with the round, ticket or
//! generation it belongs to; anything whose tag is no longer current is
//! dropped. That tag check is what keeps a tick from an old question out of
//! the new question's display.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::effects::EffectsLayer;
use crate::event::{ChannelEvent, ControllerInput};
use crate::protocol::{
    AnswerId, AnswerResult, GameFinished, GameStateSnapshot, JammerAttack, Question, ServerMessage,
};
use crate::render::{Notice, RenderSink, ResultDetails, ResultOutcome};
use crate::timer::{tick_percentage, CountdownTimer};

/// Which screen is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenState {
    #[default]
    Waiting,
    Question,
    Result,
    /// Terminal.
    Finished,
}

/// The player's running stats, as last reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerStats {
    pub score: u64,
    pub streak: u32,
    pub level: u32,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            score: 0,
            streak: 0,
            level: 1,
        }
    }
}

impl PlayerStats {
    /// Adopt the authoritative values of an answer result.
    pub fn apply(&mut self, result: &AnswerResult) {
        self.score = result.total_score;
        self.streak = result.streak;
        if let Some(level) = result.level {
            self.level = level;
        }
    }
}

/// Side effects the machine asks its owner to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Send `submit_answer` to the server.
    SubmitAnswer { answer_id: AnswerId, time_taken: f64 },
    /// Give the wake lock back.
    ReleaseWakeLock,
    /// Tear the session down; no further input is processed.
    EndSession,
}

/// The central controller state.
#[derive(Debug)]
pub struct ScreenStateMachine {
    screen: ScreenState,
    question: Option<Question>,
    question_started_at: Option<Instant>,
    /// Incremented for every accepted question.
    round: u64,
    submitted: bool,
    eliminated: bool,
    ended: bool,
    stats: PlayerStats,
    timer: CountdownTimer,
    effects: EffectsLayer,
    auto_return_delay: Duration,
    auto_return_ticket: u64,
    auto_return: Option<JoinHandle<()>>,
    inputs: mpsc::UnboundedSender<ControllerInput>,
}

impl ScreenStateMachine {
    /// Create a machine in `Waiting`. Deferred work is posted to `inputs`.
    pub fn new(config: &ControllerConfig, inputs: mpsc::UnboundedSender<ControllerInput>) -> Self {
        Self {
            screen: ScreenState::Waiting,
            question: None,
            question_started_at: None,
            round: 0,
            submitted: false,
            eliminated: false,
            ended: false,
            stats: PlayerStats::default(),
            timer: CountdownTimer::new(),
            effects: EffectsLayer::new(config.default_jammer_duration),
            auto_return_delay: config.auto_return_delay,
            auto_return_ticket: 0,
            auto_return: None,
            inputs,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn screen(&self) -> ScreenState {
        self.screen
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    pub fn stats(&self) -> PlayerStats {
        self.stats
    }

    /// `true` between sending an answer and receiving its result.
    pub fn is_submitting(&self) -> bool {
        self.screen == ScreenState::Question && self.submitted
    }

    pub fn is_eliminated(&self) -> bool {
        self.eliminated
    }

    /// `true` once the session was ended by a kick.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn timer(&self) -> &CountdownTimer {
        &self.timer
    }

    pub fn effects(&self) -> &EffectsLayer {
        &self.effects
    }

    // ── Input handling ──────────────────────────────────────────────

    /// Process one queued input. Inputs the machine does not own
    /// (foreground, wake-lock notices, shutdown) are ignored here.
    pub fn handle(&mut self, input: ControllerInput, render: &mut dyn RenderSink) -> Vec<Directive> {
        match input {
            ControllerInput::Channel(ChannelEvent::Server(msg)) => self.handle_server(msg, render),
            ControllerInput::Channel(_) => Vec::new(),
            ControllerInput::SelectAnswer(answer_id) => {
                self.select_answer(answer_id, render).into_iter().collect()
            }
            ControllerInput::TimerTick { round, remaining } => {
                self.timer_tick(round, remaining, render);
                Vec::new()
            }
            ControllerInput::TimerExpired { round } => {
                self.timer_expired(round, render);
                Vec::new()
            }
            ControllerInput::AutoReturn { ticket } => {
                self.auto_return(ticket, render);
                Vec::new()
            }
            ControllerInput::EffectElapsed { generation } => {
                self.effect_elapsed(generation, render);
                Vec::new()
            }
            ControllerInput::Foreground
            | ControllerInput::WakeLockReleased
            | ControllerInput::Shutdown => Vec::new(),
        }
    }

    /// Apply one server message.
    pub fn handle_server(
        &mut self,
        msg: ServerMessage,
        render: &mut dyn RenderSink,
    ) -> Vec<Directive> {
        if self.ended {
            debug!(event = msg.name(), "session ended, event ignored");
            return Vec::new();
        }
        if let ServerMessage::Kicked(_) = msg {
            return self.on_kicked(render);
        }
        if self.screen == ScreenState::Finished {
            debug!(event = msg.name(), "game finished, late event ignored");
            return Vec::new();
        }

        match msg {
            ServerMessage::NewQuestion(question) => self.on_new_question(question, render),
            ServerMessage::AnswerResult(result) => self.on_answer_result(&result, render),
            ServerMessage::GameFinished(finished) => return self.on_game_finished(&finished, render),
            ServerMessage::GameState(snapshot) => return self.on_game_state(&snapshot, render),
            ServerMessage::JammerAttack(attack) => self.on_jammer_attack(&attack, render),
            ServerMessage::RoomState(room) => {
                debug!(players = room.players.len(), status = ?room.status, "room state");
                render.show_room_state(&room);
            }
            ServerMessage::Error { message } => {
                warn!("server error: {message}");
                render.show_notice(&Notice::ServerError(message));
            }
            ServerMessage::Connected { user_id } => debug!(user_id, "server greeted us"),
            ServerMessage::PlayerJoined { user_id, username } => {
                debug!(user_id, %username, "player joined the room");
            }
            ServerMessage::PlayerAnswered { user_id, correct } => {
                debug!(user_id, correct, "player answered");
            }
            ServerMessage::Kicked(_) => {}
        }
        Vec::new()
    }

    /// The player picked an answer.
    ///
    /// Ignored unless a question is showing and nothing was sent for it yet.
    pub fn select_answer(
        &mut self,
        answer_id: AnswerId,
        render: &mut dyn RenderSink,
    ) -> Option<Directive> {
        if self.ended || self.screen != ScreenState::Question || self.submitted {
            debug!(answer_id, screen = ?self.screen, "answer selection ignored");
            return None;
        }
        let question = self.question.as_ref()?;
        if !question.has_answer(answer_id) {
            warn!(answer_id, question_id = question.id, "answer is not part of the current question");
            return None;
        }

        self.timer.cancel();
        self.submitted = true;
        render.set_answers_enabled(false);

        let time_taken = self
            .question_started_at
            .map_or(0.0, |started| started.elapsed().as_secs_f64());
        info!(answer_id, time_taken, "answer submitted");
        Some(Directive::SubmitAnswer {
            answer_id,
            time_taken,
        })
    }

    /// One countdown second elapsed.
    pub fn timer_tick(&mut self, round: u64, remaining: u32, render: &mut dyn RenderSink) {
        if !self.is_live_round(round) {
            debug!(round, current = self.round, "stale countdown tick dropped");
            return;
        }
        let total = self.question.as_ref().map_or(0, |q| q.duration_seconds);
        render.set_timer_display(remaining, tick_percentage(remaining, total));
    }

    /// The countdown reached zero without an answer.
    pub fn timer_expired(&mut self, round: u64, render: &mut dyn RenderSink) {
        if !self.is_live_round(round) {
            debug!(round, current = self.round, "stale countdown expiry dropped");
            return;
        }
        self.timer.cancel();
        self.screen = ScreenState::Result;
        info!(round, "question timed out");
        render.show_result(ResultOutcome::Timeout, &ResultDetails::timeout(self.stats.streak));
        self.schedule_auto_return();
    }

    /// The result screen's display time is over.
    pub fn auto_return(&mut self, ticket: u64, render: &mut dyn RenderSink) {
        if ticket != self.auto_return_ticket
            || self.screen != ScreenState::Result
            || self.eliminated
            || self.ended
        {
            debug!(ticket, current = self.auto_return_ticket, "auto-return dropped");
            return;
        }
        self.auto_return = None;
        self.screen = ScreenState::Waiting;
        render.show_waiting();
    }

    /// A jammer overlay ran its course.
    pub fn effect_elapsed(&mut self, generation: u64, render: &mut dyn RenderSink) {
        if self.effects.expire(generation) {
            render.set_effect_active(false);
        }
    }

    /// Stop all scheduled work. Used when the session is torn down.
    pub fn shutdown(&mut self) {
        self.timer.cancel();
        self.cancel_auto_return();
        self.effects.clear();
        self.ended = true;
    }

    // ── Transitions ─────────────────────────────────────────────────

    fn on_new_question(&mut self, question: Question, render: &mut dyn RenderSink) {
        if self.eliminated {
            debug!(question_id = question.id, "eliminated, question ignored");
            return;
        }

        self.timer.cancel();
        self.cancel_auto_return();
        self.round += 1;
        self.submitted = false;
        self.screen = ScreenState::Question;
        self.question_started_at = Some(Instant::now());

        info!(
            question_id = question.id,
            number = ?question.question_number,
            seconds = question.duration_seconds,
            "new question"
        );
        render.show_question(&question);
        render.set_answers_enabled(true);
        render.set_timer_display(
            question.duration_seconds,
            tick_percentage(question.duration_seconds, question.duration_seconds),
        );

        let round = self.round;
        let tick_tx = self.inputs.clone();
        let expire_tx = self.inputs.clone();
        self.timer.start(
            question.duration_seconds,
            move |remaining| {
                let _ = tick_tx.send(ControllerInput::TimerTick { round, remaining });
            },
            move || {
                let _ = expire_tx.send(ControllerInput::TimerExpired { round });
            },
        );
        self.question = Some(question);
    }

    fn on_answer_result(&mut self, result: &AnswerResult, render: &mut dyn RenderSink) {
        self.stats.apply(result);
        render.update_stats(&self.stats);

        if self.screen != ScreenState::Question {
            debug!(screen = ?self.screen, "answer result outside a question, stats only");
            return;
        }

        self.timer.cancel();
        let (outcome, details) = ResultDetails::from_answer(result);
        self.screen = ScreenState::Result;
        info!(?outcome, total_score = result.total_score, streak = result.streak, "answer result");
        render.show_result(outcome, &details);

        if outcome == ResultOutcome::Eliminated {
            self.eliminated = true;
            self.cancel_auto_return();
        } else {
            self.schedule_auto_return();
        }
    }

    fn on_game_finished(
        &mut self,
        finished: &GameFinished,
        render: &mut dyn RenderSink,
    ) -> Vec<Directive> {
        self.timer.cancel();
        self.cancel_auto_return();
        self.question = None;
        self.question_started_at = None;
        self.screen = ScreenState::Finished;
        info!(score = self.stats.score, streak = self.stats.streak, "game finished");
        render.show_finished(&self.stats, &finished.leaderboard);
        vec![Directive::ReleaseWakeLock]
    }

    fn on_game_state(
        &mut self,
        snapshot: &GameStateSnapshot,
        render: &mut dyn RenderSink,
    ) -> Vec<Directive> {
        self.stats.score = snapshot.score;
        self.stats.streak = snapshot.streak;
        render.update_stats(&self.stats);
        debug!(status = ?snapshot.status, "game state restored after rejoin");

        if snapshot.is_finished() {
            return self.on_game_finished(&GameFinished::default(), render);
        }
        Vec::new()
    }

    fn on_jammer_attack(&mut self, attack: &JammerAttack, render: &mut dyn RenderSink) {
        let tx = self.inputs.clone();
        let generation = self
            .effects
            .trigger(attack.duration.map(Duration::from_millis), move |generation| {
                let _ = tx.send(ControllerInput::EffectElapsed { generation });
            });
        info!(generation, from = ?attack.from_user_id, "jammer attack");
        render.set_effect_active(true);
    }

    fn on_kicked(&mut self, render: &mut dyn RenderSink) -> Vec<Directive> {
        warn!("removed from the game by the admin");
        self.shutdown();
        render.show_notice(&Notice::Kicked);
        vec![Directive::ReleaseWakeLock, Directive::EndSession]
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn is_live_round(&self, round: u64) -> bool {
        !self.ended
            && round == self.round
            && self.screen == ScreenState::Question
            && !self.submitted
    }

    fn schedule_auto_return(&mut self) {
        self.cancel_auto_return();
        let ticket = self.auto_return_ticket;
        let delay = self.auto_return_delay;
        let tx = self.inputs.clone();
        self.auto_return = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(ControllerInput::AutoReturn { ticket });
        }));
    }

    fn cancel_auto_return(&mut self) {
        self.auto_return_ticket += 1;
        if let Some(task) = self.auto_return.take() {
            task.abort();
        }
    }
}

impl Drop for ScreenStateMachine {
    fn drop(&mut self) {
        if let Some(task) = self.auto_return.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{AnswerOption, LeaderboardEntry, RoomState};

    #[derive(Debug, Clone, PartialEq)]
    enum Cmd {
        Waiting,
        Question(u64),
        AnswersEnabled(bool),
        Result(ResultOutcome, String),
        Finished(PlayerStats, usize),
        Timer(u32, f64),
        WakeLock(bool),
        Effect(bool),
        Stats(PlayerStats),
        Notice(Notice),
        Room,
    }

    #[derive(Default)]
    struct Recorder {
        cmds: Vec<Cmd>,
    }

    impl Recorder {
        fn take(&mut self) -> Vec<Cmd> {
            std::mem::take(&mut self.cmds)
        }
    }

    impl RenderSink for Recorder {
        fn show_waiting(&mut self) {
            self.cmds.push(Cmd::Waiting);
        }
        fn show_question(&mut self, question: &Question) {
            self.cmds.push(Cmd::Question(question.id));
        }
        fn set_answers_enabled(&mut self, enabled: bool) {
            self.cmds.push(Cmd::AnswersEnabled(enabled));
        }
        fn show_result(&mut self, outcome: ResultOutcome, details: &ResultDetails) {
            self.cmds.push(Cmd::Result(outcome, details.detail.clone()));
        }
        fn show_finished(&mut self, stats: &PlayerStats, leaderboard: &[LeaderboardEntry]) {
            self.cmds.push(Cmd::Finished(*stats, leaderboard.len()));
        }
        fn set_timer_display(&mut self, remaining: u32, percentage: f64) {
            self.cmds.push(Cmd::Timer(remaining, percentage));
        }
        fn set_wake_lock_indicator(&mut self, active: bool) {
            self.cmds.push(Cmd::WakeLock(active));
        }
        fn set_effect_active(&mut self, active: bool) {
            self.cmds.push(Cmd::Effect(active));
        }
        fn update_stats(&mut self, stats: &PlayerStats) {
            self.cmds.push(Cmd::Stats(*stats));
        }
        fn show_notice(&mut self, notice: &Notice) {
            self.cmds.push(Cmd::Notice(notice.clone()));
        }
        fn show_room_state(&mut self, _room: &RoomState) {
            self.cmds.push(Cmd::Room);
        }
    }

    struct Harness {
        machine: ScreenStateMachine,
        inputs: mpsc::UnboundedReceiver<ControllerInput>,
        render: Recorder,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                machine: ScreenStateMachine::new(&ControllerConfig::default(), tx),
                inputs: rx,
                render: Recorder::default(),
            }
        }

        fn server(&mut self, msg: ServerMessage) -> Vec<Directive> {
            self.machine.handle_server(msg, &mut self.render)
        }

        fn select(&mut self, answer_id: AnswerId) -> Option<Directive> {
            self.machine.select_answer(answer_id, &mut self.render)
        }

        /// Wait for the next scheduled input and feed it back to the machine.
        async fn pump(&mut self) -> ControllerInput {
            let input = self.inputs.recv().await.unwrap();
            self.machine.handle(input.clone(), &mut self.render);
            input
        }

        /// Feed every input that becomes due within `window`.
        async fn pump_for(&mut self, window: Duration) -> Vec<ControllerInput> {
            let deadline = Instant::now() + window;
            let mut seen = Vec::new();
            while let Ok(Some(input)) =
                tokio::time::timeout_at(deadline, self.inputs.recv()).await
            {
                self.machine.handle(input.clone(), &mut self.render);
                seen.push(input);
            }
            seen
        }
    }

    fn question(id: u64, seconds: u32) -> Question {
        Question {
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
            question_number: Some(1),
            kind: Some("mc".into()),
        }
    }

    fn correct_result() -> AnswerResult {
        AnswerResult {
            correct: true,
            total_score: 150,
            streak: 3,
            score: Some(50),
            level: None,
            leveled_up: None,
            xp_gained: None,
            eliminated: None,
        }
    }

    fn eliminated_result() -> AnswerResult {
        AnswerResult {
            correct: false,
            total_score: 80,
            streak: 0,
            score: None,
            level: None,
            leveled_up: None,
            xp_gained: None,
            eliminated: Some(true),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn new_question_renders_and_starts_countdown() {
        let mut h = Harness::new();
        assert_eq!(h.machine.screen(), ScreenState::Waiting);

        h.server(ServerMessage::NewQuestion(question(1, 10)));

        assert_eq!(h.machine.screen(), ScreenState::Question);
        assert_eq!(h.machine.current_question().unwrap().id, 1);
        assert!(h.machine.timer().is_running());
        assert_eq!(
            h.render.take(),
            vec![
                Cmd::Question(1),
                Cmd::AnswersEnabled(true),
                Cmd::Timer(10, 1.0)
            ]
        );

        let input = h.pump().await;
        assert_eq!(input, ControllerInput::TimerTick { round: 1, remaining: 9 });
        assert_eq!(h.render.take(), vec![Cmd::Timer(9, 0.9)]);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_sends_elapsed_time_and_locks_input() {
        let mut h = Harness::new();
        h.server(ServerMessage::NewQuestion(question(1, 10)));
        h.render.take();

        tokio::time::advance(Duration::from_millis(2500)).await;
        let directive = h.select(12).unwrap();
        let Directive::SubmitAnswer {
            answer_id,
            time_taken,
        } = directive
        else {
            panic!("expected SubmitAnswer, got {directive:?}");
        };
        assert_eq!(answer_id, 12);
        assert!((time_taken - 2.5).abs() < 1e-6, "time_taken = {time_taken}");

        assert!(h.machine.is_submitting());
        assert!(!h.machine.timer().is_running());
        assert!(h.render.take().contains(&Cmd::AnswersEnabled(false)));

        assert_eq!(h.select(11), None, "second submission must be a no-op");
        assert!(h.render.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn selection_outside_question_is_ignored() {
        let mut h = Harness::new();
        assert_eq!(h.select(11), None);

        h.server(ServerMessage::NewQuestion(question(1, 10)));
        assert_eq!(h.select(99), None, "unknown answer id");
        assert!(!h.machine.is_submitting());
    }

    #[tokio::test(start_paused = true)]
    async fn correct_result_updates_stats_and_auto_returns() {
        let mut h = Harness::new();
        h.server(ServerMessage::NewQuestion(question(1, 10)));
        h.select(11).unwrap();
        h.render.take();

        h.server(ServerMessage::AnswerResult(correct_result()));

        assert_eq!(h.machine.screen(), ScreenState::Result);
        let stats = h.machine.stats();
        assert_eq!((stats.score, stats.streak, stats.level), (150, 3, 1));
        assert_eq!(
            h.render.take(),
            vec![
                Cmd::Stats(stats),
                Cmd::Result(ResultOutcome::Correct, "+50 points".into())
            ]
        );

        let start = Instant::now();
        let input = h.pump().await;
        assert!(matches!(input, ControllerInput::AutoReturn { .. }));
        assert_eq!(Instant::now() - start, Duration::from_secs(3));
        assert_eq!(h.machine.screen(), ScreenState::Waiting);
        assert_eq!(h.render.take(), vec![Cmd::Waiting]);
    }

    #[tokio::test(start_paused = true)]
    async fn elimination_never_auto_returns() {
        let mut h = Harness::new();
        h.server(ServerMessage::NewQuestion(question(1, 10)));
        h.select(11).unwrap();
        h.server(ServerMessage::AnswerResult(eliminated_result()));
        h.render.take();

        assert_eq!(h.machine.screen(), ScreenState::Result);
        assert!(h.machine.is_eliminated());
        assert_eq!(h.machine.stats().score, 80);

        h.pump_for(Duration::from_secs(60)).await;
        assert_eq!(h.machine.screen(), ScreenState::Result);
        assert!(!h.render.take().contains(&Cmd::Waiting));

        h.server(ServerMessage::NewQuestion(question(2, 10)));
        assert_eq!(h.machine.screen(), ScreenState::Result, "eliminated players sit out");

        h.server(ServerMessage::GameFinished(GameFinished::default()));
        assert_eq!(h.machine.screen(), ScreenState::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_shows_result_then_returns() {
        let mut h = Harness::new();
        h.server(ServerMessage::NewQuestion(question(1, 3)));
        h.render.take();

        let seen = h.pump_for(Duration::from_millis(3500)).await;
        assert_eq!(
            seen,
            vec![
                ControllerInput::TimerTick { round: 1, remaining: 2 },
                ControllerInput::TimerTick { round: 1, remaining: 1 },
                ControllerInput::TimerTick { round: 1, remaining: 0 },
                ControllerInput::TimerExpired { round: 1 },
            ]
        );
        assert_eq!(h.machine.screen(), ScreenState::Result);
        assert_eq!(
            h.render.take().last(),
            Some(&Cmd::Result(ResultOutcome::Timeout, String::new()))
        );

        h.pump().await;
        assert_eq!(h.machine.screen(), ScreenState::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_ticks_from_previous_question_are_dropped() {
        let mut h = Harness::new();
        h.server(ServerMessage::NewQuestion(question(1, 10)));
        h.server(ServerMessage::NewQuestion(question(2, 20)));
        h.render.take();

        h.machine.timer_tick(1, 5, &mut h.render);
        h.machine.timer_expired(1, &mut h.render);
        assert!(h.render.take().is_empty());
        assert_eq!(h.machine.screen(), ScreenState::Question);

        let input = h.pump().await;
        assert_eq!(input, ControllerInput::TimerTick { round: 2, remaining: 19 });
        assert_eq!(h.render.take(), vec![Cmd::Timer(19, 0.95)]);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_after_submission_is_dropped() {
        let mut h = Harness::new();
        h.server(ServerMessage::NewQuestion(question(1, 10)));
        h.select(11).unwrap();
        h.render.take();

        h.machine.timer_expired(1, &mut h.render);
        assert!(h.machine.is_submitting());
        assert!(h.render.take().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_question_during_result_cancels_auto_return() {
        let mut h = Harness::new();
        h.server(ServerMessage::NewQuestion(question(1, 10)));
        h.select(11).unwrap();
        h.server(ServerMessage::AnswerResult(correct_result()));

        tokio::time::advance(Duration::from_secs(1)).await;
        h.server(ServerMessage::NewQuestion(question(2, 10)));
        h.render.take();

        h.pump_for(Duration::from_millis(2500)).await;
        assert_eq!(h.machine.screen(), ScreenState::Question);
        assert!(!h.render.take().contains(&Cmd::Waiting));
    }

    #[tokio::test(start_paused = true)]
    async fn game_finished_is_terminal_and_releases_wake_lock() {
        let mut h = Harness::new();
        h.server(ServerMessage::NewQuestion(question(1, 10)));
        h.select(11).unwrap();
        h.server(ServerMessage::AnswerResult(correct_result()));
        h.render.take();

        let directives = h.server(ServerMessage::GameFinished(GameFinished {
            leaderboard: vec![LeaderboardEntry {
                user_id: 7,
                username: "ada".into(),
                score: 150,
                streak_max: 3,
            }],
        }));
        assert_eq!(directives, vec![Directive::ReleaseWakeLock]);
        assert_eq!(h.machine.screen(), ScreenState::Finished);
        assert!(h.machine.current_question().is_none());
        assert_eq!(
            h.render.take(),
            vec![Cmd::Finished(h.machine.stats(), 1)]
        );

        assert!(h.server(ServerMessage::NewQuestion(question(2, 10))).is_empty());
        assert!(h.server(ServerMessage::AnswerResult(correct_result())).is_empty());
        assert!(h.server(ServerMessage::GameFinished(GameFinished::default())).is_empty());
        assert_eq!(h.machine.screen(), ScreenState::Finished);
        assert!(h.render.take().is_empty());

        h.pump_for(Duration::from_secs(10)).await;
        assert_eq!(h.machine.screen(), ScreenState::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn kicked_ends_session_from_any_screen() {
        for setup in 0..3 {
            let mut h = Harness::new();
            if setup >= 1 {
                h.server(ServerMessage::NewQuestion(question(1, 10)));
            }
            if setup >= 2 {
                h.server(ServerMessage::GameFinished(GameFinished::default()));
            }
            h.render.take();

            let directives = h.server(ServerMessage::Kicked(None));
            assert_eq!(
                directives,
                vec![Directive::ReleaseWakeLock, Directive::EndSession]
            );
            assert!(h.machine.is_ended());
            assert!(!h.machine.timer().is_running());
            assert_eq!(h.render.take(), vec![Cmd::Notice(Notice::Kicked)]);

            assert!(h.server(ServerMessage::NewQuestion(question(3, 10))).is_empty());
            assert!(h.render.take().is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn jammer_overlays_without_touching_screen_state() {
        let mut h = Harness::new();
        h.server(ServerMessage::NewQuestion(question(1, 10)));
        h.render.take();

        h.server(ServerMessage::JammerAttack(JammerAttack {
            from_user_id: Some(3),
            duration: Some(500),
        }));
        assert!(h.machine.effects().is_active());
        assert_eq!(h.render.take(), vec![Cmd::Effect(true)]);

        h.select(11).unwrap();
        h.server(ServerMessage::AnswerResult(correct_result()));
        h.render.take();

        let seen = h.pump_for(Duration::from_millis(600)).await;
        assert!(seen
            .iter()
            .any(|i| matches!(i, ControllerInput::EffectElapsed { .. })));
        assert!(!h.machine.effects().is_active());
        assert_eq!(h.render.take(), vec![Cmd::Effect(false)]);
        assert_eq!(h.machine.screen(), ScreenState::Result);
        assert_eq!(h.machine.stats().score, 150);
    }

    #[tokio::test(start_paused = true)]
    async fn late_answer_result_only_updates_stats() {
        let mut h = Harness::new();
        h.server(ServerMessage::AnswerResult(correct_result()));

        assert_eq!(h.machine.screen(), ScreenState::Waiting);
        assert_eq!(h.machine.stats().score, 150);
        assert_eq!(h.render.take(), vec![Cmd::Stats(h.machine.stats())]);
    }

    #[tokio::test(start_paused = true)]
    async fn level_is_kept_when_result_omits_it() {
        let mut h = Harness::new();
        h.server(ServerMessage::NewQuestion(question(1, 10)));
        h.select(11).unwrap();
        h.server(ServerMessage::AnswerResult(AnswerResult {
            level: Some(5),
            leveled_up: Some(true),
            ..correct_result()
        }));
        assert_eq!(h.machine.stats().level, 5);

        h.server(ServerMessage::NewQuestion(question(2, 10)));
        h.select(21).unwrap();
        h.server(ServerMessage::AnswerResult(AnswerResult {
            correct: false,
            total_score: 150,
            streak: 0,
            ..eliminated_result()
        }));
        assert_eq!(h.machine.stats().level, 5);
        assert_eq!(h.machine.stats().streak, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_snapshot_restores_stats() {
        let mut h = Harness::new();
        h.server(ServerMessage::GameState(GameStateSnapshot {
            question: None,
            score: 320,
            streak: 4,
            status: Some("active".into()),
        }));
        assert_eq!(h.machine.stats().score, 320);
        assert_eq!(h.machine.stats().streak, 4);
        assert_eq!(h.machine.screen(), ScreenState::Waiting);

        let directives = h.server(ServerMessage::GameState(GameStateSnapshot {
            status: Some("finished".into()),
            ..GameStateSnapshot::default()
        }));
        assert_eq!(directives, vec![Directive::ReleaseWakeLock]);
        assert_eq!(h.machine.screen(), ScreenState::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_is_surfaced_without_transition() {
        let mut h = Harness::new();
        h.server(ServerMessage::NewQuestion(question(1, 10)));
        h.render.take();

        h.server(ServerMessage::Error {
            message: "Already answered".into(),
        });
        assert_eq!(h.machine.screen(), ScreenState::Question);
        assert_eq!(
            h.render.take(),
            vec![Cmd::Notice(Notice::ServerError("Already answered".into()))]
        );
    }
}
