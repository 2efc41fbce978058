//! Session runtime.
//!
//! [`GameController`] wires the components of one session together and runs
//! the single event loop: channel events, user input and deferred timer work
//! all arrive as [`ControllerInput`]s and are handled one at a time, each to
//! completion before the next.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect(&url).await?;
//! let (mut controller, handle) = GameController::start(
//!     Session::new("ABCD", 7),
//!     transport,
//!     &mut NoWakeLock,
//!     MySink::default(),
//!     ControllerConfig::default(),
//! )
//! .await;
//!
//! // Hand `handle` to the UI; it calls `handle.select_answer(id)` on taps.
//! match controller.run().await {
//!     SessionEnd::Kicked => eprintln!("removed by the admin"),
//!     end => println!("session over: {end:?}"),
//! }
//! ```

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::connection::{ConnectionManager, ConnectionState, Session};
use crate::error::{ControllerError, Result};
use crate::event::{ChannelEvent, ControllerInput};
use crate::protocol::AnswerId;
use crate::render::{Notice, RenderSink};
use crate::screen::{Directive, PlayerStats, ScreenState, ScreenStateMachine};
use crate::transport::Transport;
use crate::wake_lock::{WakeLockGuard, WakeLockProvider, WakeLockStatus};

/// Why [`GameController::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The game finished and the channel then closed.
    Finished,
    /// An admin removed the player.
    Kicked,
    /// The channel closed before the game finished.
    ChannelClosed { reason: Option<String> },
    /// [`ControllerHandle::shutdown`] was called.
    Shutdown,
}

/// Cloneable handle the UI uses to feed user input into a running controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    inputs: mpsc::UnboundedSender<ControllerInput>,
}

impl ControllerHandle {
    /// The player tapped an answer.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NotConnected`] once the controller is gone.
    pub fn select_answer(&self, answer_id: AnswerId) -> Result<()> {
        self.push(ControllerInput::SelectAnswer(answer_id))
    }

    /// The app regained visibility or focus.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NotConnected`] once the controller is gone.
    pub fn foreground(&self) -> Result<()> {
        self.push(ControllerInput::Foreground)
    }

    /// Ask the controller to end the session.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NotConnected`] once the controller is gone.
    pub fn shutdown(&self) -> Result<()> {
        self.push(ControllerInput::Shutdown)
    }

    fn push(&self, input: ControllerInput) -> Result<()> {
        self.inputs
            .send(input)
            .map_err(|_| ControllerError::NotConnected)
    }
}

/// One player's controller session.
pub struct GameController<R: RenderSink> {
    connection: ConnectionManager,
    channel_events: mpsc::Receiver<ChannelEvent>,
    inputs_rx: mpsc::UnboundedReceiver<ControllerInput>,
    machine: ScreenStateMachine,
    wake_lock: WakeLockGuard,
    render: R,
}

impl<R: RenderSink> GameController<R> {
    /// Initialise a session: take the wake lock (best effort), connect and
    /// join the room, and show the waiting screen.
    pub async fn start<T, P>(
        session: Session,
        transport: T,
        wake_lock_provider: &mut P,
        mut render: R,
        config: ControllerConfig,
    ) -> (Self, ControllerHandle)
    where
        T: Transport,
        P: WakeLockProvider + ?Sized,
    {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();

        let mut wake_lock = WakeLockGuard::new();
        let revoked_tx = inputs_tx.clone();
        let status = wake_lock
            .acquire(wake_lock_provider, move || {
                let _ = revoked_tx.send(ControllerInput::WakeLockReleased);
            })
            .await;
        render.set_wake_lock_indicator(status.is_held());

        let (connection, channel_events) = ConnectionManager::connect(transport, session, &config);
        let machine = ScreenStateMachine::new(&config, inputs_tx.clone());
        render.show_waiting();

        let controller = Self {
            connection,
            channel_events,
            inputs_rx,
            machine,
            wake_lock,
            render,
        };
        (controller, ControllerHandle { inputs: inputs_tx })
    }

    /// Process inputs until the session ends.
    pub async fn run(&mut self) -> SessionEnd {
        loop {
            let input = tokio::select! {
                event = self.channel_events.recv() => match event {
                    Some(event) => ControllerInput::Channel(event),
                    None => ControllerInput::Channel(ChannelEvent::Closed {
                        reason: Some("event channel dropped".into()),
                    }),
                },
                Some(input) = self.inputs_rx.recv() => input,
            };
            if let Some(end) = self.dispatch(input).await {
                info!(?end, "session ended");
                return end;
            }
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn screen(&self) -> ScreenState {
        self.machine.screen()
    }

    pub fn stats(&self) -> PlayerStats {
        self.machine.stats()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.connection_state()
    }

    pub fn wake_lock_status(&self) -> WakeLockStatus {
        self.wake_lock.status()
    }

    pub fn render(&self) -> &R {
        &self.render
    }

    // ── Dispatch ────────────────────────────────────────────────────

    async fn dispatch(&mut self, input: ControllerInput) -> Option<SessionEnd> {
        match input {
            ControllerInput::Channel(ChannelEvent::Connected) => {
                debug!(state = ?self.connection.connection_state(), "game channel connected");
                None
            }
            ControllerInput::Channel(ChannelEvent::Disconnected { reason }) => {
                self.render.show_notice(&Notice::ConnectionLost(reason));
                None
            }
            ControllerInput::Channel(ChannelEvent::Closed { reason }) => {
                let finished = self.machine.screen() == ScreenState::Finished;
                self.teardown();
                Some(if finished {
                    SessionEnd::Finished
                } else {
                    SessionEnd::ChannelClosed { reason }
                })
            }
            ControllerInput::Foreground => {
                match self.connection.on_foreground() {
                    Ok(true) => debug!("rejoin requested"),
                    Ok(false) => {}
                    Err(e) => warn!("could not rejoin on foreground: {e}"),
                }
                None
            }
            ControllerInput::WakeLockReleased => {
                if self.wake_lock.mark_released_externally() {
                    self.render.set_wake_lock_indicator(false);
                }
                None
            }
            ControllerInput::Shutdown => {
                self.teardown();
                self.connection.shutdown().await;
                Some(SessionEnd::Shutdown)
            }
            other => {
                let directives = self.machine.handle(other, &mut self.render);
                self.apply(directives).await
            }
        }
    }

    async fn apply(&mut self, directives: Vec<Directive>) -> Option<SessionEnd> {
        for directive in directives {
            match directive {
                Directive::SubmitAnswer {
                    answer_id,
                    time_taken,
                } => {
                    if let Err(e) = self.connection.submit_answer(answer_id, time_taken) {
                        warn!(answer_id, "could not submit answer: {e}");
                    }
                }
                Directive::ReleaseWakeLock => self.release_wake_lock(),
                Directive::EndSession => {
                    self.connection.shutdown().await;
                    return Some(SessionEnd::Kicked);
                }
            }
        }
        None
    }

    fn release_wake_lock(&mut self) {
        if self.wake_lock.release() {
            self.render.set_wake_lock_indicator(false);
        }
    }

    /// Stop scheduled work and give back the wake lock.
    fn teardown(&mut self) {
        self.machine.shutdown();
        self.release_wake_lock();
    }
}

impl<R: RenderSink> std::fmt::Debug for GameController<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameController")
            .field("connection", &self.connection)
            .field("machine", &self.machine)
            .field("wake_lock", &self.wake_lock.status())
            .finish()
    }
}
