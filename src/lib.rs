//! # NeonMind Controller
//!
//! Player-side controller for the NeonMind live trivia game.
//!
//! The crate runs on a participant's device: it keeps a persistent channel to
//! the authoritative game server, renders the current game phase through an
//! abstract [`RenderSink`], counts each question down on the local clock, and
//! recovers the session after the device was backgrounded.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement the [`Transport`] trait for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   [`WebSocketTransport`] with automatic reconnect
//! - **Single event loop**: channel events, user input and timer work are
//!   processed one at a time, in order, by [`GameController::run`]
//! - **Headless**: all presentation goes through [`RenderSink`], so the state
//!   machine runs unchanged in a terminal, a GUI or a test recorder
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use neonmind_controller::{
//!     ControllerConfig, GameController, NoWakeLock, Session, WebSocketTransport,
//! };
//!
//! let transport = WebSocketTransport::connect("ws://localhost:8000/ws/game/ABCD?user_id=7").await?;
//! let (mut controller, handle) = GameController::start(
//!     Session::new("ABCD", 7),
//!     transport,
//!     &mut NoWakeLock,
//!     my_render_sink,
//!     ControllerConfig::default(),
//! )
//! .await;
//!
//! let end = controller.run().await;
//! ```

pub mod config;
pub mod connection;
pub mod controller;
pub mod effects;
pub mod error;
pub mod event;
pub mod protocol;
pub mod render;
pub mod screen;
pub mod timer;
pub mod transport;
pub mod transports;
pub mod wake_lock;

pub use config::ControllerConfig;
pub use connection::{ConnectionManager, ConnectionState, Session};
pub use controller::{ControllerHandle, GameController, SessionEnd};
pub use error::{ControllerError, Result};
pub use event::{ChannelEvent, ControllerInput};
pub use protocol::{ClientMessage, ServerMessage};
pub use render::{Notice, RenderSink, ResultDetails, ResultOutcome};
pub use screen::{PlayerStats, ScreenState};
pub use transport::Transport;
pub use wake_lock::{NoWakeLock, WakeLockGuard, WakeLockProvider, WakeLockStatus};

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
