//! Transport abstraction for the game channel.
//!
//! The [`Transport`] trait is a bidirectional text message channel between
//! the controller and the game server. Every message is one JSON document, so
//! implementations handle framing themselves (WebSocket frames, an in-process
//! channel in tests, ...).
//!
//! # Connection Setup
//!
//! Connecting is not part of this trait: construct a connected transport
//! externally, then pass it to
//! [`GameController::start`](crate::controller::GameController::start).
//! A transport that loses its link may recover it on its own; it reports the
//! loss as `Some(Err(_))` from [`recv`](Transport::recv) and keeps going.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use neonmind_controller::error::ControllerError;
//! use neonmind_controller::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), ControllerError> {
//!         // Send the JSON text message
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, ControllerError>> {
//!         // Receive the next JSON text message
//!         // Return None once the channel is gone for good
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ControllerError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ControllerError;

/// A bidirectional text message transport for the game channel.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because it is polled
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling
/// it again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::TransportSend`] if the message could not be
    /// sent, or [`ControllerError::TransportClosed`] after
    /// [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), ControllerError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: the link dropped; the transport may recover it and
    ///   yield messages again on later calls
    /// - `None`: the channel is closed for good
    async fn recv(&mut self) -> Option<Result<String, ControllerError>>;

    /// Close the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// regardless.
    async fn close(&mut self) -> Result<(), ControllerError>;
}
