//! Error types for the NeonMind controller.

use thiserror::Error;

/// Errors that can occur while driving a controller session.
///
/// None of these are fatal to the session on their own: the component that
/// detects a failure logs it and degrades locally.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed and cannot be used again.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a channel message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The event channel has shut down, so nothing can be sent to the server.
    #[error("not connected to server")]
    NotConnected,

    /// The platform refused or does not offer the screen wake lock.
    #[error("wake lock unavailable: {0}")]
    WakeLockUnavailable(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;
