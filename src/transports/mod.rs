//! Transport implementations for the game channel.
//!
//! Concrete [`Transport`](crate::Transport) implementations live behind
//! feature gates:
//!
//! | Feature                | Transport              |
//! |------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketTransport`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), neonmind_controller::ControllerError> {
//! use neonmind_controller::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:8000/ws/game/ABCD?user_id=7").await?;
//! ws.send(r#"{"event":"join_game","data":{"room_code":"ABCD"}}"#.to_string()).await?;
//!
//! if let Some(Ok(msg)) = ws.recv().await {
//!     println!("server said: {msg}");
//! }
//!
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::WebSocketTransport;
