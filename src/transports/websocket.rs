//! WebSocket transport built on `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] speaks the game channel over a WebSocket. Both
//! `ws://` and `wss://` URLs work; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! A transport created with [`connect`](WebSocketTransport::connect) remembers
//! its URL and re-establishes a dropped link on its own, backing off between
//! attempts. The drop itself is reported once as `Some(Err(_))` from
//! [`recv`](Transport::recv). A close frame from the server ends the channel
//! for good.
//!
//! # Feature gate
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), neonmind_controller::ControllerError> {
//! use neonmind_controller::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect("ws://localhost:8000/ws/game/ABCD?user_id=7").await?;
//!
//! if let Some(Ok(msg)) = transport.recv().await {
//!     println!("received: {msg}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::ControllerError;
use crate::transport::Transport;

/// Delay before the first reconnect attempt after a drop.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Upper bound for the doubling reconnect delay.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// The underlying WebSocket stream.
///
/// Public so callers can wrap an existing stream via
/// [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe. Cancelling it while a reconnect
/// is pending keeps the scheduled attempt time, so the next call resumes the
/// same backoff instead of starting over.
#[derive(Debug)]
pub struct WebSocketTransport {
    /// Set when the transport may reconnect on its own.
    url: Option<String>,
    stream: Option<WsStream>,
    closed: bool,
    initial_delay: Duration,
    max_delay: Duration,
    backoff: Duration,
    next_attempt: Option<Instant>,
}

impl WebSocketTransport {
    /// Connect to `url` and keep reconnecting to it after link drops.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Io`] if the URL is invalid or the first
    /// connection cannot be established. I/O error kinds are preserved; all
    /// other failures map to [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, ControllerError> {
        let stream = open(url).await?;
        tracing::info!(url = %url, "WebSocket connection established");
        Ok(Self::with_parts(Some(url.to_owned()), Some(stream)))
    }

    /// Same as [`connect`](Self::connect), failing with
    /// [`ControllerError::Timeout`] if the first connection takes longer than
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// [`ControllerError::Timeout`] on deadline, or anything
    /// [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: Duration,
    ) -> Result<Self, ControllerError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| ControllerError::Timeout)?
    }

    /// Wrap an already-established stream (custom TLS, proxies, headers).
    ///
    /// Such a transport has no URL and therefore never reconnects: a dropped
    /// link ends the channel.
    pub fn from_stream(stream: WsStream) -> Self {
        Self::with_parts(None, Some(stream))
    }

    /// Set the first and the maximum reconnect delay. The delay doubles after
    /// each failed attempt and resets once a connection succeeds.
    #[must_use]
    pub fn with_reconnect_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max.max(initial);
        self.backoff = initial;
        self
    }

    /// Returns `true` while a live stream is attached.
    pub fn is_linked(&self) -> bool {
        self.stream.is_some()
    }

    fn with_parts(url: Option<String>, stream: Option<WsStream>) -> Self {
        Self {
            url,
            stream,
            closed: false,
            initial_delay: DEFAULT_RECONNECT_DELAY,
            max_delay: DEFAULT_MAX_RECONNECT_DELAY,
            backoff: DEFAULT_RECONNECT_DELAY,
            next_attempt: None,
        }
    }

    /// Forget the current stream and schedule a reconnect.
    fn drop_link(&mut self) {
        self.stream = None;
        self.next_attempt = Some(Instant::now() + self.backoff);
    }

    /// One reconnect attempt. Returns `true` if a stream is attached afterwards.
    async fn try_reconnect(&mut self, url: &str) -> bool {
        match open(url).await {
            Ok(stream) => {
                tracing::info!(url = %url, "WebSocket connection re-established");
                self.stream = Some(stream);
                self.backoff = self.initial_delay;
                self.next_attempt = None;
                true
            }
            Err(e) => {
                tracing::warn!(url = %url, retry_in = ?self.backoff, "reconnect failed: {e}");
                self.next_attempt = Some(Instant::now() + self.backoff);
                self.backoff = (self.backoff * 2).min(self.max_delay);
                false
            }
        }
    }
}

async fn open(url: &str) -> Result<WsStream, ControllerError> {
    tracing::debug!(url = %url, "connecting to WebSocket server");
    let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
        let kind = match &e {
            tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
            _ => std::io::ErrorKind::Other,
        };
        ControllerError::Io(std::io::Error::new(kind, e))
    })?;
    Ok(stream)
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), ControllerError> {
        if self.closed {
            return Err(ControllerError::TransportClosed);
        }
        if self.stream.is_none() {
            if let Some(url) = self.url.clone() {
                self.try_reconnect(&url).await;
            }
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(ControllerError::TransportSend("link is down".into()));
        };
        if let Err(e) = stream.send(Message::Text(message.into())).await {
            self.drop_link();
            return Err(ControllerError::TransportSend(e.to_string()));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ControllerError>> {
        loop {
            if self.closed {
                return None;
            }

            let Some(stream) = self.stream.as_mut() else {
                let url = self.url.clone()?;
                if let Some(at) = self.next_attempt {
                    tokio::time::sleep_until(at).await;
                }
                self.try_reconnect(&url).await;
                continue;
            };

            let msg = match stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    self.drop_link();
                    return Some(Err(ControllerError::TransportReceive(e.to_string())));
                }
                None if self.url.is_some() => {
                    self.drop_link();
                    return Some(Err(ControllerError::TransportReceive(
                        "connection lost".into(),
                    )));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    self.stream = None;
                    self.url = None;
                    return None;
                }
                Message::Ping(_) => {
                    // tungstenite queues the pong itself.
                    tracing::debug!("received WebSocket ping");
                }
                Message::Pong(_) => {
                    tracing::debug!("received WebSocket pong (ignored)");
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), ControllerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.url = None;
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        stream
            .close(None)
            .await
            .map_err(|e| ControllerError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
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

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let result = WebSocketTransport::connect("not-a-valid-url").await;
        let err = result.unwrap_err();
        assert!(matches!(err, ControllerError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let result = WebSocketTransport::connect("ws://127.0.0.1:1").await;
        let err = result.unwrap_err();
        assert!(matches!(err, ControllerError::Io(_)));
    }

    // ── Mock-server helpers ──────────────────────────────────────────────

    use tokio::net::TcpListener;

    type ServerStream = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(ServerStream) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    // ── Mock-server tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn recv_receives_text_messages() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"event":"connected","data":{"user_id":7}}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text("second".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();

        let first = transport.recv().await.unwrap().unwrap();
        assert!(first.contains("\"connected\""));

        let second = transport.recv().await.unwrap().unwrap();
        assert_eq!(second, "second");
    }

    #[tokio::test]
    async fn close_frame_ends_the_channel_for_good() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert!(transport.recv().await.is_none());
        assert!(transport.recv().await.is_none(), "must not try to reconnect");
    }

    #[tokio::test]
    async fn recv_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("after_binary".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();

        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, "after_binary");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, ControllerError::TransportClosed));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Non-routable address.
        let result = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ControllerError::Timeout));
    }

    #[tokio::test]
    async fn from_stream_does_not_reconnect() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("from_stream_msg".into()))
                .await
                .unwrap();
            drop(ws);
        })
        .await;

        let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut transport = WebSocketTransport::from_stream(ws_stream);

        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, "from_stream_msg");

        // The link drop may surface as an error first, then the channel ends.
        let mut ended = false;
        for _ in 0..2 {
            if transport.recv().await.is_none() {
                ended = true;
                break;
            }
        }
        assert!(ended);
    }

    #[tokio::test]
    async fn send_round_trip() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(r#"{"event":"join_game","data":{"room_code":"ABCD"}}"#.to_string())
            .await
            .unwrap();

        let msg = transport.recv().await.unwrap().unwrap();
        assert!(msg.contains("join_game"));
    }

    #[tokio::test]
    async fn dropped_link_is_reported_then_recovered() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            // First connection: drop without a close handshake.
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            drop(ws);

            // Second connection: deliver a message, then close cleanly.
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text("welcome back".into())).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let mut transport = WebSocketTransport::connect(&url)
            .await
            .unwrap()
            .with_reconnect_delays(Duration::from_millis(10), Duration::from_millis(50));

        let dropped = transport.recv().await.unwrap();
        assert!(matches!(dropped, Err(ControllerError::TransportReceive(_))));
        assert!(!transport.is_linked());

        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, "welcome back");
        assert!(transport.is_linked());
    }
}
