//! Game channel connection management.
//!
//! [`ConnectionManager`] is a thin handle that talks to a background
//! transport loop over an unbounded MPSC channel. The loop decodes server
//! messages into [`ChannelEvent`]s delivered on the bounded receiver returned
//! from [`ConnectionManager::connect`].
//!
//! The loop sends `join_game` as its first message. A failed send or receive
//! does not end the loop: it reports
//! [`Disconnected`](ChannelEvent::Disconnected) and keeps going, because the
//! transport may recover the link. When traffic resumes on a recovered link
//! the loop re-enters the room with `reconnect_game` before forwarding
//! anything. When the app comes back to the foreground while the link is
//! still down, [`on_foreground`](ConnectionManager::on_foreground) sends the
//! same message.
//!
//! Server messages are never dropped: when the event receiver falls behind,
//! the loop waits for capacity. Only the synthetic link notices are lossy.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect(&url).await?;
//! let session = Session::new("ABCD", 7);
//! let (connection, mut events) =
//!     ConnectionManager::connect(transport, session, &ControllerConfig::default());
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ChannelEvent::Server(msg) => { /* … */ }
//!         ChannelEvent::Closed { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::{ControllerError, Result};
use crate::event::ChannelEvent;
use crate::protocol::{AnswerId, ClientMessage, ServerMessage, UserId};
use crate::transport::Transport;

/// Identity of one controller session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub room_code: String,
    pub user_id: UserId,
}

impl Session {
    pub fn new(room_code: impl Into<String>, user_id: UserId) -> Self {
        Self {
            room_code: room_code.into(),
            user_id,
        }
    }
}

/// Link state as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connected = 1,
    /// `reconnect_game` was sent; waiting for traffic to resume.
    AwaitingRejoin = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::AwaitingRejoin,
            _ => Self::Disconnected,
        }
    }
}

/// State shared between the handle and the transport loop.
struct SharedState {
    link: AtomicU8,
    /// Cleared once the transport loop has exited.
    alive: AtomicBool,
}

impl SharedState {
    fn new() -> Self {
        Self {
            link: AtomicU8::new(ConnectionState::Connected as u8),
            alive: AtomicBool::new(true),
        }
    }

    fn link(&self) -> ConnectionState {
        ConnectionState::from_u8(self.link.load(Ordering::Acquire))
    }

    /// Store `state` and return the previous one.
    fn set_link(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.link.swap(state as u8, Ordering::AcqRel))
    }
}

/// Handle to the game channel of one session.
///
/// All send methods serialize a [`ClientMessage`] and queue it for the
/// transport loop; they return as soon as the message is queued.
pub struct ConnectionManager {
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    state: Arc<SharedState>,
    session: Session,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl ConnectionManager {
    /// Spawn the transport loop and return a handle plus the event receiver.
    ///
    /// The first event is always [`ChannelEvent::Connected`] and the first
    /// message sent is `join_game` for the session's room. The receiver
    /// yields events until [`ChannelEvent::Closed`], which is always last.
    #[must_use = "the event receiver must be used to receive channel events"]
    pub fn connect(
        transport: impl Transport,
        session: Session,
        config: &ControllerConfig,
    ) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(SharedState::new());

        // Queued before the loop starts so it goes out first.
        let _ = cmd_tx.send(ClientMessage::JoinGame {
            room_code: session.room_code.clone(),
        });

        let task = tokio::spawn(transport_loop(
            transport,
            session.room_code.clone(),
            cmd_rx,
            event_tx,
            Arc::clone(&state),
            shutdown_rx,
        ));

        info!(room = %session.room_code, user_id = session.user_id, "joining game");

        let manager = Self {
            cmd_tx,
            state,
            session,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (manager, event_rx)
    }

    /// Send the player's answer for the current question.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NotConnected`] once the channel is closed.
    pub fn submit_answer(&self, answer_id: AnswerId, time_taken: f64) -> Result<()> {
        self.send(ClientMessage::SubmitAnswer {
            room_code: self.session.room_code.clone(),
            answer_id,
            time_taken,
        })
    }

    /// The app regained visibility or focus.
    ///
    /// If the link dropped since it was last confirmed, re-enter the room with
    /// `reconnect_game` and return `true`. Does nothing while connected.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NotConnected`] once the channel is closed.
    pub fn on_foreground(&self) -> Result<bool> {
        match self.state.link() {
            ConnectionState::Connected => Ok(false),
            ConnectionState::Disconnected | ConnectionState::AwaitingRejoin => {
                info!(room = %self.session.room_code, "foregrounded after link loss, rejoining");
                self.send(ClientMessage::ReconnectGame {
                    room_code: self.session.room_code.clone(),
                })?;
                self.state.set_link(ConnectionState::AwaitingRejoin);
                Ok(true)
            }
        }
    }

    /// Close the transport and stop the background task.
    ///
    /// The event receiver yields [`ChannelEvent::Closed`] and then `None`.
    /// Calling this more than once is harmless.
    pub async fn shutdown(&mut self) {
        debug!("connection shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.alive.store(false, Ordering::Release);
        self.state.set_link(ConnectionState::Disconnected);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.link()
    }

    /// Returns `true` until the channel is closed for good.
    pub fn is_alive(&self) -> bool {
        self.state.alive.load(Ordering::Acquire)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn send(&self, msg: ClientMessage) -> Result<()> {
        if !self.is_alive() {
            return Err(ControllerError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| ControllerError::NotConnected)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("session", &self.session)
            .field("state", &self.connection_state())
            .field("alive", &self.is_alive())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        // No executor to drive a graceful close here; drop the loop outright.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

/// Background loop multiplexing outgoing commands, shutdown and incoming
/// traffic with `tokio::select!`.
///
/// Exits when the transport returns `None`, on shutdown, or when the
/// command channel closes.
async fn transport_loop(
    mut transport: impl Transport,
    room_code: String,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<ChannelEvent>,
    state: Arc<SharedState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("transport loop started");

    emit_event(&event_tx, ChannelEvent::Connected).await;

    loop {
        tokio::select! {
            // Outgoing first, so the queued `join_game` precedes any rejoin.
            biased;

            cmd = cmd_rx.recv() => {
                let Some(msg) = cmd else {
                    debug!("command channel closed, shutting down transport loop");
                    let _ = transport.close().await;
                    emit_closed(&event_tx, &state, Some("client shut down".into())).await;
                    break;
                };
                debug!(event = msg.name(), "sending client message");
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if let Err(e) = transport.send(json).await {
                            error!("transport send error: {e}");
                            emit_disconnected(&event_tx, &state, format!("transport send error: {e}")).await;
                        }
                    }
                    Err(e) => error!("failed to serialize {}: {e}", msg.name()),
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                emit_closed(&event_tx, &state, Some("client shut down".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        if state.link() != ConnectionState::Connected {
                            let previous = state.set_link(ConnectionState::Connected);
                            info!(?previous, "game channel traffic resumed");
                            // A foreground rejoin already went out on this link.
                            let rejoined = previous != ConnectionState::Disconnected
                                || rejoin(&mut transport, &room_code, &event_tx, &state).await;
                            if rejoined {
                                emit_event(&event_tx, ChannelEvent::Connected).await;
                            }
                        }
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => {
                                debug!(event = msg.name(), "server message");
                                if !forward_server(&event_tx, msg, &mut shutdown_rx).await {
                                    debug!("shutdown signal received while forwarding");
                                    let _ = transport.close().await;
                                    emit_closed(&event_tx, &state, Some("client shut down".into())).await;
                                    break;
                                }
                            }
                            Err(e) => warn!("failed to decode server message: {e} (raw: {text})"),
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(&event_tx, &state, format!("transport receive error: {e}")).await;
                    }
                    None => {
                        debug!("transport closed by server");
                        emit_closed(&event_tx, &state, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("transport loop exited");
}

/// Re-enter the room on a link the transport recovered by itself. Returns
/// `false` if the message could not be sent.
async fn rejoin(
    transport: &mut impl Transport,
    room_code: &str,
    event_tx: &mpsc::Sender<ChannelEvent>,
    state: &SharedState,
) -> bool {
    let msg = ClientMessage::ReconnectGame {
        room_code: room_code.to_owned(),
    };
    let json = match serde_json::to_string(&msg) {
        Ok(json) => json,
        Err(e) => {
            error!("failed to serialize {}: {e}", msg.name());
            return false;
        }
    };
    info!(room = %room_code, "link recovered, rejoining");
    match transport.send(json).await {
        Ok(()) => true,
        Err(e) => {
            error!("transport send error: {e}");
            emit_disconnected(event_tx, state, format!("transport send error: {e}")).await;
            false
        }
    }
}

/// Deliver a server message, waiting for channel capacity.
///
/// Returns `false` if shutdown was requested while waiting; the caller must
/// then stop without polling `shutdown_rx` again.
async fn forward_server(
    event_tx: &mpsc::Sender<ChannelEvent>,
    msg: ServerMessage,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> bool {
    tokio::select! {
        sent = event_tx.send(ChannelEvent::Server(msg)) => {
            if sent.is_err() {
                debug!("event channel closed, receiver dropped");
            }
            true
        }
        _ = shutdown_rx => false,
    }
}

/// Forward a link notice. A full channel drops it with a warning so the
/// transport loop never blocks on bookkeeping.
async fn emit_event(event_tx: &mpsc::Sender<ChannelEvent>, event: ChannelEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Report a link drop once per transition into `Disconnected`.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<ChannelEvent>,
    state: &SharedState,
    reason: String,
) {
    if state.set_link(ConnectionState::Disconnected) == ConnectionState::Disconnected {
        return;
    }
    warn!("game channel disconnected: {reason}");
    emit_event(
        event_tx,
        ChannelEvent::Disconnected {
            reason: Some(reason),
        },
    )
    .await;
}

/// Emit the final [`Closed`](ChannelEvent::Closed) event.
///
/// Awaits channel capacity instead of dropping: `Closed` is always the last
/// event and must arrive.
async fn emit_closed(
    event_tx: &mpsc::Sender<ChannelEvent>,
    state: &SharedState,
    reason: Option<String>,
) {
    state.alive.store(false, Ordering::Release);
    state.set_link(ConnectionState::Disconnected);
    if event_tx.send(ChannelEvent::Closed { reason }).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    type Incoming = Option<std::result::Result<String, ControllerError>>;

    /// Records sent messages and replays scripted responses.
    struct MockTransport {
        incoming: VecDeque<Incoming>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(incoming: Vec<Incoming>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), ControllerError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Incoming {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // Script exhausted; stay open until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), ControllerError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn session() -> Session {
        Session::new("ABCD", 7)
    }

    fn connected_json() -> String {
        serde_json::to_string(&ServerMessage::Connected { user_id: 7 }).unwrap()
    }

    fn sent_messages(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
        sent.lock()
            .unwrap()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn connect_sends_join_game_first() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut connection, mut events) =
            ConnectionManager::connect(transport, session(), &ControllerConfig::default());

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        tokio::task::yield_now().await;

        let messages = sent_messages(&sent);
        assert_eq!(
            messages.first(),
            Some(&ClientMessage::JoinGame {
                room_code: "ABCD".into()
            })
        );

        connection.shutdown().await;
    }

    #[tokio::test]
    async fn server_messages_are_decoded() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(connected_json()))]);
        let (mut connection, mut events) =
            ConnectionManager::connect(transport, session(), &ControllerConfig::default());

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Server(ServerMessage::Connected { user_id: 7 })
        );

        connection.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_message_is_skipped() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok("not json".into())),
            Some(Ok(r#"{"event":"no_such_event","data":{}}"#.into())),
            Some(Ok(connected_json())),
        ]);
        let (mut connection, mut events) =
            ConnectionManager::connect(transport, session(), &ControllerConfig::default());

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Server(ServerMessage::Connected { user_id: 7 })
        );

        connection.shutdown().await;
    }

    #[tokio::test]
    async fn submit_answer_sends_room_and_timing() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut connection, mut events) =
            ConnectionManager::connect(transport, session(), &ControllerConfig::default());
        let _ = events.recv().await;

        connection.submit_answer(42, 2.5).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let messages = sent_messages(&sent);
        assert_eq!(
            messages.last(),
            Some(&ClientMessage::SubmitAnswer {
                room_code: "ABCD".into(),
                answer_id: 42,
                time_taken: 2.5,
            })
        );

        connection.shutdown().await;
    }

    #[tokio::test]
    async fn receive_error_reports_disconnect_and_keeps_running() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Err(ControllerError::TransportReceive("reset".into()))),
            Some(Err(ControllerError::TransportReceive("still down".into()))),
            Some(Ok(connected_json())),
        ]);
        let (mut connection, mut events) =
            ConnectionManager::connect(transport, session(), &ControllerConfig::default());

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        let event = events.recv().await.unwrap();
        assert!(
            matches!(event, ChannelEvent::Disconnected { reason: Some(ref r) } if r.contains("reset")),
            "got {event:?}"
        );
        // Second error in a row is not reported again; traffic resumes.
        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Server(ServerMessage::Connected { user_id: 7 })
        );
        assert!(connection.is_alive());
        assert_eq!(connection.connection_state(), ConnectionState::Connected);

        connection.shutdown().await;
    }

    #[tokio::test]
    async fn foreground_after_drop_sends_reconnect() {
        let (transport, sent, _closed) = MockTransport::new(vec![Some(Err(
            ControllerError::TransportReceive("reset".into()),
        ))]);
        let (mut connection, mut events) =
            ConnectionManager::connect(transport, session(), &ControllerConfig::default());

        assert!(!connection.on_foreground().unwrap(), "connected: no-op");

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // Disconnected
        assert_eq!(connection.connection_state(), ConnectionState::Disconnected);

        assert!(connection.on_foreground().unwrap());
        assert_eq!(
            connection.connection_state(),
            ConnectionState::AwaitingRejoin
        );
        tokio::time::sleep(Duration::from_millis(20)).await;

        let messages = sent_messages(&sent);
        assert_eq!(
            messages.last(),
            Some(&ClientMessage::ReconnectGame {
                room_code: "ABCD".into()
            })
        );

        connection.shutdown().await;
    }

    #[tokio::test]
    async fn server_close_emits_closed_and_stops_sending() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let (connection, mut events) =
            ConnectionManager::connect(transport, session(), &ControllerConfig::default());

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Closed { reason: None }
        );
        assert!(events.recv().await.is_none());

        assert!(!connection.is_alive());
        assert!(matches!(
            connection.submit_answer(1, 1.0),
            Err(ControllerError::NotConnected)
        ));
        assert!(matches!(
            connection.on_foreground(),
            Err(ControllerError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn shutdown_closes_transport_and_emits_closed() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let (mut connection, mut events) =
            ConnectionManager::connect(transport, session(), &ControllerConfig::default());
        let _ = events.recv().await;

        connection.shutdown().await;
        assert!(closed.load(Ordering::Relaxed));
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Closed {
                reason: Some("client shut down".into())
            }
        );
        assert!(events.recv().await.is_none());

        connection.shutdown().await; // second call is harmless
    }

    #[tokio::test]
    async fn full_event_channel_applies_backpressure() {
        let incoming: Vec<Incoming> = (0..10).map(|_| Some(Ok(connected_json()))).chain([None]).collect();
        let (transport, _sent, _closed) = MockTransport::new(incoming);
        let config = ControllerConfig::default().with_event_channel_capacity(2);
        let (_connection, mut events) = ConnectionManager::connect(transport, session(), &config);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut received = Vec::new();
        while let Some(event) = events.recv().await {
            received.push(event);
        }
        let server = received
            .iter()
            .filter(|e| matches!(e, ChannelEvent::Server(_)))
            .count();
        assert_eq!(server, 10, "server messages must never be dropped");
        assert_eq!(received.first(), Some(&ChannelEvent::Connected));
        assert_eq!(
            received.last(),
            Some(&ChannelEvent::Closed { reason: None })
        );
    }

    #[tokio::test]
    async fn shutdown_is_observed_while_waiting_for_capacity() {
        let incoming: Vec<Incoming> = (0..5).map(|_| Some(Ok(connected_json()))).collect();
        let (transport, _sent, closed) = MockTransport::new(incoming);
        let config = ControllerConfig::default()
            .with_event_channel_capacity(1)
            .with_shutdown_timeout(Duration::from_millis(50));
        let (mut connection, _events) = ConnectionManager::connect(transport, session(), &config);

        // Nobody reads: the loop is parked on a full channel.
        tokio::time::sleep(Duration::from_millis(20)).await;
        connection.shutdown().await;

        assert!(closed.load(Ordering::Relaxed), "transport closed gracefully");
        assert!(!connection.is_alive());
    }

    #[tokio::test]
    async fn recovered_link_rejoins_before_forwarding() {
        let (transport, sent, _closed) = MockTransport::new(vec![
            Some(Err(ControllerError::TransportReceive("reset".into()))),
            Some(Ok(connected_json())),
        ]);
        let (mut connection, mut events) =
            ConnectionManager::connect(transport, session(), &ControllerConfig::default());

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        assert!(matches!(
            events.recv().await.unwrap(),
            ChannelEvent::Disconnected { .. }
        ));
        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Server(ServerMessage::Connected { user_id: 7 })
        );

        let messages = sent_messages(&sent);
        assert_eq!(
            messages,
            vec![
                ClientMessage::JoinGame {
                    room_code: "ABCD".into()
                },
                ClientMessage::ReconnectGame {
                    room_code: "ABCD".into()
                },
            ]
        );
        assert!(!connection.on_foreground().unwrap(), "already back in the room");

        connection.shutdown().await;
    }

    /// Hangs forever in `close()` so the shutdown timeout path runs.
    struct HangingCloseTransport {
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), ControllerError> {
            Ok(())
        }

        async fn recv(&mut self) -> Incoming {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), ControllerError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_transport() {
        let dropped = Arc::new(AtomicBool::new(false));
        let transport = HangingCloseTransport {
            dropped: Arc::clone(&dropped),
        };
        let config = ControllerConfig::default().with_shutdown_timeout(Duration::from_millis(20));
        let (mut connection, mut events) = ConnectionManager::connect(transport, session(), &config);
        let _ = events.recv().await;

        connection.shutdown().await;

        assert!(dropped.load(Ordering::Acquire));
        assert!(!connection.is_alive());
    }

    #[tokio::test]
    async fn drop_without_shutdown_ends_event_stream() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (connection, mut events) =
            ConnectionManager::connect(transport, session(), &ControllerConfig::default());
        let _ = events.recv().await;

        drop(connection);
        while events.recv().await.is_some() {}
    }
}
