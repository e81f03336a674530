//! Market Data Stream Connection
//!
//! Owns the WebSocket to the gateway's market data feed: handshake with
//! session tokens, subscription replay, heartbeat watchdog, and
//! automatic reconnection with exponential backoff.
//!
//! # Lifecycle
//!
//! `Disconnected -> Connecting -> Connected -> {Reconnecting ->
//! Connecting} -> Closed`. [`StreamConnection::close`] cancels the
//! background task, which performs the terminal `Closed` transition;
//! `Closed` is never left.
//!
//! # Dispatch
//!
//! The read loop decodes each frame once, filters tick items against
//! one router snapshot per frame, and hands relevant items to a
//! dedicated dispatch task over a bounded channel. A slow handler
//! backs up that channel and ticks are dropped with a warning; the
//! read loop itself never blocks on the handler.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::messages::{
    ConnectionRequest, OrderUpdate, StreamFrame, SubscribeMessage, TickItem,
};
use super::router::{SubscriptionKey, SubscriptionRouter};
use crate::config::{NeoConfig, StreamSettings};
use crate::retry::ExponentialBackoff;
use crate::session::SessionManager;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Subscription commands queued while the write half is busy or down.
const COMMAND_CAPACITY: usize = 64;

// =============================================================================
// Error Type
// =============================================================================

/// Errors raised by the stream connection.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The gateway rejected the credential handshake. Not retried:
    /// reconnecting with the same tokens would fail the same way.
    #[error("stream handshake failed: {reason}")]
    HandshakeFailed {
        /// What the gateway or the session gate reported.
        reason: String,
    },

    /// The connection dropped or went silent. Drives the reconnect
    /// path.
    #[error("stream connection lost: {reason}")]
    ConnectionLost {
        /// Why the connection was declared dead.
        reason: String,
    },

    /// A wire-contract breach on an otherwise healthy connection.
    #[error("stream protocol violation: {reason}")]
    ProtocolViolation {
        /// What was malformed.
        reason: String,
    },

    /// WebSocket transport failure.
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// Operation on a connection that has already shut down.
    #[error("stream connection closed")]
    Closed,
}

impl StreamError {
    /// Whether reconnecting cannot help.
    ///
    /// Only handshake rejections are fatal; everything else is a
    /// transient infrastructure failure the reconnect loop absorbs.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::HandshakeFailed { .. })
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of the stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamConnectionState {
    /// No socket open and no task running.
    Disconnected,
    /// Dialing and performing the credential handshake.
    Connecting,
    /// Handshake acknowledged; frames are flowing.
    Connected,
    /// Connection lost; waiting out the backoff before redialing.
    Reconnecting,
    /// Terminal. Entered via [`StreamConnection::close`], handshake
    /// rejection, or reconnect exhaustion.
    Closed,
}

impl StreamConnectionState {
    /// Lowercase name for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

// =============================================================================
// Handler Trait
// =============================================================================

/// Callbacks for stream events.
///
/// Data callbacks run on the dispatch task, one item at a time, in
/// arrival order. Lifecycle callbacks run on the connection task,
/// synchronously with the state transition that triggers them.
#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// A tick for a subscribed instrument.
    async fn on_tick(&self, tick: TickItem);

    /// An order lifecycle update. Never dropped, regardless of
    /// dispatch backpressure.
    async fn on_order_update(&self, update: OrderUpdate);

    /// The connection reached `Connected` (initial or re-established).
    async fn on_open(&self) {}

    /// The connection reached `Closed`.
    async fn on_close(&self) {}

    /// A connection error occurred. Fires for transient errors before
    /// each reconnect as well as for fatal ones.
    async fn on_error(&self, error: &StreamError) {
        let _ = error;
    }
}

/// Work forwarded from the read loop to the dispatch task.
enum DispatchEvent {
    Tick(TickItem),
    Order(Box<OrderUpdate>),
}

// =============================================================================
// Stream Connection
// =============================================================================

/// Managed WebSocket connection to the market data gateway.
///
/// Construct once, share behind an [`Arc`], and drive it with
/// [`run`](Self::run) on a background task:
///
/// ```ignore
/// let connection = Arc::new(StreamConnection::new(&config, session, router, handler));
/// let task = tokio::spawn(Arc::clone(&connection).run());
/// connection.subscribe(&[SubscriptionKey::new(ExchangeSegment::NseCm, "11536")]);
/// ```
pub struct StreamConnection {
    url: String,
    settings: StreamSettings,
    session: Arc<SessionManager>,
    router: Arc<SubscriptionRouter>,
    handler: Arc<dyn StreamHandler>,
    state: RwLock<StreamConnectionState>,
    cancel: CancellationToken,
    command_tx: mpsc::Sender<SubscribeMessage>,
    command_rx: Mutex<Option<mpsc::Receiver<SubscribeMessage>>>,
}

impl StreamConnection {
    /// Connection for the configured environment's stream endpoint.
    #[must_use]
    pub fn new(
        config: &NeoConfig,
        session: Arc<SessionManager>,
        router: Arc<SubscriptionRouter>,
        handler: Arc<dyn StreamHandler>,
    ) -> Self {
        Self::with_url(
            config.environment.stream_url().to_string(),
            config.stream.clone(),
            session,
            router,
            handler,
        )
    }

    /// Connection for an explicit stream URL.
    #[must_use]
    pub fn with_url(
        url: String,
        settings: StreamSettings,
        session: Arc<SessionManager>,
        router: Arc<SubscriptionRouter>,
        handler: Arc<dyn StreamHandler>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        Self {
            url,
            settings,
            session,
            router,
            handler,
            state: RwLock::new(StreamConnectionState::Disconnected),
            cancel: CancellationToken::new(),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StreamConnectionState {
        *self.state.read()
    }

    /// The router this connection filters ticks against.
    #[must_use]
    pub fn router(&self) -> Arc<SubscriptionRouter> {
        Arc::clone(&self.router)
    }

    /// Subscribe instruments, returning the updated subscription count.
    ///
    /// The router commit is synchronous and survives reconnects; the
    /// wire message is queued for the connection task and replayed
    /// from the router on every (re)connect. A connection that is
    /// currently down loses nothing. If the queue is full on a live
    /// connection, the gateway learns of the change only at the next
    /// replay, and the instrument's ticks stay absent until then.
    pub fn subscribe(&self, keys: &[SubscriptionKey]) -> usize {
        let count = self.router.subscribe(keys);
        self.queue_commands(SubscribeMessage::subscribe(keys));
        count
    }

    /// Unsubscribe instruments, returning the updated subscription
    /// count. Feed flags on `keys` are ignored, matching
    /// [`SubscriptionRouter::unsubscribe`].
    pub fn unsubscribe(&self, keys: &[SubscriptionKey]) -> usize {
        let count = self.router.unsubscribe(keys);
        self.queue_commands(SubscribeMessage::unsubscribe(keys));
        count
    }

    /// Request shutdown.
    ///
    /// Cancels the background task, which interrupts any in-flight
    /// backoff wait, performs the terminal `Closed` transition, and
    /// fires `on_close`. Idempotent.
    pub fn close(&self) {
        tracing::info!("stream close requested");
        self.cancel.cancel();
    }

    fn queue_commands(&self, messages: Vec<SubscribeMessage>) {
        for message in messages {
            if let Err(error) = self.command_tx.try_send(message) {
                // Router state is authoritative; the reconnect replay
                // resyncs the gateway.
                tracing::warn!(
                    error = %error,
                    "subscription command not queued, gateway out of sync until reconnect"
                );
            }
        }
    }

    /// Transition to `next`, logging the edge. Returns false when the
    /// state is terminal or already `next`.
    fn set_state(&self, next: StreamConnectionState) -> bool {
        let mut state = self.state.write();
        if *state == next || *state == StreamConnectionState::Closed {
            return false;
        }
        tracing::debug!(from = state.as_str(), to = next.as_str(), "stream state transition");
        *state = next;
        true
    }

    // =========================================================================
    // Connection Loop
    // =========================================================================

    /// Run the connection until cancelled or a fatal error occurs.
    ///
    /// Single-shot: the command queue receiver moves into the task, so
    /// a second call returns [`StreamError::Closed`].
    ///
    /// # Errors
    ///
    /// [`StreamError::HandshakeFailed`] when the gateway rejects the
    /// credential exchange, or [`StreamError::ConnectionLost`] once
    /// `max_reconnect_attempts` is exhausted. Cancellation via
    /// [`close`](Self::close) returns `Ok(())`.
    pub async fn run(self: Arc<Self>) -> Result<(), StreamError> {
        let Some(mut commands) = self.command_rx.lock().take() else {
            return Err(StreamError::Closed);
        };

        let (dispatch_tx, dispatch_rx) = mpsc::channel(self.settings.dispatch_capacity);
        let dispatch_task = tokio::spawn(dispatch_loop(Arc::clone(&self.handler), dispatch_rx));

        let result = self.connect_loop(&mut commands, &dispatch_tx).await;

        // Let queued events drain before the close callback.
        drop(dispatch_tx);
        let _ = dispatch_task.await;

        if self.set_state(StreamConnectionState::Closed) {
            self.handler.on_close().await;
        }

        result
    }

    async fn connect_loop(
        &self,
        commands: &mut mpsc::Receiver<SubscribeMessage>,
        dispatch_tx: &mpsc::Sender<DispatchEvent>,
    ) -> Result<(), StreamError> {
        let mut backoff = ExponentialBackoff::unbounded(&self.settings.reconnect);
        let mut attempts: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("stream cancelled");
                return Ok(());
            }

            self.set_state(StreamConnectionState::Connecting);

            match self.connect_and_run(commands, dispatch_tx).await {
                Ok(()) => {
                    tracing::info!("stream closed gracefully");
                    return Ok(());
                }
                Err(error) => {
                    tracing::warn!(error = %error, "stream connection error");
                    self.handler.on_error(&error).await;

                    if error.is_fatal() {
                        return Err(error);
                    }

                    // A connection that made it to Connected resets the
                    // schedule; checked before the Reconnecting edge.
                    if self.state() == StreamConnectionState::Connected {
                        backoff.reset();
                        attempts = 0;
                    }
                    self.set_state(StreamConnectionState::Reconnecting);

                    attempts += 1;
                    let max = self.settings.max_reconnect_attempts;
                    if max > 0 && attempts > max {
                        return Err(StreamError::ConnectionLost {
                            reason: format!("gave up after {max} reconnect attempts"),
                        });
                    }

                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(self.settings.reconnect.max_backoff);
                    tracing::info!(
                        attempt = attempts,
                        delay_ms = delay.as_millis(),
                        "reconnecting to stream"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("stream cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Dial, handshake, replay subscriptions, then pump frames until
    /// the connection dies or the task is cancelled.
    async fn connect_and_run(
        &self,
        commands: &mut mpsc::Receiver<SubscribeMessage>,
        dispatch_tx: &mpsc::Sender<DispatchEvent>,
    ) -> Result<(), StreamError> {
        // The handshake needs a live view session; failing the gate is
        // a credential problem, not a connectivity one.
        let credential = self
            .session
            .require_view()
            .map_err(|error| StreamError::HandshakeFailed {
                reason: error.to_string(),
            })?;
        let Some(token) = credential.view_token else {
            return Err(StreamError::HandshakeFailed {
                reason: "no view token held".to_string(),
            });
        };
        let Some(sid) = credential.base_session_id else {
            return Err(StreamError::HandshakeFailed {
                reason: "no session id held".to_string(),
            });
        };

        tracing::info!(url = %self.url, "connecting to market data stream");
        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.url).await?;
        let (mut write, mut read) = ws_stream.split();

        send_json(&mut write, &ConnectionRequest::new(token, sid)).await?;
        self.await_handshake_ack(&mut read, &mut write).await?;

        // Commands queued while down are superseded by the replay.
        while commands.try_recv().is_ok() {}

        if self.set_state(StreamConnectionState::Connected) {
            self.handler.on_open().await;
        }

        let keys = self.router.subscribed_keys();
        if !keys.is_empty() {
            tracing::info!(subscriptions = keys.len(), "replaying subscriptions");
            for message in SubscribeMessage::subscribe(&keys) {
                send_json(&mut write, &message).await?;
            }
        }

        self.read_loop(read, write, commands, dispatch_tx).await
    }

    /// Wait for the gateway to acknowledge the connection request.
    async fn await_handshake_ack(
        &self,
        read: &mut WsSource,
        write: &mut WsSink,
    ) -> Result<(), StreamError> {
        let deadline = tokio::time::Instant::now() + self.settings.idle_timeout;

        loop {
            let frame = tokio::time::timeout_at(deadline, read.next())
                .await
                .map_err(|_| StreamError::HandshakeFailed {
                    reason: "no acknowledgment before the idle timeout".to_string(),
                })?;

            match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<StreamFrame>(&text) {
                        Ok(StreamFrame::Ack(ack)) if ack.is_ok() => {
                            tracing::info!("stream handshake acknowledged");
                            return Ok(());
                        }
                        Ok(StreamFrame::Ack(ack)) => {
                            return Err(StreamError::HandshakeFailed {
                                reason: ack
                                    .msg
                                    .unwrap_or_else(|| "handshake rejected".to_string()),
                            });
                        }
                        Ok(StreamFrame::Error(error)) => {
                            return Err(StreamError::HandshakeFailed { reason: error.msg });
                        }
                        Ok(_) => {
                            tracing::debug!("ignoring frame before handshake ack");
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "undecodable frame during handshake");
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => write.send(Message::Pong(data)).await?,
                Some(Ok(Message::Close(_))) => {
                    return Err(StreamError::HandshakeFailed {
                        reason: "server closed during handshake".to_string(),
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => return Err(error.into()),
                None => {
                    return Err(StreamError::HandshakeFailed {
                        reason: "stream ended during handshake".to_string(),
                    });
                }
            }
        }
    }

    async fn read_loop(
        &self,
        mut read: WsSource,
        mut write: WsSink,
        commands: &mut mpsc::Receiver<SubscribeMessage>,
        dispatch_tx: &mpsc::Sender<DispatchEvent>,
    ) -> Result<(), StreamError> {
        let mut ping = tokio::time::interval(self.settings.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ping.reset();

        // Any inbound frame, data or keepalive, re-arms the watchdog.
        let idle = tokio::time::sleep(self.settings.idle_timeout);
        tokio::pin!(idle);

        let mut violations: u32 = 0;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("stream cancelled, closing socket");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                () = &mut idle => {
                    return Err(StreamError::ConnectionLost {
                        reason: format!(
                            "no frames for {}ms",
                            self.settings.idle_timeout.as_millis()
                        ),
                    });
                }
                _ = ping.tick() => {
                    write.send(Message::Ping(vec![].into())).await?;
                }
                command = commands.recv() => {
                    // The sender lives on self, so recv never yields None
                    // while this task runs.
                    if let Some(message) = command {
                        send_json(&mut write, &message).await?;
                    }
                }
                frame = read.next() => {
                    idle.as_mut()
                        .reset(tokio::time::Instant::now() + self.settings.idle_timeout);

                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.process_frame(&text, &mut violations, dispatch_tx).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("server sent close frame");
                            return Err(StreamError::ConnectionLost {
                                reason: "server closed the connection".to_string(),
                            });
                        }
                        Some(Ok(_)) => {}
                        Some(Err(error)) => return Err(error.into()),
                        None => {
                            return Err(StreamError::ConnectionLost {
                                reason: "stream ended".to_string(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Decode one frame and route it.
    ///
    /// Malformed frames are dropped; `protocol_violation_threshold`
    /// consecutive ones tear the connection down instead.
    async fn process_frame(
        &self,
        text: &str,
        violations: &mut u32,
        dispatch_tx: &mpsc::Sender<DispatchEvent>,
    ) -> Result<(), StreamError> {
        let frame = match serde_json::from_str::<StreamFrame>(text) {
            Ok(frame) => {
                *violations = 0;
                frame
            }
            Err(error) => {
                *violations += 1;
                tracing::warn!(
                    error = %error,
                    violations = *violations,
                    "dropping malformed frame"
                );
                if *violations >= self.settings.protocol_violation_threshold {
                    return Err(StreamError::ConnectionLost {
                        reason: format!("{violations} consecutive malformed frames"),
                    });
                }
                return Ok(());
            }
        };

        match frame {
            StreamFrame::Data(batch) => {
                // One snapshot per frame: every item in the batch is
                // filtered against the same subscription generation.
                let index = self.router.index_snapshot();
                let mut dropped = 0_usize;

                for tick in batch.data {
                    if !index.contains(&tick.routing_key()) {
                        continue;
                    }
                    match dispatch_tx.try_send(DispatchEvent::Tick(tick)) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => dropped += 1,
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            return Err(StreamError::ConnectionLost {
                                reason: "dispatch channel closed".to_string(),
                            });
                        }
                    }
                }

                if dropped > 0 {
                    tracing::warn!(dropped, "dispatch channel full, dropping ticks");
                }
            }
            StreamFrame::Order(update) => {
                // Order updates are never dropped; wait for capacity.
                if dispatch_tx
                    .send(DispatchEvent::Order(update))
                    .await
                    .is_err()
                {
                    return Err(StreamError::ConnectionLost {
                        reason: "dispatch channel closed".to_string(),
                    });
                }
            }
            StreamFrame::Heartbeat => {
                tracing::trace!("server heartbeat");
            }
            StreamFrame::Ack(ack) => {
                tracing::debug!(stat = %ack.stat, msg = ?ack.msg, "gateway acknowledgment");
            }
            StreamFrame::Error(error) => {
                tracing::error!(code = ?error.code, msg = %error.msg, "gateway error frame");
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("url", &self.url)
            .field("state", &self.state())
            .field("subscriptions", &self.router.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Free Functions
// =============================================================================

/// Drain handler events off the bounded channel.
async fn dispatch_loop(handler: Arc<dyn StreamHandler>, mut rx: mpsc::Receiver<DispatchEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            DispatchEvent::Tick(tick) => handler.on_tick(tick).await,
            DispatchEvent::Order(update) => handler.on_order_update(*update).await,
        }
    }
}

/// Serialize and send one outbound message.
async fn send_json<T: serde::Serialize>(write: &mut WsSink, value: &T) -> Result<(), StreamError> {
    let json =
        serde_json::to_string(value).map_err(|error| StreamError::ProtocolViolation {
            reason: format!("failed to encode outbound message: {error}"),
        })?;
    write.send(Message::Text(json.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ExchangeSegment;
    use crate::config::{ConsumerCredentials, Environment};
    use crate::transport::TransportClient;

    struct NoopHandler;

    #[async_trait]
    impl StreamHandler for NoopHandler {
        async fn on_tick(&self, _tick: TickItem) {}
        async fn on_order_update(&self, _update: OrderUpdate) {}
    }

    fn test_connection() -> Arc<StreamConnection> {
        let config = NeoConfig::new(
            ConsumerCredentials::new("key".to_string(), "secret".to_string()),
            Environment::Uat,
        );
        let transport = Arc::new(TransportClient::new(&config).unwrap());
        let session = Arc::new(SessionManager::new(&config, transport));
        Arc::new(StreamConnection::with_url(
            "ws://127.0.0.1:1".to_string(),
            config.stream,
            session,
            Arc::new(SubscriptionRouter::new()),
            Arc::new(NoopHandler),
        ))
    }

    #[test]
    fn fatal_classification() {
        assert!(StreamError::HandshakeFailed { reason: "rejected".into() }.is_fatal());
        assert!(!StreamError::ConnectionLost { reason: "idle".into() }.is_fatal());
        assert!(!StreamError::ProtocolViolation { reason: "bad".into() }.is_fatal());
        assert!(!StreamError::Closed.is_fatal());
    }

    #[test]
    fn transitions_skip_same_state_and_terminal() {
        let connection = test_connection();
        assert_eq!(connection.state(), StreamConnectionState::Disconnected);

        assert!(connection.set_state(StreamConnectionState::Connecting));
        assert!(!connection.set_state(StreamConnectionState::Connecting));

        assert!(connection.set_state(StreamConnectionState::Closed));
        // Closed is terminal.
        assert!(!connection.set_state(StreamConnectionState::Connecting));
        assert_eq!(connection.state(), StreamConnectionState::Closed);
    }

    #[test]
    fn subscribe_commits_to_router_without_a_running_task() {
        let connection = test_connection();
        let key = SubscriptionKey::new(ExchangeSegment::NseCm, "11536");

        assert_eq!(connection.subscribe(std::slice::from_ref(&key)), 1);
        assert!(connection.router().is_relevant("nse_cm|11536"));

        assert_eq!(connection.unsubscribe(&[key]), 0);
        assert!(!connection.router().is_relevant("nse_cm|11536"));
    }

    #[test]
    fn subscribe_survives_a_full_command_queue() {
        let connection = test_connection();

        // Nothing drains the queue; overflow must not block or panic.
        for i in 0..(COMMAND_CAPACITY + 8) {
            let key = SubscriptionKey::new(ExchangeSegment::NseCm, i.to_string());
            connection.subscribe(std::slice::from_ref(&key));
        }
        assert_eq!(connection.router().len(), COMMAND_CAPACITY + 8);
    }

    #[tokio::test]
    async fn run_is_single_shot() {
        let connection = test_connection();
        connection.close();

        // First run consumes the command receiver and exits on the
        // already-cancelled token.
        assert!(Arc::clone(&connection).run().await.is_ok());
        assert_eq!(connection.state(), StreamConnectionState::Closed);

        let second = Arc::clone(&connection).run().await;
        assert!(matches!(second, Err(StreamError::Closed)));
    }

    #[tokio::test]
    async fn handshake_gate_fails_without_a_session() {
        let connection = test_connection();
        let task = tokio::spawn(Arc::clone(&connection).run());

        let result = task.await.unwrap();
        match result {
            Err(StreamError::HandshakeFailed { reason }) => {
                assert!(reason.contains("unauthenticated"), "reason: {reason}");
            }
            other => panic!("expected handshake failure, got {other:?}"),
        }
        assert_eq!(connection.state(), StreamConnectionState::Closed);
    }
}
