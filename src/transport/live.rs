//! Persistent GraphQL-over-WebSocket connection.
//!
//! One socket carries every subscription. The connection task owns the
//! socket; callers talk to it through an unbounded command channel, and each
//! subscription gets its own event channel wrapped in a
//! [`SubscriptionHandle`].
//!
//! # Lifecycle
//!
//! - Lazy by default: the task starts on the first [`LiveConnection::subscribe`]
//! - Every (re)connect must get from TCP connect to `connection_ack` within
//!   [`LiveConfig::handshake_timeout`]
//! - On reconnect, every active subscription is started again under the
//!   same id
//! - Reconnect delay doubles from [`INITIAL_BACKOFF`] up to [`MAX_BACKOFF`];
//!   shutdown interrupts the wait
//! - With reconnect disabled, a lost connection fails every active
//!   subscription and ends the task

// Rust guideline compliant 2026-02

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use super::protocol::{ClientFrame, ServerFrame, WsProtocol};
use super::{LiveTransport, SubscriptionEvent, SubscriptionHandle, SubscriptionId, TransportError};
use crate::constants::{HANDSHAKE_TIMEOUT, INITIAL_BACKOFF, MAX_BACKOFF};
use crate::graphql::GraphQLRequest;
use crate::ws::{self, Inbound, SocketSink, SocketStream};

/// Settings for a [`LiveConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Wire dialect.
    pub protocol: WsProtocol,
    /// Reconnect after the socket drops.
    pub reconnect: bool,
    /// Defer connecting until the first subscription.
    pub lazy: bool,
    /// Payload of `connection_init`.
    pub connection_params: Option<Value>,
    /// Deadline for connect, upgrade and `connection_ack`.
    pub handshake_timeout: Duration,
}

impl LiveConfig {
    /// Defaults for `url`: legacy dialect, reconnecting, lazy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocol: WsProtocol::GraphqlWs,
            reconnect: true,
            lazy: true,
            connection_params: None,
            handshake_timeout: HANDSHAKE_TIMEOUT,
        }
    }
}

/// Shared subscription socket.
#[derive(Debug)]
pub struct LiveConnection {
    config: LiveConfig,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    next_id: AtomicU64,
    shutdown: Arc<AtomicBool>,
}

#[derive(Debug)]
enum Command {
    Subscribe {
        id: SubscriptionId,
        request: GraphQLRequest,
        events: mpsc::UnboundedSender<SubscriptionEvent>,
    },
    Unsubscribe {
        id: SubscriptionId,
    },
    Shutdown,
}

#[derive(Debug)]
struct ActiveSubscription {
    request: GraphQLRequest,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
}

type Subscriptions = HashMap<SubscriptionId, ActiveSubscription>;

impl LiveConnection {
    /// Create the connection. Unless `config.lazy` is set, the socket is
    /// opened right away (this needs a running Tokio runtime).
    pub fn new(config: LiveConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let connection = Self {
            config,
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            next_id: AtomicU64::new(1),
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        if !connection.config.lazy {
            connection.start();
        }
        connection
    }

    /// Whether the connection task has been spawned.
    pub fn is_started(&self) -> bool {
        self.command_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Spawn the connection task if it isn't running yet.
    ///
    /// Returns `false` when no Tokio runtime is available.
    pub fn start(&self) -> bool {
        let mut slot = self.command_rx.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            return true;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::error!("[Live] Cannot start connection outside a Tokio runtime");
            return false;
        };
        if let Some(command_rx) = slot.take() {
            runtime.spawn(run_connection_loop(
                self.config.clone(),
                Arc::clone(&self.shutdown),
                command_rx,
            ));
        }
        true
    }

    /// Stop the connection task and every subscription on it.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(Command::Shutdown);
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl LiveTransport for LiveConnection {
    fn subscribe(&self, request: GraphQLRequest) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if !self.start() {
            return SubscriptionHandle::failed(
                id,
                TransportError::Connection("no async runtime".to_string()),
            );
        }

        let (events, events_rx) = mpsc::unbounded_channel();
        if let Err(mpsc::error::SendError(command)) =
            self.command_tx.send(Command::Subscribe { id, request, events })
        {
            if let Command::Subscribe { events, .. } = command {
                let _ = events.send(SubscriptionEvent::Error(TransportError::Closed));
            }
            return SubscriptionHandle::new(id, events_rx, || {});
        }

        let command_tx = self.command_tx.clone();
        SubscriptionHandle::new(id, events_rx, move || {
            let _ = command_tx.send(Command::Unsubscribe { id });
        })
    }
}

/// Exponential reconnect delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Backoff {
    current: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            current: INITIAL_BACKOFF,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX_BACKOFF);
        delay
    }

    fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

/// Result of the inner message loop.
enum ConnectionLoopExit {
    /// Shutdown was requested.
    Shutdown,
    /// Connection was lost.
    Disconnected(String),
}

async fn run_connection_loop(
    config: LiveConfig,
    shutdown: Arc<AtomicBool>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut backoff = Backoff::new();
    // Survives reconnects so every subscription can be started again.
    let mut subscriptions = Subscriptions::new();

    loop {
        if shutdown.load(Ordering::SeqCst) || drain_commands(&mut command_rx, &mut subscriptions) {
            log::info!("[Live] Shutdown requested, exiting connection loop");
            return;
        }

        log::info!("[Live] Connecting to {} ({})", config.url, config.protocol);

        let reason = match open_session(&config).await {
            Ok((mut writer, mut reader)) => {
                log::info!("[Live] Connection acknowledged");
                backoff.reset();

                for (id, active) in &subscriptions {
                    if let Err(e) = send_frame(
                        &mut writer,
                        config.protocol,
                        &ClientFrame::Subscribe {
                            id: id.to_string(),
                            request: active.request.clone(),
                        },
                    )
                    .await
                    {
                        log::error!("[Live] Failed to restart subscription {}: {}", id, e);
                    } else {
                        log::debug!("[Live] Restarted subscription {}", id);
                    }
                }

                match run_message_loop(
                    &config,
                    &shutdown,
                    &mut subscriptions,
                    &mut writer,
                    &mut reader,
                    &mut command_rx,
                )
                .await
                {
                    ConnectionLoopExit::Shutdown => return,
                    ConnectionLoopExit::Disconnected(reason) => reason,
                }
            }
            Err(e) => format!("{e:#}"),
        };

        if !config.reconnect {
            log::warn!("[Live] Connection lost ({}), reconnect disabled", reason);
            drain_commands(&mut command_rx, &mut subscriptions);
            fail_all(&mut subscriptions, &TransportError::Connection(reason));
            return;
        }

        let delay = backoff.next_delay();
        log::warn!(
            "[Live] Connection lost ({}), reconnecting in {}s",
            reason,
            delay.as_secs()
        );
        if wait_for_retry(delay, &mut command_rx, &mut subscriptions).await {
            log::info!("[Live] Shutdown requested during backoff");
            return;
        }
    }
}

/// Sleep out the backoff while still applying commands. Returns `true` on
/// shutdown.
async fn wait_for_retry(
    delay: Duration,
    command_rx: &mut mpsc::UnboundedReceiver<Command>,
    subscriptions: &mut Subscriptions,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return false,
            command = command_rx.recv() => match command {
                Some(Command::Subscribe { id, request, events }) => {
                    subscriptions.insert(id, ActiveSubscription { request, events });
                }
                Some(Command::Unsubscribe { id }) => {
                    subscriptions.remove(&id);
                }
                Some(Command::Shutdown) | None => return true,
            },
        }
    }
}

/// Apply commands queued while disconnected. Returns `true` on shutdown.
fn drain_commands(
    command_rx: &mut mpsc::UnboundedReceiver<Command>,
    subscriptions: &mut Subscriptions,
) -> bool {
    while let Ok(command) = command_rx.try_recv() {
        match command {
            Command::Subscribe { id, request, events } => {
                subscriptions.insert(id, ActiveSubscription { request, events });
            }
            Command::Unsubscribe { id } => {
                subscriptions.remove(&id);
            }
            Command::Shutdown => return true,
        }
    }
    false
}

fn fail_all(subscriptions: &mut Subscriptions, error: &TransportError) {
    for (id, active) in subscriptions.drain() {
        log::debug!("[Live] Failing subscription {}", id);
        let _ = active.events.send(SubscriptionEvent::Error(error.clone()));
    }
}

/// Connect, send `connection_init` and wait for the ack, all within
/// `config.handshake_timeout`.
async fn open_session(config: &LiveConfig) -> anyhow::Result<(SocketSink, SocketStream)> {
    match tokio::time::timeout(config.handshake_timeout, handshake(config)).await {
        Ok(session) => session,
        Err(_elapsed) => anyhow::bail!(
            "handshake did not finish within {}ms",
            config.handshake_timeout.as_millis()
        ),
    }
}

async fn handshake(config: &LiveConfig) -> anyhow::Result<(SocketSink, SocketStream)> {
    let (mut writer, mut reader) = ws::connect(&config.url, config.protocol.subprotocol()).await?;
    send_frame(
        &mut writer,
        config.protocol,
        &ClientFrame::ConnectionInit {
            payload: config.connection_params.clone(),
        },
    )
    .await?;
    wait_for_ack(config.protocol, &mut writer, &mut reader).await?;
    Ok((writer, reader))
}

async fn wait_for_ack(
    protocol: WsProtocol,
    writer: &mut SocketSink,
    reader: &mut SocketStream,
) -> anyhow::Result<()> {
    while let Some(message) = reader.recv().await {
        match message? {
            Inbound::Text(text) => match protocol.decode(&text) {
                Ok(ServerFrame::ConnectionAck) => return Ok(()),
                Ok(ServerFrame::ConnectionError(payload)) => {
                    anyhow::bail!("server refused connection: {payload}")
                }
                Ok(ServerFrame::Ping { payload }) => {
                    send_frame(writer, protocol, &ClientFrame::Pong { payload }).await?;
                }
                Ok(other) => log::trace!("[Live] Ignoring {:?} before ack", other),
                Err(e) => log::warn!("[Live] {}", e),
            },
            Inbound::Closed { code, reason } => {
                anyhow::bail!("closed before ack (code {code}: {reason})")
            }
        }
    }
    anyhow::bail!("stream ended before ack")
}

async fn send_frame(
    writer: &mut SocketSink,
    protocol: WsProtocol,
    frame: &ClientFrame,
) -> anyhow::Result<()> {
    match protocol.encode(frame) {
        Some(text) => writer.send_text(text).await,
        None => Ok(()),
    }
}

/// Inner loop for one acknowledged socket.
async fn run_message_loop(
    config: &LiveConfig,
    shutdown: &AtomicBool,
    subscriptions: &mut Subscriptions,
    writer: &mut SocketSink,
    reader: &mut SocketStream,
    command_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> ConnectionLoopExit {
    let protocol = config.protocol;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            close_session(protocol, writer).await;
            return ConnectionLoopExit::Shutdown;
        }

        tokio::select! {
            message = reader.recv() => {
                match message {
                    Some(Ok(Inbound::Text(text))) => {
                        let handled =
                            handle_text_message(protocol, &text, subscriptions, writer).await;
                        if let Err(reason) = handled {
                            return ConnectionLoopExit::Disconnected(reason);
                        }
                    }
                    Some(Ok(Inbound::Closed { code, reason })) => {
                        log::info!("[Live] Connection closed by server ({}: {})", code, reason);
                        let reason = format!("closed by server ({code})");
                        return ConnectionLoopExit::Disconnected(reason);
                    }
                    Some(Err(e)) => {
                        return ConnectionLoopExit::Disconnected(format!("{e:#}"));
                    }
                    None => {
                        return ConnectionLoopExit::Disconnected("stream ended".to_string());
                    }
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(Command::Subscribe { id, request, events }) => {
                        let frame = ClientFrame::Subscribe {
                            id: id.to_string(),
                            request: request.clone(),
                        };
                        subscriptions.insert(id, ActiveSubscription { request, events });
                        if let Err(e) = send_frame(writer, protocol, &frame).await {
                            return ConnectionLoopExit::Disconnected(format!("{e:#}"));
                        }
                        log::debug!("[Live] Started subscription {}", id);
                    }
                    Some(Command::Unsubscribe { id }) => {
                        if subscriptions.remove(&id).is_some() {
                            log::debug!("[Live] Stopping subscription {}", id);
                            let stop = ClientFrame::Stop { id: id.to_string() };
                            if let Err(e) = send_frame(writer, protocol, &stop).await {
                                return ConnectionLoopExit::Disconnected(format!("{e:#}"));
                            }
                        }
                    }
                    Some(Command::Shutdown) | None => {
                        log::info!("[Live] Shutdown requested, closing connection");
                        close_session(protocol, writer).await;
                        return ConnectionLoopExit::Shutdown;
                    }
                }
            }
        }
    }
}

async fn close_session(protocol: WsProtocol, writer: &mut SocketSink) {
    let _ = send_frame(writer, protocol, &ClientFrame::Terminate).await;
    let _ = writer.close().await;
}

/// Route one server frame. `Err` means the socket must be dropped.
async fn handle_text_message(
    protocol: WsProtocol,
    text: &str,
    subscriptions: &mut Subscriptions,
    writer: &mut SocketSink,
) -> Result<(), String> {
    let frame = match protocol.decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("[Live] {}: {}", e, text.chars().take(100).collect::<String>());
            return Ok(());
        }
    };

    match frame {
        ServerFrame::Next { id, payload } => {
            let Some(id) = parse_id(&id) else {
                log::debug!("[Live] Event for unknown subscription {}", id);
                return Ok(());
            };
            let delivered = subscriptions
                .get(&id)
                .map(|active| active.events.send(SubscriptionEvent::Next(payload)).is_ok());
            match delivered {
                Some(true) => {}
                Some(false) => {
                    // consumer is gone
                    subscriptions.remove(&id);
                    send_frame(writer, protocol, &ClientFrame::Stop { id: id.to_string() })
                        .await
                        .map_err(|e| format!("{e:#}"))?;
                }
                None => log::debug!("[Live] Event for inactive subscription {}", id),
            }
        }
        ServerFrame::Error { id, payload } => {
            if let Some(active) = parse_id(&id).and_then(|id| subscriptions.remove(&id)) {
                log::warn!("[Live] Subscription {} failed: {}", id, payload);
                let _ = active
                    .events
                    .send(SubscriptionEvent::Error(TransportError::Server(payload)));
            }
        }
        ServerFrame::Complete { id } => {
            if let Some(active) = parse_id(&id).and_then(|id| subscriptions.remove(&id)) {
                log::debug!("[Live] Subscription {} completed", id);
                let _ = active.events.send(SubscriptionEvent::Complete);
            }
        }
        ServerFrame::Ping { payload } => {
            send_frame(writer, protocol, &ClientFrame::Pong { payload })
                .await
                .map_err(|e| format!("{e:#}"))?;
        }
        ServerFrame::ConnectionError(payload) => {
            return Err(format!("connection error: {payload}"));
        }
        ServerFrame::KeepAlive | ServerFrame::Pong | ServerFrame::ConnectionAck => {}
        ServerFrame::Unknown(kind) => log::debug!("[Live] Ignoring '{}' frame", kind),
    }
    Ok(())
}

fn parse_id(id: &str) -> Option<SubscriptionId> {
    id.parse().ok().map(SubscriptionId)
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt;

    use super::super::SubscriptionError;
    use super::*;

    fn games_request() -> GraphQLRequest {
        GraphQLRequest {
            query: "subscription { games { id } }".into(),
            variables: crate::graphql::Variables::new(),
            operation_name: None,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new();
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);
        backoff.reset();
        assert_eq!(backoff.next_delay(), INITIAL_BACKOFF);
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42"), Some(SubscriptionId(42)));
        assert_eq!(parse_id("abc"), None);
    }

    #[test]
    fn test_drain_commands_tracks_subscriptions() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (events, _events_rx) = mpsc::unbounded_channel();
        for id in [1, 2] {
            let command = Command::Subscribe {
                id: SubscriptionId(id),
                request: games_request(),
                events: events.clone(),
            };
            tx.send(command).unwrap();
        }
        tx.send(Command::Unsubscribe { id: SubscriptionId(1) }).unwrap();

        let mut subscriptions = Subscriptions::new();
        assert!(!drain_commands(&mut rx, &mut subscriptions));
        let ids: Vec<_> = subscriptions.keys().copied().collect();
        assert_eq!(ids, vec![SubscriptionId(2)]);

        tx.send(Command::Shutdown).unwrap();
        assert!(drain_commands(&mut rx, &mut subscriptions));
    }

    #[test]
    fn test_lazy_connection_does_not_start() {
        let connection = LiveConnection::new(LiveConfig::new("ws://127.0.0.1:1/graphql"));
        assert!(!connection.is_started());
    }

    #[test]
    fn test_subscribe_without_runtime_fails_handle() {
        let connection = LiveConnection::new(LiveConfig::new("ws://127.0.0.1:1/graphql"));
        let mut handle = connection.subscribe(games_request());
        assert!(!connection.is_started());

        let event = handle.next().now_or_never().expect("event is queued");
        assert_eq!(
            event,
            Some(Err(SubscriptionError::Transport(TransportError::Connection(
                "no async runtime".to_string()
            ))))
        );
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (events, _events_rx) = mpsc::unbounded_channel();
        let command = Command::Subscribe {
            id: SubscriptionId(3),
            request: games_request(),
            events,
        };
        tx.send(command).unwrap();
        tx.send(Command::Shutdown).unwrap();

        let mut subscriptions = Subscriptions::new();
        let stopped = tokio::time::timeout(
            Duration::from_secs(5),
            wait_for_retry(MAX_BACKOFF, &mut rx, &mut subscriptions),
        )
        .await
        .expect("backoff ignored shutdown");
        assert!(stopped);
        assert!(subscriptions.contains_key(&SubscriptionId(3)));
    }

    #[tokio::test]
    async fn test_backoff_elapses_without_commands() {
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let mut subscriptions = Subscriptions::new();
        let stopped =
            wait_for_retry(Duration::from_millis(10), &mut rx, &mut subscriptions).await;
        assert!(!stopped);
    }

    #[tokio::test]
    async fn test_unreachable_without_reconnect_fails_subscriptions() {
        let mut config = LiveConfig::new("ws://127.0.0.1:1/graphql");
        config.reconnect = false;
        let connection = LiveConnection::new(config);
        let mut handle = connection.subscribe(games_request());
        assert!(connection.is_started());

        let event = tokio::time::timeout(Duration::from_secs(5), handle.next())
            .await
            .unwrap();
        assert!(matches!(
            event,
            Some(Err(SubscriptionError::Transport(TransportError::Connection(_))))
        ));
    }
}
