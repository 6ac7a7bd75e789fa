//! Transports and the per-operation transport split.
//!
//! # Architecture
//!
//! ```text
//!                    TransportSelector::select(&Operation)
//!                                 │
//!              ┌──────────────────┴──────────────────┐
//!              │ query / mutation                    │ subscription
//!              ▼                                     ▼
//!   RequestTransport (HttpTransport)      LiveTransport (LiveConnection)
//!   one POST per operation                one shared WebSocket, many
//!                                         SubscriptionHandles
//! ```
//!
//! The decision is made per operation, so one client routes some calls over
//! the persistent socket and others over discrete HTTP requests at the same
//! time.

// Rust guideline compliant 2026-02

pub mod http;
pub mod live;
pub mod mock;
pub mod protocol;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::graphql::{
    payload_errors, GraphQLError, GraphQLRequest, GraphQLResponse, Operation, OperationKind,
};

/// Errors raised by a transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("request failed: {0}")]
    Request(String),
    /// Non-success HTTP status.
    #[error("server returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The response body is not a GraphQL response.
    #[error("invalid response body: {0}")]
    Decode(String),
    /// The subscription socket could not be established.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The server broke the subscription protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// The server sent an error frame for the subscription.
    #[error("server rejected subscription: {0}")]
    Server(Value),
    /// The transport shut down.
    #[error("transport closed")]
    Closed,
}

/// Event pushed by a live transport for one subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// Event payload, forwarded as received.
    Next(Value),
    /// Terminal failure.
    Error(TransportError),
    /// Terminal completion.
    Complete,
}

/// Error observed through a [`SubscriptionHandle`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubscriptionError {
    /// Transport-level failure or server error frame.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// An event carried GraphQL errors.
    #[error("subscription returned errors: {}", join_messages(.0))]
    GraphQL(Vec<GraphQLError>),
}

pub(crate) fn join_messages(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Identifier of one live subscription within its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// Lazy, unbounded, non-restartable sequence of events for one subscription.
///
/// Dropping the handle (or calling [`Self::cancel`]) stops the server-side
/// subscription unless the server already ended it.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    events: mpsc::UnboundedReceiver<SubscriptionEvent>,
    cancel: Option<CancelFn>,
    finished: bool,
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl SubscriptionHandle {
    /// Handle over `events`; `cancel` runs if the consumer stops early.
    pub fn new(
        id: SubscriptionId,
        events: mpsc::UnboundedReceiver<SubscriptionEvent>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            events,
            cancel: Some(Box::new(cancel)),
            finished: false,
        }
    }

    /// Handle that yields `error` once and then ends.
    #[must_use]
    pub fn failed(id: SubscriptionId, error: TransportError) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let _ = tx.send(SubscriptionEvent::Error(error));
        Self {
            id,
            events,
            cancel: None,
            finished: false,
        }
    }

    /// Transport-assigned id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event.
    ///
    /// Returns `Some(Ok(payload))` per event, `Some(Err(_))` once on failure
    /// (including an event whose `errors` array is non-empty), and `None`
    /// after completion.
    pub async fn next(&mut self) -> Option<Result<Value, SubscriptionError>> {
        if self.finished {
            return None;
        }
        match self.events.recv().await {
            Some(SubscriptionEvent::Next(payload)) => {
                if let Some(errors) = payload_errors(&payload) {
                    self.finished = true;
                    self.stop();
                    return Some(Err(SubscriptionError::GraphQL(errors)));
                }
                Some(Ok(payload))
            }
            Some(SubscriptionEvent::Error(error)) => {
                self.settle();
                Some(Err(error.into()))
            }
            Some(SubscriptionEvent::Complete) | None => {
                self.settle();
                None
            }
        }
    }

    /// Wait for the next event and return its `data`.
    pub async fn next_data(&mut self) -> Option<Result<Value, SubscriptionError>> {
        let payload = match self.next().await? {
            Ok(payload) => payload,
            Err(e) => return Some(Err(e)),
        };
        Some(
            GraphQLResponse::from_payload(payload)
                .into_result()
                .map_err(SubscriptionError::GraphQL),
        )
    }

    /// Stop the subscription now.
    pub fn cancel(mut self) {
        self.stop();
    }

    // The server ended the subscription; there is nothing left to stop.
    fn settle(&mut self) {
        self.finished = true;
        self.cancel = None;
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One-shot request/response transport.
#[async_trait]
pub trait RequestTransport: Send + Sync + std::fmt::Debug {
    /// Send `request` and wait for the response.
    async fn execute(&self, request: &GraphQLRequest) -> Result<GraphQLResponse, TransportError>;
}

/// Persistent push transport.
pub trait LiveTransport: Send + Sync + std::fmt::Debug {
    /// Start a subscription. Never fails synchronously: connection problems
    /// arrive through the returned handle.
    fn subscribe(&self, request: GraphQLRequest) -> SubscriptionHandle;
}

/// Which transport an operation belongs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Live-subscription transport.
    Live,
    /// Request/response transport.
    RequestResponse,
}

impl Route {
    /// Classify an operation kind.
    #[must_use]
    pub fn for_kind(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Subscription => Self::Live,
            OperationKind::Query | OperationKind::Mutation => Self::RequestResponse,
        }
    }
}

/// Transport chosen for one operation.
#[derive(Debug, Clone, Copy)]
pub enum Transport<'a> {
    /// Live-subscription transport.
    Live(&'a dyn LiveTransport),
    /// Request/response transport.
    RequestResponse(&'a dyn RequestTransport),
}

impl Transport<'_> {
    /// Route this transport stands for.
    pub fn route(&self) -> Route {
        match self {
            Self::Live(_) => Route::Live,
            Self::RequestResponse(_) => Route::RequestResponse,
        }
    }
}

/// Holds both transports and picks one per operation.
#[derive(Debug, Clone)]
pub struct TransportSelector {
    request: Arc<dyn RequestTransport>,
    live: Arc<dyn LiveTransport>,
}

impl TransportSelector {
    /// Selector over the two transports.
    pub fn new(request: Arc<dyn RequestTransport>, live: Arc<dyn LiveTransport>) -> Self {
        Self { request, live }
    }

    /// Classify `operation` without borrowing a transport.
    pub fn route(&self, operation: &Operation) -> Route {
        Route::for_kind(operation.kind())
    }

    /// Transport that must carry `operation`.
    pub fn select(&self, operation: &Operation) -> Transport<'_> {
        match self.route(operation) {
            Route::Live => Transport::Live(self.live.as_ref()),
            Route::RequestResponse => Transport::RequestResponse(self.request.as_ref()),
        }
    }

    /// The live-subscription transport.
    pub fn live(&self) -> &dyn LiveTransport {
        self.live.as_ref()
    }
}

pub use http::HttpTransport;
pub use live::{LiveConfig, LiveConnection};
pub use protocol::WsProtocol;
