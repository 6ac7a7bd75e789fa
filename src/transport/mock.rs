//! In-process transports for tests and for driving the registry without a
//! server.
//!
//! [`MockLiveTransport`] hands every subscription to a paired
//! [`MockLiveServer`], which plays the server role: it sees the request and
//! decides what events to push. [`MockRequestTransport`] answers from a
//! queue of scripted responses and records what it was sent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{
    LiveTransport, RequestTransport, SubscriptionEvent, SubscriptionHandle, SubscriptionId,
    TransportError,
};
use crate::graphql::{GraphQLRequest, GraphQLResponse};

/// Live transport whose server side is a [`MockLiveServer`].
#[derive(Debug)]
pub struct MockLiveTransport {
    accepted: mpsc::UnboundedSender<MockSubscription>,
    next_id: AtomicU64,
}

/// Server half of a [`MockLiveTransport`].
#[derive(Debug)]
pub struct MockLiveServer {
    accepted: mpsc::UnboundedReceiver<MockSubscription>,
}

/// One subscription as seen by the mock server.
#[derive(Debug)]
pub struct MockSubscription {
    id: SubscriptionId,
    request: GraphQLRequest,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
    cancelled: Arc<AtomicBool>,
}

impl MockLiveTransport {
    /// Create a transport and its server half.
    #[must_use]
    pub fn new() -> (Self, MockLiveServer) {
        let (accepted, accepted_rx) = mpsc::unbounded_channel();
        (
            Self {
                accepted,
                next_id: AtomicU64::new(1),
            },
            MockLiveServer {
                accepted: accepted_rx,
            },
        )
    }
}

impl LiveTransport for MockLiveTransport {
    fn subscribe(&self, request: GraphQLRequest) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (events, events_rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let subscription = MockSubscription {
            id,
            request,
            events,
            cancelled: Arc::clone(&cancelled),
        };
        if self.accepted.send(subscription).is_err() {
            return SubscriptionHandle::failed(id, TransportError::Closed);
        }
        SubscriptionHandle::new(id, events_rx, move || {
            cancelled.store(true, Ordering::SeqCst);
        })
    }
}

impl MockLiveServer {
    /// Wait for the next subscription. `None` once the transport is gone.
    pub async fn accept(&mut self) -> Option<MockSubscription> {
        self.accepted.recv().await
    }

    /// Next subscription if one is already waiting.
    pub fn try_accept(&mut self) -> Option<MockSubscription> {
        self.accepted.try_recv().ok()
    }
}

impl MockSubscription {
    /// Transport-assigned id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Request the client sent.
    pub fn request(&self) -> &GraphQLRequest {
        &self.request
    }

    /// Push an event. Returns `false` when the client has dropped the handle.
    pub fn emit(&self, payload: Value) -> bool {
        self.events.send(SubscriptionEvent::Next(payload)).is_ok()
    }

    /// End the subscription with an error.
    pub fn fail(self, error: TransportError) {
        let _ = self.events.send(SubscriptionEvent::Error(error));
    }

    /// End the subscription normally.
    pub fn complete(self) {
        let _ = self.events.send(SubscriptionEvent::Complete);
    }

    /// Whether the client cancelled this subscription.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Request transport answering from a script.
#[derive(Debug, Default)]
pub struct MockRequestTransport {
    responses: Mutex<VecDeque<Result<GraphQLResponse, TransportError>>>,
    requests: Mutex<Vec<GraphQLRequest>>,
}

impl MockRequestTransport {
    /// Transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response body (`{ data, errors }` or bare data).
    pub fn push_response(&self, body: Value) {
        self.lock_responses()
            .push_back(Ok(GraphQLResponse::from_payload(body)));
    }

    /// Queue a transport failure.
    pub fn push_error(&self, error: TransportError) {
        self.lock_responses().push_back(Err(error));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<GraphQLRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_responses(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<GraphQLResponse, TransportError>>> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RequestTransport for MockRequestTransport {
    async fn execute(&self, request: &GraphQLRequest) -> Result<GraphQLResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.lock_responses()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Request("no scripted response".to_string())))
    }
}
