//! Unified GraphQL client.
//!
//! One entry point for every operation kind. The [`TransportSelector`] picks
//! the transport per operation; queries additionally go through the
//! [`NormalizedCache`].

// Rust guideline compliant 2026-02

pub mod cache;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{Config, EndpointConfig};
use crate::graphql::{
    GraphQLError, GraphQLRequest, Operation, OperationError, OperationKind, Variables,
};
use crate::transport::{
    join_messages, HttpTransport, LiveConfig, LiveConnection, LiveTransport, RequestTransport,
    Route, SubscriptionError, SubscriptionHandle, Transport, TransportError, TransportSelector,
};

pub use cache::NormalizedCache;

/// How queries use the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Answer from the cache when the result is complete there.
    #[default]
    CacheFirst,
    /// Always ask the server (the result is still written to the cache).
    NetworkOnly,
}

/// Errors returned by [`UnifiedClient`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// The document could not be parsed.
    #[error(transparent)]
    Operation(#[from] OperationError),
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The server answered with GraphQL errors.
    #[error("server returned errors: {}", join_messages(.0))]
    GraphQL(Vec<GraphQLError>),
    /// A subscription run through `execute` ended without an event.
    #[error("subscription ended before its first event")]
    NoEvent,
    /// `data` did not match the requested type.
    #[error("failed to deserialize response data: {0}")]
    Deserialize(String),
}

impl From<SubscriptionError> for ClientError {
    fn from(error: SubscriptionError) -> Self {
        match error {
            SubscriptionError::Transport(e) => Self::Transport(e),
            SubscriptionError::GraphQL(errors) => Self::GraphQL(errors),
        }
    }
}

/// Dual-transport client with a normalized cache.
#[derive(Debug)]
pub struct UnifiedClient {
    selector: TransportSelector,
    cache: Mutex<NormalizedCache>,
    fetch_policy: FetchPolicy,
}

impl UnifiedClient {
    /// Client over the given transports.
    pub fn new(request: Arc<dyn RequestTransport>, live: Arc<dyn LiveTransport>) -> Self {
        Self {
            selector: TransportSelector::new(request, live),
            cache: Mutex::new(NormalizedCache::new()),
            fetch_policy: FetchPolicy::default(),
        }
    }

    /// Client over HTTP and WebSocket transports for `endpoints`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_endpoints(endpoints: &EndpointConfig, config: &Config) -> anyhow::Result<Self> {
        let request = HttpTransport::new(endpoints.query.clone())?;
        let live = LiveConnection::new(LiveConfig {
            protocol: config.ws_protocol,
            reconnect: config.reconnect,
            lazy: config.lazy,
            ..LiveConfig::new(endpoints.live.clone())
        });
        log::info!(
            "[Client] Queries via {}, subscriptions via {} ({})",
            endpoints.query,
            endpoints.live,
            config.ws_protocol
        );
        Ok(Self::new(Arc::new(request), Arc::new(live)))
    }

    /// Use `policy` for queries.
    #[must_use]
    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    /// Query fetch policy.
    pub fn fetch_policy(&self) -> FetchPolicy {
        self.fetch_policy
    }

    /// Run any operation and return its `data`.
    ///
    /// A subscription resolves with the data of its first event and is then
    /// cancelled.
    pub async fn execute(
        &self,
        operation: &Operation,
        variables: Variables,
    ) -> Result<Value, ClientError> {
        let operation = operation.with_typename();
        let request = GraphQLRequest::new(&operation, variables);

        match self.selector.select(&operation) {
            Transport::RequestResponse(transport) => {
                self.execute_request(transport, operation.kind(), &request)
                    .await
            }
            Transport::Live(transport) => {
                let mut handle = transport.subscribe(request);
                let first = handle.next_data().await;
                handle.cancel();
                first.ok_or(ClientError::NoEvent)?.map_err(ClientError::from)
            }
        }
    }

    /// Run any operation and deserialize its `data` into `T`.
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        operation: &Operation,
        variables: Variables,
    ) -> Result<T, ClientError> {
        let data = self.execute(operation, variables).await?;
        serde_json::from_value(data).map_err(|e| ClientError::Deserialize(e.to_string()))
    }

    /// Start an independent server subscription.
    ///
    /// Always uses the live transport; subscription results are never cached.
    pub fn open_subscription(
        &self,
        operation: &Operation,
        variables: Variables,
    ) -> SubscriptionHandle {
        if self.selector.route(operation) != Route::Live {
            log::warn!(
                "[Client] Opening a {} operation as a subscription",
                operation.kind()
            );
        }
        let operation = operation.with_typename();
        self.selector
            .live()
            .subscribe(GraphQLRequest::new(&operation, variables))
    }

    /// Cached entity by `"{__typename}:{id}"` key.
    pub fn cached_entity(&self, key: &str) -> Option<Value> {
        self.lock_cache().entity(key)
    }

    /// Empty the cache.
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    async fn execute_request(
        &self,
        transport: &dyn RequestTransport,
        kind: OperationKind,
        request: &GraphQLRequest,
    ) -> Result<Value, ClientError> {
        let key = NormalizedCache::result_key(request);
        let cacheable = kind == OperationKind::Query;

        if cacheable && self.fetch_policy == FetchPolicy::CacheFirst {
            if let Some(hit) = self.lock_cache().read_result(&key) {
                let name = request.operation_name.as_deref().unwrap_or("query");
                log::debug!("[Client] Cache hit for {}", name);
                return Ok(hit);
            }
        }

        let response = transport.execute(request).await?;
        let data = response.into_result().map_err(ClientError::GraphQL)?;

        let mut cache = self.lock_cache();
        if cacheable {
            cache.write_result(&key, &data);
        } else {
            cache.write_entities(&data);
        }
        Ok(data)
    }

    fn lock_cache(&self) -> MutexGuard<'_, NormalizedCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockLiveServer, MockLiveTransport, MockRequestTransport};
    use serde_json::json;

    fn client() -> (UnifiedClient, Arc<MockRequestTransport>, MockLiveServer) {
        let request = Arc::new(MockRequestTransport::new());
        let (live, server) = MockLiveTransport::new();
        let transport: Arc<dyn RequestTransport> = Arc::clone(&request) as _;
        let client = UnifiedClient::new(transport, Arc::new(live));
        (client, request, server)
    }

    fn game(field: &str, state: &str) -> serde_json::Value {
        json!({ "data": { field: { "__typename": "Game", "id": 1, "state": state } } })
    }

    #[tokio::test]
    async fn test_query_is_served_from_cache_second_time() {
        let (client, request, _server) = client();
        request.push_response(game("game", "A"));
        let op = Operation::parse("query { game(id: 1) { id state } }").unwrap();

        let first = client.execute(&op, Variables::new()).await.unwrap();
        let second = client.execute(&op, Variables::new()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(request.requests().len(), 1);
        assert_eq!(client.cached_entity("Game:1").unwrap()["state"], "A");
    }

    #[tokio::test]
    async fn test_network_only_skips_cache() {
        let (client, request, _server) = client();
        let client = client.with_fetch_policy(FetchPolicy::NetworkOnly);
        request.push_response(json!({ "data": { "n": 1 } }));
        request.push_response(json!({ "data": { "n": 2 } }));
        let op = Operation::parse("{ n }").unwrap();

        assert_eq!(client.execute(&op, Variables::new()).await.unwrap(), json!({ "n": 1 }));
        assert_eq!(client.execute(&op, Variables::new()).await.unwrap(), json!({ "n": 2 }));
    }

    #[tokio::test]
    async fn test_mutation_updates_cached_entities() {
        let (client, request, _server) = client();
        request.push_response(game("game", "A"));
        request.push_response(game("joinGame", "B"));
        let query = Operation::parse("{ game(id: 1) { id state } }").unwrap();
        let mutation = Operation::parse("mutation { joinGame(id: 1) { id state } }").unwrap();

        client.execute(&query, Variables::new()).await.unwrap();
        client.execute(&mutation, Variables::new()).await.unwrap();
        let cached = client.execute(&query, Variables::new()).await.unwrap();
        assert_eq!(cached["game"]["state"], "B");
        assert_eq!(request.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_requests_carry_typename() {
        let (client, request, _server) = client();
        request.push_response(json!({ "data": { "games": [] } }));
        let op = Operation::parse("{ games { id } }").unwrap();
        client.execute(&op, Variables::new()).await.unwrap();
        assert!(request.requests()[0].query.contains("__typename"));
    }

    #[tokio::test]
    async fn test_graphql_errors_become_client_error() {
        let (client, request, _server) = client();
        request.push_response(json!({ "data": null, "errors": [{ "message": "nope" }] }));
        let op = Operation::parse("{ games { id } }").unwrap();
        let err = client.execute(&op, Variables::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::GraphQL(ref e) if e[0].message == "nope"));
        assert_eq!(err.to_string(), "server returned errors: nope");
    }

    #[tokio::test]
    async fn test_execute_as_deserializes() {
        #[derive(serde::Deserialize)]
        struct Games {
            games: Vec<Value>,
        }
        let (client, request, _server) = client();
        request.push_response(json!({ "data": { "games": [1, 2] } }));
        let op = Operation::parse("{ games }").unwrap();
        let games: Games = client.execute_as(&op, Variables::new()).await.unwrap();
        assert_eq!(games.games.len(), 2);
    }

    #[tokio::test]
    async fn test_subscription_via_execute_returns_first_event() {
        let (client, request, mut server) = client();
        let op = Operation::parse("subscription { gameUpdated(id: 1) { id } }").unwrap();
        let pusher = tokio::spawn(async move {
            let sub = server.accept().await.unwrap();
            sub.emit(json!({ "data": { "gameUpdated": { "id": 1 } } }));
            sub
        });

        let data = client.execute(&op, Variables::new()).await.unwrap();
        assert_eq!(data, json!({ "gameUpdated": { "id": 1 } }));
        assert!(pusher.await.unwrap().is_cancelled());
        assert!(request.requests().is_empty());
    }

    #[tokio::test]
    async fn test_open_subscription_always_goes_live() {
        let (client, request, mut server) = client();
        let op = Operation::parse("subscription { games { id } }").unwrap();
        let _a = client.open_subscription(&op, Variables::new());
        let _b = client.open_subscription(&op, Variables::new());

        let first = server.accept().await.unwrap();
        let second = server.accept().await.unwrap();
        assert_ne!(first.id(), second.id());
        assert!(first.request().query.contains("__typename"));
        assert!(request.requests().is_empty());
    }
}
