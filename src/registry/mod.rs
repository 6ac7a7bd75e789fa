//! Subscription channel registry.
//!
//! Wires each [`SubscriptionBinding`] from the UI runtime to the
//! [`UnifiedClient`]:
//!
//! 1. A listener task per binding waits for documents on the outbound port
//! 2. Each document is parsed and must be a subscription
//! 3. Each accepted document opens an independent server subscription and
//!    spawns an [`ActiveSubscription`] that forwards every event unchanged
//!    to the inbound port
//!
//! Failures are logged and, when a failure channel is attached, published as
//! [`SubscriptionFailure`]. Nothing is retried here: reconnecting is the live
//! transport's job.

// Rust guideline compliant 2026-02

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::client::UnifiedClient;
use crate::graphql::{Operation, Variables};
use crate::ports::{InboundPort, OutboundPort, PortError, UiPorts};
use crate::transport::SubscriptionHandle;

/// Subscription kinds the UI can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionKind {
    /// Lobby game list.
    Games,
    /// A single game.
    Game,
    /// Open challenges.
    Challenges,
    /// Challenges involving the player.
    MyChallenges,
    /// Games the player takes part in.
    MyGames,
    /// Challenges attached to one game.
    GameChallenges,
}

impl std::fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Pairing of an outbound request port with its inbound event port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionBinding {
    /// Kind of subscription carried.
    pub kind: SubscriptionKind,
    /// Port the UI emits subscription documents on.
    pub outbound: &'static str,
    /// Port events are delivered to.
    pub inbound: &'static str,
}

const fn binding(
    kind: SubscriptionKind,
    outbound: &'static str,
    inbound: &'static str,
) -> SubscriptionBinding {
    SubscriptionBinding {
        kind,
        outbound,
        inbound,
    }
}

/// Every binding the UI runtime declares.
pub const BINDINGS: [SubscriptionBinding; 6] = [
    binding(SubscriptionKind::Games, "createGamesSubscription", "gamesReceived"),
    binding(SubscriptionKind::Game, "createGameSubscription", "gameReceived"),
    binding(
        SubscriptionKind::Challenges,
        "createChallengesSubscription",
        "challengesReceived",
    ),
    binding(
        SubscriptionKind::MyChallenges,
        "createMyChallengesSubscription",
        "myChallengesReceived",
    ),
    binding(SubscriptionKind::MyGames, "createMyGamesSubscription", "myGamesReceived"),
    binding(
        SubscriptionKind::GameChallenges,
        "createChallengesSubscriptionGame",
        "challengesReceivedGame",
    ),
];

/// Errors raised while registering bindings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindingError {
    /// A port name appears twice in the table.
    #[error("port name '{0}' is used by more than one binding")]
    DuplicatePort(String),
    /// The UI runtime could not provide a port.
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Check that every port name in `bindings` is distinct.
pub fn validate_bindings(bindings: &[SubscriptionBinding]) -> Result<(), BindingError> {
    let mut seen = HashSet::new();
    for name in bindings.iter().flat_map(|b| [b.outbound, b.inbound]) {
        if !seen.insert(name) {
            return Err(BindingError::DuplicatePort(name.to_string()));
        }
    }
    Ok(())
}

/// Structured record of a failed subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFailure {
    /// Binding kind.
    pub kind: SubscriptionKind,
    /// Outbound port the request came from.
    pub outbound: String,
    /// Error description.
    pub error: String,
}

/// Routes subscription requests from the UI runtime to the client.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    client: Arc<UnifiedClient>,
    failures: Option<mpsc::UnboundedSender<SubscriptionFailure>>,
    active: Arc<AtomicUsize>,
    shutdown: watch::Sender<bool>,
}

impl SubscriptionRegistry {
    /// Registry opening subscriptions through `client`.
    pub fn new(client: Arc<UnifiedClient>) -> Self {
        Self {
            client,
            failures: None,
            active: Arc::new(AtomicUsize::new(0)),
            shutdown: watch::Sender::new(false),
        }
    }

    /// Publish every failure on `failures` in addition to logging it.
    #[must_use]
    pub fn with_failures(mut self, failures: mpsc::UnboundedSender<SubscriptionFailure>) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Number of subscriptions currently forwarding events.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Validate `bindings` and start a listener for each.
    pub fn register_all(
        &self,
        ports: &mut impl UiPorts,
        bindings: &[SubscriptionBinding],
    ) -> Result<Vec<JoinHandle<()>>, BindingError> {
        validate_bindings(bindings)?;
        bindings
            .iter()
            .map(|binding| self.register(ports, *binding))
            .collect()
    }

    /// Start the listener for one binding.
    pub fn register(
        &self,
        ports: &mut impl UiPorts,
        binding: SubscriptionBinding,
    ) -> Result<JoinHandle<()>, BindingError> {
        let outbound = ports.listen(binding.outbound)?;
        let inbound = ports.inbound(binding.inbound)?;
        log::debug!(
            "[Registry] Listening on {} -> {}",
            outbound.name(),
            inbound.name()
        );
        let listener = Listener {
            binding,
            client: Arc::clone(&self.client),
            failures: self.failures.clone(),
            active: Arc::clone(&self.active),
            shutdown: self.shutdown.subscribe(),
        };
        Ok(tokio::spawn(listener.run(outbound, inbound)))
    }

    /// Stop every active subscription. Dropping the registry does the same.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Per-binding listener state.
#[derive(Debug, Clone)]
struct Listener {
    binding: SubscriptionBinding,
    client: Arc<UnifiedClient>,
    failures: Option<mpsc::UnboundedSender<SubscriptionFailure>>,
    active: Arc<AtomicUsize>,
    shutdown: watch::Receiver<bool>,
}

impl Listener {
    async fn run(self, mut outbound: OutboundPort, inbound: InboundPort) {
        while let Some(document) = outbound.recv().await {
            let operation = match Operation::parse_subscription(&document) {
                Ok(operation) => operation,
                Err(e) => {
                    self.fail(&format!("rejected request: {e}"));
                    continue;
                }
            };
            let handle = self.client.open_subscription(&operation, Variables::new());
            log::info!(
                "[Registry] {} opened subscription {}",
                self.binding.outbound,
                handle.id()
            );
            let active = ActiveSubscription::new(self.clone(), handle, inbound.clone());
            tokio::spawn(active.run());
        }
        log::debug!("[Registry] {} closed", outbound.name());
    }

    fn fail(&self, error: &str) {
        log::error!("[Registry] {}: {}", self.binding.outbound, error);
        if let Some(failures) = &self.failures {
            let _ = failures.send(SubscriptionFailure {
                kind: self.binding.kind,
                outbound: self.binding.outbound.to_string(),
                error: error.to_string(),
            });
        }
    }
}

/// One server subscription forwarding to an inbound port.
#[derive(Debug)]
pub struct ActiveSubscription {
    listener: Listener,
    handle: SubscriptionHandle,
    inbound: InboundPort,
}

impl ActiveSubscription {
    fn new(listener: Listener, handle: SubscriptionHandle, inbound: InboundPort) -> Self {
        listener.active.fetch_add(1, Ordering::SeqCst);
        Self {
            listener,
            handle,
            inbound,
        }
    }

    async fn run(mut self) {
        let id = self.handle.id();
        let mut shutdown = self.listener.shutdown.clone();
        loop {
            let event = tokio::select! {
                event = self.handle.next() => event,
                _ = shutdown.wait_for(|stop| *stop) => {
                    log::debug!("[Registry] Subscription {} stopped", id);
                    return;
                }
            };
            match event {
                Some(Ok(value)) => {
                    if let Err(e) = self.inbound.send(value) {
                        log::debug!(
                            "[Registry] Subscription {} -> {}: {}",
                            id,
                            self.inbound.name(),
                            e
                        );
                        return;
                    }
                }
                Some(Err(e)) => {
                    self.listener.fail(&format!("subscription {id} failed: {e}"));
                    return;
                }
                None => {
                    log::debug!(
                        "[Registry] Subscription {} -> {} completed",
                        id,
                        self.inbound.name()
                    );
                    return;
                }
            }
        }
    }
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.listener.active.fetch_sub(1, Ordering::SeqCst);
    }
}
