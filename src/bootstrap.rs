//! Application startup.
//!
//! Resolves endpoints, builds the [`UnifiedClient`], initializes the UI
//! runtime with [`InitFlags`] and registers every subscription binding.

// Rust guideline compliant 2026-01

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::UnifiedClient;
use crate::config::{Config, EndpointConfig};
use crate::identity::ClientIdentifier;
use crate::registry::{SubscriptionFailure, SubscriptionRegistry, BINDINGS};

pub use crate::ports::InitFlags;
use crate::ports::UiPorts;

/// Running application.
#[derive(Debug)]
pub struct App {
    client: Arc<UnifiedClient>,
    registry: SubscriptionRegistry,
    endpoints: EndpointConfig,
    listeners: Vec<JoinHandle<()>>,
}

impl App {
    /// Shared client.
    pub fn client(&self) -> &Arc<UnifiedClient> {
        &self.client
    }

    /// Subscription registry.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Endpoints in use.
    pub fn endpoints(&self) -> &EndpointConfig {
        &self.endpoints
    }

    /// Stop listening and end every active subscription.
    pub fn shutdown(self) {
        log::info!("[Bootstrap] Shutting down");
        for listener in &self.listeners {
            listener.abort();
        }
        self.registry.shutdown();
    }
}

/// Init flags for `client_id` and `endpoints`.
pub fn init_flags(client_id: &ClientIdentifier, endpoints: &EndpointConfig) -> InitFlags {
    InitFlags {
        client_id: client_id.to_string(),
        query_endpoint: endpoints.query.clone(),
        command_endpoint: endpoints.command.clone(),
    }
}

/// Start the application against `ports`.
pub fn start(
    config: &Config,
    client_id: &ClientIdentifier,
    ports: &mut impl UiPorts,
) -> Result<App> {
    let endpoints = config.endpoints()?;
    let client = UnifiedClient::from_endpoints(&endpoints, config)
        .context("Failed to create GraphQL client")?;
    start_with_client(Arc::new(client), endpoints, client_id, ports, None)
}

/// Start the application with a prepared client.
///
/// Failures of individual subscriptions are published on `failures` when
/// given.
pub fn start_with_client(
    client: Arc<UnifiedClient>,
    endpoints: EndpointConfig,
    client_id: &ClientIdentifier,
    ports: &mut impl UiPorts,
    failures: Option<mpsc::UnboundedSender<SubscriptionFailure>>,
) -> Result<App> {
    ports
        .init(init_flags(client_id, &endpoints))
        .context("Failed to initialize UI runtime")?;

    let mut registry = SubscriptionRegistry::new(Arc::clone(&client));
    if let Some(failures) = failures {
        registry = registry.with_failures(failures);
    }
    let listeners = registry
        .register_all(ports, &BINDINGS)
        .context("Failed to register subscription bindings")?;

    log::info!(
        "[Bootstrap] Client {} ready, {} subscription bindings registered",
        client_id,
        listeners.len()
    );
    Ok(App {
        client,
        registry,
        endpoints,
        listeners,
    })
}
