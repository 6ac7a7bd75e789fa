//! Salamander bridge - client bootstrap for the Salamander game UI.
//!
//! Provisions a persistent client identifier, builds a GraphQL client that
//! sends subscriptions over a shared WebSocket and everything else over
//! HTTP, and routes subscription requests from the UI runtime's named ports
//! to that client.
//!
//! # Architecture
//!
//! - **Identity** - per-install client identifier in client-local storage
//! - **Transport** - selector plus the HTTP and WebSocket transports
//! - **Client** - unified entry point with a normalized cache
//! - **Registry** - outbound port → subscription → inbound port routing
//! - **Ports** - the UI runtime boundary (in-process and JSON-lines stdio)
//!
//! # Modules
//!
//! - [`bootstrap`] - startup wiring
//! - [`client`] - unified GraphQL client
//! - [`registry`] - subscription channel registry
//! - [`transport`] - transport selector and transports
//! - [`config`] - configuration loading

// Library modules
pub mod bootstrap;
pub mod client;
pub mod graphql;
pub mod ports;
pub mod registry;
pub mod transport;
pub mod ws;

pub mod config;
pub mod constants;
pub mod env;
pub mod identity;
pub mod storage;

// Re-export commonly used types
pub use bootstrap::{App, InitFlags};
pub use client::{ClientError, FetchPolicy, UnifiedClient};
pub use config::{Config, EndpointConfig};
pub use graphql::{Operation, OperationKind, Variables};
pub use identity::{ClientIdentifier, IdentityProvider};
pub use ports::{ChannelPorts, UiEndpoint, UiPorts};
pub use registry::{SubscriptionBinding, SubscriptionRegistry, BINDINGS};
pub use transport::{SubscriptionHandle, TransportSelector};
