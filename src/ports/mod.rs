//! Named ports between the UI runtime and the core.
//!
//! The UI runtime emits subscription documents on outbound ports and accepts
//! event values on inbound ports. [`UiPorts`] is the core-side view;
//! [`ChannelPorts`] implements it in-process and pairs with a [`UiEndpoint`]
//! for the UI side.
//!
//! ```text
//!   UiEndpoint::emit("createGameSubscription", doc)
//!        │
//!        ▼
//!   OutboundPort ──► registry ──► InboundPort::send(event)
//!                                      │
//!                                      ▼
//!                     UiEndpoint::recv() → Delivery { port: "gameReceived", value }
//! ```

// Rust guideline compliant 2026-02

pub mod stdio;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::registry::SubscriptionBinding;

/// Values handed to the UI runtime at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitFlags {
    /// Persistent client identifier.
    pub client_id: String,
    /// Request/response GraphQL endpoint.
    pub query_endpoint: String,
    /// Command endpoint.
    pub command_endpoint: String,
}

/// Port errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// No port with this name exists.
    #[error("unknown port '{0}'")]
    UnknownPort(String),
    /// Someone already listens on this outbound port.
    #[error("port '{0}' already has a listener")]
    AlreadyListening(String),
    /// The UI runtime was already initialized.
    #[error("UI runtime already initialized")]
    AlreadyInitialized,
    /// The other side of the port is gone.
    #[error("port '{0}' is closed")]
    Closed(String),
}

/// Core-side interface to the UI runtime.
pub trait UiPorts {
    /// Hand the init flags to the UI runtime.
    fn init(&mut self, flags: InitFlags) -> Result<(), PortError>;

    /// Take the receiving end of an outbound port. Each port has one listener.
    fn listen(&mut self, outbound: &str) -> Result<OutboundPort, PortError>;

    /// Sending end of an inbound port.
    fn inbound(&self, name: &str) -> Result<InboundPort, PortError>;
}

/// Receives documents the UI emits on one outbound port.
#[derive(Debug)]
pub struct OutboundPort {
    name: String,
    requests: mpsc::UnboundedReceiver<String>,
}

impl OutboundPort {
    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next emitted document; `None` once the UI side is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.requests.recv().await
    }
}

/// Delivers values to one inbound port.
#[derive(Debug, Clone)]
pub struct InboundPort {
    name: String,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

impl InboundPort {
    /// Port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver `value` unchanged.
    pub fn send(&self, value: Value) -> Result<(), PortError> {
        self.deliveries
            .send(Delivery {
                port: self.name.clone(),
                value,
            })
            .map_err(|_closed| PortError::Closed(self.name.clone()))
    }

    /// Whether the UI side has gone away.
    pub fn is_closed(&self) -> bool {
        self.deliveries.is_closed()
    }
}

/// A value delivered to an inbound port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Inbound port name.
    pub port: String,
    /// Delivered value.
    #[serde(rename = "data")]
    pub value: Value,
}

/// In-process [`UiPorts`] built from a binding table.
#[derive(Debug)]
pub struct ChannelPorts {
    outbound: HashMap<String, Option<mpsc::UnboundedReceiver<String>>>,
    inbound: Vec<String>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    flags: watch::Sender<Option<InitFlags>>,
}

impl ChannelPorts {
    /// Ports for every binding, plus the UI-side endpoint.
    #[must_use]
    pub fn for_bindings(bindings: &[SubscriptionBinding]) -> (Self, UiEndpoint) {
        let mut outbound = HashMap::new();
        let mut senders = HashMap::new();
        for binding in bindings {
            let (tx, rx) = mpsc::unbounded_channel();
            outbound.insert(binding.outbound.to_string(), Some(rx));
            senders.insert(binding.outbound.to_string(), tx);
        }
        let (deliveries, deliveries_rx) = mpsc::unbounded_channel();
        let (flags, flags_rx) = watch::channel(None);

        let ports = Self {
            outbound,
            inbound: bindings.iter().map(|b| b.inbound.to_string()).collect(),
            deliveries,
            flags,
        };
        let endpoint = UiEndpoint {
            sender: UiSender { outbound: senders },
            deliveries: deliveries_rx,
            flags: flags_rx,
        };
        (ports, endpoint)
    }
}

impl UiPorts for ChannelPorts {
    fn init(&mut self, flags: InitFlags) -> Result<(), PortError> {
        if self.flags.borrow().is_some() {
            return Err(PortError::AlreadyInitialized);
        }
        self.flags.send_replace(Some(flags));
        Ok(())
    }

    fn listen(&mut self, outbound: &str) -> Result<OutboundPort, PortError> {
        let slot = self
            .outbound
            .get_mut(outbound)
            .ok_or_else(|| PortError::UnknownPort(outbound.to_string()))?;
        let requests = slot
            .take()
            .ok_or_else(|| PortError::AlreadyListening(outbound.to_string()))?;
        Ok(OutboundPort {
            name: outbound.to_string(),
            requests,
        })
    }

    fn inbound(&self, name: &str) -> Result<InboundPort, PortError> {
        if !self.inbound.iter().any(|n| n == name) {
            return Err(PortError::UnknownPort(name.to_string()));
        }
        Ok(InboundPort {
            name: name.to_string(),
            deliveries: self.deliveries.clone(),
        })
    }
}

/// Cloneable emitter for outbound ports.
#[derive(Debug, Clone)]
pub struct UiSender {
    outbound: HashMap<String, mpsc::UnboundedSender<String>>,
}

impl UiSender {
    /// Emit `document` on the outbound port `port`.
    pub fn emit(&self, port: &str, document: impl Into<String>) -> Result<(), PortError> {
        self.outbound
            .get(port)
            .ok_or_else(|| PortError::UnknownPort(port.to_string()))?
            .send(document.into())
            .map_err(|_closed| PortError::Closed(port.to_string()))
    }
}

/// UI side of a [`ChannelPorts`].
#[derive(Debug)]
pub struct UiEndpoint {
    sender: UiSender,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    flags: watch::Receiver<Option<InitFlags>>,
}

impl UiEndpoint {
    /// Emit `document` on the outbound port `port`.
    pub fn emit(&self, port: &str, document: impl Into<String>) -> Result<(), PortError> {
        self.sender.emit(port, document)
    }

    /// Emitter that can be moved to another task.
    pub fn sender(&self) -> UiSender {
        self.sender.clone()
    }

    /// Init flags, once the core has initialized the UI.
    pub fn flags(&self) -> Option<InitFlags> {
        self.flags.borrow().clone()
    }

    /// Wait for the init flags. `None` if the core side is gone first.
    pub async fn wait_for_flags(&mut self) -> Option<InitFlags> {
        let flags = self.flags.wait_for(Option::is_some).await.ok()?;
        flags.clone()
    }

    /// Next delivery to any inbound port.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }

    /// Next delivery if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.deliveries.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BINDINGS;
    use serde_json::json;

    fn flags() -> InitFlags {
        InitFlags {
            client_id: "abc-123".into(),
            query_endpoint: "https://api.example.com/v1/graphql".into(),
            command_endpoint: "https://cmd.example.com".into(),
        }
    }

    #[test]
    fn test_init_flags_wire_format() {
        assert_eq!(
            serde_json::to_value(flags()).unwrap(),
            json!({
                "clientId": "abc-123",
                "queryEndpoint": "https://api.example.com/v1/graphql",
                "commandEndpoint": "https://cmd.example.com"
            })
        );
    }

    #[test]
    fn test_init_once() {
        let (mut ports, endpoint) = ChannelPorts::for_bindings(&BINDINGS);
        assert!(endpoint.flags().is_none());
        ports.init(flags()).unwrap();
        assert_eq!(endpoint.flags(), Some(flags()));
        assert_eq!(ports.init(flags()), Err(PortError::AlreadyInitialized));
    }

    #[tokio::test]
    async fn test_emit_reaches_listener() {
        let (mut ports, endpoint) = ChannelPorts::for_bindings(&BINDINGS);
        let mut port = ports.listen("createGamesSubscription").unwrap();
        endpoint
            .emit("createGamesSubscription", "subscription { games { id } }")
            .unwrap();
        assert_eq!(port.recv().await.as_deref(), Some("subscription { games { id } }"));
    }

    #[test]
    fn test_unknown_and_duplicate_ports() {
        let (mut ports, endpoint) = ChannelPorts::for_bindings(&BINDINGS);
        assert_eq!(
            ports.listen("nope").unwrap_err(),
            PortError::UnknownPort("nope".into())
        );
        assert!(ports.inbound("nope").is_err());
        assert!(endpoint.emit("nope", "x").is_err());

        let _port = ports.listen("createGameSubscription").unwrap();
        assert_eq!(
            ports.listen("createGameSubscription").unwrap_err(),
            PortError::AlreadyListening("createGameSubscription".into())
        );
    }

    #[tokio::test]
    async fn test_inbound_delivery_is_tagged() {
        let (ports, mut endpoint) = ChannelPorts::for_bindings(&BINDINGS);
        let inbound = ports.inbound("gameReceived").unwrap();
        inbound.send(json!({ "id": 1 })).unwrap();
        assert_eq!(
            endpoint.recv().await,
            Some(Delivery {
                port: "gameReceived".into(),
                value: json!({ "id": 1 }),
            })
        );
    }

    #[test]
    fn test_inbound_closed_after_endpoint_drop() {
        let (ports, endpoint) = ChannelPorts::for_bindings(&BINDINGS);
        let inbound = ports.inbound("gamesReceived").unwrap();
        drop(endpoint);
        assert!(inbound.is_closed());
        assert_eq!(
            inbound.send(json!(null)),
            Err(PortError::Closed("gamesReceived".into()))
        );
    }
}
