//! GraphQL-over-WebSocket wire codec.
//!
//! Two dialects share one frame model:
//!
//! | Frame              | `graphql-ws` (legacy)   | `graphql-transport-ws` |
//! |--------------------|-------------------------|------------------------|
//! | client handshake   | `connection_init`       | `connection_init`      |
//! | start subscription | `start`                 | `subscribe`            |
//! | stop subscription  | `stop`                  | `complete`             |
//! | client goodbye     | `connection_terminate`  | (socket close)         |
//! | server event       | `data`                  | `next`                 |
//! | keep-alive         | `ka`                    | `ping` / `pong`        |
//!
//! Encoding and decoding never touch the socket; the connection task owns
//! that.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::graphql::GraphQLRequest;

/// Subscription wire dialect, negotiated as the WebSocket subprotocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WsProtocol {
    /// `subscriptions-transport-ws` (subprotocol `graphql-ws`).
    #[serde(rename = "graphql-ws")]
    GraphqlWs,
    /// `graphql-ws` library protocol (subprotocol `graphql-transport-ws`).
    #[serde(rename = "graphql-transport-ws")]
    GraphqlTransportWs,
}

impl WsProtocol {
    /// Value sent in `Sec-WebSocket-Protocol`.
    #[must_use]
    pub fn subprotocol(self) -> &'static str {
        match self {
            Self::GraphqlWs => "graphql-ws",
            Self::GraphqlTransportWs => "graphql-transport-ws",
        }
    }

    /// Encode a client frame. Returns `None` for frames the dialect has no
    /// message for.
    #[must_use]
    pub fn encode(self, frame: &ClientFrame) -> Option<String> {
        let value = match (self, frame) {
            (_, ClientFrame::ConnectionInit { payload }) => match payload {
                Some(payload) => json!({ "type": "connection_init", "payload": payload }),
                None => json!({ "type": "connection_init" }),
            },
            (Self::GraphqlWs, ClientFrame::Subscribe { id, request }) => {
                json!({ "id": id, "type": "start", "payload": request })
            }
            (Self::GraphqlTransportWs, ClientFrame::Subscribe { id, request }) => {
                json!({ "id": id, "type": "subscribe", "payload": request })
            }
            (Self::GraphqlWs, ClientFrame::Stop { id }) => json!({ "id": id, "type": "stop" }),
            (Self::GraphqlTransportWs, ClientFrame::Stop { id }) => {
                json!({ "id": id, "type": "complete" })
            }
            (Self::GraphqlWs, ClientFrame::Terminate) => json!({ "type": "connection_terminate" }),
            (Self::GraphqlTransportWs, ClientFrame::Pong { payload }) => match payload {
                Some(payload) => json!({ "type": "pong", "payload": payload }),
                None => json!({ "type": "pong" }),
            },
            (Self::GraphqlTransportWs, ClientFrame::Terminate)
            | (Self::GraphqlWs, ClientFrame::Pong { .. }) => return None,
        };
        Some(value.to_string())
    }

    /// Decode a server text frame.
    pub fn decode(self, text: &str) -> Result<ServerFrame, ProtocolError> {
        let RawFrame { kind, id, payload } = serde_json::from_str::<RawFrame>(text)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let require_id = || id.clone().ok_or_else(|| ProtocolError::MissingId(kind.clone()));

        let frame = match (self, kind.as_str()) {
            (_, "connection_ack") => ServerFrame::ConnectionAck,
            (Self::GraphqlWs, "connection_error") => {
                ServerFrame::ConnectionError(payload.unwrap_or(Value::Null))
            }
            (Self::GraphqlWs, "ka") => ServerFrame::KeepAlive,
            (Self::GraphqlWs, "data") | (Self::GraphqlTransportWs, "next") => ServerFrame::Next {
                id: require_id()?,
                payload: payload.unwrap_or(Value::Null),
            },
            (_, "error") => ServerFrame::Error {
                id: require_id()?,
                payload: payload.unwrap_or(Value::Null),
            },
            (_, "complete") => ServerFrame::Complete { id: require_id()? },
            (Self::GraphqlTransportWs, "ping") => ServerFrame::Ping { payload },
            (Self::GraphqlTransportWs, "pong") => ServerFrame::Pong,
            (_, other) => ServerFrame::Unknown(other.to_string()),
        };
        Ok(frame)
    }
}

impl std::fmt::Display for WsProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.subprotocol())
    }
}

impl std::str::FromStr for WsProtocol {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "graphql-ws" | "legacy" => Ok(Self::GraphqlWs),
            "graphql-transport-ws" => Ok(Self::GraphqlTransportWs),
            other => Err(ProtocolError::UnknownProtocol(other.to_string())),
        }
    }
}

/// Frame sent by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Open the GraphQL session, with optional connection params.
    ConnectionInit {
        /// Connection params.
        payload: Option<Value>,
    },
    /// Start a subscription.
    Subscribe {
        /// Client-chosen subscription id.
        id: String,
        /// Operation to run.
        request: GraphQLRequest,
    },
    /// Stop a subscription.
    Stop {
        /// Subscription id.
        id: String,
    },
    /// Answer a server ping.
    Pong {
        /// Echoed ping payload.
        payload: Option<Value>,
    },
    /// Close the GraphQL session.
    Terminate,
}

/// Frame received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Handshake accepted.
    ConnectionAck,
    /// Handshake rejected or session failed.
    ConnectionError(Value),
    /// Legacy keep-alive.
    KeepAlive,
    /// Event for a subscription.
    Next {
        /// Subscription id.
        id: String,
        /// Event payload, usually `{ data, errors }`.
        payload: Value,
    },
    /// Subscription failed on the server.
    Error {
        /// Subscription id.
        id: String,
        /// Error payload (object in the legacy dialect, array otherwise).
        payload: Value,
    },
    /// Subscription finished on the server.
    Complete {
        /// Subscription id.
        id: String,
    },
    /// Server ping (expects a pong).
    Ping {
        /// Optional ping payload.
        payload: Option<Value>,
    },
    /// Server pong.
    Pong,
    /// Frame type this dialect does not define.
    Unknown(String),
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not a JSON object with a `type`.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Frame type requires an `id` but none was sent.
    #[error("'{0}' frame without id")]
    MissingId(String),
    /// Unknown subprotocol name.
    #[error("unknown subscription protocol '{0}'")]
    UnknownProtocol(String),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}
