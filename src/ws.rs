//! GraphQL-over-WebSocket socket halves.
//!
//! [`connect`] offers one GraphQL subprotocol in `Sec-WebSocket-Protocol`
//! and splits the socket so the live connection task can read and write from
//! a single `tokio::select!`. Transport-level pings are answered by
//! tungstenite itself, so the reader only surfaces text frames and closes.

// Rust guideline compliant 2026-02

use anyhow::{bail, Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Close code reported when the peer closes without one.
const NO_STATUS_CODE: u16 = 1005;

/// Something the server sent that the GraphQL layer cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A GraphQL frame (always JSON text).
    Text(String),
    /// The server closed the socket.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

/// Outgoing half of a live socket.
#[derive(Debug)]
pub struct SocketSink {
    inner: SplitSink<Socket, Message>,
}

impl SocketSink {
    /// Send one encoded GraphQL frame.
    pub async fn send_text(&mut self, frame: String) -> Result<()> {
        self.inner
            .send(Message::Text(frame))
            .await
            .context("WebSocket send failed")
    }

    /// Send a close frame and flush.
    pub async fn close(&mut self) -> Result<()> {
        self.inner.close().await.context("WebSocket close failed")
    }
}

/// Incoming half of a live socket.
#[derive(Debug)]
pub struct SocketStream {
    inner: SplitStream<Socket>,
}

impl SocketStream {
    /// Next text frame or close. `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Result<Inbound>> {
        while let Some(message) = self.inner.next().await {
            let inbound = match message {
                Ok(Message::Text(text)) => Inbound::Text(text),
                Ok(Message::Close(frame)) => {
                    let (code, reason) = frame.map_or((NO_STATUS_CODE, String::new()), |f| {
                        (f.code.into(), f.reason.into_owned())
                    });
                    Inbound::Closed { code, reason }
                }
                Ok(
                    Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_),
                ) => continue,
                Err(e) => return Some(Err(e).context("WebSocket read failed")),
            };
            return Some(Ok(inbound));
        }
        None
    }
}

/// Open `url` offering `subprotocol`.
///
/// A server that answers with a different subprotocol is rejected. One that
/// answers with none is accepted with a warning, since several GraphQL
/// servers omit the header.
pub async fn connect(url: &str, subprotocol: &str) -> Result<(SocketSink, SocketStream)> {
    let mut request = url
        .into_client_request()
        .with_context(|| format!("invalid WebSocket URL: {url}"))?;
    let offered = HeaderValue::from_str(subprotocol)
        .with_context(|| format!("invalid subprotocol: {subprotocol}"))?;
    request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, offered);

    let (socket, response) = tokio_tungstenite::connect_async(request)
        .await
        .with_context(|| format!("WebSocket connect to {url} failed"))?;

    match response.headers().get(SEC_WEBSOCKET_PROTOCOL) {
        Some(chosen) if chosen.as_bytes() == subprotocol.as_bytes() => {}
        Some(chosen) => bail!(
            "server selected subprotocol {:?}, expected {subprotocol}",
            chosen.to_str().unwrap_or("<binary>")
        ),
        None => log::warn!("[Live] {} did not confirm subprotocol {}", url, subprotocol),
    }

    let (sink, stream) = socket.split();
    Ok((SocketSink { inner: sink }, SocketStream { inner: stream }))
}

/// Live endpoint for a GraphQL HTTP endpoint: same host and path, `ws`
/// scheme family. URLs without an HTTP scheme are returned as-is.
#[must_use]
pub fn live_url(query_url: &str) -> String {
    [("https://", "wss://"), ("http://", "ws://")]
        .iter()
        .find_map(|(http, ws)| query_url.strip_prefix(http).map(|rest| format!("{ws}{rest}")))
        .unwrap_or_else(|| query_url.to_string())
}
