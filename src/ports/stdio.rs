//! JSON-lines bridge between a [`UiEndpoint`] and an external UI host.
//!
//! Every line is one `{"port": ..., "data": ...}` object. The first line
//! written is `{"port": "init", "data": <InitFlags>}`. Input lines carry
//! subscription documents for outbound ports (`data` is the document
//! string); output lines carry deliveries to inbound ports.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::UiEndpoint;

/// Port name of the first output line.
pub const INIT_PORT: &str = "init";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    port: String,
    data: Value,
}

/// Pump lines until either side closes.
///
/// Malformed input lines are logged and skipped.
pub async fn serve<R, W>(mut endpoint: UiEndpoint, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let flags = endpoint
        .wait_for_flags()
        .await
        .context("UI runtime was never initialized")?;
    write_envelope(
        &mut writer,
        &Envelope {
            port: INIT_PORT.to_string(),
            data: serde_json::to_value(flags)?,
        },
    )
    .await?;

    let sender = endpoint.sender();
    let mut lines = reader.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from UI host")? else {
                    log::info!("[Stdio] Input closed");
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_request(&line) {
                    Ok((port, document)) => {
                        if let Err(e) = sender.emit(&port, document) {
                            log::warn!("[Stdio] {}", e);
                        }
                    }
                    Err(e) => log::warn!("[Stdio] Skipping input line: {:#}", e),
                }
            }

            delivery = endpoint.recv() => {
                let Some(delivery) = delivery else {
                    return Ok(());
                };
                write_envelope(
                    &mut writer,
                    &Envelope { port: delivery.port, data: delivery.value },
                )
                .await?;
            }
        }
    }
}

fn parse_request(line: &str) -> Result<(String, String)> {
    let envelope: Envelope = serde_json::from_str(line).context("not a port envelope")?;
    match envelope.data {
        Value::String(document) => Ok((envelope.port, document)),
        other => anyhow::bail!(
            "port '{}' expects a document string, got {}",
            envelope.port,
            other
        ),
    }
}

async fn write_envelope<W: AsyncWrite + Unpin>(writer: &mut W, envelope: &Envelope) -> Result<()> {
    let mut line = serde_json::to_string(envelope)?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .context("Failed to write to UI host")?;
    writer.flush().await.context("Failed to flush UI host output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ChannelPorts, InitFlags, UiPorts};
    use crate::registry::BINDINGS;
    use serde_json::json;
    use tokio::io::{duplex, BufReader};

    #[test]
    fn test_parse_request() {
        let (port, doc) = parse_request(
            r#"{"port":"createGamesSubscription","data":"subscription { games { id } }"}"#,
        )
        .unwrap();
        assert_eq!(port, "createGamesSubscription");
        assert_eq!(doc, "subscription { games { id } }");

        assert!(parse_request(r#"{"port":"x","data":42}"#).is_err());
        assert!(parse_request("garbage").is_err());
    }

    #[tokio::test]
    async fn test_serve_bridges_both_directions() {
        let (mut ports, endpoint) = ChannelPorts::for_bindings(&BINDINGS);
        ports
            .init(InitFlags {
                client_id: "abc-123".into(),
                query_endpoint: "http://localhost/graphql".into(),
                command_endpoint: "http://localhost/cmd".into(),
            })
            .unwrap();
        let mut outbound = ports.listen("createGameSubscription").unwrap();
        let inbound = ports.inbound("gameReceived").unwrap();

        let (mut host_input, bridge_input) = duplex(4096);
        let (host_output, bridge_output) = duplex(4096);
        let bridge = tokio::spawn(serve(endpoint, BufReader::new(bridge_input), bridge_output));
        let mut output = BufReader::new(host_output).lines();

        let line = output.next_line().await.unwrap().unwrap();
        let init: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(init["port"], "init");
        assert_eq!(init["data"]["clientId"], "abc-123");

        let request = json!({
            "port": "createGameSubscription",
            "data": "subscription { gameUpdated(id: 1) { id } }",
        });
        host_input
            .write_all(format!("not json\n{request}\n").as_bytes())
            .await
            .unwrap();
        assert_eq!(
            outbound.recv().await.as_deref(),
            Some("subscription { gameUpdated(id: 1) { id } }")
        );

        inbound.send(json!({ "id": 1, "state": "A" })).unwrap();
        let delivered: Value =
            serde_json::from_str(&output.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(
            delivered,
            json!({ "port": "gameReceived", "data": { "id": 1, "state": "A" } })
        );

        drop(host_input);
        bridge.await.unwrap().unwrap();
    }
}
