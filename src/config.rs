//! Configuration loading and endpoint resolution.
//!
//! Reads the optional `config.json` from the config directory, then applies
//! `SALAMANDER_*` environment overrides. Endpoints are resolved once into an
//! immutable [`EndpointConfig`] at startup.

// Rust guideline compliant 2026-01

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::constants;
use crate::transport::protocol::WsProtocol;

/// Configuration for the bridge.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// GraphQL endpoint, either a bare `host[/path]` or a full URL.
    /// Subscriptions use the same base with a WebSocket scheme.
    pub graphql_uri: Option<String>,
    /// Command (write) endpoint handed to the UI runtime.
    pub command_uri: Option<String>,
    /// Scheme for bare endpoints: `https`/`wss` when true, `http`/`ws` otherwise.
    pub tls: bool,
    /// Subscription wire dialect.
    pub ws_protocol: WsProtocol,
    /// Reconnect the subscription socket after it drops.
    pub reconnect: bool,
    /// Defer opening the subscription socket until the first subscription.
    pub lazy: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            graphql_uri: None,
            command_uri: None,
            tls: true,
            ws_protocol: WsProtocol::GraphqlWs,
            reconnect: true,
            lazy: true,
        }
    }
}

/// Endpoints resolved from [`Config`]. Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Request/response GraphQL endpoint (`http(s)://`).
    pub query: String,
    /// Live-subscription endpoint (`ws(s)://`).
    pub live: String,
    /// Command endpoint for non-subscription writes.
    pub command: String,
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/salamander-test`
    /// 2. `SALAMANDER_CONFIG_DIR` env var: explicit override
    /// 3. `SALAMANDER_ENV=test`: `tmp/salamander-test` (integration tests)
    /// 4. Default: platform config dir (e.g. `~/.config/salamander`)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/salamander-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(custom_dir) = std::env::var("SALAMANDER_CONFIG_DIR") {
                    PathBuf::from(custom_dir)
                } else if crate::env::Environment::current().uses_local_config_dir() {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/salamander-test")
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join(constants::APP_DIR_NAME)
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::load_from_file() {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                log::warn!("[Config] Ignoring unreadable config file: {:#}", e);
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Option<Self>> {
        let path = Self::config_dir()?.join(constants::CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(config))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `SALAMANDER_*` overrides from an arbitrary lookup.
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = lookup("SALAMANDER_GRAPHQL_URI") {
            self.graphql_uri = Some(uri);
        }
        if let Some(uri) = lookup("SALAMANDER_CMD_URI") {
            self.command_uri = Some(uri);
        }
        if let Some(tls) = lookup("SALAMANDER_TLS") {
            match parse_flag(&tls) {
                Some(value) => self.tls = value,
                None => log::warn!("[Config] Ignoring SALAMANDER_TLS={}", tls),
            }
        }
        if let Some(protocol) = lookup("SALAMANDER_WS_PROTOCOL") {
            match protocol.parse() {
                Ok(value) => self.ws_protocol = value,
                Err(e) => log::warn!("[Config] Ignoring SALAMANDER_WS_PROTOCOL: {}", e),
            }
        }
        if let Some(reconnect) = lookup("SALAMANDER_RECONNECT") {
            match parse_flag(&reconnect) {
                Some(value) => self.reconnect = value,
                None => log::warn!("[Config] Ignoring SALAMANDER_RECONNECT={}", reconnect),
            }
        }
        if let Some(lazy) = lookup("SALAMANDER_LAZY") {
            match parse_flag(&lazy) {
                Some(value) => self.lazy = value,
                None => log::warn!("[Config] Ignoring SALAMANDER_LAZY={}", lazy),
            }
        }
    }

    /// Resolve both endpoints into absolute URLs.
    ///
    /// Both endpoints are required; a missing one is a startup error.
    pub fn endpoints(&self) -> Result<EndpointConfig> {
        let graphql = self
            .graphql_uri
            .as_deref()
            .filter(|uri| !uri.trim().is_empty())
            .context("GraphQL endpoint is not configured (set SALAMANDER_GRAPHQL_URI)")?;
        let command = self
            .command_uri
            .as_deref()
            .filter(|uri| !uri.trim().is_empty())
            .context("Command endpoint is not configured (set SALAMANDER_CMD_URI)")?;

        let query = self.absolute(graphql);
        let live = crate::ws::live_url(&query);
        Ok(EndpointConfig {
            query,
            live,
            command: self.absolute(command),
        })
    }

    fn absolute(&self, uri: &str) -> String {
        let uri = uri.trim();
        if uri.contains("://") {
            uri.to_string()
        } else {
            let scheme = if self.tls { "https" } else { "http" };
            format!("{scheme}://{uri}")
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.graphql_uri.is_none());
        assert!(config.tls);
        assert!(config.reconnect);
        assert!(config.lazy);
        assert_eq!(config.ws_protocol, WsProtocol::GraphqlWs);
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("SALAMANDER_GRAPHQL_URI", "salamander.example.com/v1/graphql"),
            ("SALAMANDER_CMD_URI", "commands.example.com"),
            ("SALAMANDER_TLS", "false"),
            ("SALAMANDER_WS_PROTOCOL", "graphql-transport-ws"),
            ("SALAMANDER_RECONNECT", "0"),
            ("SALAMANDER_LAZY", "no"),
        ]));

        assert_eq!(
            config.graphql_uri.as_deref(),
            Some("salamander.example.com/v1/graphql")
        );
        assert_eq!(config.command_uri.as_deref(), Some("commands.example.com"));
        assert!(!config.tls);
        assert_eq!(config.ws_protocol, WsProtocol::GraphqlTransportWs);
        assert!(!config.reconnect);
        assert!(!config.lazy);
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("SALAMANDER_TLS", "maybe"),
            ("SALAMANDER_WS_PROTOCOL", "carrier-pigeon"),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_endpoints_from_bare_hosts() {
        let config = Config {
            graphql_uri: Some("salamander.example.com/v1/graphql".into()),
            command_uri: Some("commands.example.com".into()),
            ..Config::default()
        };
        let endpoints = config.endpoints().unwrap();
        assert_eq!(endpoints.query, "https://salamander.example.com/v1/graphql");
        assert_eq!(endpoints.live, "wss://salamander.example.com/v1/graphql");
        assert_eq!(endpoints.command, "https://commands.example.com");
    }

    #[test]
    fn test_endpoints_without_tls() {
        let config = Config {
            graphql_uri: Some("localhost:8080/v1/graphql".into()),
            command_uri: Some("localhost:4000".into()),
            tls: false,
            ..Config::default()
        };
        let endpoints = config.endpoints().unwrap();
        assert_eq!(endpoints.query, "http://localhost:8080/v1/graphql");
        assert_eq!(endpoints.live, "ws://localhost:8080/v1/graphql");
        assert_eq!(endpoints.command, "http://localhost:4000");
    }

    #[test]
    fn test_endpoints_keep_explicit_scheme() {
        let config = Config {
            graphql_uri: Some("http://127.0.0.1:9000/graphql".into()),
            command_uri: Some("https://commands.example.com".into()),
            ..Config::default()
        };
        let endpoints = config.endpoints().unwrap();
        assert_eq!(endpoints.query, "http://127.0.0.1:9000/graphql");
        assert_eq!(endpoints.live, "ws://127.0.0.1:9000/graphql");
        assert_eq!(endpoints.command, "https://commands.example.com");
    }

    #[test]
    fn test_missing_endpoint_is_an_error() {
        let config = Config {
            graphql_uri: Some("salamander.example.com".into()),
            command_uri: None,
            ..Config::default()
        };
        let err = config.endpoints().unwrap_err();
        assert!(err.to_string().contains("SALAMANDER_CMD_URI"));

        let config = Config {
            graphql_uri: Some("   ".into()),
            command_uri: Some("commands.example.com".into()),
            ..Config::default()
        };
        assert!(config.endpoints().is_err());
    }

    #[test]
    fn test_config_file_round_trip_uses_kebab_protocol() {
        let config = Config {
            ws_protocol: WsProtocol::GraphqlTransportWs,
            ..Config::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["ws_protocol"], "graphql-transport-ws");

        let parsed: Config = serde_json::from_str(r#"{"graphql_uri":"a.example.com"}"#).unwrap();
        assert_eq!(parsed.graphql_uri.as_deref(), Some("a.example.com"));
        assert!(parsed.reconnect);
    }
}
