// Config file + environment loading and client identity persistence.
//
// Everything that touches process environment lives in one test so parallel
// tests never observe each other's variables.

use std::env;
use std::fs;

use salamander_bridge::storage::LocalStorage;
use salamander_bridge::transport::WsProtocol;
use salamander_bridge::{Config, IdentityProvider};
use tempfile::TempDir;

/// Restores the variables it set on drop.
struct EnvGuard {
    keys: Vec<&'static str>,
}

impl EnvGuard {
    fn new() -> Self {
        Self { keys: Vec::new() }
    }

    fn set(&mut self, key: &'static str, value: &str) {
        env::set_var(key, value);
        self.keys.push(key);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            env::remove_var(key);
        }
    }
}

#[test]
fn test_config_dir_file_env_and_identity() {
    let dir = TempDir::new().unwrap();
    let mut guard = EnvGuard::new();
    guard.set("SALAMANDER_CONFIG_DIR", dir.path().to_str().unwrap());

    fs::write(
        dir.path().join("config.json"),
        r#"{ "graphql_uri": "api.example.com/v1/graphql", "ws_protocol": "graphql-transport-ws" }"#,
    )
    .unwrap();
    guard.set("SALAMANDER_CMD_URI", "cmd.example.com");
    guard.set("SALAMANDER_LAZY", "false");

    let config = Config::load().unwrap();
    assert_eq!(config.ws_protocol, WsProtocol::GraphqlTransportWs);
    assert!(!config.lazy);
    let endpoints = config.endpoints().unwrap();
    assert_eq!(endpoints.query, "https://api.example.com/v1/graphql");
    assert_eq!(endpoints.live, "wss://api.example.com/v1/graphql");
    assert_eq!(endpoints.command, "https://cmd.example.com");

    // env wins over the file
    guard.set("SALAMANDER_GRAPHQL_URI", "other.example.com/graphql");
    let config = Config::load().unwrap();
    assert_eq!(config.graphql_uri.as_deref(), Some("other.example.com/graphql"));

    let mut storage = LocalStorage::open_default().unwrap();
    assert!(storage.path().starts_with(dir.path()));
    let first = IdentityProvider::load_or_create(&mut storage).unwrap();
    assert!(first.was_created());

    let mut storage = LocalStorage::open_default().unwrap();
    let second = IdentityProvider::load_or_create(&mut storage).unwrap();
    assert!(!second.was_created());
    assert_eq!(first.client_id(), second.client_id());
}
