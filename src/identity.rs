//! Per-install client identity.
//!
//! The client identifier is an opaque UUID generated on first run and kept
//! in client-local storage under [`constants::CLIENT_ID_KEY`]. It is read-only
//! after creation. [`IdentityProvider`] is created once in `main` and passed
//! by reference to whatever builds the UI runtime's init flags.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::storage::LocalStorage;

/// Opaque, immutable per-install identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentifier(String);

impl ClientIdentifier {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Supplies the durable client identifier.
#[derive(Debug)]
pub struct IdentityProvider {
    client_id: ClientIdentifier,
    created: bool,
}

impl IdentityProvider {
    /// Load the stored identifier, or generate and persist a new one.
    ///
    /// A blank stored value is treated as absent.
    pub fn load_or_create(storage: &mut LocalStorage) -> Result<Self> {
        if let Some(existing) = storage
            .get_item(constants::CLIENT_ID_KEY)
            .filter(|id| !id.trim().is_empty())
        {
            log::debug!("[Identity] Loaded client id from {}", storage.path().display());
            return Ok(Self {
                client_id: ClientIdentifier::new(existing),
                created: false,
            });
        }

        let client_id = ClientIdentifier::generate();
        storage.set_item(constants::CLIENT_ID_KEY, client_id.as_str())?;
        log::info!("[Identity] Created new client id {}", client_id);

        Ok(Self {
            client_id,
            created: true,
        })
    }

    /// The client identifier.
    pub fn client_id(&self) -> &ClientIdentifier {
        &self.client_id
    }

    /// Whether the identifier was generated during this load.
    pub fn was_created(&self) -> bool {
        self.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generated_id_is_uuid() {
        let id = ClientIdentifier::generate();
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_created_once_then_reused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let mut storage = LocalStorage::open(&path).unwrap();
        let first = IdentityProvider::load_or_create(&mut storage).unwrap();
        assert!(first.was_created());

        let mut storage = LocalStorage::open(&path).unwrap();
        let second = IdentityProvider::load_or_create(&mut storage).unwrap();
        assert!(!second.was_created());
        assert_eq!(first.client_id(), second.client_id());
    }

    #[test]
    fn test_existing_id_is_kept_verbatim() {
        let dir = TempDir::new().unwrap();
        let mut storage = LocalStorage::open(dir.path().join("store.json")).unwrap();
        storage.set_item("clientId", "abc-123").unwrap();

        let provider = IdentityProvider::load_or_create(&mut storage).unwrap();
        assert_eq!(provider.client_id().as_str(), "abc-123");
    }

    #[test]
    fn test_blank_id_is_replaced() {
        let dir = TempDir::new().unwrap();
        let mut storage = LocalStorage::open(dir.path().join("store.json")).unwrap();
        storage.set_item("clientId", "  ").unwrap();

        let provider = IdentityProvider::load_or_create(&mut storage).unwrap();
        assert!(provider.was_created());
        assert_eq!(storage.get_item("clientId"), Some(provider.client_id().as_str()));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = ClientIdentifier::new("abc-123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc-123\"");
    }
}
