//! Client-local key/value storage.
//!
//! A small persistent string map, the native counterpart of a browser's
//! `localStorage`. Entries are kept in a JSON object on disk and every
//! mutation is written through immediately.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::constants;

/// Persistent string key/value store backed by a JSON file.
#[derive(Debug)]
pub struct LocalStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl LocalStorage {
    /// Open the store in the default config directory.
    pub fn open_default() -> Result<Self> {
        let path = Config::config_dir()?.join(constants::LOCAL_STORAGE_FILE);
        Self::open(path)
    }

    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read local storage {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse local storage {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a value.
    pub fn get_item(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Write a value and persist the store.
    pub fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.save()
    }

    /// Remove a value and persist the store. Returns the old value.
    pub fn remove_item(&mut self, key: &str) -> Result<Option<String>> {
        let old = self.entries.remove(key);
        if old.is_some() {
            self.save()?;
        }
        Ok(old)
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create local storage directory")?;
        }
        let content = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize local storage")?;
        fs::write(&self.path, content).context("Failed to write local storage")?;

        #[cfg(unix)]
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
            .context("Failed to set local storage permissions")?;

        Ok(())
    }
}
