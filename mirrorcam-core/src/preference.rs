//! Durable key/value preference storage
//!
//! The only preference the application keeps across runs is the theme mode,
//! stored under [`THEME_KEY`]. Stores are synchronous: every write goes
//! straight to the backing medium.

use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key holding the theme mode string (`auto` | `light` | `dark`)
pub const THEME_KEY: &str = "theme";

/// Durable preference store
pub trait PreferenceStore: Send + Sync + std::fmt::Debug {
    /// Read a preference, `None` when it was never written
    fn get(&self, key: &str) -> CoreResult<Option<String>>;

    /// Write a preference
    fn set(&self, key: &str, value: &str) -> CoreResult<()>;
}

/// Preference store backed by a single JSON object on disk
#[derive(Debug)]
pub struct JsonPreferenceStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl JsonPreferenceStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), entries = values.len(), "Opened preference store");

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }
}

/// In-memory preference store, counts writes
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: RwLock<BTreeMap<String, String>>,
    writes: RwLock<usize>,
}

impl MemoryPreferenceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with one entry
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::default();
        store
            .values
            .write()
            .insert(key.to_string(), value.to_string());
        store
    }

    /// Number of `set` calls so far
    pub fn write_count(&self) -> usize {
        *self.writes.read()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        if key.is_empty() {
            return Err(CoreError::InvalidPreference {
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        *self.writes.write() += 1;
        Ok(())
    }
}
