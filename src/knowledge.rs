//! Cross-run knowledge persistence
//!
//! A `KnowledgeStore` is an explicit attribute bag carrying learned
//! state across independent runs. It is constructed once and passed by
//! reference to whatever needs cross-run memory; there is no ambient
//! global instance.
//!
//! The on-disk form is a versioned, tagged JSON document:
//!
//! ```json
//! { "version": 1, "attrs": { "...": "..." } }
//! ```
//!
//! A bare JSON object (the legacy mapping form) is also accepted on
//! load. In both forms the `path` key is excluded: `path` is owned by
//! the constructor and never restored from serialized content.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::Result;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u64 = 1;

/// The attribute key reserved for the store location, never persisted
/// or restored.
const PATH_KEY: &str = "path";

/// Durable key/value object persisting learned state across runs.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeStore {
    path: Option<PathBuf>,
    attrs: BTreeMap<String, Value>,
}

impl KnowledgeStore {
    /// Construct a store and load it from `path` if the file exists.
    /// No path or a missing file is a valid initial empty state.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open(path: Option<PathBuf>) -> Result<Self> {
        let mut store = Self { path, attrs: BTreeMap::new() };
        store.load()?;
        Ok(store)
    }

    /// Configured path, always the value supplied at construction.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// True when no attributes are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Set an attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        self.attrs.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Read an attribute, deserializing it to the requested type.
    /// `None` when absent or when the stored value has another shape.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attrs
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Remove an attribute, returning its raw value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attrs.remove(key)
    }

    /// Merge persisted attributes into the live set.
    ///
    /// No configured path or a missing file is a no-op. Both the tagged
    /// form and the bare mapping form are accepted; `path` is always
    /// excluded. Unrecognized top-level fields in the tagged form are
    /// warned about rather than silently absorbed, so schema drift is
    /// detectable.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or is not
    /// valid JSON.
    pub fn load(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let blob = std::fs::read_to_string(&path)?;
        let value: Value = serde_json::from_str(&blob)?;
        let Value::Object(mut root) = value else {
            warn!(path = %path.display(), "knowledge file is not a JSON object, ignoring");
            return Ok(());
        };

        if root.contains_key("version") {
            if let Some(version) = root.get("version").and_then(Value::as_u64) {
                if version > SCHEMA_VERSION {
                    warn!(
                        path = %path.display(),
                        version,
                        supported = SCHEMA_VERSION,
                        "knowledge file is newer than supported, loading best-effort"
                    );
                }
            }
            for key in root.keys().filter(|k| *k != "version" && *k != "attrs") {
                warn!(path = %path.display(), field = %key, "unrecognized knowledge field, ignoring");
            }
            match root.remove("attrs") {
                Some(Value::Object(attrs)) => self.merge(attrs),
                _ => {
                    warn!(path = %path.display(), "knowledge file has no attrs mapping, ignoring");
                }
            }
        } else {
            // legacy bare mapping form
            self.merge(root);
        }
        Ok(())
    }

    fn merge(&mut self, attrs: serde_json::Map<String, Value>) {
        for (key, value) in attrs {
            if key == PATH_KEY {
                continue;
            }
            self.attrs.insert(key, value);
        }
    }

    /// Serialize the full attribute set to the configured path,
    /// creating parent directories as needed. Written via temp file +
    /// atomic rename. Without a configured path this is a warning-level
    /// no-op, allowing fully in-memory use.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn dump(&self) -> Result<()> {
        let Some(path) = &self.path else {
            warn!("knowledge store has no path configured, dump skipped");
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let attrs: serde_json::Map<String, Value> = self
            .attrs
            .iter()
            .filter(|(key, _)| key.as_str() != PATH_KEY)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let doc = serde_json::json!({ "version": SCHEMA_VERSION, "attrs": attrs });

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&doc)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
