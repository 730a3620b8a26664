//! JSON file storage backend.
//!
//! Persists the subtree below the parent as a flat array of key records:
//! full name (owner included), tagged value, and the meta entries. A
//! missing file on `get` is an empty store, not an error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use keytree_core::{Key, KeySet};
use keytree_error::{KeyTreeError, Result};

use super::{describes, module_description, Backend, PluginStatus};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// On-disk record for one key.
#[derive(Debug, Serialize, Deserialize)]
struct KeyRecord {
    name: String,
    value: keytree_types::KeyValue,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    meta: Vec<(String, String)>,
}

/// A storage backend over a single JSON file.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Store keys in the file at `path`. The file is created on the first
    /// `set`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(key: &Key) -> KeyRecord {
        let meta = key
            .meta_set()
            .iter()
            .filter(|m| &*m.name() != keytree_core::key::OWNER_META)
            .map(|m| {
                (
                    m.name().to_owned(),
                    m.string().map_or_else(|_| String::new(), |s| s.to_owned()),
                )
            })
            .collect();
        KeyRecord {
            name: key.full_name(),
            value: key.value(),
            meta,
        }
    }

    fn revive(record: &KeyRecord) -> Result<Key> {
        let mut builder = Key::builder(&record.name);
        for (name, value) in &record.meta {
            builder = builder.meta(name, value);
        }
        let key = builder.build()?;
        key.set_value(record.value.clone())?;
        Ok(key)
    }
}

impl Backend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "jsonfile"
    }

    fn get(&mut self, returned: &mut KeySet, parent: &Key) -> Result<PluginStatus> {
        if describes(parent, self.name()) {
            returned.append_all(&module_description(self.name(), VERSION, &["get", "set"])?);
            return Ok(PluginStatus::Changed);
        }
        if !self.path.exists() {
            return Ok(PluginStatus::Unchanged);
        }
        let data = fs::read_to_string(&self.path)?;
        let records: Vec<KeyRecord> = serde_json::from_str(&data).map_err(|e| {
            KeyTreeError::storage(self.name(), format!("malformed store file: {e}"))
        })?;
        let parent_name = parent.key_name().clone();
        let mut changed = false;
        for record in &records {
            let key = Self::revive(record)?;
            if parent_name.is_below_or_same(&key.key_name()) {
                key.clear_sync();
                returned.append_key(key);
                changed = true;
            }
        }
        if changed {
            Ok(PluginStatus::Changed)
        } else {
            Ok(PluginStatus::Unchanged)
        }
    }

    fn set(&mut self, returned: &mut KeySet, parent: &Key) -> Result<PluginStatus> {
        let parent_name = parent.key_name().clone();
        let records: Vec<KeyRecord> = returned
            .iter()
            .filter(|k| parent_name.is_below_or_same(&k.key_name()))
            .map(Self::record)
            .collect();
        let data = serde_json::to_string_pretty(&records).map_err(|e| {
            KeyTreeError::storage(self.name(), format!("cannot serialize store: {e}"))
        })?;
        fs::write(&self.path, data)?;
        Ok(PluginStatus::Changed)
    }
}
