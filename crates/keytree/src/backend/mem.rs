//! In-memory storage backend.
//!
//! Keeps a private key set as its "disk". Every `get` hands out fresh
//! copies so callers never alias the stored keys; every `set` replaces the
//! stored subtree below the parent. Doubles as the storage collaborator in
//! tests.

use keytree_core::{Key, KeySet};
use keytree_error::Result;
use keytree_types::Facets;

use super::{describes, module_description, Backend, PluginStatus};

/// Version reported in the self-description keys.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A storage backend over a process-local key set.
#[derive(Debug, Default)]
pub struct MemBackend {
    store: KeySet,
}

impl MemBackend {
    /// An empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with `keys` (deep copies, so the caller's
    /// handles stay independent).
    pub fn with_keys(keys: &KeySet) -> Result<Self> {
        Ok(Self { store: keys.dup()? })
    }

    /// Number of keys currently stored.
    #[must_use]
    pub fn stored(&self) -> usize {
        self.store.len()
    }
}

impl Backend for MemBackend {
    fn name(&self) -> &'static str {
        "mem"
    }

    fn get(&mut self, returned: &mut KeySet, parent: &Key) -> Result<PluginStatus> {
        if describes(parent, self.name()) {
            returned.append_all(&module_description(self.name(), VERSION, &["get", "set"])?);
            return Ok(PluginStatus::Changed);
        }
        let parent_name = parent.key_name().clone();
        let mut changed = false;
        for key in &self.store {
            if parent_name.is_below_or_same(&key.key_name()) {
                let fresh = key.dup(Facets::ALL)?;
                fresh.clear_sync();
                returned.append_key(fresh);
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
        let _ = self.store.cut(parent);
        let parent_name = parent.key_name().clone();
        let mut changed = false;
        for key in returned.iter() {
            if parent_name.is_below_or_same(&key.key_name()) {
                self.store.append_key(key.dup(Facets::ALL)?);
                changed = true;
            }
        }
        self.store.clear_sync();
        if changed {
            Ok(PluginStatus::Changed)
        } else {
            Ok(PluginStatus::Unchanged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> Key {
        Key::new("user/tests/mem").expect("key should build")
    }

    #[test]
    fn get_on_empty_store_is_a_noop() {
        let mut backend = MemBackend::new();
        let mut ks = KeySet::new();
        let status = backend.get(&mut ks, &parent()).expect("get");
        assert_eq!(status, PluginStatus::Unchanged);
        assert!(ks.is_empty());
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut backend = MemBackend::new();
        let mut ks = KeySet::from_keys([
            Key::builder("user/tests/mem/a").value("1").build().expect("build"),
            Key::builder("user/tests/mem/b").value("2").build().expect("build"),
            Key::builder("user/elsewhere").value("x").build().expect("build"),
        ]);
        let status = backend.set(&mut ks, &parent()).expect("set");
        assert_eq!(status, PluginStatus::Changed);
        // Only the subtree below the parent was stored.
        assert_eq!(backend.stored(), 2);

        let mut fetched = KeySet::new();
        let status = backend.get(&mut fetched, &parent()).expect("get");
        assert_eq!(status, PluginStatus::Changed);
        assert_eq!(fetched.len(), 2);
        let a = fetched.find_by_name_str("user/tests/mem/a").expect("a");
        assert_eq!(&*a.string().expect("string"), "1");
        // Fresh copies, not aliases of what was stored.
        assert!(!a.same(&ks.find_by_name_str("user/tests/mem/a").expect("a")));
    }

    #[test]
    fn set_replaces_the_stored_subtree() {
        let mut backend = MemBackend::new();
        let mut first = KeySet::from_keys([
            Key::builder("user/tests/mem/old").value("1").build().expect("build"),
        ]);
        backend.set(&mut first, &parent()).expect("set");

        let mut second = KeySet::from_keys([
            Key::builder("user/tests/mem/new").value("2").build().expect("build"),
        ]);
        backend.set(&mut second, &parent()).expect("set");

        let mut fetched = KeySet::new();
        backend.get(&mut fetched, &parent()).expect("get");
        assert_eq!(fetched.len(), 1);
        assert!(fetched.find_by_name_str("user/tests/mem/old").is_none());
        assert!(fetched.find_by_name_str("user/tests/mem/new").is_some());
    }

    #[test]
    fn module_keys_on_description_parent() {
        let mut backend = MemBackend::new();
        let mut ks = KeySet::new();
        let modules = Key::new("system/keytree/modules/mem").expect("key");
        let status = backend.get(&mut ks, &modules).expect("get");
        assert_eq!(status, PluginStatus::Changed);
        assert!(ks.find_by_name_str("system/keytree/modules/mem/exports/get").is_some());
    }
}
