//! The database facade: mount map, open/get/set/close.
//!
//! A [`Kdb`] handle owns an ordered list of mounts, each a parent name and
//! a chain of backends. `get` and `set` are bounded by a parent key: only
//! the mounts whose subtree overlaps the parent's take part, and each
//! backend sees the deeper of the two names as its own parent. `set`
//! requires a prior `get` covering the same subtree; storage failures are
//! returned *and* attached as error/warning meta on the parent key.
//!
//! This module is the only place that performs I/O; keys and key sets are
//! pure in-memory structures.

use tracing::{debug, info, warn};

use keytree_core::{Key, KeyName, KeySet};
use keytree_error::{KeyTreeError, Result};

use crate::backend::{Backend, PluginStatus};
use crate::diagnostics::{set_error, Diagnostic};

/// Result of a facade `get`/`set`: whether anything changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Storage and key set agree; nothing was transferred.
    NoChange,
    /// Keys were fetched or committed.
    Updated,
}

/// Mount configuration handed to [`Kdb::open`]: parent names, each with
/// its ordered backend chain.
#[derive(Default)]
pub struct MountConfig {
    mounts: Vec<(String, Vec<Box<dyn Backend>>)>,
}

impl MountConfig {
    /// An empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a backend chain at `parent`. Chains run in order on `get`
    /// and on `set`; mount order decides nothing else.
    #[must_use]
    pub fn mount(mut self, parent: &str, chain: Vec<Box<dyn Backend>>) -> Self {
        self.mounts.push((parent.to_owned(), chain));
        self
    }
}

impl std::fmt::Debug for MountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parents: Vec<&str> = self.mounts.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("MountConfig").field("mounts", &parents).finish()
    }
}

struct Mount {
    parent: KeyName,
    parent_key: Key,
    chain: Vec<Box<dyn Backend>>,
}

/// An open database handle.
pub struct Kdb {
    mounts: Vec<Mount>,
    fetched: Vec<KeyName>,
}

impl Kdb {
    /// Open a handle: resolve the mount map and run every backend's
    /// `open` hook. Failures are attached to `parent` and abort.
    pub fn open(config: MountConfig, parent: &Key) -> Result<Self> {
        let mut mounts = Vec::with_capacity(config.mounts.len());
        for (name, mut chain) in config.mounts {
            let (mount_name, _) = KeyName::parse(&name)?;
            let mount_key = Key::new(mount_name.as_str())?;
            for backend in &mut chain {
                if let Err(err) = backend.open(&mount_key) {
                    Self::report(parent, backend.name(), &err);
                    return Err(err);
                }
            }
            debug!(mountpoint = %mount_name, backends = chain.len(), "mounted backend chain");
            mounts.push(Mount {
                parent: mount_name,
                parent_key: mount_key,
                chain,
            });
        }
        info!(mounts = mounts.len(), "database handle opened");
        Ok(Self {
            mounts,
            fetched: Vec::new(),
        })
    }

    /// Fetch all keys below `parent` from storage and merge them into
    /// `ks` (append semantics: fetched keys replace same-named ones).
    ///
    /// Errors are attached as meta on `parent` and returned; the key set
    /// keeps whatever was merged before the failure.
    pub fn get(&mut self, ks: &mut KeySet, parent: &Key) -> Result<UpdateStatus> {
        let parent_name = parent.key_name().clone();
        let mut status = UpdateStatus::NoChange;
        for mount in &mut self.mounts {
            let Some(root) = overlap_root(&mount.parent, &parent_name) else {
                continue;
            };
            let root_key = if root == mount.parent {
                mount.parent_key.clone()
            } else {
                Key::new(root.as_str())?
            };
            let mut fetched = KeySet::new();
            for backend in &mut mount.chain {
                match backend.get(&mut fetched, &root_key) {
                    Ok(PluginStatus::Changed) => status = UpdateStatus::Updated,
                    Ok(PluginStatus::Unchanged) => {}
                    Err(err) => {
                        warn!(backend = backend.name(), %err, "get chain failed");
                        Self::report(parent, backend.name(), &err);
                        return Err(err);
                    }
                }
            }
            debug!(mountpoint = %mount.parent, fetched = fetched.len(), "merged keys from mount");
            ks.append_all(&fetched);
        }
        self.fetched.push(parent_name);
        Ok(status)
    }

    /// Commit exactly the subtree of `ks` below `parent` to storage.
    ///
    /// Requires a prior [`Kdb::get`] whose parent covers this one;
    /// otherwise fails with `needs-get`. Backends in a chain run in
    /// order and may rewrite the working set. On success the committed
    /// keys' sync flags are cleared.
    pub fn set(&mut self, ks: &mut KeySet, parent: &Key) -> Result<UpdateStatus> {
        let parent_name = parent.key_name().clone();
        if !self.fetched.iter().any(|f| f.is_below_or_same(&parent_name)) {
            let err = KeyTreeError::needs_get(parent_name.as_str());
            Self::report(parent, "kdb", &err);
            return Err(err);
        }
        let mut status = UpdateStatus::NoChange;
        for mount in &mut self.mounts {
            let Some(root) = overlap_root(&mount.parent, &parent_name) else {
                continue;
            };
            let root_key = Key::new(root.as_str())?;
            let mut subtree = KeySet::new();
            for key in ks.iter() {
                if root.is_below_or_same(&key.key_name()) {
                    subtree.append_key(key.clone());
                }
            }
            for backend in &mut mount.chain {
                match backend.set(&mut subtree, &root_key) {
                    Ok(PluginStatus::Changed) => status = UpdateStatus::Updated,
                    Ok(PluginStatus::Unchanged) => {}
                    Err(err) => {
                        warn!(backend = backend.name(), %err, "set chain failed");
                        Self::report(parent, backend.name(), &err);
                        return Err(err);
                    }
                }
            }
            debug!(mountpoint = %mount.parent, committed = subtree.len(), "committed subtree");
            subtree.clear_sync();
        }
        Ok(status)
    }

    /// Tear down every backend chain. Close failures are attached to
    /// `parent` as warnings; the handle is unusable afterwards.
    pub fn close(&mut self, parent: &Key) -> Result<()> {
        for mount in &mut self.mounts {
            for backend in &mut mount.chain {
                if let Err(err) = backend.close(&mount.parent_key) {
                    warn!(backend = backend.name(), %err, "close failed");
                    crate::diagnostics::add_warning(
                        parent,
                        &Diagnostic {
                            code: err.status_code(),
                            description: "backend close failed",
                            module: backend.name(),
                            file: file!(),
                            line: line!(),
                            reason: &err.to_string(),
                        },
                    );
                }
            }
        }
        self.mounts.clear();
        self.fetched.clear();
        info!("database handle closed");
        Ok(())
    }

    fn report(parent: &Key, module: &str, err: &KeyTreeError) {
        set_error(
            parent,
            &Diagnostic {
                code: err.status_code(),
                description: "database operation failed",
                module,
                file: file!(),
                line: line!(),
                reason: &err.to_string(),
            },
        );
    }
}

impl std::fmt::Debug for Kdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mounts: Vec<&str> = self.mounts.iter().map(|m| m.parent.as_str()).collect();
        f.debug_struct("Kdb").field("mounts", &mounts).finish_non_exhaustive()
    }
}

/// The deeper of two overlapping subtree roots, or `None` when the
/// subtrees are disjoint.
fn overlap_root(mount: &KeyName, parent: &KeyName) -> Option<KeyName> {
    if mount.is_below_or_same(parent) {
        Some(parent.clone())
    } else if parent.is_below_or_same(mount) {
        Some(mount.clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemBackend;

    fn name(s: &str) -> KeyName {
        KeyName::parse(s).expect("name should parse").0
    }

    #[test]
    fn overlap_root_picks_deeper_name() {
        assert_eq!(
            overlap_root(&name("user/tests"), &name("user/tests/app")),
            Some(name("user/tests/app"))
        );
        assert_eq!(
            overlap_root(&name("user/tests"), &name("user")),
            Some(name("user/tests"))
        );
        assert_eq!(
            overlap_root(&name("user/tests"), &name("user/tests")),
            Some(name("user/tests"))
        );
        assert_eq!(overlap_root(&name("user/tests"), &name("system")), None);
    }

    #[test]
    fn set_without_get_fails_with_needs_get() {
        let config = MountConfig::new().mount("user/tests", vec![Box::new(MemBackend::new())]);
        let parent = Key::new("user/tests").expect("key");
        let mut kdb = Kdb::open(config, &parent).expect("open");
        let mut ks = KeySet::new();
        let err = kdb.set(&mut ks, &parent).expect_err("set must require get");
        assert!(matches!(err, KeyTreeError::NeedsGet { .. }));
        assert_eq!(parent.meta_value("error/number").as_deref(), Some("6"));
    }

    #[test]
    fn get_covers_set_below_the_fetched_parent() {
        let config = MountConfig::new().mount("user/tests", vec![Box::new(MemBackend::new())]);
        let parent = Key::new("user/tests").expect("key");
        let mut kdb = Kdb::open(config, &parent).expect("open");

        let mut ks = KeySet::new();
        kdb.get(&mut ks, &parent).expect("get");

        // A deeper parent is covered by the earlier, wider get.
        let deeper = Key::new("user/tests/app").expect("key");
        ks.append_key(Key::new("user/tests/app/x").expect("key"));
        kdb.set(&mut ks, &deeper).expect("set below fetched parent");
    }
}
