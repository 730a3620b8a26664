//! The storage plugin contract and the bundled backends.
//!
//! A backend exports `get` and `set` over a key set bounded by a parent
//! key, reporting changed / unchanged / error (the classic 1 / 0 / -1).
//! Backends may rewrite the key set during set-chain processing; errors
//! and warnings travel as meta keys on the parent.

pub mod json;
pub mod mem;
pub mod validation;

pub use json::JsonFileBackend;
pub use mem::MemBackend;
pub use validation::ValidationBackend;

use keytree_core::{Key, KeySet};
use keytree_error::Result;

/// Root of the backend self-description keys.
pub const MODULES_ROOT: &str = "system/keytree/modules";

/// Outcome of a successful plugin call: `Changed` is the wire status 1,
/// `Unchanged` is 0. Errors are the wire status -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    /// Nothing to do; the key set was left as-is.
    Unchanged,
    /// The key set (or the underlying storage) was updated.
    Changed,
}

impl PluginStatus {
    /// The numeric wire status.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Unchanged => 0,
            Self::Changed => 1,
        }
    }
}

/// A storage plugin in a mount chain.
///
/// `open` and `close` bracket the chain's lifetime; `get` populates the
/// returned set from storage, `set` commits it. All four receive the
/// parent key bounding the operation, which doubles as the carrier for
/// error and warning meta.
pub trait Backend {
    /// Stable name, used as the `module` of diagnostics and as the
    /// self-description path below [`MODULES_ROOT`].
    fn name(&self) -> &'static str;

    /// Prepare runtime state. The default is a no-op.
    fn open(&mut self, parent: &Key) -> Result<PluginStatus> {
        let _ = parent;
        Ok(PluginStatus::Unchanged)
    }

    /// Fetch keys below `parent` into `returned`.
    fn get(&mut self, returned: &mut KeySet, parent: &Key) -> Result<PluginStatus>;

    /// Commit the keys of `returned` below `parent`. The default refuses
    /// nothing and stores nothing.
    fn set(&mut self, returned: &mut KeySet, parent: &Key) -> Result<PluginStatus> {
        let _ = (returned, parent);
        Ok(PluginStatus::Unchanged)
    }

    /// Tear down runtime state. The default is a no-op.
    fn close(&mut self, parent: &Key) -> Result<()> {
        let _ = parent;
        Ok(())
    }
}

/// Whether `parent` asks for the self-description of `module`.
#[must_use]
pub fn describes(parent: &Key, module: &str) -> bool {
    let Ok(root) = Key::new(&format!("{MODULES_ROOT}/{module}")) else {
        return false;
    };
    let parent_name = parent.key_name();
    parent_name.is_below_or_same(&root.key_name()) || root.key_name().is_below_or_same(&parent_name)
}

/// Build the self-description key set a backend's `get` contributes below
/// [`MODULES_ROOT`]: the module key itself, its version, and one key per
/// exported operation.
pub fn module_description(
    module: &str,
    version: &str,
    exports: &[&str],
) -> Result<KeySet> {
    let root = format!("{MODULES_ROOT}/{module}");
    let mut ks = KeySet::with_capacity(exports.len() + 3);
    ks.append_key(
        Key::builder(&root)
            .value(&format!("{module} backend is loaded"))
            .build()?,
    );
    ks.append_key(Key::new(&format!("{root}/exports"))?);
    for export in exports {
        ks.append_key(Key::new(&format!("{root}/exports/{export}"))?);
    }
    ks.append_key(
        Key::builder(&format!("{root}/infos/version"))
            .value(version)
            .build()?,
    );
    Ok(ks)
}
