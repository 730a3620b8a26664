//! Shared vocabulary types for the keytree configuration database.
//!
//! The interesting machinery (name codec, key, key set) lives in
//! `keytree-core`; this crate holds the closed enumerations and small value
//! types both the core and the storage layer speak.

pub mod flags;
pub mod limits;
pub mod value;

pub use flags::{Facets, KeyFlags};
pub use value::KeyValue;

use std::fmt;

/// The top-level partition a key name belongs to.
///
/// The namespace is determined purely by the first segment of a name: a
/// leading `/` means cascading, a known root token (`spec`, `proc`, `dir`,
/// `user`, `system`, `default`) means that namespace, anything else is a
/// meta name. `user` may carry an owner suffix (`user:alice/...`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Namespace {
    /// No key at all (null handle in the C heritage; unused for live keys).
    None,
    /// The empty name.
    Empty,
    /// A name starting with `/`, resolved across concrete namespaces.
    Cascading,
    /// An unrooted name attached to another key as metadata.
    Meta,
    /// Specification keys.
    Spec,
    /// Process-local keys.
    Proc,
    /// Directory-local keys.
    Dir,
    /// Per-user keys.
    User,
    /// System-wide keys.
    System,
    /// Fallback default keys.
    Default,
}

impl Namespace {
    /// Resolution order for cascading lookups. A cascading name is tried
    /// against each of these concrete namespaces in turn; the first hit
    /// wins.
    pub const CASCADE_ORDER: [Self; 6] = [
        Self::Spec,
        Self::Proc,
        Self::Dir,
        Self::User,
        Self::System,
        Self::Default,
    ];

    /// Classify a full escaped name by its first segment.
    #[must_use]
    pub fn classify(name: &str) -> Self {
        if name.is_empty() {
            return Self::Empty;
        }
        if name.starts_with('/') {
            return Self::Cascading;
        }
        if Self::has_root(name, "spec", false) {
            return Self::Spec;
        }
        if Self::has_root(name, "proc", false) {
            return Self::Proc;
        }
        if Self::has_root(name, "dir", false) {
            return Self::Dir;
        }
        if Self::has_root(name, "user", true) {
            return Self::User;
        }
        if Self::has_root(name, "system", false) {
            return Self::System;
        }
        if Self::has_root(name, "default", false) {
            return Self::Default;
        }
        Self::Meta
    }

    /// The namespace token used as the first unescaped segment. Cascading
    /// names use a lone `/`, which sorts before every concrete namespace.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::None | Self::Empty | Self::Meta => "",
            Self::Cascading => "/",
            Self::Spec => "spec",
            Self::Proc => "proc",
            Self::Dir => "dir",
            Self::User => "user",
            Self::System => "system",
            Self::Default => "default",
        }
    }

    /// Whether this namespace is one of the concrete, storage-backed ones.
    #[must_use]
    pub const fn is_concrete(self) -> bool {
        matches!(
            self,
            Self::Spec | Self::Proc | Self::Dir | Self::User | Self::System | Self::Default
        )
    }

    fn has_root(name: &str, root: &str, allow_owner: bool) -> bool {
        let Some(rest) = name.strip_prefix(root) else {
            return false;
        };
        match rest.as_bytes().first() {
            None => true,
            Some(b'/') => true,
            Some(b':') => allow_owner,
            Some(_) => false,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Empty => "empty",
            Self::Cascading => "cascading",
            Self::Meta => "meta",
            other => other.token(),
        };
        f.write_str(label)
    }
}
