//! Public API facade for the keytree configuration database.
//!
//! Applications open a [`Kdb`] handle against a mount configuration, fetch
//! the subtree below a *parent key* into a [`KeySet`], mutate keys in
//! memory, and commit the subtree back. Everything except the facade is
//! pure in-memory work; only [`Kdb::get`], [`Kdb::set`] and [`Kdb::close`]
//! touch storage.

pub use keytree_core::{Key, KeyBuilder, KeyName, KeySet, LookupOptions};
pub use keytree_error::{KeyTreeError, Result, StatusCode};
pub use keytree_types::{Facets, KeyFlags, KeyValue, Namespace};

pub mod backend;
pub mod diagnostics;
pub mod kdb;

pub use backend::{Backend, PluginStatus};
pub use kdb::{Kdb, MountConfig, UpdateStatus};
