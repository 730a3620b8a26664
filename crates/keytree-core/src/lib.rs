//! Core engine of the keytree configuration database: the key-name codec,
//! the reference-counted [`Key`], and the ordered [`KeySet`].
//!
//! Everything in this crate is pure in-memory work; storage plugins and the
//! database facade live in the `keytree` crate on top.

pub mod key;
pub mod keyset;
pub mod name;

pub use key::{Key, KeyBuilder};
pub use keyset::{KeySet, LookupOptions};
pub use name::KeyName;
