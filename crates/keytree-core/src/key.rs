//! The reference-counted configuration key.
//!
//! A [`Key`] is a cheap handle (`Arc` around the payload) so the same key
//! can live in several key sets at once; the observable reference count is
//! the number of live handles. Mutators take `&self` and synchronise
//! through an internal `RwLock`, matching the single-threaded cooperative
//! model: no operation blocks on anything but its own data.
//!
//! Two rules keep shared keys sound:
//!
//! - the *name* of a shared key (reference count above one) may not change,
//!   since that would silently corrupt the sort order of every set holding
//!   it;
//! - meta keys are created with their name and value locked, so meta
//!   payloads can be shared between keys by reference without anyone
//!   mutating them in place.
//!
//! Getters that borrow (name, value) return mapped lock guards; drop the
//! guard before calling a mutator on the same key.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use keytree_error::{KeyTreeError, Result};
use keytree_types::limits::MAX_VALUE_SIZE;
use keytree_types::{Facets, KeyFlags, KeyValue, Namespace};

use crate::keyset::KeySet;
use crate::name::KeyName;

/// Name of the meta key carrying the owner of a user key.
pub const OWNER_META: &str = "owner";

pub(crate) struct KeyData {
    name: KeyName,
    value: KeyValue,
    flags: KeyFlags,
    meta: KeySet,
    needs_sync: bool,
}

/// A named, typed, metadata-carrying entry of the configuration tree.
pub struct Key {
    inner: Arc<RwLock<KeyData>>,
}

impl Clone for Key {
    /// Cloning the handle increments the reference count; it does not copy
    /// the key. Use [`Key::dup`] for a fresh copy.
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Key {
    /// Create a key with a canonical name and an empty string value.
    pub fn new(name: &str) -> Result<Self> {
        Self::builder(name).build()
    }

    /// Create a key with the empty name.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_data(KeyData {
            name: KeyName::empty(),
            value: KeyValue::default(),
            flags: KeyFlags::NONE,
            meta: KeySet::new(),
            needs_sync: true,
        })
    }

    /// Start building a key from its name.
    pub fn builder(name: &str) -> KeyBuilder {
        KeyBuilder::new(name)
    }

    fn from_data(data: KeyData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    /// Build a meta key: a regular key in the meta namespace whose name
    /// and value are locked so it can be shared by reference.
    fn new_meta(name: KeyName, value: &str) -> Self {
        Self::from_data(KeyData {
            name,
            value: KeyValue::Str(value.to_owned()),
            flags: KeyFlags::LOCK_NAME | KeyFlags::LOCK_VALUE,
            meta: KeySet::new(),
            needs_sync: true,
        })
    }

    /// Number of live handles to this key, key sets included.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether two handles refer to the same key.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // === Name facet ===

    /// The escaped canonical name; `""` for the empty name.
    #[must_use]
    pub fn name(&self) -> MappedRwLockReadGuard<'_, str> {
        RwLockReadGuard::map(self.inner.read(), |d| d.name.as_str())
    }

    /// The full [`KeyName`], for containment and ordering queries.
    #[must_use]
    pub fn key_name(&self) -> MappedRwLockReadGuard<'_, KeyName> {
        RwLockReadGuard::map(self.inner.read(), |d| &d.name)
    }

    /// The unescaped form: NUL-terminated segments, namespace token first.
    #[must_use]
    pub fn unescaped_name(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        RwLockReadGuard::map(self.inner.read(), |d| d.name.unescaped())
    }

    /// Bytes needed for the escaped name including its NUL; 1 when empty.
    #[must_use]
    pub fn name_size(&self) -> usize {
        self.inner.read().name.name_size()
    }

    /// Length of the unescaped form in bytes; 0 when empty.
    #[must_use]
    pub fn unescaped_size(&self) -> usize {
        self.inner.read().name.unescaped_size()
    }

    /// The namespace of this key.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.inner.read().name.namespace()
    }

    /// The unescaped last name part; `""` for root-only and empty names.
    #[must_use]
    pub fn base_name(&self) -> MappedRwLockReadGuard<'_, str> {
        RwLockReadGuard::map(self.inner.read(), |d| d.name.base_name())
    }

    /// Replace the whole name, canonicalising the input.
    ///
    /// `user:owner/...` names store the owner as the `owner` meta key; any
    /// previous owner is cleared. On an invalid name the key is left with
    /// the *empty* name (deliberately, for compatibility with callers that
    /// probe names). Fails without side effect when the name facet is
    /// locked or the key is shared.
    ///
    /// Returns the new escaped name size.
    pub fn set_name(&self, name: &str) -> Result<usize> {
        let mut d = self.write_for_rename()?;
        d.name = KeyName::empty();
        d.needs_sync = true;
        // A locked meta set keeps its owner entry; the rename proceeds.
        let _ = Self::set_meta_in(&mut d, OWNER_META, None);
        let (parsed, owner) = KeyName::parse(name)?;
        d.name = parsed;
        if let Some(owner) = owner {
            let _ = Self::set_meta_in(&mut d, OWNER_META, Some(owner.as_str()));
        }
        Ok(d.name.name_size())
    }

    /// Canonicalise `suffix` against the current name and append it. The
    /// namespace cannot change; `..` may walk back to the root but not
    /// above it. Fails without side effect.
    pub fn add_name(&self, suffix: &str) -> Result<usize> {
        let mut d = self.write_for_rename()?;
        d.name = d.name.append(suffix)?;
        d.needs_sync = true;
        Ok(d.name.name_size())
    }

    /// Escape `base` as a single part and append it to the name.
    pub fn add_base_name(&self, base: &str) -> Result<usize> {
        let mut d = self.write_for_rename()?;
        d.name = d.name.appending_base(base)?;
        d.needs_sync = true;
        Ok(d.name.name_size())
    }

    /// Escape `base` as a single part and replace the last name part.
    /// Fails on root-only names.
    pub fn set_base_name(&self, base: &str) -> Result<usize> {
        let mut d = self.write_for_rename()?;
        d.name = d.name.with_base(base)?;
        d.needs_sync = true;
        Ok(d.name.name_size())
    }

    fn write_for_rename(&self) -> Result<parking_lot::RwLockWriteGuard<'_, KeyData>> {
        let d = self.inner.write();
        if d.flags.contains(KeyFlags::LOCK_NAME) {
            return Err(KeyTreeError::locked("name"));
        }
        if Arc::strong_count(&self.inner) > 1 {
            return Err(KeyTreeError::membership_frozen(d.name.as_str()));
        }
        Ok(d)
    }

    // === Owner (user keys only) ===

    /// The owner stored on this key, if any.
    #[must_use]
    pub fn owner(&self) -> Option<String> {
        self.meta_value(OWNER_META)
    }

    /// Set or remove the owner meta key.
    pub fn set_owner(&self, owner: Option<&str>) -> Result<()> {
        match owner {
            Some("") | None => self.set_meta(OWNER_META, None),
            some => self.set_meta(OWNER_META, some),
        }
    }

    /// The name including the owner: `user:alice/sw` for a user key with
    /// owner `alice`, the plain name otherwise.
    #[must_use]
    pub fn full_name(&self) -> String {
        let d = self.inner.read();
        if d.name.namespace() == Namespace::User {
            if let Some(owner) = d.meta.find_by_name_str(OWNER_META).and_then(|k| {
                k.string().ok().map(|s| s.to_owned())
            }) {
                let rest = &d.name.as_str()["user".len()..];
                return format!("user:{owner}{rest}");
            }
        }
        d.name.as_str().to_owned()
    }

    // === Value facet ===

    /// Borrow the string value; fails on binary keys.
    pub fn string(&self) -> Result<MappedRwLockReadGuard<'_, str>> {
        let d = self.inner.read();
        if d.value.is_binary() {
            return Err(KeyTreeError::type_mismatch("string", "binary"));
        }
        Ok(RwLockReadGuard::map(d, |d| match &d.value {
            KeyValue::Str(s) => s.as_str(),
            KeyValue::Binary(_) => "",
        }))
    }

    /// Borrow the binary value; fails on string keys.
    pub fn binary(&self) -> Result<MappedRwLockReadGuard<'_, [u8]>> {
        let d = self.inner.read();
        if !d.value.is_binary() {
            return Err(KeyTreeError::type_mismatch("binary", "string"));
        }
        Ok(RwLockReadGuard::map(d, |d| match &d.value {
            KeyValue::Binary(b) => b.as_slice(),
            KeyValue::Str(_) => &[],
        }))
    }

    /// Clone out the tagged value.
    #[must_use]
    pub fn value(&self) -> KeyValue {
        self.inner.read().value.clone()
    }

    /// Whether the value is binary.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.inner.read().value.is_binary()
    }

    /// Value size per the wire convention: string length plus NUL, binary
    /// payload length.
    #[must_use]
    pub fn value_size(&self) -> usize {
        self.inner.read().value.size()
    }

    /// Set a string value, marking the key as string. Returns the stored
    /// size including the NUL.
    pub fn set_string(&self, value: &str) -> Result<usize> {
        self.set_value(KeyValue::Str(value.to_owned()))
    }

    /// Set a binary value, marking the key as binary. Returns the payload
    /// length.
    pub fn set_binary(&self, value: &[u8]) -> Result<usize> {
        self.set_value(KeyValue::Binary(value.to_vec()))
    }

    /// Replace the tagged value wholesale.
    pub fn set_value(&self, value: KeyValue) -> Result<usize> {
        if value.raw().len() > MAX_VALUE_SIZE {
            return Err(KeyTreeError::invalid_argument("value exceeds size limit"));
        }
        let mut d = self.inner.write();
        if d.flags.contains(KeyFlags::LOCK_VALUE) {
            return Err(KeyTreeError::locked("value"));
        }
        d.value = value;
        d.needs_sync = true;
        Ok(d.value.size())
    }

    // === Lock facet ===

    /// Lock the given facets; locks only ever accumulate.
    pub fn lock(&self, facets: Facets) {
        let mut d = self.inner.write();
        d.flags |= KeyFlags::lock_for(facets);
    }

    /// Whether all of the given facets are locked.
    #[must_use]
    pub fn is_locked(&self, facets: Facets) -> bool {
        self.inner.read().flags.contains(KeyFlags::lock_for(facets))
    }

    // === Whole-key operations ===

    /// Reset name, value and meta to the empty state. Any lock forbids the
    /// reset entirely; a partial clear never happens.
    pub fn clear(&self) -> Result<()> {
        let mut d = self.inner.write();
        if d.flags.intersects(KeyFlags::LOCK_ALL) {
            let facet = if d.flags.contains(KeyFlags::LOCK_NAME) {
                "name"
            } else if d.flags.contains(KeyFlags::LOCK_VALUE) {
                "value"
            } else {
                "meta"
            };
            return Err(KeyTreeError::locked(facet));
        }
        d.name = KeyName::empty();
        d.value = KeyValue::default();
        d.meta = KeySet::new();
        d.needs_sync = true;
        Ok(())
    }

    /// Replace the selected facets of `self` with those of `src`.
    ///
    /// Locked facets on the destination block the whole copy; nothing is
    /// transferred on failure. The meta facet is copied by reference
    /// (shared handles), the value by payload.
    pub fn copy_from(&self, src: &Self, what: Facets) -> Result<()> {
        if self.same(src) || what.is_empty() {
            return Ok(());
        }
        let (name, value, meta, owner) = {
            let s = src.inner.read();
            (
                what.contains(Facets::NAME).then(|| s.name.clone()),
                what.contains(Facets::VALUE).then(|| s.value.clone()),
                what.contains(Facets::META).then(|| s.meta.clone()),
                what.contains(Facets::OWNER)
                    .then(|| s.meta.find_by_name_str(OWNER_META)),
            )
        };
        let mut d = self.inner.write();
        let mut guarded = KeyFlags::lock_for(what);
        if what.contains(Facets::OWNER) {
            guarded |= KeyFlags::LOCK_META;
        }
        if d.flags.intersects(guarded) {
            let facet = if what.contains(Facets::NAME) && d.flags.contains(KeyFlags::LOCK_NAME) {
                "name"
            } else if what.contains(Facets::VALUE) && d.flags.contains(KeyFlags::LOCK_VALUE) {
                "value"
            } else {
                "meta"
            };
            return Err(KeyTreeError::locked(facet));
        }
        if name.is_some() && Arc::strong_count(&self.inner) > 1 {
            return Err(KeyTreeError::membership_frozen(d.name.as_str()));
        }
        if let Some(name) = name {
            d.name = name;
        }
        if let Some(value) = value {
            d.value = value;
        }
        if let Some(meta) = meta {
            d.meta = meta;
        }
        if let Some(owner) = owner {
            match owner {
                Some(key) => {
                    d.meta.append_key(key);
                }
                None => {
                    if let Ok(name) = KeyName::parse_meta(OWNER_META) {
                        d.meta.remove(&name);
                    }
                }
            }
        }
        d.needs_sync = true;
        Ok(())
    }

    /// Copy the selected facets onto a fresh key.
    pub fn dup(&self, what: Facets) -> Result<Self> {
        let fresh = Self::empty();
        fresh.copy_from(self, what)?;
        Ok(fresh)
    }

    /// Total order consistent with unescaped-name byte order; `Equal` iff
    /// the names are equal.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        if self.same(other) {
            return Ordering::Equal;
        }
        self.key_name().cmp(&other.key_name())
    }

    /// Which facets differ between two keys: name, value, owner, meta
    /// (meta compared without the owner entry).
    #[must_use]
    pub fn diff(&self, other: &Self) -> Facets {
        if self.same(other) {
            return Facets::NONE;
        }
        let a = self.inner.read();
        let b = other.inner.read();
        let mut out = Facets::NONE;
        if a.name != b.name {
            out |= Facets::NAME;
        }
        if a.value != b.value {
            out |= Facets::VALUE;
        }
        let owner_a = a.meta.find_by_name_str(OWNER_META);
        let owner_b = b.meta.find_by_name_str(OWNER_META);
        if meta_entry_value(owner_a.as_ref()) != meta_entry_value(owner_b.as_ref()) {
            out |= Facets::OWNER;
        }
        if !meta_equal_without_owner(&a.meta, &b.meta) {
            out |= Facets::META;
        }
        out
    }

    // === Sync flag ===

    /// Whether this key changed since the last storage round trip.
    #[must_use]
    pub fn needs_sync(&self) -> bool {
        self.inner.read().needs_sync
    }

    /// Mark this key as in sync with storage.
    pub fn clear_sync(&self) {
        self.inner.write().needs_sync = false;
    }

    // === Meta facet ===

    /// Look up a meta key by its unrooted name. The returned handle shares
    /// the meta key; its name and value are locked.
    #[must_use]
    pub fn meta(&self, name: &str) -> Option<Self> {
        let name = KeyName::parse_meta(name).ok()?;
        self.inner.read().meta.find_by_name(&name)
    }

    /// Convenience: the string value of a meta key, if present.
    #[must_use]
    pub fn meta_value(&self, name: &str) -> Option<String> {
        self.meta(name)
            .and_then(|k| k.string().ok().map(|s| s.to_owned()))
    }

    /// Insert, replace or (with `None`) remove a meta key. Meta values are
    /// always strings.
    pub fn set_meta(&self, name: &str, value: Option<&str>) -> Result<()> {
        let mut d = self.inner.write();
        Self::set_meta_in(&mut d, name, value)?;
        d.needs_sync = true;
        Ok(())
    }

    fn set_meta_in(d: &mut KeyData, name: &str, value: Option<&str>) -> Result<()> {
        if d.flags.contains(KeyFlags::LOCK_META) {
            return Err(KeyTreeError::locked("meta"));
        }
        let name = KeyName::parse_meta(name)?;
        match value {
            Some(value) => {
                d.meta.append_key(Self::new_meta(name, value));
            }
            None => {
                d.meta.remove(&name);
            }
        }
        Ok(())
    }

    /// Share one meta key of `src` by reference; if `src` has no such meta
    /// key, it is removed here too.
    pub fn copy_meta(&self, src: &Self, name: &str) -> Result<()> {
        let parsed = KeyName::parse_meta(name)?;
        let entry = src.inner.read().meta.find_by_name(&parsed);
        let mut d = self.inner.write();
        if d.flags.contains(KeyFlags::LOCK_META) {
            return Err(KeyTreeError::locked("meta"));
        }
        match entry {
            Some(key) => {
                d.meta.append_key(key);
            }
            None => {
                d.meta.remove(&parsed);
            }
        }
        d.needs_sync = true;
        Ok(())
    }

    /// Share all meta keys of `src` by reference, replacing collisions.
    pub fn copy_all_meta(&self, src: &Self) -> Result<()> {
        if self.same(src) {
            return Ok(());
        }
        let meta = src.inner.read().meta.clone();
        let mut d = self.inner.write();
        if d.flags.contains(KeyFlags::LOCK_META) {
            return Err(KeyTreeError::locked("meta"));
        }
        d.meta.append_all(&meta);
        d.needs_sync = true;
        Ok(())
    }

    /// A shallow snapshot of the meta key set (shared handles).
    #[must_use]
    pub fn meta_set(&self) -> KeySet {
        self.inner.read().meta.clone()
    }
}

fn meta_entry_value(entry: Option<&Key>) -> Option<String> {
    entry.and_then(|k| k.string().ok().map(|s| s.to_owned()))
}

fn meta_equal_without_owner(a: &KeySet, b: &KeySet) -> bool {
    let pairs = |ks: &KeySet| -> Vec<(String, Option<String>)> {
        ks.iter()
            .filter(|k| &*k.name() != OWNER_META)
            .map(|k| {
                (
                    k.name().to_owned(),
                    k.string().ok().map(|s| s.to_owned()),
                )
            })
            .collect()
    };
    pairs(a) == pairs(b)
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_read() {
            Some(d) => f
                .debug_struct("Key")
                .field("name", &d.name.as_str())
                .field("value", &d.value)
                .finish_non_exhaustive(),
            None => f.debug_struct("Key").finish_non_exhaustive(),
        }
    }
}

/// Builder for [`Key`]: name first, then attributes, then [`build`].
///
/// [`build`]: KeyBuilder::build
#[derive(Debug, Default)]
pub struct KeyBuilder {
    name: String,
    value: Option<KeyValue>,
    metas: Vec<(String, String)>,
    flags: KeyFlags,
    size_hint: usize,
}

impl KeyBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set a string value.
    #[must_use]
    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(KeyValue::Str(value.to_owned()));
        self
    }

    /// Set a binary value (exclusive with [`value`]; the last call wins).
    ///
    /// [`value`]: KeyBuilder::value
    #[must_use]
    pub fn binary(mut self, value: &[u8]) -> Self {
        self.value = Some(KeyValue::Binary(value.to_vec()));
        self
    }

    /// OR additional flags into the key.
    #[must_use]
    pub fn flags(mut self, flags: KeyFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Attach one meta entry; repeatable.
    #[must_use]
    pub fn meta(mut self, name: &str, value: &str) -> Self {
        self.metas.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Reserve capacity for a binary value set later.
    #[must_use]
    pub fn size_hint(mut self, bytes: usize) -> Self {
        self.size_hint = bytes;
        self
    }

    /// Lock the name after construction.
    #[must_use]
    pub fn lock_name(self) -> Self {
        self.flags(KeyFlags::LOCK_NAME)
    }

    /// Lock the value after construction.
    #[must_use]
    pub fn lock_value(self) -> Self {
        self.flags(KeyFlags::LOCK_VALUE)
    }

    /// Lock the meta set after construction.
    #[must_use]
    pub fn lock_meta(self) -> Self {
        self.flags(KeyFlags::LOCK_META)
    }

    /// Build the key. Fails with `invalid-name` on a malformed name; locks
    /// take effect only after the initial value and meta are in place.
    pub fn build(self) -> Result<Key> {
        let (name, owner) = KeyName::parse(&self.name)?;
        let value = match self.value {
            Some(value) => value,
            None if self.flags.contains(KeyFlags::BINARY) => {
                KeyValue::Binary(Vec::with_capacity(self.size_hint))
            }
            None => KeyValue::default(),
        };
        if value.raw().len() > MAX_VALUE_SIZE {
            return Err(KeyTreeError::invalid_argument("value exceeds size limit"));
        }
        let mut meta = KeySet::new();
        for (meta_name, meta_value) in &self.metas {
            meta.append_key(Key::new_meta(KeyName::parse_meta(meta_name)?, meta_value));
        }
        if let Some(owner) = owner {
            meta.append_key(Key::new_meta(KeyName::parse_meta(OWNER_META)?, &owner));
        }
        Ok(Key::from_data(KeyData {
            name,
            value,
            flags: self.flags,
            meta,
            needs_sync: true,
        }))
    }
}

impl PartialEq for Key {
    /// Handle identity, not structural equality; use [`Key::diff`] to
    /// compare contents.
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Key {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_key_defaults() {
        let k = Key::new("user/sw/app").expect("key should build");
        assert_eq!(&*k.name(), "user/sw/app");
        assert_eq!(&*k.string().expect("string value"), "");
        assert!(!k.is_binary());
        assert!(k.needs_sync());
        assert_eq!(k.reference_count(), 1);
    }

    #[test]
    fn empty_key_sizes() {
        let k = Key::empty();
        assert_eq!(&*k.name(), "");
        assert_eq!(k.name_size(), 1);
        assert_eq!(k.unescaped_size(), 0);
        assert_eq!(k.namespace(), Namespace::Empty);
    }

    #[test]
    fn builder_attributes() {
        let k = Key::builder("system/hosts")
            .value("localhost")
            .meta("comment", "hosts mount")
            .meta("check/validation", "[a-z]+")
            .build()
            .expect("key should build");
        assert_eq!(&*k.string().expect("string"), "localhost");
        assert_eq!(k.meta_value("comment").as_deref(), Some("hosts mount"));
        assert_eq!(k.meta_value("check/validation").as_deref(), Some("[a-z]+"));
    }

    #[test]
    fn builder_binary_flag() {
        let k = Key::builder("user/blob")
            .flags(KeyFlags::BINARY)
            .size_hint(16)
            .build()
            .expect("key should build");
        assert!(k.is_binary());
        assert_eq!(&*k.binary().expect("binary"), b"");
        assert_eq!(k.value_size(), 0);
    }

    #[test]
    fn builder_locks_apply_after_initial_state() {
        let k = Key::builder("user/locked")
            .value("fixed")
            .lock_value()
            .build()
            .expect("key should build");
        assert_eq!(&*k.string().expect("string"), "fixed");
        assert!(k.is_locked(Facets::VALUE));
        assert!(matches!(
            k.set_string("other"),
            Err(KeyTreeError::Locked { facet: "value" })
        ));
        assert_eq!(&*k.string().expect("string"), "fixed");
    }

    #[test]
    fn set_name_canonicalises() {
        let k = Key::empty();
        k.set_name("user///sw/../sw//././MyApp").expect("set_name");
        assert_eq!(&*k.name(), "user/sw/MyApp");
    }

    #[test]
    fn set_name_failure_leaves_name_empty() {
        let k = Key::new("user/sw").expect("key should build");
        assert!(k.set_name("not-a-namespace/x").is_err());
        assert_eq!(&*k.name(), "");
        assert_eq!(k.namespace(), Namespace::Empty);
    }

    #[test]
    fn set_name_replaces_owner() {
        let k = Key::new("user:alice/sw").expect("key should build");
        assert_eq!(k.owner().as_deref(), Some("alice"));
        assert_eq!(k.full_name(), "user:alice/sw");

        k.set_name("user/other").expect("set_name");
        assert_eq!(k.owner(), None);
        assert_eq!(k.full_name(), "user/other");

        k.set_name("user:bob/x").expect("set_name");
        assert_eq!(k.full_name(), "user:bob/x");
    }

    #[test]
    fn add_name_and_base_names() {
        let k = Key::new("user/sw/app").expect("key should build");
        k.add_base_name("my.key").expect("add_base_name");
        assert_eq!(&*k.name(), "user/sw/app/my\\.key");
        assert_eq!(&*k.base_name(), "my.key");
        assert_eq!(&*k.unescaped_name(), b"user\0sw\0app\0my.key\0");

        k.set_base_name("other").expect("set_base_name");
        assert_eq!(&*k.name(), "user/sw/app/other");

        k.add_name("../lib/x").expect("add_name");
        assert_eq!(&*k.name(), "user/sw/app/lib/x");
    }

    #[test]
    fn name_locked_blocks_rename() {
        let k = Key::new("user/a").expect("key should build");
        k.lock(Facets::NAME);
        assert!(matches!(
            k.set_name("user/b"),
            Err(KeyTreeError::Locked { facet: "name" })
        ));
        // Failure through the lock leaves the name untouched.
        assert_eq!(&*k.name(), "user/a");
    }

    #[test]
    fn shared_key_name_is_frozen() {
        let k = Key::new("user/a").expect("key should build");
        let other = k.clone();
        assert_eq!(k.reference_count(), 2);
        assert!(matches!(
            k.set_name("user/b"),
            Err(KeyTreeError::MembershipFrozen { .. })
        ));
        assert_eq!(&*k.name(), "user/a");
        drop(other);
        k.set_name("user/b").expect("sole handle may rename");
        assert_eq!(&*k.name(), "user/b");
    }

    #[test]
    fn value_type_tagging() {
        let k = Key::new("user/v").expect("key should build");
        assert_eq!(k.set_string("hello").expect("set_string"), 6);
        assert!(matches!(
            k.binary(),
            Err(KeyTreeError::TypeMismatch {
                expected: "binary",
                actual: "string"
            })
        ));
        assert_eq!(k.set_binary(&[1, 2, 3]).expect("set_binary"), 3);
        assert!(k.is_binary());
        assert!(k.string().is_err());
        assert_eq!(&*k.binary().expect("binary"), &[1, 2, 3]);
    }

    #[test]
    fn clear_resets_everything() {
        let k = Key::builder("user/x")
            .value("v")
            .meta("comment", "c")
            .build()
            .expect("key should build");
        k.clear().expect("clear");
        assert_eq!(&*k.name(), "");
        assert_eq!(&*k.string().expect("string"), "");
        assert_eq!(k.meta("comment"), None);
    }

    #[test]
    fn clear_blocked_by_any_lock() {
        let k = Key::builder("user/x").value("v").lock_meta().build().expect("build");
        assert!(matches!(k.clear(), Err(KeyTreeError::Locked { facet: "meta" })));
        // Nothing was reset.
        assert_eq!(&*k.name(), "user/x");
        assert_eq!(&*k.string().expect("string"), "v");
    }

    #[test]
    fn copy_selected_facets() {
        let src = Key::builder("user/src")
            .value("payload")
            .meta("comment", "shared")
            .build()
            .expect("build");
        let dst = Key::new("user/dst").expect("build");

        dst.copy_from(&src, Facets::VALUE | Facets::META).expect("copy");
        assert_eq!(&*dst.name(), "user/dst");
        assert_eq!(&*dst.string().expect("string"), "payload");
        // Meta is shared by reference, not copied.
        let src_meta = src.meta("comment").expect("meta");
        let dst_meta = dst.meta("comment").expect("meta");
        assert!(src_meta.same(&dst_meta));
    }

    #[test]
    fn copy_locked_facet_is_atomic() {
        let src = Key::builder("user/src").value("v").meta("m", "1").build().expect("build");
        let dst = Key::builder("user/dst").lock_value().build().expect("build");
        assert!(dst.copy_from(&src, Facets::VALUE | Facets::META).is_err());
        // The unlocked meta facet must not have been copied either.
        assert_eq!(dst.meta("m"), None);
    }

    #[test]
    fn dup_is_a_fresh_key() {
        let src = Key::builder("user/src").value("v").build().expect("build");
        let copy = src.dup(Facets::ALL).expect("dup");
        assert!(!copy.same(&src));
        assert_eq!(&*copy.name(), "user/src");
        assert_eq!(&*copy.string().expect("string"), "v");
        assert_eq!(src.reference_count(), 1);
        assert_eq!(copy.reference_count(), 1);
    }

    #[test]
    fn compare_follows_unescaped_order() {
        let a = Key::new("system/a").expect("build");
        let b = Key::new("user/a").expect("build");
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
        let a2 = Key::new("system/a").expect("build");
        assert_eq!(a.compare(&a2), Ordering::Equal);
    }

    #[test]
    fn diff_reports_facets() {
        let a = Key::builder("user/x").value("1").meta("comment", "c").build().expect("build");
        let b = Key::builder("user/x").value("2").meta("comment", "c").build().expect("build");
        assert_eq!(a.diff(&b), Facets::VALUE);

        let c = Key::builder("user:alice/x").value("1").meta("comment", "c").build().expect("build");
        assert_eq!(a.diff(&c), Facets::OWNER);

        let d = Key::builder("user/y").value("1").meta("comment", "d").build().expect("build");
        assert_eq!(a.diff(&d), Facets::NAME | Facets::META);

        assert_eq!(a.diff(&a.clone()), Facets::NONE);
    }

    #[test]
    fn meta_set_get_remove() {
        let k = Key::new("user/x").expect("build");
        k.set_meta("check/validation", Some("[0-9]+")).expect("set_meta");
        assert_eq!(k.meta_value("check/validation").as_deref(), Some("[0-9]+"));

        // Replacement swaps the shared meta key for a fresh one.
        let first = k.meta("check/validation").expect("meta");
        k.set_meta("check/validation", Some("[a-z]+")).expect("set_meta");
        let second = k.meta("check/validation").expect("meta");
        assert!(!first.same(&second));

        k.set_meta("check/validation", None).expect("remove");
        assert_eq!(k.meta("check/validation"), None);
    }

    #[test]
    fn meta_keys_are_immutable() {
        let k = Key::new("user/x").expect("build");
        k.set_meta("comment", Some("stable")).expect("set_meta");
        let m = k.meta("comment").expect("meta");
        assert!(m.set_string("changed").is_err());
        assert!(m.set_name("user/elsewhere").is_err());
    }

    #[test]
    fn copy_meta_shares_and_removes() {
        let src = Key::builder("user/src").meta("comment", "big payload").build().expect("build");
        let dst = Key::new("user/dst").expect("build");

        dst.copy_meta(&src, "comment").expect("copy_meta");
        let a = src.meta("comment").expect("meta");
        let b = dst.meta("comment").expect("meta");
        assert!(a.same(&b));
        assert_eq!(a.reference_count(), 4); // two meta sets + two lookups

        // Copying an absent meta key removes it on the destination.
        dst.copy_meta(&src, "absent").expect("copy_meta");
        src.set_meta("comment", None).expect("remove");
        dst.copy_meta(&src, "comment").expect("copy_meta");
        assert_eq!(dst.meta("comment"), None);
    }

    #[test]
    fn copy_all_meta_shares_handles() {
        let src = Key::builder("user/src")
            .meta("a", "1")
            .meta("b", "2")
            .build()
            .expect("build");
        let dst = Key::new("user/dst").expect("build");
        dst.copy_all_meta(&src).expect("copy_all_meta");
        assert!(src.meta("a").expect("meta").same(&dst.meta("a").expect("meta")));
        assert!(src.meta("b").expect("meta").same(&dst.meta("b").expect("meta")));
    }

    #[test]
    fn meta_locked_blocks_mutation() {
        let k = Key::builder("user/x").meta("a", "1").lock_meta().build().expect("build");
        assert!(matches!(
            k.set_meta("a", Some("2")),
            Err(KeyTreeError::Locked { facet: "meta" })
        ));
        assert_eq!(k.meta_value("a").as_deref(), Some("1"));
    }

    #[test]
    fn sync_flag_lifecycle() {
        let k = Key::new("user/x").expect("build");
        assert!(k.needs_sync());
        k.clear_sync();
        assert!(!k.needs_sync());
        k.set_string("v").expect("set_string");
        assert!(k.needs_sync());
        k.clear_sync();
        k.set_meta("comment", Some("c")).expect("set_meta");
        assert!(k.needs_sync());
    }

    #[test]
    fn reference_count_tracks_handles() {
        let k = Key::new("user/x").expect("build");
        assert_eq!(k.reference_count(), 1);
        let k2 = k.clone();
        assert_eq!(k.reference_count(), 2);
        drop(k2);
        assert_eq!(k.reference_count(), 1);
    }
}
