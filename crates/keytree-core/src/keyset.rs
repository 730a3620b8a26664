//! The ordered key set.
//!
//! A [`KeySet`] keeps its keys sorted by the byte order of their unescaped
//! names, which groups every subtree into a contiguous range: a parent's
//! unescaped name is a strict prefix of all of its descendants'. That makes
//! membership a binary search, `cut` a range drain, and cascading lookup a
//! handful of probes.
//!
//! The cursor is an explicit index rather than an external iterator so
//! that mutation has a defined effect: any operation that can shift
//! indices (append, cut, pop) resets the cursor to before-first.

use keytree_error::Result;
use keytree_types::{Facets, Namespace};

use crate::key::Key;
use crate::name::KeyName;

/// Options for [`KeySet::lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LookupOptions(u32);

impl LookupOptions {
    /// Return the found key and leave it in the set.
    pub const NONE: Self = Self(0);

    /// Remove the found key from the set and transfer it to the caller.
    pub const POP: Self = Self(0x1);

    /// Remove the found key and release the set's reference. Ownership
    /// transfer makes this the same operation as [`POP`]: the set's
    /// reference becomes the returned handle.
    ///
    /// [`POP`]: LookupOptions::POP
    pub const DEL: Self = Self(0x2);

    /// Combine two option sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every option in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    const fn removes(self) -> bool {
        self.0 & (Self::POP.0 | Self::DEL.0) != 0
    }
}

impl std::ops::BitOr for LookupOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// An ordered collection of keys with unique names.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: Vec<Key>,
    cursor: Option<usize>,
    dirty: bool,
}

impl Clone for KeySet {
    /// A shallow duplicate: the new set shares the keys by reference
    /// (each key's reference count grows by one) and starts with a fresh
    /// cursor. Use [`KeySet::dup`] for deep copies.
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            cursor: None,
            dirty: self.dirty,
        }
    }
}

impl KeySet {
    /// Create an empty key set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty key set with room for `capacity` keys.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            cursor: None,
            dirty: false,
        }
    }

    /// Build a set from keys, in order, deduplicated by name with the last
    /// write winning.
    pub fn from_keys<I: IntoIterator<Item = Key>>(keys: I) -> Self {
        let iter = keys.into_iter();
        let mut set = Self::with_capacity(iter.size_hint().0);
        for key in iter {
            set.append_key(key);
        }
        set
    }

    /// Number of keys in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate the keys in order without touching the cursor.
    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.keys.iter()
    }

    /// The first key in sort order.
    #[must_use]
    pub fn head(&self) -> Option<Key> {
        self.keys.first().cloned()
    }

    /// The last key in sort order.
    #[must_use]
    pub fn tail(&self) -> Option<Key> {
        self.keys.last().cloned()
    }

    /// The key at `index`, if any.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<Key> {
        self.keys.get(index).cloned()
    }

    // === Membership ===

    /// Insert a key at its sorted position.
    ///
    /// A key with the same unescaped name is replaced, releasing the set's
    /// reference to it; otherwise the set takes a new reference. The
    /// cursor resets to before-first. Returns the new size.
    pub fn append_key(&mut self, key: Key) -> usize {
        let search = {
            let name = key.key_name();
            self.search_unescaped(name.unescaped())
        };
        match search {
            Ok(i) => self.keys[i] = key,
            Err(i) => self.keys.insert(i, key),
        }
        self.cursor = None;
        self.dirty = true;
        self.keys.len()
    }

    /// Append every key of `other` by reference, with the same
    /// replace-on-collision rule. Returns the new size.
    pub fn append_all(&mut self, other: &Self) -> usize {
        for key in &other.keys {
            self.append_key(key.clone());
        }
        self.keys.len()
    }

    /// Detach the whole subtree at or below `cutpoint`'s name and return
    /// it as a new set, order preserved. A cutpoint naming nothing in the
    /// set yields an empty set. The cursor resets to before-first.
    pub fn cut(&mut self, cutpoint: &Key) -> Self {
        let name = cutpoint.key_name().clone();
        self.cut_name(&name)
    }

    pub(crate) fn cut_name(&mut self, name: &KeyName) -> Self {
        let start = match self.search_unescaped(name.unescaped()) {
            Ok(i) | Err(i) => i,
        };
        let mut end = start;
        while end < self.keys.len() && name.is_below_or_same(&self.keys[end].key_name()) {
            end += 1;
        }
        let detached: Vec<Key> = self.keys.drain(start..end).collect();
        self.cursor = None;
        if !detached.is_empty() {
            self.dirty = true;
        }
        Self {
            keys: detached,
            cursor: None,
            dirty: true,
        }
    }

    /// Remove and return the last key, transferring ownership. The cursor
    /// resets to before-first.
    pub fn pop(&mut self) -> Option<Key> {
        self.cursor = None;
        let key = self.keys.pop();
        if key.is_some() {
            self.dirty = true;
        }
        key
    }

    /// Remove the key with exactly this name, if present.
    pub(crate) fn remove(&mut self, name: &KeyName) -> Option<Key> {
        match self.search_unescaped(name.unescaped()) {
            Ok(i) => {
                self.cursor = None;
                self.dirty = true;
                Some(self.keys.remove(i))
            }
            Err(_) => None,
        }
    }

    /// A deep duplicate: every key is copied payload and all, meta shared
    /// by reference as always.
    pub fn dup(&self) -> Result<Self> {
        let mut keys = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            keys.push(key.dup(Facets::ALL)?);
        }
        Ok(Self {
            keys,
            cursor: None,
            dirty: true,
        })
    }

    /// Replace this set's contents with references to `src`'s keys.
    pub fn copy_from(&mut self, src: &Self) {
        self.keys = src.keys.clone();
        self.cursor = None;
        self.dirty = true;
    }

    // === Cursor ===

    /// Reset the cursor to before-first.
    pub fn rewind(&mut self) {
        self.cursor = None;
    }

    /// Advance the cursor and return the key it lands on, or `None` at the
    /// end.
    pub fn next(&mut self) -> Option<Key> {
        let idx = self.cursor.map_or(0, |c| c.saturating_add(1));
        self.cursor = Some(idx.min(self.keys.len()));
        self.keys.get(idx).cloned()
    }

    /// The key under the cursor, or `None` before-first and past-end.
    #[must_use]
    pub fn current(&self) -> Option<Key> {
        self.keys.get(self.cursor?).cloned()
    }

    /// The cursor position: `None` is before-first.
    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Place the cursor at an absolute position.
    pub fn set_cursor(&mut self, cursor: Option<usize>) {
        self.cursor = cursor;
    }

    // === Search and lookup ===

    /// Binary search by unescaped name. `Ok` carries the index of the
    /// match, `Err` the insertion point (the information the classic
    /// `-(insert_pos+1)` return encodes).
    pub fn search(&self, key: &Key) -> std::result::Result<usize, usize> {
        let name = key.key_name();
        self.search_unescaped(name.unescaped())
    }

    fn search_unescaped(&self, unescaped: &[u8]) -> std::result::Result<usize, usize> {
        self.keys
            .binary_search_by(|k| k.key_name().unescaped().cmp(unescaped))
    }

    /// Find a key by exact name without moving the cursor.
    #[must_use]
    pub fn find_by_name(&self, name: &KeyName) -> Option<Key> {
        let i = self.search_unescaped(name.unescaped()).ok()?;
        self.keys.get(i).cloned()
    }

    /// Find a key by its escaped name string; accepts rooted, cascading
    /// and meta names. Cascading names resolve like [`KeySet::lookup`].
    #[must_use]
    pub fn find_by_name_str(&self, name: &str) -> Option<Key> {
        let parsed = match KeyName::parse(name) {
            Ok((parsed, _)) => parsed,
            Err(_) => KeyName::parse_meta(name).ok()?,
        };
        if parsed.namespace() == Namespace::Cascading {
            Namespace::CASCADE_ORDER
                .iter()
                .filter_map(|&ns| parsed.resolved_in(ns))
                .find_map(|resolved| self.find_by_name(&resolved))
        } else {
            self.find_by_name(&parsed)
        }
    }

    /// Look up a key by the query key's name.
    ///
    /// Non-cascading names search exactly. Cascading names (leading `/`)
    /// probe the concrete namespaces in the fixed resolution order and
    /// return the first hit. With [`LookupOptions::POP`] (or `DEL`) the
    /// found key is removed from the set and ownership transfers to the
    /// caller. The query key is never mutated; a miss is `None`, not an
    /// error.
    pub fn lookup(&mut self, key: &Key, options: LookupOptions) -> Option<Key> {
        let name = key.key_name().clone();
        self.lookup_key_name(&name, options)
    }

    /// [`KeySet::lookup`] by escaped name string. Invalid names miss.
    pub fn lookup_name(&mut self, name: &str, options: LookupOptions) -> Option<Key> {
        let parsed = match KeyName::parse(name) {
            Ok((parsed, _)) => parsed,
            Err(_) => KeyName::parse_meta(name).ok()?,
        };
        self.lookup_key_name(&parsed, options)
    }

    fn lookup_key_name(&mut self, name: &KeyName, options: LookupOptions) -> Option<Key> {
        if name.namespace() == Namespace::Cascading {
            for ns in Namespace::CASCADE_ORDER {
                let resolved = name.resolved_in(ns)?;
                if let Some(found) = self.take_or_peek(&resolved, options) {
                    return Some(found);
                }
            }
            None
        } else {
            self.take_or_peek(name, options)
        }
    }

    fn take_or_peek(&mut self, name: &KeyName, options: LookupOptions) -> Option<Key> {
        let i = self.search_unescaped(name.unescaped()).ok()?;
        if options.removes() {
            self.cursor = None;
            self.dirty = true;
            Some(self.keys.remove(i))
        } else {
            self.cursor = Some(i);
            self.keys.get(i).cloned()
        }
    }

    // === Sync ===

    /// Whether the membership changed or any key needs a storage round
    /// trip.
    #[must_use]
    pub fn needs_sync(&self) -> bool {
        self.dirty || self.keys.iter().any(Key::needs_sync)
    }

    /// Mark the set and every key as in sync with storage.
    pub fn clear_sync(&mut self) {
        self.dirty = false;
        for key in &self.keys {
            key.clear_sync();
        }
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}
