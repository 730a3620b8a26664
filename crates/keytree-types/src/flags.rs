//! Flag bitsets for key facets and key construction.

/// A subset of the facets of a key: name, value, meta, owner.
///
/// Used to select what `copy`/`dup` transfer, to report what `diff` found
/// unequal, and (minus owner) to address the lockable facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Facets(u32);

impl Facets {
    /// The empty facet set.
    pub const NONE: Self = Self(0);

    /// The key name (and with it the unescaped form).
    pub const NAME: Self = Self(0x01);

    /// The value payload, including its string/binary tag.
    pub const VALUE: Self = Self(0x02);

    /// The attached meta key set.
    pub const META: Self = Self(0x04);

    /// The owner (stored as the `owner` meta key on user keys).
    pub const OWNER: Self = Self(0x08);

    /// All facets.
    pub const ALL: Self = Self(0x0F);

    /// Combine two facet sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every facet in `other` is present in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any facet in `other` is present in `self`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether no facet is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Add the facets of `other` in place.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for Facets {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for Facets {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

/// Internal key flags, OR-able into a key at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyFlags(u32);

impl KeyFlags {
    /// No flags.
    pub const NONE: Self = Self(0);

    /// The value is an opaque byte buffer rather than a string.
    pub const BINARY: Self = Self(0x01);

    /// The name may not change anymore.
    pub const LOCK_NAME: Self = Self(0x02);

    /// The value may not change anymore.
    pub const LOCK_VALUE: Self = Self(0x04);

    /// The meta key set may not change anymore.
    pub const LOCK_META: Self = Self(0x08);

    /// All three lock flags.
    pub const LOCK_ALL: Self = Self(0x02 | 0x04 | 0x08);

    /// Combine two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any flag in `other` is set.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Add the flags of `other` in place. Lock flags only ever accumulate.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// The lock flag guarding the given facet, if that facet is lockable.
    #[must_use]
    pub const fn lock_for(facet: Facets) -> Self {
        let mut bits = 0;
        if facet.contains(Facets::NAME) {
            bits |= Self::LOCK_NAME.0;
        }
        if facet.contains(Facets::VALUE) {
            bits |= Self::LOCK_VALUE.0;
        }
        if facet.contains(Facets::META) {
            bits |= Self::LOCK_META.0;
        }
        Self(bits)
    }
}

impl std::ops::BitOr for KeyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for KeyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}
