//! Error types for the keytree configuration database.
//!
//! Structured variants for the failure kinds of the core library, plus a
//! numeric [`StatusCode`] mapping for the storage-plugin wire convention
//! (positive on success, -1 on failure, error number carried as metadata).

use thiserror::Error;

/// Primary error type for keytree operations.
#[derive(Error, Debug)]
pub enum KeyTreeError {
    // === Argument errors ===
    /// A required argument was missing or out of range.
    #[error("invalid argument: {what}")]
    InvalidArgument { what: String },

    /// A key name failed validation or canonicalisation.
    #[error("invalid key name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A name, or a string value, contained ill-formed UTF-8.
    #[error("invalid UTF-8 in {what}")]
    InvalidUtf8 { what: String },

    // === Mutation errors ===
    /// A mutation was blocked by a lock flag on the key.
    #[error("key facet '{facet}' is locked")]
    Locked { facet: &'static str },

    /// A name change was rejected because the key is shared (it would
    /// silently corrupt the sort order of every set holding it).
    #[error("cannot rename '{name}': key is referenced by a key set")]
    MembershipFrozen { name: String },

    /// A string value was read as binary, or vice versa.
    #[error("value type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    // === Resource errors ===
    /// Allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    // === Facade errors ===
    /// `set` was invoked without a prior matching `get`.
    #[error("set without prior get below '{parent}'")]
    NeedsGet { parent: String },

    /// A storage plugin failed; the reason is also attached as error meta
    /// on the parent key of the operation.
    #[error("storage plugin '{module}' failed: {reason}")]
    StorageError { module: String, reason: String },

    /// File I/O error from a storage plugin.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Numeric status codes for the plugin wire convention and for the
/// `error/number` / `warnings/#NN/number` meta keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    /// Successful result.
    Ok = 0,
    /// Argument missing or out of range.
    InvalidArgument = 1,
    /// Key name failed validation.
    InvalidName = 2,
    /// Mutation blocked by a lock flag.
    Locked = 3,
    /// String/binary value type confusion.
    TypeMismatch = 4,
    /// Allocation failed.
    OutOfMemory = 5,
    /// `set` without prior `get`.
    NeedsGet = 6,
    /// Ill-formed UTF-8.
    InvalidUtf8 = 7,
    /// Rename of a shared key.
    MembershipFrozen = 8,
    /// I/O failure in a storage plugin.
    Io = 9,
    /// Could not compile a validation expression.
    ValidationSyntax = 41,
    /// A value did not match its validation expression.
    ValidationFailed = 42,
    /// Generic storage plugin failure.
    StorageError = 74,
}

impl KeyTreeError {
    /// Map this error to its numeric status code.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument { .. } => StatusCode::InvalidArgument,
            Self::InvalidName { .. } => StatusCode::InvalidName,
            Self::InvalidUtf8 { .. } => StatusCode::InvalidUtf8,
            Self::Locked { .. } => StatusCode::Locked,
            Self::MembershipFrozen { .. } => StatusCode::MembershipFrozen,
            Self::TypeMismatch { .. } => StatusCode::TypeMismatch,
            Self::OutOfMemory => StatusCode::OutOfMemory,
            Self::NeedsGet { .. } => StatusCode::NeedsGet,
            Self::StorageError { .. } => StatusCode::StorageError,
            Self::Io(_) => StatusCode::Io,
        }
    }

    /// The numeric wire status: always -1, the in-memory failure convention.
    pub const fn wire_status(&self) -> i32 {
        -1
    }

    /// Whether the caller can likely fix this without code changes.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::InvalidName { .. }
                | Self::InvalidUtf8 { .. }
                | Self::NeedsGet { .. }
        )
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(what: impl Into<String>) -> Self {
        Self::InvalidArgument { what: what.into() }
    }

    /// Create an invalid-name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a locked-facet error.
    pub const fn locked(facet: &'static str) -> Self {
        Self::Locked { facet }
    }

    /// Create a membership-frozen error.
    pub fn membership_frozen(name: impl Into<String>) -> Self {
        Self::MembershipFrozen { name: name.into() }
    }

    /// Create a type-mismatch error.
    pub const fn type_mismatch(expected: &'static str, actual: &'static str) -> Self {
        Self::TypeMismatch { expected, actual }
    }

    /// Create a needs-get error.
    pub fn needs_get(parent: impl Into<String>) -> Self {
        Self::NeedsGet {
            parent: parent.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageError {
            module: module.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using [`KeyTreeError`].
pub type Result<T> = std::result::Result<T, KeyTreeError>;
