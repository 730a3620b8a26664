//! The tagged value payload of a key.

use keytree_error::{KeyTreeError, Result};

/// A key value: either a UTF-8 string or an opaque byte buffer.
///
/// The two are mutually exclusive; reading one as the other fails with a
/// type mismatch. The size convention follows the wire format: strings
/// count their terminating NUL, binary buffers count their payload only.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum KeyValue {
    /// A UTF-8 string value.
    Str(String),
    /// An opaque binary value.
    Binary(Vec<u8>),
}

impl KeyValue {
    /// The label used in type-mismatch errors.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Binary(_) => "binary",
        }
    }

    /// Whether this is a binary value.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Borrow the string payload, or fail with a type mismatch.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::Str(s) => Ok(s),
            Self::Binary(_) => Err(KeyTreeError::type_mismatch("string", "binary")),
        }
    }

    /// Borrow the binary payload, or fail with a type mismatch.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Self::Binary(b) => Ok(b),
            Self::Str(_) => Err(KeyTreeError::type_mismatch("binary", "string")),
        }
    }

    /// Borrow the raw payload regardless of tag.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        match self {
            Self::Str(s) => s.as_bytes(),
            Self::Binary(b) => b,
        }
    }

    /// Build a string value from raw bytes, failing on ill-formed UTF-8.
    pub fn str_from_bytes(bytes: Vec<u8>) -> Result<Self> {
        match String::from_utf8(bytes) {
            Ok(s) => Ok(Self::Str(s)),
            Err(_) => Err(KeyTreeError::InvalidUtf8 {
                what: "string value".to_owned(),
            }),
        }
    }

    /// Size in bytes per the wire convention: string length including the
    /// terminating NUL, binary payload length as-is.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Str(s) => s.len() + 1,
            Self::Binary(b) => b.len(),
        }
    }
}

impl Default for KeyValue {
    /// A fresh key holds the empty string.
    fn default() -> Self {
        Self::Str(String::new())
    }
}
