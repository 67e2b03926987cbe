//! Redacted secret bytes for configuration values.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A byte string that must never be printed, logged, or serialized in the
/// clear.
///
/// `Debug` and `Display` always render the fixed placeholder `"[redacted]"`.
/// The only way to obtain the raw bytes is [`SecretBytes::expose`], which
/// must be called only at the exact point a signature is computed or
/// verified — never stored, logged, or passed further than that call.
#[derive(Clone)]
pub struct SecretBytes(Vec<u8>);

const REDACTED: &str = "[redacted]";

impl SecretBytes {
    /// Wrap raw secret bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Number of bytes held, without exposing the contents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if no bytes are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Expose the raw bytes. Call only at the signature call site.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl From<String> for SecretBytes {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for SecretBytes {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretBytes").field(&REDACTED).finish()
    }
}

impl fmt::Display for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for SecretBytes {
    // Configuration may be round-tripped through structured logging or a
    // debug dump; never re-emit the raw key.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for SecretBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecretBytes::from)
    }
}
