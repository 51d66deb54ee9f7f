//! Peer Identities
//!
//! Peers and service principals are addressed by public key rather than by
//! network address. The core treats an identity as an opaque, comparable
//! handle: it never looks inside the key, it only compares keys for equality
//! and renders them for logs.
//!
//! A distinguished wildcard, [`Identity::anyone`], matches every identity when
//! used as a route pattern.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of a compressed public key in bytes
pub const PUBLIC_KEY_LEN: usize = 33;

const ANYONE: &str = "anyone";

/// Errors returned when parsing an identity from text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Input was not valid hex
    #[error("invalid identity encoding: {0}")]
    Encoding(String),

    /// Key had the wrong length
    #[error("invalid public key length: expected {PUBLIC_KEY_LEN} bytes, got {0}")]
    Length(usize),
}

/// Identity of a peer or service principal
///
/// Cheap to clone (the key is reference counted). Two identities are equal
/// when their keys are byte-for-byte equal; the wildcard is only equal to
/// itself.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity(Option<Arc<[u8]>>);

impl Identity {
    /// The wildcard identity, matching any identity in a route pattern
    #[must_use]
    pub const fn anyone() -> Self {
        Self(None)
    }

    /// Build an identity from a compressed public key
    pub fn from_public_key(key: &[u8]) -> Result<Self, IdentityError> {
        if key.len() != PUBLIC_KEY_LEN {
            return Err(IdentityError::Length(key.len()));
        }
        Ok(Self(Some(Arc::from(key))))
    }

    /// Generate a random key-shaped identity
    ///
    /// Used for ephemeral nodes and tests; there is no private key behind it.
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let mut key = [0u8; PUBLIC_KEY_LEN];
        rand::thread_rng().fill(&mut key[1..]);
        key[0] = 0x02;
        Self(Some(Arc::from(&key[..])))
    }

    /// Whether this is the wildcard identity
    #[must_use]
    pub fn is_anyone(&self) -> bool {
        self.0.is_none()
    }

    /// Exact comparison (the wildcard only equals the wildcard)
    #[must_use]
    pub fn is_equal(&self, other: &Identity) -> bool {
        self == other
    }

    /// Whether this identity satisfies a route pattern
    ///
    /// A pattern matches when it is the wildcard or equal to `self`.
    #[must_use]
    pub fn matches(&self, pattern: &Identity) -> bool {
        pattern.is_anyone() || self == pattern
    }

    /// Raw public key bytes, `None` for the wildcard
    #[must_use]
    pub fn public_key(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    /// Abbreviated form for compact log lines
    #[must_use]
    pub fn short(&self) -> String {
        match &self.0 {
            Some(key) => hex::encode(&key[key.len() - 4..]),
            None => ANYONE.to_string(),
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::anyone()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(key) => write!(f, "{}", hex::encode(key)),
            None => write!(f, "{ANYONE}"),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.short())
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(ANYONE) {
            return Ok(Self::anyone());
        }
        let key = hex::decode(s).map_err(|e| IdentityError::Encoding(e.to_string()))?;
        Self::from_public_key(&key)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
