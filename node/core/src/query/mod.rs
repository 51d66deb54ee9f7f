//! Queries
//!
//! A [`Query`] is a single routing request: a caller identity asks a target
//! identity for a named service. Queries are immutable once built; routers
//! that want to attach metadata build a new query from the old one.
//!
//! The query string is a service path optionally followed by parameters:
//!
//! ```text
//!   storage.read?id=0a1b&offset=512
//!   └────┬─────┘ └───────┬────────┘
//!       path          params
//! ```

mod params;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

pub use params::{encode_query, split_query, ParamError, QueryParams};

// ============================================================================
// Nonce
// ============================================================================

/// Process-wide unique token identifying one routing attempt
///
/// Rendered as 16 lowercase hex digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nonce(u64);

impl Nonce {
    /// Draw a fresh random nonce
    #[must_use]
    pub fn new() -> Self {
        Self(rand::random())
    }

    /// Raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Nonce {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for Nonce {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Nonce {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(ParamError::Invalid {
                key: "nonce".to_string(),
                reason: "invalid nonce length".to_string(),
            });
        }
        // from_str_radix alone would take a sign
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParamError::Invalid {
                key: "nonce".to_string(),
                reason: "nonce must be hex digits".to_string(),
            });
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| ParamError::Invalid {
                key: "nonce".to_string(),
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// Extra
// ============================================================================

/// Open key/value side-channel attached to a query by intermediate routers
///
/// Keys are unique; insertion order is irrelevant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Extra(HashMap<String, serde_json::Value>);

impl Extra {
    /// Typed lookup; `None` if the key is missing or has another shape
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Raw lookup
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Whether a key is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over all entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    fn insert(&mut self, key: String, value: serde_json::Value) {
        self.0.insert(key, value);
    }
}

// ============================================================================
// Query
// ============================================================================

/// A routing request from a caller to a target naming a service path
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    caller: Identity,
    target: Identity,
    query: String,
    nonce: Nonce,
    extra: Extra,
}

impl Query {
    /// Build a query with a fresh nonce and no extra metadata
    pub fn new(caller: Identity, target: Identity, query: impl Into<String>) -> Self {
        Self {
            caller,
            target,
            query: query.into(),
            nonce: Nonce::new(),
            extra: Extra::default(),
        }
    }

    /// Use a specific nonce (reroutes and tests)
    #[must_use]
    pub fn with_nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = nonce;
        self
    }

    /// Attach a metadata entry, replacing any previous value for `key`
    ///
    /// Values that cannot be represented as JSON are stored as `null`.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.extra.insert(key.into(), value);
        self
    }

    /// Identity of the party asking
    #[must_use]
    pub fn caller(&self) -> &Identity {
        &self.caller
    }

    /// Identity being asked
    #[must_use]
    pub fn target(&self) -> &Identity {
        &self.target
    }

    /// Full query string, parameters included
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Service path (the query string without parameters)
    #[must_use]
    pub fn path(&self) -> &str {
        split_query(&self.query).0
    }

    /// Parsed parameters (empty if there are none)
    #[must_use]
    pub fn params(&self) -> QueryParams {
        QueryParams::parse(split_query(&self.query).1)
    }

    /// Routing nonce
    #[must_use]
    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    /// Metadata attached by intermediate routers
    #[must_use]
    pub fn extra(&self) -> &Extra {
        &self.extra
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}:{}", self.caller, self.target, self.query)
    }
}
