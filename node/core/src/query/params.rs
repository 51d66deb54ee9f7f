//! Query string parameters (`path?key=value&key2=value2`)

use std::collections::HashMap;

use thiserror::Error;

use super::Nonce;
use crate::identity::Identity;

/// Errors from typed parameter lookups
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    /// The key is not present
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The value could not be parsed as the requested type
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Offending key
        key: String,
        /// Parser message
        reason: String,
    },
}

/// Split a query string into its path and raw parameter string
#[must_use]
pub fn split_query(query: &str) -> (&str, &str) {
    match query.find('?') {
        Some(i) => (&query[..i], &query[i + 1..]),
        None => (query, ""),
    }
}

/// Render a path and parameters back into a query string
///
/// Keys are written in sorted order so the output is stable.
#[must_use]
pub fn encode_query(path: &str, params: &QueryParams) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let mut pairs: Vec<_> = params.0.iter().collect();
    pairs.sort();
    let encoded: Vec<String> = pairs.into_iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{path}?{}", encoded.join("&"))
}

/// Parsed query parameters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams(HashMap<String, String>);

impl QueryParams {
    /// Empty parameter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `k=v&k2=v2`; an item without `=` is stored under the empty key
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut params = HashMap::new();
        for item in raw.split('&').filter(|s| !s.is_empty()) {
            match item.split_once('=') {
                Some((k, v)) => params.insert(k.to_string(), v.to_string()),
                None => params.insert(String::new(), item.to_string()),
            };
        }
        Self(params)
    }

    /// Raw string value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Set a raw string value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn require(&self, key: &str) -> Result<&str, ParamError> {
        self.get(key)
            .ok_or_else(|| ParamError::KeyNotFound(key.to_string()))
    }

    fn invalid(key: &str, reason: impl ToString) -> ParamError {
        ParamError::Invalid {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Signed integer value
    pub fn get_int(&self, key: &str) -> Result<i64, ParamError> {
        self.require(key)?
            .parse()
            .map_err(|e| Self::invalid(key, e))
    }

    /// Set a signed integer value
    pub fn set_int(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, value.to_string());
    }

    /// Unsigned integer value
    pub fn get_u64(&self, key: &str) -> Result<u64, ParamError> {
        self.require(key)?
            .parse()
            .map_err(|e| Self::invalid(key, e))
    }

    /// Boolean value (`true`/`false`/`1`/`0`)
    pub fn get_bool(&self, key: &str) -> Result<bool, ParamError> {
        match self.require(key)? {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(Self::invalid(key, format!("not a bool: {other}"))),
        }
    }

    /// Nonce value (16 hex digits)
    pub fn get_nonce(&self, key: &str) -> Result<Nonce, ParamError> {
        self.require(key)?
            .parse::<Nonce>()
            .map_err(|e| match e {
                ParamError::Invalid { reason, .. } => Self::invalid(key, reason),
                other => other,
            })
    }

    /// Set a nonce value (zero padded to 16 hex digits)
    pub fn set_nonce(&mut self, key: impl Into<String>, nonce: Nonce) {
        self.set(key, nonce.to_string());
    }

    /// Identity value
    pub fn get_identity(&self, key: &str) -> Result<Identity, ParamError> {
        self.require(key)?
            .parse()
            .map_err(|e| Self::invalid(key, e))
    }

    /// Set an identity value
    pub fn set_identity(&mut self, key: impl Into<String>, identity: &Identity) {
        self.set(key, identity.to_string());
    }
}
