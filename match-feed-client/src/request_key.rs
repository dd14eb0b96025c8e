use crate::endpoint::FeedEndpoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Keys longer than this have their parameter part replaced by a digest
pub const MAX_READABLE_KEY_LEN: usize = 256;

/// Identifies one logical unit of upstream work.
///
/// Two calls with equal keys are the same request, whoever issues them.
#[derive(Hash, Eq, PartialEq, PartialOrd, Ord, Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build a canonical key from a scope and query parameters.
    ///
    /// Parameters are sorted and percent-encoded, so the same query yields
    /// the same key regardless of the order it was assembled in.
    pub fn from_params<K, V>(scope: &str, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<(String, String)> = params
            .iter()
            .map(|(name, value)| {
                (
                    urlencoding::encode(name.as_ref()).into_owned(),
                    urlencoding::encode(value.as_ref()).into_owned(),
                )
            })
            .collect();
        pairs.sort();

        let query = pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        if scope.len() + 1 + query.len() <= MAX_READABLE_KEY_LEN {
            return Self(format!("{scope}:{query}"));
        }

        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        let hash = hex::encode(hasher.finalize());
        Self(format!("{scope}:#{hash}"))
    }

    /// Key for a backend resource queried with `params`
    pub fn for_endpoint<K, V>(endpoint: FeedEndpoint, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::from_params(endpoint.as_ref(), params)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for RequestKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl AsRef<str> for RequestKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
