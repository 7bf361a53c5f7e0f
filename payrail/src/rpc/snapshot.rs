//! Endpoint pairs and immutable configuration snapshots.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::network::{KnownNetwork, NetworkId};
use crate::timestamp::UnixTimestamp;

/// Primary and fallback RPC endpoint of one network.
///
/// Both URLs are always present; without a private endpoint both point at the
/// same public one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RpcEndpointPair {
    /// Endpoint tried first.
    #[serde(rename = "primary")]
    pub primary_url: Url,
    /// Endpoint tried once when the primary fails.
    #[serde(rename = "fallback")]
    pub fallback_url: Url,
}

impl RpcEndpointPair {
    /// Creates a pair.
    #[must_use]
    pub const fn new(primary_url: Url, fallback_url: Url) -> Self {
        Self {
            primary_url,
            fallback_url,
        }
    }

    /// A pair that uses the same endpoint twice.
    #[must_use]
    pub fn single(url: Url) -> Self {
        Self {
            fallback_url: url.clone(),
            primary_url: url,
        }
    }

    /// Parses a pair from strings.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotFormatError`] if either URL is empty, malformed or not HTTP(S).
    pub fn parse(primary: &str, fallback: &str) -> Result<Self, SnapshotFormatError> {
        Ok(Self::new(parse_http_url(primary)?, parse_http_url(fallback)?))
    }
}

fn parse_http_url(raw: &str) -> Result<Url, SnapshotFormatError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SnapshotFormatError::EmptyUrl);
    }
    let url = Url::parse(raw).map_err(|e| SnapshotFormatError::InvalidUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SnapshotFormatError::InvalidUrl {
            url: raw.to_owned(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

/// Errors in a snapshot document or one of its URLs.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotFormatError {
    /// The document is not valid JSON of the expected shape.
    #[error("malformed snapshot document: {0}")]
    Json(#[from] serde_json::Error),
    /// A URL was the empty string.
    #[error("empty RPC URL")]
    EmptyUrl,
    /// A URL did not parse or is not HTTP(S).
    #[error("invalid RPC URL {url}: {reason}")]
    InvalidUrl {
        /// Offending value.
        url: String,
        /// Why it was refused.
        reason: String,
    },
    /// The document lists no usable network at all.
    #[error("snapshot document contains no usable network")]
    Empty,
}

/// The complete `network_id -> RpcEndpointPair` map at one point in time.
///
/// Never mutated: a refresh builds a new snapshot and swaps it in whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfigSnapshot {
    version: String,
    retrieved_at: UnixTimestamp,
    networks: HashMap<NetworkId, RpcEndpointPair>,
}

impl RpcConfigSnapshot {
    /// Creates a snapshot.
    #[must_use]
    pub const fn new(
        version: String,
        retrieved_at: UnixTimestamp,
        networks: HashMap<NetworkId, RpcEndpointPair>,
    ) -> Self {
        Self {
            version,
            retrieved_at,
            networks,
        }
    }

    /// Builds the hardcoded safety snapshot from the public endpoints of known networks.
    #[must_use]
    pub fn hardcoded<'a>(known: impl IntoIterator<Item = &'a KnownNetwork>) -> Self {
        let networks = known
            .into_iter()
            .map(|k| (k.descriptor.network_id.clone(), k.public_rpc.clone()))
            .collect();
        Self::new("hardcoded".to_owned(), UnixTimestamp::from_secs(0), networks)
    }

    /// Returns a copy with `overrides` replacing the matching entries.
    #[must_use]
    pub fn with_overrides(
        &self,
        overrides: impl IntoIterator<Item = (NetworkId, RpcEndpointPair)>,
    ) -> Self {
        let mut networks = self.networks.clone();
        networks.extend(overrides);
        Self::new(self.version.clone(), self.retrieved_at, networks)
    }

    /// Version label of the snapshot.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// When the snapshot was retrieved.
    #[must_use]
    pub const fn retrieved_at(&self) -> UnixTimestamp {
        self.retrieved_at
    }

    /// Endpoint pair of one network.
    #[must_use]
    pub fn get(&self, network: &NetworkId) -> Option<&RpcEndpointPair> {
        self.networks.get(network)
    }

    /// Number of networks in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

/// One network entry of a [`SnapshotDocument`]. Missing URLs read as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentEndpoints {
    /// Primary URL.
    #[serde(default)]
    pub primary: String,
    /// Fallback URL.
    #[serde(default)]
    pub fallback: String,
}

/// The JSON document kept in the secret store.
///
/// ```json
/// {
///   "version": "7",
///   "last_updated": "2025-01-01T00:00:00Z",
///   "networks": { "base": { "primary": "https://...", "fallback": "https://..." } }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    /// Free-form version label (string or number).
    #[serde(default)]
    pub version: serde_json::Value,
    /// Free-form last-update marker.
    #[serde(default)]
    pub last_updated: Option<String>,
    /// Endpoints per network.
    pub networks: HashMap<String, DocumentEndpoints>,
}

impl SnapshotDocument {
    /// Parses a document from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotFormatError::Json`] if the text is not a valid document.
    pub fn parse(text: &str) -> Result<Self, SnapshotFormatError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Converts into a snapshot.
    ///
    /// Entries with an empty or invalid URL are left out so that lookups for
    /// those networks fall through to the hardcoded snapshot; the rest of the
    /// document is still used.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotFormatError::Empty`] if no entry survives.
    pub fn into_snapshot(
        self,
        retrieved_at: UnixTimestamp,
    ) -> Result<RpcConfigSnapshot, SnapshotFormatError> {
        let total = self.networks.len();
        let mut networks = HashMap::with_capacity(total);
        for (id, entry) in self.networks {
            match RpcEndpointPair::parse(&entry.primary, &entry.fallback) {
                Ok(pair) => {
                    networks.insert(NetworkId::new(id), pair);
                }
                Err(e) => {
                    tracing::warn!(network = %id, error = %e, "Ignoring RPC config entry");
                }
            }
        }
        if networks.is_empty() {
            return Err(SnapshotFormatError::Empty);
        }
        let version = match self.version {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => "unversioned".to_owned(),
            other => other.to_string(),
        };
        Ok(RpcConfigSnapshot::new(version, retrieved_at, networks))
    }
}

/// Shared handle to a snapshot.
pub type SharedSnapshot = Arc<RpcConfigSnapshot>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_rejects_empty_and_non_http() {
        assert!(matches!(
            RpcEndpointPair::parse("", "https://b.example"),
            Err(SnapshotFormatError::EmptyUrl)
        ));
        assert!(matches!(
            RpcEndpointPair::parse("wss://a.example", "https://b.example"),
            Err(SnapshotFormatError::InvalidUrl { .. })
        ));
        assert!(RpcEndpointPair::parse("https://a.example", "http://b.example").is_ok());
    }

    #[test]
    fn document_drops_only_broken_entries() {
        let doc = SnapshotDocument::parse(
            r#"{
                "version": 3,
                "last_updated": "2025-01-01",
                "networks": {
                    "base": { "primary": "https://a.example", "fallback": "https://b.example" },
                    "celo": { "primary": "", "fallback": "https://c.example" }
                }
            }"#,
        )
        .unwrap();
        let snapshot = doc.into_snapshot(UnixTimestamp::from_secs(10)).unwrap();
        assert_eq!(snapshot.version(), "3");
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(&"base".into()).is_some());
        assert!(snapshot.get(&"celo".into()).is_none());
    }

    #[test]
    fn document_without_usable_entries_is_an_error() {
        let doc = SnapshotDocument::parse(r#"{ "networks": { "x": { "primary": "" } } }"#).unwrap();
        assert!(matches!(
            doc.into_snapshot(UnixTimestamp::now()),
            Err(SnapshotFormatError::Empty)
        ));
    }

    #[test]
    fn overrides_replace_entries() {
        let a = Url::parse("https://a.example").unwrap();
        let b = Url::parse("https://b.example").unwrap();
        let base = RpcConfigSnapshot::new(
            "v".into(),
            UnixTimestamp::from_secs(0),
            HashMap::from([(NetworkId::new("base"), RpcEndpointPair::single(a))]),
        );
        let patched = base.with_overrides([(NetworkId::new("base"), RpcEndpointPair::single(b.clone()))]);
        assert_eq!(patched.get(&"base".into()).unwrap().primary_url, b);
        assert_ne!(base, patched);
    }
}
