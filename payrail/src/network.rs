//! Network identification and the registry of supported networks.
//!
//! Concrete catalogs live in the family crates (`payrail-evm`, `payrail-svm`);
//! applications assemble a [`NetworkRegistry`] from them at startup. The
//! registry is immutable afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::rpc::RpcEndpointPair;

/// Stable string key of a network, e.g. `base-sepolia`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(Arc<str>);

impl NetworkId {
    /// Creates a network id.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NetworkId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NetworkId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Blockchain family; decides which signature scheme and wire encoding apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// EVM-compatible chains (EIP-712 / ERC-3009 authorizations).
    Evm,
    /// Solana (ed25519 authorizations).
    Svm,
}

impl ChainFamily {
    /// Lowercase name used on the wire and in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Svm => "svm",
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters needed to rebuild the domain an authorization was signed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDomain {
    /// Domain name (EIP-712 `name` of the token, e.g. `USD Coin`).
    pub name: String,
    /// Domain version (EIP-712 `version`, e.g. `2`).
    pub version: String,
    /// Chain reference: the numeric chain id on EVM, the genesis hash on Solana.
    pub chain_reference: String,
    /// Address of the value-transfer token (ERC-3009 contract or SPL mint).
    pub verifying_contract: String,
}

impl SignatureDomain {
    /// The chain reference as an EVM numeric chain id, if it is one.
    #[must_use]
    pub fn numeric_chain_id(&self) -> Option<u64> {
        self.chain_reference.parse().ok()
    }
}

/// One supported chain. Immutable after process start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    /// Stable key.
    pub network_id: NetworkId,
    /// Family the chain belongs to.
    pub chain_family: ChainFamily,
    /// Symbol of the gas asset (`ETH`, `POL`, `SOL`, ...).
    pub native_asset_symbol: String,
    /// Decimals of the value-transfer token.
    pub token_decimals: u8,
    /// Signing domain for authorizations on this chain.
    pub signature_domain: SignatureDomain,
    /// Account paying transaction fees, where payers must name it in what
    /// they sign (Solana).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_payer: Option<String>,
}

/// A compiled-in network entry: its descriptor plus public RPC endpoints.
///
/// The public endpoints of all known networks form the hardcoded safety
/// snapshot of the RPC Configuration Manager.
#[derive(Debug, Clone)]
pub struct KnownNetwork {
    /// Network descriptor.
    pub descriptor: NetworkDescriptor,
    /// Public endpoints used when nothing better is configured.
    pub public_rpc: RpcEndpointPair,
}

/// Registry of supported networks, keyed by [`NetworkId`], in catalog order.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    ordered: Vec<NetworkDescriptor>,
    index: HashMap<NetworkId, usize>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated from descriptors.
    #[must_use]
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = NetworkDescriptor>) -> Self {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.insert(descriptor);
        }
        registry
    }

    /// Adds a descriptor, replacing an existing one with the same id.
    pub fn insert(&mut self, descriptor: NetworkDescriptor) -> &mut Self {
        if let Some(&pos) = self.index.get(&descriptor.network_id) {
            self.ordered[pos] = descriptor;
        } else {
            self.index
                .insert(descriptor.network_id.clone(), self.ordered.len());
            self.ordered.push(descriptor);
        }
        self
    }

    /// Keeps only the networks named in `allow`, preserving catalog order.
    ///
    /// Returns the ids from `allow` that are not in the registry.
    pub fn restrict(&mut self, allow: &[NetworkId]) -> Vec<NetworkId> {
        let unknown = allow
            .iter()
            .filter(|id| !self.index.contains_key(*id))
            .cloned()
            .collect();
        let kept: Vec<_> = self
            .ordered
            .drain(..)
            .filter(|d| allow.contains(&d.network_id))
            .collect();
        self.index.clear();
        for descriptor in kept {
            self.insert(descriptor);
        }
        unknown
    }

    /// Looks up a network by id.
    #[must_use]
    pub fn get(&self, id: &NetworkId) -> Option<&NetworkDescriptor> {
        self.index.get(id).map(|&pos| &self.ordered[pos])
    }

    /// Whether the registry knows `id`.
    #[must_use]
    pub fn contains(&self, id: &NetworkId) -> bool {
        self.index.contains_key(id)
    }

    /// Iterates descriptors in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkDescriptor> {
        self.ordered.iter()
    }

    /// Number of networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, family: ChainFamily) -> NetworkDescriptor {
        NetworkDescriptor {
            network_id: NetworkId::new(id),
            chain_family: family,
            native_asset_symbol: "ETH".into(),
            token_decimals: 6,
            signature_domain: SignatureDomain {
                name: "USD Coin".into(),
                version: "2".into(),
                chain_reference: "1".into(),
                verifying_contract: "0x0000000000000000000000000000000000000001".into(),
            },
            fee_payer: None,
        }
    }

    #[test]
    fn keeps_catalog_order() {
        let registry = NetworkRegistry::from_descriptors([
            descriptor("b", ChainFamily::Evm),
            descriptor("a", ChainFamily::Svm),
        ]);
        let ids: Vec<_> = registry.iter().map(|d| d.network_id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(
            registry.get(&"a".into()).unwrap().chain_family,
            ChainFamily::Svm
        );
    }

    #[test]
    fn insert_replaces_existing() {
        let mut registry = NetworkRegistry::new();
        registry.insert(descriptor("a", ChainFamily::Evm));
        registry.insert(descriptor("a", ChainFamily::Svm));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get(&"a".into()).unwrap().chain_family,
            ChainFamily::Svm
        );
    }

    #[test]
    fn restrict_reports_unknown_ids() {
        let mut registry = NetworkRegistry::from_descriptors([
            descriptor("a", ChainFamily::Evm),
            descriptor("b", ChainFamily::Evm),
            descriptor("c", ChainFamily::Evm),
        ]);
        let unknown = registry.restrict(&["c".into(), "a".into(), "zzz".into()]);
        assert_eq!(unknown, vec![NetworkId::new("zzz")]);
        let ids: Vec<_> = registry.iter().map(|d| d.network_id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert!(!registry.contains(&"b".into()));
    }

    #[test]
    fn numeric_chain_id() {
        let d = descriptor("a", ChainFamily::Evm);
        assert_eq!(d.signature_domain.numeric_chain_id(), Some(1));
    }
}
