//! Compiled-in EVM networks and their USDC deployments.
//!
//! Every entry carries two public RPC endpoints; together they are the EVM
//! part of the hardcoded safety snapshot.

use alloy_primitives::{Address, address};
use payrail::network::{ChainFamily, KnownNetwork, NetworkDescriptor, NetworkId, SignatureDomain};
use payrail::rpc::RpcEndpointPair;

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: u64 = 1;
/// Base Mainnet chain ID.
pub const BASE_MAINNET: u64 = 8453;
/// Base Sepolia (testnet) chain ID.
pub const BASE_SEPOLIA: u64 = 84532;
/// OP Mainnet chain ID.
pub const OPTIMISM_MAINNET: u64 = 10;
/// OP Sepolia (testnet) chain ID.
pub const OPTIMISM_SEPOLIA: u64 = 11_155_420;
/// Arbitrum One chain ID.
pub const ARBITRUM_ONE: u64 = 42161;
/// Arbitrum Sepolia (testnet) chain ID.
pub const ARBITRUM_SEPOLIA: u64 = 421_614;
/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: u64 = 137;
/// Polygon Amoy (testnet) chain ID.
pub const POLYGON_AMOY: u64 = 80002;
/// Avalanche C-Chain chain ID.
pub const AVALANCHE_MAINNET: u64 = 43114;
/// Avalanche Fuji (testnet) chain ID.
pub const AVALANCHE_FUJI: u64 = 43113;
/// Celo Mainnet chain ID.
pub const CELO_MAINNET: u64 = 42220;

/// USDC on Ethereum Mainnet.
pub const USDC_ETHEREUM: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
/// USDC on Base Mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
/// USDC on Base Sepolia.
pub const USDC_BASE_SEPOLIA: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");
/// USDC on OP Mainnet.
pub const USDC_OPTIMISM: Address = address!("0b2C639c533813f4Aa9D7837CAf62653d097Ff85");
/// USDC on OP Sepolia.
pub const USDC_OPTIMISM_SEPOLIA: Address = address!("5fd84259d66Cd46123540766Be93DFE6D43130D7");
/// USDC on Arbitrum One.
pub const USDC_ARBITRUM: Address = address!("af88d065e77c8cC2239327C5EDb3A432268e5831");
/// USDC on Arbitrum Sepolia.
pub const USDC_ARBITRUM_SEPOLIA: Address = address!("75faf114eafb1BDbe2F0316DF893fd58CE46AA4d");
/// USDC on Polygon Mainnet.
pub const USDC_POLYGON: Address = address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359");
/// USDC on Polygon Amoy.
pub const USDC_POLYGON_AMOY: Address = address!("41E94Eb71Ef8C9fAE0235d1e472b21E21B5a4dbF");
/// USDC on Avalanche C-Chain.
pub const USDC_AVALANCHE: Address = address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");
/// USDC on Avalanche Fuji.
pub const USDC_AVALANCHE_FUJI: Address = address!("5425890298aed601595a70AB815c96711a31Bc65");
/// USDC on Celo.
pub const USDC_CELO: Address = address!("cebA9300f2b948710d2653dD7B07f33A8B32118C");

/// Default EIP-712 domain name for USDC.
pub const DEFAULT_USDC_NAME: &str = "USD Coin";
/// Default EIP-712 domain version for USDC.
pub const DEFAULT_USDC_VERSION: &str = "2";
/// Default token decimals for USDC.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

struct CatalogEntry {
    id: &'static str,
    chain_id: u64,
    native_asset: &'static str,
    usdc: Address,
    domain_name: &'static str,
    primary_rpc: &'static str,
    fallback_rpc: &'static str,
}

const CATALOG: [CatalogEntry; 12] = [
    CatalogEntry {
        id: "ethereum",
        chain_id: ETHEREUM_MAINNET,
        native_asset: "ETH",
        usdc: USDC_ETHEREUM,
        domain_name: DEFAULT_USDC_NAME,
        primary_rpc: "https://eth.llamarpc.com",
        fallback_rpc: "https://ethereum-rpc.publicnode.com",
    },
    CatalogEntry {
        id: "base",
        chain_id: BASE_MAINNET,
        native_asset: "ETH",
        usdc: USDC_BASE,
        domain_name: DEFAULT_USDC_NAME,
        primary_rpc: "https://mainnet.base.org",
        fallback_rpc: "https://base-rpc.publicnode.com",
    },
    CatalogEntry {
        id: "base-sepolia",
        chain_id: BASE_SEPOLIA,
        native_asset: "ETH",
        usdc: USDC_BASE_SEPOLIA,
        domain_name: "USDC",
        primary_rpc: "https://sepolia.base.org",
        fallback_rpc: "https://base-sepolia-rpc.publicnode.com",
    },
    CatalogEntry {
        id: "optimism",
        chain_id: OPTIMISM_MAINNET,
        native_asset: "ETH",
        usdc: USDC_OPTIMISM,
        domain_name: DEFAULT_USDC_NAME,
        primary_rpc: "https://mainnet.optimism.io",
        fallback_rpc: "https://optimism-rpc.publicnode.com",
    },
    CatalogEntry {
        id: "optimism-sepolia",
        chain_id: OPTIMISM_SEPOLIA,
        native_asset: "ETH",
        usdc: USDC_OPTIMISM_SEPOLIA,
        domain_name: "USDC",
        primary_rpc: "https://sepolia.optimism.io",
        fallback_rpc: "https://optimism-sepolia-rpc.publicnode.com",
    },
    CatalogEntry {
        id: "arbitrum",
        chain_id: ARBITRUM_ONE,
        native_asset: "ETH",
        usdc: USDC_ARBITRUM,
        domain_name: DEFAULT_USDC_NAME,
        primary_rpc: "https://arb1.arbitrum.io/rpc",
        fallback_rpc: "https://arbitrum-one-rpc.publicnode.com",
    },
    CatalogEntry {
        id: "arbitrum-sepolia",
        chain_id: ARBITRUM_SEPOLIA,
        native_asset: "ETH",
        usdc: USDC_ARBITRUM_SEPOLIA,
        domain_name: "USDC",
        primary_rpc: "https://sepolia-rollup.arbitrum.io/rpc",
        fallback_rpc: "https://arbitrum-sepolia-rpc.publicnode.com",
    },
    CatalogEntry {
        id: "polygon",
        chain_id: POLYGON_MAINNET,
        native_asset: "POL",
        usdc: USDC_POLYGON,
        domain_name: DEFAULT_USDC_NAME,
        primary_rpc: "https://polygon-rpc.com",
        fallback_rpc: "https://polygon-bor-rpc.publicnode.com",
    },
    CatalogEntry {
        id: "polygon-amoy",
        chain_id: POLYGON_AMOY,
        native_asset: "POL",
        usdc: USDC_POLYGON_AMOY,
        domain_name: "USDC",
        primary_rpc: "https://rpc-amoy.polygon.technology",
        fallback_rpc: "https://polygon-amoy-bor-rpc.publicnode.com",
    },
    CatalogEntry {
        id: "avalanche",
        chain_id: AVALANCHE_MAINNET,
        native_asset: "AVAX",
        usdc: USDC_AVALANCHE,
        domain_name: DEFAULT_USDC_NAME,
        primary_rpc: "https://api.avax.network/ext/bc/C/rpc",
        fallback_rpc: "https://avalanche-c-chain-rpc.publicnode.com",
    },
    CatalogEntry {
        id: "avalanche-fuji",
        chain_id: AVALANCHE_FUJI,
        native_asset: "AVAX",
        usdc: USDC_AVALANCHE_FUJI,
        domain_name: DEFAULT_USDC_NAME,
        primary_rpc: "https://api.avax-test.network/ext/bc/C/rpc",
        fallback_rpc: "https://avalanche-fuji-c-chain-rpc.publicnode.com",
    },
    CatalogEntry {
        id: "celo",
        chain_id: CELO_MAINNET,
        native_asset: "CELO",
        usdc: USDC_CELO,
        domain_name: "USDC",
        primary_rpc: "https://forno.celo.org",
        fallback_rpc: "https://celo-rpc.publicnode.com",
    },
];

impl CatalogEntry {
    fn known(&self) -> Option<KnownNetwork> {
        let public_rpc = RpcEndpointPair::parse(self.primary_rpc, self.fallback_rpc).ok()?;
        Some(KnownNetwork {
            descriptor: NetworkDescriptor {
                network_id: NetworkId::new(self.id),
                chain_family: ChainFamily::Evm,
                native_asset_symbol: self.native_asset.to_owned(),
                token_decimals: DEFAULT_TOKEN_DECIMALS,
                signature_domain: SignatureDomain {
                    name: self.domain_name.to_owned(),
                    version: DEFAULT_USDC_VERSION.to_owned(),
                    chain_reference: self.chain_id.to_string(),
                    verifying_contract: self.usdc.to_checksum(None),
                },
                fee_payer: None,
            },
            public_rpc,
        })
    }
}

/// All compiled-in EVM networks, in catalog order.
#[must_use]
pub fn known_networks() -> Vec<KnownNetwork> {
    CATALOG.iter().filter_map(CatalogEntry::known).collect()
}

/// Ids of all compiled-in EVM networks.
#[must_use]
pub fn known_network_ids() -> Vec<NetworkId> {
    CATALOG.iter().map(|e| NetworkId::new(e.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_entry_is_complete() {
        let networks = known_networks();
        assert_eq!(networks.len(), CATALOG.len());
        for n in &networks {
            assert!(n.descriptor.signature_domain.numeric_chain_id().is_some());
            assert_eq!(n.public_rpc.primary_url.scheme(), "https");
            assert_ne!(n.public_rpc.primary_url, n.public_rpc.fallback_url);
        }
    }

    #[test]
    fn ids_and_chain_ids_are_unique() {
        let networks = known_networks();
        let ids: HashSet<_> = networks.iter().map(|n| n.descriptor.network_id.clone()).collect();
        let chains: HashSet<_> = networks
            .iter()
            .map(|n| n.descriptor.signature_domain.chain_reference.clone())
            .collect();
        assert_eq!(ids.len(), networks.len());
        assert_eq!(chains.len(), networks.len());
    }

    #[test]
    fn base_sepolia_domain() {
        let base_sepolia = known_networks()
            .into_iter()
            .find(|n| n.descriptor.network_id.as_str() == "base-sepolia")
            .unwrap();
        let domain = &base_sepolia.descriptor.signature_domain;
        assert_eq!(domain.name, "USDC");
        assert_eq!(domain.chain_reference, "84532");
        assert_eq!(
            domain.verifying_contract,
            "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
        );
    }
}
