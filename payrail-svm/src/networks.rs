//! Well-known Solana networks and their USDC mints.

use payrail::network::{ChainFamily, KnownNetwork, NetworkDescriptor, NetworkId, SignatureDomain};
use payrail::rpc::RpcEndpointPair;
use solana_pubkey::{Pubkey, pubkey};

/// Genesis-hash prefix of Solana mainnet.
pub const SOLANA_MAINNET_REFERENCE: &str = "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp";
/// Genesis-hash prefix of Solana devnet.
pub const SOLANA_DEVNET_REFERENCE: &str = "EtWTRABZaYq6iMfeYKouRu166VU2xqa1";

/// Native Circle USDC on Solana mainnet.
pub const USDC_SOLANA: Pubkey = pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
/// Circle USDC on Solana devnet.
pub const USDC_SOLANA_DEVNET: Pubkey = pubkey!("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU");

/// Token name reported in the signing domain of Solana networks.
pub const AUTHORIZATION_DOMAIN_NAME: &str = "USDC";
/// Version of the Solana payment layout (see [`crate::transfer`]).
pub const AUTHORIZATION_DOMAIN_VERSION: &str = "1";
/// USDC decimals on Solana.
pub const USDC_DECIMALS: u8 = 6;

fn known(
    id: &str,
    reference: &str,
    mint: Pubkey,
    primary: &str,
    fallback: &str,
) -> Option<KnownNetwork> {
    Some(KnownNetwork {
        descriptor: NetworkDescriptor {
            network_id: NetworkId::new(id),
            chain_family: ChainFamily::Svm,
            native_asset_symbol: "SOL".to_owned(),
            token_decimals: USDC_DECIMALS,
            signature_domain: SignatureDomain {
                name: AUTHORIZATION_DOMAIN_NAME.to_owned(),
                version: AUTHORIZATION_DOMAIN_VERSION.to_owned(),
                chain_reference: reference.to_owned(),
                verifying_contract: mint.to_string(),
            },
            fee_payer: None,
        },
        public_rpc: RpcEndpointPair::parse(primary, fallback).ok()?,
    })
}

/// All compiled-in Solana networks.
#[must_use]
pub fn known_networks() -> Vec<KnownNetwork> {
    [
        known(
            "solana",
            SOLANA_MAINNET_REFERENCE,
            USDC_SOLANA,
            "https://api.mainnet-beta.solana.com",
            "https://solana-rpc.publicnode.com",
        ),
        known(
            "solana-devnet",
            SOLANA_DEVNET_REFERENCE,
            USDC_SOLANA_DEVNET,
            "https://api.devnet.solana.com",
            "https://solana-devnet-rpc.publicnode.com",
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}
