//! Solana support for the payrail facilitator.
//!
//! - [`networks`]: compiled-in Solana networks and their USDC mints.
//! - [`transfer`]: the co-signed SPL transfer a Solana authorization carries.
//! - [`signature`]: verification of payer signatures and transfers.
//! - [`client`]: a JSON-RPC [`ChainClient`](payrail::chain::ChainClient)
//!   that reads balances and settles transfers as fee payer.

pub mod client;
pub mod networks;
pub mod signature;
pub mod transfer;

pub use client::SvmConnector;
pub use signature::SolanaVerifier;
pub use transfer::TransferLimits;
