#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM family support for the payrail facilitator.
//!
//! Authorizations are ERC-3009 `TransferWithAuthorization` messages signed
//! under the token's EIP-712 domain. The facilitator submits them with its own
//! account and pays the gas.
//!
//! # Modules
//!
//! - [`networks`] - Compiled-in EVM networks and USDC deployments
//! - [`signature`] - EIP-712 hashing and EOA signature recovery
//! - [`contract`] - ERC-3009 Solidity bindings
//! - [`client`] - alloy-based [`ChainClient`](payrail::chain::ChainClient) and its connector

pub mod client;
pub mod contract;
pub mod networks;
pub mod signature;

pub use client::EvmConnector;
pub use signature::Eip3009Verifier;
