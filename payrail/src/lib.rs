#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core of the payrail payment facilitator.
//!
//! A facilitator takes signed, off-chain payment authorizations, checks them,
//! and executes them on-chain as gasless transfers on behalf of the payer.
//! This crate is chain-agnostic; the EVM and Solana families live in
//! `payrail-evm` and `payrail-svm`.
//!
//! # Modules
//!
//! - [`amount`] - Signed token amounts in the smallest unit
//! - [`authorization`] - The signed authorization, verification results and receipts
//! - [`chain`] - Chain clients and the failover [`ChainProvider`](chain::ChainProvider)
//! - [`error`] - Error taxonomy with stable `kind()` names
//! - [`network`] - Network identifiers, descriptors and the registry
//! - [`rpc`] - The RPC Configuration Manager and its secret store
//! - [`settle`] - The Settlement Engine
//! - [`timestamp`] - Unix timestamps and clocks
//! - [`verify`] - The Verification Engine
//!
//! # Feature Flags
//!
//! - `test-util` - Exposes [`testing`]: an in-memory chain and test signatures

pub mod amount;
pub mod authorization;
pub mod chain;
pub mod error;
pub mod network;
pub mod rpc;
pub mod settle;
pub mod timestamp;
pub mod verify;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
