//! Chain access.
//!
//! A [`ChainClient`] speaks to one RPC endpoint of one network; the family
//! crates implement it with their own wire encoding. A [`ChainConnector`]
//! builds clients for a network's endpoints and is selected per chain family
//! at startup. The [`ChainProvider`] sits on top, resolving endpoints through
//! the RPC Configuration Manager and failing over from primary to fallback.

pub mod provider;

pub use provider::{Access, ChainProvider};

use alloy_primitives::Bytes;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

use crate::amount::TokenAmount;
use crate::authorization::PaymentAuthorization;
use crate::network::NetworkDescriptor;

/// Whether an authorization nonce has been consumed on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceState {
    /// The nonce can still be used.
    Unused,
    /// A transfer with this nonce was executed (or the authorization was cancelled).
    Used,
}

impl NonceState {
    /// Whether the nonce is used.
    #[must_use]
    pub const fn is_used(self) -> bool {
        matches!(self, Self::Used)
    }
}

impl From<bool> for NonceState {
    fn from(used: bool) -> Self {
        if used { Self::Used } else { Self::Unused }
    }
}

/// Inclusion of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Whether execution succeeded (`false` means reverted).
    pub succeeded: bool,
}

/// Failure of a single call against a single endpoint.
///
/// The variant tells the provider whether the call may be replayed on the
/// fallback endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Nothing reached the node (connection refused, DNS failure, ...).
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    /// The request may have reached the node, but no usable answer came back.
    #[error("no usable answer: {0}")]
    Ambiguous(String),
    /// The node answered with a definitive error.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The client does not implement this operation.
    #[error("{0} is not supported")]
    Unsupported(&'static str),
}

/// Operations against one RPC endpoint of one network.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Token balance of `owner` in the smallest unit.
    async fn get_balance(&self, owner: &str) -> Result<TokenAmount, ClientError>;

    /// Nonce usage state of `(payer, nonce)`.
    async fn get_nonce_state(&self, payer: &str, nonce: &Bytes) -> Result<NonceState, ClientError>;

    /// Dry-runs the transfer. `Ok` means the chain would currently accept it.
    async fn simulate_authorization(
        &self,
        authorization: &PaymentAuthorization,
    ) -> Result<(), ClientError>;

    /// Broadcasts the transfer and returns its transaction id once the node
    /// accepted it. Does not wait for inclusion.
    async fn submit_transfer(
        &self,
        authorization: &PaymentAuthorization,
    ) -> Result<String, ClientError>;

    /// Inclusion state of `transaction_id`; `None` while pending.
    async fn get_confirmation(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Confirmation>, ClientError>;
}

/// Builds [`ChainClient`]s for endpoints of a network.
pub trait ChainConnector: Send + Sync {
    /// Connects to `endpoint` of `network`. Must not perform network I/O.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Unsupported`] if the connector does not handle
    /// the network's chain family.
    fn connect(
        &self,
        network: &NetworkDescriptor,
        endpoint: &Url,
    ) -> Result<Arc<dyn ChainClient>, ClientError>;
}
