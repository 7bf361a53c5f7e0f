//! Error taxonomy of the facilitator.
//!
//! - [`VerificationError`]: client-caused, never retried.
//! - [`ChainError`]: transport or infrastructure, retryable at the caller's discretion.
//! - [`SettlementError`]: `AlreadySettled` / `InsufficientFunds` are permanent for an
//!   authorization; wrapped chain errors may be retried.
//!
//! Every error carries a stable `kind()` string used on the wire.

use crate::amount::TokenAmount;
use crate::network::{ChainFamily, NetworkId};

/// A check performed by the Verification Engine failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// `now` is past `valid_before`.
    #[error("authorization expired")]
    Expired,
    /// `now` is before `valid_after`.
    #[error("authorization is not valid yet")]
    NotYetValid,
    /// `value` is zero or negative.
    #[error("authorization value must be greater than zero")]
    ZeroOrNegativeValue,
    /// The signature does not recover to the payer under the network's domain.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// Payer and payee are the same account.
    #[error("payer and payee must differ")]
    SelfPayment,
    /// The network is not in the registry.
    #[error("unsupported network {0}")]
    UnsupportedNetwork(NetworkId),
}

impl VerificationError {
    /// Stable machine-readable name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Expired => "Expired",
            Self::NotYetValid => "NotYetValid",
            Self::ZeroOrNegativeValue => "ZeroOrNegativeValue",
            Self::InvalidSignature(_) => "InvalidSignature",
            Self::SelfPayment => "SelfPayment",
            Self::UnsupportedNetwork(_) => "UnsupportedNetwork",
        }
    }
}

/// A `(payer, nonce)` pair that cannot name an authorization on the
/// network's chain family.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid authorization lookup: {0}")]
pub struct InvalidLookup(pub String);

/// A chain operation could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Both the primary and the fallback endpoint failed at the transport level.
    #[error("all RPC endpoints unreachable for {0}")]
    AllEndpointsUnreachable(NetworkId),
    /// A write may or may not have been broadcast; query state by nonce before retrying.
    #[error("outcome of write on {network} is unknown: {detail}")]
    AmbiguousOutcome {
        /// Network of the write.
        network: NetworkId,
        /// What went wrong.
        detail: String,
    },
    /// Both endpoints timed out.
    #[error("RPC calls to {0} timed out")]
    Timeout(NetworkId),
    /// The node answered with a definitive error (revert, invalid params, ...).
    #[error("{network} rejected the call: {reason}")]
    Rejected {
        /// Network that rejected the call.
        network: NetworkId,
        /// Node-provided reason.
        reason: String,
    },
    /// The network is not registered with the provider.
    #[error("unknown network {0}")]
    UnknownNetwork(NetworkId),
    /// The operation is not available for this network's chain family.
    #[error("{operation} is not supported on {family} network {network}")]
    Unsupported {
        /// Network the operation targeted.
        network: NetworkId,
        /// Chain family of the network.
        family: ChainFamily,
        /// Operation name.
        operation: &'static str,
    },
}

impl ChainError {
    /// Stable machine-readable name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AllEndpointsUnreachable(_) => "AllEndpointsUnreachable",
            Self::AmbiguousOutcome { .. } => "AmbiguousOutcome",
            Self::Timeout(_) => "Timeout",
            Self::Rejected { .. } => "Rejected",
            Self::UnknownNetwork(_) => "UnknownNetwork",
            Self::Unsupported { .. } => "Unsupported",
        }
    }

    /// Whether retrying later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AllEndpointsUnreachable(_) | Self::AmbiguousOutcome { .. } | Self::Timeout(_)
        )
    }
}

/// A settlement attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    /// Re-verification failed.
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// The `(payer, nonce)` pair was already used on-chain.
    #[error("authorization {nonce} from {payer} was already settled")]
    AlreadySettled {
        /// Paying account.
        payer: String,
        /// Hex nonce.
        nonce: String,
    },
    /// The payer's balance is below the authorized value.
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds {
        /// Balance read from the chain.
        balance: TokenAmount,
        /// Authorized value.
        required: TokenAmount,
    },
    /// The transfer was included but reverted.
    #[error("transaction {transaction_id} reverted")]
    Reverted {
        /// Reverted transaction.
        transaction_id: String,
    },
    /// The transfer was broadcast but not confirmed within the confirmation timeout.
    #[error("transaction {transaction_id} submitted but not yet confirmed")]
    Unconfirmed {
        /// Broadcast transaction.
        transaction_id: String,
    },
    /// A chain-level failure.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl SettlementError {
    /// Stable machine-readable name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Verification(e) => e.kind(),
            Self::AlreadySettled { .. } => "AlreadySettled",
            Self::InsufficientFunds { .. } => "InsufficientFunds",
            Self::Reverted { .. } => "TransactionReverted",
            Self::Unconfirmed { .. } => "Unconfirmed",
            Self::Chain(e) => e.kind(),
        }
    }

    /// Whether the authorization can never settle, no matter how often it is retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Verification(_)
                | Self::AlreadySettled { .. }
                | Self::InsufficientFunds { .. }
                | Self::Reverted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(VerificationError::ZeroOrNegativeValue.kind(), "ZeroOrNegativeValue");
        assert_eq!(
            SettlementError::from(VerificationError::SelfPayment).kind(),
            "SelfPayment"
        );
        assert_eq!(
            SettlementError::from(ChainError::Timeout("base".into())).kind(),
            "Timeout"
        );
    }

    #[test]
    fn permanence() {
        assert!(
            SettlementError::AlreadySettled {
                payer: "a".into(),
                nonce: "0x01".into()
            }
            .is_permanent()
        );
        let unreachable = SettlementError::from(ChainError::AllEndpointsUnreachable("x".into()));
        assert!(!unreachable.is_permanent());
        assert!(ChainError::Timeout("x".into()).is_transient());
    }
}
