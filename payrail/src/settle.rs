//! The Settlement Engine.
//!
//! One attempt walks `Received -> Verified -> NonceChecked -> BalanceChecked
//! -> Submitted -> Confirmed`, or stops in `Rejected` at the stage that failed.
//! No stage is retried here; transport-level retries belong to the
//! [`ChainProvider`].

use alloy_primitives::U256;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::authorization::{PaymentAuthorization, SettlementReceipt};
use crate::chain::{ChainProvider, Confirmation};
use crate::error::{ChainError, SettlementError};
use crate::network::NetworkId;
use crate::verify::VerificationEngine;

/// Stage of a settlement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStage {
    /// Request accepted for processing.
    Received,
    /// Verification passed.
    Verified,
    /// The nonce is unused on-chain.
    NonceChecked,
    /// The payer can cover the value.
    BalanceChecked,
    /// The transfer was broadcast.
    Submitted,
    /// The transfer was included and succeeded.
    Confirmed,
    /// The attempt failed.
    Rejected,
}

impl fmt::Display for SettlementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks and logs the stage of one attempt.
struct Attempt<'a> {
    network: &'a NetworkId,
    authorization: &'a PaymentAuthorization,
    stage: SettlementStage,
}

impl<'a> Attempt<'a> {
    fn start(network: &'a NetworkId, authorization: &'a PaymentAuthorization) -> Self {
        let attempt = Self {
            network,
            authorization,
            stage: SettlementStage::Received,
        };
        attempt.log();
        attempt
    }

    fn advance(&mut self, stage: SettlementStage) {
        self.stage = stage;
        self.log();
    }

    fn log(&self) {
        tracing::debug!(
            network = %self.network,
            payer = %self.authorization.payer_address,
            nonce = %self.authorization.nonce,
            stage = %self.stage,
            "Settlement stage"
        );
    }

    fn reject(mut self, error: SettlementError) -> SettlementError {
        let failed_at = self.stage;
        self.advance(SettlementStage::Rejected);
        tracing::warn!(
            network = %self.network,
            payer = %self.authorization.payer_address,
            nonce = %self.authorization.nonce,
            failed_at = %failed_at,
            error_kind = error.kind(),
            error = %error,
            "Settlement rejected"
        );
        error
    }
}

/// Settles verified authorizations on-chain.
#[derive(Debug)]
pub struct SettlementEngine {
    verifier: Arc<VerificationEngine>,
    provider: Arc<ChainProvider>,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl SettlementEngine {
    /// Default upper bound on waiting for inclusion.
    pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default delay between confirmation polls.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Creates an engine.
    #[must_use]
    pub const fn new(verifier: Arc<VerificationEngine>, provider: Arc<ChainProvider>) -> Self {
        Self {
            verifier,
            provider,
            confirmation_timeout: Self::DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how long to wait for inclusion before answering
    /// [`SettlementError::Unconfirmed`].
    #[must_use]
    pub const fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Sets the delay between confirmation polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The verification engine used for re-verification.
    #[must_use]
    pub fn verifier(&self) -> &VerificationEngine {
        &self.verifier
    }

    /// The chain provider used for all chain access.
    #[must_use]
    pub fn provider(&self) -> &ChainProvider {
        &self.provider
    }

    /// Settles `authorization` on `network`.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::Verification`] if re-verification fails
    /// - [`SettlementError::AlreadySettled`] if the nonce is used on-chain
    /// - [`SettlementError::InsufficientFunds`] if the payer cannot cover the value
    /// - [`SettlementError::Reverted`] if the transfer was included but failed
    /// - [`SettlementError::Unconfirmed`] if inclusion was not observed in time
    /// - [`SettlementError::Chain`] for chain-level failures
    pub async fn settle(
        &self,
        authorization: &PaymentAuthorization,
        network: &NetworkId,
    ) -> Result<SettlementReceipt, SettlementError> {
        let mut attempt = Attempt::start(network, authorization);
        match self.run(&mut attempt).await {
            Ok(receipt) => {
                attempt.advance(SettlementStage::Confirmed);
                tracing::info!(
                    network = %network,
                    payer = %authorization.payer_address,
                    transaction_id = %receipt.transaction_id,
                    block = receipt.confirmed_block,
                    amount = %receipt.amount_settled,
                    "Settlement confirmed"
                );
                Ok(receipt)
            }
            Err(error) => Err(attempt.reject(error)),
        }
    }

    async fn run(&self, attempt: &mut Attempt<'_>) -> Result<SettlementReceipt, SettlementError> {
        let network = attempt.network;
        let authorization = attempt.authorization;

        self.verifier.check(authorization, network)?;
        attempt.advance(SettlementStage::Verified);

        self.ensure_nonce_unused(network, authorization).await?;
        attempt.advance(SettlementStage::NonceChecked);

        let required = authorization.value.to_u256().unwrap_or(U256::ZERO);
        let balance = self
            .provider
            .get_balance(network, &authorization.payer_address)
            .await?;
        if balance.to_u256().unwrap_or(U256::ZERO) < required {
            return Err(SettlementError::InsufficientFunds {
                balance,
                required: authorization.value,
            });
        }
        attempt.advance(SettlementStage::BalanceChecked);

        let submitted = match self.provider.simulate_authorization(network, authorization).await {
            Ok(()) => self.provider.submit_transfer(network, authorization).await,
            Err(e) => Err(e),
        };
        let transaction_id = match submitted {
            Ok(transaction_id) => transaction_id,
            Err(rejected @ ChainError::Rejected { .. }) => {
                return Err(self.arbitrate(network, authorization, rejected.into()).await);
            }
            Err(e) => return Err(e.into()),
        };
        attempt.advance(SettlementStage::Submitted);

        match self.await_confirmation(network, &transaction_id).await {
            Some(Confirmation {
                block_number,
                succeeded: true,
            }) => Ok(SettlementReceipt {
                transaction_id,
                network_id: network.clone(),
                confirmed_block: block_number,
                amount_settled: authorization.value,
                payer: authorization.payer_address.clone(),
                payee: authorization.payee_address.clone(),
            }),
            Some(_) => Err(self
                .arbitrate(
                    network,
                    authorization,
                    SettlementError::Reverted { transaction_id },
                )
                .await),
            None => Err(SettlementError::Unconfirmed { transaction_id }),
        }
    }

    async fn ensure_nonce_unused(
        &self,
        network: &NetworkId,
        authorization: &PaymentAuthorization,
    ) -> Result<(), SettlementError> {
        let state = self
            .provider
            .get_nonce_state(network, &authorization.payer_address, &authorization.nonce)
            .await?;
        if state.is_used() {
            return Err(already_settled(authorization));
        }
        Ok(())
    }

    /// The chain refused or reverted the transfer. If the nonce is used by
    /// now, a concurrent settlement won and the chain's answer is `AlreadySettled`.
    async fn arbitrate(
        &self,
        network: &NetworkId,
        authorization: &PaymentAuthorization,
        error: SettlementError,
    ) -> SettlementError {
        match self.ensure_nonce_unused(network, authorization).await {
            Err(settled @ SettlementError::AlreadySettled { .. }) => settled,
            Err(recheck) => {
                tracing::warn!(network = %network, error = %recheck, "Nonce re-check failed");
                error
            }
            Ok(()) => error,
        }
    }

    /// Polls until inclusion or until the confirmation timeout passes.
    async fn await_confirmation(
        &self,
        network: &NetworkId,
        transaction_id: &str,
    ) -> Option<Confirmation> {
        let deadline = Instant::now() + self.confirmation_timeout;
        loop {
            match self.provider.get_confirmation(network, transaction_id).await {
                Ok(Some(confirmation)) => return Some(confirmation),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        network = %network,
                        transaction_id,
                        error = %e,
                        "Confirmation poll failed"
                    );
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

fn already_settled(authorization: &PaymentAuthorization) -> SettlementError {
    SettlementError::AlreadySettled {
        payer: authorization.payer_address.clone(),
        nonce: authorization.nonce.to_string(),
    }
}
