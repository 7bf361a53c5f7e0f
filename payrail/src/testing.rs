//! In-memory chain and signing helpers for tests.
//!
//! [`InMemoryChain`] keeps balances, used nonces and transactions in a shared
//! ledger. Every client it hands out talks to that ledger, so primary and
//! fallback endpoints behave like two nodes of the same chain. Individual
//! endpoints can be made unreachable or unresponsive to exercise failover.

use alloy_primitives::{Bytes, U256, keccak256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

use crate::amount::TokenAmount;
use crate::authorization::PaymentAuthorization;
use crate::chain::{ChainClient, ChainConnector, ClientError, Confirmation, NonceState};
use crate::error::VerificationError;
use crate::network::{ChainFamily, KnownNetwork, NetworkDescriptor, NetworkId, SignatureDomain};
use crate::rpc::RpcEndpointPair;
use crate::verify::SignatureVerifier;

/// How an endpoint misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointFault {
    /// Calls fail before reaching the node.
    Unreachable,
    /// Calls never return.
    Hang,
    /// Writes are applied, then the connection drops before the answer.
    DropAfterBroadcast,
}

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<String, U256>,
    used_nonces: HashSet<(String, Bytes)>,
    transactions: HashMap<String, u64>,
    block_number: u64,
    faults: HashMap<Url, EndpointFault>,
    calls: HashMap<Url, usize>,
    hold_confirmations: bool,
    submitted: usize,
}

impl Ledger {
    fn check_transfer(&self, authorization: &PaymentAuthorization) -> Result<U256, ClientError> {
        let payer = authorization.payer_address.to_lowercase();
        if self
            .used_nonces
            .contains(&(payer.clone(), authorization.nonce.clone()))
        {
            return Err(ClientError::Rejected(
                "authorization is used or canceled".to_owned(),
            ));
        }
        let value = authorization
            .value
            .to_u256()
            .ok_or_else(|| ClientError::Rejected("negative value".to_owned()))?;
        let balance = self.balances.get(&payer).copied().unwrap_or_default();
        if balance < value {
            return Err(ClientError::Rejected(
                "transfer amount exceeds balance".to_owned(),
            ));
        }
        Ok(value)
    }
}

/// A shared in-memory ledger that doubles as a [`ChainConnector`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryChain {
    ledger: Arc<Mutex<Ledger>>,
}

impl InMemoryChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the token balance of `owner`.
    pub fn set_balance(&self, owner: &str, amount: u64) {
        self.ledger()
            .balances
            .insert(owner.to_lowercase(), U256::from(amount));
    }

    /// Token balance of `owner`.
    #[must_use]
    pub fn balance(&self, owner: &str) -> U256 {
        self.ledger()
            .balances
            .get(&owner.to_lowercase())
            .copied()
            .unwrap_or_default()
    }

    /// Makes `endpoint` misbehave.
    pub fn set_fault(&self, endpoint: &Url, fault: EndpointFault) {
        self.ledger().faults.insert(endpoint.clone(), fault);
    }

    /// Number of calls that hit `endpoint`.
    #[must_use]
    pub fn calls(&self, endpoint: &Url) -> usize {
        self.ledger().calls.get(endpoint).copied().unwrap_or_default()
    }

    /// Whether `(payer, nonce)` is used.
    #[must_use]
    pub fn nonce_used(&self, payer: &str, nonce: &Bytes) -> bool {
        self.ledger()
            .used_nonces
            .contains(&(payer.to_lowercase(), nonce.clone()))
    }

    /// Marks `(payer, nonce)` used without a transfer.
    pub fn burn_nonce(&self, payer: &str, nonce: &Bytes) {
        self.ledger()
            .used_nonces
            .insert((payer.to_lowercase(), nonce.clone()));
    }

    /// While set, submitted transactions stay pending.
    pub fn hold_confirmations(&self, hold: bool) {
        self.ledger().hold_confirmations = hold;
    }

    /// Number of transfers applied.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.ledger().submitted
    }
}

impl ChainConnector for InMemoryChain {
    fn connect(
        &self,
        _network: &NetworkDescriptor,
        endpoint: &Url,
    ) -> Result<Arc<dyn ChainClient>, ClientError> {
        Ok(Arc::new(InMemoryClient {
            chain: self.clone(),
            endpoint: endpoint.clone(),
        }))
    }
}

struct InMemoryClient {
    chain: InMemoryChain,
    endpoint: Url,
}

impl InMemoryClient {
    async fn enter(&self) -> Result<Option<EndpointFault>, ClientError> {
        let fault = {
            let mut ledger = self.chain.ledger();
            *ledger.calls.entry(self.endpoint.clone()).or_default() += 1;
            ledger.faults.get(&self.endpoint).copied()
        };
        match fault {
            Some(EndpointFault::Unreachable) => Err(ClientError::Unreachable(format!(
                "connection refused: {}",
                self.endpoint
            ))),
            Some(EndpointFault::Hang) => std::future::pending().await,
            other => Ok(other),
        }
    }
}

#[async_trait]
impl ChainClient for InMemoryClient {
    async fn get_balance(&self, owner: &str) -> Result<TokenAmount, ClientError> {
        self.enter().await?;
        Ok(TokenAmount::new(self.chain.balance(owner)))
    }

    async fn get_nonce_state(&self, payer: &str, nonce: &Bytes) -> Result<NonceState, ClientError> {
        self.enter().await?;
        Ok(self.chain.nonce_used(payer, nonce).into())
    }

    async fn simulate_authorization(
        &self,
        authorization: &PaymentAuthorization,
    ) -> Result<(), ClientError> {
        self.enter().await?;
        self.chain.ledger().check_transfer(authorization).map(|_| ())
    }

    async fn submit_transfer(
        &self,
        authorization: &PaymentAuthorization,
    ) -> Result<String, ClientError> {
        let fault = self.enter().await?;
        let transaction_id = {
            let mut ledger = self.chain.ledger();
            let value = ledger.check_transfer(authorization)?;
            let payer = authorization.payer_address.to_lowercase();
            let payee = authorization.payee_address.to_lowercase();
            *ledger.balances.entry(payer.clone()).or_default() -= value;
            *ledger.balances.entry(payee).or_default() += value;
            ledger
                .used_nonces
                .insert((payer, authorization.nonce.clone()));
            ledger.submitted += 1;
            ledger.block_number += 1;
            let transaction_id = format!("0x{:064x}", ledger.submitted);
            let block = ledger.block_number;
            ledger.transactions.insert(transaction_id.clone(), block);
            transaction_id
        };
        if fault == Some(EndpointFault::DropAfterBroadcast) {
            return Err(ClientError::Ambiguous("connection reset".to_owned()));
        }
        Ok(transaction_id)
    }

    async fn get_confirmation(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Confirmation>, ClientError> {
        self.enter().await?;
        let ledger = self.chain.ledger();
        if ledger.hold_confirmations {
            return Ok(None);
        }
        Ok(ledger
            .transactions
            .get(transaction_id)
            .map(|&block_number| Confirmation {
                block_number,
                succeeded: true,
            }))
    }
}

/// A test network with distinct primary and fallback endpoints.
///
/// # Panics
///
/// Panics if `id` does not form a valid host name.
#[must_use]
pub fn test_network(id: &str) -> KnownNetwork {
    let primary = Url::parse(&format!("https://{id}.primary.invalid/")).expect("valid test URL");
    let fallback = Url::parse(&format!("https://{id}.fallback.invalid/")).expect("valid test URL");
    KnownNetwork {
        descriptor: NetworkDescriptor {
            network_id: NetworkId::new(id),
            chain_family: ChainFamily::Evm,
            native_asset_symbol: "ETH".to_owned(),
            token_decimals: 6,
            signature_domain: SignatureDomain {
                name: "Test Token".to_owned(),
                version: "1".to_owned(),
                chain_reference: "31337".to_owned(),
                verifying_contract: "0x0000000000000000000000000000000000000402".to_owned(),
            },
            fee_payer: None,
        },
        public_rpc: RpcEndpointPair::new(primary, fallback),
    }
}

/// Digest the [`DigestVerifier`] expects as signature.
#[must_use]
pub fn digest_signature(authorization: &PaymentAuthorization, network: &NetworkId) -> Bytes {
    let message = format!(
        "{network}|{}|{}|{}|{}|{}|{}",
        authorization.payer_address.to_lowercase(),
        authorization.payee_address.to_lowercase(),
        authorization.value,
        authorization.valid_after,
        authorization.valid_before,
        authorization.nonce,
    );
    Bytes::from(keccak256(message.as_bytes()).to_vec())
}

/// Accepts a signature iff it equals [`digest_signature`] of the authorization.
///
/// Stands in for real cryptography where a test only cares that signed
/// fields are bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestVerifier;

impl SignatureVerifier for DigestVerifier {
    fn verify_signature(
        &self,
        authorization: &PaymentAuthorization,
        network: &NetworkDescriptor,
    ) -> Result<(), VerificationError> {
        if authorization.signature == digest_signature(authorization, &network.network_id) {
            Ok(())
        } else {
            Err(VerificationError::InvalidSignature(
                "digest mismatch".to_owned(),
            ))
        }
    }

    fn same_account(&self, a: &str, b: &str) -> bool {
        a.eq_ignore_ascii_case(b)
    }
}
