//! Failover across a network's primary and fallback endpoint.

use alloy_primitives::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

use crate::amount::TokenAmount;
use crate::authorization::PaymentAuthorization;
use crate::chain::{ChainClient, ChainConnector, ClientError, Confirmation, NonceState};
use crate::error::ChainError;
use crate::network::{NetworkDescriptor, NetworkId, NetworkRegistry};
use crate::rpc::{RpcConfigManager, RpcEndpointPair};

/// Whether an operation may change chain state.
///
/// Reads are replayed on the fallback after any transport failure. Writes
/// are replayed only when the primary provably never saw them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Safe to repeat.
    Read,
    /// Broadcasts a transaction.
    Write,
}

/// Why an attempt may be retried on the fallback.
#[derive(Debug)]
enum Retryable {
    Timeout,
    Transport(String),
}

impl fmt::Display for Retryable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::Transport(detail) => f.write_str(detail),
        }
    }
}

struct ConnectedPair {
    endpoints: RpcEndpointPair,
    primary: Arc<dyn ChainClient>,
    fallback: Arc<dyn ChainClient>,
}

/// Per-network chain access with primary-to-fallback failover.
///
/// Endpoints are resolved through the [`RpcConfigManager`] on every call;
/// clients are cached per network and rebuilt when the resolved pair changes.
pub struct ChainProvider {
    registry: Arc<NetworkRegistry>,
    rpc: Arc<RpcConfigManager>,
    connector: Arc<dyn ChainConnector>,
    call_timeout: Duration,
    clients: RwLock<HashMap<NetworkId, Arc<ConnectedPair>>>,
    failovers: Mutex<HashMap<NetworkId, u64>>,
}

impl fmt::Debug for ChainProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainProvider")
            .field("networks", &self.registry.len())
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ChainProvider {
    /// Default per-endpoint timeout.
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a provider.
    #[must_use]
    pub fn new(
        registry: Arc<NetworkRegistry>,
        rpc: Arc<RpcConfigManager>,
        connector: Arc<dyn ChainConnector>,
    ) -> Self {
        Self {
            registry,
            rpc,
            connector,
            call_timeout: Self::DEFAULT_CALL_TIMEOUT,
            clients: RwLock::new(HashMap::new()),
            failovers: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the per-endpoint timeout.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The registry this provider serves.
    #[must_use]
    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    /// The RPC Configuration Manager endpoints are resolved through.
    #[must_use]
    pub fn rpc_config(&self) -> &RpcConfigManager {
        &self.rpc
    }

    /// Number of times `network` failed over to its fallback endpoint.
    #[must_use]
    pub fn failovers(&self, network: &NetworkId) -> u64 {
        self.failovers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(network)
            .copied()
            .unwrap_or_default()
    }

    /// Token balance of `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError`] if neither endpoint produced an answer.
    pub async fn get_balance(
        &self,
        network: &NetworkId,
        owner: &str,
    ) -> Result<TokenAmount, ChainError> {
        self.submit_or_query(network, Access::Read, "get_balance", move |client| async move {
            client.get_balance(owner).await
        })
        .await
    }

    /// On-chain usage state of `(payer, nonce)`.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError`] if neither endpoint produced an answer.
    pub async fn get_nonce_state(
        &self,
        network: &NetworkId,
        payer: &str,
        nonce: &Bytes,
    ) -> Result<NonceState, ChainError> {
        self.submit_or_query(network, Access::Read, "get_nonce_state", move |client| async move {
            client.get_nonce_state(payer, nonce).await
        })
        .await
    }

    /// Dry-runs the transfer.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Rejected`] if the chain would refuse it.
    pub async fn simulate_authorization(
        &self,
        network: &NetworkId,
        authorization: &PaymentAuthorization,
    ) -> Result<(), ChainError> {
        self.submit_or_query(
            network,
            Access::Read,
            "simulate_authorization",
            move |client| async move { client.simulate_authorization(authorization).await },
        )
        .await
    }

    /// Broadcasts the transfer and returns its transaction id.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::AmbiguousOutcome`] when the transfer may have been
    /// broadcast; callers must resolve it by nonce, never by resubmitting.
    pub async fn submit_transfer(
        &self,
        network: &NetworkId,
        authorization: &PaymentAuthorization,
    ) -> Result<String, ChainError> {
        self.submit_or_query(network, Access::Write, "submit_transfer", move |client| async move {
            client.submit_transfer(authorization).await
        })
        .await
    }

    /// Inclusion state of a submitted transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError`] if neither endpoint produced an answer.
    pub async fn get_confirmation(
        &self,
        network: &NetworkId,
        transaction_id: &str,
    ) -> Result<Option<Confirmation>, ChainError> {
        self.submit_or_query(network, Access::Read, "get_confirmation", move |client| async move {
            client.get_confirmation(transaction_id).await
        })
        .await
    }

    /// Runs `call` against the primary endpoint of `network` and, if that
    /// fails in a retryable way, once against the fallback.
    ///
    /// # Errors
    ///
    /// - [`ChainError::UnknownNetwork`] if `network` is not registered
    /// - [`ChainError::Rejected`] / [`ChainError::Unsupported`] as reported by the endpoint
    /// - [`ChainError::AmbiguousOutcome`] for writes whose broadcast is uncertain
    /// - [`ChainError::Timeout`] if both endpoints timed out
    /// - [`ChainError::AllEndpointsUnreachable`] for any other double failure
    pub async fn submit_or_query<T, F, Fut>(
        &self,
        network: &NetworkId,
        access: Access,
        operation: &'static str,
        call: F,
    ) -> Result<T, ChainError>
    where
        F: Fn(Arc<dyn ChainClient>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let descriptor = self
            .registry
            .get(network)
            .ok_or_else(|| ChainError::UnknownNetwork(network.clone()))?;
        let clients = self.clients_for(descriptor).await?;

        let primary_failure = match self
            .attempt(descriptor, access, operation, call(Arc::clone(&clients.primary)))
            .await?
        {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };

        self.record_failover(network, &clients.endpoints, operation, &primary_failure);

        match self
            .attempt(descriptor, access, operation, call(Arc::clone(&clients.fallback)))
            .await?
        {
            Ok(value) => Ok(value),
            Err(fallback_failure) => {
                tracing::warn!(
                    network = %network,
                    operation,
                    primary = %primary_failure,
                    fallback = %fallback_failure,
                    "All RPC endpoints failed"
                );
                match (primary_failure, fallback_failure) {
                    (Retryable::Timeout, Retryable::Timeout) => {
                        Err(ChainError::Timeout(network.clone()))
                    }
                    _ => Err(ChainError::AllEndpointsUnreachable(network.clone())),
                }
            }
        }
    }

    /// Outer `Err` ends the operation; inner `Err` allows the fallback.
    async fn attempt<T>(
        &self,
        descriptor: &NetworkDescriptor,
        access: Access,
        operation: &'static str,
        call: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<Result<T, Retryable>, ChainError> {
        let network = &descriptor.network_id;
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(value)) => Ok(Ok(value)),
            Ok(Err(ClientError::Rejected(reason))) => Err(ChainError::Rejected {
                network: network.clone(),
                reason,
            }),
            Ok(Err(ClientError::Unsupported(operation))) => Err(ChainError::Unsupported {
                network: network.clone(),
                family: descriptor.chain_family,
                operation,
            }),
            Ok(Err(ClientError::Unreachable(detail))) => Ok(Err(Retryable::Transport(detail))),
            Ok(Err(ClientError::Ambiguous(detail))) => match access {
                Access::Read => Ok(Err(Retryable::Transport(detail))),
                Access::Write => Err(ChainError::AmbiguousOutcome {
                    network: network.clone(),
                    detail,
                }),
            },
            Err(_elapsed) => match access {
                Access::Read => Ok(Err(Retryable::Timeout)),
                Access::Write => Err(ChainError::AmbiguousOutcome {
                    network: network.clone(),
                    detail: format!("{operation} timed out after {:?}", self.call_timeout),
                }),
            },
        }
    }

    fn record_failover(
        &self,
        network: &NetworkId,
        endpoints: &RpcEndpointPair,
        operation: &'static str,
        reason: &Retryable,
    ) {
        let total = {
            let mut failovers = self
                .failovers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let count = failovers.entry(network.clone()).or_default();
            *count += 1;
            *count
        };
        tracing::warn!(
            target: "payrail::failover",
            network = %network,
            operation,
            primary = host(&endpoints.primary_url),
            fallback = host(&endpoints.fallback_url),
            reason = %reason,
            total,
            "Primary RPC endpoint failed, retrying on fallback"
        );
    }

    async fn clients_for(
        &self,
        descriptor: &NetworkDescriptor,
    ) -> Result<Arc<ConnectedPair>, ChainError> {
        let network = &descriptor.network_id;
        let endpoints = self
            .rpc
            .get_endpoints(network)
            .await
            .map_err(|e| ChainError::UnknownNetwork(e.0))?;

        if let Some(pair) = self.clients.read().await.get(network)
            && pair.endpoints == endpoints
        {
            return Ok(Arc::clone(pair));
        }

        let connect = |url: &Url| {
            self.connector
                .connect(descriptor, url)
                .map_err(|e| match e {
                    ClientError::Unsupported(operation) => ChainError::Unsupported {
                        network: network.clone(),
                        family: descriptor.chain_family,
                        operation,
                    },
                    other => {
                        tracing::error!(network = %network, error = %other, "Failed to build chain client");
                        ChainError::AllEndpointsUnreachable(network.clone())
                    }
                })
        };
        let pair = Arc::new(ConnectedPair {
            primary: connect(&endpoints.primary_url)?,
            fallback: connect(&endpoints.fallback_url)?,
            endpoints,
        });
        tracing::debug!(
            network = %network,
            primary = host(&pair.endpoints.primary_url),
            fallback = host(&pair.endpoints.fallback_url),
            "Connected chain clients"
        );
        self.clients
            .write()
            .await
            .insert(network.clone(), Arc::clone(&pair));
        Ok(pair)
    }
}

/// Endpoint URLs may embed API keys in their path; only the host is logged.
fn host(url: &Url) -> &str {
    url.host_str().unwrap_or("<no host>")
}
