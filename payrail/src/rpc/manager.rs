//! The RPC Configuration Manager.
//!
//! Two layered sources: a TTL-cached snapshot fetched from the secret store,
//! in front of a hardcoded snapshot compiled into the binary. Every failure of
//! the remote layer (unreachable store, timeout, malformed document, network
//! missing from the document) falls through to the hardcoded layer, so
//! resolving endpoints for a registered network never fails.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::network::NetworkId;
use crate::rpc::snapshot::{RpcConfigSnapshot, RpcEndpointPair, SnapshotDocument, SnapshotFormatError};
use crate::rpc::store::{SecretStore, SecretStoreError};
use crate::timestamp::UnixTimestamp;

/// The network is not registered with the facilitator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown network {0}")]
pub struct UnknownNetworkError(pub NetworkId);

/// Tuning of the remote layer.
#[derive(Debug, Clone)]
pub struct RpcConfigSettings {
    /// Name of the secret holding the configuration document.
    pub secret_name: String,
    /// How long a fetched snapshot is served before it is refetched.
    pub cache_ttl: Duration,
    /// Upper bound on a single secret-store fetch.
    pub fetch_timeout: Duration,
    /// How long to serve hardcoded endpoints after a failed fetch before trying again.
    pub failure_backoff: Duration,
}

impl Default for RpcConfigSettings {
    fn default() -> Self {
        Self {
            secret_name: "rpc-config".to_owned(),
            cache_ttl: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(3),
            failure_backoff: Duration::from_secs(30),
        }
    }
}

/// Which layer answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    /// The cached secret-store snapshot.
    Live,
    /// The compiled-in snapshot.
    Hardcoded,
}

/// Operator view of the manager, as served by `GET /rpc-config/status`.
#[derive(Debug, Clone, Serialize)]
pub struct RpcConfigStatus {
    /// Layer that currently answers lookups.
    pub source: SnapshotSource,
    /// Whether a secret store is configured at all.
    pub remote_configured: bool,
    /// Version label of the live snapshot, if one is cached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// When the live snapshot was fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<UnixTimestamp>,
    /// Seconds until the live snapshot expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
    /// Last refresh failure still inside its backoff window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Seconds until the next refresh attempt after a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_secs: Option<u64>,
    /// Networks covered by the hardcoded snapshot.
    pub hardcoded_networks: usize,
}

#[derive(Debug, thiserror::Error)]
enum RefreshError {
    #[error(transparent)]
    Store(#[from] SecretStoreError),
    #[error(transparent)]
    Format(#[from] SnapshotFormatError),
    #[error("secret store did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Default)]
enum CacheState {
    #[default]
    Empty,
    Live {
        snapshot: Arc<RpcConfigSnapshot>,
        expires_at: Instant,
    },
    Failed {
        reason: String,
        retry_at: Instant,
    },
}

enum Freshness {
    Fresh(Arc<RpcConfigSnapshot>),
    BackingOff,
    Stale,
}

struct RemoteSource {
    store: Arc<dyn SecretStore>,
    settings: RpcConfigSettings,
    state: RwLock<CacheState>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for RemoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSource")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RemoteSource {
    async fn freshness(&self) -> Freshness {
        let now = Instant::now();
        match &*self.state.read().await {
            CacheState::Live {
                snapshot,
                expires_at,
            } if now < *expires_at => Freshness::Fresh(Arc::clone(snapshot)),
            CacheState::Failed { retry_at, .. } if now < *retry_at => Freshness::BackingOff,
            _ => Freshness::Stale,
        }
    }

    async fn snapshot(&self) -> Option<Arc<RpcConfigSnapshot>> {
        match self.freshness().await {
            Freshness::Fresh(snapshot) => Some(snapshot),
            Freshness::BackingOff => None,
            Freshness::Stale => self.refresh().await,
        }
    }

    async fn refresh(&self) -> Option<Arc<RpcConfigSnapshot>> {
        let _guard = self.refresh_lock.lock().await;
        // Whoever held the lock before us may already have refreshed.
        match self.freshness().await {
            Freshness::Fresh(snapshot) => return Some(snapshot),
            Freshness::BackingOff => return None,
            Freshness::Stale => {}
        }

        match self.fetch().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                tracing::info!(
                    version = snapshot.version(),
                    networks = snapshot.len(),
                    "Loaded RPC config from secret store"
                );
                *self.state.write().await = CacheState::Live {
                    snapshot: Arc::clone(&snapshot),
                    expires_at: Instant::now() + self.settings.cache_ttl,
                };
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backoff = ?self.settings.failure_backoff,
                    "RPC config fetch failed, serving hardcoded endpoints"
                );
                *self.state.write().await = CacheState::Failed {
                    reason: e.to_string(),
                    retry_at: Instant::now() + self.settings.failure_backoff,
                };
                None
            }
        }
    }

    async fn fetch(&self) -> Result<RpcConfigSnapshot, RefreshError> {
        let timeout = self.settings.fetch_timeout;
        let text = tokio::time::timeout(timeout, self.store.fetch_secret(&self.settings.secret_name))
            .await
            .map_err(|_| RefreshError::Timeout(timeout))??;
        let snapshot = SnapshotDocument::parse(&text)?.into_snapshot(UnixTimestamp::now())?;
        Ok(snapshot)
    }
}

/// Resolves the endpoint pair of a network.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct RpcConfigManager {
    hardcoded: Arc<RpcConfigSnapshot>,
    remote: Option<RemoteSource>,
}

impl RpcConfigManager {
    /// Creates a manager that serves only `hardcoded`.
    ///
    /// The networks of `hardcoded` are the networks the manager knows; every
    /// other id resolves to [`UnknownNetworkError`].
    #[must_use]
    pub fn new(hardcoded: RpcConfigSnapshot) -> Self {
        Self {
            hardcoded: Arc::new(hardcoded),
            remote: None,
        }
    }

    /// Layers a cached secret-store source in front of the hardcoded snapshot.
    #[must_use]
    pub fn with_secret_store(
        mut self,
        store: Arc<dyn SecretStore>,
        settings: RpcConfigSettings,
    ) -> Self {
        self.remote = Some(RemoteSource {
            store,
            settings,
            state: RwLock::new(CacheState::Empty),
            refresh_lock: Mutex::new(()),
        });
        self
    }

    /// The compiled-in snapshot.
    #[must_use]
    pub fn hardcoded(&self) -> &RpcConfigSnapshot {
        &self.hardcoded
    }

    /// Returns the endpoint pair for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownNetworkError`] only for networks absent from the
    /// hardcoded snapshot. Remote failures are never surfaced.
    pub async fn get_endpoints(
        &self,
        network: &NetworkId,
    ) -> Result<RpcEndpointPair, UnknownNetworkError> {
        self.resolve(network).await.map(|(pair, _)| pair)
    }

    /// Like [`Self::get_endpoints`], also reporting which layer answered.
    ///
    /// # Errors
    ///
    /// See [`Self::get_endpoints`].
    pub async fn resolve(
        &self,
        network: &NetworkId,
    ) -> Result<(RpcEndpointPair, SnapshotSource), UnknownNetworkError> {
        let hardcoded = self
            .hardcoded
            .get(network)
            .ok_or_else(|| UnknownNetworkError(network.clone()))?;

        if let Some(remote) = &self.remote
            && let Some(snapshot) = remote.snapshot().await
        {
            if let Some(pair) = snapshot.get(network) {
                return Ok((pair.clone(), SnapshotSource::Live));
            }
            tracing::warn!(
                network = %network,
                version = snapshot.version(),
                "Network missing from live RPC config, serving hardcoded endpoints"
            );
        }
        Ok((hardcoded.clone(), SnapshotSource::Hardcoded))
    }

    /// Drops the cached snapshot; the next lookup refetches immediately,
    /// ignoring any failure backoff.
    pub async fn invalidate(&self) {
        if let Some(remote) = &self.remote {
            *remote.state.write().await = CacheState::Empty;
            tracing::info!("RPC config cache invalidated");
        }
    }

    /// Reports the state of the cache without triggering a fetch.
    pub async fn status(&self) -> RpcConfigStatus {
        let mut status = RpcConfigStatus {
            source: SnapshotSource::Hardcoded,
            remote_configured: self.remote.is_some(),
            version: None,
            retrieved_at: None,
            expires_in_secs: None,
            last_error: None,
            retry_in_secs: None,
            hardcoded_networks: self.hardcoded.len(),
        };
        let Some(remote) = &self.remote else {
            return status;
        };
        let now = Instant::now();
        match &*remote.state.read().await {
            CacheState::Empty => {}
            CacheState::Live {
                snapshot,
                expires_at,
            } => {
                if now < *expires_at {
                    status.source = SnapshotSource::Live;
                }
                status.version = Some(snapshot.version().to_owned());
                status.retrieved_at = Some(snapshot.retrieved_at());
                status.expires_in_secs = Some(expires_at.saturating_duration_since(now).as_secs());
            }
            CacheState::Failed { reason, retry_at } => {
                status.last_error = Some(reason.clone());
                status.retry_in_secs = Some(retry_at.saturating_duration_since(now).as_secs());
            }
        }
        status
    }
}
