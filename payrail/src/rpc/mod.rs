//! RPC endpoint resolution.
//!
//! - [`snapshot`] - endpoint pairs, immutable snapshots and the secret-store document format
//! - [`store`] - the external secret store client
//! - [`manager`] - the [`RpcConfigManager`]: a cache-backed remote source layered over a
//!   hardcoded safety snapshot

pub mod manager;
pub mod snapshot;
pub mod store;

pub use manager::{RpcConfigManager, RpcConfigSettings, RpcConfigStatus, SnapshotSource, UnknownNetworkError};
pub use snapshot::{RpcConfigSnapshot, RpcEndpointPair, SnapshotDocument, SnapshotFormatError};
pub use store::{HttpSecretStore, SecretStore, SecretStoreError};
