//! Facilitator server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4021
//! networks = ["base", "base-sepolia", "solana-devnet"]
//! evm_signer_private_key = "$EVM_SIGNER_KEY"
//! svm_fee_payer_private_key = "$SVM_FEE_PAYER_KEY"
//! admin_token = "${ADMIN_TOKEN}"
//!
//! [rpc]
//! cache_ttl_secs = 300
//!
//! [rpc.overrides."base"]
//! primary = "https://base-mainnet.example.com/v2/$RPC_KEY"
//! fallback = "https://mainnet.base.org"
//!
//! [svm]
//! max_compute_unit_price = 500000
//!
//! [secret_store]
//! url = "https://secrets.internal.example.com"
//! secret_name = "payrail/rpc-config"
//! token = "$SECRET_STORE_TOKEN"
//! ```
//!
//! A missing file means all defaults: every compiled-in network, public RPC
//! endpoints only, no secret store and read-only chain connectors.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use payrail::network::NetworkId;
use payrail::rpc::{RpcConfigSettings, RpcEndpointPair, SnapshotFormatError};
use payrail_svm::TransferLimits;
use serde::Deserialize;

/// Errors while loading or interpreting the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML of the expected shape.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// An RPC override has an unusable URL.
    #[error("invalid RPC override for {network}: {source}")]
    RpcOverride {
        /// Network of the override.
        network: String,
        /// What is wrong with it.
        source: SnapshotFormatError,
    },
    /// The secret store URL does not parse.
    #[error("invalid secret store url {url}: {source}")]
    SecretStoreUrl {
        /// Configured value.
        url: String,
        /// Parse failure.
        source: url::ParseError,
    },
    /// The EVM signer key is not a valid private key.
    #[error("invalid evm_signer_private_key: {0}")]
    SignerKey(String),
    /// The Solana fee payer key is not a base58 keypair.
    #[error("invalid svm_fee_payer_private_key: {0}")]
    FeePayerKey(String),
    /// The allow-list or an RPC override names a network that is not served.
    #[error("unknown network(s) in {section}: {names}")]
    UnknownNetworks {
        /// Configuration section naming them.
        section: &'static str,
        /// Comma separated network ids.
        names: String,
    },
}

/// Top-level facilitator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FacilitatorConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4021`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Networks to serve. All compiled-in networks when absent.
    #[serde(default)]
    pub networks: Option<Vec<NetworkId>>,

    /// Private key paying gas for EVM settlements (hex, with or without `0x`).
    /// Without it the facilitator can verify but not settle on EVM networks.
    #[serde(default)]
    pub evm_signer_private_key: Option<String>,

    /// Base58 keypair co-signing Solana settlements as fee payer.
    /// Without it the facilitator can verify but not settle on Solana networks.
    #[serde(default)]
    pub svm_fee_payer_private_key: Option<String>,

    /// Per-endpoint timeout of chain calls, in seconds.
    #[serde(default = "default_chain_timeout_secs")]
    pub chain_timeout_secs: u64,

    /// How long `/settle` waits for inclusion before answering `202`, in seconds.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    /// Bearer token guarding the operator endpoints. They answer `403` when unset.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// RPC Configuration Manager settings.
    #[serde(default)]
    pub rpc: RpcSection,

    /// Compute budget ceilings of Solana payment messages.
    #[serde(default)]
    pub svm: TransferLimits,

    /// Remote configuration source. Hardcoded endpoints only when absent.
    #[serde(default)]
    pub secret_store: Option<SecretStoreSection>,
}

/// `[rpc]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcSection {
    /// Lifetime of a fetched snapshot, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Upper bound on one secret-store fetch, in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Pause after a failed fetch, in seconds.
    #[serde(default = "default_failure_backoff_secs")]
    pub failure_backoff_secs: u64,
    /// Replacements for compiled-in public endpoints, keyed by network id.
    #[serde(default)]
    pub overrides: HashMap<String, EndpointOverride>,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            failure_backoff_secs: default_failure_backoff_secs(),
            overrides: HashMap::new(),
        }
    }
}

/// `[rpc.overrides."<network>"]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointOverride {
    /// Primary endpoint.
    pub primary: String,
    /// Fallback endpoint; the primary is reused when absent.
    #[serde(default)]
    pub fallback: Option<String>,
}

/// `[secret_store]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretStoreSection {
    /// Base URL of the secret store.
    pub url: String,
    /// Name of the secret holding the RPC configuration document.
    #[serde(default = "default_secret_name")]
    pub secret_name: String,
    /// Bearer token for the store.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    4021
}

const fn default_chain_timeout_secs() -> u64 {
    5
}

const fn default_confirmation_timeout_secs() -> u64 {
    30
}

const fn default_cache_ttl_secs() -> u64 {
    300
}

const fn default_fetch_timeout_secs() -> u64 {
    3
}

const fn default_failure_backoff_secs() -> u64 {
    30
}

fn default_secret_name() -> String {
    RpcConfigSettings::default().secret_name
}

impl FacilitatorConfig {
    /// Loads configuration from `path`.
    ///
    /// A missing file yields the defaults. All `$VAR` / `${VAR}` references
    /// are expanded from the process environment before parsing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::warn!(path = %path.display(), "Configuration file not found, using defaults");
            String::new()
        };
        Self::parse(&content)
    }

    /// Parses configuration text after environment expansion.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        Ok(toml::from_str(&expanded)?)
    }

    /// Settings of the RPC Configuration Manager.
    #[must_use]
    pub fn rpc_settings(&self) -> RpcConfigSettings {
        RpcConfigSettings {
            secret_name: self
                .secret_store
                .as_ref()
                .map_or_else(default_secret_name, |s| s.secret_name.clone()),
            cache_ttl: Duration::from_secs(self.rpc.cache_ttl_secs),
            fetch_timeout: Duration::from_secs(self.rpc.fetch_timeout_secs),
            failure_backoff: Duration::from_secs(self.rpc.failure_backoff_secs),
        }
    }

    /// Parsed `[rpc.overrides]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RpcOverride`] for an empty or malformed URL.
    pub fn rpc_overrides(&self) -> Result<Vec<(NetworkId, RpcEndpointPair)>, ConfigError> {
        self.rpc
            .overrides
            .iter()
            .map(|(network, endpoints)| {
                let fallback = endpoints.fallback.as_deref().unwrap_or(&endpoints.primary);
                RpcEndpointPair::parse(&endpoints.primary, fallback)
                    .map(|pair| (NetworkId::new(network), pair))
                    .map_err(|source| ConfigError::RpcOverride {
                        network: network.clone(),
                        source,
                    })
            })
            .collect()
    }

    /// Per-endpoint chain call timeout.
    #[must_use]
    pub const fn chain_timeout(&self) -> Duration {
        Duration::from_secs(self.chain_timeout_secs)
    }

    /// Confirmation wait of `/settle`.
    #[must_use]
    pub const fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// The EVM signer key, unless it is empty or an unresolved `$VAR`.
    #[must_use]
    pub fn evm_signer_key(&self) -> Option<&str> {
        self.evm_signer_private_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !key.starts_with('$'))
    }

    /// The Solana fee payer key, unless it is empty or an unresolved `$VAR`.
    #[must_use]
    pub fn svm_fee_payer_key(&self) -> Option<&str> {
        self.svm_fee_payer_private_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !key.starts_with('$'))
    }

    /// The admin token, unless it is empty or an unresolved `$VAR`.
    #[must_use]
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty() && !token.starts_with('$'))
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment variables.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();

        let mut var_name = String::new();
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            var_name.push(c);
            chars.next();
        }

        match lookup(&var_name) {
            Some(value) if !var_name.is_empty() => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if braced && !var_name.is_empty() {
                    result.push('}');
                }
            }
        }
    }

    result
}
