//! Shared application state and its assembly from configuration.

use std::sync::Arc;

use alloy_signer_local::PrivateKeySigner;
use payrail::chain::{ChainConnector, ChainProvider};
use payrail::network::{ChainFamily, KnownNetwork, NetworkId, NetworkRegistry};
use payrail::rpc::{HttpSecretStore, RpcConfigManager, RpcConfigSnapshot};
use payrail::settle::SettlementEngine;
use payrail::verify::VerificationEngine;
use payrail_evm::{Eip3009Verifier, EvmConnector};
use payrail_svm::{SolanaVerifier, SvmConnector};
use solana_keypair::Keypair;
use solana_signer::Signer;
use url::Url;

use crate::chain::FamilyConnector;
use crate::config::{ConfigError, FacilitatorConfig};

/// Everything a request handler needs.
#[allow(missing_debug_implementations)] // engines hold trait objects
pub struct Facilitator {
    registry: Arc<NetworkRegistry>,
    rpc_config: Arc<RpcConfigManager>,
    provider: Arc<ChainProvider>,
    verifier: Arc<VerificationEngine>,
    settlement: Arc<SettlementEngine>,
    admin_token: Option<String>,
}

/// Shared application state for the facilitator service.
pub type FacilitatorState = Arc<Facilitator>;

impl Facilitator {
    /// Assembles the facilitator from its engines. The engines are expected
    /// to share `registry`, `rpc_config` and `provider`.
    #[must_use]
    pub fn new(
        registry: Arc<NetworkRegistry>,
        rpc_config: Arc<RpcConfigManager>,
        provider: Arc<ChainProvider>,
        verifier: Arc<VerificationEngine>,
        settlement: Arc<SettlementEngine>,
    ) -> Self {
        Self {
            registry,
            rpc_config,
            provider,
            verifier,
            settlement,
            admin_token: None,
        }
    }

    /// Enables the operator endpoints behind `token`.
    #[must_use]
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    /// Wires up a facilitator over `known` networks and `connector`.
    ///
    /// The EVM family is verified with EIP-712 recovery and the Solana family
    /// with ed25519 over the payer's transfer message. A configured Solana
    /// fee payer is advertised on every Solana network.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration names unknown networks,
    /// carries a malformed RPC override, an invalid fee payer key or an
    /// invalid secret store URL.
    pub fn from_parts(
        config: &FacilitatorConfig,
        known: &[KnownNetwork],
        connector: Arc<dyn ChainConnector>,
    ) -> Result<Self, ConfigError> {
        let fee_payer = svm_fee_payer(config)?.map(|keypair| keypair.pubkey());
        let mut registry = NetworkRegistry::from_descriptors(known.iter().map(|k| {
            let mut descriptor = k.descriptor.clone();
            if descriptor.chain_family == ChainFamily::Svm {
                descriptor.fee_payer = fee_payer.map(|pubkey| pubkey.to_string());
            }
            descriptor
        }));
        if let Some(allow) = &config.networks {
            let unknown = registry.restrict(allow);
            if !unknown.is_empty() {
                return Err(unknown_networks("allow-list", &unknown));
            }
        }
        let registry = Arc::new(registry);

        let overrides = config.rpc_overrides()?;
        let unserved: Vec<_> = overrides
            .iter()
            .map(|(network, _)| network)
            .filter(|network| !registry.contains(network))
            .cloned()
            .collect();
        if !unserved.is_empty() {
            return Err(unknown_networks("rpc overrides", &unserved));
        }

        let served = known
            .iter()
            .filter(|k| registry.contains(&k.descriptor.network_id));
        let hardcoded = RpcConfigSnapshot::hardcoded(served).with_overrides(overrides);
        let rpc_config = match &config.secret_store {
            Some(store) => {
                let url = Url::parse(&store.url).map_err(|source| ConfigError::SecretStoreUrl {
                    url: store.url.clone(),
                    source,
                })?;
                let settings = config.rpc_settings();
                let mut client = HttpSecretStore::new(url).with_timeout(settings.fetch_timeout);
                if let Some(token) = store.token.as_deref().filter(|t| !t.starts_with('$')) {
                    client = client.with_token(token);
                }
                RpcConfigManager::new(hardcoded).with_secret_store(Arc::new(client), settings)
            }
            None => RpcConfigManager::new(hardcoded),
        };
        let rpc_config = Arc::new(rpc_config);

        let provider = Arc::new(
            ChainProvider::new(Arc::clone(&registry), Arc::clone(&rpc_config), connector)
                .with_call_timeout(config.chain_timeout()),
        );
        let solana = match fee_payer {
            Some(pubkey) => SolanaVerifier::new(config.svm).with_fee_payer(pubkey),
            None => SolanaVerifier::new(config.svm),
        };
        let verifier = Arc::new(
            VerificationEngine::new(Arc::clone(&registry))
                .with_verifier(ChainFamily::Evm, Arc::new(Eip3009Verifier))
                .with_verifier(ChainFamily::Svm, Arc::new(solana)),
        );
        let settlement = Arc::new(
            SettlementEngine::new(Arc::clone(&verifier), Arc::clone(&provider))
                .with_confirmation_timeout(config.confirmation_timeout()),
        );

        let facilitator = Self::new(registry, rpc_config, provider, verifier, settlement);
        Ok(match config.admin_token() {
            Some(token) => facilitator.with_admin_token(token),
            None => facilitator,
        })
    }

    /// Wires up a facilitator over every compiled-in network with real chain clients.
    ///
    /// # Errors
    ///
    /// See [`Self::from_parts`]; also fails on an invalid EVM signer key.
    pub fn from_config(config: &FacilitatorConfig) -> Result<Self, ConfigError> {
        let mut evm = EvmConnector::new();
        if let Some(key) = config.evm_signer_key() {
            let signer: PrivateKeySigner = key
                .parse()
                .map_err(|e| ConfigError::SignerKey(format!("{e}")))?;
            tracing::info!(signer = %signer.address(), "EVM settlement enabled");
            evm = evm.with_signer(signer);
        } else {
            tracing::warn!("No EVM signer configured, EVM settlement is disabled");
        }
        let mut svm = SvmConnector::new();
        if let Some(keypair) = svm_fee_payer(config)? {
            tracing::info!(fee_payer = %keypair.pubkey(), "Solana settlement enabled");
            svm = svm.with_fee_payer(keypair);
        } else {
            tracing::warn!("No Solana fee payer configured, Solana settlement is disabled");
        }
        let connector = FamilyConnector::new(evm, svm);

        let mut known = payrail_evm::networks::known_networks();
        known.extend(payrail_svm::networks::known_networks());
        Self::from_parts(config, &known, Arc::new(connector))
    }

    /// Served networks.
    #[must_use]
    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    /// The RPC Configuration Manager.
    #[must_use]
    pub fn rpc_config(&self) -> &RpcConfigManager {
        &self.rpc_config
    }

    /// The failover chain provider.
    #[must_use]
    pub fn provider(&self) -> &ChainProvider {
        &self.provider
    }

    /// The Verification Engine.
    #[must_use]
    pub fn verifier(&self) -> &VerificationEngine {
        &self.verifier
    }

    /// The Settlement Engine, shareable with spawned tasks.
    #[must_use]
    pub fn settlement(&self) -> Arc<SettlementEngine> {
        Arc::clone(&self.settlement)
    }

    /// Configured operator token.
    #[must_use]
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }
}

fn svm_fee_payer(config: &FacilitatorConfig) -> Result<Option<Keypair>, ConfigError> {
    config
        .svm_fee_payer_key()
        .map(|key| {
            Keypair::try_from_base58_string(key).map_err(|e| ConfigError::FeePayerKey(e.to_string()))
        })
        .transpose()
}

fn unknown_networks(section: &'static str, networks: &[NetworkId]) -> ConfigError {
    let names: Vec<_> = networks.iter().map(ToString::to_string).collect();
    ConfigError::UnknownNetworks {
        section,
        names: names.join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_every_compiled_in_network_by_default() {
        let config = FacilitatorConfig::parse("").unwrap();
        let facilitator = Facilitator::from_config(&config).unwrap();
        assert_eq!(facilitator.registry().len(), 14);
        assert!(facilitator.admin_token().is_none());
        assert_eq!(facilitator.rpc_config().hardcoded().len(), 14);
    }

    #[test]
    fn allow_list_restricts_networks() {
        let config = FacilitatorConfig::parse(
            r#"
            networks = ["base-sepolia", "solana-devnet"]
            admin_token = "op"
            "#,
        )
        .unwrap();
        let facilitator = Facilitator::from_config(&config).unwrap();
        let ids: Vec<_> = facilitator
            .registry()
            .iter()
            .map(|d| d.network_id.as_str())
            .collect();
        assert_eq!(ids, ["base-sepolia", "solana-devnet"]);
        assert_eq!(facilitator.rpc_config().hardcoded().len(), 2);
        assert_eq!(facilitator.admin_token(), Some("op"));
    }

    #[test]
    fn unknown_network_in_allow_list_fails() {
        let config = FacilitatorConfig::parse(r#"networks = ["base", "atlantis"]"#).unwrap();
        let err = Facilitator::from_config(&config).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::UnknownNetworks { section: "allow-list", names } if names == "atlantis"
        ));
    }

    #[test]
    fn override_for_unserved_network_fails() {
        let config = FacilitatorConfig::parse(
            r#"
            networks = ["base"]

            [rpc.overrides."atlantis"]
            primary = "https://atlantis.example.com"

            [rpc.overrides."base-sepolia"]
            primary = "https://sepolia.example.com"
            "#,
        )
        .unwrap();
        let err = Facilitator::from_config(&config).err().unwrap();
        let ConfigError::UnknownNetworks { section, names } = err else {
            panic!("expected UnknownNetworks, got {err}");
        };
        assert_eq!(section, "rpc overrides");
        let mut names: Vec<_> = names.split(", ").collect();
        names.sort_unstable();
        assert_eq!(names, ["atlantis", "base-sepolia"]);
    }

    #[test]
    fn fee_payer_is_advertised_on_solana_networks() {
        let keypair = Keypair::new();
        let config = FacilitatorConfig::parse(&format!(
            r#"
            networks = ["base", "solana-devnet"]
            svm_fee_payer_private_key = "{}"
            "#,
            keypair.to_base58_string()
        ))
        .unwrap();
        let facilitator = Facilitator::from_config(&config).unwrap();
        let fee_payers: Vec<_> = facilitator
            .registry()
            .iter()
            .map(|d| (d.network_id.as_str(), d.fee_payer.clone()))
            .collect();
        assert_eq!(
            fee_payers,
            [
                ("base", None),
                ("solana-devnet", Some(keypair.pubkey().to_string()))
            ]
        );
    }

    #[test]
    fn rejects_bad_fee_payer_key() {
        let config = FacilitatorConfig::parse(r#"svm_fee_payer_private_key = "abc""#).unwrap();
        assert!(matches!(
            Facilitator::from_config(&config),
            Err(ConfigError::FeePayerKey(_))
        ));
    }

    #[test]
    fn overrides_replace_public_endpoints() {
        let config = FacilitatorConfig::parse(
            r#"
            [rpc.overrides."base"]
            primary = "https://base.private.example.com"
            fallback = "https://mainnet.base.org"
            "#,
        )
        .unwrap();
        let facilitator = Facilitator::from_config(&config).unwrap();
        let pair = facilitator
            .rpc_config()
            .hardcoded()
            .get(&NetworkId::new("base"))
            .unwrap();
        assert_eq!(pair.primary_url.as_str(), "https://base.private.example.com/");
    }

    #[test]
    fn rejects_bad_signer_key() {
        let config = FacilitatorConfig::parse(r#"evm_signer_private_key = "0x1234""#).unwrap();
        assert!(matches!(
            Facilitator::from_config(&config),
            Err(ConfigError::SignerKey(_))
        ));
    }
}
