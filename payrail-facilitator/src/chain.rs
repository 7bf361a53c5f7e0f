//! Chain family selection.

use std::sync::Arc;

use payrail::chain::{ChainClient, ChainConnector, ClientError};
use payrail::network::{ChainFamily, NetworkDescriptor};
use payrail_evm::EvmConnector;
use payrail_svm::SvmConnector;
use url::Url;

/// Dispatches connections to the family crate matching the network.
#[derive(Debug, Clone, Default)]
pub struct FamilyConnector {
    evm: EvmConnector,
    svm: SvmConnector,
}

impl FamilyConnector {
    /// Combines the per-family connectors.
    #[must_use]
    pub const fn new(evm: EvmConnector, svm: SvmConnector) -> Self {
        Self { evm, svm }
    }
}

impl ChainConnector for FamilyConnector {
    fn connect(
        &self,
        network: &NetworkDescriptor,
        endpoint: &Url,
    ) -> Result<Arc<dyn ChainClient>, ClientError> {
        match network.chain_family {
            ChainFamily::Evm => self.evm.connect(network, endpoint),
            ChainFamily::Svm => self.svm.connect(network, endpoint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_family() {
        let connector = FamilyConnector::default();
        let endpoint = Url::parse("http://127.0.0.1:8899").unwrap();
        let evm = payrail_evm::networks::known_networks().remove(0).descriptor;
        let svm = payrail_svm::networks::known_networks().remove(0).descriptor;
        assert!(connector.connect(&evm, &endpoint).is_ok());
        assert!(connector.connect(&svm, &endpoint).is_ok());
    }
}
