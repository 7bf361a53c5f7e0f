//! Single-endpoint EVM chain client on top of an alloy provider.

use alloy_network::{EthereumWallet, ReceiptResponse};
use alloy_primitives::{Address, B256, Bytes, TxHash};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::{RpcError, TransportError, TransportErrorKind};
use async_trait::async_trait;
use payrail::amount::TokenAmount;
use payrail::authorization::PaymentAuthorization;
use payrail::chain::{ChainClient, ChainConnector, ClientError, Confirmation, NonceState};
use payrail::network::{ChainFamily, NetworkDescriptor};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

use crate::contract::IEIP3009;
use crate::signature::{Eip3009Payment, parse_signature};

/// Builds [`EvmChainClient`]s.
///
/// Without a signer the clients are read-only and `submit_transfer` answers
/// [`ClientError::Unsupported`].
#[derive(Clone, Default)]
pub struct EvmConnector {
    signer: Option<(Address, EthereumWallet)>,
    /// Serializes broadcasts of the facilitator account so that each one sees
    /// the previous pending nonce.
    submit_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for EvmConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmConnector")
            .field("signer", &self.signer.as_ref().map(|(address, _)| address))
            .finish_non_exhaustive()
    }
}

impl EvmConnector {
    /// A read-only connector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signs and pays gas for submitted transfers with `signer`.
    #[must_use]
    pub fn with_signer(mut self, signer: PrivateKeySigner) -> Self {
        self.signer = Some((signer.address(), EthereumWallet::from(signer)));
        self
    }
}

impl ChainConnector for EvmConnector {
    fn connect(
        &self,
        network: &NetworkDescriptor,
        endpoint: &Url,
    ) -> Result<Arc<dyn ChainClient>, ClientError> {
        if network.chain_family != ChainFamily::Evm {
            return Err(ClientError::Unsupported("non-EVM network"));
        }
        let token: Address = network
            .signature_domain
            .verifying_contract
            .parse()
            .map_err(|e| ClientError::Rejected(format!("invalid token address: {e}")))?;
        let provider = match &self.signer {
            Some((_, wallet)) => ProviderBuilder::new()
                .wallet(wallet.clone())
                .connect_http(endpoint.clone())
                .erased(),
            None => ProviderBuilder::new().connect_http(endpoint.clone()).erased(),
        };
        Ok(Arc::new(EvmChainClient {
            provider,
            token,
            can_submit: self.signer.is_some(),
            submit_lock: Arc::clone(&self.submit_lock),
        }))
    }
}

/// Talks to one JSON-RPC endpoint about one ERC-3009 token.
#[derive(Clone)]
pub struct EvmChainClient {
    provider: DynProvider,
    token: Address,
    can_submit: bool,
    submit_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for EvmChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmChainClient")
            .field("token", &self.token)
            .field("can_submit", &self.can_submit)
            .finish_non_exhaustive()
    }
}

impl EvmChainClient {
    fn contract(&self) -> IEIP3009::IEIP3009Instance<&DynProvider> {
        IEIP3009::new(self.token, &self.provider)
    }

    fn transfer_call(
        &self,
        authorization: &PaymentAuthorization,
    ) -> Result<
        alloy_contract::SolCallBuilder<&DynProvider, IEIP3009::transferWithAuthorizationCall>,
        ClientError,
    > {
        let payment = Eip3009Payment::from_authorization(authorization)
            .map_err(|e| ClientError::Rejected(e.to_string()))?;
        let signature =
            parse_signature(&authorization.signature).map_err(|e| ClientError::Rejected(e.to_string()))?;
        let call = IEIP3009::transferWithAuthorizationCall {
            from: payment.from,
            to: payment.to,
            value: payment.value,
            validAfter: payment.valid_after,
            validBefore: payment.valid_before,
            nonce: payment.nonce,
            v: 27 + u8::from(signature.v()),
            r: B256::from(signature.r()),
            s: B256::from(signature.s()),
        };
        Ok(alloy_contract::SolCallBuilder::new_sol(
            &self.provider,
            &self.token,
            &call,
        ))
    }
}

fn parse_address(raw: &str) -> Result<Address, ClientError> {
    raw.parse()
        .map_err(|e| ClientError::Rejected(format!("invalid address {raw}: {e}")))
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn get_balance(&self, owner: &str) -> Result<TokenAmount, ClientError> {
        let owner = parse_address(owner)?;
        let balance = self
            .contract()
            .balanceOf(owner)
            .call()
            .await
            .map_err(classify_contract_error)?;
        Ok(TokenAmount::new(balance))
    }

    async fn get_nonce_state(&self, payer: &str, nonce: &Bytes) -> Result<NonceState, ClientError> {
        let payer = parse_address(payer)?;
        let nonce = B256::try_from(nonce.as_ref())
            .map_err(|_| ClientError::Rejected("nonce must be 32 bytes".to_owned()))?;
        let used = self
            .contract()
            .authorizationState(payer, nonce)
            .call()
            .await
            .map_err(classify_contract_error)?;
        Ok(used.into())
    }

    async fn simulate_authorization(
        &self,
        authorization: &PaymentAuthorization,
    ) -> Result<(), ClientError> {
        self.transfer_call(authorization)?
            .call()
            .await
            .map_err(classify_contract_error)?;
        Ok(())
    }

    async fn submit_transfer(
        &self,
        authorization: &PaymentAuthorization,
    ) -> Result<String, ClientError> {
        if !self.can_submit {
            return Err(ClientError::Unsupported(
                "submit_transfer without a signer key",
            ));
        }
        let call = self.transfer_call(authorization)?;
        let _broadcast = self.submit_lock.lock().await;
        let pending = call.send().await.map_err(classify_contract_error)?;
        Ok(format!("{:#x}", pending.tx_hash()))
    }

    async fn get_confirmation(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Confirmation>, ClientError> {
        let hash: TxHash = transaction_id
            .parse()
            .map_err(|e| ClientError::Rejected(format!("invalid transaction id: {e}")))?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| classify_transport_error(&e))?;
        Ok(receipt.and_then(|receipt| {
            receipt.block_number().map(|block_number| Confirmation {
                block_number,
                succeeded: receipt.status(),
            })
        }))
    }
}

fn classify_contract_error(error: alloy_contract::Error) -> ClientError {
    match error {
        alloy_contract::Error::TransportError(e) => classify_transport_error(&e),
        other => ClientError::Rejected(other.to_string()),
    }
}

/// Sorts a transport error by what it says about the request.
///
/// - a JSON-RPC error response is the node's final word: [`ClientError::Rejected`]
/// - a refused connection or a 429 means the node never processed it: [`ClientError::Unreachable`]
/// - anything else may have happened after the node saw the request: [`ClientError::Ambiguous`]
pub fn classify_transport_error(error: &TransportError) -> ClientError {
    match error {
        RpcError::ErrorResp(payload) => ClientError::Rejected(payload.to_string()),
        RpcError::Transport(kind) if never_reached_node(kind) => {
            ClientError::Unreachable(error.to_string())
        }
        other => ClientError::Ambiguous(other.to_string()),
    }
}

fn never_reached_node(kind: &TransportErrorKind) -> bool {
    match kind {
        TransportErrorKind::Custom(source) => source
            .downcast_ref::<alloy_transport_http::reqwest::Error>()
            .is_some_and(alloy_transport_http::reqwest::Error::is_connect),
        TransportErrorKind::HttpError(http) => http.status == 429,
        _ => false,
    }
}
