//! Single-endpoint Solana JSON-RPC client.
//!
//! Reads go straight to the node. Settlement needs a fee payer: the
//! facilitator co-signs the payer's transfer message, simulates the
//! transaction and broadcasts it. Whether an authorization was used is the
//! status of the transaction id the fee payer's signature determines.

use alloy_primitives::Bytes;
use async_trait::async_trait;
use payrail::amount::TokenAmount;
use payrail::authorization::PaymentAuthorization;
use payrail::chain::{ChainClient, ChainConnector, ClientError, Confirmation, NonceState};
use payrail::network::{ChainFamily, NetworkDescriptor};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

use crate::transfer::{PaymentMessage, encode_transaction};

/// Builds [`SvmChainClient`]s sharing one HTTP connection pool.
///
/// Without a fee payer the clients are read-only: nonce queries, simulation
/// and submission answer [`ClientError::Unsupported`].
#[derive(Clone, Default)]
pub struct SvmConnector {
    http: reqwest::Client,
    fee_payer: Option<Arc<Keypair>>,
}

impl std::fmt::Debug for SvmConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvmConnector")
            .field("fee_payer", &self.fee_payer())
            .finish_non_exhaustive()
    }
}

impl SvmConnector {
    /// A read-only connector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Co-signs and pays the fee of settled transfers with `fee_payer`.
    #[must_use]
    pub fn with_fee_payer(mut self, fee_payer: Keypair) -> Self {
        self.fee_payer = Some(Arc::new(fee_payer));
        self
    }

    /// Public key of the fee payer, if one is configured.
    #[must_use]
    pub fn fee_payer(&self) -> Option<Pubkey> {
        self.fee_payer.as_ref().map(|keypair| keypair.pubkey())
    }
}

impl ChainConnector for SvmConnector {
    fn connect(
        &self,
        network: &NetworkDescriptor,
        endpoint: &Url,
    ) -> Result<Arc<dyn ChainClient>, ClientError> {
        if network.chain_family != ChainFamily::Svm {
            return Err(ClientError::Unsupported("non-Solana network"));
        }
        let mint = Pubkey::from_str(&network.signature_domain.verifying_contract)
            .map_err(|e| ClientError::Rejected(format!("invalid token mint: {e}")))?;
        Ok(Arc::new(SvmChainClient {
            http: self.http.clone(),
            endpoint: endpoint.clone(),
            mint,
            fee_payer: self.fee_payer.clone(),
        }))
    }
}

/// Talks to one Solana RPC endpoint about one SPL token mint.
#[derive(Clone)]
pub struct SvmChainClient {
    http: reqwest::Client,
    endpoint: Url,
    mint: Pubkey,
    fee_payer: Option<Arc<Keypair>>,
}

impl std::fmt::Debug for SvmChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvmChainClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("mint", &self.mint)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Deserialize)]
struct TokenAccount {
    account: TokenAccountData,
}

#[derive(Deserialize)]
struct TokenAccountData {
    data: ParsedData,
}

#[derive(Deserialize)]
struct ParsedData {
    parsed: ParsedAccount,
}

#[derive(Deserialize)]
struct ParsedAccount {
    info: ParsedTokenInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedTokenInfo {
    token_amount: UiTokenAmount,
}

#[derive(Deserialize)]
struct UiTokenAmount {
    amount: String,
}

#[derive(Deserialize)]
struct SimulationResult {
    err: Option<Value>,
    #[serde(default)]
    logs: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    slot: u64,
    err: Option<Value>,
    confirmation_status: Option<String>,
}

impl SvmChainClient {
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ClientError> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(classify_http_error)?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::Unreachable(format!("{method}: rate limited")));
        }
        if !status.is_success() {
            return Err(ClientError::Ambiguous(format!("{method}: HTTP {status}")));
        }
        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ClientError::Ambiguous(format!("{method}: {e}")))?;
        if let Some(error) = envelope.error {
            return Err(ClientError::Rejected(format!(
                "{method}: {} ({})",
                error.message, error.code
            )));
        }
        envelope
            .result
            .ok_or_else(|| ClientError::Ambiguous(format!("{method}: response without result")))
    }

    fn fee_payer(&self, operation: &'static str) -> Result<&Keypair, ClientError> {
        self.fee_payer.as_deref().ok_or(ClientError::Unsupported(operation))
    }

    /// The fully signed transaction of `authorization`, base64 encoded.
    fn co_signed(&self, authorization: &PaymentAuthorization) -> Result<String, ClientError> {
        let fee_payer = self.fee_payer("Solana settlement without a fee payer")?;
        let message = PaymentMessage::decode(&authorization.nonce)?;
        let payer_signature = Signature::try_from(authorization.signature.as_ref())
            .map_err(|_| ClientError::Rejected("payer signature must be 64 bytes".to_owned()))?;
        let transaction = message.co_sign(fee_payer, payer_signature)?;
        Ok(encode_transaction(&transaction)?)
    }

    async fn signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>, ClientError> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }
}

/// Maps a transport failure onto the failover taxonomy.
///
/// Connection failures never reached the node and are safe to replay; a
/// request that was sent but got no usable answer is ambiguous.
#[must_use]
pub fn classify_http_error(error: reqwest::Error) -> ClientError {
    if error.is_connect() {
        ClientError::Unreachable(error.to_string())
    } else {
        ClientError::Ambiguous(error.to_string())
    }
}

#[async_trait]
impl ChainClient for SvmChainClient {
    async fn get_balance(&self, owner: &str) -> Result<TokenAmount, ClientError> {
        let owner = Pubkey::from_str(owner)
            .map_err(|e| ClientError::Rejected(format!("invalid owner {owner}: {e}")))?;
        let accounts: WithContext<Vec<TokenAccount>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    { "mint": self.mint.to_string() },
                    { "encoding": "jsonParsed" },
                ]),
            )
            .await?;
        let mut total: u128 = 0;
        for account in accounts.value {
            let raw = account.account.data.parsed.info.token_amount.amount;
            let amount: u64 = raw
                .parse()
                .map_err(|_| ClientError::Ambiguous(format!("invalid token amount {raw:?}")))?;
            total += u128::from(amount);
        }
        Ok(TokenAmount::new(alloy_primitives::U256::from(total)))
    }

    async fn get_nonce_state(&self, _payer: &str, nonce: &Bytes) -> Result<NonceState, ClientError> {
        let fee_payer = self.fee_payer("Solana nonce state without a fee payer")?;
        let message = PaymentMessage::decode(nonce)?;
        let transaction_id = message.transaction_id(fee_payer).to_string();
        let status = self.signature_status(&transaction_id).await?;
        Ok(status.is_some().into())
    }

    async fn simulate_authorization(
        &self,
        authorization: &PaymentAuthorization,
    ) -> Result<(), ClientError> {
        let transaction = self.co_signed(authorization)?;
        let simulation: WithContext<SimulationResult> = self
            .call(
                "simulateTransaction",
                json!([transaction, {
                    "encoding": "base64",
                    "sigVerify": true,
                    "commitment": "confirmed",
                }]),
            )
            .await?;
        match simulation.value.err {
            None => Ok(()),
            Some(err) => {
                let logs = simulation.value.logs.unwrap_or_default().join("; ");
                Err(ClientError::Rejected(format!("simulation failed: {err} [{logs}]")))
            }
        }
    }

    async fn submit_transfer(
        &self,
        authorization: &PaymentAuthorization,
    ) -> Result<String, ClientError> {
        let transaction = self.co_signed(authorization)?;
        self.call(
            "sendTransaction",
            json!([transaction, {
                "encoding": "base64",
                "skipPreflight": true,
                "preflightCommitment": "confirmed",
            }]),
        )
        .await
    }

    async fn get_confirmation(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Confirmation>, ClientError> {
        let Some(status) = self.signature_status(transaction_id).await? else {
            return Ok(None);
        };
        match status.confirmation_status.as_deref() {
            Some("confirmed" | "finalized") => Ok(Some(Confirmation {
                block_number: status.slot,
                succeeded: status.err.is_none(),
            })),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::tests::{devnet, signed_authorization};
    use base64::Engine;
    use payrail::chain::ChainProvider;
    use payrail::network::{KnownNetwork, NetworkRegistry};
    use payrail::rpc::{RpcConfigManager, RpcConfigSnapshot, RpcEndpointPair};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OWNER: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    fn client(server: &MockServer) -> Arc<dyn ChainClient> {
        SvmConnector::new()
            .connect(&devnet(), &Url::parse(&server.uri()).unwrap())
            .unwrap()
    }

    fn token_account(amount: &str) -> Value {
        json!({
            "pubkey": "7o36UsWR1JQLpZ9PE2gn9L4SQ69CNNiWAXd4Jt7rqz9Z",
            "account": { "data": { "parsed": { "info": {
                "tokenAmount": { "amount": amount, "decimals": 6 }
            } } } }
        })
    }

    #[tokio::test]
    async fn sums_token_accounts_for_the_mint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "getTokenAccountsByOwner",
                "params": [OWNER, { "mint": "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU" }],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "context": { "slot": 1 }, "value": [token_account("1500"), token_account("250")] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let balance = client(&server).get_balance(OWNER).await.unwrap();
        assert_eq!(balance, TokenAmount::from(1750));
    }

    #[tokio::test]
    async fn rpc_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": { "code": -32602, "message": "Invalid param" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).get_balance(OWNER).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(m) if m.contains("Invalid param")));
    }

    #[tokio::test]
    async fn rate_limit_is_unreachable_and_server_error_ambiguous() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(matches!(
            client.get_balance(OWNER).await,
            Err(ClientError::Unreachable(_))
        ));
        assert!(matches!(
            client.get_balance(OWNER).await,
            Err(ClientError::Ambiguous(_))
        ));
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        drop(listener);

        let client = SvmConnector::new().connect(&devnet(), &url).unwrap();
        assert!(matches!(
            client.get_balance(OWNER).await,
            Err(ClientError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn signature_status_maps_to_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getSignatureStatuses" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "context": { "slot": 90 }, "value": [
                    { "slot": 88, "confirmations": null, "err": null, "confirmationStatus": "finalized" }
                ] }
            })))
            .mount(&server)
            .await;

        let confirmation = client(&server).get_confirmation("5sig").await.unwrap();
        assert_eq!(
            confirmation,
            Some(Confirmation {
                block_number: 88,
                succeeded: true
            })
        );
    }

    #[tokio::test]
    async fn unknown_signature_is_pending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "context": { "slot": 90 }, "value": [null] }
            })))
            .mount(&server)
            .await;

        assert_eq!(client(&server).get_confirmation("5sig").await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_only_client_cannot_settle() {
        let server = MockServer::start().await;
        let network = devnet();
        let auth = signed_authorization(
            &Keypair::new(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &network,
            1,
        );
        let client = client(&server);
        assert!(matches!(
            client.get_nonce_state(OWNER, &auth.nonce).await,
            Err(ClientError::Unsupported(_))
        ));
        assert!(matches!(
            client.submit_transfer(&auth).await,
            Err(ClientError::Unsupported(_))
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    fn settling_client(server: &MockServer, fee_payer: &Keypair) -> Arc<dyn ChainClient> {
        SvmConnector::new()
            .with_fee_payer(fee_payer.insecure_clone())
            .connect(&devnet(), &Url::parse(&server.uri()).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn nonce_state_is_the_status_of_the_fee_payer_signature() {
        let network = devnet();
        let (fee_payer, payer) = (Keypair::new(), Keypair::new());
        let auth =
            signed_authorization(&payer, &Pubkey::new_unique(), &fee_payer.pubkey(), &network, 7);
        let transaction_id = PaymentMessage::decode(&auth.nonce)
            .unwrap()
            .transaction_id(&fee_payer)
            .to_string();

        let landed = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "getSignatureStatuses",
                "params": [[transaction_id]],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "context": { "slot": 90 }, "value": [
                    { "slot": 88, "err": null, "confirmationStatus": "confirmed" }
                ] }
            })))
            .expect(1)
            .mount(&landed)
            .await;
        let unknown = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "context": { "slot": 90 }, "value": [null] }
            })))
            .mount(&unknown)
            .await;

        let used = settling_client(&landed, &fee_payer)
            .get_nonce_state(&auth.payer_address, &auth.nonce)
            .await
            .unwrap();
        assert_eq!(used, NonceState::Used);
        let unused = settling_client(&unknown, &fee_payer)
            .get_nonce_state(&auth.payer_address, &auth.nonce)
            .await
            .unwrap();
        assert_eq!(unused, NonceState::Unused);
    }

    #[tokio::test]
    async fn simulates_then_broadcasts_the_co_signed_transaction() {
        let network = devnet();
        let (fee_payer, payer) = (Keypair::new(), Keypair::new());
        let auth =
            signed_authorization(&payer, &Pubkey::new_unique(), &fee_payer.pubkey(), &network, 7);
        let transaction_id = PaymentMessage::decode(&auth.nonce)
            .unwrap()
            .transaction_id(&fee_payer)
            .to_string();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "simulateTransaction" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "context": { "slot": 90 }, "value": { "err": null, "logs": [] } }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "sendTransaction" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": transaction_id
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = settling_client(&server, &fee_payer);
        client.simulate_authorization(&auth).await.unwrap();
        let submitted = client.submit_transfer(&auth).await.unwrap();
        assert_eq!(submitted, transaction_id);

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[1].body).unwrap();
        let wire = base64::engine::general_purpose::STANDARD
            .decode(body["params"][0].as_str().unwrap())
            .unwrap();
        let transaction: solana_transaction::versioned::VersionedTransaction =
            bincode::deserialize(&wire).unwrap();
        assert_eq!(transaction.signatures[0].to_string(), transaction_id);
        assert!(transaction.signatures[1].verify(payer.pubkey().as_ref(), &auth.nonce));
    }

    #[tokio::test]
    async fn failed_simulation_is_rejected() {
        let network = devnet();
        let fee_payer = Keypair::new();
        let auth = signed_authorization(
            &Keypair::new(),
            &Pubkey::new_unique(),
            &fee_payer.pubkey(),
            &network,
            7,
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "context": { "slot": 90 }, "value": {
                    "err": { "InstructionError": [2, { "Custom": 1 }] },
                    "logs": ["Program log: Error: insufficient funds"]
                } }
            })))
            .mount(&server)
            .await;

        let err = settling_client(&server, &fee_payer)
            .simulate_authorization(&auth)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(m) if m.contains("insufficient funds")));
    }

    #[tokio::test]
    async fn foreign_fee_payer_never_broadcasts() {
        let network = devnet();
        let auth = signed_authorization(
            &Keypair::new(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &network,
            7,
        );
        let server = MockServer::start().await;
        let err = settling_client(&server, &Keypair::new())
            .submit_transfer(&auth)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn rejects_evm_networks() {
        let mut network = devnet();
        network.chain_family = ChainFamily::Evm;
        let err = SvmConnector::new()
            .connect(&network, &Url::parse("http://localhost").unwrap())
            .err();
        assert_eq!(err, Some(ClientError::Unsupported("non-Solana network")));
    }

    #[tokio::test]
    async fn provider_reads_balance_through_fallback() {
        let fallback = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "context": { "slot": 1 }, "value": [token_account("42")] }
            })))
            .expect(1)
            .mount(&fallback)
            .await;
        let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let primary = format!("http://{}", dead.local_addr().unwrap());
        drop(dead);

        let known = KnownNetwork {
            descriptor: devnet(),
            public_rpc: RpcEndpointPair::parse(&primary, &fallback.uri()).unwrap(),
        };
        let id = known.descriptor.network_id.clone();
        let registry = Arc::new(NetworkRegistry::from_descriptors([known.descriptor.clone()]));
        let rpc = Arc::new(RpcConfigManager::new(RpcConfigSnapshot::hardcoded([&known])));
        let provider = ChainProvider::new(registry, rpc, Arc::new(SvmConnector::new()));

        let balance = provider.get_balance(&id, OWNER).await.unwrap();
        assert_eq!(balance, TokenAmount::from(42));
        assert_eq!(provider.failovers(&id), 1);
    }
}
