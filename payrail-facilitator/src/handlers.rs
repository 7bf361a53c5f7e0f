//! Axum route handlers for the facilitator service.
//!
//! Endpoints:
//! - `GET /health`: liveness
//! - `GET /supported`: served networks
//! - `POST /verify`: check an authorization without touching the chain
//! - `POST /settle`: execute an authorization on-chain
//! - `GET /authorization-state`: whether a `(payer, nonce)` pair is used
//! - `GET /rpc-config?network=<id>`: resolved RPC endpoints of a network
//! - `GET /rpc-config/status`: cache state (operator)
//! - `POST /rpc-config/invalidate-cache`: force a refetch (operator)

use std::str::FromStr;

use alloy_primitives::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use payrail::authorization::{PaymentAuthorization, VerificationResult};
use payrail::error::SettlementError;
use payrail::network::{NetworkDescriptor, NetworkId};
use payrail::rpc::{RpcConfigStatus, SnapshotSource};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::state::FacilitatorState;

/// Body of `/verify` and `/settle`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentRequest {
    /// The signed authorization.
    pub authorization: PaymentAuthorization,
    /// Network to verify or settle on.
    pub network_id: NetworkId,
}

/// `202` body of `/settle` when the transfer was broadcast but not yet confirmed.
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedResponse {
    /// Always `submitted`.
    pub status: &'static str,
    /// Broadcast transaction.
    pub transaction_id: String,
    /// Network of the transfer.
    pub network_id: NetworkId,
    /// Paying account, for `/authorization-state` lookups.
    pub payer: String,
    /// Authorization nonce, for `/authorization-state` lookups.
    pub nonce: Bytes,
}

/// Query of `/rpc-config`.
#[derive(Debug, Deserialize)]
pub struct NetworkQuery {
    /// Network id.
    pub network: NetworkId,
}

/// Body of `/rpc-config`.
#[derive(Debug, Serialize)]
pub struct RpcConfigResponse {
    /// Network id.
    pub network: NetworkId,
    /// Primary endpoint.
    pub primary: String,
    /// Fallback endpoint.
    pub fallback: String,
    /// Layer that answered.
    pub source: SnapshotSource,
}

/// Query of `/authorization-state`.
#[derive(Debug, Deserialize)]
pub struct AuthorizationStateQuery {
    /// Network id.
    pub network: NetworkId,
    /// Paying account.
    pub payer: String,
    /// Hex nonce.
    pub nonce: String,
}

/// Body of `/authorization-state`.
#[derive(Debug, Serialize)]
pub struct AuthorizationStateResponse {
    /// Network id.
    pub network: NetworkId,
    /// Paying account.
    pub payer: String,
    /// Nonce.
    pub nonce: Bytes,
    /// Whether the nonce is consumed on-chain.
    pub used: bool,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))
}

fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(q)| q)
        .map_err(|e| ApiError::InvalidRequest(e.body_text()))
}

fn require_admin(state: &FacilitatorState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.admin_token() else {
        return Err(ApiError::AdminDisabled);
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default();
    if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// `GET /health`: process liveness. Checks no dependencies.
pub async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /supported`: the served networks.
pub async fn get_supported(State(state): State<FacilitatorState>) -> Json<Vec<NetworkDescriptor>> {
    Json(state.registry().iter().cloned().collect())
}

/// `POST /verify`: runs the Verification Engine.
///
/// Verification failures are a `200` with `valid: false`.
///
/// # Errors
///
/// Returns 400 on a malformed body.
pub async fn post_verify(
    State(state): State<FacilitatorState>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<VerificationResult>, ApiError> {
    let request = json_body(payload)?;
    let result = state
        .verifier()
        .verify(&request.authorization, &request.network_id);
    tracing::debug!(
        network = %request.network_id,
        payer = %request.authorization.payer_address,
        valid = result.valid,
        "Verified authorization"
    );
    Ok(Json(result))
}

/// `POST /settle`: runs the Settlement Engine.
///
/// Settlement runs on its own task so that a dropped connection never
/// cancels a write in flight.
///
/// # Errors
///
/// Returns the settlement failure with its mapped status.
pub async fn post_settle(
    State(state): State<FacilitatorState>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(payload)?;
    let engine = state.settlement();
    let task = tokio::spawn(async move {
        let outcome = engine
            .settle(&request.authorization, &request.network_id)
            .await;
        (request, outcome)
    });
    let (request, outcome) = task
        .await
        .map_err(|e| ApiError::Internal(format!("settlement task failed: {e}")))?;

    match outcome {
        Ok(receipt) => Ok(Json(receipt).into_response()),
        Err(SettlementError::Unconfirmed { transaction_id }) => Ok((
            StatusCode::ACCEPTED,
            Json(SubmittedResponse {
                status: "submitted",
                transaction_id,
                network_id: request.network_id,
                payer: request.authorization.payer_address,
                nonce: request.authorization.nonce,
            }),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// `GET /authorization-state?network=&payer=&nonce=`: reads the nonce state
/// from the chain, for resolving ambiguous or unconfirmed settlements.
///
/// # Errors
///
/// Returns 400 on a malformed query, payer or nonce, 404 for an unknown
/// network, or the chain failure.
pub async fn get_authorization_state(
    State(state): State<FacilitatorState>,
    params: Result<Query<AuthorizationStateQuery>, QueryRejection>,
) -> Result<Json<AuthorizationStateResponse>, ApiError> {
    let params = query(params)?;
    if !state.registry().contains(&params.network) {
        return Err(ApiError::UnknownNetwork(params.network));
    }
    let nonce = Bytes::from_str(&params.nonce)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid nonce: {e}")))?;
    state
        .verifier()
        .check_lookup(&params.network, &params.payer, &nonce)
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    let nonce_state = state
        .provider()
        .get_nonce_state(&params.network, &params.payer, &nonce)
        .await?;
    Ok(Json(AuthorizationStateResponse {
        network: params.network,
        payer: params.payer,
        nonce,
        used: nonce_state.is_used(),
    }))
}

/// `GET /rpc-config?network=<id>`: the resolved endpoint pair.
///
/// # Errors
///
/// Returns 400 without `network`, 404 for an unknown network.
pub async fn get_rpc_config(
    State(state): State<FacilitatorState>,
    params: Result<Query<NetworkQuery>, QueryRejection>,
) -> Result<Json<RpcConfigResponse>, ApiError> {
    let NetworkQuery { network } = query(params)?;
    if !state.registry().contains(&network) {
        return Err(ApiError::UnknownNetwork(network));
    }
    let (pair, source) = state.rpc_config().resolve(&network).await?;
    Ok(Json(RpcConfigResponse {
        network,
        primary: pair.primary_url.to_string(),
        fallback: pair.fallback_url.to_string(),
        source,
    }))
}

/// `GET /rpc-config/status` (operator).
///
/// # Errors
///
/// Returns 403 without a configured admin token, 401 on a wrong one.
pub async fn get_rpc_config_status(
    State(state): State<FacilitatorState>,
    headers: HeaderMap,
) -> Result<Json<RpcConfigStatus>, ApiError> {
    require_admin(&state, &headers)?;
    Ok(Json(state.rpc_config().status().await))
}

/// `POST /rpc-config/invalidate-cache` (operator).
///
/// # Errors
///
/// Returns 403 without a configured admin token, 401 on a wrong one.
pub async fn post_invalidate_cache(
    State(state): State<FacilitatorState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers)?;
    state.rpc_config().invalidate().await;
    Ok(Json(serde_json::json!({ "status": "invalidated" })))
}

/// Creates an Axum [`Router`] with all facilitator endpoints.
pub fn facilitator_router(state: FacilitatorState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/supported", get(get_supported))
        .route("/verify", post(post_verify))
        .route("/settle", post(post_settle))
        .route("/authorization-state", get(get_authorization_state))
        .route("/rpc-config", get(get_rpc_config))
        .route("/rpc-config/status", get(get_rpc_config_status))
        .route("/rpc-config/invalidate-cache", post(post_invalidate_cache))
        .with_state(state)
}
