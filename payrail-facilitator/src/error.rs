//! HTTP error responses.
//!
//! Every failure answers `{ "error_kind": "...", "message": "..." }` with a
//! status derived from the error's kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use payrail::error::{ChainError, SettlementError, VerificationError};
use payrail::network::NetworkId;
use payrail::rpc::UnknownNetworkError;

/// Errors returned by the facilitator's HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body or query string could not be understood.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The network is not served by this facilitator.
    #[error("unknown network {0}")]
    UnknownNetwork(NetworkId),

    /// Missing or wrong operator token.
    #[error("missing or invalid admin token")]
    Unauthorized,

    /// Operator endpoints are disabled because no admin token is configured.
    #[error("operator endpoints are disabled")]
    AdminDisabled,

    /// Settlement was rejected.
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// A chain read failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Unexpected fault inside the facilitator.
    #[error("internal error")]
    Internal(String),
}

impl From<UnknownNetworkError> for ApiError {
    fn from(value: UnknownNetworkError) -> Self {
        Self::UnknownNetwork(value.0)
    }
}

impl ApiError {
    /// Stable machine-readable name, sent as `error_kind`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::UnknownNetwork(_) => "UnknownNetwork",
            Self::Unauthorized => "Unauthorized",
            Self::AdminDisabled => "Forbidden",
            Self::Settlement(e) => e.kind(),
            Self::Chain(e) => e.kind(),
            Self::Internal(_) => "Internal",
        }
    }

    /// HTTP status of the error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownNetwork(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::AdminDisabled => StatusCode::FORBIDDEN,
            Self::Settlement(e) => settlement_status(e),
            Self::Chain(e) => chain_status(e),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

const fn settlement_status(error: &SettlementError) -> StatusCode {
    match error {
        SettlementError::Verification(VerificationError::UnsupportedNetwork(_)) => {
            StatusCode::NOT_FOUND
        }
        SettlementError::Verification(_) => StatusCode::BAD_REQUEST,
        SettlementError::AlreadySettled { .. } => StatusCode::CONFLICT,
        SettlementError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        SettlementError::Reverted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SettlementError::Unconfirmed { .. } => StatusCode::ACCEPTED,
        SettlementError::Chain(e) => chain_status(e),
    }
}

const fn chain_status(error: &ChainError) -> StatusCode {
    match error {
        ChainError::AllEndpointsUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ChainError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ChainError::AmbiguousOutcome { .. } | ChainError::Rejected { .. } => StatusCode::BAD_GATEWAY,
        ChainError::UnknownNetwork(_) => StatusCode::NOT_FOUND,
        ChainError::Unsupported { .. } => StatusCode::NOT_IMPLEMENTED,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal facilitator error");
                self.to_string()
            }
            other => other.to_string(),
        };
        let body = serde_json::json!({ "error_kind": self.kind(), "message": message });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payrail::amount::TokenAmount;

    #[test]
    fn status_mapping() {
        let net = NetworkId::new("base");
        let cases = [
            (ApiError::from(SettlementError::from(VerificationError::Expired)), 400),
            (
                ApiError::from(SettlementError::from(VerificationError::UnsupportedNetwork(
                    net.clone(),
                ))),
                404,
            ),
            (
                ApiError::from(SettlementError::AlreadySettled {
                    payer: "a".into(),
                    nonce: "0x01".into(),
                }),
                409,
            ),
            (
                ApiError::from(SettlementError::InsufficientFunds {
                    balance: TokenAmount::ZERO,
                    required: TokenAmount::from(1),
                }),
                402,
            ),
            (ApiError::from(ChainError::AllEndpointsUnreachable(net.clone())), 503),
            (ApiError::from(ChainError::Timeout(net.clone())), 504),
            (
                ApiError::from(ChainError::AmbiguousOutcome {
                    network: net.clone(),
                    detail: "timeout".into(),
                }),
                502,
            ),
            (
                ApiError::from(ChainError::Unsupported {
                    network: net,
                    family: payrail::network::ChainFamily::Svm,
                    operation: "submit_transfer",
                }),
                501,
            ),
            (ApiError::Internal("boom".into()), 500),
        ];
        for (error, status) in cases {
            assert_eq!(error.status().as_u16(), status, "{error:?}");
        }
    }

    #[test]
    fn internal_details_stay_private() {
        let response = ApiError::Internal("database password is hunter2".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::Internal("x".into()).to_string(),
            "internal error"
        );
    }
}
