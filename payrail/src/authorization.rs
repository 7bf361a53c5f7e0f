//! The signed payment authorization and the values derived from it.

use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize, Serializer};

use crate::amount::TokenAmount;
use crate::error::VerificationError;
use crate::network::NetworkId;
use crate::timestamp::UnixTimestamp;

/// The payload a buyer signs: a one-time transfer of `value` from payer to
/// payee, redeemable inside `[valid_after, valid_before]`.
///
/// A `(payer_address, nonce)` pair settles at most once.
///
/// Field aliases accept the ERC-3009 spelling (`from`, `to`, `validAfter`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAuthorization {
    /// Address of the account paying (and signing).
    #[serde(alias = "from")]
    pub payer_address: String,
    /// Address of the account receiving the funds.
    #[serde(alias = "to")]
    pub payee_address: String,
    /// Amount in the token's smallest unit.
    pub value: TokenAmount,
    /// First second at which the authorization is valid.
    #[serde(alias = "validAfter")]
    pub valid_after: UnixTimestamp,
    /// Last second at which the authorization is valid.
    #[serde(alias = "validBefore")]
    pub valid_before: UnixTimestamp,
    /// Opaque per-payer unique value (hex).
    pub nonce: Bytes,
    /// Signature over the authorization under the network's signing domain (hex).
    pub signature: Bytes,
}

/// Outcome of [`VerificationEngine::verify`](crate::verify::VerificationEngine::verify).
///
/// Serializes as `{ "valid": true }` or
/// `{ "valid": false, "reason": "Expired", "message": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    /// Whether every check passed.
    pub valid: bool,
    /// The first failed check.
    #[serde(
        rename = "reason",
        serialize_with = "serialize_reason",
        skip_serializing_if = "Option::is_none"
    )]
    pub reason: Option<VerificationError>,
    /// Human-readable description of `reason`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[allow(clippy::ref_option)] // serde's serialize_with signature
fn serialize_reason<S: Serializer>(
    reason: &Option<VerificationError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match reason {
        Some(reason) => serializer.serialize_str(reason.kind()),
        None => serializer.serialize_none(),
    }
}

impl VerificationResult {
    /// A passing result.
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
            message: None,
        }
    }

    /// A failing result.
    #[must_use]
    pub fn invalid(reason: VerificationError) -> Self {
        Self {
            valid: false,
            message: Some(reason.to_string()),
            reason: Some(reason),
        }
    }
}

impl From<Result<(), VerificationError>> for VerificationResult {
    fn from(value: Result<(), VerificationError>) -> Self {
        match value {
            Ok(()) => Self::valid(),
            Err(e) => Self::invalid(e),
        }
    }
}

/// Proof that a transfer was confirmed on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// Chain transaction id (hash or signature).
    pub transaction_id: String,
    /// Network the transfer executed on.
    pub network_id: NetworkId,
    /// Block (or slot) that included the transfer.
    pub confirmed_block: u64,
    /// Amount transferred. A JSON number unless it exceeds `u64`.
    #[serde(serialize_with = "crate::amount::serialize_as_number")]
    pub amount_settled: TokenAmount,
    /// Paying account.
    pub payer: String,
    /// Receiving account.
    pub payee: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_erc3009_field_names() {
        let auth: PaymentAuthorization = serde_json::from_value(json!({
            "from": "0x1111111111111111111111111111111111111111",
            "to": "0x2222222222222222222222222222222222222222",
            "value": "10000",
            "validAfter": "0",
            "validBefore": 1_900_000_000u64,
            "nonce": "0x01",
            "signature": "0xabcd",
        }))
        .unwrap();
        assert_eq!(auth.value, TokenAmount::from(10_000));
        assert_eq!(auth.valid_before.as_secs(), 1_900_000_000);
        assert_eq!(auth.nonce.as_ref(), &[1u8]);
    }

    #[test]
    fn verification_result_wire_shape() {
        let ok = serde_json::to_value(VerificationResult::valid()).unwrap();
        assert_eq!(ok, json!({ "valid": true }));

        let bad =
            serde_json::to_value(VerificationResult::invalid(VerificationError::Expired)).unwrap();
        assert_eq!(bad["valid"], json!(false));
        assert_eq!(bad["reason"], json!("Expired"));
        assert!(bad["message"].is_string());
    }
}
