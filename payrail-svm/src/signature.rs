//! Verification of Solana payment authorizations.
//!
//! The payer's ed25519 signature must cover the serialized transfer message
//! carried as the nonce, and that message must move exactly the authorized
//! value to the payee's token account. See [`crate::transfer`].

use payrail::authorization::PaymentAuthorization;
use payrail::error::{InvalidLookup, VerificationError};
use payrail::network::NetworkDescriptor;
use payrail::verify::SignatureVerifier;
use solana_pubkey::Pubkey;
use solana_signature::Signature;

use crate::transfer::{PaymentMessage, TransferLimits, parse_pubkey};

/// Checks payer signatures and the transfer they authorize.
///
/// With a fee payer configured, messages naming another fee payer, or
/// touching the fee payer's accounts, are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolanaVerifier {
    fee_payer: Option<Pubkey>,
    limits: TransferLimits,
}

impl SolanaVerifier {
    /// A verifier enforcing `limits`.
    #[must_use]
    pub const fn new(limits: TransferLimits) -> Self {
        Self {
            fee_payer: None,
            limits,
        }
    }

    /// Requires `fee_payer` to be the message's fee payer.
    #[must_use]
    pub const fn with_fee_payer(mut self, fee_payer: Pubkey) -> Self {
        self.fee_payer = Some(fee_payer);
        self
    }
}

impl SignatureVerifier for SolanaVerifier {
    fn verify_signature(
        &self,
        authorization: &PaymentAuthorization,
        network: &NetworkDescriptor,
    ) -> Result<(), VerificationError> {
        let payer = parse_pubkey(&authorization.payer_address, "payer")?;
        let signature = Signature::try_from(authorization.signature.as_ref()).map_err(|_| {
            VerificationError::InvalidSignature(format!(
                "expected a 64 byte signature, got {} bytes",
                authorization.signature.len()
            ))
        })?;
        if !signature.verify(payer.as_ref(), &authorization.nonce) {
            return Err(VerificationError::InvalidSignature(
                "ed25519 signature does not match payer".to_owned(),
            ));
        }
        let message = PaymentMessage::decode(&authorization.nonce)?;
        message.check_authorization(authorization, network)?;
        message.check_limits(&self.limits)?;
        if let Some(fee_payer) = &self.fee_payer {
            message.check_fee_payer(fee_payer)?;
        }
        Ok(())
    }

    fn check_lookup(&self, payer: &str, nonce: &[u8]) -> Result<(), InvalidLookup> {
        let payer = parse_pubkey(payer, "payer").map_err(|e| InvalidLookup(e.to_string()))?;
        let message = PaymentMessage::decode(nonce).map_err(|e| InvalidLookup(e.to_string()))?;
        if message.transfer().authority != payer {
            return Err(InvalidLookup(
                "nonce is not a transfer message from payer".to_owned(),
            ));
        }
        Ok(())
    }
}
