//! EIP-712 `TransferWithAuthorization` signatures (ERC-3009).

use alloy_primitives::{Address, B256, Signature, U256};
use alloy_sol_types::{Eip712Domain, SolStruct, sol};
use payrail::authorization::PaymentAuthorization;
use payrail::error::{InvalidLookup, VerificationError};
use payrail::network::NetworkDescriptor;
use payrail::verify::SignatureVerifier;
use std::borrow::Cow;

sol!(
    /// EIP-712 struct signed by the payer.
    ///
    /// Authorizes a transfer of `value` from `from` to `to`, valid only between
    /// `validAfter` and `validBefore`, identified by a unique `nonce`.
    #[derive(Debug)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

/// A [`PaymentAuthorization`] decoded into EVM types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip3009Payment {
    /// Payer.
    pub from: Address,
    /// Payee.
    pub to: Address,
    /// Value in token units.
    pub value: U256,
    /// Start of the validity window.
    pub valid_after: U256,
    /// End of the validity window.
    pub valid_before: U256,
    /// Authorization nonce.
    pub nonce: B256,
}

impl Eip3009Payment {
    /// Decodes addresses, value and nonce.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidSignature`] for malformed addresses
    /// or a nonce that is not 32 bytes, and
    /// [`VerificationError::ZeroOrNegativeValue`] for a negative value.
    pub fn from_authorization(
        authorization: &PaymentAuthorization,
    ) -> Result<Self, VerificationError> {
        let from = parse_address(&authorization.payer_address, "payer")?;
        let to = parse_address(&authorization.payee_address, "payee")?;
        let value = authorization
            .value
            .to_u256()
            .ok_or(VerificationError::ZeroOrNegativeValue)?;
        let nonce = B256::try_from(authorization.nonce.as_ref()).map_err(|_| {
            VerificationError::InvalidSignature(format!(
                "nonce must be 32 bytes, got {}",
                authorization.nonce.len()
            ))
        })?;
        Ok(Self {
            from,
            to,
            value,
            valid_after: U256::from(authorization.valid_after.as_secs()),
            valid_before: U256::from(authorization.valid_before.as_secs()),
            nonce,
        })
    }

    /// The EIP-712 hash the payer signed.
    #[must_use]
    pub fn signing_hash(&self, domain: &Eip712Domain) -> B256 {
        TransferWithAuthorization {
            from: self.from,
            to: self.to,
            value: self.value,
            validAfter: self.valid_after,
            validBefore: self.valid_before,
            nonce: self.nonce,
        }
        .eip712_signing_hash(domain)
    }
}

fn parse_address(raw: &str, role: &str) -> Result<Address, VerificationError> {
    raw.parse()
        .map_err(|e| VerificationError::InvalidSignature(format!("invalid {role} address {raw}: {e}")))
}

/// Rebuilds the EIP-712 domain of a network's token.
///
/// # Errors
///
/// Returns [`VerificationError::UnsupportedNetwork`] if the descriptor has no
/// numeric chain id or a malformed token address.
pub fn eip712_domain(network: &NetworkDescriptor) -> Result<Eip712Domain, VerificationError> {
    let unsupported = || VerificationError::UnsupportedNetwork(network.network_id.clone());
    let domain = &network.signature_domain;
    let chain_id = domain.numeric_chain_id().ok_or_else(unsupported)?;
    let verifying_contract: Address = domain
        .verifying_contract
        .parse()
        .map_err(|_| unsupported())?;
    Ok(Eip712Domain::new(
        Some(Cow::Owned(domain.name.clone())),
        Some(Cow::Owned(domain.version.clone())),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    ))
}

/// Parses a 65-byte `r || s || v` or 64-byte ERC-2098 compact signature.
///
/// # Errors
///
/// Returns [`VerificationError::InvalidSignature`] for any other length or
/// an unparsable 65-byte signature.
pub fn parse_signature(bytes: &[u8]) -> Result<Signature, VerificationError> {
    match bytes.len() {
        65 => Signature::from_raw(bytes)
            .map_err(|e| VerificationError::InvalidSignature(e.to_string())),
        64 => Ok(Signature::from_erc2098(bytes)),
        n => Err(VerificationError::InvalidSignature(format!(
            "expected a 64 or 65 byte signature, got {n} bytes"
        ))),
    }
}

/// ECDSA recovery of EOA signatures over `TransferWithAuthorization`.
///
/// Contract wallets (EIP-1271) cannot be verified off-chain and are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eip3009Verifier;

impl SignatureVerifier for Eip3009Verifier {
    fn verify_signature(
        &self,
        authorization: &PaymentAuthorization,
        network: &NetworkDescriptor,
    ) -> Result<(), VerificationError> {
        let payment = Eip3009Payment::from_authorization(authorization)?;
        let domain = eip712_domain(network)?;
        let hash = payment.signing_hash(&domain);
        let signature = parse_signature(&authorization.signature)?;
        let recovered = signature
            .recover_address_from_prehash(&hash)
            .map_err(|e| VerificationError::InvalidSignature(e.to_string()))?;
        if recovered == payment.from {
            Ok(())
        } else {
            Err(VerificationError::InvalidSignature(format!(
                "signature recovers to {recovered}, expected {}",
                payment.from
            )))
        }
    }

    fn same_account(&self, a: &str, b: &str) -> bool {
        match (a.parse::<Address>(), b.parse::<Address>()) {
            (Ok(a), Ok(b)) => a == b,
            _ => a.eq_ignore_ascii_case(b),
        }
    }

    fn check_lookup(&self, payer: &str, nonce: &[u8]) -> Result<(), InvalidLookup> {
        parse_address(payer, "payer").map_err(|e| InvalidLookup(e.to_string()))?;
        if nonce.len() != 32 {
            return Err(InvalidLookup(format!(
                "nonce must be 32 bytes, got {}",
                nonce.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networks::known_networks;
    use alloy_primitives::Bytes;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use payrail::timestamp::UnixTimestamp;

    fn base_sepolia() -> NetworkDescriptor {
        known_networks()
            .into_iter()
            .find(|n| n.descriptor.network_id.as_str() == "base-sepolia")
            .unwrap()
            .descriptor
    }

    fn sign(signer: &PrivateKeySigner, auth: &mut PaymentAuthorization, network: &NetworkDescriptor) {
        let payment = Eip3009Payment::from_authorization(auth).unwrap();
        let hash = payment.signing_hash(&eip712_domain(network).unwrap());
        let signature = signer.sign_hash_sync(&hash).unwrap();
        auth.signature = Bytes::from(signature.as_bytes().to_vec());
    }

    fn authorization(payer: Address) -> PaymentAuthorization {
        PaymentAuthorization {
            payer_address: payer.to_string(),
            payee_address: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".into(),
            value: 10_000u64.into(),
            valid_after: UnixTimestamp::from_secs(1_700_000_000),
            valid_before: UnixTimestamp::from_secs(1_700_000_300),
            nonce: Bytes::from(vec![0x11; 32]),
            signature: Bytes::new(),
        }
    }

    #[test]
    fn accepts_payer_signature() {
        let signer = PrivateKeySigner::random();
        let network = base_sepolia();
        let mut auth = authorization(signer.address());
        sign(&signer, &mut auth, &network);
        assert_eq!(Eip3009Verifier.verify_signature(&auth, &network), Ok(()));
    }

    #[test]
    fn accepts_compact_signature() {
        let signer = PrivateKeySigner::random();
        let network = base_sepolia();
        let mut auth = authorization(signer.address());
        sign(&signer, &mut auth, &network);
        let full = parse_signature(&auth.signature).unwrap();
        auth.signature = Bytes::from(full.as_erc2098().to_vec());
        assert_eq!(Eip3009Verifier.verify_signature(&auth, &network), Ok(()));
    }

    #[test]
    fn rejects_tampered_fields() {
        let signer = PrivateKeySigner::random();
        let network = base_sepolia();
        let mut signed = authorization(signer.address());
        sign(&signer, &mut signed, &network);

        let mut value = signed.clone();
        value.value = 10_001u64.into();
        let mut payee = signed.clone();
        payee.payee_address = "0x0000000000000000000000000000000000000001".into();
        let mut nonce = signed.clone();
        nonce.nonce = Bytes::from(vec![0x12; 32]);
        let mut window = signed;
        window.valid_before = UnixTimestamp::from_secs(1_700_000_301);

        for auth in [value, payee, nonce, window] {
            assert!(matches!(
                Eip3009Verifier.verify_signature(&auth, &network),
                Err(VerificationError::InvalidSignature(_))
            ));
        }
    }

    #[test]
    fn rejects_signature_from_other_domain() {
        let signer = PrivateKeySigner::random();
        let mainnet = known_networks()
            .into_iter()
            .find(|n| n.descriptor.network_id.as_str() == "base")
            .unwrap()
            .descriptor;
        let mut auth = authorization(signer.address());
        sign(&signer, &mut auth, &mainnet);
        assert!(Eip3009Verifier.verify_signature(&auth, &base_sepolia()).is_err());
    }

    #[test]
    fn rejects_short_nonce_and_bad_lengths() {
        let signer = PrivateKeySigner::random();
        let network = base_sepolia();
        let mut auth = authorization(signer.address());
        auth.nonce = Bytes::from(vec![1; 16]);
        assert!(Eip3009Verifier.verify_signature(&auth, &network).is_err());
        assert!(parse_signature(&[0u8; 10]).is_err());
    }

    #[test]
    fn same_account_ignores_checksum_case() {
        assert!(Eip3009Verifier.same_account(
            "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "0x209693bc6afc0c5328ba36faf03c514ef312287c"
        ));
        assert!(!Eip3009Verifier.same_account(
            "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "0x0000000000000000000000000000000000000001"
        ));
    }

    #[test]
    fn lookup_needs_an_address_and_a_32_byte_nonce() {
        let payer = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";
        assert_eq!(Eip3009Verifier.check_lookup(payer, &[7; 32]), Ok(()));
        assert!(Eip3009Verifier.check_lookup("not-an-address", &[7; 32]).is_err());
        assert!(Eip3009Verifier.check_lookup(payer, &[7; 31]).is_err());
    }
}
