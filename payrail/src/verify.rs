//! The Verification Engine: stateless checks of a [`PaymentAuthorization`].
//!
//! Pure computation; no chain access. Balance and nonce usage are the
//! Settlement Engine's concern.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::authorization::{PaymentAuthorization, VerificationResult};
use crate::error::{InvalidLookup, VerificationError};
use crate::network::{ChainFamily, NetworkDescriptor, NetworkId, NetworkRegistry};
use crate::timestamp::{Clock, SystemClock};

/// Family-specific signature scheme.
pub trait SignatureVerifier: Send + Sync {
    /// Checks that the signature of `authorization` was produced by its payer
    /// under the signing domain of `network`.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError::InvalidSignature`] otherwise.
    fn verify_signature(
        &self,
        authorization: &PaymentAuthorization,
        network: &NetworkDescriptor,
    ) -> Result<(), VerificationError>;

    /// Whether two addresses denote the same account.
    fn same_account(&self, a: &str, b: &str) -> bool {
        a == b
    }

    /// Checks that `payer` and `nonce` are well-formed for a nonce state lookup.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLookup`] naming the malformed part.
    fn check_lookup(&self, payer: &str, nonce: &[u8]) -> Result<(), InvalidLookup> {
        let _ = (payer, nonce);
        Ok(())
    }
}

/// Runs the verification checks in a fixed order; the first failure wins.
///
/// 1. `valid_after <= now <= valid_before`
/// 2. `value > 0`
/// 3. signature recovers to the payer
/// 4. payer differs from payee
pub struct VerificationEngine {
    registry: Arc<NetworkRegistry>,
    verifiers: HashMap<ChainFamily, Arc<dyn SignatureVerifier>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationEngine")
            .field("networks", &self.registry.len())
            .field("families", &self.verifiers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl VerificationEngine {
    /// Creates an engine using the system clock and no signature schemes.
    #[must_use]
    pub fn new(registry: Arc<NetworkRegistry>) -> Self {
        Self {
            registry,
            verifiers: HashMap::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Registers the signature scheme of a chain family.
    #[must_use]
    pub fn with_verifier(mut self, family: ChainFamily, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifiers.insert(family, verifier);
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The registry verified against.
    #[must_use]
    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    /// Checks a nonce state lookup with the signature scheme of `network`.
    /// Networks outside the registry are left to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLookup`] if the family rejects `payer` or `nonce`.
    pub fn check_lookup(
        &self,
        network: &NetworkId,
        payer: &str,
        nonce: &[u8],
    ) -> Result<(), InvalidLookup> {
        match self
            .registry
            .get(network)
            .and_then(|descriptor| self.verifiers.get(&descriptor.chain_family))
        {
            Some(verifier) => verifier.check_lookup(payer, nonce),
            None => Ok(()),
        }
    }

    /// Verifies `authorization` for `network`.
    #[must_use]
    pub fn verify(
        &self,
        authorization: &PaymentAuthorization,
        network: &NetworkId,
    ) -> VerificationResult {
        self.check(authorization, network).into()
    }

    /// Like [`Self::verify`], as a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn check(
        &self,
        authorization: &PaymentAuthorization,
        network: &NetworkId,
    ) -> Result<(), VerificationError> {
        let descriptor = self
            .registry
            .get(network)
            .ok_or_else(|| VerificationError::UnsupportedNetwork(network.clone()))?;
        let verifier = self
            .verifiers
            .get(&descriptor.chain_family)
            .ok_or_else(|| VerificationError::UnsupportedNetwork(network.clone()))?;

        let now = self.clock.now();
        if now > authorization.valid_before {
            return Err(VerificationError::Expired);
        }
        if now < authorization.valid_after {
            return Err(VerificationError::NotYetValid);
        }
        if !authorization.value.is_positive() {
            return Err(VerificationError::ZeroOrNegativeValue);
        }
        verifier.verify_signature(authorization, descriptor)?;
        if verifier.same_account(&authorization.payer_address, &authorization.payee_address) {
            return Err(VerificationError::SelfPayment);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::TokenAmount;
    use crate::testing::{DigestVerifier, digest_signature, test_network};
    use crate::timestamp::{FixedClock, UnixTimestamp};
    use alloy_primitives::Bytes;

    const NOW: u64 = 1_700_000_000;

    fn engine_at(now: u64) -> VerificationEngine {
        let registry = NetworkRegistry::from_descriptors([test_network("testnet-1").descriptor]);
        VerificationEngine::new(Arc::new(registry))
            .with_verifier(ChainFamily::Evm, Arc::new(DigestVerifier))
            .with_clock(Arc::new(FixedClock(UnixTimestamp::from_secs(now))))
    }

    fn signed(mut auth: PaymentAuthorization) -> PaymentAuthorization {
        auth.signature = digest_signature(&auth, &"testnet-1".into());
        auth
    }

    fn authorization() -> PaymentAuthorization {
        signed(PaymentAuthorization {
            payer_address: "0x00000000000000000000000000000000000000Aa".into(),
            payee_address: "0x00000000000000000000000000000000000000bb".into(),
            value: 10_000u64.into(),
            valid_after: UnixTimestamp::from_secs(NOW - 60),
            valid_before: UnixTimestamp::from_secs(NOW + 300),
            nonce: Bytes::from(vec![7; 32]),
            signature: Bytes::new(),
        })
    }

    fn check_at(now: u64, auth: &PaymentAuthorization) -> Result<(), VerificationError> {
        engine_at(now).check(auth, &"testnet-1".into())
    }

    #[test]
    fn valid_inside_window_including_bounds() {
        let auth = authorization();
        assert_eq!(check_at(NOW, &auth), Ok(()));
        assert_eq!(check_at(NOW - 60, &auth), Ok(()));
        assert_eq!(check_at(NOW + 300, &auth), Ok(()));
        assert!(engine_at(NOW).verify(&auth, &"testnet-1".into()).valid);
    }

    #[test]
    fn expired_right_after_valid_before() {
        assert_eq!(
            check_at(NOW + 301, &authorization()),
            Err(VerificationError::Expired)
        );
    }

    #[test]
    fn not_yet_valid_before_valid_after() {
        assert_eq!(
            check_at(NOW - 61, &authorization()),
            Err(VerificationError::NotYetValid)
        );
    }

    #[test]
    fn zero_and_negative_values_rejected_even_when_signed() {
        let mut auth = authorization();
        auth.value = TokenAmount::ZERO;
        let auth = signed(auth);
        assert_eq!(check_at(NOW, &auth), Err(VerificationError::ZeroOrNegativeValue));

        let mut auth = authorization();
        auth.value = "-5".parse().unwrap();
        let auth = signed(auth);
        assert_eq!(check_at(NOW, &auth), Err(VerificationError::ZeroOrNegativeValue));
    }

    #[test]
    fn tampered_fields_break_the_signature() {
        let mut value = authorization();
        value.value = 10_001u64.into();
        let mut payee = authorization();
        payee.payee_address = "0x00000000000000000000000000000000000000cc".into();
        let mut nonce = authorization();
        nonce.nonce = Bytes::from(vec![8; 32]);

        for auth in [value, payee, nonce] {
            assert!(matches!(
                check_at(NOW, &auth),
                Err(VerificationError::InvalidSignature(_))
            ));
        }
    }

    #[test]
    fn self_payment_detected_case_insensitively() {
        let mut auth = authorization();
        auth.payee_address = auth.payer_address.to_lowercase();
        let auth = signed(auth);
        assert_eq!(check_at(NOW, &auth), Err(VerificationError::SelfPayment));
    }

    #[test]
    fn checks_run_in_order() {
        // expired and zero-valued and unsigned: expiry is reported
        let mut auth = authorization();
        auth.value = TokenAmount::ZERO;
        auth.signature = Bytes::new();
        assert_eq!(check_at(NOW + 1_000, &auth), Err(VerificationError::Expired));
    }

    #[test]
    fn unknown_network() {
        let result = engine_at(NOW).verify(&authorization(), &"nope".into());
        assert!(!result.valid);
        assert_eq!(
            result.reason,
            Some(VerificationError::UnsupportedNetwork("nope".into()))
        );
    }

    #[test]
    fn lookup_defaults_to_accepting_and_skips_unknown_networks() {
        let engine = engine_at(NOW);
        assert_eq!(
            engine.check_lookup(&"testnet-1".into(), "anyone", &[1, 2, 3]),
            Ok(())
        );
        assert_eq!(engine.check_lookup(&"nope".into(), "", &[]), Ok(()));
    }
}
