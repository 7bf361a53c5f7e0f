//! The Solana payment: an SPL `TransferChecked` message signed by the payer
//! and co-signed by the facilitator, which pays the fee.
//!
//! On a Solana network the authorization's `nonce` carries the serialized
//! transaction message and its `signature` the payer's ed25519 signature
//! over those bytes. The message holds exactly three instructions:
//!
//! - index 0: `SetComputeUnitLimit`
//! - index 1: `SetComputeUnitPrice`
//! - index 2: `TransferChecked` (SPL Token or Token-2022)
//!
//! It requires exactly two signatures: the fee payer's (first account key)
//! and the payer's (second). The fee payer's ed25519 signature over the
//! message is deterministic, so the transaction id, and with it the on-chain
//! replay marker, is known before anything is broadcast.

use alloy_primitives::U256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use payrail::authorization::PaymentAuthorization;
use payrail::chain::ClientError;
use payrail::error::VerificationError;
use payrail::network::NetworkDescriptor;
use serde::{Deserialize, Serialize};
use solana_keypair::Keypair;
use solana_message::VersionedMessage;
use solana_message::compiled_instruction::CompiledInstruction;
use solana_pubkey::{Pubkey, pubkey};
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::instruction::TokenInstruction;
use std::str::FromStr;

/// Associated Token Account program.
pub const ATA_PROGRAM_ID: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

const TRANSFER_INSTRUCTION_INDEX: usize = 2;
const INSTRUCTION_COUNT: usize = 3;
const REQUIRED_SIGNATURES: u8 = 2;

/// Compute budget ceilings a payment message may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferLimits {
    /// Highest accepted `SetComputeUnitLimit`.
    pub max_compute_unit_limit: u32,
    /// Highest accepted `SetComputeUnitPrice`, in micro-lamports.
    pub max_compute_unit_price: u64,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            max_compute_unit_limit: 400_000,
            max_compute_unit_price: 1_000_000,
        }
    }
}

/// Why a payment message was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The bytes are not a transaction message.
    #[error("cannot decode transaction message: {0}")]
    Decoding(String),
    /// The bytes decode, but re-encode differently.
    #[error("transaction message is not canonically encoded")]
    NonCanonical,
    /// The message loads accounts from lookup tables.
    #[error("address lookup tables are not supported")]
    LookupTables,
    /// Wrong number of instructions.
    #[error("expected {INSTRUCTION_COUNT} instructions, found {0}")]
    InstructionCount(usize),
    /// The signer layout is not `[fee payer, payer]`.
    #[error("message must require exactly the fee payer and the transfer authority as signers")]
    SignerLayout,
    /// Instruction 0 is not `SetComputeUnitLimit`.
    #[error("invalid compute unit limit instruction")]
    InvalidComputeLimitInstruction,
    /// Instruction 1 is not `SetComputeUnitPrice`.
    #[error("invalid compute unit price instruction")]
    InvalidComputePriceInstruction,
    /// Requested compute units above the ceiling.
    #[error("compute unit limit {0} exceeds the facilitator maximum")]
    MaxComputeUnitLimitExceeded(u32),
    /// Requested compute unit price above the ceiling.
    #[error("compute unit price {0} exceeds the facilitator maximum")]
    MaxComputeUnitPriceExceeded(u64),
    /// Instruction 2 is not an SPL `TransferChecked`.
    #[error("invalid token transfer instruction")]
    InvalidTokenInstruction,
    /// An instruction references an account the message does not carry.
    #[error("no account at index {0}")]
    NoAccountAtIndex(u8),
    /// The message names another fee payer than this facilitator.
    #[error("fee payer {found} is not the facilitator fee payer {expected}")]
    FeePayerMismatch {
        /// Facilitator fee payer.
        expected: Pubkey,
        /// Fee payer named by the message.
        found: Pubkey,
    },
    /// The fee payer appears in an instruction.
    #[error("fee payer must not appear in instruction accounts")]
    FeePayerInInstructions,
    /// The transfer disagrees with the authorization.
    #[error("transfer {field} {found} does not match authorization {expected}")]
    Mismatch {
        /// Disagreeing field.
        field: &'static str,
        /// Value the authorization states.
        expected: String,
        /// Value the transfer carries.
        found: String,
    },
    /// An authorization address is not a public key.
    #[error("invalid {role} address {value}")]
    InvalidAddress {
        /// Which address.
        role: &'static str,
        /// Offending value.
        value: String,
    },
    /// The transaction could not be encoded for the node.
    #[error("cannot encode transaction: {0}")]
    Encoding(String),
}

impl From<TransferError> for VerificationError {
    fn from(value: TransferError) -> Self {
        Self::InvalidSignature(value.to_string())
    }
}

impl From<TransferError> for ClientError {
    fn from(value: TransferError) -> Self {
        Self::Rejected(value.to_string())
    }
}

/// Decoded `TransferChecked` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferChecked {
    /// Amount in base units.
    pub amount: u64,
    /// Mint decimals asserted by the instruction.
    pub decimals: u8,
    /// Source token account.
    pub source: Pubkey,
    /// Token mint.
    pub mint: Pubkey,
    /// Destination token account.
    pub destination: Pubkey,
    /// Owner of the source account, the payer.
    pub authority: Pubkey,
    /// SPL Token or Token-2022.
    pub token_program: Pubkey,
}

/// Associated token account of `owner` for `mint` under `token_program`.
#[must_use]
pub fn associated_token_account(owner: &Pubkey, token_program: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_ID,
    )
    .0
}

/// Parses a base58 public key.
///
/// # Errors
///
/// Returns [`TransferError::InvalidAddress`] if `value` is not one.
pub fn parse_pubkey(value: &str, role: &'static str) -> Result<Pubkey, TransferError> {
    Pubkey::from_str(value).map_err(|_| TransferError::InvalidAddress {
        role,
        value: value.to_owned(),
    })
}

/// A structurally valid payment message.
#[derive(Debug, Clone)]
pub struct PaymentMessage {
    bytes: Vec<u8>,
    message: VersionedMessage,
    fee_payer: Pubkey,
    transfer: TransferChecked,
}

impl PaymentMessage {
    /// Decodes and checks the layout of a serialized message.
    ///
    /// # Errors
    ///
    /// Returns a [`TransferError`] describing the first layout violation.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransferError> {
        let message: VersionedMessage =
            bincode::deserialize(bytes).map_err(|e| TransferError::Decoding(e.to_string()))?;
        let canonical =
            bincode::serialize(&message).map_err(|e| TransferError::Decoding(e.to_string()))?;
        if canonical != bytes {
            return Err(TransferError::NonCanonical);
        }
        if message
            .address_table_lookups()
            .is_some_and(|lookups| !lookups.is_empty())
        {
            return Err(TransferError::LookupTables);
        }
        let count = message.instructions().len();
        if count != INSTRUCTION_COUNT {
            return Err(TransferError::InstructionCount(count));
        }
        let keys = message.static_account_keys();
        if message.header().num_required_signatures != REQUIRED_SIGNATURES || keys.len() < 2 {
            return Err(TransferError::SignerLayout);
        }
        let fee_payer = keys[0];
        let transfer = parse_transfer_checked(&message)?;
        if transfer.authority != keys[1] {
            return Err(TransferError::SignerLayout);
        }
        Ok(Self {
            bytes: canonical,
            message,
            fee_payer,
            transfer,
        })
    }

    /// The transfer instruction.
    #[must_use]
    pub const fn transfer(&self) -> &TransferChecked {
        &self.transfer
    }

    /// The fee payer the message names.
    #[must_use]
    pub const fn fee_payer(&self) -> &Pubkey {
        &self.fee_payer
    }

    /// Checks the compute budget instructions against `limits`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransferError`] for a malformed or too generous budget.
    pub fn check_limits(&self, limits: &TransferLimits) -> Result<(), TransferError> {
        let units = compute_budget_arg::<4>(&self.message, 0, 2)
            .map(u32::from_le_bytes)
            .ok_or(TransferError::InvalidComputeLimitInstruction)?;
        if units > limits.max_compute_unit_limit {
            return Err(TransferError::MaxComputeUnitLimitExceeded(units));
        }
        let price = compute_budget_arg::<8>(&self.message, 1, 3)
            .map(u64::from_le_bytes)
            .ok_or(TransferError::InvalidComputePriceInstruction)?;
        if price > limits.max_compute_unit_price {
            return Err(TransferError::MaxComputeUnitPriceExceeded(price));
        }
        Ok(())
    }

    /// Checks that `fee_payer` pays the fee and nothing else.
    ///
    /// # Errors
    ///
    /// Returns a [`TransferError`] if the message names another fee payer or
    /// uses the fee payer in an instruction.
    pub fn check_fee_payer(&self, fee_payer: &Pubkey) -> Result<(), TransferError> {
        if self.fee_payer != *fee_payer {
            return Err(TransferError::FeePayerMismatch {
                expected: *fee_payer,
                found: self.fee_payer,
            });
        }
        let keys = self.message.static_account_keys();
        let in_instructions = self
            .message
            .instructions()
            .iter()
            .flat_map(|instruction| instruction.accounts.iter())
            .any(|&index| keys.get(usize::from(index)) == Some(fee_payer));
        if in_instructions {
            return Err(TransferError::FeePayerInInstructions);
        }
        Ok(())
    }

    /// Checks that the transfer moves exactly what `authorization` states on
    /// `network`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransferError`] naming the first disagreeing field.
    pub fn check_authorization(
        &self,
        authorization: &PaymentAuthorization,
        network: &NetworkDescriptor,
    ) -> Result<(), TransferError> {
        let transfer = &self.transfer;
        let payer = parse_pubkey(&authorization.payer_address, "payer")?;
        let payee = parse_pubkey(&authorization.payee_address, "payee")?;
        let mint = parse_pubkey(&network.signature_domain.verifying_contract, "mint")?;

        ensure_eq("authority", payer, transfer.authority)?;
        ensure_eq("mint", mint, transfer.mint)?;
        ensure_eq("decimals", network.token_decimals, transfer.decimals)?;
        let destination = associated_token_account(&payee, &transfer.token_program, &mint);
        ensure_eq("destination", destination, transfer.destination)?;
        let value = authorization.value.to_u256().unwrap_or(U256::ZERO);
        if value != U256::from(transfer.amount) {
            return Err(TransferError::Mismatch {
                field: "amount",
                expected: authorization.value.to_string(),
                found: transfer.amount.to_string(),
            });
        }
        Ok(())
    }

    /// The id the transaction gets once `fee_payer` signs it.
    #[must_use]
    pub fn transaction_id(&self, fee_payer: &Keypair) -> Signature {
        fee_payer.sign_message(&self.bytes)
    }

    /// Completes the transaction with the fee payer's signature.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::FeePayerMismatch`] if the message names
    /// another fee payer.
    pub fn co_sign(
        &self,
        fee_payer: &Keypair,
        payer_signature: Signature,
    ) -> Result<VersionedTransaction, TransferError> {
        let expected = fee_payer.pubkey();
        if self.fee_payer != expected {
            return Err(TransferError::FeePayerMismatch {
                expected,
                found: self.fee_payer,
            });
        }
        Ok(VersionedTransaction {
            signatures: vec![self.transaction_id(fee_payer), payer_signature],
            message: self.message.clone(),
        })
    }
}

fn ensure_eq<T: PartialEq + ToString>(field: &'static str, expected: T, found: T) -> Result<(), TransferError> {
    if expected == found {
        Ok(())
    } else {
        Err(TransferError::Mismatch {
            field,
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}

/// Base64 wire form of a transaction, as `sendTransaction` expects it.
///
/// # Errors
///
/// Returns [`TransferError::Encoding`] if serialization fails.
pub fn encode_transaction(transaction: &VersionedTransaction) -> Result<String, TransferError> {
    let bytes = bincode::serialize(transaction).map_err(|e| TransferError::Encoding(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

fn program_id<'a>(message: &'a VersionedMessage, instruction: &CompiledInstruction) -> Option<&'a Pubkey> {
    message
        .static_account_keys()
        .get(usize::from(instruction.program_id_index))
}

/// The `N` argument bytes of a compute budget instruction with `tag`.
fn compute_budget_arg<const N: usize>(
    message: &VersionedMessage,
    index: usize,
    tag: u8,
) -> Option<[u8; N]> {
    let instruction = message.instructions().get(index)?;
    if program_id(message, instruction) != Some(&solana_compute_budget_interface::ID) {
        return None;
    }
    match instruction.data.split_first() {
        Some((&first, rest)) if first == tag => rest.try_into().ok(),
        _ => None,
    }
}

fn parse_transfer_checked(message: &VersionedMessage) -> Result<TransferChecked, TransferError> {
    let instruction = message
        .instructions()
        .get(TRANSFER_INSTRUCTION_INDEX)
        .ok_or(TransferError::InvalidTokenInstruction)?;
    let token_program = match program_id(message, instruction) {
        Some(id) if *id == spl_token::ID => spl_token::ID,
        Some(id) if *id == spl_token_2022::ID => spl_token_2022::ID,
        _ => return Err(TransferError::InvalidTokenInstruction),
    };
    // Token-2022 shares the TransferChecked layout with SPL Token.
    let Ok(TokenInstruction::TransferChecked { amount, decimals }) =
        TokenInstruction::unpack(&instruction.data)
    else {
        return Err(TransferError::InvalidTokenInstruction);
    };
    let keys = message.static_account_keys();
    let account = |position: u8| {
        instruction
            .accounts
            .get(usize::from(position))
            .and_then(|&index| keys.get(usize::from(index)))
            .copied()
            .ok_or(TransferError::NoAccountAtIndex(position))
    };
    Ok(TransferChecked {
        amount,
        decimals,
        source: account(0)?,
        mint: account(1)?,
        destination: account(2)?,
        authority: account(3)?,
        token_program,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::networks::known_networks;
    use alloy_primitives::Bytes;
    use payrail::timestamp::UnixTimestamp;
    use solana_message::Hash;
    use solana_message::v0::Message as MessageV0;
    use solana_transaction::Instruction;

    pub(crate) fn devnet() -> NetworkDescriptor {
        known_networks().pop().unwrap().descriptor
    }

    pub(crate) fn mint(network: &NetworkDescriptor) -> Pubkey {
        Pubkey::from_str(&network.signature_domain.verifying_contract).unwrap()
    }

    fn compute_budget(tag: u8, arg: &[u8]) -> Instruction {
        let mut data = vec![tag];
        data.extend_from_slice(arg);
        Instruction::new_with_bytes(solana_compute_budget_interface::ID, &data, vec![])
    }

    /// A payment message as a wallet would build it.
    pub(crate) fn message_with(
        fee_payer: &Pubkey,
        payer: &Pubkey,
        payee: &Pubkey,
        mint: &Pubkey,
        amount: u64,
        extra: Vec<Instruction>,
    ) -> Vec<u8> {
        let token_program = spl_token::ID;
        let source = associated_token_account(payer, &token_program, mint);
        let destination = associated_token_account(payee, &token_program, mint);
        let mut instructions = vec![
            compute_budget(2, &50_000u32.to_le_bytes()),
            compute_budget(3, &1_000u64.to_le_bytes()),
            spl_token::instruction::transfer_checked(
                &token_program,
                &source,
                mint,
                &destination,
                payer,
                &[],
                amount,
                6,
            )
            .unwrap(),
        ];
        instructions.extend(extra);
        let message =
            MessageV0::try_compile(fee_payer, &instructions, &[], Hash::new_from_array([7; 32]))
                .unwrap();
        bincode::serialize(&VersionedMessage::V0(message)).unwrap()
    }

    /// A payer-signed authorization of `amount` to `payee`, fee paid by `fee_payer`.
    pub(crate) fn signed_authorization(
        payer: &Keypair,
        payee: &Pubkey,
        fee_payer: &Pubkey,
        network: &NetworkDescriptor,
        amount: u64,
    ) -> PaymentAuthorization {
        let message = message_with(fee_payer, &payer.pubkey(), payee, &mint(network), amount, vec![]);
        let signature = payer.sign_message(&message);
        let now = UnixTimestamp::now().as_secs();
        PaymentAuthorization {
            payer_address: payer.pubkey().to_string(),
            payee_address: payee.to_string(),
            value: amount.into(),
            valid_after: UnixTimestamp::from_secs(now - 60),
            valid_before: UnixTimestamp::from_secs(now + 60),
            nonce: Bytes::from(message),
            signature: Bytes::from(signature.as_ref().to_vec()),
        }
    }

    #[test]
    fn decodes_wallet_built_message() {
        let network = devnet();
        let (fee_payer, payer, payee) = (Keypair::new(), Keypair::new(), Pubkey::new_unique());
        let auth = signed_authorization(&payer, &payee, &fee_payer.pubkey(), &network, 10_000);

        let message = PaymentMessage::decode(&auth.nonce).unwrap();
        assert_eq!(message.fee_payer(), &fee_payer.pubkey());
        assert_eq!(message.transfer().amount, 10_000);
        assert_eq!(message.transfer().authority, payer.pubkey());
        assert_eq!(message.check_limits(&TransferLimits::default()), Ok(()));
        assert_eq!(message.check_fee_payer(&fee_payer.pubkey()), Ok(()));
        assert_eq!(message.check_authorization(&auth, &network), Ok(()));
    }

    #[test]
    fn transfer_must_match_authorization() {
        let network = devnet();
        let (fee_payer, payer, payee) = (Keypair::new(), Keypair::new(), Pubkey::new_unique());
        let auth = signed_authorization(&payer, &payee, &fee_payer.pubkey(), &network, 10_000);
        let message = PaymentMessage::decode(&auth.nonce).unwrap();

        let mut more = auth.clone();
        more.value = 10_001u64.into();
        let mut elsewhere = auth.clone();
        elsewhere.payee_address = Pubkey::new_unique().to_string();
        let mainnet = known_networks().remove(0).descriptor;

        let field = |result: Result<(), TransferError>| match result {
            Err(TransferError::Mismatch { field, .. }) => field,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(field(message.check_authorization(&more, &network)), "amount");
        assert_eq!(field(message.check_authorization(&elsewhere, &network)), "destination");
        assert_eq!(field(message.check_authorization(&auth, &mainnet)), "mint");
    }

    #[test]
    fn rejects_foreign_fee_payer_and_extra_instructions() {
        let network = devnet();
        let (fee_payer, payer, payee) = (Keypair::new(), Keypair::new(), Pubkey::new_unique());
        let auth = signed_authorization(&payer, &payee, &fee_payer.pubkey(), &network, 1);
        let message = PaymentMessage::decode(&auth.nonce).unwrap();
        assert!(matches!(
            message.check_fee_payer(&Pubkey::new_unique()),
            Err(TransferError::FeePayerMismatch { .. })
        ));

        let drain = Instruction::new_with_bytes(Pubkey::new_unique(), &[1], vec![]);
        let bytes = message_with(
            &fee_payer.pubkey(),
            &payer.pubkey(),
            &payee,
            &mint(&network),
            1,
            vec![drain],
        );
        assert_eq!(
            PaymentMessage::decode(&bytes).err(),
            Some(TransferError::InstructionCount(4))
        );
    }

    #[test]
    fn compute_budget_ceilings() {
        let network = devnet();
        let auth = signed_authorization(
            &Keypair::new(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &network,
            1,
        );
        let message = PaymentMessage::decode(&auth.nonce).unwrap();
        let tight = TransferLimits {
            max_compute_unit_limit: 10_000,
            ..TransferLimits::default()
        };
        assert_eq!(
            message.check_limits(&tight),
            Err(TransferError::MaxComputeUnitLimitExceeded(50_000))
        );
        let cheap = TransferLimits {
            max_compute_unit_price: 10,
            ..TransferLimits::default()
        };
        assert_eq!(
            message.check_limits(&cheap),
            Err(TransferError::MaxComputeUnitPriceExceeded(1_000))
        );
    }

    #[test]
    fn garbage_and_trailing_bytes_are_refused() {
        assert!(matches!(
            PaymentMessage::decode(&[0xff; 8]),
            Err(TransferError::Decoding(_) | TransferError::NonCanonical)
        ));

        let network = devnet();
        let auth = signed_authorization(
            &Keypair::new(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &network,
            1,
        );
        let mut bytes = auth.nonce.to_vec();
        bytes.push(0);
        assert_eq!(
            PaymentMessage::decode(&bytes).err(),
            Some(TransferError::NonCanonical)
        );
    }

    #[test]
    fn co_signed_transaction_is_complete() {
        let network = devnet();
        let (fee_payer, payer) = (Keypair::new(), Keypair::new());
        let auth =
            signed_authorization(&payer, &Pubkey::new_unique(), &fee_payer.pubkey(), &network, 5);
        let message = PaymentMessage::decode(&auth.nonce).unwrap();
        let payer_signature = Signature::try_from(auth.signature.as_ref()).unwrap();

        let transaction = message.co_sign(&fee_payer, payer_signature).unwrap();
        assert_eq!(transaction.signatures[0], message.transaction_id(&fee_payer));
        assert_eq!(transaction.signatures[1], payer_signature);
        assert!(
            transaction.signatures[0].verify(fee_payer.pubkey().as_ref(), &auth.nonce)
        );
        assert!(!encode_transaction(&transaction).unwrap().is_empty());

        assert!(matches!(
            message.co_sign(&Keypair::new(), payer_signature),
            Err(TransferError::FeePayerMismatch { .. })
        ));
    }
}
