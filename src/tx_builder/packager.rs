//! Transaction Packager
//!
//! Prepends the compute budget instruction, compiles a v0 message against the
//! block reference, and applies extra signers in their message slots. The fee
//! payer's slot is left as the default signature for the wallet to fill.
//! No network calls happen here.

use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    message::{v0::Message as MessageV0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};

use super::errors::BuilderError;
use super::pipeline::{AssembledOperation, InstructionKind};
use crate::types::BlockReference;

/// Required signers of a message: the first `num_required_signatures` static keys.
pub fn required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let keys = message.static_account_keys();
    let count = usize::from(message.header().num_required_signatures);
    &keys[..count.min(keys.len())]
}

/// A compiled transaction waiting for the remaining signatures.
#[derive(Debug, Clone)]
pub struct SignableTransaction {
    pub transaction: VersionedTransaction,
    pub fee_payer: Pubkey,
    pub block_reference: BlockReference,
}

impl SignableTransaction {
    pub fn required_signers(&self) -> &[Pubkey] {
        required_signers(&self.transaction.message)
    }

    /// Sign in `signer`'s slot. Fails if `signer` is not a required signer.
    pub fn sign_with(&mut self, signer: &dyn Signer) -> Result<(), BuilderError> {
        let key = signer.pubkey();
        let slot = self
            .required_signers()
            .iter()
            .position(|k| *k == key)
            .ok_or_else(|| {
                BuilderError::Internal(format!("{} is not a required signer", key))
            })?;
        let signature = signer
            .try_sign_message(&self.transaction.message.serialize())
            .map_err(|e| BuilderError::SigningRejected(e.to_string()))?;
        self.transaction.signatures[slot] = signature;
        Ok(())
    }

    /// Required signers whose slot still holds the default signature.
    pub fn missing_signers(&self) -> Vec<Pubkey> {
        self.required_signers()
            .iter()
            .zip(&self.transaction.signatures)
            .filter(|(_, sig)| **sig == Signature::default())
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn is_fully_signed(&self) -> bool {
        self.missing_signers().is_empty()
    }
}

/// Compile `instructions` behind a compute budget instruction and pre-sign
/// with `extra_signers`.
pub fn package_instructions(
    instructions: &[Instruction],
    fee_payer: &Pubkey,
    block_reference: &BlockReference,
    extra_signers: &[&Keypair],
    compute_unit_limit: u32,
) -> Result<SignableTransaction, BuilderError> {
    if instructions.is_empty() {
        return Err(BuilderError::invalid_order("Nothing to package"));
    }

    let mut all = Vec::with_capacity(instructions.len() + 1);
    all.push(ComputeBudgetInstruction::set_compute_unit_limit(
        compute_unit_limit,
    ));
    all.extend_from_slice(instructions);

    let message = MessageV0::try_compile(fee_payer, &all, &[], block_reference.blockhash)
        .map_err(|e| BuilderError::Internal(format!("Failed to compile message: {}", e)))?;
    let message = VersionedMessage::V0(message);
    let required = usize::from(message.header().num_required_signatures);

    let mut signable = SignableTransaction {
        transaction: VersionedTransaction {
            signatures: vec![Signature::default(); required],
            message,
        },
        fee_payer: *fee_payer,
        block_reference: *block_reference,
    };
    for signer in extra_signers {
        signable.sign_with(*signer)?;
    }

    tracing::debug!(
        instructions = all.len(),
        required_signers = required,
        pre_signed = extra_signers.len(),
        "Transaction packaged"
    );
    Ok(signable)
}

/// Package an assembled operation.
pub fn package(
    assembled: &AssembledOperation,
    fee_payer: &Pubkey,
    block_reference: &BlockReference,
    compute_unit_limit: u32,
) -> Result<SignableTransaction, BuilderError> {
    if assembled.instructions.kinds().contains(&InstructionKind::ComputeBudget) {
        return Err(BuilderError::invalid_order(
            "Assembled instructions already carry a compute budget instruction",
        ));
    }
    let instructions: Vec<Instruction> = assembled
        .instructions
        .entries()
        .iter()
        .map(|e| e.instruction.clone())
        .collect();
    let signers: Vec<&Keypair> = assembled.extra_signers.iter().collect();
    package_instructions(
        &instructions,
        fee_payer,
        block_reference,
        &signers,
        compute_unit_limit,
    )
}
