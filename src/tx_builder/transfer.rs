//! Mint To and Transfer assemblers

use solana_sdk::pubkey::Pubkey;

use super::assembler::InstructionAssembler;
use super::errors::BuilderError;
use super::instructions::{self, TokenTransferOutput, TransferParams};
use super::pipeline::{AssembledOperation, InstructionKind, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintToRequest {
    pub mint: Pubkey,
    pub recipient: Pubkey,
    pub amount: u64,
    /// Mint authority; the fee payer when unset
    pub authority: Option<Pubkey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub mint: Pubkey,
    pub recipient: Pubkey,
    pub amount: u64,
}

impl<'a> InstructionAssembler<'a> {
    /// Mint new compressed tokens to one recipient. The pool must exist.
    pub async fn mint_to(
        &self,
        fee_payer: &Pubkey,
        request: &MintToRequest,
    ) -> Result<AssembledOperation, BuilderError> {
        if request.amount == 0 {
            return Err(BuilderError::zero_amount("mint_to"));
        }
        let mut assembled = AssembledOperation::new(Operation::MintTo);
        let authority = request.authority.unwrap_or(*fee_payer);

        assembled.emit(
            InstructionKind::MintTo,
            instructions::mint_to(
                fee_payer,
                &authority,
                &request.mint,
                &self.settings.output_state_tree,
                &[(request.recipient, request.amount)],
                &self.settings.token_program,
            )?,
        );
        assembled.finish()
    }

    /// Move compressed tokens from `owner` to the recipient.
    ///
    /// Outputs stay in the tree of the first selected input: the recipient
    /// output first, then change back to the owner when positive.
    pub async fn transfer(
        &self,
        owner: &Pubkey,
        request: &TransferRequest,
    ) -> Result<AssembledOperation, BuilderError> {
        if request.amount == 0 {
            return Err(BuilderError::zero_amount("transfer"));
        }
        let mut assembled = AssembledOperation::new(Operation::Transfer);
        let (selection, proof) = self
            .select_and_prove(&mut assembled, owner, &request.mint, request.amount)
            .await?;

        let first = selection
            .selected
            .first()
            .ok_or_else(|| BuilderError::Internal("selection returned no inputs".into()))?;
        let mut outputs = vec![TokenTransferOutput {
            owner: request.recipient,
            amount: request.amount,
            merkle_tree: first.merkle_tree,
        }];
        outputs.extend(instructions::change_output(
            &selection.selected,
            request.amount,
            owner,
        )?);

        let ix = instructions::transfer(TransferParams {
            fee_payer: *owner,
            authority: *owner,
            mint: request.mint,
            inputs: &selection.selected,
            proof: Some(&proof),
            outputs,
            compression: None,
        })?;
        assembled.emit(InstructionKind::Transfer, ix);
        assembled.selection = Some(selection);
        assembled.finish()
    }
}
