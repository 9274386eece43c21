//! Compress, Decompress and rent reclaim assemblers
//!
//! These are the operations that touch a conventional token account, so each
//! one resolves account existence before deciding on setup instructions. The
//! pool and source checks of compress are independent reads and run
//! concurrently.

use solana_sdk::pubkey::Pubkey;
use tracing::warn;

use super::assembler::InstructionAssembler;
use super::errors::BuilderError;
use super::instructions::{self, Compression, TokenTransferOutput, TransferParams};
use super::pipeline::{AccountRole, AssembledOperation, InstructionKind, Operation, PipelineStep};
use crate::addresses::{associated_token_address, pool_address};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressRequest {
    pub mint: Pubkey,
    pub amount: u64,
    /// Owner of the compressed output; the owner itself when unset
    pub recipient: Option<Pubkey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecompressRequest {
    pub mint: Pubkey,
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressAndReclaimRequest {
    pub mint: Pubkey,
    /// Zero skips straight to the close
    pub amount: u64,
}

fn describe(found: bool) -> &'static str {
    if found {
        "exists"
    } else {
        "absent"
    }
}

impl<'a> InstructionAssembler<'a> {
    /// Move `amount` from the owner's associated token account into a new
    /// compressed record.
    pub async fn compress(
        &self,
        owner: &Pubkey,
        request: &CompressRequest,
    ) -> Result<AssembledOperation, BuilderError> {
        if request.amount == 0 {
            return Err(BuilderError::zero_amount("compress"));
        }
        let mut assembled = AssembledOperation::new(Operation::Compress);
        self.emit_compress(&mut assembled, owner, request).await?;
        assembled.finish()
    }

    async fn emit_compress(
        &self,
        assembled: &mut AssembledOperation,
        owner: &Pubkey,
        request: &CompressRequest,
    ) -> Result<(), BuilderError> {
        let token_program = self.settings.token_program;
        let pool = pool_address(&request.mint);
        let source = associated_token_address(owner, &request.mint, &token_program);

        let found = self.resolver().exists_many(&[pool, source]).await;
        let (pool_exists, source_exists) = (found[0], found[1]);
        assembled.trace.record(
            PipelineStep::ResolveExistence(AccountRole::TokenPool),
            format!("pool {} {}", pool, describe(pool_exists)),
        );
        assembled.trace.record(
            PipelineStep::ResolveExistence(AccountRole::SourceTokenAccount),
            format!("source {} {}", source, describe(source_exists)),
        );

        if !source_exists {
            return Err(BuilderError::SourceAccountMissing { address: source });
        }
        if !pool_exists {
            assembled.emit(
                InstructionKind::CreateTokenPool,
                instructions::create_token_pool(owner, &request.mint, &token_program),
            );
        }

        let ix = instructions::transfer(TransferParams {
            fee_payer: *owner,
            authority: *owner,
            mint: request.mint,
            inputs: &[],
            proof: None,
            outputs: vec![TokenTransferOutput {
                owner: request.recipient.unwrap_or(*owner),
                amount: request.amount,
                merkle_tree: self.settings.output_state_tree,
            }],
            compression: Some(Compression::Compress {
                amount: request.amount,
                source,
                token_program,
            }),
        })?;
        assembled.emit(InstructionKind::Compress, ix);
        Ok(())
    }

    /// Move `amount` of compressed balance out to the owner's associated
    /// token account, creating that account first when it is absent.
    pub async fn decompress(
        &self,
        owner: &Pubkey,
        request: &DecompressRequest,
    ) -> Result<AssembledOperation, BuilderError> {
        if request.amount == 0 {
            return Err(BuilderError::zero_amount("decompress"));
        }
        let mut assembled = AssembledOperation::new(Operation::Decompress);
        let token_program = self.settings.token_program;
        let destination = associated_token_address(owner, &request.mint, &token_program);

        let resolver = self.resolver();
        let (destination_exists, records) = futures::join!(
            resolver.exists(&destination),
            self.client.get_records_by_owner(owner, &request.mint)
        );
        assembled.trace.record(
            PipelineStep::ResolveExistence(AccountRole::DestinationTokenAccount),
            format!("destination {} {}", destination, describe(destination_exists)),
        );
        let records = records?;
        assembled.trace.record(
            PipelineStep::FetchRecords,
            format!("{} records for mint {}", records.len(), request.mint),
        );

        if !destination_exists {
            assembled.emit(
                InstructionKind::CreateAssociatedAccount,
                spl_associated_token_account::instruction::create_associated_token_account(
                    owner,
                    owner,
                    &request.mint,
                    &token_program,
                ),
            );
        }

        let (selection, proof) = self
            .prove_selection(&mut assembled, records, request.amount)
            .await?;
        let outputs = instructions::change_output(&selection.selected, request.amount, owner)?
            .into_iter()
            .collect();

        let ix = instructions::transfer(TransferParams {
            fee_payer: *owner,
            authority: *owner,
            mint: request.mint,
            inputs: &selection.selected,
            proof: Some(&proof),
            outputs,
            compression: Some(Compression::Decompress {
                amount: request.amount,
                destination,
                token_program,
            }),
        })?;
        assembled.emit(InstructionKind::Decompress, ix);
        assembled.selection = Some(selection);
        assembled.finish()
    }

    /// Close the owner's associated token account, rent back to the owner.
    pub async fn reclaim_rent(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<AssembledOperation, BuilderError> {
        let mut assembled = AssembledOperation::new(Operation::ReclaimRent);
        let account = associated_token_address(owner, mint, &self.settings.token_program);
        self.emit_close(&mut assembled, owner, &account)?;
        assembled.finish()
    }

    /// Compress what remains, then close the emptied account.
    ///
    /// The closing account is always checked before the close is emitted. A
    /// confirmed-absent account is logged and closed anyway unless
    /// `guard_reclaim_close` is set, in which case the operation fails.
    pub async fn compress_and_reclaim(
        &self,
        owner: &Pubkey,
        request: &CompressAndReclaimRequest,
    ) -> Result<AssembledOperation, BuilderError> {
        let mut assembled = AssembledOperation::new(Operation::CompressAndReclaim);
        let account =
            associated_token_address(owner, &request.mint, &self.settings.token_program);

        if request.amount > 0 {
            let compress = CompressRequest {
                mint: request.mint,
                amount: request.amount,
                recipient: None,
            };
            self.emit_compress(&mut assembled, owner, &compress).await?;
        }

        let account_exists = self.resolver().exists(&account).await;
        assembled.trace.record(
            PipelineStep::ResolveExistence(AccountRole::ClosingTokenAccount),
            format!("closing {} {}", account, describe(account_exists)),
        );
        if !account_exists {
            if self.settings.guard_reclaim_close {
                return Err(BuilderError::SourceAccountMissing { address: account });
            }
            warn!(
                account = %account,
                mint = %request.mint,
                "Closing an account that was not found"
            );
        }

        self.emit_close(&mut assembled, owner, &account)?;
        assembled.finish()
    }

    fn emit_close(
        &self,
        assembled: &mut AssembledOperation,
        owner: &Pubkey,
        account: &Pubkey,
    ) -> Result<(), BuilderError> {
        let token_program = self.settings.token_program;
        let ix = if token_program == spl_token_2022::id() {
            spl_token_2022::instruction::close_account(&token_program, account, owner, owner, &[])
                .map_err(|e| BuilderError::instruction_failed("spl-token-2022", e.to_string()))?
        } else {
            spl_token::instruction::close_account(&token_program, account, owner, owner, &[])
                .map_err(|e| BuilderError::instruction_failed("spl-token", e.to_string()))?
        };
        assembled.emit(InstructionKind::CloseAccount, ix);
        Ok(())
    }
}
