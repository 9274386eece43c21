//! Create Mint assembler
//!
//! Without metadata: create-account, initialize-mint, create-pool, then a
//! zero-amount mint-to the creator. A new mint can never already have a pool,
//! so the pool is always created here.
//!
//! With metadata the mint lives in Token-2022: create-account,
//! initialize-metadata-pointer, initialize-mint, initialize-metadata, then one
//! update-field per additional entry.

#[allow(deprecated)]
use solana_sdk::system_instruction;
use solana_sdk::{
    program_pack::Pack,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use spl_token_2022::extension::ExtensionType;
use spl_token_metadata_interface::state::{Field, TokenMetadata};

use super::assembler::InstructionAssembler;
use super::errors::BuilderError;
use super::instructions;
use super::pipeline::{AssembledOperation, InstructionKind, Operation, PipelineStep};
use crate::types::MintMetadata;

#[derive(Debug, Clone, Default)]
pub struct CreateMintRequest {
    /// Mint and freeze authority; the creator when unset
    pub authority: Option<Pubkey>,
    /// Uses the configured default when unset
    pub decimals: Option<u8>,
    pub metadata: Option<MintMetadata>,
}

fn spl_error(program: &str, err: impl std::fmt::Display) -> BuilderError {
    BuilderError::instruction_failed(program, err.to_string())
}

impl<'a> InstructionAssembler<'a> {
    /// Assemble mint creation with a freshly generated mint keypair.
    pub async fn create_mint(
        &self,
        creator: &Pubkey,
        request: &CreateMintRequest,
    ) -> Result<AssembledOperation, BuilderError> {
        let mut assembled = AssembledOperation::new(Operation::CreateMint);
        let mint_keypair = Keypair::new();
        assembled.trace.record(
            PipelineStep::GenerateKeypair,
            format!("mint {}", mint_keypair.pubkey()),
        );
        self.assemble_create_mint(assembled, creator, request, mint_keypair)
            .await
    }

    async fn assemble_create_mint(
        &self,
        mut assembled: AssembledOperation,
        creator: &Pubkey,
        request: &CreateMintRequest,
        mint_keypair: Keypair,
    ) -> Result<AssembledOperation, BuilderError> {
        let mint = mint_keypair.pubkey();
        let authority = request.authority.unwrap_or(*creator);
        let decimals = request.decimals.unwrap_or(self.settings.default_decimals);

        match &request.metadata {
            None => {
                self.emit_plain_mint(&mut assembled, creator, &mint, &authority, decimals)
                    .await?
            }
            Some(metadata) => {
                self.emit_metadata_mint(&mut assembled, creator, &mint, &authority, decimals, metadata)
                    .await?
            }
        }

        assembled.extra_signers.push(mint_keypair);
        assembled.finish()
    }

    async fn emit_plain_mint(
        &self,
        assembled: &mut AssembledOperation,
        creator: &Pubkey,
        mint: &Pubkey,
        authority: &Pubkey,
        decimals: u8,
    ) -> Result<(), BuilderError> {
        let token_program = self.settings.token_program;
        let space = spl_token::state::Mint::LEN;
        let rent = self
            .client
            .get_minimum_balance_for_rent_exemption(space)
            .await?;
        assembled
            .trace
            .record(PipelineStep::FetchRent, format!("{} bytes = {} lamports", space, rent));

        assembled.emit(
            InstructionKind::CreateMintAccount,
            system_instruction::create_account(creator, mint, rent, space as u64, &token_program),
        );

        let init = if token_program == spl_token_2022::id() {
            spl_token_2022::instruction::initialize_mint2(
                &token_program,
                mint,
                authority,
                Some(authority),
                decimals,
            )
            .map_err(|e| spl_error("spl-token-2022", e))?
        } else {
            spl_token::instruction::initialize_mint2(
                &token_program,
                mint,
                authority,
                Some(authority),
                decimals,
            )
            .map_err(|e| spl_error("spl-token", e))?
        };
        assembled.emit(InstructionKind::InitializeMint, init);

        assembled.emit(
            InstructionKind::CreateTokenPool,
            instructions::create_token_pool(creator, mint, &token_program),
        );

        assembled.emit(
            InstructionKind::MintTo,
            instructions::mint_to(
                creator,
                authority,
                mint,
                &self.settings.output_state_tree,
                &[(*creator, 0)],
                &token_program,
            )?,
        );
        Ok(())
    }

    async fn emit_metadata_mint(
        &self,
        assembled: &mut AssembledOperation,
        creator: &Pubkey,
        mint: &Pubkey,
        authority: &Pubkey,
        decimals: u8,
        metadata: &MintMetadata,
    ) -> Result<(), BuilderError> {
        let token_program = spl_token_2022::id();
        let mint_len = ExtensionType::try_calculate_account_len::<spl_token_2022::state::Mint>(&[
            ExtensionType::MetadataPointer,
        ])
        .map_err(|e| spl_error("spl-token-2022", e))?;

        let token_metadata = TokenMetadata {
            mint: *mint,
            name: metadata.name.clone(),
            symbol: metadata.symbol.clone(),
            uri: metadata.uri.clone(),
            additional_metadata: metadata.additional.clone(),
            ..Default::default()
        };
        let metadata_len = token_metadata
            .tlv_size_of()
            .map_err(|e| spl_error("spl-token-metadata", e))?;

        // The account is allocated for the mint only; the metadata
        // instructions reallocate, so rent must already cover both.
        let rent = self
            .client
            .get_minimum_balance_for_rent_exemption(mint_len + metadata_len)
            .await?;
        assembled.trace.record(
            PipelineStep::FetchRent,
            format!("{} + {} bytes = {} lamports", mint_len, metadata_len, rent),
        );

        assembled.emit(
            InstructionKind::CreateMintAccount,
            system_instruction::create_account(creator, mint, rent, mint_len as u64, &token_program),
        );

        assembled.emit(
            InstructionKind::InitializeMetadataPointer,
            spl_token_2022::extension::metadata_pointer::instruction::initialize(
                &token_program,
                mint,
                Some(*authority),
                Some(*mint),
            )
            .map_err(|e| spl_error("spl-token-2022", e))?,
        );

        assembled.emit(
            InstructionKind::InitializeMint,
            spl_token_2022::instruction::initialize_mint(
                &token_program,
                mint,
                authority,
                Some(authority),
                decimals,
            )
            .map_err(|e| spl_error("spl-token-2022", e))?,
        );

        assembled.emit(
            InstructionKind::InitializeMetadata,
            spl_token_metadata_interface::instruction::initialize(
                &token_program,
                mint,
                authority,
                mint,
                authority,
                metadata.name.clone(),
                metadata.symbol.clone(),
                metadata.uri.clone(),
            ),
        );

        for (key, value) in &metadata.additional {
            assembled.emit(
                InstructionKind::UpdateMetadataField,
                spl_token_metadata_interface::instruction::update_field(
                    &token_program,
                    mint,
                    authority,
                    Field::Key(key.clone()),
                    value.clone(),
                ),
            );
        }
        Ok(())
    }
}
