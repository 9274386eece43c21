//! Compressed Token Transaction Builder
//!
//! Turns a user operation into a signable transaction without submitting it.
//!
//! ## Architecture
//!
//! - **errors**: [`BuilderError`], the taxonomy callers branch on
//! - **instructions**: encoders for the compressed token program
//! - **pipeline**: step recording, labelled instruction sequences and the
//!   ordering checks every assembler runs before returning
//! - **assembler**: [`InstructionAssembler`] and the shared select-then-prove step
//! - **create_mint**, **transfer**, **compression**: one assembler per operation
//! - **packager**: compute budget, v0 message compilation, extra signers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use compressed_token_builder::tx_builder::{
//!     package, BuilderSettings, InstructionAssembler, TransferRequest,
//! };
//! use compressed_token_builder::state_client::CompressedStateClient;
//! use solana_sdk::pubkey::Pubkey;
//!
//! # async fn example(client: &dyn CompressedStateClient, owner: Pubkey, mint: Pubkey)
//! # -> Result<(), compressed_token_builder::tx_builder::BuilderError> {
//! let settings = BuilderSettings::default();
//! let assembler = InstructionAssembler::new(client, &settings);
//! let request = TransferRequest { mint, recipient: Pubkey::new_unique(), amount: 500 };
//! let assembled = assembler.transfer(&owner, &request).await?;
//!
//! let block = client.get_latest_block_reference().await?;
//! let signable = package(&assembled, &owner, &block, settings.compute_unit_limit)?;
//! // hand `signable` to the wallet
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod compression;
pub mod create_mint;
pub mod errors;
pub mod instructions;
pub mod packager;
pub mod pipeline;
pub mod transfer;

pub use assembler::{BuilderSettings, InstructionAssembler};
pub use compression::{CompressAndReclaimRequest, CompressRequest, DecompressRequest};
pub use create_mint::CreateMintRequest;
pub use errors::BuilderError;
pub use packager::{package, package_instructions, SignableTransaction};
pub use pipeline::{
    validate_order, AccountRole, AssembledOperation, InstructionKind, InstructionSequence,
    Operation, OperationTrace, PipelineStep, StepRecord,
};
pub use transfer::{MintToRequest, TransferRequest};
