//! Shared assembler state and the select-then-prove step used by every
//! operation that consumes compressed records.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use super::errors::BuilderError;
use super::pipeline::{AssembledOperation, PipelineStep};
use crate::addresses::DEFAULT_STATE_TREE;
use crate::metrics::metrics;
use crate::resolver::AccountExistenceResolver;
use crate::selection::{select_for_amount, sort_records_for_selection, SelectionResult};
use crate::state_client::CompressedStateClient;
use crate::types::{pubkey_string, ValidityProof};

/// Static parameters of instruction assembly and packaging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderSettings {
    /// Tree receiving outputs that have no input tree to follow
    #[serde(with = "pubkey_string", default = "default_output_state_tree")]
    pub output_state_tree: Pubkey,

    /// Units requested by the compute budget instruction at position 0
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,

    #[serde(default = "default_decimals")]
    pub default_decimals: u8,

    /// Token program for conventional accounts and pools
    #[serde(with = "pubkey_string", default = "default_token_program")]
    pub token_program: Pubkey,

    /// Fail compress-and-reclaim when the account to close is confirmed absent
    #[serde(default)]
    pub guard_reclaim_close: bool,
}

fn default_output_state_tree() -> Pubkey { DEFAULT_STATE_TREE }
fn default_compute_unit_limit() -> u32 { 1_000_000 }
fn default_decimals() -> u8 { 9 }
fn default_token_program() -> Pubkey { spl_token::id() }

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            output_state_tree: default_output_state_tree(),
            compute_unit_limit: default_compute_unit_limit(),
            default_decimals: default_decimals(),
            token_program: default_token_program(),
            guard_reclaim_close: false,
        }
    }
}

/// Builds instruction sequences. Holds no mutable state; one instance can
/// serve any number of concurrent operations.
#[derive(Clone, Copy)]
pub struct InstructionAssembler<'a> {
    pub(crate) client: &'a dyn CompressedStateClient,
    pub(crate) settings: &'a BuilderSettings,
}

impl<'a> InstructionAssembler<'a> {
    pub fn new(client: &'a dyn CompressedStateClient, settings: &'a BuilderSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &BuilderSettings {
        self.settings
    }

    pub(crate) fn resolver(&self) -> AccountExistenceResolver<'a> {
        AccountExistenceResolver::new(self.client)
    }

    /// Fetch records, select a cover for `amount`, then prove the selection.
    ///
    /// Selection failure returns before any proof request is made.
    pub(crate) async fn select_and_prove(
        &self,
        assembled: &mut AssembledOperation,
        owner: &Pubkey,
        mint: &Pubkey,
        amount: u64,
    ) -> Result<(SelectionResult, ValidityProof), BuilderError> {
        let records = self.client.get_records_by_owner(owner, mint).await?;
        assembled.trace.record(
            PipelineStep::FetchRecords,
            format!("{} records for mint {}", records.len(), mint),
        );
        self.prove_selection(assembled, records, amount).await
    }

    /// Select from already-fetched `records` and prove the selection.
    pub(crate) async fn prove_selection(
        &self,
        assembled: &mut AssembledOperation,
        records: Vec<crate::types::CompressedRecord>,
        amount: u64,
    ) -> Result<(SelectionResult, ValidityProof), BuilderError> {
        let records = sort_records_for_selection(records);
        let selection = select_for_amount(&records, amount)?;
        assembled.trace.record(
            PipelineStep::SelectInputs,
            format!(
                "{} of {} records, change {}",
                selection.selected.len(),
                records.len(),
                selection.change_amount
            ),
        );
        metrics()
            .selected_inputs
            .observe(selection.selected.len() as f64);

        let hashes = selection.hashes();
        let proof = self.client.get_validity_proof(&hashes).await?;
        metrics().proofs_fetched.inc();
        assembled.trace.record(
            PipelineStep::FetchProof,
            format!("{} hashes", hashes.len()),
        );
        Ok((selection, proof))
    }
}
