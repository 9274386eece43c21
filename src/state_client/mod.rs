//! Compressed State Client
//!
//! The only I/O boundary of the builder. [`CompressedStateClient`] is passed
//! explicitly into resolvers, assemblers and the service, so tests substitute
//! an in-memory ledger without touching process-wide state.
//!
//! ## Components
//!
//! - `errors`: [`StateClientError`] and the [`RetryPolicy`] used for 429s
//! - `wire`: typed JSON-RPC payloads validated at the boundary
//! - `photon`: [`PhotonClient`], the HTTP implementation

pub mod errors;
pub mod photon;
pub mod wire;

pub use errors::{RetryPolicy, StateClientError};
pub use photon::{PhotonClient, PhotonClientConfig, DEFAULT_MAX_RECORD_PAGES};

use async_trait::async_trait;
use solana_sdk::{
    account::Account, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction,
};

use crate::types::{
    BlockReference, CompressedAccountInfo, CompressedRecord, ConfirmationOutcome, RecordHash,
    SignatureInfo, TokenAccountInfo, TokenBalance, ValidityProof,
};

#[async_trait]
pub trait CompressedStateClient: Send + Sync {
    /// All live compressed records of `owner` for `mint`. Empty is a valid answer.
    async fn get_records_by_owner(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Vec<CompressedRecord>, StateClientError>;

    /// Proof over `hashes` in the given order. Fails with
    /// [`StateClientError::ProofUnavailable`] if any hash is not live.
    async fn get_validity_proof(
        &self,
        hashes: &[RecordHash],
    ) -> Result<ValidityProof, StateClientError>;

    async fn get_latest_block_reference(&self) -> Result<BlockReference, StateClientError>;

    /// Wait until `signature` reaches the configured commitment.
    async fn confirm(
        &self,
        signature: &Signature,
        block: &BlockReference,
    ) -> Result<ConfirmationOutcome, StateClientError>;

    /// Raw account fetch. `Ok(None)` means the account does not exist.
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, StateClientError>;

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> Result<u64, StateClientError>;

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        min_context_slot: u64,
    ) -> Result<Signature, StateClientError>;

    /// Balances sorted by balance descending, then mint ascending.
    async fn get_compressed_token_balances_by_owner(
        &self,
        owner: &Pubkey,
        mint: Option<&Pubkey>,
    ) -> Result<Vec<TokenBalance>, StateClientError>;

    async fn get_token_accounts(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<TokenAccountInfo>, StateClientError>;

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
    ) -> Result<Vec<SignatureInfo>, StateClientError>;

    async fn get_compressed_account(
        &self,
        address: &Pubkey,
    ) -> Result<Option<CompressedAccountInfo>, StateClientError>;
}

/// Sort balances by balance descending, then mint ascending.
pub fn sort_balances(balances: &mut [TokenBalance]) {
    balances.sort_by(|a, b| {
        b.balance
            .cmp(&a.balance)
            .then_with(|| a.mint.to_string().cmp(&b.mint.to_string()))
    });
}
