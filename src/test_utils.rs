//! Test Utilities Module
//!
//! In-memory stand-ins for the two injected collaborators: [`FakeLedger`]
//! implements [`CompressedStateClient`] with call counters and scripted
//! failures, [`RecordingWallet`] implements [`WalletSigner`] and keeps every
//! transaction it was asked to sign.
//!
//! Only compiled for tests or with the `test_utils` feature.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    account::Account,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_program,
    transaction::VersionedTransaction,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::addresses::{DEFAULT_NULLIFIER_QUEUE, DEFAULT_STATE_TREE};
use crate::state_client::{sort_balances, CompressedStateClient, StateClientError};
use crate::tx_builder::SignableTransaction;
use crate::types::{
    BlockReference, CompressedAccountInfo, CompressedProof, CompressedRecord,
    ConfirmationOutcome, RecordHash, SignatureInfo, TokenAccountInfo, TokenBalance,
    ValidityProof,
};
use crate::wallet::{SendOptions, WalletError, WalletSigner};

/// Failure a [`FakeLedger`] call can be scripted to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    RateLimited,
    Unreachable,
    ProofUnavailable,
    Expired,
    TransactionFailed,
}

impl ScriptedFailure {
    fn to_error(self) -> StateClientError {
        match self {
            Self::RateLimited => StateClientError::RateLimited {
                endpoint: "fake".into(),
            },
            Self::Unreachable => StateClientError::Unreachable {
                endpoint: "fake".into(),
                message: "connection refused".into(),
            },
            Self::ProofUnavailable => {
                StateClientError::ProofUnavailable("record already spent".into())
            }
            Self::Expired => StateClientError::Expired {
                last_valid_block_height: FakeLedger::LAST_VALID_BLOCK_HEIGHT,
            },
            Self::TransactionFailed => StateClientError::TransactionFailed {
                signature: "fake".into(),
                reason: "custom program error: 0x1".into(),
            },
        }
    }
}

#[derive(Default)]
struct LedgerState {
    records: Vec<CompressedRecord>,
    accounts: HashSet<Pubkey>,
    failing_accounts: HashSet<Pubkey>,
    token_accounts: Vec<TokenAccountInfo>,
    signatures: HashMap<Pubkey, Vec<SignatureInfo>>,
    compressed_accounts: HashMap<Pubkey, CompressedAccountInfo>,
    sent: Vec<VersionedTransaction>,
    calls: Vec<&'static str>,
    records_failure: Option<ScriptedFailure>,
    proof_failure: Option<ScriptedFailure>,
    send_failure: Option<ScriptedFailure>,
    confirm_failure: Option<ScriptedFailure>,
}

/// In-memory compressed state. Every trait call is logged by method name.
#[derive(Default)]
pub struct FakeLedger {
    state: Mutex<LedgerState>,
    next_leaf: AtomicU32,
}

impl FakeLedger {
    pub const SLOT: u64 = 1_000;
    pub const LAST_VALID_BLOCK_HEIGHT: u64 = 1_150;

    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `address` as an existing on-chain account.
    pub fn add_account(&self, address: Pubkey) {
        self.state.lock().accounts.insert(address);
    }

    /// Make `get_account(address)` fail with a transport error.
    pub fn fail_account_fetch(&self, address: Pubkey) {
        self.state.lock().failing_accounts.insert(address);
    }

    /// Add one live record per amount, in the default tree.
    pub fn add_records(&self, owner: Pubkey, mint: Pubkey, amounts: &[u64]) -> Vec<CompressedRecord> {
        let created: Vec<CompressedRecord> = amounts
            .iter()
            .map(|amount| {
                let leaf = self.next_leaf.fetch_add(1, Ordering::SeqCst);
                let mut hash = [0xABu8; 32];
                hash[..4].copy_from_slice(&leaf.to_le_bytes());
                CompressedRecord {
                    hash: RecordHash(hash),
                    owner,
                    mint,
                    amount: *amount,
                    delegate: None,
                    lamports: 0,
                    merkle_tree: DEFAULT_STATE_TREE,
                    nullifier_queue: DEFAULT_NULLIFIER_QUEUE,
                    leaf_index: leaf,
                }
            })
            .collect();
        self.state.lock().records.extend(created.iter().cloned());
        created
    }

    /// Remove a record, as if it had been consumed by another transaction.
    pub fn spend(&self, hash: &RecordHash) {
        self.state.lock().records.retain(|r| r.hash != *hash);
    }

    pub fn add_token_account(&self, info: TokenAccountInfo) {
        self.state.lock().token_accounts.push(info);
    }

    pub fn add_signature(&self, address: Pubkey, info: SignatureInfo) {
        self.state.lock().signatures.entry(address).or_default().push(info);
    }

    pub fn add_compressed_account(&self, address: Pubkey, info: CompressedAccountInfo) {
        self.state.lock().compressed_accounts.insert(address, info);
    }

    pub fn fail_records(&self, failure: ScriptedFailure) {
        self.state.lock().records_failure = Some(failure);
    }

    pub fn fail_proof(&self, failure: ScriptedFailure) {
        self.state.lock().proof_failure = Some(failure);
    }

    pub fn fail_send(&self, failure: ScriptedFailure) {
        self.state.lock().send_failure = Some(failure);
    }

    pub fn fail_confirm(&self, failure: ScriptedFailure) {
        self.state.lock().confirm_failure = Some(failure);
    }

    /// Method names of every trait call so far, in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state.lock().calls.iter().filter(|m| **m == method).count()
    }

    pub fn proof_calls(&self) -> usize {
        self.call_count("getValidityProof")
    }

    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.state.lock().sent.clone()
    }

    /// The block reference every `get_latest_block_reference` returns.
    pub fn block_reference(&self) -> BlockReference {
        BlockReference {
            slot: Self::SLOT,
            blockhash: Hash::new_from_array([7u8; 32]),
            last_valid_block_height: Self::LAST_VALID_BLOCK_HEIGHT,
        }
    }

    pub fn rent_for(data_len: usize) -> u64 {
        (data_len as u64 + 128) * 6_960
    }

    fn log(&self, method: &'static str) {
        self.state.lock().calls.push(method);
    }
}

#[async_trait]
impl CompressedStateClient for FakeLedger {
    async fn get_records_by_owner(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Vec<CompressedRecord>, StateClientError> {
        self.log("getCompressedTokenAccountsByOwner");
        let state = self.state.lock();
        if let Some(failure) = state.records_failure {
            return Err(failure.to_error());
        }
        Ok(state
            .records
            .iter()
            .filter(|r| r.owner == *owner && r.mint == *mint)
            .cloned()
            .collect())
    }

    async fn get_validity_proof(
        &self,
        hashes: &[RecordHash],
    ) -> Result<ValidityProof, StateClientError> {
        self.log("getValidityProof");
        let state = self.state.lock();
        if let Some(failure) = state.proof_failure {
            return Err(failure.to_error());
        }
        if let Some(stale) = hashes
            .iter()
            .find(|h| !state.records.iter().any(|r| r.hash == **h))
        {
            return Err(StateClientError::ProofUnavailable(format!(
                "record {} is not live",
                stale
            )));
        }
        Ok(ValidityProof {
            compressed_proof: Some(CompressedProof {
                a: [1; 32],
                b: [2; 64],
                c: [3; 32],
            }),
            root_indices: (0..hashes.len() as u16).collect(),
            hashes: hashes.to_vec(),
        })
    }

    async fn get_latest_block_reference(&self) -> Result<BlockReference, StateClientError> {
        self.log("getLatestBlockhash");
        Ok(self.block_reference())
    }

    async fn confirm(
        &self,
        signature: &Signature,
        block: &BlockReference,
    ) -> Result<ConfirmationOutcome, StateClientError> {
        self.log("confirmTransaction");
        if let Some(failure) = self.state.lock().confirm_failure {
            return Err(failure.to_error());
        }
        Ok(ConfirmationOutcome {
            signature: *signature,
            slot: block.slot + 1,
            confirmations: Some(1),
        })
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, StateClientError> {
        self.log("getAccountInfo");
        let state = self.state.lock();
        if state.failing_accounts.contains(address) {
            return Err(ScriptedFailure::Unreachable.to_error());
        }
        Ok(state.accounts.contains(address).then(|| Account {
            lamports: Self::rent_for(165),
            data: vec![0; 165],
            owner: system_program::id(),
            executable: false,
            rent_epoch: 0,
        }))
    }

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> Result<u64, StateClientError> {
        self.log("getMinimumBalanceForRentExemption");
        Ok(Self::rent_for(data_len))
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        _min_context_slot: u64,
    ) -> Result<Signature, StateClientError> {
        self.log("sendTransaction");
        let mut state = self.state.lock();
        if let Some(failure) = state.send_failure {
            return Err(failure.to_error());
        }
        state.sent.push(transaction.clone());
        Ok(transaction.signatures.first().copied().unwrap_or_default())
    }

    async fn get_compressed_token_balances_by_owner(
        &self,
        owner: &Pubkey,
        mint: Option<&Pubkey>,
    ) -> Result<Vec<TokenBalance>, StateClientError> {
        self.log("getCompressedTokenBalancesByOwner");
        let state = self.state.lock();
        let mut totals: HashMap<Pubkey, u64> = HashMap::new();
        for record in state
            .records
            .iter()
            .filter(|r| r.owner == *owner && mint.map_or(true, |m| r.mint == *m))
        {
            *totals.entry(record.mint).or_default() += record.amount;
        }
        let mut balances: Vec<TokenBalance> = totals
            .into_iter()
            .map(|(mint, balance)| TokenBalance { mint, balance })
            .collect();
        sort_balances(&mut balances);
        Ok(balances)
    }

    async fn get_token_accounts(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<TokenAccountInfo>, StateClientError> {
        self.log("getTokenAccounts");
        Ok(self
            .state
            .lock()
            .token_accounts
            .iter()
            .filter(|a| a.owner == *owner)
            .cloned()
            .collect())
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
    ) -> Result<Vec<SignatureInfo>, StateClientError> {
        self.log("getSignaturesForAddress");
        Ok(self
            .state
            .lock()
            .signatures
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_compressed_account(
        &self,
        address: &Pubkey,
    ) -> Result<Option<CompressedAccountInfo>, StateClientError> {
        self.log("getCompressedAccount");
        Ok(self.state.lock().compressed_accounts.get(address).cloned())
    }
}

/// Wallet that signs with a local keypair and keeps what it signed instead
/// of submitting it.
pub struct RecordingWallet {
    keypair: Option<Keypair>,
    reject: AtomicBool,
    signed: Mutex<Vec<SignableTransaction>>,
    options: Mutex<Vec<SendOptions>>,
}

impl RecordingWallet {
    pub fn new() -> Self {
        Self {
            keypair: Some(Keypair::new()),
            reject: AtomicBool::new(false),
            signed: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    /// A wallet with no connected key.
    pub fn disconnected() -> Self {
        Self {
            keypair: None,
            ..Self::new()
        }
    }

    pub fn reject_signing(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }

    pub fn signed(&self) -> Vec<SignableTransaction> {
        self.signed.lock().clone()
    }

    pub fn send_options(&self) -> Vec<SendOptions> {
        self.options.lock().clone()
    }
}

impl Default for RecordingWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletSigner for RecordingWallet {
    fn public_key(&self) -> Option<Pubkey> {
        self.keypair.as_ref().map(|k| k.pubkey())
    }

    async fn sign_and_send(
        &self,
        mut transaction: SignableTransaction,
        options: SendOptions,
    ) -> Result<Signature, WalletError> {
        let keypair = self.keypair.as_ref().ok_or(WalletError::NotConnected)?;
        if self.reject.load(Ordering::SeqCst) {
            return Err(WalletError::Rejected("User rejected the request".into()));
        }
        transaction
            .sign_with(keypair)
            .map_err(|e| WalletError::Rejected(e.to_string()))?;
        let signature = transaction.transaction.signatures[0];
        self.signed.lock().push(transaction);
        self.options.lock().push(options);
        Ok(signature)
    }
}
