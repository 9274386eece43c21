//! HTTP JSON-RPC implementation of [`CompressedStateClient`]
//!
//! One endpoint serves both the standard node methods and the compression
//! indexer methods. Requests pass a client-side `governor` rate limiter; HTTP
//! 429 responses are retried with exponential backoff through `tokio-retry`
//! and surface as [`StateClientError::RateLimited`] once the budget is spent.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use solana_account_decoder::UiAccount;
use solana_rpc_client_api::{
    config::RpcSendTransactionConfig,
    response::{Response, RpcBlockhash, RpcConfirmedTransactionStatusWithSignature},
};
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey,
    signature::Signature, transaction::VersionedTransaction,
};
use solana_transaction_status::{TransactionStatus, UiTransactionEncoding};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use super::errors::{RetryPolicy, StateClientError};
use super::wire::{
    self, CompressedAccountWire, JsonRpcError, JsonRpcRequest, JsonRpcResponse, TokenAccountList,
    TokenAccountsPage, TokenBalanceList, ValidityProofWire,
};
use super::{sort_balances, CompressedStateClient};
use crate::metrics::metrics;
use crate::types::{
    BlockReference, CompressedAccountInfo, CompressedRecord, ConfirmationOutcome, RecordHash,
    SignatureInfo, StateTreeInfo, TokenAccountInfo, TokenBalance, ValidityProof,
};

/// Page size for `getCompressedTokenAccountsByOwner`
const RECORDS_PAGE_LIMIT: u64 = 1000;
/// Default cap on pages fetched for one owner and mint
pub const DEFAULT_MAX_RECORD_PAGES: usize = 64;

#[derive(Debug, Clone)]
pub struct PhotonClientConfig {
    pub endpoint: String,
    pub request_timeout: Duration,
    pub rate_limit_rps: u32,
    pub retry: RetryPolicy,
    pub commitment: CommitmentConfig,
    pub confirm_timeout: Duration,
    pub confirm_poll_interval: Duration,
    /// Record listings needing more pages than this fail instead of truncating
    pub max_record_pages: usize,
    /// Trees whose nullifier queue the indexer may omit
    pub state_trees: Vec<StateTreeInfo>,
}

impl PhotonClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: Duration::from_secs(30),
            rate_limit_rps: 10,
            retry: RetryPolicy::default(),
            commitment: CommitmentConfig::confirmed(),
            confirm_timeout: Duration::from_secs(60),
            confirm_poll_interval: Duration::from_millis(500),
            max_record_pages: DEFAULT_MAX_RECORD_PAGES,
            state_trees: vec![StateTreeInfo::default()],
        }
    }
}

pub struct PhotonClient {
    http: reqwest::Client,
    config: PhotonClientConfig,
    limiter: DefaultDirectRateLimiter,
    next_id: AtomicU64,
}

impl PhotonClient {
    pub fn new(config: PhotonClientConfig) -> Result<Self, StateClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StateClientError::Unreachable {
                endpoint: config.endpoint.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;
        let rps = NonZeroU32::new(config.rate_limit_rps).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            http,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Send one request, retrying while the endpoint answers 429
    async fn call<P, T>(&self, method: &str, params: P) -> Result<T, StateClientError>
    where
        P: Serialize + Send + Sync,
        T: DeserializeOwned,
    {
        RetryIf::spawn(
            self.config.retry.delays(),
            || self.call_once(method, &params),
            |err: &StateClientError| {
                let retry = err.is_retryable();
                if retry {
                    warn!(method = %method, endpoint = %self.config.endpoint, "Rate limited, backing off");
                }
                retry
            },
        )
        .await
    }

    async fn call_once<P, T>(&self, method: &str, params: &P) -> Result<T, StateClientError>
    where
        P: Serialize + Send + Sync,
        T: DeserializeOwned,
    {
        self.limiter.until_ready().await;
        metrics().rpc_requests.with_label_values(&[method]).inc();
        let started = Instant::now();

        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method = %method, endpoint = %self.config.endpoint, "RPC request");

        let sent = self.http.post(&self.config.endpoint).json(&body).send().await;
        metrics()
            .rpc_latency
            .observe(started.elapsed().as_secs_f64());
        let response = sent.map_err(|e| self.transport_error(method, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            metrics().rate_limited.inc();
            return Err(StateClientError::RateLimited {
                endpoint: self.config.endpoint.clone(),
            });
        }
        if !status.is_success() {
            return Err(StateClientError::Transport {
                endpoint: self.config.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let envelope: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| StateClientError::decode(method, e.to_string()))?;

        if let Some(error) = envelope.error {
            return Err(rpc_error(method, error));
        }
        envelope
            .result
            .ok_or_else(|| StateClientError::decode(method, "response has neither result nor error"))
    }

    fn transport_error(&self, method: &str, err: reqwest::Error) -> StateClientError {
        if err.is_timeout() {
            StateClientError::Timeout {
                operation: method.to_string(),
                timeout_ms: self.config.request_timeout.as_millis() as u64,
            }
        } else {
            StateClientError::Unreachable {
                endpoint: self.config.endpoint.clone(),
                message: err.to_string(),
            }
        }
    }

    fn commitment_param(&self) -> serde_json::Value {
        json!({ "commitment": self.config.commitment.commitment })
    }

    async fn poll_confirmation(
        &self,
        signature: &Signature,
        block: &BlockReference,
    ) -> Result<ConfirmationOutcome, StateClientError> {
        loop {
            let statuses: Response<Vec<Option<TransactionStatus>>> = self
                .call(
                    "getSignatureStatuses",
                    json!([[signature.to_string()], { "searchTransactionHistory": false }]),
                )
                .await?;

            if let Some(Some(status)) = statuses.value.into_iter().next() {
                if let Some(err) = status.err.as_ref() {
                    return Err(StateClientError::TransactionFailed {
                        signature: signature.to_string(),
                        reason: err.to_string(),
                    });
                }
                if status.satisfies_commitment(self.config.commitment) {
                    return Ok(ConfirmationOutcome {
                        signature: *signature,
                        slot: status.slot,
                        confirmations: status.confirmations,
                    });
                }
            }

            let height: u64 = self
                .call("getBlockHeight", json!([self.commitment_param()]))
                .await?;
            if height > block.last_valid_block_height {
                return Err(StateClientError::Expired {
                    last_valid_block_height: block.last_valid_block_height,
                });
            }

            tokio::time::sleep(self.config.confirm_poll_interval).await;
        }
    }
}

fn rpc_error(method: &str, error: JsonRpcError) -> StateClientError {
    // The indexer only refuses a proof when some hash is not provable.
    if method == "getValidityProof" {
        return StateClientError::ProofUnavailable(error.message);
    }
    StateClientError::Rpc {
        method: method.to_string(),
        code: error.code,
        message: error.message,
    }
}

#[async_trait]
impl CompressedStateClient for PhotonClient {
    async fn get_records_by_owner(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<Vec<CompressedRecord>, StateClientError> {
        const METHOD: &str = "getCompressedTokenAccountsByOwner";
        let mut records = Vec::new();
        let mut frozen = 0usize;
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if pages == self.config.max_record_pages {
                warn!(owner = %owner, mint = %mint, pages, "Record listing exceeded page cap");
                return Err(StateClientError::decode(
                    METHOD,
                    format!("more than {} pages of records", self.config.max_record_pages),
                ));
            }
            pages += 1;

            let page: Response<TokenAccountList> = self
                .call(
                    METHOD,
                    json!({
                        "owner": owner.to_string(),
                        "mint": mint.to_string(),
                        "cursor": cursor,
                        "limit": RECORDS_PAGE_LIMIT,
                    }),
                )
                .await?;
            let list = page.value;
            let exhausted = list.items.is_empty();
            for item in list.items {
                // Frozen records cannot be spent
                if item.is_frozen() {
                    frozen += 1;
                    continue;
                }
                records.push(item.into_record(&self.config.state_trees)?);
            }
            match list.cursor {
                Some(next) if !exhausted => {
                    if cursor.as_deref() == Some(next.as_str()) {
                        return Err(StateClientError::decode(
                            METHOD,
                            format!("indexer repeated cursor '{}'", next),
                        ));
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        debug!(
            owner = %owner,
            mint = %mint,
            count = records.len(),
            frozen,
            pages,
            "Fetched compressed records"
        );
        Ok(records)
    }

    async fn get_validity_proof(
        &self,
        hashes: &[RecordHash],
    ) -> Result<ValidityProof, StateClientError> {
        if hashes.is_empty() {
            return Ok(ValidityProof {
                compressed_proof: None,
                root_indices: Vec::new(),
                hashes: Vec::new(),
            });
        }
        let encoded: Vec<String> = hashes.iter().map(RecordHash::to_base58).collect();
        let response: Response<ValidityProofWire> = self
            .call(
                "getValidityProof",
                json!({ "hashes": encoded, "newAddressesWithTrees": [] }),
            )
            .await?;
        response.value.into_proof(hashes)
    }

    async fn get_latest_block_reference(&self) -> Result<BlockReference, StateClientError> {
        const METHOD: &str = "getLatestBlockhash";
        let response: Response<RpcBlockhash> =
            self.call(METHOD, json!([self.commitment_param()])).await?;
        let blockhash = Hash::from_str(&response.value.blockhash)
            .map_err(|e| StateClientError::decode(METHOD, e.to_string()))?;
        Ok(BlockReference {
            slot: response.context.slot,
            blockhash,
            last_valid_block_height: response.value.last_valid_block_height,
        })
    }

    async fn confirm(
        &self,
        signature: &Signature,
        block: &BlockReference,
    ) -> Result<ConfirmationOutcome, StateClientError> {
        let timeout = self.config.confirm_timeout;
        tokio::time::timeout(timeout, self.poll_confirmation(signature, block))
            .await
            .map_err(|_| StateClientError::Timeout {
                operation: "confirmTransaction".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, StateClientError> {
        const METHOD: &str = "getAccountInfo";
        let response: Response<Option<UiAccount>> = self
            .call(
                METHOD,
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": self.config.commitment.commitment }
                ]),
            )
            .await?;
        match response.value {
            None => Ok(None),
            Some(ui) => ui
                .decode::<Account>()
                .map(Some)
                .ok_or_else(|| StateClientError::decode(METHOD, "account data is not base64")),
        }
    }

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> Result<u64, StateClientError> {
        self.call("getMinimumBalanceForRentExemption", json!([data_len]))
            .await
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        min_context_slot: u64,
    ) -> Result<Signature, StateClientError> {
        const METHOD: &str = "sendTransaction";
        let bytes = bincode::serialize(transaction)
            .map_err(|e| StateClientError::decode(METHOD, format!("serialize: {}", e)))?;
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(self.config.commitment.commitment),
            encoding: Some(UiTransactionEncoding::Base64),
            max_retries: None,
            min_context_slot: Some(min_context_slot),
        };
        let signature: String = self
            .call(METHOD, json!([STANDARD.encode(bytes), config]))
            .await?;
        Signature::from_str(&signature).map_err(|e| StateClientError::decode(METHOD, e.to_string()))
    }

    async fn get_compressed_token_balances_by_owner(
        &self,
        owner: &Pubkey,
        mint: Option<&Pubkey>,
    ) -> Result<Vec<TokenBalance>, StateClientError> {
        let response: Response<TokenBalanceList> = self
            .call(
                "getCompressedTokenBalancesByOwner",
                json!({
                    "owner": owner.to_string(),
                    "mint": mint.map(|m| m.to_string()),
                }),
            )
            .await?;
        let mut balances = response
            .value
            .token_balances
            .into_iter()
            .map(wire::TokenBalanceWire::into_balance)
            .collect::<Result<Vec<_>, _>>()?;
        sort_balances(&mut balances);
        Ok(balances)
    }

    async fn get_token_accounts(
        &self,
        owner: &Pubkey,
    ) -> Result<Vec<TokenAccountInfo>, StateClientError> {
        let page: TokenAccountsPage = self
            .call(
                "getTokenAccounts",
                json!({
                    "owner": owner.to_string(),
                    "page": 1,
                    "limit": 100,
                    "displayOptions": { "showZeroBalance": true },
                }),
            )
            .await?;
        debug!(owner = %owner, total = page.total, "Fetched token accounts");
        page.token_accounts
            .into_iter()
            .map(wire::TokenAccountWire::into_info)
            .collect()
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
    ) -> Result<Vec<SignatureInfo>, StateClientError> {
        let statuses: Vec<RpcConfirmedTransactionStatusWithSignature> = self
            .call("getSignaturesForAddress", json!([address.to_string()]))
            .await?;
        statuses.into_iter().map(wire::signature_info).collect()
    }

    async fn get_compressed_account(
        &self,
        address: &Pubkey,
    ) -> Result<Option<CompressedAccountInfo>, StateClientError> {
        let response: Response<Option<CompressedAccountWire>> = self
            .call("getCompressedAccount", json!({ "address": address.to_string() }))
            .await?;
        response.value.map(CompressedAccountWire::into_info).transpose()
    }
}
