//! Typed JSON-RPC payloads
//!
//! Every response is deserialized into one of these structs and converted
//! into a domain type before it leaves the state client. Conversion failures
//! become [`StateClientError::Decode`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::str::FromStr;

use super::errors::StateClientError;
use crate::types::{
    CompressedAccountInfo, CompressedProof, CompressedRecord, RecordHash, SignatureInfo,
    StateTreeInfo, TokenAccountInfo, TokenBalance, ValidityProof,
};

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a, P: Serialize> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: P,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Integers that indexers emit either as JSON numbers or as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireU64 {
    Number(u64),
    Text(String),
}

impl WireU64 {
    pub fn value(&self, method: &str) -> Result<u64, StateClientError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s
                .parse()
                .map_err(|_| StateClientError::decode(method, format!("'{}' is not a u64", s))),
        }
    }
}

pub fn parse_pubkey(method: &str, field: &str, value: &str) -> Result<Pubkey, StateClientError> {
    Pubkey::from_str(value)
        .map_err(|e| StateClientError::decode(method, format!("{}: invalid pubkey '{}': {}", field, value, e)))
}

pub fn parse_hash(method: &str, value: &str) -> Result<RecordHash, StateClientError> {
    RecordHash::from_str(value).map_err(|e| StateClientError::decode(method, e))
}

// getCompressedTokenAccountsByOwner

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAccountList {
    pub items: Vec<TokenAccountItem>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAccountItem {
    pub account: CompressedAccountWire,
    pub token_data: TokenDataWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedAccountWire {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub data: Option<AccountDataWire>,
    pub hash: String,
    pub lamports: WireU64,
    pub leaf_index: u32,
    pub owner: String,
    pub tree: String,
    /// Newer indexers report the queue directly.
    #[serde(default)]
    pub queue: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDataWire {
    pub data: String,
    #[serde(default)]
    pub data_hash: Option<String>,
    pub discriminator: WireU64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDataWire {
    pub mint: String,
    pub owner: String,
    pub amount: WireU64,
    #[serde(default)]
    pub delegate: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl TokenAccountItem {
    pub fn is_frozen(&self) -> bool {
        self.token_data.state.as_deref() == Some("frozen")
    }

    /// Convert to a domain record, resolving the nullifier queue from
    /// `known_trees` when the indexer does not report it.
    pub fn into_record(
        self,
        known_trees: &[StateTreeInfo],
    ) -> Result<CompressedRecord, StateClientError> {
        const METHOD: &str = "getCompressedTokenAccountsByOwner";
        let merkle_tree = parse_pubkey(METHOD, "tree", &self.account.tree)?;
        let nullifier_queue = match &self.account.queue {
            Some(queue) => parse_pubkey(METHOD, "queue", queue)?,
            None => known_trees
                .iter()
                .find(|info| info.tree == merkle_tree)
                .map(|info| info.queue)
                .ok_or_else(|| {
                    StateClientError::decode(
                        METHOD,
                        format!("no nullifier queue known for state tree {}", merkle_tree),
                    )
                })?,
        };
        let delegate = self
            .token_data
            .delegate
            .as_deref()
            .map(|d| parse_pubkey(METHOD, "delegate", d))
            .transpose()?;

        Ok(CompressedRecord {
            hash: parse_hash(METHOD, &self.account.hash)?,
            owner: parse_pubkey(METHOD, "owner", &self.token_data.owner)?,
            mint: parse_pubkey(METHOD, "mint", &self.token_data.mint)?,
            amount: self.token_data.amount.value(METHOD)?,
            delegate,
            lamports: self.account.lamports.value(METHOD)?,
            merkle_tree,
            nullifier_queue,
            leaf_index: self.account.leaf_index,
        })
    }
}

impl CompressedAccountWire {
    pub fn into_info(self) -> Result<CompressedAccountInfo, StateClientError> {
        const METHOD: &str = "getCompressedAccount";
        let address = self
            .address
            .as_deref()
            .map(|a| parse_pubkey(METHOD, "address", a))
            .transpose()?;
        let (discriminator, data) = match self.data {
            Some(d) => {
                let bytes = STANDARD
                    .decode(d.data.as_bytes())
                    .map_err(|e| StateClientError::decode(METHOD, format!("data: {}", e)))?;
                (Some(d.discriminator.value(METHOD)?), bytes)
            }
            None => (None, Vec::new()),
        };

        Ok(CompressedAccountInfo {
            hash: parse_hash(METHOD, &self.hash)?,
            address,
            owner: parse_pubkey(METHOD, "owner", &self.owner)?,
            lamports: self.lamports.value(METHOD)?,
            merkle_tree: parse_pubkey(METHOD, "tree", &self.tree)?,
            leaf_index: self.leaf_index,
            discriminator,
            data,
        })
    }
}

// getValidityProof

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityProofWire {
    #[serde(default)]
    pub compressed_proof: Option<CompressedProofWire>,
    #[serde(default)]
    pub roots: Vec<String>,
    pub root_indices: Vec<u64>,
    #[serde(default)]
    pub leaf_indices: Vec<u64>,
    #[serde(default)]
    pub leaves: Vec<String>,
    #[serde(default)]
    pub merkle_trees: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompressedProofWire {
    pub a: Vec<u8>,
    pub b: Vec<u8>,
    pub c: Vec<u8>,
}

impl CompressedProofWire {
    fn into_proof(self) -> Result<CompressedProof, StateClientError> {
        const METHOD: &str = "getValidityProof";
        let wrong = |part: &str, len: usize| {
            StateClientError::decode(METHOD, format!("proof.{} has {} bytes", part, len))
        };
        let a_len = self.a.len();
        let b_len = self.b.len();
        let c_len = self.c.len();
        Ok(CompressedProof {
            a: self.a.try_into().map_err(|_| wrong("a", a_len))?,
            b: self.b.try_into().map_err(|_| wrong("b", b_len))?,
            c: self.c.try_into().map_err(|_| wrong("c", c_len))?,
        })
    }
}

impl ValidityProofWire {
    /// Validate against the request: one root index per requested hash.
    pub fn into_proof(self, requested: &[RecordHash]) -> Result<ValidityProof, StateClientError> {
        const METHOD: &str = "getValidityProof";
        if self.root_indices.len() != requested.len() {
            return Err(StateClientError::decode(
                METHOD,
                format!(
                    "expected {} root indices, got {}",
                    requested.len(),
                    self.root_indices.len()
                ),
            ));
        }
        if !self.leaves.is_empty() {
            let leaves = self
                .leaves
                .iter()
                .map(|l| parse_hash(METHOD, l))
                .collect::<Result<Vec<_>, _>>()?;
            if leaves != requested {
                return Err(StateClientError::decode(
                    METHOD,
                    "proof leaves do not match the requested hashes",
                ));
            }
        }
        let root_indices = self
            .root_indices
            .iter()
            .map(|i| {
                u16::try_from(*i).map_err(|_| {
                    StateClientError::decode(METHOD, format!("root index {} exceeds u16", i))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ValidityProof {
            compressed_proof: self.compressed_proof.map(|p| p.into_proof()).transpose()?,
            root_indices,
            hashes: requested.to_vec(),
        })
    }
}

// getCompressedTokenBalancesByOwner

#[derive(Debug, Deserialize)]
pub struct TokenBalanceList {
    #[serde(alias = "tokenBalances")]
    pub token_balances: Vec<TokenBalanceWire>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenBalanceWire {
    pub mint: String,
    pub balance: WireU64,
}

impl TokenBalanceWire {
    pub fn into_balance(self) -> Result<TokenBalance, StateClientError> {
        const METHOD: &str = "getCompressedTokenBalancesByOwner";
        Ok(TokenBalance {
            mint: parse_pubkey(METHOD, "mint", &self.mint)?,
            balance: self.balance.value(METHOD)?,
        })
    }
}

// getTokenAccounts

#[derive(Debug, Deserialize)]
pub struct TokenAccountsPage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub token_accounts: Vec<TokenAccountWire>,
}

#[derive(Debug, Deserialize)]
pub struct TokenAccountWire {
    pub address: String,
    pub mint: String,
    pub owner: String,
    pub amount: WireU64,
    #[serde(default)]
    pub delegated_amount: Option<WireU64>,
    #[serde(default)]
    pub frozen: bool,
}

impl TokenAccountWire {
    pub fn into_info(self) -> Result<TokenAccountInfo, StateClientError> {
        const METHOD: &str = "getTokenAccounts";
        Ok(TokenAccountInfo {
            address: parse_pubkey(METHOD, "address", &self.address)?,
            mint: parse_pubkey(METHOD, "mint", &self.mint)?,
            owner: parse_pubkey(METHOD, "owner", &self.owner)?,
            amount: self.amount.value(METHOD)?,
            delegated_amount: match self.delegated_amount {
                Some(d) => d.value(METHOD)?,
                None => 0,
            },
            frozen: self.frozen,
        })
    }
}

// getSignaturesForAddress

pub fn signature_info(
    status: solana_rpc_client_api::response::RpcConfirmedTransactionStatusWithSignature,
) -> Result<SignatureInfo, StateClientError> {
    let signature = Signature::from_str(&status.signature).map_err(|e| {
        StateClientError::decode("getSignaturesForAddress", format!("signature: {}", e))
    })?;
    Ok(SignatureInfo {
        signature,
        slot: status.slot,
        block_time: status.block_time,
        failed: status.err.is_some(),
        memo: status.memo,
    })
}
