//! Domain types shared by the state client, the selection engine and the
//! assemblers. Nothing in here is a wire shape; see `state_client::wire`.

use borsh::BorshSerialize;
use serde::{Deserialize, Serialize};
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature};
use std::fmt;
use std::str::FromStr;

/// Content hash of a compressed record as committed in its state tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordHash(pub [u8; 32]);

impl RecordHash {
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Display for RecordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for RecordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordHash({})", self.to_base58())
    }
}

impl FromStr for RecordHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| format!("invalid base58 hash '{}': {}", s, e))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| format!("hash must be 32 bytes, got {}", b.len()))?;
        Ok(Self(array))
    }
}

/// A single unit of compressed token balance.
///
/// Records are immutable and single-use: once referenced as an input they are
/// replaced by new outputs and must never be selected again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedRecord {
    pub hash: RecordHash,
    pub owner: Pubkey,
    pub mint: Pubkey,
    pub amount: u64,
    pub delegate: Option<Pubkey>,
    /// Lamports attached to the compressed account, usually zero.
    pub lamports: u64,
    pub merkle_tree: Pubkey,
    pub nullifier_queue: Pubkey,
    pub leaf_index: u32,
}

/// Groth16 proof in the compressed encoding the programs expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize)]
pub struct CompressedProof {
    pub a: [u8; 32],
    pub b: [u8; 64],
    pub c: [u8; 32],
}

/// Attestation that an ordered list of record hashes is part of the current
/// tree roots. Only valid against the roots in effect when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityProof {
    /// `None` when every input can be proven by index alone.
    pub compressed_proof: Option<CompressedProof>,
    /// One entry per requested hash, in request order.
    pub root_indices: Vec<u16>,
    pub hashes: Vec<RecordHash>,
}

/// Recent block reference used to bound a transaction's validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReference {
    pub slot: u64,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationOutcome {
    pub signature: Signature,
    pub slot: u64,
    pub confirmations: Option<usize>,
}

/// Aggregated compressed balance for one mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub mint: Pubkey,
    pub balance: u64,
}

/// Conventional token account as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccountInfo {
    pub address: Pubkey,
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub delegated_amount: u64,
    pub frozen: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub failed: bool,
    pub memo: Option<String>,
}

/// A generic compressed account looked up by address or hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedAccountInfo {
    pub hash: RecordHash,
    pub address: Option<Pubkey>,
    pub owner: Pubkey,
    pub lamports: u64,
    pub merkle_tree: Pubkey,
    pub leaf_index: u32,
    pub discriminator: Option<u64>,
    pub data: Vec<u8>,
}

/// A state tree and the nullifier queue that consumes its leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTreeInfo {
    #[serde(with = "pubkey_string")]
    pub tree: Pubkey,
    #[serde(with = "pubkey_string")]
    pub queue: Pubkey,
}

impl Default for StateTreeInfo {
    fn default() -> Self {
        Self {
            tree: crate::addresses::DEFAULT_STATE_TREE,
            queue: crate::addresses::DEFAULT_NULLIFIER_QUEUE,
        }
    }
}

/// Serde adapter storing a `Pubkey` as its base58 string.
pub mod pubkey_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&key.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(|e| D::Error::custom(format!("invalid pubkey '{}': {}", s, e)))
    }
}

/// Rich metadata for a Token-2022 mint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MintMetadata {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    #[serde(default)]
    pub additional: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_hash_parses_base58() {
        let hash = RecordHash([7u8; 32]);
        let parsed: RecordHash = hash.to_base58().parse().unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn test_record_hash_rejects_wrong_length() {
        let short = bs58::encode([1u8; 16]).into_string();
        let err = short.parse::<RecordHash>().unwrap_err();
        assert!(err.contains("32 bytes"));
    }
}
