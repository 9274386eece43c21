//! Compressed token program instruction encoders
//!
//! Instruction data is an 8-byte Anchor discriminator followed by the borsh
//! encoded arguments. Optional Anchor accounts that are not supplied are
//! encoded as the program id, read-only.

use borsh::BorshSerialize;
use sha2::{Digest, Sha256};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};

use super::errors::BuilderError;
use crate::addresses::{
    account_compression_authority, cpi_authority_address, pool_address,
    registered_program_address, ACCOUNT_COMPRESSION_PROGRAM_ID, COMPRESSED_TOKEN_PROGRAM_ID,
    LIGHT_SYSTEM_PROGRAM_ID, NOOP_PROGRAM_ID,
};
use crate::types::{CompressedProof, CompressedRecord, ValidityProof};

const PROGRAM_LABEL: &str = "compressed-token";

/// `sha256("global:<name>")[..8]`
pub fn anchor_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{}", name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize)]
pub struct PackedMerkleContext {
    pub merkle_tree_pubkey_index: u8,
    pub nullifier_queue_pubkey_index: u8,
    pub leaf_index: u32,
    pub prove_by_index: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct InputTokenDataWithContext {
    pub amount: u64,
    pub delegate_index: Option<u8>,
    pub delegated_amount: Option<u64>,
    pub is_native: Option<u64>,
    pub merkle_context: PackedMerkleContext,
    pub root_index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize)]
pub struct PackedTokenTransferOutputData {
    pub owner: Pubkey,
    pub amount: u64,
    pub lamports: Option<u64>,
    pub merkle_tree_index: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize)]
pub struct CompressedCpiContext {
    pub set_context: bool,
    pub first_set_context: bool,
    pub cpi_context_account_index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize)]
pub struct CompressedTokenInstructionDataTransfer {
    pub proof: Option<CompressedProof>,
    pub mint: Pubkey,
    pub signer_is_delegate: bool,
    pub input_token_data_with_context: Vec<InputTokenDataWithContext>,
    pub output_compressed_accounts: Vec<PackedTokenTransferOutputData>,
    pub is_compress: bool,
    pub compression_amount: Option<u64>,
    pub cpi_context: Option<CompressedCpiContext>,
}

/// An output compressed token account before packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTransferOutput {
    pub owner: Pubkey,
    pub amount: u64,
    pub merkle_tree: Pubkey,
}

/// Movement between the pool and a conventional token account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Conventional `source` account into compressed outputs
    Compress {
        amount: u64,
        source: Pubkey,
        token_program: Pubkey,
    },
    /// Compressed inputs out to the conventional `destination` account
    Decompress {
        amount: u64,
        destination: Pubkey,
        token_program: Pubkey,
    },
}

/// Remaining accounts in first-seen order.
#[derive(Debug, Default)]
struct RemainingAccounts {
    keys: Vec<Pubkey>,
}

impl RemainingAccounts {
    fn index_of(&mut self, key: Pubkey) -> Result<u8, BuilderError> {
        let position = match self.keys.iter().position(|k| *k == key) {
            Some(position) => position,
            None => {
                self.keys.push(key);
                self.keys.len() - 1
            }
        };
        u8::try_from(position).map_err(|_| {
            BuilderError::instruction_failed(PROGRAM_LABEL, "more than 256 remaining accounts")
        })
    }

    fn into_metas(self) -> Vec<AccountMeta> {
        self.keys
            .into_iter()
            .map(|k| AccountMeta::new(k, false))
            .collect()
    }
}

/// Light system accounts shared by mint-to and transfer.
fn light_system_metas() -> [AccountMeta; 5] {
    [
        AccountMeta::new_readonly(LIGHT_SYSTEM_PROGRAM_ID, false),
        AccountMeta::new_readonly(registered_program_address(), false),
        AccountMeta::new_readonly(NOOP_PROGRAM_ID, false),
        AccountMeta::new_readonly(account_compression_authority(), false),
        AccountMeta::new_readonly(ACCOUNT_COMPRESSION_PROGRAM_ID, false),
    ]
}

fn absent_optional() -> AccountMeta {
    AccountMeta::new_readonly(COMPRESSED_TOKEN_PROGRAM_ID, false)
}

fn encode<T: BorshSerialize>(name: &str, args: &T) -> Result<Vec<u8>, BuilderError> {
    let mut data = anchor_discriminator(name).to_vec();
    args.serialize(&mut data)
        .map_err(|e| BuilderError::instruction_failed(PROGRAM_LABEL, e.to_string()))?;
    Ok(data)
}

/// Register the pool account for `mint`.
pub fn create_token_pool(fee_payer: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Instruction {
    Instruction {
        program_id: COMPRESSED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*fee_payer, true),
            AccountMeta::new(pool_address(mint), false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new(*mint, false),
            AccountMeta::new_readonly(*token_program, false),
            AccountMeta::new_readonly(cpi_authority_address(), false),
        ],
        data: anchor_discriminator("create_token_pool").to_vec(),
    }
}

#[derive(BorshSerialize)]
struct MintToArgs {
    public_keys: Vec<Pubkey>,
    amounts: Vec<u64>,
    lamports: Option<u64>,
}

/// Mint compressed tokens to `recipients` into `merkle_tree`.
pub fn mint_to(
    fee_payer: &Pubkey,
    authority: &Pubkey,
    mint: &Pubkey,
    merkle_tree: &Pubkey,
    recipients: &[(Pubkey, u64)],
    token_program: &Pubkey,
) -> Result<Instruction, BuilderError> {
    if recipients.is_empty() {
        return Err(BuilderError::instruction_failed(
            PROGRAM_LABEL,
            "mint_to needs at least one recipient",
        ));
    }
    let args = MintToArgs {
        public_keys: recipients.iter().map(|(k, _)| *k).collect(),
        amounts: recipients.iter().map(|(_, a)| *a).collect(),
        lamports: None,
    };

    let mut accounts = vec![
        AccountMeta::new(*fee_payer, true),
        AccountMeta::new_readonly(*authority, true),
        AccountMeta::new_readonly(cpi_authority_address(), false),
        AccountMeta::new(*mint, false),
        AccountMeta::new(pool_address(mint), false),
        AccountMeta::new_readonly(*token_program, false),
    ];
    accounts.extend(light_system_metas());
    accounts.extend([
        AccountMeta::new(*merkle_tree, false),
        AccountMeta::new_readonly(COMPRESSED_TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(system_program::id(), false),
        absent_optional(),
    ]);

    Ok(Instruction {
        program_id: COMPRESSED_TOKEN_PROGRAM_ID,
        accounts,
        data: encode("mint_to", &args)?,
    })
}

/// Inputs and outputs of one `transfer` invocation.
#[derive(Debug, Clone)]
pub struct TransferParams<'a> {
    pub fee_payer: Pubkey,
    pub authority: Pubkey,
    pub mint: Pubkey,
    pub inputs: &'a [CompressedRecord],
    pub proof: Option<&'a ValidityProof>,
    pub outputs: Vec<TokenTransferOutput>,
    pub compression: Option<Compression>,
}

/// Change output back to `owner` when the inputs exceed what leaves them.
pub fn change_output(
    inputs: &[CompressedRecord],
    spent: u64,
    owner: &Pubkey,
) -> Result<Option<TokenTransferOutput>, BuilderError> {
    let total: u128 = inputs.iter().map(|r| u128::from(r.amount)).sum();
    let Some(first) = inputs.first() else {
        return Ok(None);
    };
    let change = total.checked_sub(u128::from(spent)).ok_or_else(|| {
        BuilderError::Internal(format!("inputs total {} below spend {}", total, spent))
    })?;
    if change == 0 {
        return Ok(None);
    }
    let amount = u64::try_from(change)
        .map_err(|_| BuilderError::Internal(format!("change {} exceeds u64", change)))?;
    Ok(Some(TokenTransferOutput {
        owner: *owner,
        amount,
        merkle_tree: first.merkle_tree,
    }))
}

/// Encode the program's `transfer` instruction, which also carries
/// compress and decompress.
pub fn transfer(params: TransferParams<'_>) -> Result<Instruction, BuilderError> {
    let root_indices: &[u16] = match params.proof {
        Some(proof) => &proof.root_indices,
        None => &[],
    };
    if root_indices.len() != params.inputs.len() {
        return Err(BuilderError::instruction_failed(
            PROGRAM_LABEL,
            format!(
                "{} inputs but {} root indices",
                params.inputs.len(),
                root_indices.len()
            ),
        ));
    }

    let mut remaining = RemainingAccounts::default();
    let mut input_data = Vec::with_capacity(params.inputs.len());
    for (record, root_index) in params.inputs.iter().zip(root_indices) {
        let merkle_tree_pubkey_index = remaining.index_of(record.merkle_tree)?;
        let delegate_index = record
            .delegate
            .map(|d| remaining.index_of(d))
            .transpose()?;
        input_data.push(InputTokenDataWithContext {
            amount: record.amount,
            delegate_index,
            delegated_amount: None,
            is_native: None,
            merkle_context: PackedMerkleContext {
                merkle_tree_pubkey_index,
                nullifier_queue_pubkey_index: 0,
                leaf_index: record.leaf_index,
                prove_by_index: false,
            },
            root_index: *root_index,
        });
    }
    for (record, data) in params.inputs.iter().zip(input_data.iter_mut()) {
        data.merkle_context.nullifier_queue_pubkey_index =
            remaining.index_of(record.nullifier_queue)?;
    }
    let mut outputs = Vec::with_capacity(params.outputs.len());
    for output in &params.outputs {
        outputs.push(PackedTokenTransferOutputData {
            owner: output.owner,
            amount: output.amount,
            lamports: None,
            merkle_tree_index: remaining.index_of(output.merkle_tree)?,
        });
    }

    let (is_compress, compression_amount, pool, token_account, token_program) =
        match params.compression {
            None => (false, None, None, None, None),
            Some(Compression::Compress {
                amount,
                source,
                token_program,
            }) => (
                true,
                Some(amount),
                Some(pool_address(&params.mint)),
                Some(source),
                Some(token_program),
            ),
            Some(Compression::Decompress {
                amount,
                destination,
                token_program,
            }) => (
                false,
                Some(amount),
                Some(pool_address(&params.mint)),
                Some(destination),
                Some(token_program),
            ),
        };

    let inputs = CompressedTokenInstructionDataTransfer {
        proof: params.proof.and_then(|p| p.compressed_proof),
        mint: params.mint,
        signer_is_delegate: false,
        input_token_data_with_context: input_data,
        output_compressed_accounts: outputs,
        is_compress,
        compression_amount,
        cpi_context: None,
    };
    let serialized = borsh::to_vec(&inputs)
        .map_err(|e| BuilderError::instruction_failed(PROGRAM_LABEL, e.to_string()))?;

    let mut accounts = vec![
        AccountMeta::new(params.fee_payer, true),
        AccountMeta::new_readonly(params.authority, true),
        AccountMeta::new_readonly(cpi_authority_address(), false),
    ];
    accounts.extend(light_system_metas());
    accounts.push(AccountMeta::new_readonly(COMPRESSED_TOKEN_PROGRAM_ID, false));
    accounts.push(pool.map_or_else(absent_optional, |p| AccountMeta::new(p, false)));
    accounts.push(token_account.map_or_else(absent_optional, |a| AccountMeta::new(a, false)));
    accounts.push(token_program.map_or_else(absent_optional, |t| AccountMeta::new_readonly(t, false)));
    accounts.push(AccountMeta::new_readonly(system_program::id(), false));
    accounts.extend(remaining.into_metas());

    Ok(Instruction {
        program_id: COMPRESSED_TOKEN_PROGRAM_ID,
        accounts,
        data: encode("transfer", &serialized)?,
    })
}
