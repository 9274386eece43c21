//! Program ids and deterministic address derivation
//!
//! Every assembler derives the same pool and authority addresses from these
//! functions, so they hold no state and take no configuration. A failed bump
//! search is a protocol invariant violation and panics inside
//! `Pubkey::find_program_address`; it is never surfaced as a user error.

use solana_sdk::{pubkey, pubkey::Pubkey};

/// Compressed token program (v1 layout).
pub const COMPRESSED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("cTokenmWW8bLPjZEBAUgYy3zKxQZW6VKi7bqNFEVv3m");

/// Light system program invoked by the compressed token program.
pub const LIGHT_SYSTEM_PROGRAM_ID: Pubkey = pubkey!("SySTEM1eSU2p4BGQfQpimFEWWSC1XDFeun3Nqzz3rT7");

/// Account compression program owning the state trees.
pub const ACCOUNT_COMPRESSION_PROGRAM_ID: Pubkey =
    pubkey!("compr6CUsB5m2jS4Y3831ztGSTnDpnKJTKS95d64XVq");

/// Noop program used as a log sink for compressed state changes.
pub const NOOP_PROGRAM_ID: Pubkey = pubkey!("noopb9bkMVfRPU8AsbpTUg8AQkHtKwMYZiFUjNRtMmV");

/// Default public state tree for new compressed outputs.
pub const DEFAULT_STATE_TREE: Pubkey = pubkey!("smt1NamzXdq4AMqS2fS2F1i5KTYPZRhoHgWx38d8WsT");

/// Nullifier queue paired with [`DEFAULT_STATE_TREE`].
pub const DEFAULT_NULLIFIER_QUEUE: Pubkey = pubkey!("nfq1NvQDJ2GEgnS8zt9prAe8rjjpAW1zFkrvZoBR148");

pub const POOL_SEED: &[u8] = b"pool";
pub const CPI_AUTHORITY_SEED: &[u8] = b"cpi_authority";

/// Pool account backing compression of `mint`. One per mint.
pub fn pool_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[POOL_SEED, mint.as_ref()], &COMPRESSED_TOKEN_PROGRAM_ID).0
}

/// Authority the compressed token program signs with when it CPIs.
pub fn cpi_authority_address() -> Pubkey {
    Pubkey::find_program_address(&[CPI_AUTHORITY_SEED], &COMPRESSED_TOKEN_PROGRAM_ID).0
}

/// Registration record of the light system program inside account compression.
pub fn registered_program_address() -> Pubkey {
    Pubkey::find_program_address(
        &[LIGHT_SYSTEM_PROGRAM_ID.as_ref()],
        &ACCOUNT_COMPRESSION_PROGRAM_ID,
    )
    .0
}

pub fn account_compression_authority() -> Pubkey {
    Pubkey::find_program_address(&[CPI_AUTHORITY_SEED], &LIGHT_SYSTEM_PROGRAM_ID).0
}

/// Conventional associated token account of `owner` for `mint`.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address_with_program_id(
        owner,
        mint,
        token_program,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_address_is_deterministic() {
        let mint = Pubkey::new_unique();
        assert_eq!(pool_address(&mint), pool_address(&mint));
    }

    #[test]
    fn test_pool_address_differs_per_mint() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        assert_ne!(pool_address(&a), pool_address(&b));
    }

    #[test]
    fn test_pool_address_is_off_curve() {
        let mint = Pubkey::new_unique();
        assert!(!pool_address(&mint).is_on_curve());
        assert!(!cpi_authority_address().is_on_curve());
    }

    #[test]
    fn test_authority_addresses_are_distinct() {
        let cpi = cpi_authority_address();
        let registered = registered_program_address();
        let compression = account_compression_authority();
        assert_ne!(cpi, registered);
        assert_ne!(cpi, compression);
        assert_ne!(registered, compression);
    }

    #[test]
    fn test_associated_address_matches_spl_derivation() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        assert_eq!(
            associated_token_address(&owner, &mint, &spl_token::id()),
            spl_associated_token_account::get_associated_token_address(&owner, &mint)
        );
    }
}
