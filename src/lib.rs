//! Compressed Token Transaction Builder
//!
//! Builds, signs and submits transactions for compressed SPL tokens: mint
//! creation, minting, transfer, compress, decompress and rent reclaim.
//!
//! The I/O boundary is [`state_client::CompressedStateClient`] and the
//! signing boundary is [`wallet::WalletSigner`]; both are injected, never
//! global.

pub mod addresses;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod resolver;
pub mod selection;
pub mod service;
pub mod state_client;
pub mod structured_logging;
pub mod test_utils;
pub mod tx_builder;
pub mod types;
pub mod wallet;

pub use service::{CompressedTokenService, OperationReceipt, PreparedOperation};
pub use tx_builder::BuilderError;

pub use solana_sdk::{pubkey::Pubkey, signature::Signature};

#[cfg(test)]
mod tests {
    mod assembler_scenario_tests;
    mod service_flow_tests;
}
