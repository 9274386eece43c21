//! Wallet / signing collaborator
//!
//! The builder only ever sees [`WalletSigner`]: a nullable public key and a
//! sign-and-send call. [`KeypairWallet`] is the local implementation used by
//! the CLI; it signs the fee payer slot and submits through the state client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::state_client::{CompressedStateClient, StateClientError};
use crate::tx_builder::{BuilderError, SignableTransaction};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Reject submission to nodes behind this slot
    pub min_context_slot: u64,
}

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Wallet not connected")]
    NotConnected,

    /// The wallet or its user declined to sign
    #[error("Signing rejected: {0}")]
    Rejected(String),

    #[error("Submission failed: {0}")]
    Submission(#[from] StateClientError),
}

impl From<WalletError> for BuilderError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::NotConnected => Self::NoWalletConnected,
            WalletError::Rejected(reason) => Self::SigningRejected(reason),
            WalletError::Submission(e) => e.into(),
        }
    }
}

#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// `None` while no wallet is connected.
    fn public_key(&self) -> Option<Pubkey>;

    /// Add the wallet signature and submit.
    async fn sign_and_send(
        &self,
        transaction: SignableTransaction,
        options: SendOptions,
    ) -> Result<Signature, WalletError>;
}

/// Read a keypair file: the JSON byte array written by `solana-keygen`, or
/// 64 raw bytes. All-zero keys are rejected.
pub fn read_keypair(path: &Path) -> Result<Keypair> {
    let raw = Zeroizing::new(
        std::fs::read(path)
            .with_context(|| format!("Failed to read keypair file: {}", path.display()))?,
    );

    let bytes: Zeroizing<Vec<u8>> = if raw.len() == 64 {
        Zeroizing::new(raw.to_vec())
    } else {
        Zeroizing::new(
            serde_json::from_slice(&raw).context("Failed to parse keypair JSON")?,
        )
    };
    if bytes.len() != 64 {
        anyhow::bail!(
            "Invalid keypair length: expected 64 bytes, got {}",
            bytes.len()
        );
    }
    if bytes.iter().all(|&b| b == 0) {
        anyhow::bail!("Invalid keypair: all-zero key rejected");
    }
    Keypair::try_from(bytes.as_slice()).context("Invalid keypair bytes")
}

/// Local keypair wallet that submits through a [`CompressedStateClient`].
#[derive(Clone)]
pub struct KeypairWallet {
    keypair: Arc<Keypair>,
    client: Arc<dyn CompressedStateClient>,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair, client: Arc<dyn CompressedStateClient>) -> Self {
        Self {
            keypair: Arc::new(keypair),
            client,
        }
    }

    pub fn from_file(path: &Path, client: Arc<dyn CompressedStateClient>) -> Result<Self> {
        Ok(Self::new(read_keypair(path)?, client))
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn public_key(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    async fn sign_and_send(
        &self,
        mut transaction: SignableTransaction,
        options: SendOptions,
    ) -> Result<Signature, WalletError> {
        transaction
            .sign_with(self.keypair.as_ref())
            .map_err(|e| WalletError::Rejected(e.to_string()))?;
        let missing = transaction.missing_signers();
        if !missing.is_empty() {
            return Err(WalletError::Rejected(format!(
                "{} signature(s) still missing",
                missing.len()
            )));
        }

        let signature = self
            .client
            .send_transaction(&transaction.transaction, options.min_context_slot)
            .await?;
        debug!(signature = %signature, "Transaction submitted");
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeLedger;
    use std::io::Write;

    #[test]
    fn test_read_json_keypair() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = read_keypair(file.path()).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_read_raw_keypair() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&keypair.to_bytes()).unwrap();

        let loaded = read_keypair(file.path()).unwrap();
        assert_eq!(loaded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_zero_keypair_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        let err = read_keypair(file.path()).unwrap_err();
        assert!(err.to_string().contains("all-zero"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = read_keypair(Path::new("/nonexistent/id.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/id.json"));
    }

    #[test]
    fn test_wallet_error_mapping() {
        assert!(matches!(
            BuilderError::from(WalletError::NotConnected),
            BuilderError::NoWalletConnected
        ));
        assert_eq!(
            BuilderError::from(WalletError::Rejected("declined".into())).category(),
            "signing_rejected"
        );
    }

    #[tokio::test]
    async fn test_keypair_wallet_signs_and_submits() {
        let ledger = Arc::new(FakeLedger::new());
        let keypair = Keypair::new();
        let payer = keypair.pubkey();
        let wallet = KeypairWallet::new(keypair, ledger.clone());

        let ix = spl_token::instruction::close_account(
            &spl_token::id(),
            &Pubkey::new_unique(),
            &payer,
            &payer,
            &[],
        )
        .unwrap();
        let block = ledger.block_reference();
        let signable =
            crate::tx_builder::package_instructions(&[ix], &payer, &block, &[], 1).unwrap();

        let signature = wallet
            .sign_and_send(signable, SendOptions { min_context_slot: block.slot })
            .await
            .unwrap();
        let sent = ledger.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].signatures[0], signature);
        assert!(sent[0].verify_with_results().iter().all(|ok| *ok));
    }
}
