//! Compressed token operation service
//!
//! Runs one user operation end to end: wallet check, assembly, block
//! reference, packaging, sign-and-send, confirmation. The state client and
//! the wallet are injected, so the same service runs against the HTTP
//! client in the binary and against an in-memory ledger in tests.
//!
//! The block reference is fetched after assembly, so the proof fetched during
//! assembly is always older than the validity window it is submitted with.

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Signature, Signer},
};
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

use crate::metrics::{metrics, Timer};
use crate::observability::TraceContext;
use crate::state_client::CompressedStateClient;
use crate::structured_logging::OperationLogger;
use crate::tx_builder::{
    package, AssembledOperation, BuilderError, BuilderSettings, CompressAndReclaimRequest,
    CompressRequest, CreateMintRequest, DecompressRequest, InstructionAssembler, InstructionKind,
    MintToRequest, Operation, OperationTrace, SignableTransaction, TransferRequest,
};
use crate::types::BlockReference;
use crate::wallet::{SendOptions, WalletSigner};

/// A packaged operation that has not been submitted.
#[derive(Debug, Clone)]
pub struct PreparedOperation {
    pub operation: Operation,
    pub transaction: SignableTransaction,
    pub trace: OperationTrace,
    /// Instruction kinds after the compute budget instruction
    pub instructions: Vec<InstructionKind>,
    /// Change left in the consumed records, for operations that select inputs
    pub change_amount: Option<u64>,
    /// The new mint, for create-mint
    pub mint: Option<Pubkey>,
}

/// Result of a confirmed operation.
#[derive(Debug, Clone)]
pub struct OperationReceipt {
    pub operation: Operation,
    pub signature: Signature,
    pub block_reference: BlockReference,
    /// Slot the confirmation was observed at
    pub slot: u64,
    pub trace: OperationTrace,
    pub mint: Option<Pubkey>,
}

pub struct CompressedTokenService {
    client: Arc<dyn CompressedStateClient>,
    wallet: Arc<dyn WalletSigner>,
    settings: BuilderSettings,
}

impl CompressedTokenService {
    pub fn new(
        client: Arc<dyn CompressedStateClient>,
        wallet: Arc<dyn WalletSigner>,
        settings: BuilderSettings,
    ) -> Self {
        Self {
            client,
            wallet,
            settings,
        }
    }

    pub fn client(&self) -> &Arc<dyn CompressedStateClient> {
        &self.client
    }

    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    fn owner(&self) -> Result<Pubkey, BuilderError> {
        self.wallet.public_key().ok_or(BuilderError::NoWalletConnected)
    }

    fn assembler(&self) -> InstructionAssembler<'_> {
        InstructionAssembler::new(self.client.as_ref(), &self.settings)
    }

    /// Fetch a fresh block reference and package `assembled`.
    async fn finish_prepare(
        &self,
        owner: &Pubkey,
        assembled: AssembledOperation,
    ) -> Result<PreparedOperation, BuilderError> {
        let block = self.client.get_latest_block_reference().await?;
        let transaction = package(&assembled, owner, &block, self.settings.compute_unit_limit)?;
        let mint = (assembled.operation == Operation::CreateMint)
            .then(|| assembled.extra_signers.first().map(|k| k.pubkey()))
            .flatten();
        Ok(PreparedOperation {
            operation: assembled.operation,
            transaction,
            instructions: assembled.instructions.kinds(),
            change_amount: assembled.selection.as_ref().map(|s| s.change_amount),
            trace: assembled.trace,
            mint,
        })
    }

    pub async fn prepare_create_mint(
        &self,
        request: &CreateMintRequest,
    ) -> Result<PreparedOperation, BuilderError> {
        let owner = self.owner()?;
        let assembled = self.assembler().create_mint(&owner, request).await?;
        self.finish_prepare(&owner, assembled).await
    }

    pub async fn prepare_mint_to(
        &self,
        request: &MintToRequest,
    ) -> Result<PreparedOperation, BuilderError> {
        let owner = self.owner()?;
        let assembled = self.assembler().mint_to(&owner, request).await?;
        self.finish_prepare(&owner, assembled).await
    }

    pub async fn prepare_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<PreparedOperation, BuilderError> {
        let owner = self.owner()?;
        let assembled = self.assembler().transfer(&owner, request).await?;
        self.finish_prepare(&owner, assembled).await
    }

    pub async fn prepare_compress(
        &self,
        request: &CompressRequest,
    ) -> Result<PreparedOperation, BuilderError> {
        let owner = self.owner()?;
        let assembled = self.assembler().compress(&owner, request).await?;
        self.finish_prepare(&owner, assembled).await
    }

    pub async fn prepare_decompress(
        &self,
        request: &DecompressRequest,
    ) -> Result<PreparedOperation, BuilderError> {
        let owner = self.owner()?;
        let assembled = self.assembler().decompress(&owner, request).await?;
        self.finish_prepare(&owner, assembled).await
    }

    pub async fn prepare_reclaim_rent(
        &self,
        mint: &Pubkey,
    ) -> Result<PreparedOperation, BuilderError> {
        let owner = self.owner()?;
        let assembled = self.assembler().reclaim_rent(&owner, mint).await?;
        self.finish_prepare(&owner, assembled).await
    }

    pub async fn prepare_compress_and_reclaim(
        &self,
        request: &CompressAndReclaimRequest,
    ) -> Result<PreparedOperation, BuilderError> {
        let owner = self.owner()?;
        let assembled = self.assembler().compress_and_reclaim(&owner, request).await?;
        self.finish_prepare(&owner, assembled).await
    }

    pub async fn create_mint(
        &self,
        request: &CreateMintRequest,
    ) -> Result<OperationReceipt, BuilderError> {
        self.execute(Operation::CreateMint, self.prepare_create_mint(request))
            .await
    }

    pub async fn mint_to(&self, request: &MintToRequest) -> Result<OperationReceipt, BuilderError> {
        self.execute(Operation::MintTo, self.prepare_mint_to(request))
            .await
    }

    pub async fn transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<OperationReceipt, BuilderError> {
        self.execute(Operation::Transfer, self.prepare_transfer(request))
            .await
    }

    pub async fn compress(
        &self,
        request: &CompressRequest,
    ) -> Result<OperationReceipt, BuilderError> {
        self.execute(Operation::Compress, self.prepare_compress(request))
            .await
    }

    pub async fn decompress(
        &self,
        request: &DecompressRequest,
    ) -> Result<OperationReceipt, BuilderError> {
        self.execute(Operation::Decompress, self.prepare_decompress(request))
            .await
    }

    pub async fn reclaim_rent(&self, mint: &Pubkey) -> Result<OperationReceipt, BuilderError> {
        self.execute(Operation::ReclaimRent, self.prepare_reclaim_rent(mint))
            .await
    }

    pub async fn compress_and_reclaim(
        &self,
        request: &CompressAndReclaimRequest,
    ) -> Result<OperationReceipt, BuilderError> {
        self.execute(
            Operation::CompressAndReclaim,
            self.prepare_compress_and_reclaim(request),
        )
        .await
    }

    /// Sign, submit and confirm an already prepared operation.
    pub async fn submit(
        &self,
        prepared: PreparedOperation,
    ) -> Result<OperationReceipt, BuilderError> {
        let context = TraceContext::new(prepared.operation.as_str());
        let logger = OperationLogger::new(&context);
        self.submit_logged(prepared, &logger)
            .instrument(context.span())
            .await
    }

    async fn submit_logged(
        &self,
        prepared: PreparedOperation,
        logger: &OperationLogger,
    ) -> Result<OperationReceipt, BuilderError> {
        let block = prepared.transaction.block_reference;
        let options = SendOptions {
            min_context_slot: block.slot,
        };
        let signature = self
            .wallet
            .sign_and_send(prepared.transaction, options)
            .await?;
        logger.submitted(&signature);

        let outcome = self.client.confirm(&signature, &block).await?;
        Ok(OperationReceipt {
            operation: prepared.operation,
            signature,
            block_reference: block,
            slot: outcome.slot,
            trace: prepared.trace,
            mint: prepared.mint,
        })
    }

    async fn execute<F>(
        &self,
        operation: Operation,
        prepare: F,
    ) -> Result<OperationReceipt, BuilderError>
    where
        F: Future<Output = Result<PreparedOperation, BuilderError>>,
    {
        let context = TraceContext::new(operation.as_str());
        let logger = OperationLogger::new(&context);
        let timer = Timer::new();
        metrics()
            .operations_total
            .with_label_values(&[operation.as_str()])
            .inc();

        let owner = self
            .wallet
            .public_key()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "none".to_string());
        logger.started(&owner);

        let result = async {
            let prepared = prepare.await?;
            logger.assembled(&prepared.trace, prepared.instructions.len());
            self.submit_logged(prepared, &logger)
                .instrument(context.child_span("submit").span())
                .await
        }
        .instrument(context.span())
        .await;

        timer.observe_duration(&metrics().operation_latency);
        match &result {
            Ok(receipt) => {
                metrics()
                    .operations_confirmed
                    .with_label_values(&[operation.as_str()])
                    .inc();
                logger.confirmed(&receipt.signature, receipt.slot, timer.elapsed_ms());
            }
            Err(e) => {
                metrics()
                    .operations_failed
                    .with_label_values(&[operation.as_str(), e.category()])
                    .inc();
                logger.failed(e, timer.elapsed_ms());
            }
        }
        result
    }
}
