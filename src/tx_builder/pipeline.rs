//! Step-recorded assembly pipelines
//!
//! Every assembler runs a short, fixed sequence of named steps and records
//! each one in an [`OperationTrace`]. Instructions are emitted into an
//! [`InstructionSequence`] that remembers what each entry is, so ordering
//! invariants can be checked with [`validate_order`] and replayed in tests
//! without decoding instruction bytes.

use solana_sdk::{instruction::Instruction, signature::Keypair};
use std::fmt;

use super::errors::BuilderError;
use crate::selection::SelectionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateMint,
    MintTo,
    Transfer,
    Compress,
    Decompress,
    ReclaimRent,
    CompressAndReclaim,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateMint => "create_mint",
            Self::MintTo => "mint_to",
            Self::Transfer => "transfer",
            Self::Compress => "compress",
            Self::Decompress => "decompress",
            Self::ReclaimRent => "reclaim_rent",
            Self::CompressAndReclaim => "compress_and_reclaim",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    ComputeBudget,
    CreateMintAccount,
    InitializeMetadataPointer,
    InitializeMint,
    InitializeMetadata,
    UpdateMetadataField,
    CreateTokenPool,
    MintTo,
    CreateAssociatedAccount,
    Transfer,
    Compress,
    Decompress,
    CloseAccount,
}

/// Account whose existence decides a setup branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountRole {
    TokenPool,
    SourceTokenAccount,
    DestinationTokenAccount,
    ClosingTokenAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStep {
    FetchRecords,
    SelectInputs,
    FetchProof,
    ResolveExistence(AccountRole),
    FetchRent,
    GenerateKeypair,
    Emit(InstructionKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub step: PipelineStep,
    pub detail: String,
}

/// Ordered record of the steps one assembler ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationTrace {
    steps: Vec<StepRecord>,
}

impl OperationTrace {
    pub fn record(&mut self, step: PipelineStep, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::debug!(step = ?step, detail = %detail, "Pipeline step");
        self.steps.push(StepRecord { step, detail });
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn step_kinds(&self) -> Vec<PipelineStep> {
        self.steps.iter().map(|s| s.step).collect()
    }

    pub fn position(&self, step: PipelineStep) -> Option<usize> {
        self.steps.iter().position(|s| s.step == step)
    }

    pub fn contains(&self, step: PipelineStep) -> bool {
        self.position(step).is_some()
    }

    /// Both steps ran and `first` ran before `second`.
    pub fn occurs_before(&self, first: PipelineStep, second: PipelineStep) -> bool {
        match (self.position(first), self.position(second)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledInstruction {
    pub kind: InstructionKind,
    pub instruction: Instruction,
}

/// Ordered instruction list. Entries are only ever appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionSequence {
    entries: Vec<LabeledInstruction>,
}

impl InstructionSequence {
    pub fn push(&mut self, kind: InstructionKind, instruction: Instruction) {
        self.entries.push(LabeledInstruction { kind, instruction });
    }

    pub fn kinds(&self) -> Vec<InstructionKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    pub fn entries(&self) -> &[LabeledInstruction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output of an assembler: everything the packager needs, nothing submitted.
#[derive(Debug)]
pub struct AssembledOperation {
    pub operation: Operation,
    pub instructions: InstructionSequence,
    pub trace: OperationTrace,
    /// Keypairs that must co-sign, such as a freshly generated mint
    pub extra_signers: Vec<Keypair>,
    pub selection: Option<SelectionResult>,
}

impl AssembledOperation {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            instructions: InstructionSequence::default(),
            trace: OperationTrace::default(),
            extra_signers: Vec::new(),
            selection: None,
        }
    }

    /// Append an instruction and record the emit step.
    pub fn emit(&mut self, kind: InstructionKind, instruction: Instruction) {
        self.trace.record(
            PipelineStep::Emit(kind),
            format!("program {}", instruction.program_id),
        );
        self.instructions.push(kind, instruction);
    }

    /// Check ordering invariants and hand the result back.
    pub fn finish(self) -> Result<Self, BuilderError> {
        validate_order(&self.instructions.kinds())?;
        Ok(self)
    }
}

fn index_of(kinds: &[InstructionKind], kind: InstructionKind) -> Option<usize> {
    kinds.iter().position(|k| *k == kind)
}

fn require_before(
    kinds: &[InstructionKind],
    first: InstructionKind,
    second: InstructionKind,
) -> Result<(), BuilderError> {
    if let (Some(a), Some(b)) = (index_of(kinds, first), index_of(kinds, second)) {
        if a > b {
            return Err(BuilderError::invalid_order(format!(
                "{:?} at position {} must precede {:?} at position {}",
                first, a, second, b
            )));
        }
    }
    Ok(())
}

/// Validate the ordering invariants of an instruction sequence.
///
/// - compute budget, if present, only at position 0
/// - close, if present, exactly once and last
/// - mint account creation first; metadata pointer before mint
///   initialization; metadata content after it
/// - pool and associated-account setup before the instruction using them
pub fn validate_order(kinds: &[InstructionKind]) -> Result<(), BuilderError> {
    use InstructionKind::*;

    if kinds.is_empty() {
        return Err(BuilderError::invalid_order("Instruction list is empty"));
    }

    for (idx, kind) in kinds.iter().enumerate() {
        if *kind == ComputeBudget && idx != 0 {
            return Err(BuilderError::invalid_order(format!(
                "Compute budget instruction at position {}, only position 0 allowed",
                idx
            )));
        }
    }

    let body: &[InstructionKind] = if kinds[0] == ComputeBudget {
        &kinds[1..]
    } else {
        kinds
    };

    let closes = body.iter().filter(|k| **k == CloseAccount).count();
    if closes > 1 {
        return Err(BuilderError::invalid_order("Multiple close instructions"));
    }
    if closes == 1 && body.last() != Some(&CloseAccount) {
        return Err(BuilderError::invalid_order(
            "Close instruction must be the last instruction",
        ));
    }

    if let Some(idx) = index_of(body, CreateMintAccount) {
        if idx != 0 {
            return Err(BuilderError::invalid_order(format!(
                "Mint account creation at position {}, must be first",
                idx
            )));
        }
    }

    require_before(body, InitializeMetadataPointer, InitializeMint)?;
    require_before(body, InitializeMint, InitializeMetadata)?;
    require_before(body, InitializeMetadata, UpdateMetadataField)?;
    require_before(body, InitializeMint, CreateTokenPool)?;
    require_before(body, CreateTokenPool, MintTo)?;
    require_before(body, CreateTokenPool, Compress)?;
    require_before(body, CreateAssociatedAccount, Decompress)?;
    require_before(body, Compress, CloseAccount)?;

    Ok(())
}
