//! Structured operation lifecycle events

use solana_sdk::signature::Signature;

use crate::observability::TraceContext;
use crate::tx_builder::{BuilderError, OperationTrace};

/// Emits the lifecycle events of one operation with a shared context id.
#[derive(Debug, Clone)]
pub struct OperationLogger {
    context_id: String,
    operation: String,
}

impl OperationLogger {
    pub fn new(context: &TraceContext) -> Self {
        Self {
            context_id: context.correlation_id.to_string(),
            operation: context.operation.clone(),
        }
    }

    pub fn started(&self, owner: &str) {
        tracing::info!(
            context_id = %self.context_id,
            operation = %self.operation,
            owner = %owner,
            "Operation started"
        );
    }

    /// One debug line per recorded pipeline step.
    pub fn assembled(&self, trace: &OperationTrace, instruction_count: usize) {
        for record in trace.steps() {
            tracing::debug!(
                context_id = %self.context_id,
                operation = %self.operation,
                step = ?record.step,
                detail = %record.detail,
                "Pipeline step"
            );
        }
        tracing::info!(
            context_id = %self.context_id,
            operation = %self.operation,
            steps = trace.steps().len(),
            instructions = instruction_count,
            "Instructions assembled"
        );
    }

    pub fn submitted(&self, signature: &Signature) {
        tracing::info!(
            context_id = %self.context_id,
            operation = %self.operation,
            signature = %signature,
            "Transaction submitted"
        );
    }

    pub fn confirmed(&self, signature: &Signature, slot: u64, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            operation = %self.operation,
            signature = %signature,
            slot = slot,
            latency_ms = latency_ms,
            "Operation confirmed"
        );
    }

    pub fn failed(&self, error: &BuilderError, latency_ms: u64) {
        tracing::warn!(
            context_id = %self.context_id,
            operation = %self.operation,
            category = error.category(),
            retryable = error.is_retryable(),
            error = %error,
            latency_ms = latency_ms,
            "Operation failed"
        );
    }
}
