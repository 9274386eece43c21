//! Error types for the compressed token transaction builder
//!
//! [`BuilderError`] is the taxonomy callers see. Every variant maps to a
//! distinct user-facing situation, so a presentation layer can tell "not
//! enough balance" apart from "try again" and from "unknown failure" without
//! parsing messages.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::selection::InsufficientBalance;
use crate::state_client::StateClientError;

#[derive(Error, Debug)]
pub enum BuilderError {
    /// No wallet public key is available to act as fee payer and owner
    #[error("No wallet connected")]
    NoWalletConnected,

    /// The owner's compressed records do not cover the requested amount
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u128 },

    /// Compress needs an existing conventional token account as its source
    #[error("Source token account {address} does not exist")]
    SourceAccountMissing { address: Pubkey },

    /// Selected inputs are no longer live; re-select with fresh state
    #[error("Validity proof unavailable: {0}")]
    ProofUnavailable(String),

    /// Endpoint answered HTTP 429 after the client's own backoff
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Network or HTTP failure reaching the endpoint
    #[error("Transport unreachable: {0}")]
    TransportUnreachable(String),

    /// Block reference validity window passed before confirmation
    #[error("Transaction expired: block height passed {last_valid_block_height}")]
    Expired { last_valid_block_height: u64 },

    /// Wallet declined to sign; propagated as reported by the wallet
    #[error("Signing rejected: {0}")]
    SigningRejected(String),

    #[error("Confirmation timed out: {0}")]
    ConfirmationTimeout(String),

    /// The ledger executed the transaction and it failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Unexpected RPC or indexer response
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Failed to build an instruction for a specific program
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild { program: String, reason: String },

    /// Instruction sequence violates an ordering invariant
    #[error("Invalid instruction order: {0}")]
    InvalidInstructionOrder(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal invariant violation or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl BuilderError {
    /// Whether retrying the whole operation from scratch may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProofUnavailable(_)
                | Self::RateLimited(_)
                | Self::Expired { .. }
                | Self::ConfirmationTimeout(_)
        )
    }

    /// Stable label for metrics and logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::NoWalletConnected => "no_wallet",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::SourceAccountMissing { .. } => "source_missing",
            Self::ProofUnavailable(_) => "proof_unavailable",
            Self::RateLimited(_) => "rate_limited",
            Self::TransportUnreachable(_) => "transport",
            Self::Expired { .. } => "expired",
            Self::SigningRejected(_) => "signing_rejected",
            Self::ConfirmationTimeout(_) => "confirmation_timeout",
            Self::TransactionFailed(_) => "transaction_failed",
            Self::Rpc(_) => "rpc",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InstructionBuild { .. } => "instruction",
            Self::InvalidInstructionOrder(_) => "validation",
            Self::Configuration(_) => "config",
            Self::Internal(_) => "internal",
            Self::External(_) => "external",
        }
    }

    /// Create an instruction build error for a specific program
    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_order(reason: impl Into<String>) -> Self {
        Self::InvalidInstructionOrder(reason.into())
    }

    pub fn zero_amount(operation: &str) -> Self {
        Self::InvalidAmount(format!("{} amount must be greater than zero", operation))
    }
}

impl From<StateClientError> for BuilderError {
    fn from(err: StateClientError) -> Self {
        match err {
            StateClientError::RateLimited { .. } => Self::RateLimited(err.to_string()),
            StateClientError::Transport { .. } | StateClientError::Unreachable { .. } => {
                Self::TransportUnreachable(err.to_string())
            }
            StateClientError::Timeout { ref operation, .. } if operation == "confirmTransaction" => {
                Self::ConfirmationTimeout(err.to_string())
            }
            StateClientError::Timeout { .. } => Self::TransportUnreachable(err.to_string()),
            StateClientError::ProofUnavailable(reason) => Self::ProofUnavailable(reason),
            StateClientError::Expired {
                last_valid_block_height,
            } => Self::Expired {
                last_valid_block_height,
            },
            StateClientError::TransactionFailed { .. } => Self::TransactionFailed(err.to_string()),
            StateClientError::Rpc { .. } | StateClientError::Decode { .. } => {
                Self::Rpc(err.to_string())
            }
        }
    }
}

impl From<InsufficientBalance> for BuilderError {
    fn from(err: InsufficientBalance) -> Self {
        Self::InsufficientBalance {
            requested: err.requested,
            available: err.available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BuilderError::InsufficientBalance {
            requested: 500,
            available: 120,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance: requested 500, available 120"
        );

        let err = BuilderError::instruction_failed("compressed-token", "bad proof");
        assert!(err.to_string().contains("program=compressed-token"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BuilderError::ProofUnavailable("stale".into()).is_retryable());
        assert!(BuilderError::RateLimited("429".into()).is_retryable());
        assert!(BuilderError::Expired {
            last_valid_block_height: 10
        }
        .is_retryable());

        assert!(!BuilderError::NoWalletConnected.is_retryable());
        assert!(!BuilderError::InsufficientBalance {
            requested: 1,
            available: 0
        }
        .is_retryable());
        assert!(!BuilderError::SigningRejected("user declined".into()).is_retryable());
        assert!(!BuilderError::TransportUnreachable("refused".into()).is_retryable());
    }

    #[test]
    fn test_state_client_mapping() {
        let rate = BuilderError::from(StateClientError::RateLimited {
            endpoint: "e".into(),
        });
        assert_eq!(rate.category(), "rate_limited");

        let http = BuilderError::from(StateClientError::Transport {
            endpoint: "e".into(),
            status: 502,
        });
        assert_eq!(http.category(), "transport");

        let confirm = BuilderError::from(StateClientError::Timeout {
            operation: "confirmTransaction".into(),
            timeout_ms: 1,
        });
        assert_eq!(confirm.category(), "confirmation_timeout");

        let proof = BuilderError::from(StateClientError::ProofUnavailable("spent".into()));
        assert!(matches!(proof, BuilderError::ProofUnavailable(ref m) if m == "spent"));
    }

    #[test]
    fn test_insufficient_balance_conversion() {
        let err: BuilderError = InsufficientBalance {
            requested: 9,
            available: 3,
        }
        .into();
        assert_eq!(err.category(), "insufficient_balance");
    }
}
