use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failures at the ledger I/O boundary
#[derive(Debug, Clone, Error)]
pub enum StateClientError {
    /// HTTP 429 from the endpoint
    #[error("Too many requests (endpoint: {endpoint})")]
    RateLimited { endpoint: String },

    /// Any other non-2xx HTTP status
    #[error("HTTP {status} from {endpoint}")]
    Transport { endpoint: String, status: u16 },

    /// Connection refused, DNS failure, TLS failure, broken body
    #[error("Endpoint unreachable: {message} (endpoint: {endpoint})")]
    Unreachable { endpoint: String, message: String },

    #[error("Timeout after {timeout_ms}ms (operation: {operation})")]
    Timeout { operation: String, timeout_ms: u64 },

    /// JSON-RPC error object returned by the node or indexer
    #[error("RPC error {code} in {method}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// A requested record hash is no longer live
    #[error("Validity proof unavailable: {0}")]
    ProofUnavailable(String),

    /// The block reference expired before confirmation
    #[error("Block reference expired at height {last_valid_block_height}")]
    Expired { last_valid_block_height: u64 },

    /// The transaction landed with an error status
    #[error("Transaction {signature} failed: {reason}")]
    TransactionFailed { signature: String, reason: String },

    /// Response did not match the expected shape
    #[error("Malformed {method} response: {message}")]
    Decode { method: String, message: String },
}

impl StateClientError {
    /// Whether the client's own backoff loop should try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Transport { .. } => "transport",
            Self::Unreachable { .. } => "unreachable",
            Self::Timeout { .. } => "timeout",
            Self::Rpc { .. } => "rpc",
            Self::ProofUnavailable(_) => "proof_unavailable",
            Self::Expired { .. } => "expired",
            Self::TransactionFailed { .. } => "transaction_failed",
            Self::Decode { .. } => "decode",
        }
    }

    pub fn decode(method: &str, message: impl Into<String>) -> Self {
        Self::Decode {
            method: method.to_string(),
            message: message.into(),
        }
    }
}

/// Exponential backoff applied to rate-limited requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter factor (0.0 - 1.0)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 { 5 }
fn default_base_delay_ms() -> u64 { 400 }
fn default_max_delay_ms() -> u64 { 8_000 }
fn default_jitter_factor() -> f64 { 0.1 }
fn default_multiplier() -> f64 { 2.0 }

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Calculate delay for a given attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64);

        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * self.jitter_factor;
        let jittered_delay = (delay_ms * (1.0 + jitter)).max(0.0) as u64;

        Some(Duration::from_millis(jittered_delay))
    }

    /// Delay schedule consumed by `tokio_retry::RetryIf`
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).filter_map(move |attempt| self.calculate_delay(attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rate_limit_is_retryable() {
        assert!(StateClientError::RateLimited {
            endpoint: "test".to_string()
        }
        .is_retryable());

        assert!(!StateClientError::Transport {
            endpoint: "test".to_string(),
            status: 500,
        }
        .is_retryable());
        assert!(!StateClientError::ProofUnavailable("gone".to_string()).is_retryable());
        assert!(!StateClientError::Unreachable {
            endpoint: "test".to_string(),
            message: "refused".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_rate_limit_message() {
        let err = StateClientError::RateLimited {
            endpoint: "http://localhost:8989/".to_string(),
        };
        assert!(err.to_string().starts_with("Too many requests"));
    }

    #[test]
    fn test_retry_policy_backoff_grows() {
        let policy = RetryPolicy::default();

        let delay1 = policy.calculate_delay(0).unwrap();
        let delay2 = policy.calculate_delay(1).unwrap();
        assert!(delay2 >= delay1);

        assert!(policy.calculate_delay(policy.max_attempts).is_none());
    }

    #[test]
    fn test_retry_policy_caps_delay() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.calculate_delay(4), Some(Duration::from_millis(6_400)));
        let capped = RetryPolicy {
            max_attempts: 10,
            jitter_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(capped.calculate_delay(9), Some(Duration::from_millis(8_000)));
    }

    #[test]
    fn test_retry_policy_none_has_no_delays() {
        assert_eq!(RetryPolicy::none().delays().count(), 0);
        assert_eq!(RetryPolicy::default().delays().count(), 5);
    }
}
