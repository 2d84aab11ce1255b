//! Engine error taxonomy.
//!
//! Two distinct families: `EngineError` for hard failures, `SkipReason` for
//! expected business-rule rejections. A skip is a benign terminal state and
//! must stay distinguishable from an error in logs and status records.

use rust_decimal::Decimal;

/// Hard failures in the copy pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed or missing input. Rejected immediately, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Operator key derivation failed (missing master secret or bad address).
    #[error("key derivation failed: {0}")]
    Derivation(String),

    /// Sizing resolved to a non-positive size. Mapped to a skip by callers.
    #[error("sizing error: {0}")]
    Sizing(String),

    /// Balance/allowance sync failed after the retry policy was exhausted.
    /// `retryable` is false for credential/authorization causes.
    #[error("balance sync failed: {message}")]
    BalanceSync { message: String, retryable: bool },

    /// Signature construction failed. Signals a configuration or derivation
    /// defect; alerts operators, never retried.
    #[error("signature error: {0}")]
    Signature(String),

    /// The exchange rejected the order.
    #[error("order submission rejected: {message}")]
    Submission {
        message: String,
        insufficient_balance: bool,
    },

    /// RPC/network/timeout failure, eligible for backoff retry.
    #[error("transient network error: {0}")]
    Transient(String),
}

impl EngineError {
    /// Whether the retry policy applies.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Transient(_) => true,
            EngineError::BalanceSync { retryable, .. } => *retryable,
            _ => false,
        }
    }

}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        // Connection errors and timeouts are transient; anything the server
        // answered is classified at the call site against its status code.
        EngineError::Transient(err.to_string())
    }
}

/// Why the risk/filter gate rejected a trade. Expected, frequently taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterReason {
    TradeSizeBelowMin { size: Decimal, min: Decimal },
    TradeSizeAboveMax { size: Decimal, max: Decimal },
    OddsBelowMin { price: Decimal, min: Decimal },
    OddsAboveMax { price: Decimal, max: Decimal },
    ExposureCapExceeded {
        current: Decimal,
        copy_value: Decimal,
        cap: Decimal,
    },
}

impl std::fmt::Display for FilterReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterReason::TradeSizeBelowMin { size, min } => {
                write!(f, "trade size {} below minimum {}", size, min)
            }
            FilterReason::TradeSizeAboveMax { size, max } => {
                write!(f, "trade size {} above maximum {}", size, max)
            }
            FilterReason::OddsBelowMin { price, min } => {
                write!(f, "price {} below minimum odds {}", price, min)
            }
            FilterReason::OddsAboveMax { price, max } => {
                write!(f, "price {} above maximum odds {}", price, max)
            }
            FilterReason::ExposureCapExceeded {
                current,
                copy_value,
                cap,
            } => write!(
                f,
                "exposure {} + copy value {} would breach cap {}",
                current, copy_value, cap
            ),
        }
    }
}

/// Benign reasons a follower pipeline ends without an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither an active trader-specific nor an active global record exists.
    NoEffectiveSettings,
    /// Sizing resolved to zero or below.
    NonPositiveSize,
    /// A filter check failed.
    Filtered(FilterReason),
    /// This (transaction, follower) pair already reached a terminal state.
    AlreadyProcessed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoEffectiveSettings => write!(f, "no effective settings"),
            SkipReason::NonPositiveSize => write!(f, "non-positive copy size"),
            SkipReason::Filtered(reason) => write!(f, "filtered: {}", reason),
            SkipReason::AlreadyProcessed => write!(f, "already processed"),
        }
    }
}
