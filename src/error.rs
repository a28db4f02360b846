//! Ledger Error Types
//!
//! One taxonomy for every wallet, referral and withdrawal operation.
//! Business errors carry a structured reason; transient and server errors
//! are reported to callers with a generic message.

use thiserror::Error;

use crate::wallet::WalletError;

/// Ledger error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // === Caller Errors ===
    #[error("Validation failed: {0}")]
    Validation(String),

    // === Business Preconditions ===
    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Insufficient pending balance")]
    InsufficientPendingBalance,

    #[error("Already processed")]
    AlreadyProcessed,

    #[error("Daily withdrawal limit reached")]
    RateLimitExceeded,

    #[error("Not found: {0}")]
    NotFound(String),

    // === System Errors ===
    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error("Internal server error: {0}")]
    Server(String),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            LedgerError::InsufficientPendingBalance => "INSUFFICIENT_PENDING_BALANCE",
            LedgerError::AlreadyProcessed => "ALREADY_PROCESSED",
            LedgerError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::TransientStore(_) => "TRANSIENT_STORE_ERROR",
            LedgerError::Server(_) => "SERVER_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::Validation(_) => 400,
            LedgerError::NotFound(_) => 404,
            LedgerError::AlreadyProcessed => 409,
            LedgerError::InsufficientBalance | LedgerError::InsufficientPendingBalance => 422,
            LedgerError::RateLimitExceeded => 429,
            LedgerError::Server(_) => 500,
            LedgerError::TransientStore(_) => 503,
        }
    }

    /// Only lock timeouts and connectivity failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::TransientStore(_))
    }

    /// Message safe to show to an end user.
    ///
    /// Internal detail of transient and server errors stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            LedgerError::TransientStore(_) => {
                "Service temporarily unavailable, please retry".to_string()
            }
            LedgerError::Server(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// PostgreSQL SQLSTATEs that mean "try again later"
const RETRYABLE_SQLSTATES: &[&str] = &[
    "55P03", // lock_not_available (lock_timeout)
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "57014", // query_canceled (statement_timeout)
];

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) => {
                let retryable = db_err
                    .code()
                    .is_some_and(|code| RETRYABLE_SQLSTATES.iter().any(|s| *s == &*code));
                if retryable {
                    LedgerError::TransientStore(e.to_string())
                } else {
                    LedgerError::Server(e.to_string())
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                LedgerError::TransientStore(e.to_string())
            }
            _ => LedgerError::Server(e.to_string()),
        }
    }
}

impl From<WalletError> for LedgerError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::InvalidAmount => {
                LedgerError::Validation("amount must be greater than zero".to_string())
            }
            WalletError::InsufficientBalance { .. } => LedgerError::InsufficientBalance,
            WalletError::InsufficientPendingBalance { .. } => {
                LedgerError::InsufficientPendingBalance
            }
            WalletError::InsufficientLockedFunds { .. } => LedgerError::Server(e.to_string()),
        }
    }
}
