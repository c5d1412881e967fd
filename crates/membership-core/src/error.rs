//! Ledger Error Types

use thiserror::Error;

use crate::model::SubscriberId;

/// Result type alias
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Subscription ledger and profile store errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Profile does not exist locally (signup never reached this store)
    #[error("Profile not found: {0}")]
    ProfileNotFound(SubscriberId),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
