//! Payment Error Types

use membership_core::{LedgerError, SubscriptionId};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Renewal for a subscription the ledger has never seen
    #[error("Sequencing anomaly: renewal for unknown subscription {0}")]
    SequencingAnomaly(SubscriptionId),

    /// Caller has no billing customer yet (no completed purchase)
    #[error("No billing identity for this subscriber")]
    NoBillingIdentity,

    /// Request rejected before reaching the provider
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger or profile store failure
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl PaymentError {
    /// Check if this error is retryable
    ///
    /// A sequencing anomaly counts as retryable: redelivery after the matching
    /// checkout completion lands will succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Stripe(_) | Self::SequencingAnomaly(_) => true,
            Self::Ledger(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &str {
        match self {
            Self::Stripe(_) | Self::Ledger(_) => "Payment processing failed. Please try again.",
            Self::NoBillingIdentity => "No purchase found for this account yet.",
            Self::InvalidRequest(_) => "The request was invalid.",
            Self::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your request.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(PaymentError::Stripe("timeout".into()).is_retryable());
        assert!(PaymentError::SequencingAnomaly("sub_1".into()).is_retryable());
        assert!(PaymentError::Ledger(LedgerError::Storage("down".into())).is_retryable());
        assert!(!PaymentError::WebhookSignature("bad".into()).is_retryable());
        assert!(!PaymentError::NoBillingIdentity.is_retryable());
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = PaymentError::SequencingAnomaly("sub_secret".into());
        assert!(!err.user_message().contains("sub_secret"));
    }
}
