//! Application State

use std::sync::Arc;

use membership_core::{ContentCatalog, ProfileStore, SubscriptionLedger};
use membership_payments::{BillingProvider, CheckoutOrchestrator, WebhookReconciler};

/// Payment services bound to one billing provider
pub struct Billing {
    /// Provider name, for health reporting
    pub provider: String,

    pub checkout: CheckoutOrchestrator,

    /// Shared so webhook reconciliation can outlive the request future
    pub reconciler: Arc<WebhookReconciler>,
}

impl Billing {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        ledger: Arc<dyn SubscriptionLedger>,
        profiles: Arc<dyn ProfileStore>,
        base_url: &str,
    ) -> Self {
        Self {
            provider: provider.name().to_string(),
            checkout: CheckoutOrchestrator::new(provider.clone(), base_url),
            reconciler: Arc::new(WebhookReconciler::new(provider, ledger, profiles)),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Subscription records
    pub ledger: Arc<dyn SubscriptionLedger>,

    /// Subscriber profiles (billing customer link)
    pub profiles: Arc<dyn ProfileStore>,

    /// Posts and membership tiers
    pub catalog: Arc<dyn ContentCatalog>,

    /// Payments (optional - None if not configured)
    pub billing: Option<Arc<Billing>>,
}
