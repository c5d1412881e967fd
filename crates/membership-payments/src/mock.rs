//! Mock Billing Provider
//!
//! In-process provider for tests and local development. Subscriptions are
//! seeded by the caller; webhook payloads are JSON-encoded [`VerifiedEvent`]s
//! accepted only with [`MockBillingProvider::SIGNATURE`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use membership_core::{BillingCustomerId, CheckoutSessionId, PriceReference, SubscriptionId};

use crate::error::{PaymentError, Result};
use crate::provider::{
    BillingProvider, CheckoutRedirect, CheckoutSessionDetail, CheckoutSessionRequest,
    NewMembershipPrice, PortalRedirect, SubscriptionSnapshot, VerifiedEvent,
};

/// Mock billing provider with seeded subscription state
pub struct MockBillingProvider {
    failing: AtomicBool,
    sequence: AtomicUsize,
    subscription_lookups: AtomicUsize,
    subscriptions: Mutex<HashMap<SubscriptionId, SubscriptionSnapshot>>,
    sessions: Mutex<HashMap<CheckoutSessionId, CheckoutSessionDetail>>,
    checkout_requests: Mutex<Vec<CheckoutSessionRequest>>,
}

impl Default for MockBillingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBillingProvider {
    /// The only webhook signature the mock accepts
    pub const SIGNATURE: &'static str = "mock-signature";

    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
            sequence: AtomicUsize::new(0),
            subscription_lookups: AtomicUsize::new(0),
            subscriptions: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            checkout_requests: Mutex::new(Vec::new()),
        }
    }

    /// Make every API call fail as a provider outage would
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Seed or replace the provider's view of a subscription
    pub async fn put_subscription(&self, snapshot: SubscriptionSnapshot) {
        self.subscriptions
            .lock()
            .await
            .insert(snapshot.subscription_id.clone(), snapshot);
    }

    /// Seed a checkout session for retrieval
    pub async fn put_checkout_session(&self, detail: CheckoutSessionDetail) {
        self.sessions
            .lock()
            .await
            .insert(detail.session_id.clone(), detail);
    }

    /// Checkout requests accepted so far
    pub async fn checkout_requests(&self) -> Vec<CheckoutSessionRequest> {
        self.checkout_requests.lock().await.clone()
    }

    /// Number of subscription retrievals served
    pub fn subscription_lookups(&self) -> usize {
        self.subscription_lookups.load(Ordering::SeqCst)
    }

    /// Encode an event as a webhook body this provider will accept
    pub fn webhook_body(event: &VerifiedEvent) -> Result<String> {
        serde_json::to_string(event).map_err(|e| PaymentError::WebhookParse(e.to_string()))
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PaymentError::Stripe("mock provider unavailable".into()))
        } else {
            Ok(())
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}_mock_{n}")
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutRedirect> {
        self.check_available()?;

        let session_id = CheckoutSessionId::new(self.next_id("cs"));
        self.checkout_requests.lock().await.push(request.clone());

        Ok(CheckoutRedirect {
            url: format!("https://checkout.mock/pay/{session_id}"),
            session_id,
        })
    }

    async fn create_membership_price(
        &self,
        _request: &NewMembershipPrice,
    ) -> Result<PriceReference> {
        self.check_available()?;
        Ok(PriceReference::new(self.next_id("price")))
    }

    async fn create_portal_session(
        &self,
        customer_id: &BillingCustomerId,
        return_url: &str,
    ) -> Result<PortalRedirect> {
        self.check_available()?;
        Ok(PortalRedirect {
            url: format!("https://billing.mock/p/{customer_id}?return_url={return_url}"),
        })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &CheckoutSessionId,
    ) -> Result<CheckoutSessionDetail> {
        self.check_available()?;
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| PaymentError::Stripe(format!("No such checkout session: {session_id}")))
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<SubscriptionSnapshot> {
        self.check_available()?;
        self.subscription_lookups.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .lock()
            .await
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| PaymentError::Stripe(format!("No such subscription: {subscription_id}")))
    }

    fn verify_and_parse_webhook(&self, payload: &str, signature: &str) -> Result<VerifiedEvent> {
        if signature != Self::SIGNATURE {
            return Err(PaymentError::WebhookSignature(
                "signature does not match".into(),
            ));
        }

        serde_json::from_str(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
