//! Checkout Orchestration
//!
//! Builds hosted checkout and billing portal sessions. Nothing is written
//! locally here: the subscription only becomes real when the completion
//! webhook is reconciled.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use membership_core::{
    BillingCustomerId, CheckoutSessionId, MembershipId, PriceReference, SubscriberId,
};

use crate::error::{PaymentError, Result};
use crate::provider::{
    BillingProvider, CheckoutMetadata, CheckoutRedirect, CheckoutSessionDetail,
    CheckoutSessionRequest, CustomerRef, NewMembershipPrice, PortalRedirect,
};

/// Smallest monthly price accepted for a membership, in yen
pub const MIN_MEMBERSHIP_PRICE_JPY: i64 = 300;

/// Prefix of hosted checkout session ids
const CHECKOUT_SESSION_PREFIX: &str = "cs_";

/// A subscriber's request to join a membership
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutOrder {
    pub subscriber_id: SubscriberId,
    pub subscriber_name: String,
    /// Owner of the membership; the cancel URL returns to their page
    pub content_owner_id: SubscriberId,
    pub membership_id: MembershipId,
    pub price_reference: PriceReference,
    pub customer: CustomerRef,
}

/// Creates provider-hosted checkout and portal sessions
pub struct CheckoutOrchestrator {
    provider: Arc<dyn BillingProvider>,
    base_url: String,
}

impl CheckoutOrchestrator {
    /// `base_url` is the public origin used for success, cancel and return URLs
    pub fn new(provider: Arc<dyn BillingProvider>, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the session request for an order without contacting the provider
    pub fn session_request(&self, order: CheckoutOrder) -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            success_url: format!(
                "{}/membership/result?session_id={{CHECKOUT_SESSION_ID}}",
                self.base_url
            ),
            cancel_url: format!("{}/member/{}", self.base_url, order.content_owner_id),
            metadata: CheckoutMetadata {
                subscriber_id: order.subscriber_id,
                subscriber_name: order.subscriber_name,
                membership_id: order.membership_id,
            },
            price_reference: order.price_reference,
            customer: order.customer,
        }
    }

    /// Create a subscription checkout and return where to redirect the buyer
    pub async fn create_checkout(&self, order: CheckoutOrder) -> Result<CheckoutRedirect> {
        let returning = matches!(order.customer, CustomerRef::Existing { .. });
        let request = self.session_request(order);

        let redirect = self
            .provider
            .create_checkout_session(&request)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    subscriber_id = %request.metadata.subscriber_id,
                    membership_id = %request.metadata.membership_id,
                    error = %e,
                    "Checkout creation failed"
                );
            })?;

        tracing::info!(
            session_id = %redirect.session_id,
            subscriber_id = %request.metadata.subscriber_id,
            returning_customer = returning,
            "Checkout session ready"
        );

        Ok(redirect)
    }

    /// Create a billing portal session for a subscriber's customer
    pub async fn create_portal_session(
        &self,
        customer_id: Option<&BillingCustomerId>,
    ) -> Result<PortalRedirect> {
        let customer_id = customer_id.ok_or(PaymentError::NoBillingIdentity)?;
        let return_url = format!("{}/settings/customer-portal", self.base_url);

        self.provider
            .create_portal_session(customer_id, &return_url)
            .await
    }

    /// Register a new membership price with the provider
    pub async fn create_membership_price(
        &self,
        request: NewMembershipPrice,
    ) -> Result<PriceReference> {
        if request.title.trim().is_empty() {
            return Err(PaymentError::InvalidRequest("title is required".into()));
        }
        if request.amount < MIN_MEMBERSHIP_PRICE_JPY {
            return Err(PaymentError::InvalidRequest(format!(
                "price must be at least {MIN_MEMBERSHIP_PRICE_JPY} yen"
            )));
        }

        self.provider.create_membership_price(&request).await
    }

    /// Look up a completed checkout for the result page
    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSessionDetail> {
        let session_id = session_id.trim();
        if !session_id.starts_with(CHECKOUT_SESSION_PREFIX) {
            return Err(PaymentError::InvalidRequest(format!(
                "not a checkout session id: {session_id}"
            )));
        }

        self.provider
            .retrieve_checkout_session(&CheckoutSessionId::new(session_id))
            .await
    }
}
