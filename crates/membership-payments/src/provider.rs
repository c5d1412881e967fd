//! Billing Provider Abstraction
//!
//! Domain-level contract for the external payment processor. The Stripe
//! adapter and the mock both speak these types, so checkout and reconciliation
//! logic never touch provider SDK structs directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use membership_core::{
    BillingCustomerId, CheckoutSessionId, MembershipId, PriceReference, SubscriberId,
    SubscriptionId,
};

use crate::error::{PaymentError, Result};

/// Metadata keys attached to checkout sessions
pub const META_SUBSCRIBER_ID: &str = "subscriber_id";
pub const META_SUBSCRIBER_NAME: &str = "subscriber_name";
pub const META_MEMBERSHIP_ID: &str = "membership_id";

/// Billing provider trait (Strategy pattern)
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a hosted subscription checkout session
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutRedirect>;

    /// Create a product and its monthly recurring price
    async fn create_membership_price(&self, request: &NewMembershipPrice)
        -> Result<PriceReference>;

    /// Create a self-service billing portal session
    async fn create_portal_session(
        &self,
        customer_id: &BillingCustomerId,
        return_url: &str,
    ) -> Result<PortalRedirect>;

    /// Retrieve a checkout session with its customer expanded
    async fn retrieve_checkout_session(
        &self,
        session_id: &CheckoutSessionId,
    ) -> Result<CheckoutSessionDetail>;

    /// Retrieve authoritative subscription state
    async fn retrieve_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<SubscriptionSnapshot>;

    /// Verify a webhook signature and parse the payload.
    ///
    /// Must fail with [`PaymentError::WebhookSignature`] on a bad or missing
    /// signature; an unverified payload never reaches the reconciler.
    fn verify_and_parse_webhook(&self, payload: &str, signature: &str) -> Result<VerifiedEvent>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Who pays for a new checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CustomerRef {
    /// First purchase: the provider creates a customer for this email
    New { email: String },
    /// Returning subscriber: attach to the existing customer
    Existing { customer_id: BillingCustomerId },
}

impl CustomerRef {
    /// Wire sentinel used by clients for a first purchase
    pub const NEW_SENTINEL: &'static str = "new";

    /// Parse the `customer` field of a checkout request
    pub fn from_wire(customer: &str, email: &str) -> Result<Self> {
        let customer = customer.trim();
        if customer.is_empty() {
            return Err(PaymentError::InvalidRequest("customer is required".into()));
        }

        if customer == Self::NEW_SENTINEL {
            let email = email.trim();
            if email.is_empty() {
                return Err(PaymentError::InvalidRequest(
                    "email is required for a new customer".into(),
                ));
            }
            Ok(Self::New {
                email: email.to_string(),
            })
        } else {
            Ok(Self::Existing {
                customer_id: BillingCustomerId::new(customer),
            })
        }
    }
}

/// Context carried through checkout as opaque session metadata, so the
/// completion webhook can be reconciled without a local session table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    pub subscriber_id: SubscriberId,
    pub subscriber_name: String,
    pub membership_id: MembershipId,
}

impl CheckoutMetadata {
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (META_SUBSCRIBER_ID.to_string(), self.subscriber_id.to_string()),
            (META_SUBSCRIBER_NAME.to_string(), self.subscriber_name.clone()),
            (META_MEMBERSHIP_ID.to_string(), self.membership_id.to_string()),
        ])
    }

    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            map.get(key)
                .ok_or_else(|| PaymentError::WebhookParse(format!("metadata missing {key}")))
        };

        let subscriber_id = get(META_SUBSCRIBER_ID)?
            .parse::<SubscriberId>()
            .map_err(|e| PaymentError::WebhookParse(format!("bad {META_SUBSCRIBER_ID}: {e}")))?;
        let membership_id = get(META_MEMBERSHIP_ID)?
            .parse::<MembershipId>()
            .map_err(|e| PaymentError::WebhookParse(format!("bad {META_MEMBERSHIP_ID}: {e}")))?;
        let subscriber_name = map.get(META_SUBSCRIBER_NAME).cloned().unwrap_or_default();

        Ok(Self {
            subscriber_id,
            subscriber_name,
            membership_id,
        })
    }
}

/// Fully resolved checkout session parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    pub customer: CustomerRef,
    pub price_reference: PriceReference,
    pub metadata: CheckoutMetadata,
    pub success_url: String,
    pub cancel_url: String,
}

/// Created checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRedirect {
    pub session_id: CheckoutSessionId,
    pub url: String,
}

/// Created billing portal session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalRedirect {
    pub url: String,
}

/// Parameters for a new membership price
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMembershipPrice {
    pub title: String,
    /// Monthly amount in yen
    pub amount: i64,
    pub owner_id: SubscriberId,
    pub owner_name: String,
}

/// Checkout session as shown on the result page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSessionDetail {
    pub session_id: CheckoutSessionId,
    pub status: Option<String>,
    pub payment_status: String,
    pub customer_id: Option<BillingCustomerId>,
    pub customer_email: Option<String>,
    pub subscription_id: Option<SubscriptionId>,
    pub membership_id: Option<MembershipId>,
}

/// Authoritative subscription state fetched from the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub subscription_id: SubscriptionId,
    pub customer_id: BillingCustomerId,
    pub price_reference: PriceReference,
    /// Epoch seconds
    pub current_period_end: i64,
}

impl SubscriptionSnapshot {
    /// Period end as an absolute instant
    pub fn period_end(&self) -> Result<DateTime<Utc>> {
        DateTime::from_timestamp(self.current_period_end, 0).ok_or_else(|| {
            PaymentError::WebhookParse(format!(
                "current_period_end out of range: {}",
                self.current_period_end
            ))
        })
    }
}

/// Recognized billing events; everything else is `Ignored`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BillingEvent {
    /// First successful payment of a checkout
    CheckoutCompleted {
        session_id: CheckoutSessionId,
        subscription_id: SubscriptionId,
        metadata: CheckoutMetadata,
    },

    /// Recurring payment succeeded
    InvoicePaymentSucceeded { subscription_id: SubscriptionId },

    /// Event kind this core does not act on
    Ignored { event_type: String },
}

/// A signature-verified webhook event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedEvent {
    /// Provider event id, for logging
    pub id: String,
    pub event: BillingEvent,
}
