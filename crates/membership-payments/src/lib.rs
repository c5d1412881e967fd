//! # membership-payments
//!
//! Checkout orchestration and webhook reconciliation for paid memberships.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐   redirect   ┌─────────────────┐  webhook   ┌──────────────┐
//! │   Checkout   │─────────────▶│  Stripe Hosted  │───────────▶│   Webhook    │
//! │ Orchestrator │              │  Checkout Page  │            │  Reconciler  │
//! └──────────────┘              └─────────────────┘            └──────┬───────┘
//!                                                                     │ upsert
//!                                                                     ▼
//!                                                            SubscriptionLedger
//! ```
//!
//! Nothing is stored when a checkout is created. Subscription context rides
//! along as session metadata and is recovered from the `checkout.session.completed`
//! event; renewals (`invoice.payment_succeeded`) move `current_period_end`
//! forward in place.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use membership_payments::{CheckoutOrchestrator, CheckoutOrder, CustomerRef, StripeClient};
//!
//! let stripe = Arc::new(StripeClient::new("sk_test_xxx", "whsec_xxx"));
//! let checkout = CheckoutOrchestrator::new(stripe, "https://members.example.com");
//!
//! let redirect = checkout.create_checkout(CheckoutOrder {
//!     subscriber_id,
//!     subscriber_name: "Reader".into(),
//!     content_owner_id,
//!     membership_id,
//!     price_reference: tier.price_reference.clone(),
//!     customer: CustomerRef::New { email: "reader@example.com".into() },
//! }).await?;
//!
//! // Redirect user to: redirect.url
//! ```

mod checkout;
mod error;
mod mock;
mod provider;
mod stripe_client;
mod webhook;

pub use checkout::{CheckoutOrchestrator, CheckoutOrder, MIN_MEMBERSHIP_PRICE_JPY};
pub use error::{PaymentError, Result};
pub use mock::MockBillingProvider;
pub use provider::{
    BillingEvent, BillingProvider, CheckoutMetadata, CheckoutRedirect, CheckoutSessionDetail,
    CheckoutSessionRequest, CustomerRef, NewMembershipPrice, PortalRedirect,
    SubscriptionSnapshot, VerifiedEvent,
};
pub use stripe_client::StripeClient;
pub use webhook::{ReconcileOutcome, WebhookReconciler};
