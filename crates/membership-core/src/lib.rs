//! # membership-core
//!
//! Domain model, subscription ledger and access evaluation for a membership
//! publishing platform.
//!
//! ```text
//! ┌──────────────┐  upsert / patch   ┌──────────────────┐
//! │   Webhook    │──────────────────▶│ SubscriptionLedger│
//! │  Reconciler  │                   └─────────┬─────────┘
//! └──────────────┘                             │ snapshot
//!                                              ▼
//!                  ContentItem ──────▶ access::evaluate ──▶ AccessDecision
//! ```
//!
//! The reconciler lives in `membership-payments`; this crate holds the pieces
//! that do not talk to the billing provider.

pub mod access;
pub mod catalog;
pub mod error;
pub mod ledger;
pub mod model;

pub use access::{AccessDecision, can_access, evaluate, visible_items};
pub use catalog::{ContentCatalog, MemoryCatalog};
pub use error::{LedgerError, Result};
pub use ledger::{LinkOutcome, MemoryLedger, ProfileStore, SubscriptionLedger, UpsertOutcome};
pub use model::{
    BillingCustomerId, CheckoutSessionId, ContentId, ContentItem, MembershipId, MembershipTier,
    PriceReference, SubscriberId, SubscriberProfile, SubscriptionId, SubscriptionPatch,
    SubscriptionRecord,
};
