//! Webhook Reconciliation
//!
//! Applies verified billing events to the subscription ledger. Delivery is
//! at-least-once and unordered, so every transition is an idempotent write
//! keyed by subscription id:
//!
//! ```text
//!   UNKNOWN ──checkout completed──▶ ACTIVE ──invoice paid──▶ ACTIVE
//!                                     ▲                       │
//!                                     └───────────────────────┘
//! ```
//!
//! Any failure is returned so the endpoint answers non-200 and the provider
//! redelivers the same event later.

use chrono::Utc;
use std::sync::Arc;

use membership_core::{
    CheckoutSessionId, LinkOutcome, ProfileStore, SubscriptionId, SubscriptionLedger,
    SubscriptionPatch, SubscriptionRecord, UpsertOutcome,
};

use crate::error::{PaymentError, Result};
use crate::provider::{BillingEvent, BillingProvider, CheckoutMetadata, VerifiedEvent};

/// What reconciling one event did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Checkout completion recorded
    Activated {
        record: SubscriptionRecord,
        upsert: UpsertOutcome,
        link: LinkOutcome,
    },

    /// Renewal applied in place
    Renewed { record: SubscriptionRecord },

    /// Event kind not acted on
    Ignored { event_type: String },
}

/// Webhook reconciler
pub struct WebhookReconciler {
    provider: Arc<dyn BillingProvider>,
    ledger: Arc<dyn SubscriptionLedger>,
    profiles: Arc<dyn ProfileStore>,
}

impl WebhookReconciler {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        ledger: Arc<dyn SubscriptionLedger>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            provider,
            ledger,
            profiles,
        }
    }

    /// Verify webhook signature and parse event
    pub fn verify(&self, payload: &str, signature: &str) -> Result<VerifiedEvent> {
        self.provider.verify_and_parse_webhook(payload, signature)
    }

    /// Apply a verified event to the ledger
    pub async fn reconcile(&self, event: &VerifiedEvent) -> Result<ReconcileOutcome> {
        tracing::info!(event_id = %event.id, event = ?event.event, "Processing billing webhook");

        match &event.event {
            BillingEvent::CheckoutCompleted {
                session_id,
                subscription_id,
                metadata,
            } => {
                self.on_checkout_completed(session_id, subscription_id, metadata)
                    .await
            }

            BillingEvent::InvoicePaymentSucceeded { subscription_id } => {
                self.on_invoice_paid(subscription_id).await
            }

            BillingEvent::Ignored { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
                Ok(ReconcileOutcome::Ignored {
                    event_type: event_type.clone(),
                })
            }
        }
    }

    async fn on_checkout_completed(
        &self,
        session_id: &CheckoutSessionId,
        subscription_id: &SubscriptionId,
        metadata: &CheckoutMetadata,
    ) -> Result<ReconcileOutcome> {
        let snapshot = self.provider.retrieve_subscription(subscription_id).await?;
        let period_end = snapshot.period_end()?;

        let link = self
            .profiles
            .link_billing_customer(&metadata.subscriber_id, &snapshot.customer_id)
            .await?;

        if let LinkOutcome::Conflict { existing } = &link {
            tracing::warn!(
                subscriber_id = %metadata.subscriber_id,
                existing_customer = %existing,
                incoming_customer = %snapshot.customer_id,
                subscription_id = %snapshot.subscription_id,
                "Profile already linked to a different billing customer; keeping existing"
            );
        }

        let record = SubscriptionRecord {
            subscription_id: snapshot.subscription_id,
            subscriber_id: metadata.subscriber_id,
            membership_id: metadata.membership_id,
            price_reference: snapshot.price_reference,
            billing_customer_id: snapshot.customer_id,
            current_period_end: Some(period_end),
            created_at: Utc::now(),
        };

        let upsert = self.ledger.upsert_subscription(record.clone()).await?;

        // The ledger keeps the first created_at; report what is stored.
        let stored = self
            .ledger
            .find_by_subscription_id(&record.subscription_id)
            .await?;
        let record = stored.unwrap_or(record);

        tracing::info!(
            session_id = %session_id,
            subscription_id = %record.subscription_id,
            subscriber_id = %record.subscriber_id,
            membership_id = %record.membership_id,
            current_period_end = %period_end,
            upsert = ?upsert,
            "Subscription activated"
        );

        Ok(ReconcileOutcome::Activated {
            record,
            upsert,
            link,
        })
    }

    async fn on_invoice_paid(&self, subscription_id: &SubscriptionId) -> Result<ReconcileOutcome> {
        let Some(existing) = self.ledger.find_by_subscription_id(subscription_id).await? else {
            tracing::error!(
                subscription_id = %subscription_id,
                "Renewal for unknown subscription; awaiting checkout completion"
            );
            return Err(PaymentError::SequencingAnomaly(subscription_id.clone()));
        };

        let snapshot = self.provider.retrieve_subscription(subscription_id).await?;
        let period_end = snapshot.period_end()?;

        let patch = SubscriptionPatch {
            price_reference: snapshot.price_reference,
            current_period_end: Some(period_end),
        };

        let record = self
            .ledger
            .update_by_subscription_id(subscription_id, patch)
            .await?
            .ok_or_else(|| PaymentError::SequencingAnomaly(subscription_id.clone()))?;

        tracing::info!(
            subscription_id = %subscription_id,
            subscriber_id = %record.subscriber_id,
            previous_period_end = ?existing.current_period_end,
            current_period_end = %period_end,
            "Subscription renewed"
        );

        Ok(ReconcileOutcome::Renewed { record })
    }
}
