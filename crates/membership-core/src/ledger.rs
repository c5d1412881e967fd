//! Subscription Ledger
//!
//! Durable local mirror of provider subscription state, plus the profile-side
//! billing customer link. Every mutation is keyed by a single id and is safe to
//! re-apply with identical inputs, because webhook delivery is at-least-once.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{LedgerError, Result};
use crate::model::{
    BillingCustomerId, SubscriberId, SubscriberProfile, SubscriptionId, SubscriptionPatch,
    SubscriptionRecord,
};

/// Result of an upsert keyed by subscription id
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed for the subscription id
    Inserted,
    /// An existing record was changed
    Updated,
    /// Re-application of an identical write
    Unchanged,
}

/// Result of linking a billing customer onto a profile
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Profile had no customer; now linked
    Linked,
    /// Profile was already linked to the same customer
    AlreadyLinked,
    /// Profile is linked to a different customer, which was kept
    Conflict { existing: BillingCustomerId },
}

/// Subscription record storage
///
/// Implementations must make `upsert_subscription` and
/// `update_by_subscription_id` atomic per subscription id, so that two
/// concurrent identical writes converge.
#[async_trait]
pub trait SubscriptionLedger: Send + Sync {
    /// Insert or replace the record for `record.subscription_id`.
    ///
    /// An existing record keeps its original `created_at`.
    async fn upsert_subscription(&self, record: SubscriptionRecord) -> Result<UpsertOutcome>;

    /// Get record by subscription id
    async fn find_by_subscription_id(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>>;

    /// All records held by a subscriber, active or not
    async fn find_by_subscriber(&self, subscriber_id: &SubscriberId)
        -> Result<Vec<SubscriptionRecord>>;

    /// Apply a renewal patch in place. Returns `None` when no record exists.
    async fn update_by_subscription_id(
        &self,
        subscription_id: &SubscriptionId,
        patch: SubscriptionPatch,
    ) -> Result<Option<SubscriptionRecord>>;
}

/// Subscriber profile storage (billing fields only)
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Get profile by id
    async fn get_profile(&self, id: &SubscriberId) -> Result<Option<SubscriberProfile>>;

    /// Link a billing customer onto the profile, first write wins
    async fn link_billing_customer(
        &self,
        subscriber_id: &SubscriberId,
        customer_id: &BillingCustomerId,
    ) -> Result<LinkOutcome>;
}

/// In-memory ledger and profile store (for development and tests)
pub struct MemoryLedger {
    subscriptions: RwLock<HashMap<SubscriptionId, SubscriptionRecord>>,
    profiles: RwLock<HashMap<SubscriberId, SubscriberProfile>>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
        }
    }

    /// Register a profile created at signup. Existing profiles are left alone.
    pub async fn register_profile(&self, profile: SubscriberProfile) {
        self.profiles
            .write()
            .await
            .entry(profile.id)
            .or_insert(profile);
    }

    /// Number of stored subscription records
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

#[async_trait]
impl SubscriptionLedger for MemoryLedger {
    async fn upsert_subscription(&self, mut record: SubscriptionRecord) -> Result<UpsertOutcome> {
        let mut subscriptions = self.subscriptions.write().await;

        let outcome = match subscriptions.get(&record.subscription_id) {
            None => UpsertOutcome::Inserted,
            Some(existing) => {
                record.created_at = existing.created_at;
                if *existing == record {
                    UpsertOutcome::Unchanged
                } else {
                    UpsertOutcome::Updated
                }
            }
        };

        subscriptions.insert(record.subscription_id.clone(), record);
        Ok(outcome)
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>> {
        Ok(self.subscriptions.read().await.get(subscription_id).cloned())
    }

    async fn find_by_subscriber(
        &self,
        subscriber_id: &SubscriberId,
    ) -> Result<Vec<SubscriptionRecord>> {
        let subscriptions = self.subscriptions.read().await;
        let mut records: Vec<_> = subscriptions
            .values()
            .filter(|r| &r.subscriber_id == subscriber_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn update_by_subscription_id(
        &self,
        subscription_id: &SubscriptionId,
        patch: SubscriptionPatch,
    ) -> Result<Option<SubscriptionRecord>> {
        let mut subscriptions = self.subscriptions.write().await;

        Ok(subscriptions.get_mut(subscription_id).map(|record| {
            patch.apply(record);
            record.clone()
        }))
    }
}

#[async_trait]
impl ProfileStore for MemoryLedger {
    async fn get_profile(&self, id: &SubscriberId) -> Result<Option<SubscriberProfile>> {
        Ok(self.profiles.read().await.get(id).cloned())
    }

    async fn link_billing_customer(
        &self,
        subscriber_id: &SubscriberId,
        customer_id: &BillingCustomerId,
    ) -> Result<LinkOutcome> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .get_mut(subscriber_id)
            .ok_or(LedgerError::ProfileNotFound(*subscriber_id))?;

        Ok(match &profile.billing_customer_id {
            None => {
                profile.billing_customer_id = Some(customer_id.clone());
                LinkOutcome::Linked
            }
            Some(existing) if existing == customer_id => LinkOutcome::AlreadyLinked,
            Some(existing) => LinkOutcome::Conflict {
                existing: existing.clone(),
            },
        })
    }
}
