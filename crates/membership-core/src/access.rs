//! Access Evaluation
//!
//! Decides whether a viewer may see the full body of a content item. The
//! evaluation is pure: the caller supplies the viewer, the viewer's complete
//! subscription snapshot and the evaluation instant.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{ContentItem, SubscriberId, SubscriptionRecord};

/// Outcome of an access evaluation, with the rule that decided it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AccessDecision {
    /// Item has no gating membership
    Public,
    /// Viewer authored the item
    Owner,
    /// Viewer holds a paid-through subscription for the gating membership
    Subscribed { until: DateTime<Utc> },
    /// Gated and no matching active subscription
    Denied,
}

impl AccessDecision {
    pub const fn is_granted(&self) -> bool {
        !matches!(self, Self::Denied)
    }
}

/// Evaluate access for `viewer` (anonymous when `None`).
///
/// Rules, first match wins:
/// 1. ungated items are public
/// 2. owners always see their own items
/// 3. otherwise a record for the gating membership must have
///    `current_period_end >= now`
pub fn evaluate(
    viewer: Option<&SubscriberId>,
    item: &ContentItem,
    subscriptions: &[SubscriptionRecord],
    now: DateTime<Utc>,
) -> AccessDecision {
    let Some(gating) = item.gating_membership_id else {
        return AccessDecision::Public;
    };

    if viewer == Some(&item.owner_id) {
        return AccessDecision::Owner;
    }

    // The snapshot belongs to the viewer; anonymous viewers hold nothing.
    if viewer.is_none() {
        return AccessDecision::Denied;
    }

    subscriptions
        .iter()
        .filter(|s| s.membership_id == gating && s.is_active_at(now))
        .filter_map(|s| s.current_period_end)
        .max()
        .map_or(AccessDecision::Denied, |until| AccessDecision::Subscribed {
            until,
        })
}

/// Boolean form of [`evaluate`]
pub fn can_access(
    viewer: Option<&SubscriberId>,
    item: &ContentItem,
    subscriptions: &[SubscriptionRecord],
    now: DateTime<Utc>,
) -> bool {
    evaluate(viewer, item, subscriptions, now).is_granted()
}

/// Evaluate a listing (feed, member page) against one snapshot
pub fn visible_items<'a>(
    viewer: Option<&SubscriberId>,
    items: &'a [ContentItem],
    subscriptions: &[SubscriptionRecord],
    now: DateTime<Utc>,
) -> Vec<(&'a ContentItem, AccessDecision)> {
    items
        .iter()
        .map(|item| (item, evaluate(viewer, item, subscriptions, now)))
        .collect()
}
