//! Domain Model
//!
//! Records shared by the ledger, the webhook reconciler and the access evaluator.
//! Local identities are UUIDs; identifiers minted by the billing provider are
//! opaque strings and are never recomputed locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned by this platform (profiles, memberships, content)
macro_rules! local_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// Identifier minted by the billing provider
macro_rules! provider_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

local_id!(
    /// Viewer identity; equal to the identity provider's user id
    SubscriberId
);
local_id!(
    /// Membership tier id
    MembershipId
);
local_id!(
    /// Content item (post) id
    ContentId
);

provider_id!(
    /// External subscription id (`sub_...`), the ledger's dedup key
    SubscriptionId
);
provider_id!(
    /// External billing customer id (`cus_...`)
    BillingCustomerId
);
provider_id!(
    /// External price object id (`price_...`)
    PriceReference
);
provider_id!(
    /// Hosted checkout session id (`cs_...`)
    CheckoutSessionId
);

/// A published post, optionally gated behind a membership tier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,

    /// Author
    pub owner_id: SubscriberId,

    /// `None` means publicly visible
    pub gating_membership_id: Option<MembershipId>,

    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    /// Create a public item
    pub fn public(owner_id: SubscriberId) -> Self {
        Self {
            id: ContentId::new(),
            owner_id,
            gating_membership_id: None,
            created_at: Utc::now(),
        }
    }

    /// Create an item gated behind `membership_id`
    pub fn gated(owner_id: SubscriberId, membership_id: MembershipId) -> Self {
        Self {
            gating_membership_id: Some(membership_id),
            ..Self::public(owner_id)
        }
    }
}

/// A purchasable recurring plan defined by a content owner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipTier {
    pub id: MembershipId,
    pub owner_id: SubscriberId,
    pub price_reference: PriceReference,
    pub title: String,
}

/// Billing-side view of a platform user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberProfile {
    pub id: SubscriberId,

    /// Linked on first successful payment; never replaced afterwards
    pub billing_customer_id: Option<BillingCustomerId>,
}

impl SubscriberProfile {
    pub const fn new(id: SubscriberId) -> Self {
        Self {
            id,
            billing_customer_id: None,
        }
    }
}

/// Local mirror of one external subscription
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Unique key
    pub subscription_id: SubscriptionId,

    pub subscriber_id: SubscriberId,

    pub membership_id: MembershipId,

    pub price_reference: PriceReference,

    pub billing_customer_id: BillingCustomerId,

    /// Paid-through instant; the only field access decisions look at
    pub current_period_end: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// Whether this record pays for `now` (inclusive of the end instant)
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.current_period_end.is_some_and(|end| end >= now)
    }
}

/// Fields a renewal is allowed to change
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionPatch {
    pub price_reference: PriceReference,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl SubscriptionPatch {
    pub fn apply(self, record: &mut SubscriptionRecord) {
        record.price_reference = self.price_reference;
        record.current_period_end = self.current_period_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(end: Option<DateTime<Utc>>) -> SubscriptionRecord {
        SubscriptionRecord {
            subscription_id: "sub_1".into(),
            subscriber_id: SubscriberId::new(),
            membership_id: MembershipId::new(),
            price_reference: "price_1".into(),
            billing_customer_id: "cus_1".into(),
            current_period_end: end,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_period_end_is_inclusive() {
        let now = Utc::now();
        assert!(record(Some(now)).is_active_at(now));
        assert!(!record(Some(now - Duration::seconds(1))).is_active_at(now));
        assert!(!record(None).is_active_at(now));
    }

    #[test]
    fn test_local_id_parse() {
        let id = SubscriberId::new();
        let parsed: SubscriberId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<MembershipId>().is_err());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&SubscriptionId::new("sub_42")).unwrap();
        assert_eq!(json, "\"sub_42\"");
    }

    #[test]
    fn test_patch_only_touches_price_and_period() {
        let mut rec = record(None);
        let before = rec.clone();
        let end = Utc::now();
        SubscriptionPatch {
            price_reference: "price_2".into(),
            current_period_end: Some(end),
        }
        .apply(&mut rec);

        assert_eq!(rec.price_reference.as_str(), "price_2");
        assert_eq!(rec.current_period_end, Some(end));
        assert_eq!(rec.subscriber_id, before.subscriber_id);
        assert_eq!(rec.created_at, before.created_at);
    }
}
