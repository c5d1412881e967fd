//! Content Catalog
//!
//! Read-only view of posts and membership tiers. Authoring lives outside the
//! billing core; this is the narrow lookup the access check needs.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::{ContentId, ContentItem, MembershipId, MembershipTier, SubscriberId};

/// Content and membership lookup
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    async fn get_content(&self, id: &ContentId) -> Result<Option<ContentItem>>;

    async fn get_membership(&self, id: &MembershipId) -> Result<Option<MembershipTier>>;

    /// Items authored by `owner_id`, newest first
    async fn content_by_owner(&self, owner_id: &SubscriberId) -> Result<Vec<ContentItem>>;
}

/// In-memory catalog (for development and tests)
#[derive(Default)]
pub struct MemoryCatalog {
    content: RwLock<HashMap<ContentId, ContentItem>>,
    memberships: RwLock<HashMap<MembershipId, MembershipTier>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_content(&self, item: ContentItem) {
        self.content.write().await.insert(item.id, item);
    }

    pub async fn insert_membership(&self, tier: MembershipTier) {
        self.memberships.write().await.insert(tier.id, tier);
    }
}

#[async_trait]
impl ContentCatalog for MemoryCatalog {
    async fn get_content(&self, id: &ContentId) -> Result<Option<ContentItem>> {
        Ok(self.content.read().await.get(id).cloned())
    }

    async fn get_membership(&self, id: &MembershipId) -> Result<Option<MembershipTier>> {
        Ok(self.memberships.read().await.get(id).cloned())
    }

    async fn content_by_owner(&self, owner_id: &SubscriberId) -> Result<Vec<ContentItem>> {
        let content = self.content.read().await;
        let mut items: Vec<_> = content
            .values()
            .filter(|item| &item.owner_id == owner_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }
}
