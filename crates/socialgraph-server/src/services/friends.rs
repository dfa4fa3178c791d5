use std::sync::Arc;

use socialgraph_cache::{CacheAside, Scope};

use super::{ServiceError, ServiceResult, SystemOfRecord};

#[derive(Clone)]
pub struct FriendService {
    records: Arc<dyn SystemOfRecord>,
    cache: CacheAside,
}

impl FriendService {
    pub fn new(records: Arc<dyn SystemOfRecord>, cache: CacheAside) -> Self {
        Self { records, cache }
    }

    pub async fn add_friend(&self, user_id: i64, friend_id: i64) -> ServiceResult<()> {
        if user_id == friend_id {
            return Err(ServiceError::validation("cannot befriend yourself"));
        }
        self.records.add_friend(user_id, friend_id).await?;
        self.cache.invalidate_scope_detached(Scope::feed(user_id)).await;
        Ok(())
    }

    pub async fn remove_friend(&self, user_id: i64, friend_id: i64) -> ServiceResult<()> {
        self.records.remove_friend(user_id, friend_id).await?;
        self.cache.invalidate_scope_detached(Scope::feed(user_id)).await;
        Ok(())
    }
}
