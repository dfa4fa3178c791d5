use std::sync::Arc;

use socialgraph_cache::{CacheAside, PageRequest, Scope};

use super::{ServiceError, ServiceResult, SystemOfRecord};
use crate::models::{SearchResponse, UserProfile};

#[derive(Clone)]
pub struct UserService {
    records: Arc<dyn SystemOfRecord>,
    cache: CacheAside,
}

impl UserService {
    pub fn new(records: Arc<dyn SystemOfRecord>, cache: CacheAside) -> Self {
        Self { records, cache }
    }

    pub async fn profile(&self, user_id: i64) -> ServiceResult<UserProfile> {
        self.cache
            .get_or_populate(&Scope::user_profile(user_id), None, || {
                self.records.fetch_user_profile(user_id)
            })
            .await
    }

    /// Name-prefix search. Both names are required.
    pub async fn search(
        &self,
        first_name: &str,
        last_name: &str,
        page: PageRequest,
    ) -> ServiceResult<SearchResponse> {
        let (first_name, last_name) = (first_name.trim(), last_name.trim());
        if first_name.is_empty() || last_name.is_empty() {
            return Err(ServiceError::validation("first_name and last_name are required"));
        }

        self.cache
            .get_or_populate(&Scope::search(first_name, last_name), Some(page), || async {
                let (users, total) = self
                    .records
                    .search_users(first_name, last_name, page.limit(), page.offset())
                    .await?;
                Ok::<_, ServiceError>(SearchResponse::new(users, total, page))
            })
            .await
    }
}
