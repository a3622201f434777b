use crate::db::{Cache, CacheError, CacheKey};

/// Drops every cached suggestion list of a user after a watch-state change
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Cache,
}

impl CacheInvalidator {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// Removes all `moviesuggestion-<user>-*` entries, whatever their count
    ///
    /// Keys are listed at call time, so no set of counts is assumed. Every key
    /// is attempted even after a failed delete; the first failure is returned.
    ///
    /// The user's generation is advanced before listing, so a suggestion
    /// computed concurrently from the old watch state is never kept.
    pub async fn invalidate_user(&self, user_id: i64) -> Result<usize, CacheError> {
        let generation = self.cache.advance_generation(user_id);
        let prefix = CacheKey::suggestions_prefix(user_id);
        let keys = self.cache.keys_with_prefix(&prefix).await?;

        let mut removed = 0;
        let mut first_error = None;

        for key in &keys {
            match self.cache.delete_key(key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(user_id = user_id, key = %key, error = %e, "Failed to delete cache entry");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        tracing::info!(
            user_id = user_id,
            removed = removed,
            generation = generation,
            backend = self.cache.backend(),
            "Suggestion cache invalidated"
        );

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::SuggestionResult;
    use std::sync::Arc;
    use std::time::Duration;

    async fn seed(cache: &Cache, user_id: i64, count: u32) -> CacheKey {
        let key = CacheKey::Suggestions { user_id, count };
        let value: SuggestionResult = Vec::new();
        cache
            .set_in_cache(&key, &value, Duration::from_secs(60))
            .await
            .unwrap();
        key
    }

    async fn is_cached(cache: &Cache, key: &CacheKey) -> bool {
        let value: Option<SuggestionResult> = cache.get_from_cache(key).await.unwrap();
        value.is_some()
    }

    #[tokio::test]
    async fn test_invalidation_is_user_wide() {
        let cache = Cache::new(Arc::new(MemoryStore::new()));
        let three = seed(&cache, 7, 3).await;
        let five = seed(&cache, 7, 5).await;
        let other_user = seed(&cache, 8, 5).await;
        let similar_user = seed(&cache, 70, 5).await;

        let removed = CacheInvalidator::new(cache.clone())
            .invalidate_user(7)
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert!(!is_cached(&cache, &three).await);
        assert!(!is_cached(&cache, &five).await);
        assert!(is_cached(&cache, &other_user).await);
        assert!(is_cached(&cache, &similar_user).await);
    }

    #[tokio::test]
    async fn test_invalidating_empty_user_is_noop() {
        let invalidator = CacheInvalidator::new(Cache::new(Arc::new(MemoryStore::new())));

        assert_eq!(invalidator.invalidate_user(7).await.unwrap(), 0);
        assert_eq!(invalidator.invalidate_user(7).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidation_advances_generation() {
        let cache = Cache::new(Arc::new(MemoryStore::new()));
        let invalidator = CacheInvalidator::new(cache.clone());

        invalidator.invalidate_user(7).await.unwrap();
        invalidator.invalidate_user(7).await.unwrap();

        assert_eq!(cache.generation(7), 2);
        assert_eq!(cache.generation(8), 0);
    }

    #[tokio::test]
    async fn test_popular_pages_survive_invalidation() {
        let cache = Cache::new(Arc::new(MemoryStore::new()));
        let page = CacheKey::PopularPage {
            language: "en-US".to_string(),
            page: 1,
        };
        let value: SuggestionResult = Vec::new();
        cache
            .set_in_cache(&page, &value, Duration::from_secs(60))
            .await
            .unwrap();

        CacheInvalidator::new(cache.clone())
            .invalidate_user(1)
            .await
            .unwrap();

        assert!(is_cached(&cache, &page).await);
    }
}
