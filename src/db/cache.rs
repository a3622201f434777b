use dashmap::DashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

/// Errors raised by a cache backend
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A suggestion list computed for one user and one requested length
    Suggestions { user_id: i64, count: u32 },
    /// One page of the popularity feed
    PopularPage { language: String, page: u32 },
}

impl CacheKey {
    /// Prefix shared by every suggestion key of a user, whatever the count.
    ///
    /// Ends with the separator so that user 7 never matches user 70.
    pub fn suggestions_prefix(user_id: i64) -> String {
        format!("moviesuggestion-{}-", user_id)
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Suggestions { user_id, count } => {
                write!(f, "{}{}", Self::suggestions_prefix(*user_id), count)
            }
            CacheKey::PopularPage { language, page } => {
                write!(f, "popular:{}:{}", language.to_lowercase(), page)
            }
        }
    }
}

/// Key/value store with per-entry expiry
///
/// Implementations serialize their own internal mutations; callers never lock.
/// An expired entry must read as a miss even if it has not been evicted yet.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Inserts or overwrites `key`. A zero `ttl` leaves nothing readable.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Removes `key`, returning whether an entry was present
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        Ok(self
            .keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Typed cache handle shared by the aggregator, the invalidator and routes
///
/// Values are stored as JSON, so whatever is read back is exactly what was
/// written at insertion time.
///
/// Each user also has a suggestion generation, advanced on every invalidation.
/// A computation that started under an older generation must not leave its
/// result in the store.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    generations: Arc<DashMap<i64, u64>>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            generations: Arc::new(DashMap::new()),
        }
    }

    /// Current suggestion generation of a user, 0 until the first invalidation
    pub fn generation(&self, user_id: i64) -> u64 {
        self.generations.get(&user_id).map(|g| *g).unwrap_or(0)
    }

    /// Starts a new suggestion generation for a user and returns it
    pub fn advance_generation(&self, user_id: i64) -> u64 {
        let mut generation = self.generations.entry(user_id).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Retrieves a value from the cache by key
    ///
    /// Returns `None` when the key is absent or expired.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> Result<Option<T>, CacheError> {
        match self.store.get(&key.to_string()).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Serializes and stores a value, overwriting any previous entry
    pub async fn set_in_cache<T: serde::Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        self.store.set(&key.to_string(), json, ttl).await
    }

    pub async fn delete_key(&self, key: &str) -> Result<bool, CacheError> {
        self.store.delete(key).await
    }

    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        self.store.keys_with_prefix(prefix).await
    }

    pub fn backend(&self) -> &'static str {
        self.store.name()
    }
}
