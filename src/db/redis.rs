use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

use super::cache::{CacheError, CacheStore};

const SCAN_BATCH: usize = 200;

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Cache store backed by Redis
///
/// Expiry is delegated to Redis (`SET EX`), so no purge task is needed.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects through a connection manager that reconnects on failure
    pub async fn connect(client: Client) -> Result<Self, CacheError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Escapes glob metacharacters so a key prefix matches literally in SCAN
    fn match_pattern(prefix: &str) -> String {
        let mut pattern = String::with_capacity(prefix.len() + 1);
        for c in prefix.chars() {
            if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('*');
        pattern
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(key).await?;
        Ok(cached)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs();

        // Redis rejects a zero expiry; an entry that is already expired is simply absent
        if secs == 0 {
            let _: () = conn.del(key).await?;
            return Ok(());
        }

        let _: () = conn.set_ex(key, value, secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.scan("*").await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        self.scan(&Self::match_pattern(prefix)).await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CacheKey;

    #[test]
    fn test_match_pattern_for_user_prefix() {
        let prefix = CacheKey::suggestions_prefix(42);
        assert_eq!(RedisStore::match_pattern(&prefix), "moviesuggestion-42-*");
    }

    #[test]
    fn test_match_pattern_escapes_glob_characters() {
        assert_eq!(RedisStore::match_pattern("a*b?[c]"), r"a\*b\?\[c\]*");
    }

    // Requires a running Redis; run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_redis_set_get_delete() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let client = create_redis_client(&redis_url).unwrap();
        let store = RedisStore::connect(client).await.unwrap();

        let key = "moviesuggestion-999999-3";
        store
            .set(key, "[]".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get(key).await.unwrap(), Some("[]".to_string()));

        let keys = store
            .keys_with_prefix(&CacheKey::suggestions_prefix(999999))
            .await
            .unwrap();
        assert_eq!(keys, vec![key.to_string()]);

        assert!(store.delete(key).await.unwrap());
        assert_eq!(store.get(key).await.unwrap(), None);
    }
}
