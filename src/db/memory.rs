use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::cache::{CacheError, CacheStore};

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    created_at: Instant,
    ttl: Duration,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

/// In-process cache store backed by a concurrent map
///
/// Expiry is lazy on `get` and active through [`MemoryStore::start_purger`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredEntry>>,
}

/// Handle for stopping the background purge task
pub struct CachePurgerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CachePurgerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache purger shutdown signal sent");
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every expired entry, returning how many were evicted
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawns a task evicting expired entries every `interval`
    pub fn start_purger(&self, interval: Duration) -> CachePurgerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let store = self.clone();

        tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "Cache purger started");
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately and there is nothing to purge yet
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = store.purge_expired();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = store.len(), "Purged expired cache entries");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Cache purger stopped");
                        break;
                    }
                }
            }
        });

        CachePurgerHandle { shutdown_tx }
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        // The read guard is released above; removing while holding it would deadlock
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
