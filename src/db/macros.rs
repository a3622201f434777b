/// Read-through caching over a [`Cache`](crate::db::Cache).
///
/// Returns the cached value when present. Otherwise awaits `$block`, stores its
/// value, and returns it. An error from `$block` is propagated with `?` and
/// nothing is stored, so failures are never cached.
///
/// The cache itself is best-effort: a failed read is logged and treated as a
/// miss, and a failed write is logged while the computed value is still
/// returned.
///
/// # Arguments
/// * `$cache`: The cache instance to use for retrieval and storage.
/// * `$key`: The [`CacheKey`](crate::db::CacheKey) for the value.
/// * `$ttl`: The time-to-live as a `std::time::Duration`.
/// * `$block`: A future computing the value on a miss.
///
/// # Example
/// ```rust,ignore
/// async fn popular(cache: &Cache, key: CacheKey) -> AppResult<Vec<CandidateMovie>> {
///     cached!(cache, key, TTL, async move { fetch_popular().await })
/// }
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        let cached = match $cache.get_from_cache(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Cache read failed, treating as miss");
                None
            }
        };

        if let Some(cached) = cached {
            tracing::debug!(key = %key, "Cache hit");
            Ok(cached)
        } else {
            tracing::debug!(key = %key, "Cache miss");
            let value = $block.await?;
            if let Err(e) = $cache.set_in_cache(&key, &value, $ttl).await {
                tracing::warn!(error = %e, key = %key, "Cache write failed, returning uncached value");
            }
            Ok(value)
        }
    }};
}
