/// A macro to simplify cache-aside logic.
///
/// Checks whether a value is present in the cache and returns it on a hit.
/// On a miss it executes the provided block to fetch the value, stores the
/// result under the key's operation TTL, and returns it. Provider failures
/// propagate unchanged - nothing is fabricated on a miss.
///
/// # Arguments
/// * `$cache`: A [`Cache`](crate::db::Cache) handle (degraded-mode tolerant,
///   so a broken backing store only ever produces misses here).
/// * `$key`: The [`CacheKey`](crate::db::CacheKey) for the value.
/// * `$block`: The async block executed when the value is not cached.
///
/// # Example
/// ```rust,ignore
/// let page = cached!(self.cache, CacheKey::Trending("day".into()), async move {
///     self.provider.trending("day").await
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_json(&$key).await {
            tracing::debug!(key = %$key, "Cache hit");
            Ok(cached)
        } else {
            tracing::debug!(key = %$key, "Cache miss");
            let value = $block.await?;
            $cache.put_json(&$key, &value).await;
            Ok(value)
        }
    }};
}
