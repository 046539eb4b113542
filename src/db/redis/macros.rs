/// Read-through caching around an async computation.
///
/// Checks the cache for `$key`; on a hit the cached value is returned, on a
/// miss `$block` is awaited, its result stored with `$ttl` seconds to live
/// (via the non-blocking background writer), and returned.
///
/// # Example
/// ```rust,ignore
/// let similar = cached!(cache, key, ttl, service.similar_programs(id, limit));
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_from_cache(&$key).await? {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set_in_background(&$key, &value, $ttl);
            Ok(value)
        }
    }};
}
