//! TTL Cleanup Task
//!
//! Background task that periodically removes expired entries from both
//! cache layers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::TwoLayerCache;

/// Spawns a background task that periodically sweeps expired entries.
///
/// The task runs in an infinite loop, sleeping for the configured
/// interval between sweeps and taking the write lock only for the sweep
/// itself. It never blocks shutdown: abort the returned handle (or hand
/// it to [`TwoLayerCache::attach_sweep`] so `destroy()` stops it).
///
/// # Arguments
/// * `cache` - Shared reference to the cache
/// * `cleanup_interval_ms` - Interval in milliseconds between sweeps
///
/// # Example
/// ```ignore
/// let cache = Arc::new(RwLock::new(TwoLayerCache::new(&config)?));
/// let handle = spawn_cleanup_task(cache.clone(), config.cleanup_interval_ms);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(
    cache: Arc<RwLock<TwoLayerCache>>,
    cleanup_interval_ms: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_millis(cleanup_interval_ms);

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} ms",
            cleanup_interval_ms
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            // Acquire write lock and sweep both layers
            let removed = {
                let mut cache_guard = cache.write().await;
                cache_guard.cleanup()
            };

            // Log sweep statistics
            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::key::CacheKey;
    use serde_json::json;
    use std::time::Duration;

    fn shared_cache() -> Arc<RwLock<TwoLayerCache>> {
        Arc::new(RwLock::new(TwoLayerCache::new(&Config::default()).unwrap()))
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let cache = shared_cache();

        // Add an entry with a very short TTL
        {
            let mut cache_guard = cache.write().await;
            cache_guard
                .set(&CacheKey::primary("user", 1), json!("value"), Some(50))
                .unwrap();
        }

        // Spawn cleanup task with a 100 ms interval
        let handle = spawn_cleanup_task(cache.clone(), 100);

        // Wait for the entry to expire and the sweep to run
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Verify the entry was removed by the sweep, not by a read
        {
            let cache_guard = cache.read().await;
            assert_eq!(cache_guard.sizes().item_count, 0);
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let cache = shared_cache();

        {
            let mut cache_guard = cache.write().await;
            cache_guard
                .set(&CacheKey::primary("user", 1), json!("value"), Some(60_000))
                .unwrap();
        }

        let handle = spawn_cleanup_task(cache.clone(), 100);
        tokio::time::sleep(Duration::from_millis(300)).await;

        {
            let mut cache_guard = cache.write().await;
            let value = cache_guard.get(&CacheKey::primary("user", 1));
            assert_eq!(value, Some(json!("value")));
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let cache = shared_cache();

        let handle = spawn_cleanup_task(cache, 100);

        // Abort immediately
        handle.abort();

        // Wait a bit and verify the task is finished
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
