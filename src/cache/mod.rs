//! Key-value storage with TTL, used to hold nonce bindings between `/authorize` and `/token`.
//!
//! Two interchangeable backends exist: a shared Redis instance and a process-local map.
//! The backend is chosen exactly once at startup by [`select_backend`]; a Redis address that
//! fails its liveness probe degrades the whole process to the local map for its lifetime.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::Clock;

pub mod memory;
pub mod redis;

pub use memory::MemoryCache;
pub use self::redis::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(#[from] ::redis::RedisError),
}

#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value, for `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Returns the live value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Resolves the cache backend for the process.
///
/// With a Redis address configured, a connection is opened and probed with `PING`. Any failure
/// falls back to a [`MemoryCache`] whose background sweep runs every `sweep_interval`.
pub async fn select_backend(
    redis_addr: Option<&str>,
    clock: Arc<dyn Clock>,
    sweep_interval: Duration,
) -> Arc<dyn KeyValueCache> {
    if let Some(addr) = redis_addr.filter(|a| !a.trim().is_empty()) {
        match RedisCache::connect(addr).await {
            Ok(cache) => {
                info!(redis_addr = %addr, "Connected to Redis, using shared nonce cache.");
                return Arc::new(cache);
            }
            Err(e) => {
                warn!(redis_addr = %addr, error = %e, "Redis liveness probe failed. Falling back to in-memory nonce cache.");
            }
        }
    } else {
        info!("Redis not configured, using in-memory nonce cache.");
    }

    let cache = Arc::new(MemoryCache::new(clock));
    tokio::spawn(memory::start_sweep_task(cache.clone(), sweep_interval));
    cache
}
