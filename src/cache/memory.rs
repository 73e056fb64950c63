use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{CacheError, KeyValueCache};
use crate::clock::Clock;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local cache with absolute expiry timestamps.
///
/// Reads check expiry lazily, so correctness never depends on the sweep having run.
/// [`start_sweep_task`] only bounds memory.
pub struct MemoryCache {
    // Readers share the lock; set and sweep take it exclusively.
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Removes every expired entry and returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let initial_len = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        initial_len - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = CacheEntry {
            value: value.to_string(),
            expires_at,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

// Periodically drops expired entries, independent of request traffic.
pub async fn start_sweep_task(cache: Arc<MemoryCache>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately; skip it so the first sweep happens one period in.
    interval.tick().await;

    loop {
        interval.tick().await;
        let removed = cache.sweep().await;
        debug!(removed, "Nonce cache sweep removed {} expired entr(ies).", removed);
    }
}
