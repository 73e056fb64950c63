//! Binds an authorization request's nonce to its `(client_id, redirect_uri)` pair until the
//! matching token request reads it back.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheError, KeyValueCache};

#[derive(Clone)]
pub struct NonceStore {
    cache: Arc<dyn KeyValueCache>,
    ttl: Duration,
}

impl NonceStore {
    pub fn new(cache: Arc<dyn KeyValueCache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Binds `nonce` to the pair, replacing any earlier binding.
    pub async fn put(&self, client_id: &str, redirect_uri: &str, nonce: &str) -> Result<(), CacheError> {
        let key = nonce_key(client_id, redirect_uri);
        self.cache.set(&key, nonce, self.ttl).await?;
        debug!(backend = self.cache.backend(), key = %key, "Stored nonce binding.");
        Ok(())
    }

    /// Reads the binding without consuming it. Expired bindings are reported as `None`.
    pub async fn get(&self, client_id: &str, redirect_uri: &str) -> Result<Option<String>, CacheError> {
        let key = nonce_key(client_id, redirect_uri);
        let nonce = self.cache.get(&key).await?;
        if nonce.is_none() {
            debug!(backend = self.cache.backend(), key = %key, "Nonce not found.");
        }
        Ok(nonce)
    }

    pub fn backend(&self) -> &'static str {
        self.cache.backend()
    }
}

pub fn nonce_key(client_id: &str, redirect_uri: &str) -> String {
    format!("nonce:{client_id}:{redirect_uri}")
}
