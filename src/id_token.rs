//! ID token construction and signing.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use crate::clock::Clock;
use crate::keys::{KeyError, SigningKeys};

#[derive(Clone)]
pub struct IdTokenIssuer {
    keys: Arc<SigningKeys>,
    lifetime_secs: i64,
    clock: Arc<dyn Clock>,
}

impl IdTokenIssuer {
    pub fn new(keys: Arc<SigningKeys>, lifetime_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            keys,
            lifetime_secs,
            clock,
        }
    }

    /// Assembles the final claim set.
    ///
    /// Mapped user claims go in first; `iss`, `aud`, `iat`, `exp` and `nonce` are written after
    /// them, so an upstream attribute can never spoof a registered claim.
    pub fn claims(&self, issuer: &str, client_id: &str, mapped: Map<String, Value>, nonce: Option<String>) -> Map<String, Value> {
        let iat = self.clock.now().timestamp();
        let mut claims = mapped;

        claims.insert("iss".to_string(), Value::String(issuer.to_string()));
        claims.insert("aud".to_string(), Value::String(client_id.to_string()));
        claims.insert("iat".to_string(), Value::from(iat));
        claims.insert("exp".to_string(), Value::from(iat.saturating_add(self.lifetime_secs)));

        match nonce {
            Some(nonce) => {
                claims.insert("nonce".to_string(), Value::String(nonce));
            }
            None => {
                claims.remove("nonce");
            }
        }

        claims
    }

    pub fn issue(&self, issuer: &str, client_id: &str, mapped: Map<String, Value>, nonce: Option<String>) -> Result<String, KeyError> {
        let with_nonce = nonce.is_some();
        let claims = self.claims(issuer, client_id, mapped, nonce);
        let token = self.keys.sign(&claims)?;
        info!(client_id, issuer, with_nonce, claim_count = claims.len(), "Issued ID Token");
        Ok(token)
    }
}
