//! Shared fixtures for the HTTP integration tests: a bridge wired to fixture keys and an
//! in-memory nonce cache, plus a stand-in OAuth2 provider served on a loopback port.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Form;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use oidc_bridge::cache::{CacheError, KeyValueCache, MemoryCache};
use oidc_bridge::clock::ManualClock;
use oidc_bridge::keys::SigningKeys;
use oidc_bridge::{build_router, AppState, Config};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;

pub const CLIENT_ID: &str = "c1";
pub const REDIRECT_URI: &str = "https://rp.example.com/cb";
/// The only access token the stand-in provider accepts at its user endpoint.
pub const GOOD_ACCESS_TOKEN: &str = "at-good";

pub async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

pub fn signing_keys() -> Arc<SigningKeys> {
    let keys = SigningKeys::load(&fixture("private.pem"), Some(&fixture("public.pem")), Algorithm::RS256)
        .expect("fixture keys");
    Arc::new(keys)
}

/// Configuration pointing every upstream URL at `op`.
pub fn config_for(op: SocketAddr) -> Config {
    Config {
        op_authorize_url: format!("http://{op}/login/oauth/authorize"),
        op_token_url: format!("http://{op}/login/oauth/access_token"),
        op_userinfo_url: format!("http://{op}/user"),
        issuer: "https://bridge.example.com".to_string(),
        scope_mapping: BTreeMap::from([
            ("profile".to_string(), "read:user".to_string()),
            ("email".to_string(), "user:email".to_string()),
        ]),
        user_attribute_mapping: BTreeMap::from([
            ("id".to_string(), "sub".to_string()),
            ("login".to_string(), "preferred_username".to_string()),
            ("data::verified".to_string(), "email_verified".to_string()),
        ]),
        private_key_path: fixture("private.pem"),
        public_key_path: Some(fixture("public.pem")),
        ..Config::default()
    }
}

pub struct Bridge {
    pub app: Router,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<MemoryCache>,
    pub keys: Arc<SigningKeys>,
}

pub fn bridge(config: Config) -> Bridge {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let cache = Arc::new(MemoryCache::new(clock.clone()));
    let keys = signing_keys();
    let state = AppState::new(Arc::new(config), keys.clone(), cache.clone(), clock.clone()).expect("state");
    Bridge {
        app: build_router(state),
        clock,
        cache,
        keys,
    }
}

/// A bridge whose nonce cache rejects every operation.
pub fn bridge_with_cache(config: Config, cache: Arc<dyn KeyValueCache>) -> Router {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let state = AppState::new(Arc::new(config), signing_keys(), cache, clock).expect("state");
    build_router(state)
}

pub struct BrokenCache;

#[async_trait]
impl KeyValueCache for BrokenCache {
    async fn set(&self, _key: &str, _value: &str, _ttl: std::time::Duration) -> Result<(), CacheError> {
        Err(redis_down())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(redis_down())
    }

    fn backend(&self) -> &'static str {
        "broken"
    }
}

fn redis_down() -> CacheError {
    CacheError::Unavailable(redis::RedisError::from((redis::ErrorKind::IoError, "connection refused")))
}

pub fn profile() -> Value {
    json!({
        "id": 42,
        "login": "octocat",
        "name": "Mona Lisa",
        "email": "mona@example.com",
        "data": {"verified": true},
    })
}

/// A stand-in OAuth2 provider.
///
/// The token endpoint answers by code: `good` issues [`GOOD_ACCESS_TOKEN`], `bad` returns an
/// OAuth error with 400, `bad-200` returns an OAuth error with 200, `boom` returns a 502
/// without an error object, and any other code issues a token the user endpoint rejects.
pub async fn spawn_provider() -> SocketAddr {
    let app = Router::new()
        .route("/login/oauth/access_token", post(provider_token))
        .route("/user", get(provider_user));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });
    addr
}

async fn provider_token(Form(form): Form<HashMap<String, String>>) -> Response {
    match form.get("code").map(String::as_str) {
        Some("good") => Json(json!({
            "access_token": GOOD_ACCESS_TOKEN,
            "token_type": "bearer",
            "expires_in": 28800,
            "refresh_token": "rt-1",
        }))
        .into_response(),
        Some("bad") => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "The code is invalid"})),
        )
            .into_response(),
        Some("bad-200") => Json(json!({"error": "bad_verification_code"})).into_response(),
        Some("boom") => (StatusCode::BAD_GATEWAY, "upstream exploded").into_response(),
        Some(code) => Json(json!({"access_token": format!("at-{code}"), "token_type": "bearer"})).into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn provider_user(headers: HeaderMap) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {GOOD_ACCESS_TOKEN}"));
    if authorized {
        Json(profile()).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"}))).into_response()
    }
}

/// Verifies `token` against the published JWK components and returns its claims.
pub fn verify_id_token(keys: &SigningKeys, token: &str, audience: &str, issuer: &str) -> Map<String, Value> {
    let (n, e) = keys.public_components();
    let key = DecodingKey::from_rsa_components(&n, &e).expect("decoding key");
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[audience]);
    validation.set_issuer(&[issuer]);
    jsonwebtoken::decode::<Map<String, Value>>(token, &key, &validation)
        .expect("valid id_token")
        .claims
}
