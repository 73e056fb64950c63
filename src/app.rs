//! Shared application state and HTTP routing.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tracing::{debug, warn};

use crate::cache::KeyValueCache;
use crate::clock::Clock;
use crate::config::Config;
use crate::handlers::{authorize, discovery, token, userinfo};
use crate::id_token::IdTokenIssuer;
use crate::keys::SigningKeys;
use crate::nonce::NonceStore;
use crate::upstream::{UpstreamClient, UpstreamError};

/// Everything a handler needs. Built once before the listener starts; cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub keys: Arc<SigningKeys>,
    pub nonces: NonceStore,
    pub upstream: UpstreamClient,
    pub id_tokens: IdTokenIssuer,
    pub allowed_origins: Arc<HashSet<String>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        keys: Arc<SigningKeys>,
        cache: Arc<dyn KeyValueCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, UpstreamError> {
        let upstream = UpstreamClient::new(config.op_token_url.clone(), config.op_userinfo_url.clone())?;
        let nonces = NonceStore::new(cache, config.nonce_ttl());
        let id_tokens = IdTokenIssuer::new(keys.clone(), config.id_token_lifetime_secs(), clock);
        let allowed_origins = config
            .cors_allowed_origins
            .iter()
            .map(|origin| origin.trim_end_matches('/').to_string())
            .collect();

        Ok(Self {
            config,
            keys,
            nonces,
            upstream,
            id_tokens,
            allowed_origins: Arc::new(allowed_origins),
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    // Browser navigation; never a CORS request.
    let browser_routes = Router::new().route("/authorize", get(authorize::authorize_handler));

    // Endpoints a single-page app may call from JavaScript.
    let api_routes = Router::new()
        .route("/.well-known/openid-configuration", get(discovery::discovery_handler))
        .route("/.well-known/jwks.json", get(discovery::jwks_handler))
        .route("/token", post(token::token_handler))
        .route("/userinfo", get(userinfo::userinfo_handler))
        .layer(middleware::from_fn_with_state(
            state.allowed_origins.clone(),
            enforce_cors_middleware,
        ));

    Router::new()
        .merge(browser_routes)
        .merge(api_routes)
        .with_state(state)
}

/// Applies the configured origin allowlist.
///
/// An empty allowlist disables the check. Requests without `Origin` pass through; disallowed
/// origins get 403; allowed preflights are answered here with 204.
async fn enforce_cors_middleware(
    State(allowed_origins): State<Arc<HashSet<String>>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if allowed_origins.is_empty() {
        return next.run(request).await;
    }

    let origin = match request.headers().get(header::ORIGIN).and_then(|o| o.to_str().ok()) {
        Some(o) => o.to_string(),
        None => return next.run(request).await,
    };

    if !allowed_origins.contains(&origin) {
        warn!(origin = %origin, path = %request.uri().path(), "CORS: blocked request from disallowed origin");
        return (StatusCode::FORBIDDEN, "CORS: Disallowed origin").into_response();
    }

    let origin_header = match HeaderValue::from_str(&origin) {
        Ok(value) => value,
        Err(_) => return (StatusCode::FORBIDDEN, "CORS: Disallowed origin").into_response(),
    };

    if request.method() == Method::OPTIONS {
        debug!(origin = %origin, path = %request.uri().path(), "CORS: answered preflight");
        return (
            StatusCode::NO_CONTENT,
            [
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_header),
                (header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("POST, GET, OPTIONS")),
                (
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("Content-Type, Authorization"),
                ),
            ],
        )
            .into_response();
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_header);
    response
}
