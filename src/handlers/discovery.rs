use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::info;

use super::request_issuer;
use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct Discovery {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub scopes_supported: Vec<&'static str>,
    pub response_types_supported: Vec<&'static str>,
    pub subject_types_supported: Vec<&'static str>,
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl Discovery {
    pub fn new(issuer: String, signing_alg: String) -> Self {
        Self {
            authorization_endpoint: format!("{issuer}/authorize"),
            token_endpoint: format!("{issuer}/token"),
            userinfo_endpoint: format!("{issuer}/userinfo"),
            jwks_uri: format!("{issuer}/.well-known/jwks.json"),
            scopes_supported: vec!["openid", "profile", "email"],
            response_types_supported: vec!["code"],
            subject_types_supported: vec!["public"],
            id_token_signing_alg_values_supported: vec![signing_alg],
            issuer,
        }
    }
}

pub async fn discovery_handler(State(app_state): State<AppState>, headers: HeaderMap, uri: Uri) -> impl IntoResponse {
    let issuer = request_issuer(&app_state.config, &headers, &uri);
    let discovery = Discovery::new(issuer, app_state.keys.algorithm_name());
    info!(issuer = %discovery.issuer, "Served OIDC discovery configuration");
    (StatusCode::OK, Json(discovery))
}

pub async fn jwks_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    let jwks = app_state.keys.jwks();
    info!("Served JWKS");
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=86400"))],
        Json(jwks),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_hang_off_the_issuer() {
        let doc = Discovery::new("https://bridge.example.com".to_string(), "RS256".to_string());
        assert_eq!(doc.authorization_endpoint, "https://bridge.example.com/authorize");
        assert_eq!(doc.token_endpoint, "https://bridge.example.com/token");
        assert_eq!(doc.userinfo_endpoint, "https://bridge.example.com/userinfo");
        assert_eq!(doc.jwks_uri, "https://bridge.example.com/.well-known/jwks.json");
        assert_eq!(doc.id_token_signing_alg_values_supported, vec!["RS256"]);
    }
}
