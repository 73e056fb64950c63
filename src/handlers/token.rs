use std::collections::HashMap;

use axum::{
    extract::{rejection::FormRejection, Form, State},
    http::{header, HeaderMap, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use super::request_issuer;
use crate::app::AppState;
use crate::claims::map_claims;
use crate::error::BridgeError;
use crate::scope::contains_openid;
use crate::upstream::{TokenExchange, TokenGrant};

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Checks the shape of a token request and splits it into the grant to forward and the scope
/// that decides whether an ID token is issued.
pub fn parse_token_request(form: &HashMap<String, String>) -> Result<(TokenGrant, String), BridgeError> {
    let required = |name: &str| {
        form.get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| BridgeError::invalid_request(format!("{name} is required")))
    };

    let grant = TokenGrant {
        grant_type: required("grant_type")?,
        code: required("code")?,
        redirect_uri: required("redirect_uri")?,
        client_id: required("client_id")?,
        client_secret: form.get("client_secret").filter(|v| !v.is_empty()).cloned(),
    };
    let scope = form.get("scope").cloned().unwrap_or_default();
    Ok((grant, scope))
}

pub async fn token_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    payload: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Result<Response, BridgeError> {
    let Form(payload) = payload.map_err(|e| {
        warn!(error = %e, "Failed to bind token request");
        BridgeError::invalid_request(e.body_text())
    })?;
    let (grant, scope) = parse_token_request(&payload).inspect_err(|e| warn!(error = %e, "Rejected token request"))?;

    info!(client_id = %grant.client_id, grant_type = %grant.grant_type, "Token endpoint called");

    let tokens = match app_state.upstream.exchange_code(&grant).await {
        Ok(TokenExchange::Issued(tokens)) => tokens,
        Ok(TokenExchange::Rejected { status, body }) => {
            warn!(client_id = %grant.client_id, %status, upstream_error = ?body.get("error"), "OP rejected the grant");
            return Ok((status, Json(body)).into_response());
        }
        Err(e) => {
            error!(client_id = %grant.client_id, error = %e, "Failed to proxy to OP token endpoint");
            return Err(BridgeError::server_error(e.to_string()));
        }
    };

    let mut response = TokenResponse {
        access_token: tokens.access_token,
        token_type: tokens.token_type,
        expires_in: tokens.expires_in,
        refresh_token: tokens.refresh_token,
        id_token: None,
    };

    if contains_openid(&scope) {
        let user_info = app_state.upstream.fetch_userinfo(&response.access_token).await.map_err(|e| {
            error!(client_id = %grant.client_id, error = %e, "Failed to get user info");
            BridgeError::server_error("failed to get user info")
        })?;
        let mapped = map_claims(&user_info, &app_state.config.user_attribute_mapping);

        // A flow that never bound a nonce still gets an ID token, just without the claim.
        let nonce = match app_state.nonces.get(&grant.client_id, &grant.redirect_uri).await {
            Ok(nonce) => nonce,
            Err(e) => {
                warn!(client_id = %grant.client_id, error = %e, "Nonce lookup failed, issuing without nonce");
                None
            }
        };

        let issuer = request_issuer(&app_state.config, &headers, &uri);
        let id_token = app_state
            .id_tokens
            .issue(&issuer, &grant.client_id, mapped, nonce)
            .map_err(|e| {
                error!(client_id = %grant.client_id, error = %e, "Failed to generate ID token");
                BridgeError::server_error("failed to generate ID token")
            })?;
        response.id_token = Some(id_token);
    }

    info!(client_id = %grant.client_id, id_token = response.id_token.is_some(), "Successfully issued tokens");
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(response)).into_response())
}
