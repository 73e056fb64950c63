use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::app::AppState;
use crate::error::BridgeError;
use crate::scope::map_scopes;

/// Parameters forwarded to the upstream authorization endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamAuthorize<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scope: &'a str,
    pub state: Option<&'a str>,
    pub nonce: Option<&'a str>,
}

/// Appends the authorization parameters to the configured endpoint, keeping its own query.
pub fn upstream_authorize_url(base: &str, params: &UpstreamAuthorize<'_>) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", params.client_id)
            .append_pair("redirect_uri", params.redirect_uri)
            .append_pair("scope", params.scope);
        if let Some(state) = params.state {
            query.append_pair("state", state);
        }
        if let Some(nonce) = params.nonce {
            query.append_pair("nonce", nonce);
        }
    }
    Ok(url)
}

fn non_empty<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

pub async fn authorize_handler(
    State(app_state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, BridgeError> {
    let response_type = params.get("response_type").map(String::as_str).unwrap_or_default();
    let client_id = params.get("client_id").map(String::as_str).unwrap_or_default();

    if response_type != "code" {
        warn!(client_id, response_type, "Unsupported response type");
        return Err(BridgeError::UnsupportedResponseType);
    }

    let client_id = non_empty(&params, "client_id").ok_or_else(|| BridgeError::invalid_request("client_id is required"))?;
    let redirect_uri =
        non_empty(&params, "redirect_uri").ok_or_else(|| BridgeError::invalid_request("redirect_uri is required"))?;

    let config = &app_state.config;
    let mapped = map_scopes(params.get("scope").map(String::as_str).unwrap_or_default(), &config.scope_mapping);
    let nonce = non_empty(&params, "nonce");

    let forwarded_nonce = if mapped.requires_nonce {
        let nonce = nonce.ok_or_else(|| {
            warn!(client_id, "Nonce is required when scope includes openid");
            BridgeError::invalid_request("nonce is required when scope includes openid")
        })?;
        app_state.nonces.put(client_id, redirect_uri, nonce).await.map_err(|e| {
            error!(client_id, error = %e, "Failed to cache nonce");
            BridgeError::server_error("failed to cache nonce")
        })?;
        debug!(client_id, backend = app_state.nonces.backend(), "Nonce cached");
        Some(nonce)
    } else {
        None
    };

    let scope = mapped.join(&config.scope_delimiter);
    let upstream = UpstreamAuthorize {
        client_id,
        redirect_uri,
        scope: &scope,
        state: non_empty(&params, "state"),
        nonce: forwarded_nonce,
    };
    let location = upstream_authorize_url(&config.op_authorize_url, &upstream).map_err(|e| {
        error!(client_id, error = %e, "Failed to parse OP authorize URL");
        BridgeError::server_error("failed to parse OP auth URL")
    })?;

    info!(client_id, upstream_scope = %scope, openid = mapped.requires_nonce, "Redirecting to OP");
    Ok((StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response())
}
