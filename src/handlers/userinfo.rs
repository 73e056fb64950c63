use axum::{
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::claims::map_claims;
use crate::error::BridgeError;

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, BridgeError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| BridgeError::invalid_request("Authorization header is missing"))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| BridgeError::invalid_request("Invalid Authorization header format"))
}

pub async fn userinfo_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Map<String, Value>>, BridgeError> {
    let token = bearer_token(&headers).inspect_err(|e| warn!(error = %e, "Rejected userinfo request"))?;

    let user_info = app_state.upstream.fetch_userinfo(token).await.map_err(|e| {
        error!(error = %e, "Failed to get user info from OP");
        BridgeError::server_error(format!("failed to get user info from OP: {e}"))
    })?;

    let mapped = map_claims(&user_info, &app_state.config.user_attribute_mapping);
    info!(claim_count = mapped.len(), "Served userinfo");
    Ok(Json(mapped))
}
