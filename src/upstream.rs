//! HTTP client for the upstream OAuth2 provider: code exchange and user info.

use std::fmt;

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to upstream failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode upstream response: {0}")]
    Decode(String),
    #[error("upstream responded with status {0}")]
    Status(u16),
}

/// The authorization-code grant as forwarded to the provider. The bridge does not interpret
/// client credentials.
#[derive(Clone)]
pub struct TokenGrant {
    pub grant_type: String,
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("grant_type", &self.grant_type)
            .field("redirect_uri", &self.redirect_uri)
            .field("client_id", &self.client_id)
            .field("code", &"***REDACTED***")
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***REDACTED***"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamTokens {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Outcome of a code exchange that reached the provider and produced JSON.
#[derive(Debug)]
pub enum TokenExchange {
    Issued(UpstreamTokens),
    /// The provider answered with an OAuth error object; body and status are relayed untouched.
    Rejected { status: StatusCode, body: Value },
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    token_url: String,
    userinfo_url: String,
}

impl UpstreamClient {
    pub fn new(token_url: impl Into<String>, userinfo_url: impl Into<String>) -> Result<Self, UpstreamError> {
        // Some providers (GitHub among them) refuse API calls without a User-Agent.
        let http = reqwest::Client::builder()
            .user_agent(concat!("oidc-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            token_url: token_url.into(),
            userinfo_url: userinfo_url.into(),
        })
    }

    pub async fn exchange_code(&self, grant: &TokenGrant) -> Result<TokenExchange, UpstreamError> {
        let mut form = vec![
            ("grant_type", grant.grant_type.as_str()),
            ("code", grant.code.as_str()),
            ("redirect_uri", grant.redirect_uri.as_str()),
            ("client_id", grant.client_id.as_str()),
        ];
        if let Some(secret) = grant.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let body: Value = serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))?;

        if body.get("error").is_some() {
            let status = StatusCode::from_u16(status.as_u16()).map_err(|e| UpstreamError::Decode(e.to_string()))?;
            return Ok(TokenExchange::Rejected { status, body });
        }
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let tokens = serde_json::from_value(body).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(TokenExchange::Issued(tokens))
    }

    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<Map<String, Value>, UpstreamError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => Err(UpstreamError::Decode("user info is not a JSON object".to_string())),
            Err(e) => Err(UpstreamError::Decode(e.to_string())),
        }
    }
}
