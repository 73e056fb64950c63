pub mod authorize;
pub mod discovery;
pub mod token;
pub mod userinfo;

use axum::http::{header, HeaderMap, Uri};

use crate::config::Config;

// Used when a request carries no Host header at all.
const FALLBACK_HOST: &str = "localhost";

/// The configured issuer, or `scheme://host` of the inbound request when none is configured.
///
/// The scheme comes from the first `X-Forwarded-Proto` entry, then the request URI, and
/// defaults to `http`. The host comes from `Host`, then the URI authority (HTTP/2 requests
/// carry it there).
pub fn request_issuer(config: &Config, headers: &HeaderMap, uri: &Uri) -> String {
    if let Some(issuer) = config.issuer() {
        return issuer.trim_end_matches('/').to_string();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| uri.scheme_str())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or(FALLBACK_HOST);

    format!("{scheme}://{host}")
}
