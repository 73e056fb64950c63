//! Rewrites client scopes into the upstream provider's vocabulary.

use std::collections::BTreeMap;

pub const OPENID_SCOPE: &str = "openid";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedScopes {
    pub scopes: Vec<String>,
    /// Set when the client asked for `openid`; the authorization request must then carry a nonce.
    pub requires_nonce: bool,
}

impl MappedScopes {
    pub fn join(&self, delimiter: &str) -> String {
        self.scopes.join(delimiter)
    }
}

/// Splits a raw scope value on commas and whitespace, dropping empty tokens.
pub fn scope_tokens(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn contains_openid(raw: &str) -> bool {
    scope_tokens(raw).any(|token| token == OPENID_SCOPE)
}

/// `openid` never reaches the upstream; other tokens are renamed through `mapping` or kept.
pub fn map_scopes(raw: &str, mapping: &BTreeMap<String, String>) -> MappedScopes {
    let mut requires_nonce = false;
    let mut scopes = Vec::new();

    for token in scope_tokens(raw) {
        if token == OPENID_SCOPE {
            requires_nonce = true;
            continue;
        }
        let mapped = mapping.get(token).map(String::as_str).unwrap_or(token);
        scopes.push(mapped.to_string());
    }

    MappedScopes { scopes, requires_nonce }
}
