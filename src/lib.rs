//! OpenID Connect bridge for OAuth2-only identity providers.
//!
//! The bridge stands between a relying party and an upstream OAuth2 provider (the "OP"). It
//! forwards the authorization-code flow, and when `openid` was requested it fetches the
//! upstream user profile and mints a signed ID token on top of the upstream access token.

pub mod app;
pub mod cache;
pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod id_token;
pub mod keys;
pub mod nonce;
pub mod scope;
pub mod upstream;

pub use app::{build_router, AppState};
pub use config::{Cli, Config};
