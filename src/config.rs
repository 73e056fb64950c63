//! Configuration snapshot and its layered loading.
//!
//! Precedence, lowest to highest: built-in defaults, the YAML file, the un-prefixed
//! `PRIVATE_KEY_PATH` / `PUBLIC_KEY_PATH` variables, `OIDC_BRIDGE_*` variables, then
//! command-line flags. The result is validated once and never mutated afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::keys::parse_rsa_algorithm;

pub const ENV_PREFIX: &str = "OIDC_BRIDGE_";

#[derive(Debug, Parser)]
#[command(name = "oidc-bridge", version, about = "OpenID Connect bridge for OAuth2-only identity providers")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, env = "OIDC_BRIDGE_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Path to the PEM-encoded RSA private key used to sign ID tokens.
    #[arg(long = "private-key")]
    pub private_key: Option<PathBuf>,

    /// Path to the PEM-encoded public key matching the private key.
    #[arg(long = "public-key")]
    pub public_key: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:8080.
    #[arg(long)]
    pub listen_address: Option<String>,

    /// Port to listen on; replaces the port of the listen address.
    #[arg(long)]
    pub port: Option<u16>,

    /// Issuer identifier; derived from each request's host when empty.
    #[arg(long)]
    pub issuer: Option<String>,

    /// Redis address (host:port or redis:// URL) for the shared nonce cache.
    #[arg(long)]
    pub redis_addr: Option<String>,
}

impl Cli {
    pub fn with_config(config: impl Into<PathBuf>) -> Self {
        Self {
            config: config.into(),
            private_key: None,
            public_key: None,
            listen_address: None,
            port: None,
            issuer: None,
            redis_addr: None,
        }
    }

    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            private_key_path: self.private_key.clone(),
            public_key_path: self.public_key.clone(),
            listen_address: self.listen_address.clone(),
            issuer: self.issuer.clone(),
            redis_addr: self.redis_addr.clone(),
        }
    }
}

// Only flags that were actually given are serialized, so absent flags never mask lower layers.
#[derive(Debug, Serialize)]
struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    private_key_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_key_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    listen_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redis_addr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub op_authorize_url: String,
    pub op_token_url: String,
    pub op_userinfo_url: String,
    /// Empty means "derive from the inbound request".
    pub issuer: String,
    /// Seconds.
    pub id_token_lifetime: u64,
    /// Seconds.
    pub nonce_cache_ttl: u64,
    /// Seconds between sweeps of the in-memory nonce cache.
    pub nonce_sweep_interval: u64,
    pub id_token_signing_alg: String,
    /// Client scope -> upstream scope. Unlisted scopes pass through.
    pub scope_mapping: BTreeMap<String, String>,
    /// Upstream attribute path (`a::b` or `a.b`) -> OIDC claim name.
    pub user_attribute_mapping: BTreeMap<String, String>,
    /// Joins mapped scopes in the upstream authorization URL.
    pub scope_delimiter: String,
    pub redis_addr: String,
    pub private_key_path: PathBuf,
    pub public_key_path: Option<PathBuf>,
    pub listen_address: String,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            op_authorize_url: String::new(),
            op_token_url: String::new(),
            op_userinfo_url: String::new(),
            issuer: String::new(),
            id_token_lifetime: 3600,
            nonce_cache_ttl: 300,
            nonce_sweep_interval: 600,
            id_token_signing_alg: "RS256".to_string(),
            scope_mapping: BTreeMap::new(),
            user_attribute_mapping: BTreeMap::new(),
            scope_delimiter: ",".to_string(),
            redis_addr: String::new(),
            private_key_path: PathBuf::new(),
            public_key_path: None,
            listen_address: "0.0.0.0:8080".to_string(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    /// The layered provider stack, before extraction.
    pub fn figment(cli: &Cli) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file_exact(&cli.config))
            .merge(Env::raw().only(&["PRIVATE_KEY_PATH", "PUBLIC_KEY_PATH"]))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(cli.overrides()))
    }

    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config: Config = Self::figment(cli)
            .extract()
            .with_context(|| format!("load configuration from {}", cli.config.display()))?;

        if let Some(port) = cli.port {
            config.listen_address = with_port(&config.listen_address, port)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("op_authorize_url", &self.op_authorize_url),
            ("op_token_url", &self.op_token_url),
            ("op_userinfo_url", &self.op_userinfo_url),
        ] {
            if value.trim().is_empty() {
                bail!("{name} must be set");
            }
        }
        if self.private_key_path.as_os_str().is_empty() {
            bail!("private_key_path must be set");
        }
        if self.id_token_lifetime == 0 {
            bail!("id_token_lifetime must be positive");
        }
        if self.nonce_cache_ttl == 0 {
            bail!("nonce_cache_ttl must be positive");
        }
        if self.nonce_sweep_interval == 0 {
            bail!("nonce_sweep_interval must be positive");
        }
        self.signing_algorithm()?;
        Ok(())
    }

    pub fn signing_algorithm(&self) -> Result<Algorithm> {
        parse_rsa_algorithm(&self.id_token_signing_alg).context("id_token_signing_alg")
    }

    pub fn issuer(&self) -> Option<&str> {
        Some(self.issuer.trim()).filter(|issuer| !issuer.is_empty())
    }

    pub fn redis_addr(&self) -> Option<&str> {
        Some(self.redis_addr.trim()).filter(|addr| !addr.is_empty())
    }

    pub fn public_key_path(&self) -> Option<&Path> {
        self.public_key_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    pub fn id_token_lifetime_secs(&self) -> i64 {
        i64::try_from(self.id_token_lifetime).unwrap_or(i64::MAX)
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_cache_ttl)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.nonce_sweep_interval)
    }
}

/// Replaces the port of a `host:port` listen address. The host may be a name, an IPv4
/// address or a bracketed IPv6 address.
fn with_port(listen_address: &str, port: u16) -> Result<String> {
    match listen_address.rsplit_once(':') {
        Some((host, _)) if !host.is_empty() => Ok(format!("{host}:{port}")),
        _ => bail!("listen_address {listen_address:?} is not in host:port form"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    const BASE_YAML: &str = r#"
op_authorize_url: https://github.com/login/oauth/authorize
op_token_url: https://github.com/login/oauth/access_token
op_userinfo_url: https://api.github.com/user
issuer: https://bridge.example.com
id_token_lifetime: 1800
nonce_cache_ttl: 120
id_token_signing_alg: RS256
private_key_path: ./private.key
public_key_path: ./public.key
scope_mapping:
  profile: "read:user"
  email: "user:email"
user_attribute_mapping:
  id: sub
  "data::email": email
  "data::avatar_url": picture
"#;

    #[test]
    fn loads_yaml_with_nested_mapping_keys() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", BASE_YAML)?;
            let config = Config::load(&Cli::with_config("config.yaml")).expect("config");

            assert_eq!(config.issuer(), Some("https://bridge.example.com"));
            assert_eq!(config.id_token_lifetime, 1800);
            assert_eq!(config.nonce_ttl(), Duration::from_secs(120));
            assert_eq!(config.scope_mapping["profile"], "read:user");
            assert_eq!(config.user_attribute_mapping["id"], "sub");
            assert_eq!(config.user_attribute_mapping["data::email"], "email");
            assert_eq!(config.user_attribute_mapping["data::avatar_url"], "picture");
            // Untouched defaults.
            assert_eq!(config.scope_delimiter, ",");
            assert_eq!(config.listen_address, "0.0.0.0:8080");
            assert_eq!(config.redis_addr(), None);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file_and_cli_overrides_environment() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", BASE_YAML)?;
            jail.set_env("PRIVATE_KEY_PATH", "/env/raw.key");
            jail.set_env("OIDC_BRIDGE_ISSUER", "https://env.example.com");
            jail.set_env("OIDC_BRIDGE_ID_TOKEN_LIFETIME", "900");
            jail.set_env("OIDC_BRIDGE_REDIS_ADDR", "cache:6379");

            let config = Config::load(&Cli::with_config("config.yaml")).expect("config");
            assert_eq!(config.issuer(), Some("https://env.example.com"));
            assert_eq!(config.id_token_lifetime, 900);
            assert_eq!(config.redis_addr(), Some("cache:6379"));
            assert_eq!(config.private_key_path, PathBuf::from("/env/raw.key"));

            jail.set_env("OIDC_BRIDGE_PRIVATE_KEY_PATH", "/env/prefixed.key");
            let config = Config::load(&Cli::with_config("config.yaml")).expect("config");
            assert_eq!(config.private_key_path, PathBuf::from("/env/prefixed.key"));

            let mut cli = Cli::with_config("config.yaml");
            cli.private_key = Some(PathBuf::from("/cli/private.key"));
            cli.issuer = Some("https://cli.example.com".to_string());
            cli.port = Some(9090);
            let config = Config::load(&cli).expect("config");
            assert_eq!(config.private_key_path, PathBuf::from("/cli/private.key"));
            assert_eq!(config.issuer(), Some("https://cli.example.com"));
            assert_eq!(config.listen_address, "0.0.0.0:9090");
            // Flags that were not given leave the environment value in place.
            assert_eq!(config.redis_addr(), Some("cache:6379"));
            Ok(())
        });
    }

    #[test]
    fn nested_env_keys_extend_mapping_tables() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", BASE_YAML)?;
            jail.set_env("OIDC_BRIDGE_SCOPE_MAPPING__REPO", "public_repo");

            let config = Config::load(&Cli::with_config("config.yaml")).expect("config");
            assert_eq!(config.scope_mapping["repo"], "public_repo");
            assert_eq!(config.scope_mapping["profile"], "read:user");
            Ok(())
        });
    }

    #[test]
    fn blank_issuer_means_request_derived() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", &BASE_YAML.replace("issuer: https://bridge.example.com", "issuer: \"\""))?;
            let config = Config::load(&Cli::with_config("config.yaml")).expect("config");
            assert_eq!(config.issuer(), None);
            Ok(())
        });
    }

    #[test]
    fn missing_upstream_urls_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "private_key_path: ./private.key\n")?;
            let err = Config::load(&Cli::with_config("config.yaml")).unwrap_err();
            assert!(err.to_string().contains("op_authorize_url"));
            Ok(())
        });
    }

    #[test]
    fn non_rsa_algorithm_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", &BASE_YAML.replace("id_token_signing_alg: RS256", "id_token_signing_alg: HS256"))?;
            assert!(Config::load(&Cli::with_config("config.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn zero_lifetimes_are_rejected() {
        let mut config = Config {
            op_authorize_url: "https://op/authorize".to_string(),
            op_token_url: "https://op/token".to_string(),
            op_userinfo_url: "https://op/user".to_string(),
            private_key_path: PathBuf::from("k.pem"),
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        config.nonce_cache_ttl = 0;
        assert!(config.validate().is_err());
        config.nonce_cache_ttl = 1;
        config.id_token_lifetime = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn port_flag_rewrites_listen_address() {
        assert_eq!(with_port("127.0.0.1:8080", 9000).unwrap(), "127.0.0.1:9000");
        assert_eq!(with_port("localhost:8080", 9000).unwrap(), "localhost:9000");
        assert_eq!(with_port("[::1]:8080", 9000).unwrap(), "[::1]:9000");
        assert!(with_port("not-an-address", 9000).is_err());
        assert!(with_port(":8080", 9000).is_err());
    }
}
