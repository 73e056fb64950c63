use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oidc_bridge::cache;
use oidc_bridge::clock::{Clock, SystemClock};
use oidc_bridge::keys::SigningKeys;
use oidc_bridge::{build_router, AppState, Cli, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    info!(config_file = %cli.config.display(), authorize_url = %config.op_authorize_url, "Configuration loaded.");

    let keys = SigningKeys::load(&config.private_key_path, config.public_key_path(), config.signing_algorithm()?)
        .context("load ID token signing keys")?;
    info!(algorithm = %keys.algorithm_name(), "Signing key loaded.");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let nonce_cache = cache::select_backend(config.redis_addr(), clock.clone(), config.sweep_interval()).await;
    info!(backend = nonce_cache.backend(), ttl_secs = config.nonce_cache_ttl, "Nonce cache ready.");

    let config = Arc::new(config);
    let app_state = AppState::new(config.clone(), Arc::new(keys), nonce_cache, clock)
        .context("build upstream HTTP client")?;
    if !app_state.allowed_origins.is_empty() {
        info!(origins = ?app_state.allowed_origins, "Allowed CORS origins configured.");
    }
    let app = build_router(app_state);

    info!(listen_addr = %config.listen_address, issuer = config.issuer().unwrap_or("<from request>"), "OIDC bridge starting.");
    let listener = tokio::net::TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("bind {}", config.listen_address))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve HTTP")?;

    info!("OIDC bridge stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining connections.");
}
