//! `ratewall` binary entry point: loads configuration, builds the Redis
//! pool and credential registry, and serves the HTTP surface until asked to
//! shut down.

use std::sync::Arc;

use deadpool_redis::{Config as RedisPoolConfig, PoolConfig, Runtime};
use ratewall::http::{router, AppState};
use ratewall::{Config, CredentialRegistry, LimiterClient};
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = Config::from_env()?;
    tracing::info!(node_id = %config.node_id, bind_addr = %config.bind_addr, "starting ratewall");

    let registry = Arc::new(CredentialRegistry::load(&config.api_keys_file)?);
    tracing::info!(credentials = registry.len(), "credential registry loaded");

    let mut pool_config = RedisPoolConfig::from_url(&config.redis_url);
    pool_config.pool = Some(PoolConfig {
        max_size: config.redis_pool_size,
        ..Default::default()
    });
    let pool = pool_config.create_pool(Some(Runtime::Tokio1))?;

    let limiter = LimiterClient::new(
        pool,
        config.window,
        config.admission_deadline,
        config.reconcile_deadline,
        config.bypass_limiter,
    );

    if config.bypass_limiter {
        tracing::warn!("BYPASS_LIMITER is enabled; every request is admitted unconditionally");
    } else {
        limiter.ping().await?;
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        registry: Arc::clone(&registry),
        limiter: Arc::new(limiter),
    };

    tokio::spawn(reload_registry_on_sighup(registry));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

/// Re-read the credentials document on every `SIGHUP`, publishing the new
/// snapshot atomically via [`CredentialRegistry::reload`]. Runs for the life
/// of the process as a background task; a failed reload is logged and the
/// previous snapshot stays in effect.
async fn reload_registry_on_sighup(registry: Arc<CredentialRegistry>) {
    #[cfg(unix)]
    {
        let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGHUP handler; credential reload disabled");
                return;
            }
        };

        loop {
            hangup.recv().await;
            match registry.reload() {
                Ok(()) => {
                    tracing::info!(credentials = registry.len(), "credential registry reloaded")
                }
                Err(error) => tracing::warn!(%error, "credential registry reload failed"),
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = registry;
    }
}
