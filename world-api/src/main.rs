//! # world-api
//!
//! Small JSON API over the MySQL `world` sample dataset with session login.
//!
//! ## Architecture
//!
//! - **Store**: `WorldStore` trait over a sqlx MySQL pool (users, cities, countries)
//! - **Password**: Argon2id hashing with per-hash random salt
//! - **Sessions**: opaque tokens in a signed cookie, records in MySQL or memory
//! - **HTTP**: Axum router with a session gate on protected routes, request IDs,
//!   rate limiting and graceful shutdown

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

mod config;
mod http;
mod password;
mod session;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::serve;
use clap::Parser;
use sqlx::mysql::MySqlPoolOptions;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, Cli, SessionBackendKind};
use crate::http::{router, AppState};
use crate::session::{cookie_key, MemorySessions, MySqlSessions, SessionBackend, SessionStore};
use crate::store::MySqlStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging().context("failed to initialize logging")?;

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli).context("failed to load configuration")?;
    info!(
        bind = %config.bind,
        db_host = %config.database.hostname,
        db_port = config.database.port,
        db_name = %config.database.database,
        session_backend = ?config.session.backend,
        session_ttl = %humantime::format_duration(config.session.ttl),
        session_purge_interval = %humantime::format_duration(config.session.purge_interval),
        rate_limit_burst = config.rate_limit.burst,
        rate_limit_period = %humantime::format_duration(config.rate_limit.period),
        rate_limit_per_client = config.rate_limit.per_client,
        run_migrations = config.run_migrations,
        "configuration loaded"
    );

    let pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(config.database.connect_options())
        .await
        .with_context(|| {
            format!(
                "cannot connect to database {}:{}",
                config.database.hostname, config.database.port
            )
        })?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply migrations")?;
        info!("migrations applied");
    }

    if config.session.secret.is_none() {
        warn!("SESSION_SECRET not set; using a random signing key, sessions end on restart");
    }
    let cookie_key =
        cookie_key(config.session.secret.as_ref()).context("invalid session secret")?;

    let backend: Arc<dyn SessionBackend> = match config.session.backend {
        SessionBackendKind::Mysql => Arc::new(MySqlSessions::new(pool.clone())),
        SessionBackendKind::Memory => Arc::new(MemorySessions::new()),
    };

    let sessions = SessionStore::new(backend, config.session.ttl);
    spawn_session_purge(sessions.clone(), config.session.purge_interval);

    let state = AppState {
        store: Arc::new(MySqlStore::new(pool)),
        sessions,
        cookie_key,
    };

    let app = router(state, &config.rate_limit).context("failed to build router")?;
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    let shutdown = tokio::signal::ctrl_c();
    info!(bind = %config.bind, "world-api listening");

    serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = shutdown.await;
        info!("shutting down gracefully");
    })
    .await
    .context("server exited with error")
}

/// Initialize tracing subscriber with `RUST_LOG` env filter (default: `info`).
fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}

/// Spawns a background task that deletes expired session records at the given interval.
/// Tokens that are never presented again would otherwise stay in the backend forever.
fn spawn_session_purge(sessions: SessionStore, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            match sessions.purge_expired().await {
                Ok(0) => debug!("no expired sessions to purge"),
                Ok(removed) => info!(removed, "expired sessions purged"),
                Err(err) => error!(error = %err, "session purge failed"),
            }
        }
    });
}
