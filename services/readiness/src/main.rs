mod app;
mod assessment_store;
mod config;
mod dataset_store;
mod engine;
mod error;
mod ingest;
mod repo;
mod routes_assessments;
mod routes_datasets;
mod routes_health;
mod state;
mod types_datasets;

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;
    let state = Arc::new(AppState::from_config(cfg.clone()).await?);

    // --- Startup health checks (fail fast) ---
    startup_checks(&state).await?;

    // RECOVERY: fail jobs a previous process left running
    if let Err(e) = state.engine.recover().await {
        warn!(error = %e, "assessment recovery failed");
    }

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.bind_addr))?;
    info!("readiness listening on http://{}", cfg.bind_addr);

    axum::serve(listener, app::app(state.clone()))
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .context("HTTP server failed")?;

    state.engine.shutdown_and_wait().await;
    info!("readiness stopped");
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
    state.shutdown.cancel();
}

async fn startup_checks(state: &AppState) -> Result<()> {
    #[cfg(feature = "s3")]
    if let Some(s3) = &state.config.s3 {
        check_minio_http(&s3.endpoint).await?;
        info!("minio: ok (http health)");
    }

    state
        .objects
        .ensure_container_exists()
        .await
        .context("Object store unavailable")?;
    info!(backend = ?state.config.storage_backend, bucket = %state.config.dataset_bucket, "object store: ok");

    if let Some(pool) = &state.pg_pool {
        check_postgres(pool).await?;
        info!("postgres: ok");
    }

    Ok(())
}

#[cfg(feature = "s3")]
async fn check_minio_http(base: &str) -> Result<()> {
    let url = format!("{}/minio/health/live", base.trim_end_matches('/'));
    let resp = reqwest::get(&url).await.context("MinIO health request failed")?;
    if !resp.status().is_success() {
        anyhow::bail!("MinIO unhealthy: HTTP {}", resp.status());
    }
    Ok(())
}

async fn check_postgres(pg_pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pg_pool)
        .await
        .context("Postgres ping failed")?;
    Ok(())
}
