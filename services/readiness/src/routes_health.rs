use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime: f64,
    pub database_connection: bool,
    pub storage_connection: bool,
}

/// Always 200; `status` says whether every dependency answered.
pub async fn health(State(state): State<SharedState>) -> Json<Health> {
    let database = match (state.datasets.ping().await, state.assessments.ping().await) {
        (Ok(()), Ok(())) => true,
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "health: database unreachable");
            false
        }
    };
    let storage = match state.objects.ensure_container_exists().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "health: object store unreachable");
            false
        }
    };

    Json(Health {
        status: if database && storage { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs_f64(),
        database_connection: database,
        storage_connection: storage,
    })
}
