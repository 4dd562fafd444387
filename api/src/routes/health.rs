//! Liveness probe. Reports degraded (503) when the inventory database stops
//! answering, since every other endpoint is useless without it; the
//! configured plugin tree is echoed back so a misdeployed
//! `STOCKTAKE_PLUGIN_DIR` is visible without reading logs.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Whether the inventory database answered the probe.
    pub database: bool,
    /// Root of the plugin tree the registry scans, as configured.
    pub plugin_dir: String,
}

/// Service health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .is_ok();

    let http_status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(HealthResponse {
            status: if database { "ok" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database,
            plugin_dir: state.registry.plugin_dir.display().to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::state::RegistryRefresh;

    use super::*;

    #[sqlx::test(migrations = "../migrations")]
    async fn healthy_while_database_answers(pool: sqlx::PgPool) {
        let state = AppState {
            db: pool,
            registry: RegistryRefresh::new(PathBuf::from("/tmp/plugins"), Duration::from_secs(30)),
        };
        let response = health_check(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
