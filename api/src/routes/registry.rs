//! Plugin/report registry listings. Every read goes through a
//! refresh-then-query path so the tables reflect currently installed
//! modules, bounded by the staleness window.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};

use stocktake_core::error::ApiError;
use stocktake_core::model::RegistryEntry;

use crate::auth;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::registry::{self, RegistryKind};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/plugins", get(list_plugins))
        .route("/v1/machine-detail-plugins", get(list_machine_detail_plugins))
        .route("/v1/reports", get(list_reports))
}

async fn refreshed_list(
    state: &AppState,
    kind: RegistryKind,
) -> Result<Vec<RegistryEntry>, AppError> {
    if state.registry.claim_refresh() {
        registry::refresh(&state.db, &state.registry.plugin_dir, RegistryKind::Plugins).await?;
        registry::refresh(
            &state.db,
            &state.registry.plugin_dir,
            RegistryKind::MachineDetailPlugins,
        )
        .await?;
        registry::refresh(&state.db, &state.registry.plugin_dir, RegistryKind::Reports).await?;
    }
    registry::list(&state.db, kind).await
}

/// List installed dashboard plugins, in display order
#[utoipa::path(
    get,
    path = "/v1/plugins",
    responses(
        (status = 200, description = "Installed plugins", body = Vec<RegistryEntry>),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    tag = "registry"
)]
pub async fn list_plugins(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RegistryEntry>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    Ok(Json(refreshed_list(&state, RegistryKind::Plugins).await?))
}

/// List installed machine-detail plugins, in display order
#[utoipa::path(
    get,
    path = "/v1/machine-detail-plugins",
    responses(
        (status = 200, description = "Installed machine-detail plugins", body = Vec<RegistryEntry>),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    tag = "registry"
)]
pub async fn list_machine_detail_plugins(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RegistryEntry>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    Ok(Json(
        refreshed_list(&state, RegistryKind::MachineDetailPlugins).await?,
    ))
}

/// List installed report modules
#[utoipa::path(
    get,
    path = "/v1/reports",
    responses(
        (status = 200, description = "Installed reports", body = Vec<RegistryEntry>),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    tag = "registry"
)]
pub async fn list_reports(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<RegistryEntry>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    Ok(Json(refreshed_list(&state, RegistryKind::Reports).await?))
}
