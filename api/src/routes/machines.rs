use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use stocktake_core::error::ApiError;
use stocktake_core::model::{Machine, OsFamily, PaginatedResponse, Scope};

use crate::auth;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::machines::{self, MachineFilter};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/machines", get(list_machines))
        .route("/v1/machines/{serial}", get(get_machine))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListMachinesParams {
    /// Narrow to one business unit
    #[serde(default)]
    pub business_unit: Option<Uuid>,
    /// Narrow to one machine group
    #[serde(default)]
    pub machine_group: Option<Uuid>,
    /// Narrow to one machine
    #[serde(default)]
    pub machine: Option<Uuid>,
    #[serde(default)]
    pub deployed: Option<bool>,
    #[serde(default)]
    pub os_family: Option<OsFamily>,
    /// Free-text match over hostname and serial
    #[serde(default)]
    pub q: Option<String>,
    /// Only machines checked in at or after this instant
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Only machines checked in before this instant
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// List machines within a tenancy scope
///
/// Ordered by last check-in, newest first, with cursor pagination. A scope
/// that matches nothing returns an empty page, not an error.
#[utoipa::path(
    get,
    path = "/v1/machines",
    params(ListMachinesParams),
    responses(
        (status = 200, description = "Paginated machine listing", body = PaginatedResponse<Machine>),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    tag = "machines"
)]
pub async fn list_machines(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListMachinesParams>,
) -> Result<Json<PaginatedResponse<Machine>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;

    let scope = Scope::narrowest(params.business_unit, params.machine_group, params.machine);
    let filter = MachineFilter {
        deployed: params.deployed,
        os_family: params.os_family,
        q: params.q,
        since: params.since,
        until: params.until,
    };
    let page = machines::list_machines(
        &state.db,
        scope,
        &filter,
        params.cursor.as_deref(),
        params.limit.unwrap_or(50),
    )
    .await?;
    Ok(Json(page))
}

/// Fetch one machine by serial number
#[utoipa::path(
    get,
    path = "/v1/machines/{serial}",
    params(("serial" = String, Path, description = "Machine serial number")),
    responses(
        (status = 200, description = "The machine", body = Machine),
        (status = 404, description = "Unknown serial", body = ApiError)
    ),
    tag = "machines"
)]
pub async fn get_machine(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(serial): Path<String>,
) -> Result<Json<Machine>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;

    machines::get_machine_by_serial(&state.db, &serial)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound {
            message: format!("No machine with serial '{serial}'"),
        })
}
