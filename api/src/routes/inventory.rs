//! Reporting endpoints over inventory state and history. All of them share
//! the same tenancy-scope and filter parameters; history listings read the
//! append-only archive tables.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use stocktake_core::error::ApiError;
use stocktake_core::model::{
    Fact, HistoricalFact, ItemStatus, ManagedItem, ManagedItemHistoryEntry, Message, MessageType,
    PaginatedResponse, Scope,
};

use crate::auth;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::reports::{self, ReportFilter};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/managed-items", get(list_managed_items))
        .route("/v1/managed-items/history", get(list_managed_item_history))
        .route("/v1/facts", get(list_facts))
        .route("/v1/facts/history", get(list_historical_facts))
        .route("/v1/messages", get(list_messages))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct InventoryParams {
    /// Narrow to one business unit
    #[serde(default)]
    pub business_unit: Option<Uuid>,
    /// Narrow to one machine group
    #[serde(default)]
    pub machine_group: Option<Uuid>,
    /// Narrow to one machine
    #[serde(default)]
    pub machine: Option<Uuid>,
    /// Management source name
    #[serde(default)]
    pub source: Option<String>,
    /// Managed item status (managed item listings only)
    #[serde(default)]
    pub status: Option<ItemStatus>,
    /// Message severity (message listing only)
    #[serde(default)]
    pub message_type: Option<MessageType>,
    /// Free-text match over names, payloads, hostname and serial
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl InventoryParams {
    fn scope(&self) -> Scope {
        Scope::narrowest(self.business_unit, self.machine_group, self.machine)
    }

    fn filter(&self) -> ReportFilter {
        ReportFilter {
            source: self.source.clone(),
            status: self.status,
            message_type: self.message_type,
            q: self.q.clone(),
            since: self.since,
            until: self.until,
        }
    }

    fn limit(&self) -> i64 {
        self.limit.unwrap_or(50)
    }
}

/// List current managed items
#[utoipa::path(
    get,
    path = "/v1/managed-items",
    params(InventoryParams),
    responses(
        (status = 200, description = "Current managed item state", body = PaginatedResponse<ManagedItem>),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    tag = "inventory"
)]
pub async fn list_managed_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<InventoryParams>,
) -> Result<Json<PaginatedResponse<ManagedItem>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    let page = reports::list_managed_items(
        &state.db,
        params.scope(),
        &params.filter(),
        params.cursor.as_deref(),
        params.limit(),
    )
    .await?;
    Ok(Json(page))
}

/// List archived managed item snapshots, newest first
#[utoipa::path(
    get,
    path = "/v1/managed-items/history",
    params(InventoryParams),
    responses(
        (status = 200, description = "Archived managed item snapshots", body = PaginatedResponse<ManagedItemHistoryEntry>),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    tag = "inventory"
)]
pub async fn list_managed_item_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<InventoryParams>,
) -> Result<Json<PaginatedResponse<ManagedItemHistoryEntry>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    let page = reports::list_managed_item_history(
        &state.db,
        params.scope(),
        &params.filter(),
        params.cursor.as_deref(),
        params.limit(),
    )
    .await?;
    Ok(Json(page))
}

/// List current telemetry facts
#[utoipa::path(
    get,
    path = "/v1/facts",
    params(InventoryParams),
    responses(
        (status = 200, description = "Current facts", body = PaginatedResponse<Fact>),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    tag = "inventory"
)]
pub async fn list_facts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<InventoryParams>,
) -> Result<Json<PaginatedResponse<Fact>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    let page = reports::list_facts(
        &state.db,
        params.scope(),
        &params.filter(),
        params.cursor.as_deref(),
        params.limit(),
    )
    .await?;
    Ok(Json(page))
}

/// List archived fact values, newest first
#[utoipa::path(
    get,
    path = "/v1/facts/history",
    params(InventoryParams),
    responses(
        (status = 200, description = "Archived fact values", body = PaginatedResponse<HistoricalFact>),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    tag = "inventory"
)]
pub async fn list_historical_facts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<InventoryParams>,
) -> Result<Json<PaginatedResponse<HistoricalFact>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    let page = reports::list_historical_facts(
        &state.db,
        params.scope(),
        &params.filter(),
        params.cursor.as_deref(),
        params.limit(),
    )
    .await?;
    Ok(Json(page))
}

/// List operational messages, newest first
#[utoipa::path(
    get,
    path = "/v1/messages",
    params(InventoryParams),
    responses(
        (status = 200, description = "Operational messages", body = PaginatedResponse<Message>),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    tag = "inventory"
)]
pub async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<InventoryParams>,
) -> Result<Json<PaginatedResponse<Message>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    let page = reports::list_messages(
        &state.db,
        params.scope(),
        &params.filter(),
        params.cursor.as_deref(),
        params.limit(),
    )
    .await?;
    Ok(Json(page))
}
