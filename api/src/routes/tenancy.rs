//! Tenancy administration: business units, their members, machine groups,
//! and user profiles. Mutations require a read-write API key.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use stocktake_core::error::ApiError;
use stocktake_core::model::{BusinessUnit, MachineGroup, UserProfile};

use crate::auth;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::tenancy;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/business-units",
            get(list_business_units).post(create_business_unit),
        )
        .route("/v1/business-units/{id}", delete(delete_business_unit))
        .route(
            "/v1/business-units/{id}/members",
            axum::routing::post(add_member),
        )
        .route(
            "/v1/machine-groups",
            get(list_machine_groups).post(create_machine_group),
        )
        .route("/v1/users/{user_id}/profile", get(get_profile))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateBusinessUnitRequest {
    pub name: String,
}

fn require_name(name: &str, field: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation {
            message: format!("{field} must not be empty"),
            field: Some(field.to_string()),
            received: None,
            docs_hint: None,
        });
    }
    Ok(())
}

/// Create a business unit
#[utoipa::path(
    post,
    path = "/v1/business-units",
    request_body = CreateBusinessUnitRequest,
    responses(
        (status = 201, description = "Business unit created", body = BusinessUnit),
        (status = 403, description = "Read-write API key required", body = ApiError)
    ),
    tag = "tenancy"
)]
pub async fn create_business_unit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBusinessUnitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let identity = auth::authenticate_api_key(&state.db, &headers).await?;
    auth::require_read_write(&identity)?;
    require_name(&req.name, "name")?;

    let unit = tenancy::create_business_unit(&state.db, req.name.trim()).await?;
    Ok((StatusCode::CREATED, Json(unit)))
}

/// List business units
#[utoipa::path(
    get,
    path = "/v1/business-units",
    responses(
        (status = 200, description = "All business units", body = Vec<BusinessUnit>)
    ),
    tag = "tenancy"
)]
pub async fn list_business_units(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<BusinessUnit>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    Ok(Json(tenancy::list_business_units(&state.db).await?))
}

/// Delete a business unit
///
/// Cascades to its machine groups, their machines, and all owned inventory.
#[utoipa::path(
    delete,
    path = "/v1/business-units/{id}",
    params(("id" = Uuid, Path, description = "Business unit id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown business unit", body = ApiError)
    ),
    tag = "tenancy"
)]
pub async fn delete_business_unit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let identity = auth::authenticate_api_key(&state.db, &headers).await?;
    auth::require_read_write(&identity)?;

    tenancy::delete_business_unit(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

/// Attach a user to a business unit
#[utoipa::path(
    post,
    path = "/v1/business-units/{id}/members",
    params(("id" = Uuid, Path, description = "Business unit id")),
    request_body = AddMemberRequest,
    responses(
        (status = 204, description = "Member attached"),
        (status = 404, description = "Unknown business unit", body = ApiError)
    ),
    tag = "tenancy"
)]
pub async fn add_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, AppError> {
    let identity = auth::authenticate_api_key(&state.db, &headers).await?;
    auth::require_read_write(&identity)?;

    tenancy::add_member(&state.db, id, req.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateMachineGroupRequest {
    pub business_unit_id: Uuid,
    pub name: String,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListMachineGroupsParams {
    /// Narrow to one business unit
    #[serde(default)]
    pub business_unit: Option<Uuid>,
}

/// Create a machine group
///
/// The group's 128-character enrollment key is generated here, exactly once;
/// it is immutable for the life of the group.
#[utoipa::path(
    post,
    path = "/v1/machine-groups",
    request_body = CreateMachineGroupRequest,
    responses(
        (status = 201, description = "Machine group created, key included", body = MachineGroup),
        (status = 404, description = "Unknown business unit", body = ApiError)
    ),
    tag = "tenancy"
)]
pub async fn create_machine_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateMachineGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let identity = auth::authenticate_api_key(&state.db, &headers).await?;
    auth::require_read_write(&identity)?;
    require_name(&req.name, "name")?;

    let group =
        tenancy::create_machine_group(&state.db, req.business_unit_id, req.name.trim()).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// List machine groups
#[utoipa::path(
    get,
    path = "/v1/machine-groups",
    params(ListMachineGroupsParams),
    responses(
        (status = 200, description = "Machine groups", body = Vec<MachineGroup>)
    ),
    tag = "tenancy"
)]
pub async fn list_machine_groups(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListMachineGroupsParams>,
) -> Result<Json<Vec<MachineGroup>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    Ok(Json(
        tenancy::list_machine_groups(&state.db, params.business_unit).await?,
    ))
}

/// Fetch a user's profile, creating it on first access
#[utoipa::path(
    get,
    path = "/v1/users/{user_id}/profile",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "The profile (created if absent)", body = UserProfile)
    ),
    tag = "tenancy"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserProfile>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    Ok(Json(tenancy::get_or_create_profile(&state.db, user_id).await?))
}
