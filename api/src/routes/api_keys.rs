use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use stocktake_core::error::ApiError;
use stocktake_core::model::{ApiKey, ApiKeyCreated};

use crate::auth;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::api_keys;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/api-keys", get(list_api_keys).post(create_api_key))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(default)]
    pub read_write: bool,
}

/// Create an API key pair
///
/// The private half is returned only from this call. The very first key may
/// be created without authentication (bootstrap); after that a read-write
/// key is required.
#[utoipa::path(
    post,
    path = "/v1/api-keys",
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "Key pair created; store the private half now", body = ApiKeyCreated),
        (status = 403, description = "Read-write API key required", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn create_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !api_keys::no_keys_exist(&state.db).await? {
        let identity = auth::authenticate_api_key(&state.db, &headers).await?;
        auth::require_read_write(&identity)?;
    }
    if req.name.trim().is_empty() {
        return Err(AppError::Validation {
            message: "name must not be empty".to_string(),
            field: Some("name".to_string()),
            received: None,
            docs_hint: None,
        });
    }

    let created = api_keys::create_api_key(&state.db, req.name.trim(), req.read_write).await?;
    tracing::info!(key_id = %created.id, name = %created.name, "api key created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// List API keys (public halves only)
#[utoipa::path(
    get,
    path = "/v1/api-keys",
    responses(
        (status = 200, description = "API keys without private halves", body = Vec<ApiKey>),
        (status = 401, description = "Missing or invalid API key", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn list_api_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ApiKey>>, AppError> {
    auth::authenticate_api_key(&state.db, &headers).await?;
    Ok(Json(api_keys::list_api_keys(&state.db).await?))
}
