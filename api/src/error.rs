use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use stocktake_core::error::{self, ApiError};

/// Internal error type that converts to structured API responses.
#[derive(Debug)]
pub enum AppError {
    /// Malformed structural input (400). The whole batch is rejected.
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Invalid or missing credentials (401)
    Unauthorized { message: String },
    /// Authenticated but not allowed (403)
    Forbidden { message: String },
    /// Direct entity lookup missed (404). List queries never produce this —
    /// an unknown scope yields an empty result set instead.
    NotFound { message: String },
    /// Uniqueness violation detected at commit time (409). The caller
    /// retries the whole batch.
    Conflict { message: String },
    /// Key generator retry budget exceeded (500). Operator-facing.
    KeyExhausted,
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    pub fn is_conflict(&self) -> bool {
        match self {
            AppError::Conflict { .. } => true,
            AppError::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Unauthorized { message } => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: error::codes::UNAUTHORIZED.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Forbidden { message } => (
                StatusCode::FORBIDDEN,
                ApiError {
                    error: error::codes::FORBIDDEN.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::NotFound { message } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Conflict { message } => (
                StatusCode::CONFLICT,
                ApiError {
                    error: error::codes::CONFLICT.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some(
                        "A concurrent write touched the same rows. Retry the whole batch."
                            .to_string(),
                    ),
                },
            ),
            AppError::KeyExhausted => {
                tracing::error!("key generation exhausted its collision retry budget");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::KEY_EXHAUSTED.to_string(),
                        message: "Key generation exhausted its retry budget".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::Database(err) => {
                // A unique violation surfacing here is a commit-time race.
                if let sqlx::Error::Database(ref db_err) = err
                    && db_err.code().as_deref() == Some("23505")
                {
                    return AppError::Conflict {
                        message: "Concurrent write conflict".to_string(),
                    }
                    .into_response();
                }
                tracing::error!("database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}
