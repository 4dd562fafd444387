//! Request authentication. Two credential kinds exist:
//!
//! - the machine-group key, a 128-char bearer token presented by agents on
//!   check-in, which also identifies the tenant the check-in belongs to;
//! - API key pairs (`x-api-public-key` / `x-api-private-key` headers) for the
//!   admin and reporting surface, with `read_write` gating mutations.

use axum::http::HeaderMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// The machine group a check-in was authenticated for.
#[derive(Debug, Clone, Copy)]
pub struct GroupIdentity {
    pub group_id: Uuid,
    pub business_unit_id: Uuid,
}

/// An authenticated API key.
#[derive(Debug, Clone, Copy)]
pub struct ApiIdentity {
    pub key_id: Uuid,
    pub read_write: bool,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Authenticate a check-in. A machine-group bearer key identifies the group
/// directly; alternatively a read-write API key may act on behalf of an
/// explicitly named group.
pub async fn authenticate_checkin(
    pool: &PgPool,
    headers: &HeaderMap,
    explicit_group: Option<Uuid>,
) -> Result<GroupIdentity, AppError> {
    if let Some(key) = bearer_token(headers) {
        let row = sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT id, business_unit_id FROM machine_groups WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(pool)
        .await?;

        return match row {
            Some((group_id, business_unit_id)) => Ok(GroupIdentity {
                group_id,
                business_unit_id,
            }),
            None => Err(AppError::Unauthorized {
                message: "Unknown machine group key".to_string(),
            }),
        };
    }

    let identity = authenticate_api_key(pool, headers).await?;
    if !identity.read_write {
        return Err(AppError::Forbidden {
            message: "Check-in on behalf of a group requires a read-write API key".to_string(),
        });
    }
    let group_id = explicit_group.ok_or_else(|| AppError::Validation {
        message: "machine_group query parameter is required with API key auth".to_string(),
        field: Some("machine_group".to_string()),
        received: None,
        docs_hint: Some(
            "Agents normally authenticate with their group key as a bearer token, \
             which identifies the group implicitly."
                .to_string(),
        ),
    })?;

    let row = sqlx::query_as::<_, (Uuid,)>(
        "SELECT business_unit_id FROM machine_groups WHERE id = $1",
    )
    .bind(group_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((business_unit_id,)) => Ok(GroupIdentity {
            group_id,
            business_unit_id,
        }),
        None => Err(AppError::Unauthorized {
            message: "Unknown machine group".to_string(),
        }),
    }
}

/// Authenticate an API key pair. Marks the key as seen on its first
/// successful use.
pub async fn authenticate_api_key(
    pool: &PgPool,
    headers: &HeaderMap,
) -> Result<ApiIdentity, AppError> {
    let header = |name: &str| -> Result<&str, AppError> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: format!("Missing {name} header"),
            })
    };
    let public = header("x-api-public-key")?;
    let private = header("x-api-private-key")?;

    let row = sqlx::query_as::<_, (Uuid, bool, bool)>(
        "SELECT id, read_write, has_been_seen FROM api_keys \
         WHERE public_key = $1 AND private_key = $2",
    )
    .bind(public)
    .bind(private)
    .fetch_optional(pool)
    .await?;

    let Some((key_id, read_write, has_been_seen)) = row else {
        return Err(AppError::Unauthorized {
            message: "Invalid API key".to_string(),
        });
    };

    if !has_been_seen {
        sqlx::query("UPDATE api_keys SET has_been_seen = true WHERE id = $1")
            .bind(key_id)
            .execute(pool)
            .await?;
    }

    Ok(ApiIdentity { key_id, read_write })
}

/// Gate for mutating admin endpoints.
pub fn require_read_write(identity: &ApiIdentity) -> Result<(), AppError> {
    if identity.read_write {
        Ok(())
    } else {
        Err(AppError::Forbidden {
            message: "This operation requires a read-write API key".to_string(),
        })
    }
}
