use sqlx::PgPool;
use stocktake_core::keys;
use stocktake_core::model::{ApiKey, ApiKeyCreated};
use uuid::Uuid;

use crate::error::AppError;

/// Create an API key pair. Both halves are generated together and never
/// regenerated; the private half is returned only from this call. The public
/// half is collision-checked against the table with the generator's retry
/// budget.
pub async fn create_api_key(
    pool: &PgPool,
    name: &str,
    read_write: bool,
) -> Result<ApiKeyCreated, AppError> {
    for _ in 0..keys::MAX_KEY_ATTEMPTS {
        let id = Uuid::now_v7();
        let public_key = keys::generate_api_public_key();
        let private_key = keys::generate_api_private_key();

        let result = sqlx::query(
            "INSERT INTO api_keys (id, name, public_key, private_key, read_write) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (public_key) DO NOTHING",
        )
        .bind(id)
        .bind(name)
        .bind(&public_key)
        .bind(&private_key)
        .bind(read_write)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(ApiKeyCreated {
                id,
                name: name.to_string(),
                public_key,
                private_key,
                read_write,
            });
        }
        tracing::warn!("api key public half collision, regenerating");
    }
    Err(AppError::KeyExhausted)
}

/// Listing never exposes the private half.
pub async fn list_api_keys(pool: &PgPool) -> Result<Vec<ApiKey>, AppError> {
    let rows = sqlx::query_as::<_, (Uuid, String, String, bool, bool)>(
        "SELECT id, name, public_key, read_write, has_been_seen FROM api_keys ORDER BY name, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, name, public_key, read_write, has_been_seen)| ApiKey {
            id,
            name,
            public_key,
            read_write,
            has_been_seen,
        })
        .collect())
}

/// True when no keys exist yet. The first key may then be created without
/// authentication (bootstrap).
pub async fn no_keys_exist(pool: &PgPool) -> Result<bool, AppError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys")
        .fetch_one(pool)
        .await?;
    Ok(count == 0)
}
