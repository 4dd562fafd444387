//! Business units, machine groups, and user profiles.

use sqlx::PgPool;
use stocktake_core::keys;
use stocktake_core::model::{BusinessUnit, MachineGroup, ProfileLevel, UserProfile};
use uuid::Uuid;

use crate::error::AppError;

pub async fn create_business_unit(pool: &PgPool, name: &str) -> Result<BusinessUnit, AppError> {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO business_units (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(BusinessUnit {
        id,
        name: name.to_string(),
    })
}

pub async fn list_business_units(pool: &PgPool) -> Result<Vec<BusinessUnit>, AppError> {
    let rows = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT id, name FROM business_units ORDER BY name, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, name)| BusinessUnit { id, name })
        .collect())
}

pub async fn delete_business_unit(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM business_units WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound {
            message: format!("Business unit {id} does not exist"),
        });
    }
    Ok(())
}

/// Attach a user to a business unit. Idempotent.
pub async fn add_member(pool: &PgPool, business_unit_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO business_unit_members (business_unit_id, user_id) \
         VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(business_unit_id)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|e| match &e {
        // FK violation: the business unit does not exist.
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23503") => {
            AppError::NotFound {
                message: format!("Business unit {business_unit_id} does not exist"),
            }
        }
        _ => AppError::Database(e),
    })?;
    Ok(())
}

/// Create a machine group with a freshly generated key. The uniqueness check
/// and the insert run in the same transaction, so two concurrent creations
/// can never both persist the same key; a collision at commit is retried up
/// to the generator's budget.
pub async fn create_machine_group(
    pool: &PgPool,
    business_unit_id: Uuid,
    name: &str,
) -> Result<MachineGroup, AppError> {
    for _ in 0..keys::MAX_KEY_ATTEMPTS {
        let key = keys::generate_group_key();
        let id = Uuid::now_v7();

        let result = sqlx::query(
            "INSERT INTO machine_groups (id, business_unit_id, name, key) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (key) DO NOTHING",
        )
        .bind(id)
        .bind(business_unit_id)
        .bind(name)
        .bind(&key)
        .execute(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23503") => {
                AppError::NotFound {
                    message: format!("Business unit {business_unit_id} does not exist"),
                }
            }
            _ => AppError::Database(e),
        })?;

        if result.rows_affected() == 1 {
            return Ok(MachineGroup {
                id,
                business_unit_id,
                name: name.to_string(),
                key,
            });
        }
        tracing::warn!("machine group key collision, regenerating");
    }
    Err(AppError::KeyExhausted)
}

pub async fn list_machine_groups(
    pool: &PgPool,
    business_unit_id: Option<Uuid>,
) -> Result<Vec<MachineGroup>, AppError> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, String, String)>(
        "SELECT id, business_unit_id, name, key FROM machine_groups \
         WHERE ($1::uuid IS NULL OR business_unit_id = $1) \
         ORDER BY name, id",
    )
    .bind(business_unit_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(id, business_unit_id, name, key)| MachineGroup {
            id,
            business_unit_id,
            name,
            key,
        })
        .collect())
}

/// Every user has a profile; it is created lazily on first access with the
/// default level.
pub async fn get_or_create_profile(pool: &PgPool, user_id: Uuid) -> Result<UserProfile, AppError> {
    sqlx::query("INSERT INTO user_profiles (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(pool)
        .await?;

    let (level,) =
        sqlx::query_as::<_, (String,)>("SELECT level FROM user_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    Ok(UserProfile {
        user_id,
        level: ProfileLevel::parse(&level),
    })
}
