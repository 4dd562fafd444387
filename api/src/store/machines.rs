//! Machine lookups and the tenancy-scoped machine listing.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use stocktake_core::model::{Machine, OsFamily, PaginatedResponse, Scope};
use uuid::Uuid;

use crate::cursor;
use crate::error::AppError;

#[derive(Debug, Default)]
pub struct MachineFilter {
    pub deployed: Option<bool>,
    pub os_family: Option<OsFamily>,
    /// Free-text match over hostname and serial.
    pub q: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct MachineRow {
    id: Uuid,
    machine_group_id: Uuid,
    serial: String,
    hostname: Option<String>,
    operating_system: Option<String>,
    os_family: String,
    console_user: Option<String>,
    memory: Option<String>,
    memory_kb: i64,
    hd_space: Option<i64>,
    hd_total: Option<i64>,
    hd_percent: Option<String>,
    machine_model: Option<String>,
    machine_model_id: Option<i64>,
    machine_model_friendly: Option<String>,
    cpu_type: Option<String>,
    cpu_speed: Option<String>,
    agent_version: Option<String>,
    deployed: bool,
    broken_client: bool,
    first_checkin: DateTime<Utc>,
    last_checkin: DateTime<Utc>,
}

impl MachineRow {
    fn into_machine(self) -> Machine {
        Machine {
            id: self.id,
            machine_group_id: self.machine_group_id,
            serial: self.serial,
            hostname: self.hostname,
            operating_system: self.operating_system,
            os_family: OsFamily::parse(&self.os_family),
            console_user: self.console_user,
            memory: self.memory,
            memory_kb: self.memory_kb,
            hd_space: self.hd_space,
            hd_total: self.hd_total,
            hd_percent: self.hd_percent,
            machine_model: self.machine_model,
            machine_model_id: self.machine_model_id,
            machine_model_friendly: self.machine_model_friendly,
            cpu_type: self.cpu_type,
            cpu_speed: self.cpu_speed,
            agent_version: self.agent_version,
            deployed: self.deployed,
            broken_client: self.broken_client,
            first_checkin: self.first_checkin,
            last_checkin: self.last_checkin,
        }
    }
}

const MACHINE_COLUMNS: &str = "m.id, m.machine_group_id, m.serial, m.hostname, \
    m.operating_system, m.os_family, m.console_user, m.memory, m.memory_kb, \
    m.hd_space, m.hd_total, m.hd_percent, m.machine_model, m.machine_model_id, \
    m.machine_model_friendly, m.cpu_type, m.cpu_speed, m.agent_version, \
    m.deployed, m.broken_client, m.first_checkin, m.last_checkin";

pub async fn get_machine_by_serial(
    pool: &PgPool,
    serial: &str,
) -> Result<Option<Machine>, AppError> {
    let row = sqlx::query_as::<_, MachineRow>(&format!(
        "SELECT {MACHINE_COLUMNS} FROM machines m WHERE m.serial = $1"
    ))
    .bind(serial)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(MachineRow::into_machine))
}

/// Scoped machine listing, newest check-in first, cursor-paginated on
/// (last_checkin, id). Unknown scope ids simply match nothing.
pub async fn list_machines(
    pool: &PgPool,
    scope: Scope,
    filter: &MachineFilter,
    cursor: Option<&str>,
    limit: i64,
) -> Result<PaginatedResponse<Machine>, AppError> {
    let limit = limit.clamp(1, 200);
    let fetch_limit = limit + 1;
    let (bu, group, machine) = super::scope_binds(scope);
    let cursor_data = cursor.map(cursor::decode_uuid).transpose()?;

    let rows = sqlx::query_as::<_, MachineRow>(&format!(
        "SELECT {MACHINE_COLUMNS} \
         FROM machines m \
         JOIN machine_groups g ON g.id = m.machine_group_id \
         WHERE ($1::uuid IS NULL OR g.business_unit_id = $1) \
           AND ($2::uuid IS NULL OR m.machine_group_id = $2) \
           AND ($3::uuid IS NULL OR m.id = $3) \
           AND ($4::boolean IS NULL OR m.deployed = $4) \
           AND ($5::text IS NULL OR m.os_family = $5) \
           AND ($6::text IS NULL OR m.hostname ILIKE '%' || $6 || '%' \
                OR m.serial ILIKE '%' || $6 || '%') \
           AND ($7::timestamptz IS NULL OR m.last_checkin >= $7) \
           AND ($8::timestamptz IS NULL OR m.last_checkin < $8) \
           AND ($9::timestamptz IS NULL OR (m.last_checkin, m.id) < ($9, $10)) \
         ORDER BY m.last_checkin DESC, m.id DESC \
         LIMIT $11"
    ))
    .bind(bu)
    .bind(group)
    .bind(machine)
    .bind(filter.deployed)
    .bind(filter.os_family.map(|f| f.as_str()))
    .bind(&filter.q)
    .bind(filter.since)
    .bind(filter.until)
    .bind(cursor_data.map(|(ts, _)| ts))
    .bind(cursor_data.map(|(_, id)| id))
    .bind(fetch_limit)
    .fetch_all(pool)
    .await?;

    let has_more = rows.len() as i64 > limit;
    let machines: Vec<Machine> = rows
        .into_iter()
        .take(limit as usize)
        .map(MachineRow::into_machine)
        .collect();
    let next_cursor = has_more
        .then(|| {
            machines
                .last()
                .map(|m| cursor::encode(&m.last_checkin, &m.id.to_string()))
        })
        .flatten();

    Ok(PaginatedResponse {
        data: machines,
        next_cursor,
        has_more,
    })
}
