//! Reporting query surface: tenancy-scoped, filtered, cursor-paginated
//! listings over current state and history. Read-only; unknown scopes or
//! filters that match nothing return empty pages, never errors.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use stocktake_core::model::{
    Fact, HistoricalFact, ItemStatus, ManagedItem, ManagedItemHistoryEntry, Message, MessageType,
    PaginatedResponse, Scope,
};
use uuid::Uuid;

use crate::cursor;
use crate::error::AppError;

/// Common reporting filters. Fields that don't apply to an entity kind are
/// ignored by its query.
#[derive(Debug, Default)]
pub struct ReportFilter {
    /// Management source name.
    pub source: Option<String>,
    pub status: Option<ItemStatus>,
    pub message_type: Option<MessageType>,
    /// Free-text match over item name/data and machine hostname/serial.
    pub q: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

fn page<T, F>(rows: Vec<T>, limit: i64, cursor_of: F) -> PaginatedResponse<T>
where
    T: serde::Serialize,
    F: Fn(&T) -> String,
{
    let has_more = rows.len() as i64 > limit;
    let data: Vec<T> = rows.into_iter().take(limit as usize).collect();
    let next_cursor = has_more.then(|| data.last().map(|r| cursor_of(r))).flatten();
    PaginatedResponse {
        data,
        next_cursor,
        has_more,
    }
}

pub async fn list_managed_items(
    pool: &PgPool,
    scope: Scope,
    filter: &ReportFilter,
    cursor: Option<&str>,
    limit: i64,
) -> Result<PaginatedResponse<ManagedItem>, AppError> {
    let limit = limit.clamp(1, 200);
    let (bu, group, machine) = super::scope_binds(scope);
    let cursor_data = cursor.map(cursor::decode_uuid).transpose()?;

    let rows = sqlx::query_as::<_, (Uuid, Uuid, String, String, String, Option<String>, DateTime<Utc>)>(
        "SELECT i.id, i.machine_id, s.name, i.name, i.status, i.data, i.date_managed \
         FROM managed_items i \
         JOIN machines m ON m.id = i.machine_id \
         JOIN machine_groups g ON g.id = m.machine_group_id \
         JOIN management_sources s ON s.id = i.management_source_id \
         WHERE ($1::uuid IS NULL OR g.business_unit_id = $1) \
           AND ($2::uuid IS NULL OR m.machine_group_id = $2) \
           AND ($3::uuid IS NULL OR m.id = $3) \
           AND ($4::text IS NULL OR s.name = $4) \
           AND ($5::text IS NULL OR i.status = $5) \
           AND ($6::text IS NULL OR i.name ILIKE '%' || $6 || '%' \
                OR i.data ILIKE '%' || $6 || '%' \
                OR m.hostname ILIKE '%' || $6 || '%' \
                OR m.serial ILIKE '%' || $6 || '%') \
           AND ($7::timestamptz IS NULL OR i.date_managed >= $7) \
           AND ($8::timestamptz IS NULL OR i.date_managed < $8) \
           AND ($9::timestamptz IS NULL OR (i.date_managed, i.id) < ($9, $10)) \
         ORDER BY i.date_managed DESC, i.id DESC \
         LIMIT $11",
    )
    .bind(bu)
    .bind(group)
    .bind(machine)
    .bind(&filter.source)
    .bind(filter.status.map(|s| s.as_str()))
    .bind(&filter.q)
    .bind(filter.since)
    .bind(filter.until)
    .bind(cursor_data.map(|(ts, _)| ts))
    .bind(cursor_data.map(|(_, id)| id))
    .bind(limit + 1)
    .fetch_all(pool)
    .await?;

    let items: Vec<ManagedItem> = rows
        .into_iter()
        .map(
            |(id, machine_id, source, name, status, data, date_managed)| ManagedItem {
                id,
                machine_id,
                management_source: source,
                name,
                status: ItemStatus::parse(&status),
                data,
                date_managed,
            },
        )
        .collect();
    Ok(page(items, limit, |i| {
        cursor::encode(&i.date_managed, &i.id.to_string())
    }))
}

pub async fn list_managed_item_history(
    pool: &PgPool,
    scope: Scope,
    filter: &ReportFilter,
    cursor: Option<&str>,
    limit: i64,
) -> Result<PaginatedResponse<ManagedItemHistoryEntry>, AppError> {
    let limit = limit.clamp(1, 200);
    let (bu, group, machine) = super::scope_binds(scope);
    let cursor_data = cursor.map(cursor::decode_uuid).transpose()?;

    let rows = sqlx::query_as::<_, (Uuid, Uuid, String, String, String, DateTime<Utc>)>(
        "SELECT h.id, h.machine_id, s.name, h.name, h.status, h.recorded \
         FROM managed_item_history h \
         JOIN machines m ON m.id = h.machine_id \
         JOIN machine_groups g ON g.id = m.machine_group_id \
         JOIN management_sources s ON s.id = h.management_source_id \
         WHERE ($1::uuid IS NULL OR g.business_unit_id = $1) \
           AND ($2::uuid IS NULL OR m.machine_group_id = $2) \
           AND ($3::uuid IS NULL OR m.id = $3) \
           AND ($4::text IS NULL OR s.name = $4) \
           AND ($5::text IS NULL OR h.status = $5) \
           AND ($6::text IS NULL OR h.name ILIKE '%' || $6 || '%' \
                OR m.hostname ILIKE '%' || $6 || '%' \
                OR m.serial ILIKE '%' || $6 || '%') \
           AND ($7::timestamptz IS NULL OR h.recorded >= $7) \
           AND ($8::timestamptz IS NULL OR h.recorded < $8) \
           AND ($9::timestamptz IS NULL OR (h.recorded, h.id) < ($9, $10)) \
         ORDER BY h.recorded DESC, h.id DESC \
         LIMIT $11",
    )
    .bind(bu)
    .bind(group)
    .bind(machine)
    .bind(&filter.source)
    .bind(filter.status.map(|s| s.as_str()))
    .bind(&filter.q)
    .bind(filter.since)
    .bind(filter.until)
    .bind(cursor_data.map(|(ts, _)| ts))
    .bind(cursor_data.map(|(_, id)| id))
    .bind(limit + 1)
    .fetch_all(pool)
    .await?;

    let entries: Vec<ManagedItemHistoryEntry> = rows
        .into_iter()
        .map(
            |(id, machine_id, source, name, status, recorded)| ManagedItemHistoryEntry {
                id,
                machine_id,
                management_source: source,
                name,
                status: ItemStatus::parse(&status),
                recorded,
            },
        )
        .collect();
    Ok(page(entries, limit, |e| {
        cursor::encode(&e.recorded, &e.id.to_string())
    }))
}

pub async fn list_facts(
    pool: &PgPool,
    scope: Scope,
    filter: &ReportFilter,
    cursor: Option<&str>,
    limit: i64,
) -> Result<PaginatedResponse<Fact>, AppError> {
    let limit = limit.clamp(1, 200);
    let (bu, group, machine) = super::scope_binds(scope);
    let cursor_data = cursor.map(cursor::decode_i64).transpose()?;

    let rows = sqlx::query_as::<_, (i64, Uuid, String, String, String, DateTime<Utc>)>(
        "SELECT f.id, f.machine_id, s.name, f.name, f.value, f.updated_at \
         FROM facts f \
         JOIN machines m ON m.id = f.machine_id \
         JOIN machine_groups g ON g.id = m.machine_group_id \
         JOIN management_sources s ON s.id = f.management_source_id \
         WHERE ($1::uuid IS NULL OR g.business_unit_id = $1) \
           AND ($2::uuid IS NULL OR m.machine_group_id = $2) \
           AND ($3::uuid IS NULL OR m.id = $3) \
           AND ($4::text IS NULL OR s.name = $4) \
           AND ($5::text IS NULL OR f.name ILIKE '%' || $5 || '%' \
                OR f.value ILIKE '%' || $5 || '%' \
                OR m.hostname ILIKE '%' || $5 || '%' \
                OR m.serial ILIKE '%' || $5 || '%') \
           AND ($6::timestamptz IS NULL OR f.updated_at >= $6) \
           AND ($7::timestamptz IS NULL OR f.updated_at < $7) \
           AND ($8::timestamptz IS NULL OR (f.updated_at, f.id) < ($8, $9)) \
         ORDER BY f.updated_at DESC, f.id DESC \
         LIMIT $10",
    )
    .bind(bu)
    .bind(group)
    .bind(machine)
    .bind(&filter.source)
    .bind(&filter.q)
    .bind(filter.since)
    .bind(filter.until)
    .bind(cursor_data.map(|(ts, _)| ts))
    .bind(cursor_data.map(|(_, id)| id))
    .bind(limit + 1)
    .fetch_all(pool)
    .await?;

    let facts: Vec<Fact> = rows
        .into_iter()
        .map(|(id, machine_id, source, name, value, updated_at)| Fact {
            id,
            machine_id,
            management_source: source,
            name,
            value,
            updated_at,
        })
        .collect();
    Ok(page(facts, limit, |f| {
        cursor::encode(&f.updated_at, &f.id.to_string())
    }))
}

pub async fn list_historical_facts(
    pool: &PgPool,
    scope: Scope,
    filter: &ReportFilter,
    cursor: Option<&str>,
    limit: i64,
) -> Result<PaginatedResponse<HistoricalFact>, AppError> {
    let limit = limit.clamp(1, 200);
    let (bu, group, machine) = super::scope_binds(scope);
    let cursor_data = cursor.map(cursor::decode_i64).transpose()?;

    let rows = sqlx::query_as::<_, (i64, Uuid, String, String, String, DateTime<Utc>)>(
        "SELECT h.id, h.machine_id, s.name, h.name, h.value, h.recorded \
         FROM historical_facts h \
         JOIN machines m ON m.id = h.machine_id \
         JOIN machine_groups g ON g.id = m.machine_group_id \
         JOIN management_sources s ON s.id = h.management_source_id \
         WHERE ($1::uuid IS NULL OR g.business_unit_id = $1) \
           AND ($2::uuid IS NULL OR m.machine_group_id = $2) \
           AND ($3::uuid IS NULL OR m.id = $3) \
           AND ($4::text IS NULL OR s.name = $4) \
           AND ($5::text IS NULL OR h.name ILIKE '%' || $5 || '%' \
                OR h.value ILIKE '%' || $5 || '%' \
                OR m.hostname ILIKE '%' || $5 || '%' \
                OR m.serial ILIKE '%' || $5 || '%') \
           AND ($6::timestamptz IS NULL OR h.recorded >= $6) \
           AND ($7::timestamptz IS NULL OR h.recorded < $7) \
           AND ($8::timestamptz IS NULL OR (h.recorded, h.id) < ($8, $9)) \
         ORDER BY h.recorded DESC, h.id DESC \
         LIMIT $10",
    )
    .bind(bu)
    .bind(group)
    .bind(machine)
    .bind(&filter.source)
    .bind(&filter.q)
    .bind(filter.since)
    .bind(filter.until)
    .bind(cursor_data.map(|(ts, _)| ts))
    .bind(cursor_data.map(|(_, id)| id))
    .bind(limit + 1)
    .fetch_all(pool)
    .await?;

    let facts: Vec<HistoricalFact> = rows
        .into_iter()
        .map(|(id, machine_id, source, name, value, recorded)| HistoricalFact {
            id,
            machine_id,
            management_source: source,
            name,
            value,
            recorded,
        })
        .collect();
    Ok(page(facts, limit, |f| {
        cursor::encode(&f.recorded, &f.id.to_string())
    }))
}

pub async fn list_messages(
    pool: &PgPool,
    scope: Scope,
    filter: &ReportFilter,
    cursor: Option<&str>,
    limit: i64,
) -> Result<PaginatedResponse<Message>, AppError> {
    let limit = limit.clamp(1, 200);
    let (bu, group, machine) = super::scope_binds(scope);
    let cursor_data = cursor.map(cursor::decode_i64).transpose()?;

    let rows = sqlx::query_as::<_, (i64, Uuid, String, Option<String>, String, DateTime<Utc>)>(
        "SELECT msg.id, msg.machine_id, s.name, msg.text, msg.message_type, msg.date \
         FROM messages msg \
         JOIN machines m ON m.id = msg.machine_id \
         JOIN machine_groups g ON g.id = m.machine_group_id \
         JOIN management_sources s ON s.id = msg.management_source_id \
         WHERE ($1::uuid IS NULL OR g.business_unit_id = $1) \
           AND ($2::uuid IS NULL OR m.machine_group_id = $2) \
           AND ($3::uuid IS NULL OR m.id = $3) \
           AND ($4::text IS NULL OR s.name = $4) \
           AND ($5::text IS NULL OR msg.message_type = $5) \
           AND ($6::text IS NULL OR msg.text ILIKE '%' || $6 || '%' \
                OR m.hostname ILIKE '%' || $6 || '%' \
                OR m.serial ILIKE '%' || $6 || '%') \
           AND ($7::timestamptz IS NULL OR msg.date >= $7) \
           AND ($8::timestamptz IS NULL OR msg.date < $8) \
           AND ($9::timestamptz IS NULL OR (msg.date, msg.id) < ($9, $10)) \
         ORDER BY msg.date DESC, msg.id DESC \
         LIMIT $11",
    )
    .bind(bu)
    .bind(group)
    .bind(machine)
    .bind(&filter.source)
    .bind(filter.message_type.map(|t| t.as_str()))
    .bind(&filter.q)
    .bind(filter.since)
    .bind(filter.until)
    .bind(cursor_data.map(|(ts, _)| ts))
    .bind(cursor_data.map(|(_, id)| id))
    .bind(limit + 1)
    .fetch_all(pool)
    .await?;

    let messages: Vec<Message> = rows
        .into_iter()
        .map(|(id, machine_id, source, text, message_type, date)| Message {
            id,
            machine_id,
            management_source: source,
            text,
            message_type: MessageType::parse(&message_type),
            date,
        })
        .collect();
    Ok(page(messages, limit, |m| {
        cursor::encode(&m.date, &m.id.to_string())
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use stocktake_core::checkin::{CheckinRequest, ManagedItemReport, SourceReport};
    use stocktake_core::keys;

    use super::*;
    use crate::store::reconcile;

    async fn seed_tenant(pool: &PgPool, name: &str) -> (Uuid, Uuid) {
        let bu_id = Uuid::now_v7();
        sqlx::query("INSERT INTO business_units (id, name) VALUES ($1, $2)")
            .bind(bu_id)
            .bind(name)
            .execute(pool)
            .await
            .unwrap();
        let group_id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO machine_groups (id, business_unit_id, name, key) VALUES ($1, $2, $3, $4)",
        )
        .bind(group_id)
        .bind(bu_id)
        .bind(name)
        .bind(keys::generate_group_key())
        .execute(pool)
        .await
        .unwrap();
        (bu_id, group_id)
    }

    fn checkin_with_item(serial: &str, item: &str) -> CheckinRequest {
        let mut sources = BTreeMap::new();
        sources.insert(
            "munki".to_string(),
            SourceReport {
                managed_items: vec![ManagedItemReport {
                    name: item.to_string(),
                    status: ItemStatus::Present,
                    data: None,
                    date_managed: None,
                }],
                ..Default::default()
            },
        );
        CheckinRequest {
            serial: serial.to_string(),
            machine: Default::default(),
            sources,
            plugin_results: Vec::new(),
        }
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn business_unit_scope_excludes_other_tenants(pool: PgPool) {
        let (bu_a, group_a) = seed_tenant(&pool, "acme").await;
        let (_, group_b) = seed_tenant(&pool, "globex").await;
        reconcile::process_checkin(&pool, group_a, &checkin_with_item("SER-A", "firefox"), Utc::now())
            .await
            .unwrap();
        reconcile::process_checkin(&pool, group_b, &checkin_with_item("SER-B", "chrome"), Utc::now())
            .await
            .unwrap();

        let scoped = list_managed_items(
            &pool,
            Scope::BusinessUnit(bu_a),
            &ReportFilter::default(),
            None,
            50,
        )
        .await
        .unwrap();
        assert_eq!(scoped.data.len(), 1);
        assert_eq!(scoped.data[0].name, "firefox");

        let all = list_managed_items(&pool, Scope::All, &ReportFilter::default(), None, 50)
            .await
            .unwrap();
        assert_eq!(all.data.len(), 2);
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn machine_group_scope_narrows_within_a_business_unit(pool: PgPool) {
        let (bu, group_a) = seed_tenant(&pool, "acme").await;
        let group_b = {
            let id = Uuid::now_v7();
            sqlx::query(
                "INSERT INTO machine_groups (id, business_unit_id, name, key) VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(bu)
            .bind("acme-lab")
            .bind(keys::generate_group_key())
            .execute(&pool)
            .await
            .unwrap();
            id
        };
        reconcile::process_checkin(&pool, group_a, &checkin_with_item("SER-A", "firefox"), Utc::now())
            .await
            .unwrap();
        reconcile::process_checkin(&pool, group_b, &checkin_with_item("SER-B", "chrome"), Utc::now())
            .await
            .unwrap();

        let scoped = list_managed_items(
            &pool,
            Scope::MachineGroup(group_b),
            &ReportFilter::default(),
            None,
            50,
        )
        .await
        .unwrap();
        assert_eq!(scoped.data.len(), 1);
        assert_eq!(scoped.data[0].name, "chrome");

        let whole_unit = list_managed_items(
            &pool,
            Scope::BusinessUnit(bu),
            &ReportFilter::default(),
            None,
            50,
        )
        .await
        .unwrap();
        assert_eq!(whole_unit.data.len(), 2);
    }
}
