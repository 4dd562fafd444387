//! Check-in reconciliation. Given a machine (resolved or created via its
//! serial) and a fresh batch of reported state, diff against current state,
//! archive superseded rows into the history tables, and replace current
//! state — all inside one transaction, with the machine row locked so
//! concurrent check-ins for the same serial serialize while other machines
//! proceed independently.
//!
//! The diff itself is a pure function over the loaded current state
//! ([`plan_managed_items`], [`plan_facts`]), so its invariants are unit
//! tested without a database. The apply step executes the plan: history
//! inserts always precede the overwrite of the row they archive.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use stocktake_core::checkin::{
    CheckinRequest, CheckinSummary, ManagedItemReport, MessageReport, PluginResult,
};
use stocktake_core::coerce;
use stocktake_core::model::ItemStatus;
use uuid::Uuid;

use crate::error::AppError;

type Tx<'a> = Transaction<'a, Postgres>;

/// Apply a full check-in batch. All-or-nothing: any structural failure rolls
/// the transaction back and current state is left exactly as it was.
pub async fn process_checkin(
    pool: &PgPool,
    group_id: Uuid,
    req: &CheckinRequest,
    now: DateTime<Utc>,
) -> Result<CheckinSummary, AppError> {
    let mut tx = pool.begin().await?;

    let (machine_id, new_machine) = lock_or_create_machine(&mut tx, group_id, req, now).await?;

    let mut managed_items = 0;
    let mut facts = 0;
    let mut messages = 0;

    for (source_name, report) in &req.sources {
        let source_id = get_or_create_source(&mut tx, source_name).await?;

        let current = load_current_items(&mut tx, machine_id, source_id).await?;
        let plan = plan_managed_items(&current, &report.managed_items, now);
        managed_items += apply_item_plan(&mut tx, machine_id, source_id, &plan).await?;

        let current = load_current_facts(&mut tx, machine_id, source_id).await?;
        let plan = plan_facts(&current, &report.facts);
        facts += apply_fact_plan(&mut tx, machine_id, source_id, &plan, now).await?;

        insert_messages(&mut tx, machine_id, source_id, &report.messages, now).await?;
        messages += report.messages.len();
    }

    let mut plugin_rows = 0;
    for result in &req.plugin_results {
        plugin_rows += record_plugin_result(&mut tx, machine_id, result, now).await?;
    }

    tx.commit().await?;

    Ok(CheckinSummary {
        machine_id,
        serial: req.serial.clone(),
        new_machine,
        managed_items,
        facts,
        plugin_rows,
        messages,
    })
}

/// Resolve the machine by serial with a row lock, creating it on first
/// check-in. The insert races through `ON CONFLICT (serial) DO NOTHING`, so
/// two concurrent first check-ins for the same serial can never create two
/// rows: the loser re-selects the winner's row and blocks on its lock.
async fn lock_or_create_machine(
    tx: &mut Tx<'_>,
    group_id: Uuid,
    req: &CheckinRequest,
    now: DateTime<Utc>,
) -> Result<(Uuid, bool), AppError> {
    let existing =
        sqlx::query_as::<_, (Uuid,)>("SELECT id FROM machines WHERE serial = $1 FOR UPDATE")
            .bind(&req.serial)
            .fetch_optional(&mut **tx)
            .await?;

    if let Some((id,)) = existing {
        update_machine(tx, id, group_id, req, now).await?;
        return Ok((id, false));
    }

    let id = Uuid::now_v7();
    let m = &req.machine;
    let inserted = sqlx::query_as::<_, (Uuid,)>(
        "INSERT INTO machines (\
             id, machine_group_id, serial, hostname, operating_system, os_family, \
             console_user, memory, memory_kb, hd_space, hd_total, hd_percent, \
             machine_model, machine_model_id, machine_model_friendly, cpu_type, \
             cpu_speed, agent_version, deployed, broken_client, first_checkin, last_checkin) \
         VALUES ($1, $2, $3, $4, $5, COALESCE($6, 'Darwin'), $7, $8, COALESCE($9, 0), \
                 $10, $11, $12, $13, $14, $15, $16, $17, $18, \
                 COALESCE($19, true), COALESCE($20, false), $21, $21) \
         ON CONFLICT (serial) DO NOTHING \
         RETURNING id",
    )
    .bind(id)
    .bind(group_id)
    .bind(&req.serial)
    .bind(&m.hostname)
    .bind(&m.operating_system)
    .bind(m.os_family.map(|f| f.as_str()))
    .bind(&m.console_user)
    .bind(&m.memory)
    .bind(m.memory_kb)
    .bind(m.hd_space)
    .bind(m.hd_total)
    .bind(&m.hd_percent)
    .bind(&m.machine_model)
    .bind(m.machine_model_id)
    .bind(&m.machine_model_friendly)
    .bind(&m.cpu_type)
    .bind(&m.cpu_speed)
    .bind(&m.agent_version)
    .bind(m.deployed)
    .bind(m.broken_client)
    .bind(now)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some((id,)) = inserted {
        return Ok((id, true));
    }

    // Lost a creation race: lock the row the concurrent check-in created.
    let (id,) = sqlx::query_as::<_, (Uuid,)>("SELECT id FROM machines WHERE serial = $1 FOR UPDATE")
        .bind(&req.serial)
        .fetch_one(&mut **tx)
        .await?;
    update_machine(tx, id, group_id, req, now).await?;
    Ok((id, false))
}

/// Update `last_checkin` and any supplied descriptive fields. Omitted fields
/// keep their previous value; `first_checkin` is never touched.
async fn update_machine(
    tx: &mut Tx<'_>,
    id: Uuid,
    group_id: Uuid,
    req: &CheckinRequest,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let m = &req.machine;
    sqlx::query(
        "UPDATE machines SET \
             machine_group_id = $2, \
             hostname = COALESCE($3, hostname), \
             operating_system = COALESCE($4, operating_system), \
             os_family = COALESCE($5, os_family), \
             console_user = COALESCE($6, console_user), \
             memory = COALESCE($7, memory), \
             memory_kb = COALESCE($8, memory_kb), \
             hd_space = COALESCE($9, hd_space), \
             hd_total = COALESCE($10, hd_total), \
             hd_percent = COALESCE($11, hd_percent), \
             machine_model = COALESCE($12, machine_model), \
             machine_model_id = COALESCE($13, machine_model_id), \
             machine_model_friendly = COALESCE($14, machine_model_friendly), \
             cpu_type = COALESCE($15, cpu_type), \
             cpu_speed = COALESCE($16, cpu_speed), \
             agent_version = COALESCE($17, agent_version), \
             deployed = COALESCE($18, deployed), \
             broken_client = COALESCE($19, broken_client), \
             last_checkin = $20 \
         WHERE id = $1",
    )
    .bind(id)
    .bind(group_id)
    .bind(&m.hostname)
    .bind(&m.operating_system)
    .bind(m.os_family.map(|f| f.as_str()))
    .bind(&m.console_user)
    .bind(&m.memory)
    .bind(m.memory_kb)
    .bind(m.hd_space)
    .bind(m.hd_total)
    .bind(&m.hd_percent)
    .bind(&m.machine_model)
    .bind(m.machine_model_id)
    .bind(&m.machine_model_friendly)
    .bind(&m.cpu_type)
    .bind(&m.cpu_speed)
    .bind(&m.agent_version)
    .bind(m.deployed)
    .bind(m.broken_client)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Management sources are created on first sight and immutable afterwards.
/// The UUIDv7 id makes sources time-sortable by creation.
async fn get_or_create_source(tx: &mut Tx<'_>, name: &str) -> Result<Uuid, AppError> {
    let inserted = sqlx::query_as::<_, (Uuid,)>(
        "INSERT INTO management_sources (id, name) VALUES ($1, $2) \
         ON CONFLICT (name) DO NOTHING RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some((id,)) = inserted {
        return Ok(id);
    }
    let (id,) = sqlx::query_as::<_, (Uuid,)>("SELECT id FROM management_sources WHERE name = $1")
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

// --- Managed items ---

/// Current-state row loaded for diffing.
#[derive(Debug, Clone)]
pub(crate) struct CurrentItem {
    pub id: Uuid,
    pub name: String,
    pub status: ItemStatus,
    pub data: Option<String>,
    pub date_managed: DateTime<Utc>,
}

/// History row to insert before its current-state row is overwritten.
/// `recorded` carries the OLD date_managed, preserving what the state was.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ItemArchive {
    pub name: String,
    pub status: ItemStatus,
    pub recorded: DateTime<Utc>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum ItemAction {
    Insert {
        name: String,
        status: ItemStatus,
        data: Option<String>,
        date_managed: DateTime<Utc>,
    },
    Update {
        id: Uuid,
        status: ItemStatus,
        data: Option<String>,
        date_managed: DateTime<Utc>,
        /// None when the report matches current state — an unchanged item
        /// bumps its date without producing a spurious history row.
        archive: Option<ItemArchive>,
    },
    /// Item no longer reported by its source: archive, then mark ABSENT.
    /// Never deleted — the last known state always leaves an archived trace.
    Demote {
        id: Uuid,
        name: String,
        date_managed: DateTime<Utc>,
        archive: ItemArchive,
    },
}

/// Diff the incoming batch against current state for one (machine, source)
/// pair. Incoming duplicates by name collapse to the last occurrence so the
/// plan can never violate the (machine, name, source) uniqueness invariant.
pub(crate) fn plan_managed_items(
    current: &[CurrentItem],
    incoming: &[ManagedItemReport],
    now: DateTime<Utc>,
) -> Vec<ItemAction> {
    let mut deduped: BTreeMap<&str, &ManagedItemReport> = BTreeMap::new();
    for report in incoming {
        deduped.insert(report.name.as_str(), report);
    }

    let mut remaining: BTreeMap<&str, &CurrentItem> =
        current.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut actions = Vec::new();
    for (name, report) in deduped {
        let date_managed = report.date_managed.unwrap_or(now);
        match remaining.remove(name) {
            Some(existing) => {
                let changed = existing.status != report.status || existing.data != report.data;
                actions.push(ItemAction::Update {
                    id: existing.id,
                    status: report.status,
                    data: report.data.clone(),
                    date_managed,
                    archive: changed.then(|| ItemArchive {
                        name: existing.name.clone(),
                        status: existing.status,
                        recorded: existing.date_managed,
                    }),
                });
            }
            None => actions.push(ItemAction::Insert {
                name: report.name.clone(),
                status: report.status,
                data: report.data.clone(),
                date_managed,
            }),
        }
    }

    for (_, orphan) in remaining {
        // Already-absent orphans are settled; re-demoting them every
        // check-in would flood history with ABSENT→ABSENT rows.
        if orphan.status == ItemStatus::Absent {
            continue;
        }
        actions.push(ItemAction::Demote {
            id: orphan.id,
            name: orphan.name.clone(),
            date_managed: now,
            archive: ItemArchive {
                name: orphan.name.clone(),
                status: orphan.status,
                recorded: orphan.date_managed,
            },
        });
    }

    actions
}

async fn load_current_items(
    tx: &mut Tx<'_>,
    machine_id: Uuid,
    source_id: Uuid,
) -> Result<Vec<CurrentItem>, AppError> {
    let rows = sqlx::query_as::<_, (Uuid, String, String, Option<String>, DateTime<Utc>)>(
        "SELECT id, name, status, data, date_managed FROM managed_items \
         WHERE machine_id = $1 AND management_source_id = $2",
    )
    .bind(machine_id)
    .bind(source_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, status, data, date_managed)| CurrentItem {
            id,
            name,
            status: ItemStatus::parse(&status),
            data,
            date_managed,
        })
        .collect())
}

async fn insert_item_archive(
    tx: &mut Tx<'_>,
    machine_id: Uuid,
    source_id: Uuid,
    archive: &ItemArchive,
) -> Result<(), AppError> {
    // DO NOTHING upholds the (machine, name, source, recorded) invariant if
    // a retried batch archives the same snapshot twice.
    sqlx::query(
        "INSERT INTO managed_item_history (id, machine_id, management_source_id, name, status, recorded) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (machine_id, name, management_source_id, recorded) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(machine_id)
    .bind(source_id)
    .bind(&archive.name)
    .bind(archive.status.as_str())
    .bind(archive.recorded)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn apply_item_plan(
    tx: &mut Tx<'_>,
    machine_id: Uuid,
    source_id: Uuid,
    plan: &[ItemAction],
) -> Result<usize, AppError> {
    let mut written = 0;
    for action in plan {
        match action {
            ItemAction::Insert {
                name,
                status,
                data,
                date_managed,
            } => {
                sqlx::query(
                    "INSERT INTO managed_items (id, machine_id, management_source_id, name, status, data, date_managed) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .bind(Uuid::now_v7())
                .bind(machine_id)
                .bind(source_id)
                .bind(name)
                .bind(status.as_str())
                .bind(data)
                .bind(date_managed)
                .execute(&mut **tx)
                .await?;
                written += 1;
            }
            ItemAction::Update {
                id,
                status,
                data,
                date_managed,
                archive,
            } => {
                if let Some(archive) = archive {
                    insert_item_archive(tx, machine_id, source_id, archive).await?;
                }
                sqlx::query(
                    "UPDATE managed_items SET status = $2, data = $3, date_managed = $4 WHERE id = $1",
                )
                .bind(id)
                .bind(status.as_str())
                .bind(data)
                .bind(date_managed)
                .execute(&mut **tx)
                .await?;
                written += 1;
            }
            ItemAction::Demote {
                id,
                name,
                date_managed,
                archive,
            } => {
                insert_item_archive(tx, machine_id, source_id, archive).await?;
                tracing::debug!(item = %name, "demoting unreported managed item to ABSENT");
                sqlx::query(
                    "UPDATE managed_items SET status = 'ABSENT', date_managed = $2 WHERE id = $1",
                )
                .bind(id)
                .bind(date_managed)
                .execute(&mut **tx)
                .await?;
            }
        }
    }
    Ok(written)
}

// --- Facts ---

#[derive(Debug, Clone)]
pub(crate) struct CurrentFact {
    pub id: i64,
    pub name: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// History row for a superseded fact; `recorded` carries the OLD updated_at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FactArchive {
    pub name: String,
    pub value: String,
    pub recorded: DateTime<Utc>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum FactAction {
    Insert {
        name: String,
        value: String,
    },
    Update {
        id: i64,
        value: String,
        archive: FactArchive,
    },
    /// Facts carry no status column to demote to, so an orphaned fact is
    /// archived and removed.
    Delete {
        id: i64,
        archive: FactArchive,
    },
}

pub(crate) fn plan_facts(
    current: &[CurrentFact],
    incoming: &BTreeMap<String, String>,
) -> Vec<FactAction> {
    let mut remaining: BTreeMap<&str, &CurrentFact> =
        current.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut actions = Vec::new();
    for (name, value) in incoming {
        match remaining.remove(name.as_str()) {
            Some(existing) if existing.value == *value => {} // unchanged
            Some(existing) => actions.push(FactAction::Update {
                id: existing.id,
                value: value.clone(),
                archive: FactArchive {
                    name: existing.name.clone(),
                    value: existing.value.clone(),
                    recorded: existing.updated_at,
                },
            }),
            None => actions.push(FactAction::Insert {
                name: name.clone(),
                value: value.clone(),
            }),
        }
    }

    for (_, orphan) in remaining {
        actions.push(FactAction::Delete {
            id: orphan.id,
            archive: FactArchive {
                name: orphan.name.clone(),
                value: orphan.value.clone(),
                recorded: orphan.updated_at,
            },
        });
    }

    actions
}

async fn load_current_facts(
    tx: &mut Tx<'_>,
    machine_id: Uuid,
    source_id: Uuid,
) -> Result<Vec<CurrentFact>, AppError> {
    let rows = sqlx::query_as::<_, (i64, String, String, DateTime<Utc>)>(
        "SELECT id, name, value, updated_at FROM facts \
         WHERE machine_id = $1 AND management_source_id = $2",
    )
    .bind(machine_id)
    .bind(source_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, value, updated_at)| CurrentFact {
            id,
            name,
            value,
            updated_at,
        })
        .collect())
}

async fn insert_fact_archive(
    tx: &mut Tx<'_>,
    machine_id: Uuid,
    source_id: Uuid,
    archive: &FactArchive,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO historical_facts (machine_id, management_source_id, name, value, recorded) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(machine_id)
    .bind(source_id)
    .bind(&archive.name)
    .bind(&archive.value)
    .bind(archive.recorded)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn apply_fact_plan(
    tx: &mut Tx<'_>,
    machine_id: Uuid,
    source_id: Uuid,
    plan: &[FactAction],
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    let mut written = 0;
    for action in plan {
        match action {
            FactAction::Insert { name, value } => {
                sqlx::query(
                    "INSERT INTO facts (machine_id, management_source_id, name, value, updated_at) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(machine_id)
                .bind(source_id)
                .bind(name)
                .bind(value)
                .bind(now)
                .execute(&mut **tx)
                .await?;
                written += 1;
            }
            FactAction::Update { id, value, archive } => {
                insert_fact_archive(tx, machine_id, source_id, archive).await?;
                sqlx::query("UPDATE facts SET value = $2, updated_at = $3 WHERE id = $1")
                    .bind(id)
                    .bind(value)
                    .bind(now)
                    .execute(&mut **tx)
                    .await?;
                written += 1;
            }
            FactAction::Delete { id, archive } => {
                insert_fact_archive(tx, machine_id, source_id, archive).await?;
                sqlx::query("DELETE FROM facts WHERE id = $1")
                    .bind(id)
                    .execute(&mut **tx)
                    .await?;
            }
        }
    }
    Ok(written)
}

// --- Messages and plugin results ---

async fn insert_messages(
    tx: &mut Tx<'_>,
    machine_id: Uuid,
    source_id: Uuid,
    messages: &[MessageReport],
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    for message in messages {
        sqlx::query(
            "INSERT INTO messages (machine_id, management_source_id, text, message_type, date) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(machine_id)
        .bind(source_id)
        .bind(&message.text)
        .bind(message.message_type.as_str())
        .bind(message.date.unwrap_or(now))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Supersede the live submission for (machine, plugin) and record a new one.
/// Each row gets the three typed columns derived from its raw payload.
async fn record_plugin_result(
    tx: &mut Tx<'_>,
    machine_id: Uuid,
    result: &PluginResult,
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    sqlx::query(
        "UPDATE plugin_script_submissions SET historical = true \
         WHERE machine_id = $1 AND plugin = $2 AND historical = false",
    )
    .bind(machine_id)
    .bind(&result.plugin)
    .execute(&mut **tx)
    .await?;

    let (submission_id,) = sqlx::query_as::<_, (i64,)>(
        "INSERT INTO plugin_script_submissions (machine_id, plugin, recorded) \
         VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(machine_id)
    .bind(&result.plugin)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;

    for row in &result.rows {
        let raw = row.data.as_deref();
        sqlx::query(
            "INSERT INTO plugin_script_rows (submission_id, name, data, data_string, data_int, data_date) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(submission_id)
        .bind(&row.name)
        .bind(&row.data)
        .bind(coerce::coerce_string(raw))
        .bind(coerce::coerce_int(raw))
        .bind(coerce::coerce_date(raw))
        .execute(&mut **tx)
        .await?;
    }
    Ok(result.rows.len())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
    }

    fn current(name: &str, status: ItemStatus, data: Option<&str>, seen: DateTime<Utc>) -> CurrentItem {
        CurrentItem {
            id: Uuid::now_v7(),
            name: name.to_string(),
            status,
            data: data.map(String::from),
            date_managed: seen,
        }
    }

    fn report(name: &str, status: ItemStatus, data: Option<&str>) -> ManagedItemReport {
        ManagedItemReport {
            name: name.to_string(),
            status,
            data: data.map(String::from),
            date_managed: None,
        }
    }

    #[test]
    fn first_checkin_inserts_without_history() {
        let incoming = vec![
            report("firefox", ItemStatus::Present, None),
            report("munki", ItemStatus::Pending, Some("1.2")),
        ];
        let plan = plan_managed_items(&[], &incoming, ts(10));

        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|a| matches!(a, ItemAction::Insert { .. })));
    }

    #[test]
    fn changed_item_archives_old_state_with_old_timestamp() {
        let old = ts(8);
        let existing = current("firefox", ItemStatus::Pending, Some("120"), old);
        let incoming = vec![report("firefox", ItemStatus::Present, Some("121"))];

        let plan = plan_managed_items(std::slice::from_ref(&existing), &incoming, ts(10));

        assert_eq!(plan.len(), 1);
        let ItemAction::Update {
            id,
            status,
            date_managed,
            archive,
            ..
        } = &plan[0]
        else {
            panic!("expected update, got {:?}", plan[0]);
        };
        assert_eq!(*id, existing.id);
        assert_eq!(*status, ItemStatus::Present);
        // Current row gets the NEW timestamp; the archive keeps the OLD one.
        assert_eq!(*date_managed, ts(10));
        let archive = archive.as_ref().expect("changed item must archive");
        assert_eq!(archive.status, ItemStatus::Pending);
        assert_eq!(archive.recorded, old);
    }

    #[test]
    fn identical_resubmission_skips_archiving() {
        let existing = current("firefox", ItemStatus::Present, Some("121"), ts(8));
        let incoming = vec![report("firefox", ItemStatus::Present, Some("121"))];

        let plan = plan_managed_items(&[existing], &incoming, ts(10));

        assert_eq!(plan.len(), 1);
        let ItemAction::Update {
            archive,
            date_managed,
            ..
        } = &plan[0]
        else {
            panic!("expected update, got {:?}", plan[0]);
        };
        assert!(archive.is_none(), "unchanged item must not archive");
        assert_eq!(*date_managed, ts(10));
    }

    #[test]
    fn orphan_is_demoted_to_absent_with_archived_trace() {
        let old = ts(8);
        let gone = current("flash", ItemStatus::Present, None, old);
        let kept = current("firefox", ItemStatus::Present, None, old);
        let incoming = vec![report("firefox", ItemStatus::Present, None)];

        let plan = plan_managed_items(&[gone.clone(), kept], &incoming, ts(10));

        let demote = plan
            .iter()
            .find(|a| matches!(a, ItemAction::Demote { .. }))
            .expect("unreported item must be demoted");
        let ItemAction::Demote {
            id,
            date_managed,
            archive,
            ..
        } = demote
        else {
            unreachable!()
        };
        assert_eq!(*id, gone.id);
        assert_eq!(*date_managed, ts(10));
        assert_eq!(archive.status, ItemStatus::Present);
        assert_eq!(archive.recorded, old);
    }

    #[test]
    fn already_absent_orphan_is_left_alone() {
        let existing = current("flash", ItemStatus::Absent, None, ts(8));
        let plan = plan_managed_items(&[existing], &[], ts(10));
        assert!(plan.is_empty());
    }

    #[test]
    fn duplicate_names_in_batch_collapse_to_last() {
        let incoming = vec![
            report("firefox", ItemStatus::Pending, Some("old")),
            report("firefox", ItemStatus::Present, Some("new")),
        ];
        let plan = plan_managed_items(&[], &incoming, ts(10));

        assert_eq!(plan.len(), 1);
        let ItemAction::Insert { status, data, .. } = &plan[0] else {
            panic!("expected insert, got {:?}", plan[0]);
        };
        assert_eq!(*status, ItemStatus::Present);
        assert_eq!(data.as_deref(), Some("new"));
    }

    #[test]
    fn explicit_date_managed_is_honored() {
        let reported = ts(6);
        let incoming = vec![ManagedItemReport {
            name: "firefox".to_string(),
            status: ItemStatus::Present,
            data: None,
            date_managed: Some(reported),
        }];
        let plan = plan_managed_items(&[], &incoming, ts(10));

        let ItemAction::Insert { date_managed, .. } = &plan[0] else {
            panic!("expected insert");
        };
        assert_eq!(*date_managed, reported);
    }

    fn fact(name: &str, value: &str, seen: DateTime<Utc>) -> CurrentFact {
        CurrentFact {
            id: 1,
            name: name.to_string(),
            value: value.to_string(),
            updated_at: seen,
        }
    }

    #[test]
    fn unchanged_fact_produces_no_action() {
        let existing = fact("os_vers", "14.5", ts(8));
        let incoming = BTreeMap::from([("os_vers".to_string(), "14.5".to_string())]);
        assert!(plan_facts(&[existing], &incoming).is_empty());
    }

    #[test]
    fn changed_fact_archives_old_value_with_old_timestamp() {
        let old = ts(8);
        let existing = fact("os_vers", "14.5", old);
        let incoming = BTreeMap::from([("os_vers".to_string(), "15.0".to_string())]);

        let plan = plan_facts(&[existing], &incoming);

        assert_eq!(plan.len(), 1);
        let FactAction::Update { value, archive, .. } = &plan[0] else {
            panic!("expected update, got {:?}", plan[0]);
        };
        assert_eq!(value, "15.0");
        assert_eq!(archive.value, "14.5");
        assert_eq!(archive.recorded, old);
    }

    #[test]
    fn orphaned_fact_is_archived_then_deleted() {
        let existing = fact("battery_health", "92", ts(8));
        let plan = plan_facts(&[existing], &BTreeMap::new());

        assert_eq!(plan.len(), 1);
        let FactAction::Delete { archive, .. } = &plan[0] else {
            panic!("expected delete, got {:?}", plan[0]);
        };
        assert_eq!(archive.name, "battery_health");
        assert_eq!(archive.recorded, ts(8));
    }

    #[test]
    fn new_fact_inserts() {
        let incoming = BTreeMap::from([("uptime".to_string(), "4211".to_string())]);
        let plan = plan_facts(&[], &incoming);
        assert_eq!(
            plan,
            vec![FactAction::Insert {
                name: "uptime".to_string(),
                value: "4211".to_string(),
            }]
        );
    }

    async fn seed_group(pool: &PgPool, name: &str) -> Uuid {
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
        .bind(stocktake_core::keys::generate_group_key())
        .execute(pool)
        .await
        .unwrap();
        group_id
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn repeated_checkins_for_one_serial_share_a_machine_row(pool: PgPool) {
        let group_id = seed_group(&pool, "default").await;
        let req = CheckinRequest {
            serial: "C02ABC123".to_string(),
            machine: Default::default(),
            sources: BTreeMap::new(),
            plugin_results: Vec::new(),
        };

        let first = process_checkin(&pool, group_id, &req, Utc::now()).await.unwrap();
        let second = process_checkin(&pool, group_id, &req, Utc::now()).await.unwrap();

        assert!(first.new_machine);
        assert!(!second.new_machine);
        assert_eq!(first.machine_id, second.machine_id);

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM machines WHERE serial = $1")
                .bind("C02ABC123")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }
}
