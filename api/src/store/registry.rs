//! Plugin/report registry, synced from the on-disk plugin tree. External
//! tooling installs and removes plugin modules; the registry tables must
//! reflect what is currently installed before they are served, so reads go
//! through an explicit refresh-then-query path (bounded by the staleness
//! window in [`crate::state::RegistryRefresh`]).

use std::path::Path;

use sqlx::PgPool;
use stocktake_core::model::RegistryEntry;

use crate::error::AppError;

/// Which registry table a refresh targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Plugins,
    MachineDetailPlugins,
    Reports,
}

impl RegistryKind {
    fn table(&self) -> &'static str {
        match self {
            RegistryKind::Plugins => "plugins",
            RegistryKind::MachineDetailPlugins => "machine_detail_plugins",
            RegistryKind::Reports => "reports",
        }
    }

    /// Subdirectory of the plugin tree holding this kind's modules.
    fn subdir(&self) -> &'static str {
        match self {
            RegistryKind::Plugins => "plugins",
            RegistryKind::MachineDetailPlugins => "machine_detail",
            RegistryKind::Reports => "reports",
        }
    }

    fn ordered(&self) -> bool {
        !matches!(self, RegistryKind::Reports)
    }
}

/// Collect installed module names for one registry kind. A module is a
/// directory or file under the kind's subdirectory; file extensions are
/// stripped. A missing directory means nothing is installed.
async fn scan_modules(plugin_dir: &Path, kind: RegistryKind) -> Vec<String> {
    let dir = plugin_dir.join(kind.subdir());
    let mut names = Vec::new();
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(dir = %dir.display(), %err, "plugin directory not readable");
            return names;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem.starts_with('.') {
            continue;
        }
        names.push(stem.to_string());
    }
    names.sort();
    names.dedup();
    names
}

/// Sync one registry table against the on-disk module list: insert new names
/// (appended to the existing order), delete names no longer installed.
/// Existing rows keep their order so operator-arranged dashboards are stable
/// across refreshes.
pub async fn refresh(pool: &PgPool, plugin_dir: &Path, kind: RegistryKind) -> Result<(), AppError> {
    let installed = scan_modules(plugin_dir, kind).await;
    let table = kind.table();

    let mut tx = pool.begin().await?;

    sqlx::query(&format!(
        "DELETE FROM {table} WHERE name != ALL($1::text[])"
    ))
    .bind(&installed)
    .execute(&mut *tx)
    .await?;

    if kind.ordered() {
        for name in &installed {
            sqlx::query(&format!(
                "INSERT INTO {table} (name, ord) \
                 SELECT $1, COALESCE(MAX(ord), 0) + 1 FROM {table} \
                 ON CONFLICT (name) DO NOTHING"
            ))
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }
    } else {
        for name in &installed {
            sqlx::query(&format!(
                "INSERT INTO {table} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING"
            ))
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

pub async fn list(pool: &PgPool, kind: RegistryKind) -> Result<Vec<RegistryEntry>, AppError> {
    let table = kind.table();
    if kind.ordered() {
        let rows = sqlx::query_as::<_, (String, i32)>(&format!(
            "SELECT name, ord FROM {table} ORDER BY ord, name"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, ord)| RegistryEntry {
                name,
                order: Some(ord),
            })
            .collect())
    } else {
        let rows =
            sqlx::query_as::<_, (String,)>(&format!("SELECT name FROM {table} ORDER BY name"))
                .fetch_all(pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(name,)| RegistryEntry { name, order: None })
            .collect())
    }
}
