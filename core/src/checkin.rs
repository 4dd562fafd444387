//! Wire types for the agent check-in submission. One check-in reports a
//! machine's full current state: descriptive hardware facts, plus per-source
//! managed items, telemetry facts and messages, plus plugin script output.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::model::{ItemStatus, MessageType, OsFamily};

/// A full check-in batch for one machine. The whole batch either applies or
/// is rejected — there is no partial-success reporting.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckinRequest {
    /// Machine serial number — the sole de-duplication key across check-ins.
    pub serial: String,
    /// Descriptive fields. All optional; omitted fields keep their last value.
    #[serde(default)]
    pub machine: MachineFacts,
    /// Per management-source inventory, keyed by source name.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceReport>,
    /// Output of plugin scripts that ran on the machine.
    #[serde(default)]
    pub plugin_results: Vec<PluginResult>,
}

/// Descriptive machine fields as reported by the agent.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct MachineFacts {
    pub hostname: Option<String>,
    pub operating_system: Option<String>,
    pub os_family: Option<OsFamily>,
    pub console_user: Option<String>,
    pub memory: Option<String>,
    pub memory_kb: Option<i64>,
    pub hd_space: Option<i64>,
    pub hd_total: Option<i64>,
    pub hd_percent: Option<String>,
    pub machine_model: Option<String>,
    pub machine_model_id: Option<i64>,
    pub machine_model_friendly: Option<String>,
    pub cpu_type: Option<String>,
    pub cpu_speed: Option<String>,
    pub agent_version: Option<String>,
    pub deployed: Option<bool>,
    pub broken_client: Option<bool>,
}

/// Everything one management source reports in a single check-in.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SourceReport {
    #[serde(default)]
    pub managed_items: Vec<ManagedItemReport>,
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
    #[serde(default)]
    pub messages: Vec<MessageReport>,
}

/// One managed item as reported by the agent.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ManagedItemReport {
    pub name: String,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub data: Option<String>,
    /// When the source last managed the item. Defaults to the check-in time.
    #[serde(default)]
    pub date_managed: Option<DateTime<Utc>>,
}

/// One operational log line.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MessageReport {
    pub text: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// Output of one plugin script: a batch of name/payload rows.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PluginResult {
    pub plugin: String,
    #[serde(default)]
    pub rows: Vec<PluginRowReport>,
}

/// One raw plugin script row. The typed columns are derived at write time.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PluginRowReport {
    pub name: String,
    #[serde(default)]
    pub data: Option<String>,
}

/// Summary returned for a successfully applied check-in.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckinSummary {
    pub machine_id: Uuid,
    pub serial: String,
    /// True when this serial was seen for the first time.
    pub new_machine: bool,
    pub managed_items: usize,
    pub facts: usize,
    pub plugin_rows: usize,
    pub messages: usize,
}
