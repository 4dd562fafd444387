use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Status of a managed item as last reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Present,
    Absent,
    Pending,
    Error,
    #[default]
    Unknown,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Present => "PRESENT",
            ItemStatus::Absent => "ABSENT",
            ItemStatus::Pending => "PENDING",
            ItemStatus::Error => "ERROR",
            ItemStatus::Unknown => "UNKNOWN",
        }
    }

    /// Parse a stored status string. Unrecognized values map to `Unknown`
    /// rather than failing — the column is populated from agent input.
    pub fn parse(s: &str) -> Self {
        match s {
            "PRESENT" => ItemStatus::Present,
            "ABSENT" => ItemStatus::Absent,
            "PENDING" => ItemStatus::Pending,
            "ERROR" => ItemStatus::Error,
            _ => ItemStatus::Unknown,
        }
    }
}

/// Severity of an operational message line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Error,
    Warning,
    #[default]
    Other,
    Debug,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Error => "ERROR",
            MessageType::Warning => "WARNING",
            MessageType::Other => "OTHER",
            MessageType::Debug => "DEBUG",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ERROR" => MessageType::Error,
            "WARNING" => MessageType::Warning,
            "DEBUG" => MessageType::Debug,
            _ => MessageType::Other,
        }
    }
}

/// Operating system family of a managed machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum OsFamily {
    #[default]
    Darwin,
    Windows,
    Linux,
    ChromeOS,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Darwin => "Darwin",
            OsFamily::Windows => "Windows",
            OsFamily::Linux => "Linux",
            OsFamily::ChromeOS => "ChromeOS",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Windows" => OsFamily::Windows,
            "Linux" => OsFamily::Linux,
            "ChromeOS" => OsFamily::ChromeOS,
            _ => OsFamily::Darwin,
        }
    }
}

/// Access level attached to a user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum ProfileLevel {
    #[serde(rename = "SO")]
    StatsOnly,
    #[default]
    #[serde(rename = "RO")]
    ReadOnly,
    #[serde(rename = "RW")]
    ReadWrite,
    #[serde(rename = "GA")]
    GlobalAdmin,
}

impl ProfileLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileLevel::StatsOnly => "SO",
            ProfileLevel::ReadOnly => "RO",
            ProfileLevel::ReadWrite => "RW",
            ProfileLevel::GlobalAdmin => "GA",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "SO" => ProfileLevel::StatsOnly,
            "RW" => ProfileLevel::ReadWrite,
            "GA" => ProfileLevel::GlobalAdmin,
            _ => ProfileLevel::ReadOnly,
        }
    }
}

/// Tenancy scope for reporting queries. Each level narrows the previous one:
/// business unit → machine group → single machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    BusinessUnit(Uuid),
    MachineGroup(Uuid),
    Machine(Uuid),
}

impl Scope {
    /// Resolve a scope from optional query parameters. When more than one
    /// level is supplied the narrowest wins.
    pub fn narrowest(
        business_unit: Option<Uuid>,
        machine_group: Option<Uuid>,
        machine: Option<Uuid>,
    ) -> Self {
        if let Some(id) = machine {
            Scope::Machine(id)
        } else if let Some(id) = machine_group {
            Scope::MachineGroup(id)
        } else if let Some(id) = business_unit {
            Scope::BusinessUnit(id)
        } else {
            Scope::All
        }
    }
}

/// Tenant root. Deleting a business unit cascades to its machine groups.
#[derive(Debug, Serialize, ToSchema)]
pub struct BusinessUnit {
    pub id: Uuid,
    pub name: String,
}

/// A group of machines within a business unit. The `key` is the bearer
/// credential agents present on check-in; generated once, never changed.
#[derive(Debug, Serialize, ToSchema)]
pub struct MachineGroup {
    pub id: Uuid,
    pub business_unit_id: Uuid,
    pub name: String,
    pub key: String,
}

/// A managed machine. `serial` is the sole identity across check-ins.
#[derive(Debug, Serialize, ToSchema)]
pub struct Machine {
    pub id: Uuid,
    pub machine_group_id: Uuid,
    pub serial: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<String>,
    pub os_family: OsFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    pub memory_kb: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hd_space: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hd_total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hd_percent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_model_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_model_friendly: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    pub deployed: bool,
    pub broken_client: bool,
    pub first_checkin: DateTime<Utc>,
    pub last_checkin: DateTime<Utc>,
}

/// An external system of record that reports inventory (an agent or plugin).
/// The id is a UUIDv7, so sources sort by creation time.
#[derive(Debug, Serialize, ToSchema)]
pub struct ManagementSource {
    pub id: Uuid,
    pub name: String,
}

/// Current state of one managed item: the latest report for a
/// (machine, name, source) key.
#[derive(Debug, Serialize, ToSchema)]
pub struct ManagedItem {
    pub id: Uuid,
    pub machine_id: Uuid,
    pub management_source: String,
    pub name: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub date_managed: DateTime<Utc>,
}

/// An archived snapshot of a managed item, stamped with the `date_managed`
/// it carried before being superseded.
#[derive(Debug, Serialize, ToSchema)]
pub struct ManagedItemHistoryEntry {
    pub id: Uuid,
    pub machine_id: Uuid,
    pub management_source: String,
    pub name: String,
    pub status: ItemStatus,
    pub recorded: DateTime<Utc>,
}

/// Current value of one name→value telemetry fact.
#[derive(Debug, Serialize, ToSchema)]
pub struct Fact {
    pub id: i64,
    pub machine_id: Uuid,
    pub management_source: String,
    pub name: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Archived fact value, stamped with the superseded row's `updated_at`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoricalFact {
    pub id: i64,
    pub machine_id: Uuid,
    pub management_source: String,
    pub name: String,
    pub value: String,
    pub recorded: DateTime<Utc>,
}

/// Operational log line reported by an agent.
#[derive(Debug, Serialize, ToSchema)]
pub struct Message {
    pub id: i64,
    pub machine_id: Uuid,
    pub management_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub message_type: MessageType,
    pub date: DateTime<Utc>,
}

/// API key listing entry. The private half is only ever returned once, at
/// creation time, via [`ApiKeyCreated`].
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKey {
    pub id: Uuid,
    pub name: String,
    pub public_key: String,
    pub read_write: bool,
    pub has_been_seen: bool,
}

/// Full credential pair, returned exactly once when the key is created.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyCreated {
    pub id: Uuid,
    pub name: String,
    pub public_key: String,
    pub private_key: String,
    pub read_write: bool,
}

/// Per-user access profile, created lazily on first access.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub level: ProfileLevel,
}

/// Registry entry for an installed plugin or report module.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegistryEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
}

/// Cursor-based pagination envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    /// Cursor for the next page. None if this is the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Whether there are more results after this page
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_and_defaults_unknown() {
        for status in [
            ItemStatus::Present,
            ItemStatus::Absent,
            ItemStatus::Pending,
            ItemStatus::Error,
            ItemStatus::Unknown,
        ] {
            assert_eq!(ItemStatus::parse(status.as_str()), status);
        }
        assert_eq!(ItemStatus::parse("installed?"), ItemStatus::Unknown);
    }

    #[test]
    fn scope_picks_narrowest_level() {
        let bu = Uuid::now_v7();
        let group = Uuid::now_v7();
        let machine = Uuid::now_v7();

        assert_eq!(Scope::narrowest(None, None, None), Scope::All);
        assert_eq!(
            Scope::narrowest(Some(bu), None, None),
            Scope::BusinessUnit(bu)
        );
        assert_eq!(
            Scope::narrowest(Some(bu), Some(group), None),
            Scope::MachineGroup(group)
        );
        assert_eq!(
            Scope::narrowest(Some(bu), Some(group), Some(machine)),
            Scope::Machine(machine)
        );
    }
}
