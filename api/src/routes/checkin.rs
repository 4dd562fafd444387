use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use stocktake_core::checkin::{CheckinRequest, CheckinSummary};
use stocktake_core::error::ApiError;

use crate::auth;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::reconcile;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/checkin", post(submit_checkin))
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct CheckinParams {
    /// Target machine group id. Only needed (and only allowed to matter)
    /// with API key auth; group-key auth identifies the group implicitly.
    #[serde(default)]
    pub machine_group: Option<Uuid>,
}

/// Structural validation. Field-level garbage is tolerated and normalized
/// downstream; missing identities reject the whole batch.
fn validate(req: &CheckinRequest) -> Result<(), AppError> {
    if req.serial.trim().is_empty() {
        return Err(AppError::Validation {
            message: "serial must not be empty".to_string(),
            field: Some("serial".to_string()),
            received: Some(serde_json::Value::String(req.serial.clone())),
            docs_hint: Some(
                "The machine serial number is the identity for all check-ins".to_string(),
            ),
        });
    }

    for (source, report) in &req.sources {
        if source.trim().is_empty() {
            return Err(AppError::Validation {
                message: "management source names must not be empty".to_string(),
                field: Some("sources".to_string()),
                received: None,
                docs_hint: None,
            });
        }
        for (i, item) in report.managed_items.iter().enumerate() {
            if item.name.trim().is_empty() {
                return Err(AppError::Validation {
                    message: format!("sources[{source}].managed_items[{i}]: name must not be empty"),
                    field: Some(format!("sources.{source}.managed_items[{i}].name")),
                    received: None,
                    docs_hint: None,
                });
            }
        }
    }

    for (i, result) in req.plugin_results.iter().enumerate() {
        if result.plugin.trim().is_empty() {
            return Err(AppError::Validation {
                message: format!("plugin_results[{i}]: plugin must not be empty"),
                field: Some(format!("plugin_results[{i}].plugin")),
                received: None,
                docs_hint: None,
            });
        }
    }

    Ok(())
}

/// Submit a machine check-in
///
/// Atomically replaces the machine's current inventory state with the
/// reported batch, archiving superseded rows into history. The batch either
/// fully applies or fully fails — there is no partial-success reporting.
#[utoipa::path(
    post,
    path = "/v1/checkin",
    request_body = CheckinRequest,
    params(CheckinParams),
    responses(
        (status = 200, description = "Check-in applied", body = CheckinSummary),
        (status = 400, description = "Structurally invalid batch", body = ApiError),
        (status = 401, description = "Unknown machine group key", body = ApiError),
        (status = 409, description = "Concurrent write conflict; retry the batch", body = ApiError)
    ),
    tag = "checkin"
)]
pub async fn submit_checkin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CheckinParams>,
    Json(req): Json<CheckinRequest>,
) -> Result<impl IntoResponse, AppError> {
    let group = auth::authenticate_checkin(&state.db, &headers, params.machine_group).await?;
    validate(&req)?;

    let now = Utc::now();
    let summary = match reconcile::process_checkin(&state.db, group.group_id, &req, now).await {
        Err(err) if err.is_conflict() => {
            // One in-process retry for commit-time races; after that the
            // client owns the retry.
            tracing::warn!(serial = %req.serial, "check-in conflict, retrying batch");
            reconcile::process_checkin(&state.db, group.group_id, &req, Utc::now()).await?
        }
        other => other?,
    };

    tracing::info!(
        serial = %summary.serial,
        machine_id = %summary.machine_id,
        new_machine = summary.new_machine,
        managed_items = summary.managed_items,
        facts = summary.facts,
        "check-in applied"
    );

    Ok((StatusCode::OK, Json(summary)))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use stocktake_core::checkin::{MachineFacts, ManagedItemReport, SourceReport};
    use stocktake_core::model::ItemStatus;

    use super::*;

    fn request(serial: &str) -> CheckinRequest {
        CheckinRequest {
            serial: serial.to_string(),
            machine: MachineFacts::default(),
            sources: BTreeMap::new(),
            plugin_results: Vec::new(),
        }
    }

    #[test]
    fn empty_serial_is_rejected() {
        assert!(validate(&request("  ")).is_err());
        assert!(validate(&request("C02ABC123")).is_ok());
    }

    #[test]
    fn unnamed_managed_item_is_rejected() {
        let mut req = request("C02ABC123");
        req.sources.insert(
            "munki".to_string(),
            SourceReport {
                managed_items: vec![ManagedItemReport {
                    name: String::new(),
                    status: ItemStatus::Present,
                    data: None,
                    date_managed: None,
                }],
                ..Default::default()
            },
        );
        assert!(validate(&req).is_err());
    }
}
