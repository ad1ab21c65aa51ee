//! Usage ingestion and analytics queries.
//!
//! `POST /usage` is called by the extension on every tracked action, so it
//! always acknowledges: a malformed or unattributable event is logged and
//! dropped rather than bounced back to the client. `GET /usage` is the
//! admin-facing analytics read.

use std::collections::HashMap;
use std::str::FromStr;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::error::{AppError, Result};
use crate::middleware::is_admin;
use crate::models::UsageEventType;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUsage {
    #[serde(default)]
    license_key: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

fn ack() -> Json<Value> {
    Json(json!({ "success": true }))
}

pub async fn record_usage(
    State(state): State<AppState>,
    Json(body): Json<RecordUsage>,
) -> Result<Json<Value>> {
    let (Some(license_key), Some(event)) = (body.license_key, body.event) else {
        return Err(AppError::BadRequest("License key and event required".into()));
    };

    // Once the request shape is valid, ingestion never fails the extension:
    // unknown keys, unknown event names, and store failures are all logged
    // and acknowledged. The event is lost, the caller is not.
    match state.licenses.get(&license_key) {
        Ok(Some(_)) => {}
        Ok(None) => {
            tracing::warn!(%license_key, "usage event for unknown license");
            return Ok(ack());
        }
        Err(err) => {
            tracing::warn!(%license_key, error = %err, "dropping usage event, license lookup failed");
            return Ok(ack());
        }
    }
    let Ok(event) = UsageEventType::from_str(&event) else {
        tracing::warn!(%license_key, %event, "unknown usage event type");
        return Ok(ack());
    };

    state.usage.record(&license_key, event, body.metadata.as_ref());
    Ok(ack())
}

/// Analytics reads, admin-gated in-handler because the ingestion POST on the
/// same path is public.
///
///   ?licenseKey=...&view=stats   raw lifetime + 30 daily records
///   ?licenseKey=...              rollup with windows and averages
///   (no licenseKey)              fleet summary, ?period=N days (default 7)
pub async fn query_usage(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    if !is_admin(&state, &headers) {
        return Err(AppError::Unauthorized("Unauthorized".into()));
    }

    if let Some(license_key) = params.get("licenseKey") {
        if params.get("view").map(String::as_str) == Some("stats") {
            return Ok(Json(state.usage.stats(license_key)?).into_response());
        }
        return Ok(Json(state.usage.rollup(license_key)?).into_response());
    }

    let period = params
        .get("period")
        .and_then(|p| p.parse::<u32>().ok())
        .unwrap_or(7);
    let summary = state.usage.fleet_summary(&state.licenses, period)?;
    Ok(Json(summary).into_response())
}
