//! Back-office license management. Every route here sits behind the
//! admin bearer-token layer wired up in [`super::router`].

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::{AppError, Result};
use crate::license::IssueLicense;

pub async fn issue_license(
    State(state): State<AppState>,
    Json(input): Json<IssueLicense>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let license = state.licenses.issue(input)?;
    tracing::info!(key = %license.key, dealer = %license.dealer_name, "license issued");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "licenseKey": license.key,
            "license": license,
        })),
    ))
}

pub async fn list_licenses(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let licenses = state.licenses.list()?;
    Ok(Json(json!({ "licenses": licenses })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLicense {
    license_key: String,
    #[serde(default)]
    permanent: bool,
}

/// Soft delete deactivates the key (it can be reactivated later);
/// `permanent: true` purges the record outright.
pub async fn delete_license(
    State(state): State<AppState>,
    Json(body): Json<DeleteLicense>,
) -> Result<Json<serde_json::Value>> {
    let (found, message) = if body.permanent {
        (
            state.licenses.delete(&body.license_key)?,
            "License permanently deleted",
        )
    } else {
        (
            state.licenses.set_active(&body.license_key, false)?,
            "License deactivated",
        )
    };
    if !found {
        return Err(AppError::NotFound("License not found".into()));
    }
    tracing::info!(key = %body.license_key, permanent = body.permanent, "license removed");
    Ok(Json(json!({ "success": true, "message": message })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetDevice {
    license_key: String,
}

pub async fn reset_device(
    State(state): State<AppState>,
    Json(body): Json<ResetDevice>,
) -> Result<Json<serde_json::Value>> {
    if !state.licenses.reset_device(&body.license_key)? {
        return Err(AppError::NotFound("License not found".into()));
    }
    tracing::info!(key = %body.license_key, "device binding reset");
    Ok(Json(json!({
        "success": true,
        "message": "Device binding reset; the license can be activated on a new device",
    })))
}
