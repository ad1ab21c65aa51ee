use axum::{Json, extract::State, http::StatusCode, response::Response};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;

use crate::AppState;
use crate::error::Result;
use crate::models::RejectReason;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateBody {
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// POST /license/validate
///
/// The extension's periodic access check. Grants carry dealer display info;
/// rejections carry a reason code the extension shows to the user.
pub async fn validate_license(
    State(state): State<AppState>,
    Json(body): Json<ValidateBody>,
) -> Result<Response> {
    let (Some(key), Some(device_id)) = (body.license_key, body.device_id) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "valid": false, "error": "License key and device ID required" })),
        )
            .into_response());
    };

    match state.licenses.check_and_bind(&key, &device_id)? {
        Ok(granted) => Ok((
            StatusCode::OK,
            Json(json!({
                "valid": true,
                "dealerName": granted.dealer_name,
                "dealerNumber": granted.dealer_number,
                "plan": granted.plan,
                "expiresAt": granted.expires_at,
            })),
        )
            .into_response()),
        Err(reason) => Ok(rejection(reason, "valid"))
    }
}

/// POST /license/activate
///
/// Same decision path as validation; only the response framing differs
/// (first-activation wording, `success` envelope).
pub async fn activate_license(
    State(state): State<AppState>,
    Json(body): Json<ValidateBody>,
) -> Result<Response> {
    let (Some(key), Some(device_id)) = (body.license_key, body.device_id) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "License key and device ID required" })),
        )
            .into_response());
    };

    match state.licenses.check_and_bind(&key, &device_id)? {
        Ok(granted) => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": if granted.first_activation {
                    "License activated successfully"
                } else {
                    "License already active on this device"
                },
                "dealerName": granted.dealer_name,
                "dealerNumber": granted.dealer_number,
                "plan": granted.plan,
                "expiresAt": granted.expires_at,
            })),
        )
            .into_response()),
        Err(reason) => Ok(rejection(reason, "success")),
    }
}

fn rejection(reason: RejectReason, flag_field: &str) -> Response {
    let mut body = serde_json::Map::new();
    body.insert(flag_field.to_string(), json!(false));
    body.insert("error".to_string(), json!(reason.as_ref()));
    body.insert("message".to_string(), json!(reason.message()));
    (StatusCode::UNAUTHORIZED, Json(serde_json::Value::Object(body))).into_response()
}
