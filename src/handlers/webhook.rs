//! Billing provider webhook receiver.
//!
//! The raw request body is needed twice: once for signature verification
//! (over the exact bytes the provider signed) and once for JSON parsing, so
//! the handler takes `Bytes` rather than a `Json` extractor.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;

use crate::AppState;
use crate::error::Result;
use crate::models::BillingEvent;
use crate::webhook_sig;

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let Some(signature) = headers.get("stripe-signature").and_then(|v| v.to_str().ok()) else {
        return Ok(bad_request("Missing signature header"));
    };
    if !webhook_sig::verify(
        &state.config.billing_webhook_secret,
        signature,
        &body,
        state.config.webhook_tolerance_secs,
        Utc::now().timestamp(),
    ) {
        tracing::warn!("webhook signature verification failed");
        return Ok(bad_request("Invalid signature"));
    }

    let event: BillingEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "unparseable webhook payload");
            return Ok(bad_request("Invalid payload"));
        }
    };

    tracing::info!(id = %event.id, event = %event.event_type, "billing event received");
    // A processing error returns 500 so the provider retries the delivery.
    state.billing.apply(&event)?;
    Ok(Json(json!({ "received": true })).into_response())
}
