mod admin;
mod license;
mod usage;
mod webhook;

pub use admin::*;
pub use license::*;
pub use usage::*;
pub use webhook::*;

use axum::{
    Json, Router, middleware as axum_middleware,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::AppState;
use crate::middleware::admin_auth;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/admin/licenses",
            post(issue_license).get(list_licenses).delete(delete_license),
        )
        .route("/admin/licenses/reset-device", post(reset_device))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), admin_auth));

    Router::new()
        .route("/health", get(health))
        .route("/license/validate", post(validate_license))
        .route("/license/activate", post(activate_license))
        .route("/usage", post(record_usage).get(query_usage))
        .route("/billing/webhook", post(billing_webhook))
        .merge(admin)
        // The extension calls these endpoints cross-origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
