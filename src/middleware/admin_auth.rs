use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::AppState;

/// Extract a Bearer token from the Authorization header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Whether the request carries the shared admin secret. An empty configured
/// secret locks the admin surface entirely rather than opening it.
pub fn is_admin(state: &AppState, headers: &HeaderMap) -> bool {
    if state.config.admin_secret.is_empty() {
        return false;
    }
    let Some(token) = extract_bearer_token(headers) else {
        return false;
    };
    token
        .as_bytes()
        .ct_eq(state.config.admin_secret.as_bytes())
        .into()
}

pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !is_admin(&state, request.headers()) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}
