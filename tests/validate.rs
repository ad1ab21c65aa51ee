//! End-to-end coverage of the validate/activate contract.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::test_app;

#[tokio::test]
async fn missing_fields_are_a_bad_request() {
    let app = test_app();

    for body in [
        json!({}),
        json!({ "licenseKey": "APP-AAAA-BBBB-CCCC" }),
        json!({ "deviceId": "device-1" }),
    ] {
        let (status, response) = app.post("/license/validate", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["valid"], json!(false));
        assert_eq!(response["error"], json!("License key and device ID required"));
    }
}

#[tokio::test]
async fn unknown_key_is_unauthorized_with_invalid_key_code() {
    let app = test_app();

    let (status, response) = app
        .post(
            "/license/validate",
            json!({ "licenseKey": "APP-ZZZZ-ZZZZ-ZZZZ", "deviceId": "device-1" }),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["valid"], json!(false));
    assert_eq!(response["error"], json!("INVALID_KEY"));
    assert_eq!(response["message"], json!("Invalid license key"));
}

#[tokio::test]
async fn first_validation_binds_and_returns_dealer_info() {
    let app = test_app();
    let key = app.issue_license("Valley Motors").await;

    let (status, response) = app
        .post(
            "/license/validate",
            json!({ "licenseKey": key, "deviceId": "device-1" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["valid"], json!(true));
    assert_eq!(response["dealerName"], json!("Valley Motors"));
    assert_eq!(response["plan"], json!("monthly"));
    assert_eq!(response["expiresAt"], json!(null));
}

#[tokio::test]
async fn second_device_gets_device_mismatch() {
    let app = test_app();
    let key = app.issue_license("Valley Motors").await;

    app.post(
        "/license/validate",
        json!({ "licenseKey": key, "deviceId": "device-1" }),
    )
    .await;

    let (status, response) = app
        .post(
            "/license/validate",
            json!({ "licenseKey": key, "deviceId": "device-2" }),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"], json!("DEVICE_MISMATCH"));

    // Original device keeps working
    let (status, response) = app
        .post(
            "/license/validate",
            json!({ "licenseKey": key, "deviceId": "device-1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["valid"], json!(true));
}

#[tokio::test]
async fn activate_mirrors_validate_with_success_envelope() {
    let app = test_app();
    let key = app.issue_license("Hilltop Auto").await;

    let (status, response) = app
        .post(
            "/license/activate",
            json!({ "licenseKey": key, "deviceId": "device-1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["message"], json!("License activated successfully"));

    // Same device again: granted, but no longer a first activation
    let (status, response) = app
        .post(
            "/license/activate",
            json!({ "licenseKey": key, "deviceId": "device-1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["message"], json!("License already active on this device"));

    // Different device rejected with the same reason codes as validate
    let (status, response) = app
        .post(
            "/license/activate",
            json!({ "licenseKey": key, "deviceId": "device-2" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["success"], json!(false));
    assert_eq!(response["error"], json!("DEVICE_MISMATCH"));
}

#[tokio::test]
async fn deactivated_outranks_device_mismatch() {
    let app = test_app();
    let key = app.issue_license("Valley Motors").await;

    app.post(
        "/license/validate",
        json!({ "licenseKey": key, "deviceId": "device-1" }),
    )
    .await;
    app.admin_request(
        "DELETE",
        "/admin/licenses",
        Some(json!({ "licenseKey": key })),
    )
    .await;

    // Even a foreign device sees DEACTIVATED, not DEVICE_MISMATCH
    let (status, response) = app
        .post(
            "/license/validate",
            json!({ "licenseKey": key, "deviceId": "device-2" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"], json!("DEACTIVATED"));
}
