//! Admin surface: auth gate, issue/list/delete, device reset.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::test_app;

#[tokio::test]
async fn admin_routes_reject_missing_or_wrong_token() {
    let app = test_app();

    let (status, _) = app.get("/admin/licenses").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = axum::http::Request::get("/admin/licenses")
        .header("Authorization", "Bearer wrong-secret")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(
        dealerdesk::handlers::router(app.state.clone()),
        request,
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn issued_license_has_wire_format_key_and_defaults() {
    let app = test_app();

    let (status, body) = app
        .admin_request(
            "POST",
            "/admin/licenses",
            Some(json!({
                "dealerName": "Valley Motors",
                "dealerNumber": "VM-104",
                "contactEmail": "ops@valley.example",
                "plan": "annual",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], json!(true));

    let key = body["licenseKey"].as_str().unwrap();
    assert!(dealerdesk::keygen::is_well_formed(key));

    let license = &body["license"];
    assert_eq!(license["key"], json!(key));
    assert_eq!(license["dealerName"], json!("Valley Motors"));
    assert_eq!(license["plan"], json!("annual"));
    assert_eq!(license["active"], json!(true));
    assert_eq!(license["deviceId"], json!(null));
}

#[tokio::test]
async fn list_returns_every_issued_license() {
    let app = test_app();
    let mut keys = Vec::new();
    for name in ["A Motors", "B Motors", "C Motors"] {
        keys.push(app.issue_license(name).await);
    }

    let (status, body) = app.admin_request("GET", "/admin/licenses", None).await;
    assert_eq!(status, StatusCode::OK);

    let listed = body["licenses"].as_array().unwrap();
    assert_eq!(listed.len(), 3);
    for key in keys {
        assert!(listed.iter().any(|l| l["key"] == json!(key)));
    }
}

#[tokio::test]
async fn soft_delete_deactivates_and_permanent_delete_purges() {
    let app = test_app();
    let key = app.issue_license("Valley Motors").await;

    let (status, body) = app
        .admin_request("DELETE", "/admin/licenses", Some(json!({ "licenseKey": key })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("License deactivated"));

    // Still listed, now inactive
    let (_, body) = app.admin_request("GET", "/admin/licenses", None).await;
    assert_eq!(body["licenses"][0]["active"], json!(false));

    let (status, body) = app
        .admin_request(
            "DELETE",
            "/admin/licenses",
            Some(json!({ "licenseKey": key, "permanent": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("License permanently deleted"));

    let (_, body) = app.admin_request("GET", "/admin/licenses", None).await;
    assert!(body["licenses"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn delete_unknown_key_is_not_found() {
    let app = test_app();
    let (status, _) = app
        .admin_request(
            "DELETE",
            "/admin/licenses",
            Some(json!({ "licenseKey": "APP-ZZZZ-ZZZZ-ZZZZ" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reset_device_allows_a_new_device_to_bind() {
    let app = test_app();
    let key = app.issue_license("Valley Motors").await;

    app.post(
        "/license/validate",
        json!({ "licenseKey": key, "deviceId": "old-laptop" }),
    )
    .await;

    let (status, body) = app
        .admin_request(
            "POST",
            "/admin/licenses/reset-device",
            Some(json!({ "licenseKey": key })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let (status, response) = app
        .post(
            "/license/validate",
            json!({ "licenseKey": key, "deviceId": "new-laptop" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["valid"], json!(true));
}

#[tokio::test]
async fn reset_device_on_unknown_key_is_not_found() {
    let app = test_app();
    let (status, _) = app
        .admin_request(
            "POST",
            "/admin/licenses/reset-device",
            Some(json!({ "licenseKey": "APP-ZZZZ-ZZZZ-ZZZZ" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
