#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use dealerdesk::config::Config;
use dealerdesk::notify::RecordingNotifier;
use dealerdesk::store::MemoryStore;
use dealerdesk::{AppState, handlers};

pub const ADMIN_SECRET: &str = "test-admin-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

pub struct TestApp {
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn test_app() -> TestApp {
    test_app_with_store(Arc::new(MemoryStore::new()))
}

pub fn test_app_with_store(kv: Arc<dyn dealerdesk::store::Kv>) -> TestApp {
    let config = Config {
        host: "127.0.0.1".into(),
        port: 0,
        database_path: ":memory:".into(),
        admin_secret: ADMIN_SECRET.into(),
        billing_webhook_secret: WEBHOOK_SECRET.into(),
        resend_api_key: None,
        email_from: "support@dealerdesk.example".into(),
        webhook_tolerance_secs: 300,
    };
    let notifier = Arc::new(RecordingNotifier::new());
    let state = AppState::new(kv, notifier.clone(), config);
    TestApp { state, notifier }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = handlers::router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    pub async fn admin_request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN_SECRET}"))
            .header(header::CONTENT_TYPE, "application/json");
        let request = match body {
            Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    /// Issue a license through the admin endpoint, returning its key.
    pub async fn issue_license(&self, dealer_name: &str) -> String {
        let (status, body) = self
            .admin_request(
                "POST",
                "/admin/licenses",
                Some(serde_json::json!({ "dealerName": dealer_name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["licenseKey"].as_str().unwrap().to_string()
    }

    /// A billing webhook POST with a valid provider signature.
    pub async fn signed_webhook(&self, event: Value) -> (StatusCode, Value) {
        let payload = event.to_string();
        let signature = dealerdesk::webhook_sig::signature_header(
            WEBHOOK_SECRET,
            chrono::Utc::now().timestamp(),
            payload.as_bytes(),
        );
        let request = Request::post("/billing/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .header("stripe-signature", signature)
            .body(Body::from(payload))
            .unwrap();
        self.send(request).await
    }
}
