use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Shared secret for /admin/* endpoints (Bearer token, equality-checked).
    pub admin_secret: String,
    /// Signing secret for the billing provider's webhook payloads.
    pub billing_webhook_secret: String,
    /// Resend API key; None disables outbound email (log only).
    pub resend_api_key: Option<String>,
    /// From address for notification emails.
    pub email_from: String,
    /// Seconds of clock skew tolerated on webhook signature timestamps.
    pub webhook_tolerance_secs: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let webhook_tolerance_secs: i64 = env::var("WEBHOOK_TOLERANCE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "dealerdesk.db".to_string()),
            admin_secret: env::var("ADMIN_SECRET").unwrap_or_default(),
            billing_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "support@dealerdesk.example".to_string()),
            webhook_tolerance_secs,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
