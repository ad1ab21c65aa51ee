//! Outbound notifications (transactional email via Resend).
//!
//! Every send is fire-and-log: a delivery failure never rolls back or fails
//! the state change that triggered it. The actual HTTP call happens on a
//! spawned task so reconciliation never blocks on the email provider.

use std::sync::Mutex;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::Plan;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

pub trait Notifier: Send + Sync {
    /// Welcome email carrying all keys issued by one checkout.
    fn welcome(&self, to: &str, contact_name: &str, dealer_name: &str, keys: &[String], plan: Plan);

    fn cancellation(&self, to: &str, contact_name: &str, dealer_name: &str);

    fn payment_failed(&self, to: &str, contact_name: &str, dealer_name: &str);
}

#[derive(Debug, Serialize)]
struct ResendEmailRequest {
    from: String,
    to: Vec<String>,
    subject: String,
    text: String,
    html: String,
}

#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

/// Notifier backed by the Resend API. Without an API key it degrades to
/// log-only mode.
pub struct ResendNotifier {
    api_key: Option<String>,
    from_email: String,
    http_client: Client,
}

impl ResendNotifier {
    pub fn new(api_key: Option<String>, from_email: String) -> Self {
        Self {
            api_key,
            from_email,
            http_client: Client::new(),
        }
    }

    fn send(&self, to: &str, subject: String, text: String, html: String) {
        let Some(api_key) = self.api_key.clone() else {
            tracing::info!(to, subject = %subject, "email disabled (no RESEND_API_KEY), logging only");
            return;
        };

        let request = ResendEmailRequest {
            from: self.from_email.clone(),
            to: vec![to.to_string()],
            subject,
            text,
            html,
        };
        let client = self.http_client.clone();
        let to = to.to_string();

        tokio::spawn(async move {
            let response = client
                .post(RESEND_API_URL)
                .header("Authorization", format!("Bearer {api_key}"))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    if let Ok(parsed) = resp.json::<ResendEmailResponse>().await {
                        tracing::info!(to = %to, id = %parsed.id, "notification email sent");
                    }
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    tracing::error!(to = %to, %status, body = %body, "Resend API rejected email");
                }
                Err(err) => {
                    tracing::error!(to = %to, error = %err, "failed to reach Resend API");
                }
            }
        });
    }
}

impl Notifier for ResendNotifier {
    fn welcome(&self, to: &str, contact_name: &str, dealer_name: &str, keys: &[String], plan: Plan) {
        let multi = keys.len() > 1;
        let key_lines = keys.join("\n");
        let key_blocks: String = keys
            .iter()
            .map(|key| {
                format!(
                    r#"<div style="border: 2px solid #7c3aed; border-radius: 8px; padding: 14px; text-align: center; margin: 10px 0;">
<code style="font-size: 20px; font-weight: bold;">{key}</code>
</div>"#
                )
            })
            .collect();

        let subject = format!("Welcome! Your license key{} inside", if multi { "s" } else { "" });
        let text = format!(
            "Welcome, {contact_name}!\n\nThank you for subscribing ({plan}) for {dealer_name}.\n\n{}\n\n{key_lines}\n\nWe'll contact you within 24 hours to schedule your setup session. Enter a license key in the extension when prompted.",
            if multi {
                format!("Your plan includes {} license keys, one per user:", keys.len())
            } else {
                "Your license key:".to_string()
            },
            plan = plan.as_ref(),
        );
        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
<h2>Welcome, {contact_name}!</h2>
<p>Thank you for subscribing (<strong>{plan}</strong>) for <strong>{dealer_name}</strong>.</p>
<p>{intro}</p>
{key_blocks}
<p>We'll contact you within 24 hours to schedule your setup session. Enter a license key in the extension when prompted.</p>
</div>"#,
            plan = plan.as_ref(),
            intro = if multi {
                format!("Your plan includes <strong>{} license keys</strong>, one per user:", keys.len())
            } else {
                "Your license key:".to_string()
            },
        );

        self.send(to, subject, text, html);
    }

    fn cancellation(&self, to: &str, contact_name: &str, dealer_name: &str) {
        let subject = "Your subscription has been cancelled".to_string();
        let text = format!(
            "Hi {contact_name},\n\nThe subscription for {dealer_name} has been cancelled and its license keys are deactivated.\n\nIf this was a mistake, reply to this email and we'll reactivate you right away."
        );
        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
<h2>Subscription cancelled</h2>
<p>Hi {contact_name},</p>
<p>The subscription for <strong>{dealer_name}</strong> has been cancelled and its license keys are deactivated.</p>
<p>If this was a mistake, reply to this email and we'll reactivate you right away.</p>
</div>"#
        );
        self.send(to, subject, text, html);
    }

    fn payment_failed(&self, to: &str, contact_name: &str, dealer_name: &str) {
        let subject = "Payment failed: action needed".to_string();
        let text = format!(
            "Hi {contact_name},\n\nWe couldn't process the latest payment for {dealer_name}. Your licenses remain active for now; please update your payment method to avoid interruption."
        );
        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
<h2>Payment failed</h2>
<p>Hi {contact_name},</p>
<p>We couldn't process the latest payment for <strong>{dealer_name}</strong>. Your licenses remain active for now; please update your payment method to avoid interruption.</p>
</div>"#
        );
        self.send(to, subject, text, html);
    }
}

/// What kind of notification a [`RecordingNotifier`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentNotification {
    Welcome { to: String, keys: Vec<String> },
    Cancellation { to: String },
    PaymentFailed { to: String },
}

/// Test notifier that records every send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn welcome(&self, to: &str, _contact_name: &str, _dealer_name: &str, keys: &[String], _plan: Plan) {
        self.sent.lock().unwrap().push(SentNotification::Welcome {
            to: to.to_string(),
            keys: keys.to_vec(),
        });
    }

    fn cancellation(&self, to: &str, _contact_name: &str, _dealer_name: &str) {
        self.sent
            .lock()
            .unwrap()
            .push(SentNotification::Cancellation { to: to.to_string() });
    }

    fn payment_failed(&self, to: &str, _contact_name: &str, _dealer_name: &str) {
        self.sent
            .lock()
            .unwrap()
            .push(SentNotification::PaymentFailed { to: to.to_string() });
    }
}
