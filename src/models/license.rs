use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Subscription plan. Informational only: drives price display, never
/// validation outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Plan {
    #[default]
    Monthly,
    Annual,
    Starter,
    Professional,
    Enterprise,
}

/// A stored license record, keyed in the store as `license:<key>`.
///
/// Wire field names are camelCase: the extension client and the admin
/// dashboard both consume these records as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub key: String,
    #[serde(default)]
    pub dealer_name: String,
    #[serde(default)]
    pub dealer_number: String,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub contact_phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub plan: Plan,
    pub active: bool,
    /// The single device this license is bound to; None = unbound.
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Billing-provider correlation key shared by sibling licenses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    /// Billing-provider customer id, kept for support lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    /// Raw provider status string, stored for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payment_at: Option<DateTime<Utc>>,
    /// 1-based seat number within a multi-seat checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_count: Option<u32>,
}

impl License {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp < now)
    }
}

/// Why a validation/activation request was refused.
///
/// Variants are ordered by check priority: the first failing check wins,
/// and that order is part of the user-facing contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    InvalidKey,
    Deactivated,
    Expired,
    DeviceMismatch,
}

impl RejectReason {
    /// Support-facing message shown to the end user by the extension.
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::InvalidKey => "Invalid license key",
            RejectReason::Deactivated => {
                "License has been deactivated. Contact support to reactivate."
            }
            RejectReason::Expired => "License has expired. Please renew your subscription.",
            RejectReason::DeviceMismatch => {
                "License is registered to another computer. Contact support to reset."
            }
        }
    }
}
