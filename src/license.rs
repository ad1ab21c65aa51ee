//! License lifecycle and device binding.
//!
//! One license is bound to at most one device, established on the first
//! successful validation or activation and cleared only by an admin reset.
//! Validation and activation share a single decision path
//! ([`LicenseService::check_and_bind`]); the two endpoints differ only in
//! response framing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::keygen;
use crate::models::{License, Plan, RejectReason};
use crate::store::{self, Kv};

const MAX_CAS_ATTEMPTS: u32 = 16;

pub fn license_slot(key: &str) -> String {
    format!("license:{key}")
}

/// Dealer display info returned to the extension on a granted request.
#[derive(Debug, Clone)]
pub struct Granted {
    pub dealer_name: String,
    pub dealer_number: String,
    pub plan: Plan,
    pub expires_at: Option<DateTime<Utc>>,
    /// True when this request established the device binding.
    pub first_activation: bool,
}

/// Admin-supplied fields for issuing a license directly.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLicense {
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
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct LicenseService {
    kv: Arc<dyn Kv>,
}

impl LicenseService {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    pub fn get(&self, key: &str) -> Result<Option<License>> {
        store::get_json(self.kv.as_ref(), &license_slot(key))
    }

    /// All licenses, unordered.
    pub fn list(&self) -> Result<Vec<License>> {
        let mut licenses = Vec::new();
        for slot in self.kv.scan("license:")? {
            if let Some(license) = store::get_json::<License>(self.kv.as_ref(), &slot)? {
                licenses.push(license);
            }
        }
        Ok(licenses)
    }

    /// Issue a fresh license: unique key, active, unbound.
    pub fn issue(&self, input: IssueLicense) -> Result<License> {
        self.create(License {
            key: String::new(),
            dealer_name: input.dealer_name,
            dealer_number: input.dealer_number,
            contact_name: input.contact_name,
            contact_email: input.contact_email,
            contact_phone: input.contact_phone,
            address: input.address,
            plan: input.plan,
            active: true,
            device_id: None,
            created_at: Utc::now(),
            activated_at: None,
            last_used: None,
            expires_at: input.expires_at,
            subscription_id: None,
            stripe_customer_id: None,
            subscription_status: None,
            cancelled_at: None,
            last_payment_at: None,
            seat_index: None,
            seat_count: None,
        })
    }

    /// Persist `template` under a freshly generated key. The insert-only
    /// store write is the uniqueness check: a colliding candidate fails the
    /// write and a new one is drawn.
    pub fn create(&self, mut template: License) -> Result<License> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let key = keygen::random_key();
            template.key = key.clone();
            let raw = serde_json::to_string(&template)?;
            if self.kv.put_if_version(&license_slot(&key), &raw, None, None)? {
                return Ok(template);
            }
            tracing::warn!(%key, "license key collision, redrawing");
        }
        Err(AppError::Internal("license key space exhausted?".into()))
    }

    /// The validation/activation decision. Checks run in contract order:
    /// unknown key, deactivated, expired, bound elsewhere. A rejection never
    /// mutates state; a grant binds the device if unbound and bumps
    /// `lastUsed`, all under a versioned compare-and-swap so two devices
    /// racing for an unbound license cannot both bind.
    pub fn check_and_bind(
        &self,
        key: &str,
        device_id: &str,
    ) -> Result<std::result::Result<Granted, RejectReason>> {
        // Garbage-shaped keys can never exist; skip the store roundtrip.
        if !keygen::is_well_formed(key) {
            return Ok(Err(RejectReason::InvalidKey));
        }

        let slot = license_slot(key);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(current) = self.kv.get_versioned(&slot)? else {
                return Ok(Err(RejectReason::InvalidKey));
            };
            let mut license: License = serde_json::from_str(&current.value)?;

            if !license.active {
                return Ok(Err(RejectReason::Deactivated));
            }
            let now = Utc::now();
            if license.is_expired(now) {
                return Ok(Err(RejectReason::Expired));
            }
            if let Some(bound) = &license.device_id {
                if bound != device_id {
                    return Ok(Err(RejectReason::DeviceMismatch));
                }
            }

            let first_activation = license.device_id.is_none();
            if first_activation {
                license.device_id = Some(device_id.to_string());
                license.activated_at = Some(now);
            }
            license.last_used = Some(now);

            let raw = serde_json::to_string(&license)?;
            if self.kv.put_if_version(&slot, &raw, Some(current.version), None)? {
                return Ok(Ok(Granted {
                    dealer_name: license.dealer_name,
                    dealer_number: license.dealer_number,
                    plan: license.plan,
                    expires_at: license.expires_at,
                    first_activation,
                }));
            }
            // Lost the write race; re-read and re-run every check, since the
            // winner may have bound a different device.
        }

        Err(AppError::Internal(format!(
            "binding contention on license {key}"
        )))
    }

    /// Clear the device binding so a new device can bind on next validation.
    /// Leaves `active` and `expiresAt` untouched. Returns false if the key
    /// does not exist.
    pub fn reset_device(&self, key: &str) -> Result<bool> {
        self.modify(key, |license| {
            license.device_id = None;
            license.activated_at = None;
        })
        .map(|updated| updated.is_some())
    }

    pub fn set_active(&self, key: &str, active: bool) -> Result<bool> {
        self.modify(key, |license| license.active = active)
            .map(|updated| updated.is_some())
    }

    /// Permanent removal. Admin purge only.
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.kv.delete(&license_slot(key))
    }

    /// Apply `mutate` to a license under the CAS loop. Returns the updated
    /// record, or None when the key does not exist.
    pub fn modify(
        &self,
        key: &str,
        mutate: impl Fn(&mut License),
    ) -> Result<Option<License>> {
        let slot = license_slot(key);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(current) = self.kv.get_versioned(&slot)? else {
                return Ok(None);
            };
            let mut license: License = serde_json::from_str(&current.value)?;
            mutate(&mut license);
            let raw = serde_json::to_string(&license)?;
            if self.kv.put_if_version(&slot, &raw, Some(current.version), None)? {
                return Ok(Some(license));
            }
        }
        Err(AppError::Internal(format!(
            "update contention on license {key}"
        )))
    }
}
