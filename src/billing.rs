//! Billing event reconciliation.
//!
//! Keeps license state consistent with the payment provider's view of each
//! subscription, under at-least-once, possibly-reordered delivery. Every
//! effect is applied idempotently from current state:
//!
//!   sub:<subscription_id>        JSON array of sibling license keys; the
//!                                single source of truth consulted before
//!                                any create
//!   sent:cancelled:<sub_id>      one-shot marker for the cancellation email
//!   sent:payment_failed:<event>  one-shot marker per failed-payment event
//!
//! Events referencing a subscription with no mapping are logged and dropped;
//! redelivery is the provider's job.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::license::LicenseService;
use crate::models::{
    BillingEvent, CheckoutSession, InvoiceObject, License, Plan, SubscriptionObject,
};
use crate::notify::Notifier;
use crate::store::{self, Kv};

fn subscription_slot(subscription_id: &str) -> String {
    format!("sub:{subscription_id}")
}

#[derive(Clone)]
pub struct BillingReconciler {
    kv: Arc<dyn Kv>,
    licenses: LicenseService,
    notifier: Arc<dyn Notifier>,
}

impl BillingReconciler {
    pub fn new(kv: Arc<dyn Kv>, licenses: LicenseService, notifier: Arc<dyn Notifier>) -> Self {
        Self { kv, licenses, notifier }
    }

    /// Apply one provider event. An `Err` here becomes a non-2xx response so
    /// the provider redelivers; every path is therefore safe to reprocess.
    pub fn apply(&self, event: &BillingEvent) -> Result<()> {
        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let session: CheckoutSession = serde_json::from_value(event.data.object.clone())?;
                self.handle_checkout_completed(&session)
            }
            "customer.subscription.updated" => {
                let sub: SubscriptionObject = serde_json::from_value(event.data.object.clone())?;
                self.handle_subscription_updated(&sub)
            }
            "customer.subscription.deleted" => {
                let sub: SubscriptionObject = serde_json::from_value(event.data.object.clone())?;
                self.handle_subscription_cancelled(&sub.id)
            }
            "invoice.payment_failed" => {
                let invoice: InvoiceObject = serde_json::from_value(event.data.object.clone())?;
                self.handle_payment_failed(&event.id, invoice.subscription.as_deref())
            }
            "invoice.payment_succeeded" => {
                let invoice: InvoiceObject = serde_json::from_value(event.data.object.clone())?;
                self.handle_payment_succeeded(invoice.subscription.as_deref())
            }
            other => {
                tracing::debug!(event_type = other, "ignoring billing event");
                Ok(())
            }
        }
    }

    /// License keys mapped to a subscription id, or None when the creation
    /// event hasn't been processed.
    pub fn sibling_keys(&self, subscription_id: &str) -> Result<Option<Vec<String>>> {
        store::get_json(self.kv.as_ref(), &subscription_slot(subscription_id))
    }

    fn handle_checkout_completed(&self, session: &CheckoutSession) -> Result<()> {
        let Some(subscription_id) = session.subscription.as_deref() else {
            tracing::warn!("checkout completed without a subscription id, dropping");
            return Ok(());
        };

        // Claim the subscription with an insert-only write before creating
        // anything: under duplicate delivery (concurrent or replayed) only
        // one claimant proceeds. The placeholder is overwritten with the
        // real key list once the licenses exist.
        if !self
            .kv
            .put_if_version(&subscription_slot(subscription_id), "[]", None, None)?
        {
            tracing::info!(subscription_id, "checkout already processed");
            return Ok(());
        }

        let meta = &session.metadata;
        let seats: u32 = meta
            .num_licenses
            .as_deref()
            .and_then(|n| n.parse().ok())
            .filter(|n| *n >= 1)
            .unwrap_or(1);
        let plan = meta
            .plan
            .as_deref()
            .and_then(|p| Plan::from_str(p).ok())
            .unwrap_or(Plan::Professional);
        let contact_email = session.customer_email.clone().unwrap_or_default();
        let now = Utc::now();

        let mut keys = Vec::with_capacity(seats as usize);
        for seat in 1..=seats {
            let license = self.licenses.create(License {
                key: String::new(),
                dealer_name: meta.dealer_name.clone().unwrap_or_default(),
                dealer_number: meta.dealer_number.clone().unwrap_or_default(),
                contact_name: meta.contact_name.clone().unwrap_or_default(),
                contact_email: contact_email.clone(),
                contact_phone: meta.contact_phone.clone().unwrap_or_default(),
                address: meta.address.clone().unwrap_or_default(),
                plan,
                active: true,
                device_id: None,
                created_at: now,
                activated_at: None,
                last_used: None,
                expires_at: None,
                subscription_id: Some(subscription_id.to_string()),
                stripe_customer_id: session.customer.clone(),
                subscription_status: None,
                cancelled_at: None,
                last_payment_at: None,
                seat_index: Some(seat),
                seat_count: Some(seats),
            })?;
            keys.push(license.key);
        }

        store::put_json(self.kv.as_ref(), &subscription_slot(subscription_id), &keys, None)?;

        tracing::info!(subscription_id, count = keys.len(), "licenses issued for checkout");

        if !contact_email.is_empty() {
            self.notifier.welcome(
                &contact_email,
                meta.contact_name.as_deref().unwrap_or(""),
                meta.dealer_name.as_deref().unwrap_or(""),
                &keys,
                plan,
            );
        }

        Ok(())
    }

    fn handle_subscription_updated(&self, sub: &SubscriptionObject) -> Result<()> {
        let Some(keys) = self.sibling_keys(&sub.id)? else {
            tracing::warn!(subscription_id = %sub.id, "update for unknown subscription, dropping");
            return Ok(());
        };

        let active = matches!(sub.status.as_str(), "active" | "trialing");
        for key in &keys {
            self.licenses.modify(key, |license| {
                license.active = active;
                license.subscription_status = Some(sub.status.clone());
            })?;
        }

        tracing::info!(subscription_id = %sub.id, status = %sub.status, active, "subscription updated");
        Ok(())
    }

    fn handle_subscription_cancelled(&self, subscription_id: &str) -> Result<()> {
        let Some(keys) = self.sibling_keys(subscription_id)? else {
            tracing::warn!(subscription_id, "cancellation for unknown subscription, dropping");
            return Ok(());
        };

        let now = Utc::now();
        let mut contact: Option<(String, String, String)> = None;

        for key in &keys {
            let updated = self.licenses.modify(key, |license| {
                license.active = false;
                license.subscription_status = Some("cancelled".to_string());
                license.cancelled_at = Some(now);
            })?;
            if let Some(license) = updated {
                if contact.is_none() && !license.contact_email.is_empty() {
                    contact = Some((
                        license.contact_email,
                        license.contact_name,
                        license.dealer_name,
                    ));
                }
            }
        }

        tracing::info!(subscription_id, count = keys.len(), "licenses deactivated on cancellation");

        // One email per subscription, not per sibling and not per replay.
        // The marker is claimed before the send: a crashed send is not
        // retried (notifications are advisory).
        let marker = format!("sent:cancelled:{subscription_id}");
        if self.kv.put_if_version(&marker, "1", None, None)? {
            if let Some((email, name, dealer)) = contact {
                self.notifier.cancellation(&email, &name, &dealer);
            }
        }

        Ok(())
    }

    fn handle_payment_failed(&self, event_id: &str, subscription_id: Option<&str>) -> Result<()> {
        let Some(subscription_id) = subscription_id else {
            return Ok(());
        };
        let Some(keys) = self.sibling_keys(subscription_id)? else {
            tracing::warn!(subscription_id, "payment failure for unknown subscription, dropping");
            return Ok(());
        };

        // active is deliberately left alone: the provider retries the charge
        // and emits subscription.updated if it gives up.
        let first = match keys.first() {
            Some(key) => self.licenses.get(key)?,
            None => None,
        };

        let marker = format!("sent:payment_failed:{event_id}");
        if self.kv.put_if_version(&marker, "1", None, None)? {
            if let Some(license) = first {
                if !license.contact_email.is_empty() {
                    self.notifier.payment_failed(
                        &license.contact_email,
                        &license.contact_name,
                        &license.dealer_name,
                    );
                }
            }
        }

        tracing::info!(subscription_id, "payment failed notification processed");
        Ok(())
    }

    fn handle_payment_succeeded(&self, subscription_id: Option<&str>) -> Result<()> {
        let Some(subscription_id) = subscription_id else {
            return Ok(());
        };
        let Some(keys) = self.sibling_keys(subscription_id)? else {
            tracing::warn!(subscription_id, "payment success for unknown subscription, dropping");
            return Ok(());
        };

        let now = Utc::now();
        for key in &keys {
            // Reactivates after a recovered payment failure
            self.licenses.modify(key, |license| {
                license.active = true;
                license.last_payment_at = Some(now);
            })?;
        }

        tracing::info!(subscription_id, count = keys.len(), "payment recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{RecordingNotifier, SentNotification};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn setup() -> (BillingReconciler, LicenseService, Arc<RecordingNotifier>) {
        let kv: Arc<dyn Kv> = Arc::new(MemoryStore::new());
        let licenses = LicenseService::new(kv.clone());
        let notifier = Arc::new(RecordingNotifier::new());
        let reconciler = BillingReconciler::new(kv, licenses.clone(), notifier.clone());
        (reconciler, licenses, notifier)
    }

    fn checkout_event(id: &str, sub: &str, seats: Option<&str>) -> BillingEvent {
        let mut metadata = json!({
            "dealerName": "Lakeside Motors",
            "contactName": "Pat",
            "plan": "professional",
        });
        if let Some(n) = seats {
            metadata["numLicenses"] = json!(n);
        }
        serde_json::from_value(json!({
            "id": id,
            "type": "checkout.session.completed",
            "data": { "object": {
                "customer_email": "pat@lakeside.example",
                "customer": "cus_lakeside",
                "subscription": sub,
                "metadata": metadata,
            }},
        }))
        .unwrap()
    }

    fn sub_event(event_type: &str, id: &str, sub: &str, status: &str) -> BillingEvent {
        serde_json::from_value(json!({
            "id": id,
            "type": event_type,
            "data": { "object": { "id": sub, "status": status } },
        }))
        .unwrap()
    }

    #[test]
    fn checkout_issues_one_license_per_seat() {
        let (reconciler, licenses, notifier) = setup();

        reconciler.apply(&checkout_event("evt_1", "sub_1", Some("3"))).unwrap();

        let keys = reconciler.sibling_keys("sub_1").unwrap().unwrap();
        assert_eq!(keys.len(), 3);
        for (i, key) in keys.iter().enumerate() {
            let license = licenses.get(key).unwrap().unwrap();
            assert!(license.active);
            assert_eq!(license.subscription_id.as_deref(), Some("sub_1"));
            assert_eq!(license.stripe_customer_id.as_deref(), Some("cus_lakeside"));
            assert_eq!(license.seat_index, Some(i as u32 + 1));
            assert_eq!(license.seat_count, Some(3));
        }

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], SentNotification::Welcome { keys: k, .. } if k.len() == 3));
    }

    #[test]
    fn replayed_checkout_creates_nothing_new() {
        let (reconciler, licenses, notifier) = setup();

        reconciler.apply(&checkout_event("evt_1", "sub_1", None)).unwrap();
        let keys = reconciler.sibling_keys("sub_1").unwrap().unwrap();
        assert_eq!(keys.len(), 1);

        reconciler.apply(&checkout_event("evt_1", "sub_1", None)).unwrap();

        assert_eq!(reconciler.sibling_keys("sub_1").unwrap().unwrap(), keys);
        assert_eq!(licenses.list().unwrap().len(), 1);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[test]
    fn concurrent_duplicate_checkout_creates_one_batch() {
        use std::sync::Barrier;
        use std::thread;

        // Two deliveries of the same checkout racing on an unclaimed
        // subscription: exactly one may create licenses and email.
        for round in 0..50 {
            let (reconciler, licenses, notifier) = setup();
            let barrier = Arc::new(Barrier::new(2));

            let mut handles = Vec::new();
            for _ in 0..2 {
                let reconciler = reconciler.clone();
                let barrier = barrier.clone();
                handles.push(thread::spawn(move || {
                    let event = checkout_event("evt_1", "sub_1", Some("2"));
                    barrier.wait();
                    reconciler.apply(&event).unwrap();
                }));
            }
            for handle in handles {
                handle.join().unwrap();
            }

            let created = licenses.list().unwrap();
            assert_eq!(created.len(), 2, "round {round}: duplicate batch created");

            let mut mapped = reconciler.sibling_keys("sub_1").unwrap().unwrap();
            mapped.sort();
            let mut keys: Vec<String> = created.into_iter().map(|l| l.key).collect();
            keys.sort();
            assert_eq!(mapped, keys, "round {round}: orphaned licenses");

            assert_eq!(notifier.sent().len(), 1, "round {round}: duplicate email");
        }
    }

    #[test]
    fn bad_seat_counts_fall_back_to_one() {
        let (reconciler, _licenses, _notifier) = setup();
        for (i, seats) in [Some("0"), Some("lots"), None].into_iter().enumerate() {
            let sub = format!("sub_{i}");
            let mut event = checkout_event("evt", &sub, seats);
            event.id = format!("evt_{i}");
            reconciler.apply(&event).unwrap();
            assert_eq!(reconciler.sibling_keys(&sub).unwrap().unwrap().len(), 1);
        }
    }

    #[test]
    fn cancellation_deactivates_all_seats_and_emails_once() {
        let (reconciler, licenses, notifier) = setup();
        reconciler.apply(&checkout_event("evt_1", "sub_1", Some("3"))).unwrap();

        let cancel = sub_event("customer.subscription.deleted", "evt_2", "sub_1", "canceled");
        reconciler.apply(&cancel).unwrap();
        reconciler.apply(&cancel).unwrap();

        for key in reconciler.sibling_keys("sub_1").unwrap().unwrap() {
            let license = licenses.get(&key).unwrap().unwrap();
            assert!(!license.active);
            assert!(license.cancelled_at.is_some());
            assert_eq!(license.subscription_status.as_deref(), Some("cancelled"));
        }

        let cancellations = notifier
            .sent()
            .iter()
            .filter(|n| matches!(n, SentNotification::Cancellation { .. }))
            .count();
        assert_eq!(cancellations, 1);
    }

    #[test]
    fn events_for_unknown_subscriptions_are_dropped() {
        let (reconciler, licenses, notifier) = setup();

        for event in [
            sub_event("customer.subscription.updated", "evt_1", "sub_x", "past_due"),
            sub_event("customer.subscription.deleted", "evt_2", "sub_x", "canceled"),
        ] {
            reconciler.apply(&event).unwrap();
        }
        let invoice: BillingEvent = serde_json::from_value(json!({
            "id": "evt_3",
            "type": "invoice.payment_failed",
            "data": { "object": { "subscription": "sub_x" } },
        }))
        .unwrap();
        reconciler.apply(&invoice).unwrap();

        assert!(licenses.list().unwrap().is_empty());
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn subscription_status_drives_active_flag() {
        let (reconciler, licenses, _notifier) = setup();
        reconciler.apply(&checkout_event("evt_1", "sub_1", None)).unwrap();
        let key = reconciler.sibling_keys("sub_1").unwrap().unwrap()[0].clone();

        reconciler
            .apply(&sub_event("customer.subscription.updated", "evt_2", "sub_1", "past_due"))
            .unwrap();
        let license = licenses.get(&key).unwrap().unwrap();
        assert!(!license.active);
        assert_eq!(license.subscription_status.as_deref(), Some("past_due"));

        reconciler
            .apply(&sub_event("customer.subscription.updated", "evt_3", "sub_1", "active"))
            .unwrap();
        assert!(licenses.get(&key).unwrap().unwrap().active);
    }

    #[test]
    fn payment_failure_warns_without_deactivating() {
        let (reconciler, licenses, notifier) = setup();
        reconciler.apply(&checkout_event("evt_1", "sub_1", None)).unwrap();
        let key = reconciler.sibling_keys("sub_1").unwrap().unwrap()[0].clone();

        let failed: BillingEvent = serde_json::from_value(json!({
            "id": "evt_2",
            "type": "invoice.payment_failed",
            "data": { "object": { "subscription": "sub_1" } },
        }))
        .unwrap();
        reconciler.apply(&failed).unwrap();
        reconciler.apply(&failed).unwrap();

        assert!(licenses.get(&key).unwrap().unwrap().active);
        let failures = notifier
            .sent()
            .iter()
            .filter(|n| matches!(n, SentNotification::PaymentFailed { .. }))
            .count();
        assert_eq!(failures, 1);
    }

    #[test]
    fn payment_success_reactivates_and_stamps() {
        let (reconciler, licenses, _notifier) = setup();
        reconciler.apply(&checkout_event("evt_1", "sub_1", None)).unwrap();
        let key = reconciler.sibling_keys("sub_1").unwrap().unwrap()[0].clone();
        reconciler
            .apply(&sub_event("customer.subscription.updated", "evt_2", "sub_1", "unpaid"))
            .unwrap();
        assert!(!licenses.get(&key).unwrap().unwrap().active);

        let paid: BillingEvent = serde_json::from_value(json!({
            "id": "evt_3",
            "type": "invoice.payment_succeeded",
            "data": { "object": { "subscription": "sub_1" } },
        }))
        .unwrap();
        reconciler.apply(&paid).unwrap();

        let license = licenses.get(&key).unwrap().unwrap();
        assert!(license.active);
        assert!(license.last_payment_at.is_some());
    }
}
