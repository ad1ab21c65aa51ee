//! DealerDesk: license, usage, and billing back office for the DealerDesk
//! browser extension.

pub mod billing;
pub mod config;
pub mod error;
pub mod handlers;
pub mod keygen;
pub mod license;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod store;
pub mod usage;
pub mod webhook_sig;

use std::sync::Arc;

use billing::BillingReconciler;
use config::Config;
use license::LicenseService;
use notify::Notifier;
use store::Kv;
use usage::UsageAggregator;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub licenses: LicenseService,
    pub usage: UsageAggregator,
    pub billing: BillingReconciler,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(kv: Arc<dyn Kv>, notifier: Arc<dyn Notifier>, config: Config) -> Self {
        let licenses = LicenseService::new(kv.clone());
        Self {
            billing: BillingReconciler::new(kv.clone(), licenses.clone(), notifier),
            usage: UsageAggregator::new(kv),
            licenses,
            config: Arc::new(config),
        }
    }
}
