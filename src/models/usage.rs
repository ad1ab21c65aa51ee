use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Fire-and-forget usage events reported by the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UsageEventType {
    Scrape,
    Post,
    Click,
    SessionStart,
    SessionEnd,
    Heartbeat,
    AiDescriptionGenerated,
}

/// Per-license, per-UTC-calendar-day rollup. Stored as
/// `usage:<key>:<YYYY-MM-DD>` with a 365-day TTL. Absence means zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    pub license_key: String,
    /// YYYY-MM-DD, UTC.
    pub date: String,
    /// Counter per event type name.
    #[serde(default)]
    pub events: BTreeMap<String, u64>,
    #[serde(default)]
    pub total_time_seconds: u64,
    /// UTC hour-of-day ("0".."23") -> activity count.
    #[serde(default)]
    pub hourly_activity: BTreeMap<String, u64>,
}

impl DailyUsage {
    pub fn new(license_key: &str, date: &str) -> Self {
        Self {
            license_key: license_key.to_string(),
            date: date.to_string(),
            events: BTreeMap::new(),
            total_time_seconds: 0,
            hourly_activity: BTreeMap::new(),
        }
    }

    pub fn count(&self, event: UsageEventType) -> u64 {
        self.events.get(event.as_ref()).copied().unwrap_or(0)
    }
}

/// Per-license lifetime counters; monotonically increasing, never expired.
/// Stored as `usage:<key>:lifetime`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifetimeUsage {
    #[serde(default)]
    pub total_posts: u64,
    #[serde(default)]
    pub total_scrapes: u64,
    #[serde(default)]
    pub total_ai_descriptions: u64,
    #[serde(default)]
    pub total_time_seconds: u64,
    pub first_activity: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl LifetimeUsage {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_posts: 0,
            total_scrapes: 0,
            total_ai_descriptions: 0,
            total_time_seconds: 0,
            first_activity: now,
            last_activity: now,
        }
    }
}

/// Lifetime aggregate plus the last 30 days of daily aggregates.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub lifetime: Option<LifetimeUsage>,
    pub daily_usage: Vec<DailyUsage>,
}

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBreakdown {
    pub date: String,
    pub posts: u64,
    pub scrapes: u64,
    pub time_seconds: u64,
}

/// Summed counters over a trailing window, with per-day breakdown for the
/// days that have any recorded activity.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotals {
    pub posts: u64,
    pub scrapes: u64,
    pub ai_descriptions: u64,
    pub time_seconds: u64,
    pub days: Vec<DayBreakdown>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAverages {
    pub posts_per_day_week: f64,
    pub posts_per_day_month: f64,
    pub avg_time_per_post_seconds: u64,
    pub avg_session_minutes: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRollup {
    pub today: Option<DailyUsage>,
    pub yesterday: Option<DailyUsage>,
    pub this_week: PeriodTotals,
    pub this_month: PeriodTotals,
    pub lifetime: Option<LifetimeUsage>,
    pub averages: UsageAverages,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetPeriod {
    pub days: u32,
    pub posts: u64,
    pub scrapes: u64,
    pub time_minutes: u64,
    pub active_days: u32,
    pub avg_posts_per_day: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetEntry {
    pub license_key: String,
    pub dealer_name: String,
    pub plan: crate::models::Plan,
    pub active: bool,
    pub period: FleetPeriod,
    pub lifetime: Option<LifetimeUsage>,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSummary {
    pub period: u32,
    pub total_users: usize,
    pub active_users: usize,
    pub active_today: usize,
    pub total_posts: u64,
    pub users: Vec<FleetEntry>,
}
