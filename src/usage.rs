//! Usage event aggregation.
//!
//! Events are fire-and-forget: recording failures are logged and swallowed,
//! never surfaced to the extension. All date arithmetic is UTC: the day
//! boundary must be consistent fleet-wide, not locale-correct.
//!
//! Store layout:
//!   usage:<key>:<YYYY-MM-DD>   daily aggregate, 365-day TTL
//!   usage:<key>:lifetime       lifetime aggregate, no TTL
//!   active:<YYYY-MM-DD>        set of license keys seen that day

use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::license::LicenseService;
use crate::models::{
    DailyUsage, DayBreakdown, FleetEntry, FleetPeriod, FleetSummary, LifetimeUsage, PeriodTotals,
    UsageAverages, UsageEventType, UsageRollup, UsageStats,
};
use crate::store::{self, Kv};

const DAILY_TTL_SECS: i64 = 365 * 24 * 60 * 60;
/// Liveness pings arrive once a minute while the extension is active.
const HEARTBEAT_SECS: u64 = 60;

fn daily_slot(license_key: &str, date: &str) -> String {
    format!("usage:{license_key}:{date}")
}

fn lifetime_slot(license_key: &str) -> String {
    format!("usage:{license_key}:lifetime")
}

fn active_set(date: &str) -> String {
    format!("active:{date}")
}

fn day_string(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

#[derive(Clone)]
pub struct UsageAggregator {
    kv: Arc<dyn Kv>,
}

impl UsageAggregator {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    /// Fold one event into the daily and lifetime aggregates. Best-effort:
    /// persistence failures are logged, the event is lost, the caller is
    /// never failed.
    pub fn record(&self, license_key: &str, event: UsageEventType, metadata: Option<&Value>) {
        if let Err(err) = self.record_inner(license_key, event, metadata) {
            tracing::warn!(
                license_key,
                event = event.as_ref(),
                error = %err,
                "dropping usage event"
            );
        }
    }

    fn record_inner(
        &self,
        license_key: &str,
        event: UsageEventType,
        metadata: Option<&Value>,
    ) -> Result<()> {
        let now = Utc::now();
        let date = day_string(now);
        let hour = now.hour().to_string();

        let session_secs = match event {
            UsageEventType::Heartbeat => HEARTBEAT_SECS,
            UsageEventType::SessionEnd => metadata
                .and_then(|m| m.get("durationSeconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0),
            _ => 0,
        };

        store::update_json(
            self.kv.as_ref(),
            &daily_slot(license_key, &date),
            Some(DAILY_TTL_SECS),
            || DailyUsage::new(license_key, &date),
            |daily| {
                *daily.events.entry(event.as_ref().to_string()).or_insert(0) += 1;
                if matches!(event, UsageEventType::SessionStart | UsageEventType::Heartbeat) {
                    *daily.hourly_activity.entry(hour.clone()).or_insert(0) += 1;
                }
                daily.total_time_seconds += session_secs;
            },
        )?;

        store::update_json(
            self.kv.as_ref(),
            &lifetime_slot(license_key),
            None,
            || LifetimeUsage::new(now),
            |lifetime| {
                match event {
                    UsageEventType::Post => lifetime.total_posts += 1,
                    UsageEventType::Scrape => lifetime.total_scrapes += 1,
                    UsageEventType::AiDescriptionGenerated => {
                        lifetime.total_ai_descriptions += 1
                    }
                    UsageEventType::Heartbeat => lifetime.total_time_seconds += HEARTBEAT_SECS,
                    _ => {}
                }
                lifetime.last_activity = now;
            },
        )?;

        self.kv.set_add(&active_set(&date), license_key)?;
        Ok(())
    }

    fn daily(&self, license_key: &str, date: &str) -> Result<Option<DailyUsage>> {
        store::get_json(self.kv.as_ref(), &daily_slot(license_key, date))
    }

    pub fn lifetime(&self, license_key: &str) -> Result<Option<LifetimeUsage>> {
        store::get_json(self.kv.as_ref(), &lifetime_slot(license_key))
    }

    /// Lifetime aggregate plus whatever daily records exist in the last 30
    /// days. Missing days are simply absent, and absence means zero.
    pub fn stats(&self, license_key: &str) -> Result<UsageStats> {
        let now = Utc::now();
        let mut daily_usage = Vec::new();
        for back in 0..30 {
            let date = day_string(now - Duration::days(back));
            if let Some(day) = self.daily(license_key, &date)? {
                daily_usage.push(day);
            }
        }
        Ok(UsageStats {
            lifetime: self.lifetime(license_key)?,
            daily_usage,
        })
    }

    fn period_totals(&self, license_key: &str, days: i64) -> Result<PeriodTotals> {
        let now = Utc::now();
        let mut totals = PeriodTotals::default();
        for back in 0..days {
            let date = day_string(now - Duration::days(back));
            if let Some(day) = self.daily(license_key, &date)? {
                let posts = day.count(UsageEventType::Post);
                let scrapes = day.count(UsageEventType::Scrape);
                totals.posts += posts;
                totals.scrapes += scrapes;
                totals.ai_descriptions += day.count(UsageEventType::AiDescriptionGenerated);
                totals.time_seconds += day.total_time_seconds;
                totals.days.push(DayBreakdown {
                    date,
                    posts,
                    scrapes,
                    time_seconds: day.total_time_seconds,
                });
            }
        }
        Ok(totals)
    }

    /// Today, yesterday, trailing 7/30-day windows, lifetime, and derived
    /// averages. Days with posts > 0 form the average denominators,
    /// defaulting to 1 so an idle license reads as all zeroes, not an error.
    pub fn rollup(&self, license_key: &str) -> Result<UsageRollup> {
        let now = Utc::now();
        let today = self.daily(license_key, &day_string(now))?;
        let yesterday = self.daily(license_key, &day_string(now - Duration::days(1)))?;
        let this_week = self.period_totals(license_key, 7)?;
        let this_month = self.period_totals(license_key, 30)?;
        let lifetime = self.lifetime(license_key)?;

        let active_days_week = this_week.days.iter().filter(|d| d.posts > 0).count().max(1) as u64;
        let active_days_month =
            this_month.days.iter().filter(|d| d.posts > 0).count().max(1) as u64;

        let averages = UsageAverages {
            posts_per_day_week: round1(this_week.posts as f64 / active_days_week as f64),
            posts_per_day_month: round1(this_month.posts as f64 / active_days_month as f64),
            avg_time_per_post_seconds: if this_month.posts > 0 {
                round_u64(this_month.time_seconds as f64 / this_month.posts as f64)
            } else {
                0
            },
            avg_session_minutes: if this_week.days.is_empty() {
                0
            } else {
                round_u64(this_week.time_seconds as f64 / 60.0 / active_days_week as f64)
            },
        };

        Ok(UsageRollup {
            today,
            yesterday,
            this_week,
            this_month,
            lifetime,
            averages,
        })
    }

    /// Per-license period totals across the whole fleet, most recent
    /// activity first; licenses that never reported sort last.
    pub fn fleet_summary(&self, licenses: &LicenseService, period_days: u32) -> Result<FleetSummary> {
        let days = period_days.max(1);
        let today = day_string(Utc::now());
        let active_today = self.kv.set_members(&active_set(&today))?.len();

        let mut users = Vec::new();
        for license in licenses.list()? {
            let totals = self.period_totals(&license.key, days as i64)?;
            let active_days = totals.days.iter().filter(|d| d.posts > 0).count() as u32;
            let lifetime = self.lifetime(&license.key)?;
            let last_activity = lifetime.as_ref().map(|l| l.last_activity);

            users.push(FleetEntry {
                license_key: license.key,
                dealer_name: license.dealer_name,
                plan: license.plan,
                active: license.active,
                period: FleetPeriod {
                    days,
                    posts: totals.posts,
                    scrapes: totals.scrapes,
                    time_minutes: round_u64(totals.time_seconds as f64 / 60.0),
                    active_days,
                    avg_posts_per_day: if active_days > 0 {
                        round1(totals.posts as f64 / active_days as f64)
                    } else {
                        0.0
                    },
                },
                lifetime,
                last_activity,
            });
        }

        // Most recent first, never-active last
        users.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));

        Ok(FleetSummary {
            period: days,
            total_users: users.len(),
            active_users: users.iter().filter(|u| u.period.posts > 0).count(),
            active_today,
            total_posts: users.iter().map(|u| u.period.posts).sum(),
            users,
        })
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round_u64(x: f64) -> u64 {
    x.round() as u64
}
