//! Quota and cost ledger.
//!
//! Tracks, per provider, requests this hour and today plus spend today and this
//! month. Counters reset when "now" crosses the stored boundary, and the next
//! boundary is recomputed from the wall clock, so any number of elapsed periods
//! collapse into a single reset.
//!
//! When a limit is reached the ledger flags the provider in the
//! [`ProviderRegistry`] (`quota_exceeded`, or `disabled` under the hard-stop
//! policy) and records a security event. The flag is lifted on the next reset.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::budgets::{BudgetLimits, ResolvedBudget, resolve_budget};
use crate::core::clock::SharedClock;
use crate::core::events::{SecurityEvent, SecurityEventKind, SecurityEventLog, Severity};
use crate::core::provider::ProviderRegistry;

// =============================================================================
// Period Boundaries
// =============================================================================

/// Start of the next clock hour after `now`.
#[must_use]
pub fn next_hour_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let start = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    start + Duration::hours(1)
}

/// Midnight UTC after `now`.
#[must_use]
pub fn next_day_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive() + Duration::days(1);
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Midnight UTC on the first day of the month after `now`.
#[must_use]
pub fn next_month_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or_else(|| next_day_boundary(now), |dt| Utc.from_utc_datetime(&dt))
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug)]
struct QuotaRecord {
    budget: ResolvedBudget,
    requests_hour: u64,
    requests_day: u64,
    spend_day: f64,
    spend_month: f64,
    next_hour_reset: DateTime<Utc>,
    next_day_reset: DateTime<Utc>,
    next_month_reset: DateTime<Utc>,
    daily_alert_fired: bool,
    monthly_alert_fired: bool,
}

impl QuotaRecord {
    fn new(budget: ResolvedBudget, now: DateTime<Utc>) -> Self {
        Self {
            budget,
            requests_hour: 0,
            requests_day: 0,
            spend_day: 0.0,
            spend_month: 0.0,
            next_hour_reset: next_hour_boundary(now),
            next_day_reset: next_day_boundary(now),
            next_month_reset: next_month_boundary(now),
            daily_alert_fired: false,
            monthly_alert_fired: false,
        }
    }

    /// Zero every counter whose period has ended. Returns `true` if any did.
    fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        let mut reset = false;
        if now >= self.next_hour_reset {
            self.requests_hour = 0;
            self.next_hour_reset = next_hour_boundary(now);
            reset = true;
        }
        if now >= self.next_day_reset {
            self.requests_day = 0;
            self.spend_day = 0.0;
            self.daily_alert_fired = false;
            self.next_day_reset = next_day_boundary(now);
            reset = true;
        }
        if now >= self.next_month_reset {
            self.spend_month = 0.0;
            self.monthly_alert_fired = false;
            self.next_month_reset = next_month_boundary(now);
            reset = true;
        }
        reset
    }

    /// First limit that is currently reached, with the time it clears.
    fn exhaustion(&self) -> Option<(String, DateTime<Utc>)> {
        let limits = &self.budget.limits;
        if let Some(limit) = limits.requests_per_hour
            && self.requests_hour >= limit
        {
            return Some((
                format!("hourly request limit reached ({}/{limit})", self.requests_hour),
                self.next_hour_reset,
            ));
        }
        if let Some(limit) = limits.requests_per_day
            && self.requests_day >= limit
        {
            return Some((
                format!("daily request limit reached ({}/{limit})", self.requests_day),
                self.next_day_reset,
            ));
        }
        if let Some(budget) = limits.monthly_budget
            && self.spend_month >= budget
        {
            return Some((
                format!("monthly budget reached (${:.4}/${budget:.2})", self.spend_month),
                self.next_month_reset,
            ));
        }
        if let Some(budget) = limits.daily_budget
            && self.spend_day >= budget
        {
            return Some((
                format!("daily budget reached (${:.4}/${budget:.2})", self.spend_day),
                self.next_day_reset,
            ));
        }
        None
    }
}

/// Result of a quota check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaCheck {
    Admitted,
    /// A limit is reached; the message names it.
    Exhausted(String),
}

impl QuotaCheck {
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Reporting view of one provider's ledger record.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaSnapshot {
    pub provider: String,
    pub requests_this_hour: u64,
    pub requests_today: u64,
    pub hourly_limit: Option<u64>,
    pub daily_limit: Option<u64>,
    /// Requests left today, when a daily limit is set.
    pub remaining_today: Option<u64>,
    pub spend_today_usd: f64,
    pub spend_this_month_usd: f64,
    pub daily_budget_usd: Option<f64>,
    pub monthly_budget_usd: Option<f64>,
    pub next_hour_reset: DateTime<Utc>,
    pub next_day_reset: DateTime<Utc>,
    pub next_month_reset: DateTime<Utc>,
    pub exhausted: bool,
}

// =============================================================================
// Ledger
// =============================================================================

/// Per-provider quota and spend ledger.
#[derive(Debug)]
pub struct QuotaLedger {
    records: HashMap<String, Mutex<QuotaRecord>>,
    registry: Arc<ProviderRegistry>,
    events: Arc<SecurityEventLog>,
    clock: SharedClock,
    hard_stop: bool,
}

impl QuotaLedger {
    /// Create a ledger for every registered provider.
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        global: &BudgetLimits,
        hard_stop: bool,
        events: Arc<SecurityEventLog>,
        clock: SharedClock,
    ) -> Self {
        let now = clock.now();
        let records = registry
            .iter()
            .map(|d| {
                let budget = resolve_budget(&d.id, global, &d.quota);
                (d.id.clone(), Mutex::new(QuotaRecord::new(budget, now)))
            })
            .collect();
        Self {
            records,
            registry,
            events,
            clock,
            hard_stop,
        }
    }

    /// Whether `provider` may take another request right now.
    ///
    /// Never consumes anything; calling it repeatedly within a period leaves
    /// the counters untouched.
    #[must_use]
    pub fn admit(&self, provider: &str) -> bool {
        self.check(provider).is_admitted()
    }

    /// Like [`admit`](Self::admit) but names the exhausted limit.
    #[must_use]
    pub fn check(&self, provider: &str) -> QuotaCheck {
        let Some(record) = self.records.get(provider) else {
            return QuotaCheck::Admitted;
        };
        let now = self.clock.now();
        let mut record = record.lock();
        self.reset_if_due(provider, &mut record, now);
        match record.exhaustion() {
            Some((message, _)) => QuotaCheck::Exhausted(message),
            None => QuotaCheck::Admitted,
        }
    }

    /// Claim one request slot for `provider`.
    ///
    /// The limit check and the increment happen under the record lock, so
    /// concurrent callers can never claim more slots than the limit allows.
    /// The cost is added later with [`record`](Self::record).
    pub fn reserve(&self, provider: &str) -> QuotaCheck {
        let Some(record) = self.records.get(provider) else {
            return QuotaCheck::Admitted;
        };
        let now = self.clock.now();
        let mut record = record.lock();
        self.reset_if_due(provider, &mut record, now);
        if let Some((message, _)) = record.exhaustion() {
            return QuotaCheck::Exhausted(message);
        }
        record.requests_hour += 1;
        record.requests_day += 1;
        self.flag_if_exhausted(provider, &record);
        QuotaCheck::Admitted
    }

    /// Return a slot claimed by [`reserve`](Self::reserve) that was never used.
    pub fn release(&self, provider: &str) {
        let Some(record) = self.records.get(provider) else {
            return;
        };
        let mut record = record.lock();
        record.requests_hour = record.requests_hour.saturating_sub(1);
        record.requests_day = record.requests_day.saturating_sub(1);
        if record.exhaustion().is_none() && self.registry.clear_ledger_flag(provider) {
            tracing::debug!(provider, "Request slot released; provider active again");
        }
    }

    /// Add the cost of a reserved attempt.
    pub fn record(&self, provider: &str, cost_usd: f64) {
        let Some(record) = self.records.get(provider) else {
            return;
        };
        let now = self.clock.now();
        let mut record = record.lock();
        self.reset_if_due(provider, &mut record, now);

        let cost = cost_usd.max(0.0);
        record.spend_day += cost;
        record.spend_month += cost;

        tracing::debug!(
            provider,
            cost_usd = cost,
            spend_today = record.spend_day,
            requests_today = record.requests_day,
            "Quota recorded"
        );

        self.check_alerts(provider, &mut record);
        self.flag_if_exhausted(provider, &record);
    }

    fn flag_if_exhausted(&self, provider: &str, record: &QuotaRecord) {
        if let Some((reason, until)) = record.exhaustion()
            && self
                .registry
                .mark_quota_exceeded(provider, reason.clone(), until, self.hard_stop)
        {
            let action = if self.hard_stop {
                "disabled until reset"
            } else {
                "skipped until reset"
            };
            self.events.record(
                SecurityEvent::new(
                    SecurityEventKind::BudgetExceeded,
                    Severity::High,
                    format!("{provider}: {reason}; {action}"),
                )
                .with_provider(provider),
            );
        }
    }

    /// Apply any due resets for every provider. Returns the providers that reset.
    pub fn roll_over(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut reset = Vec::new();
        for (provider, record) in &self.records {
            let mut record = record.lock();
            if self.reset_if_due(provider, &mut record, now) {
                reset.push(provider.clone());
            }
        }
        reset.sort();
        reset
    }

    #[must_use]
    pub fn snapshot(&self, provider: &str) -> Option<QuotaSnapshot> {
        let record = self.records.get(provider)?;
        let now = self.clock.now();
        let mut record = record.lock();
        self.reset_if_due(provider, &mut record, now);
        let limits = record.budget.limits;
        Some(QuotaSnapshot {
            provider: provider.to_string(),
            requests_this_hour: record.requests_hour,
            requests_today: record.requests_day,
            hourly_limit: limits.requests_per_hour,
            daily_limit: limits.requests_per_day,
            remaining_today: limits
                .requests_per_day
                .map(|l| l.saturating_sub(record.requests_day)),
            spend_today_usd: record.spend_day,
            spend_this_month_usd: record.spend_month,
            daily_budget_usd: limits.daily_budget,
            monthly_budget_usd: limits.monthly_budget,
            next_hour_reset: record.next_hour_reset,
            next_day_reset: record.next_day_reset,
            next_month_reset: record.next_month_reset,
            exhausted: record.exhaustion().is_some(),
        })
    }

    /// Resolved limits for a provider.
    #[must_use]
    pub fn budget(&self, provider: &str) -> Option<ResolvedBudget> {
        self.records.get(provider).map(|r| r.lock().budget.clone())
    }

    fn reset_if_due(&self, provider: &str, record: &mut QuotaRecord, now: DateTime<Utc>) -> bool {
        if !record.roll_over(now) {
            return false;
        }
        if record.exhaustion().is_none() && self.registry.clear_ledger_flag(provider) {
            tracing::info!(provider, "Quota reset; provider active again");
        }
        true
    }

    fn check_alerts(&self, provider: &str, record: &mut QuotaRecord) {
        if let Some(budget) = record.budget.limits.daily_budget
            && !record.daily_alert_fired
            && record.spend_day >= record.budget.alert_level(budget)
        {
            record.daily_alert_fired = true;
            self.alert(provider, "daily", record.spend_day, budget);
        }
        if let Some(budget) = record.budget.limits.monthly_budget
            && !record.monthly_alert_fired
            && record.spend_month >= record.budget.alert_level(budget)
        {
            record.monthly_alert_fired = true;
            self.alert(provider, "monthly", record.spend_month, budget);
        }
    }

    fn alert(&self, provider: &str, period: &str, spent: f64, budget: f64) {
        let percent = if budget > 0.0 { spent / budget * 100.0 } else { 100.0 };
        self.events.record(
            SecurityEvent::new(
                SecurityEventKind::BudgetAlert,
                Severity::Medium,
                format!("{provider}: {period} spend ${spent:.4} is {percent:.0}% of ${budget:.2}"),
            )
            .with_provider(provider),
        );
    }
}
