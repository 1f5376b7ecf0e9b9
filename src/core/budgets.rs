//! Quota and budget precedence resolution.
//!
//! Limits can be set globally (`[limits]` in the config file) and per provider
//! (`[providers.quota]`). A provider-specific value overrides the global one
//! field by field; the resolved budget records where each value came from.
//!
//! ```toml
//! [limits]
//! daily_budget = 5.0
//! monthly_budget = 100.0
//! alert_threshold_percent = 80
//!
//! [[providers]]
//! id = "openai"
//! quota = { daily_budget = 2.0, requests_per_hour = 200 }
//! ```

use serde::{Deserialize, Serialize};

/// Default alert threshold when neither level sets one.
pub const DEFAULT_ALERT_THRESHOLD_PERCENT: f64 = 80.0;

// =============================================================================
// Budget Level
// =============================================================================

/// Where a resolved value came from. Higher levels override lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BudgetLevel {
    /// Built-in default.
    Default = 0,
    /// Global `[limits]` section.
    Global = 1,
    /// The provider's own `quota` table.
    ProviderSpecific = 2,
}

impl BudgetLevel {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Global => "global",
            Self::ProviderSpecific => "provider",
        }
    }
}

// =============================================================================
// Budget Limits
// =============================================================================

/// Quota and spend limits configurable at either level. `None` is unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetLimits {
    /// Requests allowed per clock hour.
    #[serde(alias = "requestsPerHour")]
    pub requests_per_hour: Option<u64>,
    /// Requests allowed per calendar day (UTC).
    #[serde(alias = "requestsPerDay")]
    pub requests_per_day: Option<u64>,
    /// Spend allowed per calendar day, in USD.
    #[serde(alias = "dailyBudget")]
    pub daily_budget: Option<f64>,
    /// Spend allowed per calendar month, in USD.
    #[serde(alias = "monthlyBudget")]
    pub monthly_budget: Option<f64>,
    /// Percentage of a budget at which an alert fires (0-100).
    #[serde(alias = "alertThresholdPercent")]
    pub alert_threshold_percent: Option<f64>,
}

impl BudgetLimits {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.requests_per_hour.is_none()
            && self.requests_per_day.is_none()
            && self.daily_budget.is_none()
            && self.monthly_budget.is_none()
            && self.alert_threshold_percent.is_none()
    }
}

/// Where each resolved value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BudgetSources {
    pub requests_per_hour: Option<BudgetLevel>,
    pub requests_per_day: Option<BudgetLevel>,
    pub daily_budget: Option<BudgetLevel>,
    pub monthly_budget: Option<BudgetLevel>,
    pub alert_threshold_percent: Option<BudgetLevel>,
}

/// Fully resolved limits for one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedBudget {
    pub provider: String,
    pub limits: BudgetLimits,
    /// Always set after resolution.
    pub alert_threshold_percent: f64,
    pub sources: BudgetSources,
}

impl ResolvedBudget {
    /// Spend at which the alert for `budget` fires.
    #[must_use]
    pub fn alert_level(&self, budget: f64) -> f64 {
        budget * self.alert_threshold_percent / 100.0
    }
}

// =============================================================================
// Resolution
// =============================================================================

fn pick<T: Copy>(
    provider: Option<T>,
    global: Option<T>,
    source: &mut Option<BudgetLevel>,
) -> Option<T> {
    if provider.is_some() {
        *source = Some(BudgetLevel::ProviderSpecific);
        provider
    } else if global.is_some() {
        *source = Some(BudgetLevel::Global);
        global
    } else {
        None
    }
}

/// Merge provider-specific limits over global defaults.
#[must_use]
pub fn resolve_budget(
    provider_id: &str,
    global: &BudgetLimits,
    provider: &BudgetLimits,
) -> ResolvedBudget {
    let mut sources = BudgetSources::default();
    let limits = BudgetLimits {
        requests_per_hour: pick(
            provider.requests_per_hour,
            global.requests_per_hour,
            &mut sources.requests_per_hour,
        ),
        requests_per_day: pick(
            provider.requests_per_day,
            global.requests_per_day,
            &mut sources.requests_per_day,
        ),
        daily_budget: pick(provider.daily_budget, global.daily_budget, &mut sources.daily_budget),
        monthly_budget: pick(
            provider.monthly_budget,
            global.monthly_budget,
            &mut sources.monthly_budget,
        ),
        alert_threshold_percent: pick(
            provider.alert_threshold_percent,
            global.alert_threshold_percent,
            &mut sources.alert_threshold_percent,
        ),
    };

    let alert_threshold_percent = limits.alert_threshold_percent.unwrap_or_else(|| {
        sources.alert_threshold_percent = Some(BudgetLevel::Default);
        DEFAULT_ALERT_THRESHOLD_PERCENT
    });

    ResolvedBudget {
        provider: provider_id.to_string(),
        limits,
        alert_threshold_percent,
        sources,
    }
}
