//! Provider descriptors, runtime health, and the provider registry.
//!
//! A [`ProviderDescriptor`] is the immutable, configured identity of a
//! provider. Its mutable runtime state (health and rolling stats) lives in the
//! [`ProviderRegistry`] behind a per-provider lock. Providers are created at
//! startup and never removed; they are only disabled and re-enabled.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::budgets::BudgetLimits;
use crate::core::models::Capability;
use crate::error::{AiroError, Result};

/// Default adapter timeout when a provider does not set one.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Weight of the previous value in the rolling success rate and latency.
const EMA_DECAY: f64 = 0.9;

// =============================================================================
// Provider Kind
// =============================================================================

/// Wire shape spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions.
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// LanguageTool grammar checker.
    LanguageTool,
    /// In-process rule-based fallback.
    Local,
}

impl ProviderKind {
    /// Name used in config files.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::LanguageTool => "languagetool",
            Self::Local => "local",
        }
    }

    /// Whether this kind makes network calls and needs an endpoint.
    #[must_use]
    pub const fn is_remote(self) -> bool {
        !matches!(self, Self::Local)
    }

    /// Capabilities this wire shape can serve at all.
    #[must_use]
    pub const fn supported_capabilities(self) -> &'static [Capability] {
        match self {
            Self::OpenAi | Self::Anthropic => Capability::ALL,
            Self::LanguageTool | Self::Local => &[Capability::Correction],
        }
    }

    /// Auth scheme used when config does not name one.
    #[must_use]
    pub const fn default_auth(self) -> AuthScheme {
        match self {
            Self::OpenAi => AuthScheme::Bearer,
            Self::Anthropic => AuthScheme::ApiKeyHeader,
            Self::LanguageTool => AuthScheme::FormField,
            Self::Local => AuthScheme::None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cli_name())
    }
}

/// Billing tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Metered,
    Free,
    Freemium,
}

impl Tier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Metered => "metered",
            Self::Free => "free",
            Self::Freemium => "freemium",
        }
    }
}

/// How the credential is attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// `x-api-key: <key>`.
    #[serde(alias = "x_api_key", alias = "header")]
    ApiKeyHeader,
    /// `apiKey` form field.
    #[serde(alias = "form")]
    FormField,
    None,
}

// =============================================================================
// Limits and Cost
// =============================================================================

/// Provider-wide sliding-window limits. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub per_minute: Option<u32>,
    pub per_hour: Option<u32>,
    pub per_day: Option<u32>,
}

/// Pricing for a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostTable {
    /// Flat charge per request, billed even when the call fails after dispatch.
    pub per_request_usd: f64,
    /// Charge per 1000 units (tokens or characters).
    pub per_1k_units_usd: f64,
}

impl CostTable {
    /// Cost of one successful call that consumed `units`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cost_for(&self, units: u64) -> f64 {
        self.per_1k_units_usd.mul_add(units as f64 / 1000.0, self.per_request_usd)
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// Configured identity of a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub kind: ProviderKind,
    pub tier: Tier,
    /// Lower is preferred.
    pub priority: u32,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    /// Account name sent with form-field credentials.
    pub username: Option<String>,
    pub auth: AuthScheme,
    pub rate_limits: RateLimits,
    /// Provider-specific quota; unset values fall back to global defaults.
    pub quota: BudgetLimits,
    pub cost: CostTable,
    pub capabilities: Vec<Capability>,
    pub timeout: Duration,
    pub enabled: bool,
}

impl ProviderDescriptor {
    /// A descriptor with defaults for everything but identity.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            kind,
            tier: if kind.is_remote() { Tier::Metered } else { Tier::Free },
            priority: 100,
            endpoint: None,
            model: None,
            username: None,
            auth: kind.default_auth(),
            rate_limits: RateLimits::default(),
            quota: BudgetLimits::default(),
            cost: CostTable::default(),
            capabilities: kind.supported_capabilities().to_vec(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
            enabled: true,
        }
    }

    /// Whether this provider is configured for `capability`.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Endpoint with any trailing slash removed.
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.endpoint.as_deref().map(|e| e.trim_end_matches('/'))
    }
}

// =============================================================================
// Runtime State
// =============================================================================

/// Health of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Active,
    Degraded,
    QuotaExceeded,
    Disabled,
}

impl HealthStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who put a provider into its current non-active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthSource {
    /// Capacity cool-down after a provider error.
    CoolDown,
    /// Quota ledger (budget or request limit reached).
    Ledger,
    /// Configuration or an explicit `disable` call.
    Admin,
}

/// Health with its reason and expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<HealthSource>,
}

impl ProviderHealth {
    #[must_use]
    pub const fn active() -> Self {
        Self {
            status: HealthStatus::Active,
            reason: None,
            until: None,
            source: None,
        }
    }
}

/// Rolling call statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    /// EMA of success (1.0) / failure (0.0).
    pub success_rate: f64,
    /// EMA of latency in milliseconds.
    pub avg_latency_ms: f64,
    pub total_calls: u64,
    pub total_failures: u64,
}

impl Default for ProviderStats {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            avg_latency_ms: 0.0,
            total_calls: 0,
            total_failures: 0,
        }
    }
}

impl ProviderStats {
    /// Fold one attempt into the rolling averages. The first sample seeds them.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, success: bool, latency_ms: u64) {
        let sample = if success { 1.0 } else { 0.0 };
        let latency = latency_ms as f64;
        if self.total_calls == 0 {
            self.success_rate = sample;
            self.avg_latency_ms = latency;
        } else {
            self.success_rate = EMA_DECAY.mul_add(self.success_rate, (1.0 - EMA_DECAY) * sample);
            self.avg_latency_ms = EMA_DECAY.mul_add(self.avg_latency_ms, (1.0 - EMA_DECAY) * latency);
        }
        self.total_calls += 1;
        if !success {
            self.total_failures += 1;
        }
    }
}

#[derive(Debug, Clone)]
struct ProviderState {
    health: ProviderHealth,
    stats: ProviderStats,
}

#[derive(Debug)]
struct ProviderEntry {
    descriptor: ProviderDescriptor,
    state: RwLock<ProviderState>,
}

/// Reporting view of one provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSnapshot {
    pub id: String,
    pub kind: ProviderKind,
    pub tier: Tier,
    pub priority: u32,
    pub capabilities: Vec<Capability>,
    pub health: ProviderHealth,
    pub stats: ProviderStats,
}

// =============================================================================
// Registry
// =============================================================================

/// All configured providers with their runtime state.
#[derive(Debug)]
pub struct ProviderRegistry {
    order: Vec<String>,
    entries: HashMap<String, ProviderEntry>,
}

impl ProviderRegistry {
    /// Build the registry. Ids must be unique.
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Result<Self> {
        let mut order = Vec::with_capacity(descriptors.len());
        let mut entries = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if entries.contains_key(&descriptor.id) {
                return Err(AiroError::config(
                    "providers.id",
                    format!("duplicate provider id '{}'", descriptor.id),
                ));
            }
            let health = if descriptor.enabled {
                ProviderHealth::active()
            } else {
                ProviderHealth {
                    status: HealthStatus::Disabled,
                    reason: Some("disabled in configuration".to_string()),
                    until: None,
                    source: Some(HealthSource::Admin),
                }
            };
            order.push(descriptor.id.clone());
            entries.insert(
                descriptor.id.clone(),
                ProviderEntry {
                    descriptor,
                    state: RwLock::new(ProviderState {
                        health,
                        stats: ProviderStats::default(),
                    }),
                },
            );
        }
        Ok(Self { order, entries })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.entries.get(id).map(|e| &e.descriptor)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Descriptors in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.order.iter().filter_map(|id| self.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn entry(&self, id: &str) -> Result<&ProviderEntry> {
        self.entries
            .get(id)
            .ok_or_else(|| AiroError::config("providers", format!("unknown provider '{id}'")))
    }

    /// Current health, restoring an expired cool-down first.
    #[must_use]
    pub fn health(&self, id: &str, now: DateTime<Utc>) -> Option<ProviderHealth> {
        let entry = self.entries.get(id)?;
        let mut state = entry.state.write();
        restore_if_expired(id, &mut state.health, now);
        Some(state.health.clone())
    }

    /// Whether the provider is `active` right now.
    #[must_use]
    pub fn is_active(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.health(id, now)
            .is_some_and(|h| h.status == HealthStatus::Active)
    }

    #[must_use]
    pub fn stats(&self, id: &str) -> Option<ProviderStats> {
        self.entries.get(id).map(|e| e.state.read().stats)
    }

    /// Fold an attempt into the provider's rolling stats.
    pub fn record_attempt(&self, id: &str, success: bool, latency_ms: u64) {
        if let Some(entry) = self.entries.get(id) {
            entry.state.write().stats.record(success, latency_ms);
        }
    }

    /// Put a provider into cool-down until `until`.
    ///
    /// Has no effect on a provider that is already out of quota or disabled.
    pub fn mark_degraded(&self, id: &str, until: DateTime<Utc>, reason: impl Into<String>) {
        let Some(entry) = self.entries.get(id) else {
            return;
        };
        let mut state = entry.state.write();
        if matches!(
            state.health.status,
            HealthStatus::Active | HealthStatus::Degraded
        ) {
            state.health = ProviderHealth {
                status: HealthStatus::Degraded,
                reason: Some(reason.into()),
                until: Some(until),
                source: Some(HealthSource::CoolDown),
            };
        }
    }

    /// Flag a provider on behalf of the quota ledger.
    ///
    /// `hard_stop` disables it outright; otherwise it is `quota_exceeded`.
    /// Returns `true` if health changed. Admin-disabled providers are left alone.
    pub fn mark_quota_exceeded(
        &self,
        id: &str,
        reason: impl Into<String>,
        until: DateTime<Utc>,
        hard_stop: bool,
    ) -> bool {
        let Some(entry) = self.entries.get(id) else {
            return false;
        };
        let mut state = entry.state.write();
        if state.health.source == Some(HealthSource::Admin)
            || state.health.source == Some(HealthSource::Ledger)
        {
            return false;
        }
        state.health = ProviderHealth {
            status: if hard_stop {
                HealthStatus::Disabled
            } else {
                HealthStatus::QuotaExceeded
            },
            reason: Some(reason.into()),
            until: Some(until),
            source: Some(HealthSource::Ledger),
        };
        true
    }

    /// Return a ledger-flagged provider to `active`. Returns `true` if it was flagged.
    pub fn clear_ledger_flag(&self, id: &str) -> bool {
        let Some(entry) = self.entries.get(id) else {
            return false;
        };
        let mut state = entry.state.write();
        if state.health.source == Some(HealthSource::Ledger) {
            state.health = ProviderHealth::active();
            true
        } else {
            false
        }
    }

    /// Administratively disable a provider.
    pub fn disable(&self, id: &str, reason: impl Into<String>) -> Result<()> {
        let entry = self.entry(id)?;
        entry.state.write().health = ProviderHealth {
            status: HealthStatus::Disabled,
            reason: Some(reason.into()),
            until: None,
            source: Some(HealthSource::Admin),
        };
        Ok(())
    }

    /// Administratively re-enable a provider, clearing any cool-down or flag.
    pub fn enable(&self, id: &str) -> Result<()> {
        let entry = self.entry(id)?;
        entry.state.write().health = ProviderHealth::active();
        Ok(())
    }

    /// Restore every provider whose cool-down has expired. Returns their ids.
    pub fn expire_cool_downs(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut restored = Vec::new();
        for id in &self.order {
            if let Some(entry) = self.entries.get(id) {
                let mut state = entry.state.write();
                if restore_if_expired(id, &mut state.health, now) {
                    restored.push(id.clone());
                }
            }
        }
        restored
    }

    /// Reporting view of every provider, in configuration order.
    #[must_use]
    pub fn snapshots(&self, now: DateTime<Utc>) -> Vec<ProviderSnapshot> {
        self.order
            .iter()
            .filter_map(|id| {
                let entry = self.entries.get(id)?;
                let mut state = entry.state.write();
                restore_if_expired(id, &mut state.health, now);
                Some(ProviderSnapshot {
                    id: id.clone(),
                    kind: entry.descriptor.kind,
                    tier: entry.descriptor.tier,
                    priority: entry.descriptor.priority,
                    capabilities: entry.descriptor.capabilities.clone(),
                    health: state.health.clone(),
                    stats: state.stats,
                })
            })
            .collect()
    }
}

fn restore_if_expired(id: &str, health: &mut ProviderHealth, now: DateTime<Utc>) -> bool {
    if health.status == HealthStatus::Degraded
        && health.source == Some(HealthSource::CoolDown)
        && health.until.is_some_and(|until| until <= now)
    {
        tracing::info!(provider = id, "Cool-down expired; provider active again");
        *health = ProviderHealth::active();
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 10, 0, 0).unwrap()
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(vec![
            ProviderDescriptor::new("openai", ProviderKind::OpenAi),
            ProviderDescriptor::new("local", ProviderKind::Local),
        ])
        .unwrap()
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = ProviderRegistry::new(vec![
            ProviderDescriptor::new("a", ProviderKind::Local),
            ProviderDescriptor::new("a", ProviderKind::Local),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn kind_capabilities() {
        assert!(ProviderDescriptor::new("lt", ProviderKind::LanguageTool).supports(Capability::Correction));
        assert!(!ProviderDescriptor::new("lt", ProviderKind::LanguageTool).supports(Capability::Chat));
        assert!(ProviderDescriptor::new("a", ProviderKind::Anthropic).supports(Capability::Chat));
    }

    #[test]
    fn cost_table_combines_flat_and_unit_cost() {
        let cost = CostTable {
            per_request_usd: 0.001,
            per_1k_units_usd: 0.002,
        };
        assert!((cost.cost_for(500) - 0.002).abs() < 1e-12);
    }

    #[test]
    fn ema_seeds_with_first_sample() {
        let mut stats = ProviderStats::default();
        stats.record(false, 200);
        assert!((stats.success_rate - 0.0).abs() < f64::EPSILON);
        assert!((stats.avg_latency_ms - 200.0).abs() < f64::EPSILON);
        stats.record(true, 100);
        assert!((stats.success_rate - 0.1).abs() < 1e-9);
        assert!((stats.avg_latency_ms - 190.0).abs() < 1e-9);
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.total_failures, 1);
    }

    #[test]
    fn cool_down_expires() {
        let reg = registry();
        reg.mark_degraded("openai", now() + chrono::Duration::seconds(60), "HTTP 429");
        assert!(!reg.is_active("openai", now()));
        assert!(reg.is_active("openai", now() + chrono::Duration::seconds(61)));
    }

    #[test]
    fn ledger_flag_cleared_only_for_ledger() {
        let reg = registry();
        reg.disable("local", "maintenance").unwrap();
        assert!(!reg.mark_quota_exceeded("local", "budget", now(), false));
        assert!(!reg.clear_ledger_flag("local"));

        assert!(reg.mark_quota_exceeded("openai", "budget", now(), true));
        assert_eq!(reg.health("openai", now()).unwrap().status, HealthStatus::Disabled);
        assert!(reg.clear_ledger_flag("openai"));
        assert!(reg.is_active("openai", now()));
    }

    #[test]
    fn disabled_in_config_starts_disabled() {
        let mut d = ProviderDescriptor::new("off", ProviderKind::Local);
        d.enabled = false;
        let reg = ProviderRegistry::new(vec![d]).unwrap();
        assert_eq!(reg.health("off", now()).unwrap().status, HealthStatus::Disabled);
        reg.enable("off").unwrap();
        assert!(reg.is_active("off", now()));
    }

    #[test]
    fn unknown_provider_errors() {
        assert!(registry().disable("nope", "x").is_err());
    }
}
