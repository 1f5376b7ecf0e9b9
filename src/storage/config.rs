//! Configuration file loading and validation.
//!
//! The file is located by, in order:
//! 1. `--config PATH`
//! 2. `AIRO_CONFIG`
//! 3. `<config_dir>/airo/config.toml`
//!
//! ## Environment Variables
//!
//! Applied on top of the file:
//!
//! - `AIRO_DAILY_BUDGET`: global daily budget in USD
//! - `AIRO_MONTHLY_BUDGET`: global monthly budget in USD
//! - `AIRO_RATE_LIMIT_PER_MINUTE`: per-caller requests per minute
//! - `AIRO_CACHE_TTL_SECONDS`: response cache TTL
//! - `AIRO_MAX_INPUT_LENGTH`: content guard length limit (characters)

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::core::budgets::{BudgetLimits, DEFAULT_ALERT_THRESHOLD_PERCENT};
use crate::core::events::{DEFAULT_EVENT_CAPACITY, DEFAULT_EVENT_MAX_AGE_HOURS};
use crate::core::guard::{ContentGuard, DEFAULT_MAX_INPUT_LENGTH, PatternRule};
use crate::core::models::Capability;
use crate::core::provider::{
    AuthScheme, CostTable, DEFAULT_PROVIDER_TIMEOUT, ProviderDescriptor, ProviderKind, RateLimits,
    Tier,
};
use crate::core::rate_limit::CallerLimits;
use crate::error::{AiroError, Result};
use crate::storage::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL_SECS};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "AIRO_CONFIG";
/// Environment variable for the global daily budget.
pub const ENV_DAILY_BUDGET: &str = "AIRO_DAILY_BUDGET";
/// Environment variable for the global monthly budget.
pub const ENV_MONTHLY_BUDGET: &str = "AIRO_MONTHLY_BUDGET";
/// Environment variable for the per-caller minute limit.
pub const ENV_RATE_LIMIT_PER_MINUTE: &str = "AIRO_RATE_LIMIT_PER_MINUTE";
/// Environment variable for the cache TTL.
pub const ENV_CACHE_TTL_SECONDS: &str = "AIRO_CACHE_TTL_SECONDS";
/// Environment variable for the guard length limit.
pub const ENV_MAX_INPUT_LENGTH: &str = "AIRO_MAX_INPUT_LENGTH";

/// Upper bound for `limits.credential_rotation_interval_hours` (one year).
pub const MAX_ROTATION_INTERVAL_HOURS: u64 = 24 * 366;
/// Upper bound for `limits.provider_cool_down_seconds` (one day).
pub const MAX_COOL_DOWN_SECONDS: u64 = 24 * 60 * 60;
/// Upper bound for `audit.event_max_age_hours` (one year).
pub const MAX_EVENT_MAX_AGE_HOURS: i64 = 24 * 366;
/// Upper bound for `general.maintenance_interval_seconds` (one day).
pub const MAX_MAINTENANCE_INTERVAL_SECONDS: u64 = 24 * 60 * 60;

// =============================================================================
// Sections
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub limits: LimitsConfig,
    pub cache: CacheConfig,
    pub guard: GuardConfig,
    pub audit: AuditConfig,
    /// `[[providers]]` entries, in preference-neutral config order.
    pub providers: Vec<ProviderConfig>,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Timeout for provider calls that do not set their own.
    #[serde(alias = "timeoutSeconds")]
    pub timeout_seconds: u64,
    /// Disable (rather than merely flag) a provider that exhausts its budget.
    #[serde(alias = "hardStop")]
    pub hard_stop: bool,
    /// Number of recent call outcomes kept in memory.
    #[serde(alias = "outcomeLogCapacity")]
    pub outcome_log_capacity: usize,
    /// Period of the background maintenance tasks.
    #[serde(alias = "maintenanceIntervalSeconds")]
    pub maintenance_interval_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_PROVIDER_TIMEOUT.as_secs(),
            hard_stop: false,
            outcome_log_capacity: 500,
            maintenance_interval_seconds: 60,
        }
    }
}

/// Global limits. Provider `quota` tables override the budget values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    #[serde(alias = "dailyBudget")]
    pub daily_budget: Option<f64>,
    #[serde(alias = "monthlyBudget")]
    pub monthly_budget: Option<f64>,
    #[serde(alias = "alertThresholdPercent")]
    pub alert_threshold_percent: f64,
    #[serde(alias = "rateLimitPerMinute")]
    pub rate_limit_per_minute: Option<u32>,
    #[serde(alias = "rateLimitPerDay")]
    pub rate_limit_per_day: Option<u32>,
    #[serde(alias = "cacheMaxEntries")]
    pub cache_max_entries: usize,
    #[serde(alias = "cacheTtlSeconds", alias = "cacheTTL")]
    pub cache_ttl_seconds: u64,
    /// 0 turns off time-based rotation.
    #[serde(alias = "credentialRotationIntervalHours")]
    pub credential_rotation_interval_hours: u64,
    #[serde(alias = "providerCoolDownSeconds")]
    pub provider_cool_down_seconds: u64,
    #[serde(alias = "maxInputLength")]
    pub max_input_length: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            daily_budget: None,
            monthly_budget: None,
            alert_threshold_percent: DEFAULT_ALERT_THRESHOLD_PERCENT,
            rate_limit_per_minute: None,
            rate_limit_per_day: None,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            cache_ttl_seconds: DEFAULT_TTL_SECS,
            credential_rotation_interval_hours: 24,
            provider_cool_down_seconds: 300,
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
        }
    }
}

impl LimitsConfig {
    /// Global budget defaults in ledger form.
    #[must_use]
    pub const fn budget_defaults(&self) -> BudgetLimits {
        BudgetLimits {
            requests_per_hour: None,
            requests_per_day: None,
            daily_budget: self.daily_budget,
            monthly_budget: self.monthly_budget,
            alert_threshold_percent: Some(self.alert_threshold_percent),
        }
    }

    /// Per-caller sliding-window limits.
    #[must_use]
    pub const fn caller_limits(&self) -> CallerLimits {
        CallerLimits {
            per_minute: self.rate_limit_per_minute,
            per_day: self.rate_limit_per_day,
        }
    }

    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// `None` when time-based rotation is off. Clamped to
    /// [`MAX_ROTATION_INTERVAL_HOURS`].
    #[must_use]
    pub fn rotation_interval(&self) -> Option<chrono::Duration> {
        if self.credential_rotation_interval_hours == 0 {
            return None;
        }
        let hours = self
            .credential_rotation_interval_hours
            .min(MAX_ROTATION_INTERVAL_HOURS);
        i64::try_from(hours).ok().and_then(chrono::Duration::try_hours)
    }

    /// Clamped to [`MAX_COOL_DOWN_SECONDS`].
    #[must_use]
    pub fn cool_down(&self) -> chrono::Duration {
        let seconds = self.provider_cool_down_seconds.min(MAX_COOL_DOWN_SECONDS);
        i64::try_from(seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(chrono::Duration::zero)
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// JSON snapshot loaded at startup and saved by maintenance.
    #[serde(alias = "snapshotPath")]
    pub snapshot_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            snapshot_path: None,
        }
    }
}

/// Content guard settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    #[serde(alias = "disallowedPatterns")]
    pub disallowed_patterns: Vec<PatternRule>,
}

/// Security event and audit sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Append usage and security records here, one JSON object per line.
    #[serde(alias = "jsonlPath")]
    pub jsonl_path: Option<PathBuf>,
    #[serde(alias = "eventCapacity")]
    pub event_capacity: usize,
    #[serde(alias = "eventMaxAgeHours")]
    pub event_max_age_hours: i64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            jsonl_path: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            event_max_age_hours: DEFAULT_EVENT_MAX_AGE_HOURS,
        }
    }
}

/// One `[[providers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    /// Defaults to `metered` for network kinds and `free` for `local`.
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default, alias = "baseUrl", alias = "base_url")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Defaults to the scheme of the kind.
    #[serde(default)]
    pub auth: Option<AuthScheme>,
    /// Credential references: `env:VAR`, `keyring:service/user`, or a literal.
    #[serde(default)]
    pub credentials: Vec<String>,
    #[serde(default, alias = "rateLimits")]
    pub rate_limits: RateLimits,
    #[serde(default)]
    pub quota: BudgetLimits,
    #[serde(default)]
    pub cost: CostTable,
    /// Defaults to everything the kind supports.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default, alias = "timeoutSeconds")]
    pub timeout_seconds: Option<u64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_priority() -> u32 {
    100
}

const fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    /// Minimal entry for a kind; everything else defaulted.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            kind,
            tier: None,
            priority: default_priority(),
            endpoint: None,
            model: None,
            username: None,
            auth: None,
            credentials: Vec::new(),
            rate_limits: RateLimits::default(),
            quota: BudgetLimits::default(),
            cost: CostTable::default(),
            capabilities: Vec::new(),
            timeout_seconds: None,
            enabled: true,
        }
    }

    /// Effective tier.
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.tier.unwrap_or(if self.kind.is_remote() {
            Tier::Metered
        } else {
            Tier::Free
        })
    }

    /// Effective auth scheme.
    #[must_use]
    pub fn auth(&self) -> AuthScheme {
        self.auth.unwrap_or_else(|| self.kind.default_auth())
    }

    /// Build the runtime descriptor. `default_timeout` applies when the entry sets none.
    #[must_use]
    pub fn to_descriptor(&self, default_timeout: Duration) -> ProviderDescriptor {
        let mut descriptor = ProviderDescriptor::new(self.id.clone(), self.kind);
        descriptor.tier = self.tier();
        descriptor.priority = self.priority;
        descriptor.endpoint.clone_from(&self.endpoint);
        descriptor.model.clone_from(&self.model);
        descriptor.username.clone_from(&self.username);
        descriptor.auth = self.auth();
        descriptor.rate_limits = self.rate_limits;
        descriptor.quota = self.quota;
        descriptor.cost = self.cost;
        if !self.capabilities.is_empty() {
            descriptor.capabilities.clone_from(&self.capabilities);
        }
        descriptor.timeout = self
            .timeout_seconds
            .map_or(default_timeout, Duration::from_secs);
        descriptor.enabled = self.enabled;
        descriptor
    }
}

// =============================================================================
// Loading
// =============================================================================

impl Config {
    /// Resolve the config file path: explicit path, then `AIRO_CONFIG`, then the platform default.
    #[must_use]
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Some(path) = std::env::var_os(ENV_CONFIG).filter(|v| !v.is_empty()) {
            return PathBuf::from(path);
        }
        AppPaths::new().config_file()
    }

    /// Locate, parse, apply env overrides, and validate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file is missing, unparsable, or invalid.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(explicit);
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a specific file without env overrides or validation.
    ///
    /// A router with no providers cannot do anything, so a missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AiroError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| AiroError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Parse TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AiroError::config("config", format!("failed to serialize config: {e}")))?;
        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Apply `AIRO_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the variable if a value does not parse.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_parse::<f64>(ENV_DAILY_BUDGET)? {
            self.limits.daily_budget = Some(v);
        }
        if let Some(v) = env_parse::<f64>(ENV_MONTHLY_BUDGET)? {
            self.limits.monthly_budget = Some(v);
        }
        if let Some(v) = env_parse::<u32>(ENV_RATE_LIMIT_PER_MINUTE)? {
            self.limits.rate_limit_per_minute = Some(v);
        }
        if let Some(v) = env_parse::<u64>(ENV_CACHE_TTL_SECONDS)? {
            self.limits.cache_ttl_seconds = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_MAX_INPUT_LENGTH)? {
            self.limits.max_input_length = v;
        }
        Ok(())
    }

    /// Runtime descriptors for every configured provider.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        let default_timeout = Duration::from_secs(self.general.timeout_seconds);
        self.providers
            .iter()
            .map(|p| p.to_descriptor(default_timeout))
            .collect()
    }

    /// Validate configuration values.
    ///
    /// Checks that:
    /// - at least one provider is configured, with unique ids
    /// - network kinds have an endpoint
    /// - metered providers that authenticate have credentials
    /// - capabilities are ones the kind can serve
    /// - percentages, budgets, and limits are in range
    /// - guard patterns compile
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(AiroError::config("providers", "no providers configured"));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            validate_provider(provider)?;
            if !seen.insert(provider.id.as_str()) {
                return Err(AiroError::config(
                    "providers.id",
                    format!("duplicate provider id '{}'", provider.id),
                ));
            }
        }

        validate_budget("limits", &self.limits.budget_defaults())?;

        let limits = &self.limits;
        if limits.rate_limit_per_minute == Some(0) || limits.rate_limit_per_day == Some(0) {
            return Err(AiroError::config(
                "limits.rate_limit_per_minute",
                "rate limits must be greater than zero (omit them for no limit)",
            ));
        }
        for (key, value) in [
            ("limits.cache_max_entries", limits.cache_max_entries as u64),
            ("limits.cache_ttl_seconds", limits.cache_ttl_seconds),
            ("limits.max_input_length", limits.max_input_length as u64),
            ("general.timeout_seconds", self.general.timeout_seconds),
            (
                "general.maintenance_interval_seconds",
                self.general.maintenance_interval_seconds,
            ),
            ("general.outcome_log_capacity", self.general.outcome_log_capacity as u64),
            ("audit.event_capacity", self.audit.event_capacity as u64),
        ] {
            if value == 0 {
                return Err(AiroError::config(key, format!("{key} must be greater than zero")));
            }
        }
        if self.audit.event_max_age_hours <= 0 {
            return Err(AiroError::config(
                "audit.event_max_age_hours",
                "event max age must be positive",
            ));
        }
        for (key, value, max) in [
            (
                "limits.credential_rotation_interval_hours",
                limits.credential_rotation_interval_hours,
                MAX_ROTATION_INTERVAL_HOURS,
            ),
            (
                "limits.provider_cool_down_seconds",
                limits.provider_cool_down_seconds,
                MAX_COOL_DOWN_SECONDS,
            ),
            (
                "general.maintenance_interval_seconds",
                self.general.maintenance_interval_seconds,
                MAX_MAINTENANCE_INTERVAL_SECONDS,
            ),
        ] {
            if value > max {
                return Err(AiroError::config(key, format!("{key} must be at most {max}")));
            }
        }
        if self.audit.event_max_age_hours > MAX_EVENT_MAX_AGE_HOURS {
            return Err(AiroError::config(
                "audit.event_max_age_hours",
                format!("event max age must be at most {MAX_EVENT_MAX_AGE_HOURS} hours"),
            ));
        }

        ContentGuard::new(limits.max_input_length, &self.guard.disallowed_patterns)?;
        Ok(())
    }
}

fn validate_provider(provider: &ProviderConfig) -> Result<()> {
    let id = &provider.id;
    if id.trim().is_empty() {
        return Err(AiroError::config("providers.id", "provider id must not be empty"));
    }

    if provider.kind.is_remote()
        && provider
            .endpoint
            .as_deref()
            .is_none_or(|e| e.trim().is_empty())
    {
        return Err(AiroError::config(
            "providers.endpoint",
            format!("provider '{id}' ({}) needs an endpoint", provider.kind),
        ));
    }

    if provider.tier() == Tier::Metered
        && provider.auth() != AuthScheme::None
        && provider.credentials.is_empty()
    {
        return Err(AiroError::config(
            "providers.credentials",
            format!("metered provider '{id}' has no credentials"),
        ));
    }

    let supported = provider.kind.supported_capabilities();
    if let Some(cap) = provider.capabilities.iter().find(|c| !supported.contains(c)) {
        return Err(AiroError::config(
            "providers.capabilities",
            format!("provider '{id}' ({}) cannot serve {cap}", provider.kind),
        ));
    }

    let limits = provider.rate_limits;
    if [limits.per_minute, limits.per_hour, limits.per_day].contains(&Some(0)) {
        return Err(AiroError::config(
            "providers.rate_limits",
            format!("provider '{id}' has a zero rate limit"),
        ));
    }
    if provider.timeout_seconds == Some(0) {
        return Err(AiroError::config(
            "providers.timeout_seconds",
            format!("provider '{id}' timeout must be greater than zero"),
        ));
    }
    if provider.cost.per_request_usd < 0.0 || provider.cost.per_1k_units_usd < 0.0 {
        return Err(AiroError::config(
            "providers.cost",
            format!("provider '{id}' has a negative cost"),
        ));
    }

    validate_budget(&format!("providers.{id}.quota"), &provider.quota)
}

fn validate_budget(key: &str, limits: &BudgetLimits) -> Result<()> {
    if let Some(pct) = limits.alert_threshold_percent {
        if !(pct > 0.0 && pct <= 100.0) {
            return Err(AiroError::config(
                format!("{key}.alert_threshold_percent"),
                format!("alert threshold {pct} must be in (0, 100]"),
            ));
        }
    }
    for (name, value) in [
        ("daily_budget", limits.daily_budget),
        ("monthly_budget", limits.monthly_budget),
    ] {
        if value.is_some_and(|v| v <= 0.0 || !v.is_finite()) {
            return Err(AiroError::config(
                format!("{key}.{name}"),
                format!("{name} must be a positive amount"),
            ));
        }
    }
    if limits.requests_per_hour == Some(0) || limits.requests_per_day == Some(0) {
        return Err(AiroError::config(
            format!("{key}.requests_per_day"),
            "request quotas must be greater than zero",
        ));
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| AiroError::config(key, format!("{key}={raw} is not a valid value")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[allow(unsafe_code)]
    fn set_env(key: &str, value: &str) {
        // SAFETY: env-mutating tests hold ENV_LOCK
        unsafe { std::env::set_var(key, value) };
    }

    #[allow(unsafe_code)]
    fn remove_env(key: &str) {
        // SAFETY: env-mutating tests hold ENV_LOCK
        unsafe { std::env::remove_var(key) };
    }

    const MINIMAL: &str = r#"
[[providers]]
id = "local"
kind = "local"
"#;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn minimal_config_is_valid() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.general.timeout_seconds, 30);
        assert_eq!(config.limits.cache_max_entries, DEFAULT_MAX_ENTRIES);
        assert_eq!(config.providers[0].tier(), Tier::Free);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let err = Config::load_from(Path::new("/nonexistent/airo/config.toml")).unwrap_err();
        assert_eq!(err.error_code(), "AIRO-C001");
    }

    #[test]
    fn load_invalid_toml_returns_parse_error() {
        let file = write_config("this is not valid toml {{{{");
        let err = Config::load_from(file.path()).unwrap_err();
        assert_eq!(err.error_code(), "AIRO-C002");
    }

    #[test]
    fn full_config_parses() {
        let file = write_config(
            r#"
[general]
timeout_seconds = 20
hard_stop = true

[limits]
dailyBudget = 5.0
monthly_budget = 50.0
alertThresholdPercent = 90
rate_limit_per_minute = 10
cacheTtlSeconds = 600
credential_rotation_interval_hours = 0

[cache]
snapshot_path = "/tmp/airo-cache.json"

[guard]
disallowed_patterns = [{ name = "ssn", pattern = '\d{3}-\d{2}-\d{4}' }]

[audit]
jsonl_path = "/tmp/airo-audit.jsonl"

[[providers]]
id = "openai"
kind = "openai"
priority = 1
endpoint = "https://api.openai.com/v1"
model = "gpt-4o-mini"
credentials = ["sk-one", "sk-two"]
rate_limits = { per_minute = 60 }
quota = { daily_budget = 2.0, requests_per_day = 1000 }
cost = { per_request_usd = 0.0, per_1k_units_usd = 0.002 }

[[providers]]
id = "local"
kind = "local"
priority = 99
"#,
        );
        let config = Config::load_from(file.path()).unwrap();
        config.validate().unwrap();

        assert!(config.general.hard_stop);
        assert_eq!(config.limits.daily_budget, Some(5.0));
        assert!((config.limits.alert_threshold_percent - 90.0).abs() < f64::EPSILON);
        assert_eq!(config.limits.cache_ttl(), Duration::from_secs(600));
        assert!(config.limits.rotation_interval().is_none());
        assert_eq!(config.guard.disallowed_patterns[0].name, "ssn");

        let descriptors = config.descriptors();
        assert_eq!(descriptors[0].timeout, Duration::from_secs(20));
        assert_eq!(descriptors[0].auth, AuthScheme::Bearer);
        assert_eq!(descriptors[0].rate_limits.per_minute, Some(60));
        assert_eq!(descriptors[0].quota.requests_per_day, Some(1000));
        assert_eq!(descriptors[1].capabilities, vec![Capability::Correction]);
    }

    #[test]
    fn validate_rejects_empty_provider_list() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("no providers"));
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.providers.push(ProviderConfig::new("local", ProviderKind::Local));
        assert!(config.validate().unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn validate_rejects_remote_without_endpoint() {
        let mut config = Config::default();
        let mut p = ProviderConfig::new("lt", ProviderKind::LanguageTool);
        p.tier = Some(Tier::Free);
        config.providers.push(p);
        assert!(config.validate().unwrap_err().to_string().contains("endpoint"));
    }

    #[test]
    fn validate_rejects_metered_without_credentials() {
        let mut config = Config::default();
        let mut p = ProviderConfig::new("openai", ProviderKind::OpenAi);
        p.endpoint = Some("https://api.openai.com/v1".to_string());
        config.providers.push(p);
        assert!(config.validate().unwrap_err().to_string().contains("credentials"));

        config.providers[0].tier = Some(Tier::Freemium);
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_regex() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.guard.disallowed_patterns.push(PatternRule {
            name: "broken".to_string(),
            pattern: "(unclosed".to_string(),
        });
        assert_eq!(config.validate().unwrap_err().error_code(), "AIRO-C003");
    }

    #[test]
    fn validate_rejects_out_of_range_percent() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.limits.alert_threshold_percent = 150.0;
        assert!(config.validate().is_err());
        config.limits.alert_threshold_percent = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_limits() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.limits.rate_limit_per_minute = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.limits.cache_max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.providers[0].rate_limits.per_hour = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_durations_past_their_bounds() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.limits.provider_cool_down_seconds = 10_000_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "AIRO-C003");
        assert!(err.to_string().contains("provider_cool_down_seconds"));

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.limits.credential_rotation_interval_hours = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.audit.event_max_age_hours = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.general.maintenance_interval_seconds = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.limits.provider_cool_down_seconds = MAX_COOL_DOWN_SECONDS;
        config.limits.credential_rotation_interval_hours = MAX_ROTATION_INTERVAL_HOURS;
        config.audit.event_max_age_hours = MAX_EVENT_MAX_AGE_HOURS;
        config.validate().unwrap();
    }

    #[test]
    fn oversized_durations_are_clamped_not_panicking() {
        let limits = LimitsConfig {
            provider_cool_down_seconds: u64::MAX,
            credential_rotation_interval_hours: u64::MAX,
            ..LimitsConfig::default()
        };
        assert_eq!(limits.cool_down(), chrono::Duration::days(1));
        assert_eq!(
            limits.rotation_interval(),
            Some(chrono::Duration::hours(24 * 366))
        );
    }

    #[test]
    fn cache_ttl_accepts_the_short_alias() {
        let toml = format!("{MINIMAL}\n[limits]\ncacheTTL = 30\n");
        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.limits.cache_ttl_seconds, 30);
        assert_eq!(config.limits.cache_ttl(), Duration::from_secs(30));
    }

    #[test]
    fn validate_rejects_unsupported_capability() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.providers[0].capabilities = vec![Capability::Chat];
        assert!(config.validate().unwrap_err().to_string().contains("cannot serve"));
    }

    #[test]
    fn env_overrides_apply() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_env(ENV_DAILY_BUDGET, "3.5");
        set_env(ENV_RATE_LIMIT_PER_MINUTE, "7");
        set_env(ENV_MAX_INPUT_LENGTH, "200");

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.apply_env_overrides().unwrap();

        remove_env(ENV_DAILY_BUDGET);
        remove_env(ENV_RATE_LIMIT_PER_MINUTE);
        remove_env(ENV_MAX_INPUT_LENGTH);

        assert_eq!(config.limits.daily_budget, Some(3.5));
        assert_eq!(config.limits.rate_limit_per_minute, Some(7));
        assert_eq!(config.limits.max_input_length, 200);
    }

    #[test]
    fn env_override_parse_error_names_variable() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_env(ENV_CACHE_TTL_SECONDS, "soon");
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        let result = config.apply_env_overrides();
        remove_env(ENV_CACHE_TTL_SECONDS);

        assert!(result.unwrap_err().to_string().contains(ENV_CACHE_TTL_SECONDS));
    }

    #[test]
    fn explicit_path_wins_over_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_env(ENV_CONFIG, "/from/env.toml");
        let explicit = Config::resolve_path(Some(Path::new("/from/flag.toml")));
        let from_env = Config::resolve_path(None);
        remove_env(ENV_CONFIG);

        assert_eq!(explicit, PathBuf::from("/from/flag.toml"));
        assert_eq!(from_env, PathBuf::from("/from/env.toml"));
    }

    #[test]
    fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.limits.monthly_budget = Some(42.0);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.limits.monthly_budget, Some(42.0));
        assert_eq!(loaded.providers.len(), 1);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let config = Config::from_toml_str(
            r#"
[general]
future_field = "x"

[unknown_section]
foo = "bar"

[[providers]]
id = "local"
kind = "local"
"#,
        )
        .unwrap();
        assert_eq!(config.providers.len(), 1);
    }
}
