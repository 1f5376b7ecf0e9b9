//! `check-config` command implementation.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::cli::print_json;
use crate::core::budgets::{ResolvedBudget, resolve_budget};
use crate::core::models::Capability;
use crate::error::Result;
use crate::storage::config::Config;
use crate::util::format_cost;

/// What `check-config` reports about a valid configuration.
#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    pub path: PathBuf,
    pub providers: usize,
    pub enabled: usize,
    /// Enabled providers able to serve each capability.
    pub coverage: Vec<(Capability, usize)>,
    pub cache_enabled: bool,
    pub cache_max_entries: usize,
    pub cache_ttl_seconds: u64,
    pub max_input_length: usize,
    pub guard_patterns: usize,
    pub audit_path: Option<PathBuf>,
    pub budgets: Vec<ResolvedBudget>,
}

impl ConfigSummary {
    #[must_use]
    pub fn new(path: PathBuf, config: &Config) -> Self {
        let descriptors = config.descriptors();
        let coverage = Capability::ALL
            .iter()
            .map(|&capability| {
                let count = descriptors
                    .iter()
                    .filter(|d| d.enabled && d.supports(capability))
                    .count();
                (capability, count)
            })
            .collect();
        let global = config.limits.budget_defaults();
        let budgets = descriptors
            .iter()
            .map(|d| resolve_budget(&d.id, &global, &d.quota))
            .collect();

        Self {
            path,
            providers: descriptors.len(),
            enabled: descriptors.iter().filter(|d| d.enabled).count(),
            coverage,
            cache_enabled: config.cache.enabled,
            cache_max_entries: config.limits.cache_max_entries,
            cache_ttl_seconds: config.limits.cache_ttl_seconds,
            max_input_length: config.limits.max_input_length,
            guard_patterns: config.guard.disallowed_patterns.len(),
            audit_path: config.audit.jsonl_path.clone(),
            budgets,
        }
    }
}

/// Execute the `check-config` command.
pub fn execute(config_path: Option<&Path>, format: OutputFormat, pretty: bool) -> Result<()> {
    let path = Config::resolve_path(config_path);
    let config = Config::load(config_path)?;
    let summary = ConfigSummary::new(path, &config);

    tracing::debug!(path = %summary.path.display(), providers = summary.providers, "Configuration valid");

    match format {
        OutputFormat::Json => print_json(&summary, pretty),
        OutputFormat::Human => {
            print!("{}", render_human(&summary));
            Ok(())
        }
    }
}

fn render_human(summary: &ConfigSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Configuration OK: {}\n", summary.path.display()));
    out.push_str(&format!(
        "Providers: {} ({} enabled)\n",
        summary.providers, summary.enabled
    ));
    for (capability, count) in &summary.coverage {
        let marker = if *count == 0 { "  (none)" } else { "" };
        out.push_str(&format!("  {capability:<11} {count}{marker}\n"));
    }

    if summary.cache_enabled {
        out.push_str(&format!(
            "Cache: {} entries, ttl {}s\n",
            summary.cache_max_entries, summary.cache_ttl_seconds
        ));
    } else {
        out.push_str("Cache: disabled\n");
    }
    out.push_str(&format!(
        "Guard: max {} chars, {} pattern(s)\n",
        summary.max_input_length, summary.guard_patterns
    ));
    if let Some(path) = &summary.audit_path {
        out.push_str(&format!("Audit: {}\n", path.display()));
    }

    let limited: Vec<_> = summary
        .budgets
        .iter()
        .filter(|b| b.limits.daily_budget.is_some() || b.limits.monthly_budget.is_some())
        .collect();
    if !limited.is_empty() {
        out.push_str("Budgets:\n");
        for budget in limited {
            let daily = budget.limits.daily_budget.map_or_else(|| "-".to_string(), format_cost);
            let monthly = budget
                .limits
                .monthly_budget
                .map_or_else(|| "-".to_string(), format_cost);
            out.push_str(&format!(
                "  {:<16} daily {daily:<10} monthly {monthly:<10} alert at {:.0}%\n",
                budget.provider, budget.alert_threshold_percent
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::ProviderKind;
    use crate::storage::config::ProviderConfig;

    #[test]
    fn summary_counts_coverage_of_enabled_providers() {
        let mut config = Config::default();
        config.limits.daily_budget = Some(5.0);
        config.providers.push(ProviderConfig::new("local", ProviderKind::Local));
        let mut off = ProviderConfig::new("local-2", ProviderKind::Local);
        off.enabled = false;
        config.providers.push(off);

        let summary = ConfigSummary::new(PathBuf::from("airo.toml"), &config);
        assert_eq!(summary.providers, 2);
        assert_eq!(summary.enabled, 1);
        let correction = summary
            .coverage
            .iter()
            .find(|(c, _)| *c == Capability::Correction)
            .unwrap();
        assert_eq!(correction.1, 1);
        assert_eq!(summary.budgets[0].limits.daily_budget, Some(5.0));

        let text = render_human(&summary);
        assert!(text.contains("Configuration OK: airo.toml"));
        assert!(text.contains("daily $5.00"));
    }
}
