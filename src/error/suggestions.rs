//! Fix suggestion database for airo errors.
//!
//! Provides actionable fix suggestions mapped to specific error types,
//! including commands, context explanations, and prevention tips.

use std::time::Duration;

use crate::core::events::Severity;
use crate::core::models::{FailureKind, NoProviderReason, ProviderFailure};
use crate::providers::AdapterError;

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Primary fix commands in order of preference.
    pub commands: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[must_use]
pub fn config_not_found_suggestions(path: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![format!("ls -la {path}"), "airo --config <path> check-config".to_string()],
            format!("No configuration file exists at {path}."),
        )
        .with_prevention("Set AIRO_CONFIG to the config file used in each environment."),
    ]
}

#[must_use]
pub fn config_parse_suggestions(path: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec![format!("airo --config {path} check-config")],
        format!("The configuration file is not valid TOML: {message}"),
    )]
}

#[must_use]
pub fn configuration_suggestions(key: Option<&str>, message: &str) -> Vec<FixSuggestion> {
    let context = key.map_or_else(
        || format!("Configuration is invalid: {message}"),
        |key| format!("Configuration value '{key}' is invalid: {message}"),
    );
    vec![
        FixSuggestion::new(vec!["airo check-config".to_string()], context)
            .with_prevention("Run `airo check-config` in CI before deploying configuration changes."),
    ]
}

// =============================================================================
// Input
// =============================================================================

#[must_use]
pub fn input_rejected_suggestions(reason: &str, severity: Severity) -> Vec<FixSuggestion> {
    let context = match severity {
        Severity::Low => format!("The request was rejected before any provider was called: {reason}. Shorten or split the text."),
        _ => format!("The request matched a disallowed content rule: {reason}. Remove secrets or restricted content and retry."),
    };
    vec![FixSuggestion::new(Vec::new(), context)]
}

// =============================================================================
// Capacity
// =============================================================================

#[must_use]
pub fn quota_exhausted_suggestions(provider: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["airo providers".to_string()],
            format!("Provider {provider} has used its request quota or budget for the current period."),
        )
        .with_prevention("Raise the provider budget or add a lower-priority fallback provider."),
    ]
}

#[must_use]
pub fn rate_limited_suggestions(provider: &str, retry_after: Option<Duration>) -> Vec<FixSuggestion> {
    let context = retry_after.map_or_else(
        || format!("Provider {provider} is rate limited."),
        |wait| format!("Provider {provider} is rate limited. Retry in {}s.", wait.as_secs().max(1)),
    );
    vec![FixSuggestion::new(Vec::new(), context)]
}

// =============================================================================
// Provider
// =============================================================================

#[must_use]
pub fn provider_failure_suggestions(provider: &str, error: &AdapterError) -> Vec<FixSuggestion> {
    let suggestion = match error {
        AdapterError::Authentication { .. } => FixSuggestion::new(
            vec!["airo providers".to_string()],
            format!("Provider {provider} rejected its credential."),
        )
        .with_prevention("Configure more than one credential per provider so rotation has somewhere to go."),
        AdapterError::Capacity { .. } => FixSuggestion::new(
            Vec::new(),
            format!("Provider {provider} reported it is over capacity; it is in cool-down."),
        ),
        AdapterError::Timeout { .. } => FixSuggestion::new(
            Vec::new(),
            format!("Provider {provider} did not answer in time. Consider raising timeout_seconds."),
        ),
        _ => FixSuggestion::new(Vec::new(), format!("Provider {provider} failed: {error}")),
    };
    vec![suggestion]
}

#[must_use]
pub fn no_provider_suggestions(
    reason: NoProviderReason,
    failures: &[ProviderFailure],
) -> Vec<FixSuggestion> {
    let mut out = Vec::new();
    match reason {
        NoProviderReason::NoCandidates => out.push(
            FixSuggestion::new(
                vec!["airo providers".to_string()],
                "Every provider for this capability is disabled, cooling down, out of quota, or rate limited.",
            )
            .with_prevention("Configure a free or local provider as the last-resort fallback."),
        ),
        NoProviderReason::AllFailed => out.push(FixSuggestion::new(
            vec!["airo providers".to_string()],
            "Every eligible provider was tried and failed.",
        )),
    }

    if failures.iter().any(|f| f.kind == FailureKind::Authentication) {
        out.push(FixSuggestion::new(
            Vec::new(),
            "At least one provider rejected its credential; check the configured keys.",
        ));
    }
    out
}
