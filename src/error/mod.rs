//! Error types for airo.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! - **Configuration**: missing or invalid provider configuration (fatal at startup)
//! - **Input**: the content guard rejected the request before any provider was charged
//! - **Capacity**: a single provider is out of quota or rate limited this cycle
//! - **Provider**: a single adapter call failed (network, parsing, authentication)
//! - **Availability**: no provider could serve the request
//! - **Internal**: I/O, serialization, or unclassified errors
//!
//! Capacity and Provider errors are absorbed by the orchestrator's fallback loop.
//! Only [`AiroError::InputRejected`] and [`AiroError::NoProviderAvailable`] reach
//! callers of [`crate::core::Orchestrator::orchestrate`].
//!
//! Each error has a stable error code (e.g., `AIRO-C001`) for programmatic handling.

pub mod suggestions;

use std::time::Duration;
use thiserror::Error;

use crate::core::events::Severity;
use crate::core::models::{Capability, NoProviderReason, ProviderFailure};
use crate::providers::AdapterError;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration issues (parse errors, invalid values, missing files).
    Configuration,
    /// Input rejected by the content guard.
    Input,
    /// Per-provider quota or rate-limit exhaustion.
    Capacity,
    /// A single provider call failed.
    Provider,
    /// No provider could serve the request.
    Availability,
    /// Internal errors (I/O, serialization, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Configuration error",
            Self::Input => "Input rejected",
            Self::Capacity => "Capacity error",
            Self::Provider => "Provider error",
            Self::Availability => "Availability error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Configuration => "C",
            Self::Input => "I",
            Self::Capacity => "Q",
            Self::Provider => "P",
            Self::Availability => "A",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the `airo` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Configuration missing or invalid
    ConfigError = 2,
    /// Content guard rejected the input
    InputRejected = 3,
    /// Every provider was unavailable or failed
    NoProviderAvailable = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Main error type for airo operations.
#[derive(Error, Debug)]
pub enum AiroError {
    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Configuration file not found at an explicitly requested path.
    #[error("config file not found: {path}")]
    ConfigNotFound { path: String },

    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid or missing configuration value.
    #[error("configuration error: {message}")]
    Configuration {
        /// Config key the error refers to, when known.
        key: Option<String>,
        message: String,
    },

    // ==========================================================================
    // Input errors (Category: Input)
    // ==========================================================================
    /// The content guard rejected the request.
    #[error("input rejected: {reason}")]
    InputRejected {
        reason: String,
        /// Severity of the security event the rejection emitted.
        severity: Severity,
    },

    // ==========================================================================
    // Capacity errors (Category: Capacity)
    // ==========================================================================
    /// A provider has no quota or budget left this period.
    #[error("quota exhausted for {provider}: {message}")]
    QuotaExhausted { provider: String, message: String },

    /// A provider's rate window is full.
    #[error(
        "rate limited for {provider}{}",
        .retry_after.map(|w| format!("; retry in {}s", w.as_secs().max(1))).unwrap_or_default()
    )]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    // ==========================================================================
    // Provider errors (Category: Provider)
    // ==========================================================================
    /// A single provider adapter call failed.
    #[error("provider {provider} failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: AdapterError,
    },

    // ==========================================================================
    // Availability errors (Category: Availability)
    // ==========================================================================
    /// No provider could serve the request.
    #[error(
        "no provider available for {capability}: {}",
        describe_unavailability(.reason, .failures)
    )]
    NoProviderAvailable {
        capability: Capability,
        reason: NoProviderReason,
        /// Last error from each attempted provider, in attempt order.
        failures: Vec<ProviderFailure>,
    },

    // ==========================================================================
    // Internal errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn describe_unavailability(reason: &NoProviderReason, failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return reason.description().to_string();
    }
    let details = failures
        .iter()
        .map(|f| format!("{}: {}", f.provider, f.message))
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} ({details})", reason.description())
}

impl AiroError {
    /// Shorthand for a configuration error tied to a config key.
    #[must_use]
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            key: Some(key.into()),
            message: message.into(),
        }
    }

    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::ConfigNotFound { .. } | Self::ConfigParse { .. } | Self::Configuration { .. } => {
                ExitCode::ConfigError
            }
            Self::InputRejected { .. } => ExitCode::InputRejected,
            Self::NoProviderAvailable { .. } => ExitCode::NoProviderAvailable,
            Self::QuotaExhausted { .. }
            | Self::RateLimited { .. }
            | Self::Provider { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigNotFound { .. } | Self::ConfigParse { .. } | Self::Configuration { .. } => {
                ErrorCategory::Configuration
            }
            Self::InputRejected { .. } => ErrorCategory::Input,
            Self::QuotaExhausted { .. } | Self::RateLimited { .. } => ErrorCategory::Capacity,
            Self::Provider { .. } => ErrorCategory::Provider,
            Self::NoProviderAvailable { .. } => ErrorCategory::Availability,
            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `AIRO-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigNotFound { .. } => "AIRO-C001",
            Self::ConfigParse { .. } => "AIRO-C002",
            Self::Configuration { .. } => "AIRO-C003",
            Self::InputRejected { .. } => "AIRO-I001",
            Self::QuotaExhausted { .. } => "AIRO-Q001",
            Self::RateLimited { .. } => "AIRO-Q002",
            Self::Provider { .. } => "AIRO-P001",
            Self::NoProviderAvailable { .. } => "AIRO-A001",
            Self::Io(_) => "AIRO-X001",
            Self::Json(_) => "AIRO-X002",
            Self::Other(_) => "AIRO-X099",
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    ///
    /// Guard rejections and configuration errors are permanent; capacity and
    /// availability errors clear once windows and budgets reset.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::QuotaExhausted { .. } | Self::RateLimited { .. } | Self::NoProviderAvailable { .. } => true,
            Self::Provider { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Returns the retry-after duration if this error specifies one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the provider id if this error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::QuotaExhausted { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Provider { provider, .. } => Some(provider),
            _ => None,
        }
    }

    /// Returns actionable fix suggestions for this error.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::ConfigNotFound { path } => suggestions::config_not_found_suggestions(path),
            Self::ConfigParse { path, message } => {
                suggestions::config_parse_suggestions(path, message)
            }
            Self::Configuration { key, message } => {
                suggestions::configuration_suggestions(key.as_deref(), message)
            }
            Self::InputRejected { reason, severity } => {
                suggestions::input_rejected_suggestions(reason, *severity)
            }
            Self::QuotaExhausted { provider, .. } => {
                suggestions::quota_exhausted_suggestions(provider)
            }
            Self::RateLimited {
                provider,
                retry_after,
            } => suggestions::rate_limited_suggestions(provider, *retry_after),
            Self::Provider { provider, source } => {
                suggestions::provider_failure_suggestions(provider, source)
            }
            Self::NoProviderAvailable {
                reason, failures, ..
            } => suggestions::no_provider_suggestions(*reason, failures),
            Self::Io(_) | Self::Json(_) | Self::Other(_) => Vec::new(),
        }
    }
}

impl From<toml::de::Error> for AiroError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigParse {
            path: "<inline>".to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for airo operations.
pub type Result<T> = std::result::Result<T, AiroError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::FailureKind;

    fn no_provider(reason: NoProviderReason, failures: Vec<ProviderFailure>) -> AiroError {
        AiroError::NoProviderAvailable {
            capability: Capability::Correction,
            reason,
            failures,
        }
    }

    #[test]
    fn error_category_code_prefix() {
        assert_eq!(ErrorCategory::Configuration.code_prefix(), "C");
        assert_eq!(ErrorCategory::Input.code_prefix(), "I");
        assert_eq!(ErrorCategory::Capacity.code_prefix(), "Q");
        assert_eq!(ErrorCategory::Availability.code_prefix(), "A");
    }

    #[test]
    fn error_codes_match_category_prefix() {
        let errors = vec![
            AiroError::config("limits.daily_budget", "must be positive"),
            AiroError::InputRejected {
                reason: "too long".to_string(),
                severity: Severity::Low,
            },
            AiroError::RateLimited {
                provider: "openai".to_string(),
                retry_after: None,
            },
            no_provider(NoProviderReason::NoCandidates, vec![]),
        ];
        for err in errors {
            let expected = format!("AIRO-{}", err.category().code_prefix());
            assert!(
                err.error_code().starts_with(&expected),
                "{} should start with {expected}",
                err.error_code()
            );
        }
    }

    #[test]
    fn surfaced_errors_have_distinct_exit_codes() {
        let rejected = AiroError::InputRejected {
            reason: "secret".to_string(),
            severity: Severity::High,
        };
        let unavailable = no_provider(NoProviderReason::AllFailed, vec![]);
        assert_eq!(rejected.exit_code(), ExitCode::InputRejected);
        assert_eq!(unavailable.exit_code(), ExitCode::NoProviderAvailable);
        assert_ne!(rejected.exit_code(), unavailable.exit_code());
    }

    #[test]
    fn no_provider_message_lists_failures() {
        let err = no_provider(
            NoProviderReason::AllFailed,
            vec![
                ProviderFailure::new("openai", FailureKind::Authentication, "HTTP 401"),
                ProviderFailure::new("local", FailureKind::Unsupported, "generation"),
            ],
        );
        let msg = err.to_string();
        assert!(msg.contains("correction"));
        assert!(msg.contains("openai: HTTP 401"));
        assert!(msg.contains("local: generation"));
    }

    #[test]
    fn no_candidates_message_is_specific() {
        let err = no_provider(NoProviderReason::NoCandidates, vec![]);
        assert!(err.to_string().contains("no eligible provider"));
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let err = AiroError::RateLimited {
            provider: "openai".to_string(),
            retry_after: Some(Duration::from_secs(12)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
        assert!(err.is_retryable());
        assert_eq!(err.provider(), Some("openai"));

        let err = AiroError::config("providers", "empty");
        assert_eq!(err.retry_after(), None);
        assert!(!err.is_retryable());
    }

    #[test]
    fn user_facing_errors_have_suggestions() {
        let errs = vec![
            AiroError::ConfigNotFound {
                path: "/etc/airo.toml".to_string(),
            },
            AiroError::InputRejected {
                reason: "too long".to_string(),
                severity: Severity::Low,
            },
            no_provider(NoProviderReason::NoCandidates, vec![]),
        ];
        for err in errs {
            assert!(
                !err.fix_suggestions().is_empty(),
                "{} has no suggestions",
                err.error_code()
            );
        }
    }
}
