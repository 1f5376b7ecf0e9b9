//! Request, outcome, and result types shared across the orchestration layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AiroError, Result};

// =============================================================================
// Capability
// =============================================================================

/// What a request needs a provider to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Grammar and spelling correction.
    Correction,
    /// Free-form text generation (exercises, essay feedback).
    Generation,
    /// Conversational tutoring.
    Chat,
}

impl Capability {
    pub const ALL: &'static [Self] = &[Self::Correction, Self::Generation, Self::Chat];

    /// Name used in config files and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Correction => "correction",
            Self::Generation => "generation",
            Self::Chat => "chat",
        }
    }

    /// Parse from config or CLI.
    pub fn from_name(name: &str) -> Result<Self> {
        let lower = name.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|c| c.as_str() == lower)
            .copied()
            .ok_or_else(|| {
                AiroError::config(
                    "capability",
                    format!("unknown capability '{name}' (expected correction, generation, chat)"),
                )
            })
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Request
// =============================================================================

/// Provider-agnostic request options.
///
/// Every field here is "material": it changes the answer, so it is part of the
/// cache fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    /// Language code of the content (e.g. `en-US`, `fr`).
    pub language: Option<String>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Free-form flags understood by prompt templates (level, tone, ...).
    pub extra: BTreeMap<String, String>,
}

/// A logical request handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiRequest {
    pub capability: Capability,
    pub content: String,
    pub options: RequestOptions,
}

impl AiRequest {
    #[must_use]
    pub fn new(capability: Capability, content: impl Into<String>) -> Self {
        Self {
            capability,
            content: content.into(),
            options: RequestOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

// =============================================================================
// Call Outcome
// =============================================================================

/// Record of a single provider attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub provider: String,
    pub success: bool,
    pub latency_ms: u64,
    pub cost_usd: f64,
    /// Tokens (or characters, for grammar checkers) billed by the provider.
    pub units: u64,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

// =============================================================================
// Failures
// =============================================================================

/// Why a single candidate did not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Authentication,
    Capacity,
    Timeout,
    Network,
    Malformed,
    Api,
    Unsupported,
    /// Lost its quota between selection and dispatch.
    QuotaExhausted,
    /// Lost its rate slot between selection and dispatch.
    RateLimited,
    /// Health changed between selection and dispatch.
    Unavailable,
}

/// Last error recorded for one provider during an orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderFailure {
    #[must_use]
    pub fn new(provider: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    /// Record an error the dispatch loop absorbed for `provider`.
    #[must_use]
    pub fn from_error(provider: &str, error: &AiroError) -> Self {
        match error {
            AiroError::QuotaExhausted { message, .. } => {
                Self::new(provider, FailureKind::QuotaExhausted, message.clone())
            }
            AiroError::RateLimited { .. } => {
                Self::new(provider, FailureKind::RateLimited, error.to_string())
            }
            AiroError::Provider { source, .. } => Self::new(provider, source.kind(), source.to_string()),
            other => Self::new(provider, FailureKind::Unavailable, other.to_string()),
        }
    }
}

/// Why orchestration ended without a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoProviderReason {
    /// Selection produced an empty candidate list; nothing was called.
    NoCandidates,
    /// Every candidate was attempted and failed.
    AllFailed,
}

impl NoProviderReason {
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::NoCandidates => "no eligible provider (all disabled, cooling down, out of quota, or rate limited)",
            Self::AllFailed => "all eligible providers failed",
        }
    }
}

// =============================================================================
// Result
// =============================================================================

/// Successful orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    /// Provider output (corrected or generated text).
    pub payload: String,
    /// Provider that produced the payload (the original one, for cache hits).
    pub provider: String,
    /// Whether the payload came from the response cache.
    pub cached: bool,
    /// One outcome per provider attempted, in order. Empty for cache hits.
    pub attempts: Vec<CallOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_parses_case_insensitively() {
        assert_eq!(Capability::from_name("Correction").unwrap(), Capability::Correction);
        assert_eq!(Capability::from_name(" chat ").unwrap(), Capability::Chat);
        assert!(Capability::from_name("translate").is_err());
    }

    #[test]
    fn absorbed_errors_keep_their_kind() {
        let quota = AiroError::QuotaExhausted {
            provider: "p".to_string(),
            message: "daily budget reached".to_string(),
        };
        let failure = ProviderFailure::from_error("p", &quota);
        assert_eq!(failure.kind, FailureKind::QuotaExhausted);
        assert_eq!(failure.message, "daily budget reached");

        let limited = AiroError::RateLimited {
            provider: "p".to_string(),
            retry_after: Some(std::time::Duration::from_secs(12)),
        };
        let failure = ProviderFailure::from_error("p", &limited);
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert!(failure.message.contains("retry in 12s"));
    }

    #[test]
    fn capability_serializes_lowercase() {
        let json = serde_json::to_string(&Capability::Generation).unwrap();
        assert_eq!(json, "\"generation\"");
    }
}
