//! Provider adapters.
//!
//! Each provider kind has an adapter that translates an [`AiRequest`] into the
//! provider's wire shape and the provider's answer back into an
//! [`AdapterResponse`]. Adapters never panic on external failure: every HTTP
//! status, transport error, and malformed body maps to an [`AdapterError`].

pub mod anthropic;
pub mod languagetool;
pub mod local;
pub mod openai;
pub mod prompt;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use thiserror::Error;

use crate::core::credentials::Secret;
use crate::core::models::{AiRequest, Capability, FailureKind};
use crate::core::provider::{AuthScheme, CostTable, ProviderDescriptor, ProviderKind};

pub use anthropic::AnthropicAdapter;
pub use languagetool::LanguageToolAdapter;
pub use local::LocalAdapter;
pub use openai::OpenAiAdapter;

// =============================================================================
// Adapter Types
// =============================================================================

/// Successful provider answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterResponse {
    /// Corrected or generated text.
    pub payload: String,
    /// Tokens (or characters) billed.
    pub units: u64,
}

/// Why a single adapter call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// The provider rejected (or we lack) a credential.
    #[error("authentication failed{}: {message}", status_suffix(.status))]
    Authentication { status: Option<u16>, message: String },

    /// The provider is over capacity or out of quota on its side.
    #[error("provider over capacity{}: {message}", status_suffix(.status))]
    Capacity {
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },

    /// No answer within the provider's timeout.
    #[error("timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    /// Transport failure before a response arrived.
    #[error("network error: {message}")]
    Network { message: String },

    /// A success status with a body we could not interpret.
    #[error("malformed response: {message}")]
    Malformed { message: String },

    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// This adapter cannot serve the capability.
    #[error("{capability} is not supported by this provider")]
    Unsupported { capability: Capability },
}

#[allow(clippy::ref_option)]
fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl AdapterError {
    /// Whether the same call could succeed later without any configuration change.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Capacity { .. } | Self::Timeout { .. } | Self::Network { .. }
        )
    }

    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Authentication { .. } => FailureKind::Authentication,
            Self::Capacity { .. } => FailureKind::Capacity,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Network { .. } => FailureKind::Network,
            Self::Malformed { .. } => FailureKind::Malformed,
            Self::Api { .. } => FailureKind::Api,
            Self::Unsupported { .. } => FailureKind::Unsupported,
        }
    }

    /// Cost billed for a failed call.
    ///
    /// A timeout or malformed body means the provider probably did the work,
    /// so the flat per-request charge applies. Rejected calls cost nothing.
    #[must_use]
    pub const fn incurred_cost(&self, cost: &CostTable) -> f64 {
        match self {
            Self::Timeout { .. } | Self::Malformed { .. } => cost.per_request_usd,
            _ => 0.0,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

// =============================================================================
// Adapter Trait
// =============================================================================

/// Uniform call interface over heterogeneous provider APIs.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + std::fmt::Debug {
    /// Call `provider` once for `request`.
    async fn invoke(
        &self,
        provider: &ProviderDescriptor,
        credential: Option<&Secret>,
        request: &AiRequest,
    ) -> Result<AdapterResponse, AdapterError>;
}

/// Call an adapter with the provider's timeout as a hard upper bound.
pub async fn invoke_bounded(
    adapter: &dyn ProviderAdapter,
    provider: &ProviderDescriptor,
    credential: Option<&Secret>,
    request: &AiRequest,
) -> Result<AdapterResponse, AdapterError> {
    match tokio::time::timeout(provider.timeout, adapter.invoke(provider, credential, request)).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout {
            after: provider.timeout,
        }),
    }
}

// =============================================================================
// Shared HTTP helpers
// =============================================================================

/// Map a non-success HTTP status and body to an adapter error.
#[must_use]
pub fn classify_status(status: u16, body: &str, retry_after: Option<Duration>) -> AdapterError {
    let message = summarize_body(body);
    match status {
        401 | 403 => AdapterError::Authentication {
            status: Some(status),
            message,
        },
        429 | 503 | 529 => AdapterError::Capacity {
            status: Some(status),
            message,
            retry_after,
        },
        _ if mentions_capacity(body) => AdapterError::Capacity {
            status: Some(status),
            message,
            retry_after,
        },
        _ => AdapterError::Api { status, message },
    }
}

/// Whether an error body talks about quota or overload.
fn mentions_capacity(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["quota", "rate limit", "rate_limit", "overloaded", "insufficient_quota", "capacity"]
        .iter()
        .any(|needle| lower.contains(needle))
}

fn summarize_body(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    if trimmed.chars().count() <= MAX {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX).collect();
    format!("{cut}...")
}

/// Parse a `Retry-After` header given in seconds.
#[must_use]
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map a transport error.
#[must_use]
pub fn transport_error(err: &reqwest::Error, timeout: Duration) -> AdapterError {
    if err.is_timeout() {
        AdapterError::Timeout { after: timeout }
    } else {
        AdapterError::Network {
            message: err.to_string(),
        }
    }
}

/// The credential a remote call needs, or an authentication error.
pub(crate) fn require_credential<'a>(
    provider: &ProviderDescriptor,
    credential: Option<&'a Secret>,
) -> Result<Option<&'a Secret>, AdapterError> {
    if provider.auth == AuthScheme::None {
        return Ok(None);
    }
    credential.map(Some).ok_or_else(|| AdapterError::Authentication {
        status: None,
        message: format!("no credential configured for {}", provider.id),
    })
}

/// Attach a header-style credential to a request.
pub(crate) fn apply_auth(
    builder: reqwest::RequestBuilder,
    scheme: AuthScheme,
    credential: Option<&Secret>,
) -> reqwest::RequestBuilder {
    match (scheme, credential) {
        (AuthScheme::Bearer, Some(secret)) => builder.bearer_auth(secret.expose()),
        (AuthScheme::ApiKeyHeader, Some(secret)) => builder.header("x-api-key", secret.expose()),
        _ => builder,
    }
}

/// Endpoint of a remote provider, or a malformed-config error.
pub(crate) fn base_url(provider: &ProviderDescriptor) -> Result<&str, AdapterError> {
    provider.base_url().ok_or_else(|| AdapterError::Api {
        status: 0,
        message: format!("provider {} has no endpoint", provider.id),
    })
}

// =============================================================================
// Adapter Registry
// =============================================================================

/// Maps providers to adapters: by kind, with optional per-provider overrides.
#[derive(Debug, Default, Clone)]
pub struct AdapterRegistry {
    by_kind: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
    by_provider: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in adapters for every provider kind, sharing one HTTP client.
    #[must_use]
    pub fn with_defaults(client: &reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register_kind(ProviderKind::OpenAi, Arc::new(OpenAiAdapter::new(client.clone())));
        registry.register_kind(
            ProviderKind::Anthropic,
            Arc::new(AnthropicAdapter::new(client.clone())),
        );
        registry.register_kind(
            ProviderKind::LanguageTool,
            Arc::new(LanguageToolAdapter::new(client.clone())),
        );
        registry.register_kind(ProviderKind::Local, Arc::new(LocalAdapter));
        registry
    }

    pub fn register_kind(&mut self, kind: ProviderKind, adapter: Arc<dyn ProviderAdapter>) {
        self.by_kind.insert(kind, adapter);
    }

    /// Use `adapter` for one provider id regardless of its kind.
    pub fn register_provider(&mut self, id: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        self.by_provider.insert(id.into(), adapter);
    }

    #[must_use]
    pub fn resolve(&self, provider: &ProviderDescriptor) -> Option<Arc<dyn ProviderAdapter>> {
        self.by_provider
            .get(&provider.id)
            .or_else(|| self.by_kind.get(&provider.kind))
            .cloned()
    }
}
