//! Test utilities for airo.
//!
//! Scripted adapters, a frozen clock, provider factories, and a harness that
//! wires them into an [`Orchestrator`].
//!
//! ```rust,ignore
//! use airo::test_utils::*;
//!
//! let primary = ScriptedAdapter::failing(AdapterError::Network { message: "down".into() });
//! let backup = ScriptedAdapter::always_ok("fixed");
//! let harness = Harness::builder()
//!     .provider(scripted_provider("primary", 1), primary.clone())
//!     .provider(scripted_provider("backup", 2), backup.clone())
//!     .build();
//! ```

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;

use crate::core::clock::ManualClock;
use crate::core::credentials::Secret;
use crate::core::events::{AuditRecord, AuditSink};
use crate::core::models::AiRequest;
use crate::core::orchestrator::Orchestrator;
use crate::core::provider::{ProviderDescriptor, ProviderKind, Tier};
use crate::providers::{AdapterError, AdapterRegistry, AdapterResponse, ProviderAdapter};
use crate::storage::config::{Config, ProviderConfig};

// =============================================================================
// Scripted Adapter
// =============================================================================

type Scripted = Result<AdapterResponse, AdapterError>;

/// An adapter that replays queued results, then repeats a fallback result.
#[derive(Debug)]
pub struct ScriptedAdapter {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    delay: Option<Duration>,
    calls: AtomicUsize,
    credentials_seen: Mutex<Vec<Option<String>>>,
    requests_seen: Mutex<Vec<AiRequest>>,
}

impl ScriptedAdapter {
    fn with_fallback(fallback: Scripted) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            credentials_seen: Mutex::new(Vec::new()),
            requests_seen: Mutex::new(Vec::new()),
        }
    }

    /// Always succeeds with `payload` and 10 units.
    #[must_use]
    pub fn always_ok(payload: &str) -> Arc<Self> {
        Arc::new(Self::with_fallback(Ok(ok_response(payload))))
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(error: AdapterError) -> Arc<Self> {
        Arc::new(Self::with_fallback(Err(error)))
    }

    /// Replays `script`, then succeeds with `fallback_payload`.
    #[must_use]
    pub fn scripted(script: Vec<Scripted>, fallback_payload: &str) -> Arc<Self> {
        let adapter = Self::with_fallback(Ok(ok_response(fallback_payload)));
        adapter.script.lock().extend(script);
        Arc::new(adapter)
    }

    /// Sleeps for `delay` before answering.
    #[must_use]
    pub fn slow(payload: &str, delay: Duration) -> Arc<Self> {
        let mut adapter = Self::with_fallback(Ok(ok_response(payload)));
        adapter.delay = Some(delay);
        Arc::new(adapter)
    }

    /// Sleeps for `delay`, then fails with `error`.
    #[must_use]
    pub fn slow_failing(error: AdapterError, delay: Duration) -> Arc<Self> {
        let mut adapter = Self::with_fallback(Err(error));
        adapter.delay = Some(delay);
        Arc::new(adapter)
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Exposed credential value of each invocation, in order.
    #[must_use]
    pub fn credentials_seen(&self) -> Vec<Option<String>> {
        self.credentials_seen.lock().clone()
    }

    /// Requests received, in order.
    #[must_use]
    pub fn requests_seen(&self) -> Vec<AiRequest> {
        self.requests_seen.lock().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn invoke(
        &self,
        _provider: &ProviderDescriptor,
        credential: Option<&Secret>,
        request: &AiRequest,
    ) -> Result<AdapterResponse, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.credentials_seen
            .lock()
            .push(credential.map(|c| c.expose().to_string()));
        self.requests_seen.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// A successful response carrying `payload` and 10 units.
#[must_use]
pub fn ok_response(payload: &str) -> AdapterResponse {
    AdapterResponse {
        payload: payload.to_string(),
        units: 10,
    }
}

/// A 401 authentication error.
#[must_use]
pub fn auth_error() -> AdapterError {
    AdapterError::Authentication {
        status: Some(401),
        message: "invalid api key".to_string(),
    }
}

/// A 429 capacity error.
#[must_use]
pub fn capacity_error() -> AdapterError {
    AdapterError::Capacity {
        status: Some(429),
        message: "rate limit reached".to_string(),
        retry_after: None,
    }
}

// =============================================================================
// Audit Sink
// =============================================================================

/// Sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Number of usage records (one per provider call).
    #[must_use]
    pub fn usage_count(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| matches!(r, AuditRecord::Usage { .. }))
            .count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn submit(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

// =============================================================================
// Factories
// =============================================================================

/// A clock frozen at 2026-06-01 09:30:00 UTC.
#[must_use]
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 30, 0)
            .single()
            .unwrap_or_else(Utc::now),
    ))
}

/// A free-tier provider entry meant to be served by a [`ScriptedAdapter`].
#[must_use]
pub fn scripted_provider(id: &str, priority: u32) -> ProviderConfig {
    let mut provider = ProviderConfig::new(id, ProviderKind::OpenAi);
    provider.tier = Some(Tier::Free);
    provider.priority = priority;
    provider.endpoint = Some(format!("http://{id}.invalid/v1"));
    provider
}

/// Minimal TOML config with one local provider.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[general]
timeout_seconds = 5

[limits]
max_input_length = 200

[[providers]]
id = "local"
kind = "local"
priority = 10
"#
    .to_string()
}

// =============================================================================
// Harness
// =============================================================================

/// An orchestrator wired to scripted adapters and a manual clock.
#[derive(Debug)]
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub clock: Arc<ManualClock>,
    pub audit: Arc<MemoryAuditSink>,
}

impl Harness {
    #[must_use]
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }
}

/// Builder for [`Harness`].
#[derive(Debug, Default)]
pub struct HarnessBuilder {
    config: Config,
    adapters: Vec<(String, Arc<ScriptedAdapter>)>,
}

impl HarnessBuilder {
    /// Add a provider served by `adapter`.
    #[must_use]
    pub fn provider(mut self, provider: ProviderConfig, adapter: Arc<ScriptedAdapter>) -> Self {
        self.adapters.push((provider.id.clone(), adapter));
        self.config.providers.push(provider);
        self
    }

    /// Adjust the configuration before building.
    #[must_use]
    pub fn configure(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    #[must_use]
    pub fn build(self) -> Harness {
        let clock = test_clock();
        let audit = Arc::new(MemoryAuditSink::default());
        let mut adapters = AdapterRegistry::new();
        for (id, adapter) in self.adapters {
            adapters.register_provider(id, adapter);
        }
        let orchestrator = Orchestrator::builder(self.config)
            .clock(clock.clone())
            .audit_sink(audit.clone())
            .adapters(adapters)
            .build()
            .expect("harness config must be valid");
        Harness {
            orchestrator: Arc::new(orchestrator),
            clock,
            audit,
        }
    }
}

// =============================================================================
// Temporary Directories
// =============================================================================

/// An isolated temporary directory removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Write `content` to `name`, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert two floats are equal within an epsilon (default `1e-9`).
#[macro_export]
macro_rules! assert_float_eq {
    ($left:expr, $right:expr) => {
        $crate::assert_float_eq!($left, $right, 1e-9)
    };
    ($left:expr, $right:expr, $epsilon:expr) => {
        let left: f64 = $left;
        let right: f64 = $right;
        let epsilon: f64 = $epsilon;
        assert!(
            (left - right).abs() < epsilon,
            "Float equality assertion failed: {} != {} (epsilon: {})",
            left,
            right,
            epsilon
        );
    };
}
