//! Request orchestration: guard, cache, candidate selection, dispatch, fallback.
//!
//! One logical request moves through:
//!
//! ```text
//! guard ─▶ cache ─▶ SELECT ─▶ DISPATCH ─┬─▶ success ─▶ ledger, stats, cache
//!                      ▲                 └─▶ failure ─▶ stats, events ─┐
//!                      └───────────── next candidate ◀─────────────────┘
//! ```
//!
//! SELECT is computed once per request; each candidate is dispatched at most
//! once. No lock is held across the adapter await.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::core::clock::{SharedClock, system_clock};
use crate::core::credentials::{CredentialStatus, CredentialStore, Secret, resolve_credential};
use crate::core::events::{
    AuditRecord, AuditSink, NoopAuditSink, SecurityEvent, SecurityEventKind, SecurityEventLog,
    Severity,
};
use crate::core::guard::ContentGuard;
use crate::core::http::build_client;
use crate::core::models::{
    AiRequest, CallOutcome, Capability, FailureKind, NoProviderReason, OrchestrationResult,
    ProviderFailure, RequestOptions,
};
use crate::core::provider::{ProviderDescriptor, ProviderRegistry, ProviderSnapshot, ProviderStats};
use crate::core::quota::{QuotaCheck, QuotaLedger, QuotaSnapshot};
use crate::core::rate_limit::RateLimiter;
use crate::error::{AiroError, Result};
use crate::providers::{AdapterError, AdapterRegistry, ProviderAdapter, invoke_bounded};
use crate::storage::cache::{CacheStats, ResponseCache, fingerprint};
use crate::storage::config::Config;

/// Caller key used when the caller does not identify itself.
pub const ANONYMOUS_CALLER: &str = "anonymous";

/// Longest provider-supplied `Retry-After` honoured when cooling down.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Builder
// =============================================================================

/// Assembles an [`Orchestrator`] from configuration.
#[derive(Debug)]
pub struct OrchestratorBuilder {
    config: Config,
    clock: Option<SharedClock>,
    sink: Option<Arc<dyn AuditSink>>,
    adapters: Option<AdapterRegistry>,
    overrides: Vec<(String, Arc<dyn ProviderAdapter>)>,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clock: None,
            sink: None,
            adapters: None,
            overrides: Vec::new(),
        }
    }

    /// Use `clock` instead of the system clock.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Forward usage and security records to `sink`.
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the built-in adapters entirely.
    #[must_use]
    pub fn adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = Some(adapters);
        self
    }

    /// Route one provider id to `adapter`.
    #[must_use]
    pub fn adapter(mut self, provider: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.overrides.push((provider.into(), adapter));
        self
    }

    /// Validate the configuration, resolve credentials, and wire every component.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings or unresolvable credentials.
    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(system_clock);
        let sink: Arc<dyn AuditSink> = self.sink.unwrap_or_else(|| Arc::new(NoopAuditSink));

        let registry = Arc::new(ProviderRegistry::new(config.descriptors())?);

        let mut credentials = CredentialStore::new(clock.clone());
        for provider in &config.providers {
            if provider.credentials.is_empty() {
                continue;
            }
            let secrets = provider
                .credentials
                .iter()
                .map(|reference| resolve_credential(reference))
                .collect::<Result<Vec<_>>>()?;
            credentials.insert(provider.id.clone(), secrets);
        }

        let event_max_age = chrono::Duration::try_hours(config.audit.event_max_age_hours)
            .ok_or_else(|| {
                AiroError::config("audit.event_max_age_hours", "event max age is out of range")
            })?;
        let events = Arc::new(
            SecurityEventLog::new(
                config.audit.event_capacity,
                event_max_age,
                clock.clone(),
            )
            .with_sink(sink.clone()),
        );

        let ledger = Arc::new(QuotaLedger::new(
            registry.clone(),
            &config.limits.budget_defaults(),
            config.general.hard_stop,
            events.clone(),
            clock.clone(),
        ));

        let limiter = Arc::new(RateLimiter::new(
            &registry,
            config.limits.caller_limits(),
            clock.clone(),
        ));

        let cache = config.cache.enabled.then(|| {
            let cache = ResponseCache::new(
                config.limits.cache_max_entries,
                config.limits.cache_ttl(),
                clock.clone(),
            );
            if let Some(path) = &config.cache.snapshot_path {
                match cache.load_snapshot(path) {
                    Ok(n) => tracing::debug!(path = %path.display(), entries = n, "Cache snapshot loaded"),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "Cache snapshot ignored"),
                }
            }
            Arc::new(cache)
        });

        let guard = ContentGuard::new(
            config.limits.max_input_length,
            &config.guard.disallowed_patterns,
        )?;

        let mut adapters = match self.adapters {
            Some(adapters) => adapters,
            None => {
                let timeout = Duration::from_secs(config.general.timeout_seconds);
                AdapterRegistry::with_defaults(&build_client(timeout)?)
            }
        };
        for (id, adapter) in self.overrides {
            adapters.register_provider(id, adapter);
        }

        tracing::debug!(providers = registry.len(), "Orchestrator ready");

        Ok(Orchestrator {
            registry,
            adapters,
            credentials: Arc::new(credentials),
            ledger,
            limiter,
            cache,
            guard,
            events,
            sink,
            clock,
            cool_down: config.limits.cool_down(),
            rotation_interval: config.limits.rotation_interval(),
            cache_snapshot: config.cache.snapshot_path.clone(),
            outcomes: Mutex::new(VecDeque::new()),
            outcome_capacity: config.general.outcome_log_capacity.max(1),
        })
    }
}

// =============================================================================
// Billing Guard
// =============================================================================

/// Bills the per-request cost of an in-flight call if the request future is dropped.
struct BillingGuard<'a> {
    ledger: &'a QuotaLedger,
    provider: &'a str,
    cost_usd: f64,
    armed: bool,
}

impl<'a> BillingGuard<'a> {
    const fn new(ledger: &'a QuotaLedger, provider: &'a str, cost_usd: f64) -> Self {
        Self {
            ledger,
            provider,
            cost_usd,
            armed: true,
        }
    }

    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for BillingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(provider = self.provider, "Call cancelled in flight; billing request");
            self.ledger.record(self.provider, self.cost_usd);
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Routes requests across providers with caching, quota, and fallback.
#[derive(Debug)]
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    adapters: AdapterRegistry,
    credentials: Arc<CredentialStore>,
    ledger: Arc<QuotaLedger>,
    limiter: Arc<RateLimiter>,
    cache: Option<Arc<ResponseCache>>,
    guard: ContentGuard,
    events: Arc<SecurityEventLog>,
    sink: Arc<dyn AuditSink>,
    clock: SharedClock,
    cool_down: chrono::Duration,
    rotation_interval: Option<chrono::Duration>,
    cache_snapshot: Option<PathBuf>,
    outcomes: Mutex<VecDeque<CallOutcome>>,
    outcome_capacity: usize,
}

impl Orchestrator {
    /// Shorthand for [`OrchestratorBuilder::new`].
    #[must_use]
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Serve one logical request.
    ///
    /// # Errors
    ///
    /// - [`AiroError::InputRejected`] if the content guard refuses the input
    /// - [`AiroError::NoProviderAvailable`] if no candidate exists or all candidates failed
    pub async fn orchestrate(
        &self,
        capability: Capability,
        content: &str,
        options: RequestOptions,
        caller: &str,
    ) -> Result<OrchestrationResult> {
        let request = AiRequest::new(capability, content).with_options(options);
        self.orchestrate_request(&request, caller).await
    }

    /// [`orchestrate`](Self::orchestrate) for a prepared request.
    pub async fn orchestrate_request(
        &self,
        request: &AiRequest,
        caller: &str,
    ) -> Result<OrchestrationResult> {
        let caller = if caller.trim().is_empty() {
            ANONYMOUS_CALLER
        } else {
            caller
        };

        self.screen(request, caller)?;

        let key = fingerprint(request);
        if let Some(entry) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            tracing::debug!(caller, provider = %entry.provider, "Cache hit");
            return Ok(OrchestrationResult {
                payload: entry.value,
                provider: entry.provider,
                cached: true,
                attempts: Vec::new(),
            });
        }

        let candidates = self.candidates(request.capability, caller);
        if candidates.is_empty() {
            tracing::warn!(caller, capability = %request.capability, "No eligible provider");
            return Err(AiroError::NoProviderAvailable {
                capability: request.capability,
                reason: NoProviderReason::NoCandidates,
                failures: Vec::new(),
            });
        }
        tracing::debug!(caller, ?candidates, "Candidates selected");

        let mut attempts = Vec::new();
        let mut failures = Vec::new();

        for id in &candidates {
            let Some(provider) = self.registry.get(id) else {
                continue;
            };
            match self.dispatch(provider, request, caller).await {
                Dispatch::Skipped(failure) => {
                    tracing::debug!(provider = %id, reason = %failure.message, "Candidate skipped");
                    failures.push(failure);
                }
                Dispatch::Failed(outcome, failure) => {
                    attempts.push(outcome);
                    failures.push(failure);
                }
                Dispatch::Succeeded(outcome, payload) => {
                    attempts.push(outcome);
                    if let Some(cache) = &self.cache {
                        cache.put(key, payload.clone(), id.clone());
                    }
                    return Ok(OrchestrationResult {
                        payload,
                        provider: id.clone(),
                        cached: false,
                        attempts,
                    });
                }
            }
        }

        tracing::warn!(
            caller,
            capability = %request.capability,
            attempted = attempts.len(),
            "All candidates failed"
        );
        Err(AiroError::NoProviderAvailable {
            capability: request.capability,
            reason: NoProviderReason::AllFailed,
            failures,
        })
    }

    /// Run the content guard. Rejections record a security event and touch nothing else.
    fn screen(&self, request: &AiRequest, caller: &str) -> Result<()> {
        let verdict = self.guard.filter(&request.content);
        if verdict.allowed {
            return Ok(());
        }
        let severity = verdict.severity.unwrap_or(Severity::Low);
        let reason = verdict.reason.clone().unwrap_or_default();
        self.events.record(
            SecurityEvent::new(SecurityEventKind::InputRejected, severity, reason).with_caller(caller),
        );
        match verdict.into_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Eligible providers for `capability`, best first.
    ///
    /// A provider qualifies if it serves the capability, its ledger admits it,
    /// it is `active` (an expired cool-down counts), and its rate windows
    /// would admit `caller`. Order: priority, success rate (higher first),
    /// average latency (lower first), id.
    #[must_use]
    pub fn candidates(&self, capability: Capability, caller: &str) -> Vec<String> {
        let now = self.clock.now();
        let mut eligible: Vec<(&ProviderDescriptor, ProviderStats)> = self
            .registry
            .iter()
            .filter(|p| p.supports(capability))
            .filter(|p| self.ledger.admit(&p.id))
            .filter(|p| self.registry.is_active(&p.id, now))
            .filter(|p| self.limiter.would_admit(&p.id, caller))
            .map(|p| (p, self.registry.stats(&p.id).unwrap_or_default()))
            .collect();

        eligible.sort_by(|(a, a_stats), (b, b_stats)| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b_stats.success_rate.total_cmp(&a_stats.success_rate))
                .then_with(|| a_stats.avg_latency_ms.total_cmp(&b_stats.avg_latency_ms))
                .then_with(|| a.id.cmp(&b.id))
        });

        eligible.into_iter().map(|(p, _)| p.id.clone()).collect()
    }

    async fn dispatch(
        &self,
        provider: &ProviderDescriptor,
        request: &AiRequest,
        caller: &str,
    ) -> Dispatch {
        let id = provider.id.as_str();

        // State may have moved since SELECT; re-check before spending a slot.
        if !self.registry.is_active(id, self.clock.now()) {
            return Dispatch::Skipped(ProviderFailure::new(
                id,
                FailureKind::Unavailable,
                "provider left the active state before dispatch",
            ));
        }
        let Some(adapter) = self.adapters.resolve(provider) else {
            return Dispatch::Skipped(ProviderFailure::new(
                id,
                FailureKind::Unsupported,
                format!("no adapter registered for kind {}", provider.kind),
            ));
        };
        if let QuotaCheck::Exhausted(message) = self.ledger.reserve(id) {
            let error = AiroError::QuotaExhausted {
                provider: id.to_string(),
                message,
            };
            return Dispatch::Skipped(ProviderFailure::from_error(id, &error));
        }
        if !self.limiter.try_acquire(id, caller) {
            self.ledger.release(id);
            let error = AiroError::RateLimited {
                provider: id.to_string(),
                retry_after: self.limiter.retry_after(id, caller),
            };
            return Dispatch::Skipped(ProviderFailure::from_error(id, &error));
        }
        let credential = self.credentials.current_credential(id);

        let mut billing = BillingGuard::new(&self.ledger, id, provider.cost.per_request_usd);
        let started = Instant::now();
        let result = invoke_bounded(adapter.as_ref(), provider, credential.as_ref(), request).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        billing.disarm();

        match result {
            Ok(response) => {
                let cost_usd = provider.cost.cost_for(response.units);
                self.ledger.record(id, cost_usd);
                self.registry.record_attempt(id, true, latency_ms);
                tracing::info!(
                    provider = id,
                    caller,
                    latency_ms,
                    units = response.units,
                    cost_usd,
                    "Provider call succeeded"
                );
                let outcome = self.outcome(id, true, latency_ms, cost_usd, response.units, None);
                self.record_outcome(caller, outcome.clone());
                Dispatch::Succeeded(outcome, response.payload)
            }
            Err(error) => {
                let cost_usd = error.incurred_cost(&provider.cost);
                if matches!(error, AdapterError::Unsupported { .. }) {
                    self.ledger.release(id);
                } else {
                    self.ledger.record(id, cost_usd);
                }
                self.registry.record_attempt(id, false, latency_ms);
                tracing::warn!(provider = id, caller, latency_ms, error = %error, "Provider call failed");
                self.handle_failure(provider, &error, credential.as_ref(), caller);

                let outcome = self.outcome(id, false, latency_ms, cost_usd, 0, Some(error.to_string()));
                self.record_outcome(caller, outcome.clone());
                let error = AiroError::Provider {
                    provider: id.to_string(),
                    source: error,
                };
                Dispatch::Failed(outcome, ProviderFailure::from_error(id, &error))
            }
        }
    }

    /// Provider-level consequences of a failed call.
    ///
    /// `credential` is the one the failed call was sent with. Rotation only
    /// happens while it is still current, so concurrent failures on the same
    /// key advance the ring once.
    fn handle_failure(
        &self,
        provider: &ProviderDescriptor,
        error: &AdapterError,
        credential: Option<&Secret>,
        caller: &str,
    ) {
        let id = provider.id.as_str();
        match error {
            AdapterError::Authentication { .. } => {
                self.events.record(
                    SecurityEvent::new(
                        SecurityEventKind::AuthenticationFailure,
                        Severity::High,
                        format!("{id}: {error}"),
                    )
                    .with_provider(id)
                    .with_caller(caller),
                );
                if credential.is_some_and(|sent| self.credentials.rotate_if_current(id, sent)) {
                    self.events.record(
                        SecurityEvent::new(
                            SecurityEventKind::CredentialRotated,
                            Severity::Low,
                            format!("{id}: credential rotated after authentication failure"),
                        )
                        .with_provider(id),
                    );
                }
            }
            AdapterError::Capacity { retry_after, .. } => {
                let mut cool_down = self.cool_down;
                if let Some(wait) = retry_after
                    .map(|w| w.min(MAX_RETRY_AFTER))
                    .and_then(|w| chrono::Duration::from_std(w).ok())
                {
                    cool_down = cool_down.max(wait);
                }
                let now = self.clock.now();
                let until = now
                    .checked_add_signed(cool_down)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                self.registry.mark_degraded(id, until, error.to_string());
                self.events.record(
                    SecurityEvent::new(
                        SecurityEventKind::CapacityExceeded,
                        Severity::Medium,
                        format!("{id}: {error}; cooling down until {}", until.to_rfc3339()),
                    )
                    .with_provider(id)
                    .with_caller(caller),
                );
            }
            _ => {}
        }
    }

    fn outcome(
        &self,
        provider: &str,
        success: bool,
        latency_ms: u64,
        cost_usd: f64,
        units: u64,
        error: Option<String>,
    ) -> CallOutcome {
        CallOutcome {
            provider: provider.to_string(),
            success,
            latency_ms,
            cost_usd,
            units,
            error,
            at: self.clock.now(),
        }
    }

    fn record_outcome(&self, caller: &str, outcome: CallOutcome) {
        self.sink.submit(AuditRecord::Usage {
            caller: caller.to_string(),
            outcome: outcome.clone(),
        });
        let mut outcomes = self.outcomes.lock();
        while outcomes.len() >= self.outcome_capacity {
            outcomes.pop_front();
        }
        outcomes.push_back(outcome);
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Take a provider out of rotation until [`enable`](Self::enable).
    ///
    /// # Errors
    ///
    /// Returns an error if the provider id is unknown.
    pub fn disable(&self, provider: &str, reason: &str) -> Result<()> {
        self.registry.disable(provider, reason)?;
        self.events.record(
            SecurityEvent::new(
                SecurityEventKind::AdminAction,
                Severity::Medium,
                format!("{provider} disabled: {reason}"),
            )
            .with_provider(provider),
        );
        Ok(())
    }

    /// Return a provider to `active`, clearing any cool-down or ledger flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider id is unknown.
    pub fn enable(&self, provider: &str) -> Result<()> {
        self.registry.enable(provider)?;
        self.events.record(
            SecurityEvent::new(
                SecurityEventKind::AdminAction,
                Severity::Low,
                format!("{provider} enabled"),
            )
            .with_provider(provider),
        );
        Ok(())
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Health and rolling stats of every provider, in configuration order.
    #[must_use]
    pub fn provider_snapshots(&self) -> Vec<ProviderSnapshot> {
        self.registry.snapshots(self.clock.now())
    }

    /// Most recent call outcomes, oldest first.
    #[must_use]
    pub fn recent_outcomes(&self) -> Vec<CallOutcome> {
        self.outcomes.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn quota_snapshot(&self, provider: &str) -> Option<QuotaSnapshot> {
        self.ledger.snapshot(provider)
    }

    #[must_use]
    pub fn credential_status(&self, provider: &str) -> Option<CredentialStatus> {
        self.credentials.status(provider)
    }

    #[must_use]
    pub fn security_events(&self) -> Vec<SecurityEvent> {
        self.events.events()
    }

    #[must_use]
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Write the cache snapshot, if one is configured. Returns the entries written.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error if the snapshot cannot be written.
    pub fn save_cache_snapshot(&self) -> Result<usize> {
        match (&self.cache, &self.cache_snapshot) {
            (Some(cache), Some(path)) => cache.save_snapshot(path),
            _ => Ok(0),
        }
    }

    // =========================================================================
    // Components (maintenance and tests)
    // =========================================================================

    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    #[must_use]
    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    #[must_use]
    pub fn events(&self) -> &SecurityEventLog {
        &self.events
    }

    #[must_use]
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_deref()
    }

    #[must_use]
    pub const fn rotation_interval(&self) -> Option<chrono::Duration> {
        self.rotation_interval
    }

    #[must_use]
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }
}

/// Result of dispatching one candidate.
enum Dispatch {
    /// Lost eligibility between SELECT and dispatch; no call was made.
    Skipped(ProviderFailure),
    Failed(CallOutcome, ProviderFailure),
    Succeeded(CallOutcome, String),
}
