//! Security events and audit forwarding.
//!
//! [`SecurityEventLog`] is an append-only, capped, in-memory log of security
//! relevant incidents (credential rejections, capacity cool-downs, budget
//! alerts, guard rejections). Every event is also emitted as a `tracing` event
//! at a level matching its severity.
//!
//! [`AuditSink`] receives usage, cost, and security records for forwarding to an
//! external store. Forwarding is fire-and-forget: a slow or broken sink never
//! delays or fails a request.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::clock::SharedClock;
use crate::core::models::CallOutcome;
use crate::error::Result;

/// Default number of events kept in memory.
pub const DEFAULT_EVENT_CAPACITY: usize = 1_000;

/// Default age after which events are pruned.
pub const DEFAULT_EVENT_MAX_AGE_HOURS: i64 = 24 * 7;

// =============================================================================
// Security Events
// =============================================================================

/// How serious a security event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    /// A provider rejected its credential.
    AuthenticationFailure,
    /// A provider reported it is over capacity and entered cool-down.
    CapacityExceeded,
    /// Spend crossed the alert threshold.
    BudgetAlert,
    /// Spend reached the budget; the provider stopped being selected.
    BudgetExceeded,
    /// A credential ring advanced.
    CredentialRotated,
    /// The content guard rejected input.
    InputRejected,
    /// An operator disabled or enabled a provider.
    AdminAction,
}

/// A single security event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
}

impl SecurityEvent {
    #[must_use]
    pub fn new(kind: SecurityEventKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            timestamp: Utc::now(),
            provider: None,
            caller: None,
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }
}

/// Append-only, capped, age-pruned event log.
#[derive(Debug)]
pub struct SecurityEventLog {
    events: Mutex<VecDeque<SecurityEvent>>,
    capacity: usize,
    max_age: Duration,
    clock: SharedClock,
    sink: Option<std::sync::Arc<dyn AuditSink>>,
}

impl SecurityEventLog {
    #[must_use]
    pub fn new(capacity: usize, max_age: Duration, clock: SharedClock) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            max_age,
            clock,
            sink: None,
        }
    }

    /// Forward every recorded event to `sink` as well.
    #[must_use]
    pub fn with_sink(mut self, sink: std::sync::Arc<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Append an event, stamping it with the log's clock.
    pub fn record(&self, mut event: SecurityEvent) {
        event.timestamp = self.clock.now();
        log_event(&event);

        if let Some(sink) = &self.sink {
            sink.submit(AuditRecord::Security(event.clone()));
        }

        let mut events = self.events.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Drop events older than the configured maximum age. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let cutoff = self.clock.now() - self.max_age;
        let mut events = self.events.lock();
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        before - events.len()
    }

    /// Snapshot of all retained events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Retained events of one kind.
    #[must_use]
    pub fn events_of(&self, kind: SecurityEventKind) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

fn log_event(event: &SecurityEvent) {
    let provider = event.provider.as_deref().unwrap_or("-");
    let caller = event.caller.as_deref().unwrap_or("-");
    match event.severity {
        Severity::Low => tracing::info!(
            kind = ?event.kind, severity = %event.severity, provider, caller,
            "{}", event.message
        ),
        Severity::Medium => tracing::warn!(
            kind = ?event.kind, severity = %event.severity, provider, caller,
            "{}", event.message
        ),
        Severity::High | Severity::Critical => tracing::error!(
            kind = ?event.kind, severity = %event.severity, provider, caller,
            "{}", event.message
        ),
    }
}

// =============================================================================
// Audit Sink
// =============================================================================

/// A record forwarded to the audit sink.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditRecord {
    /// One provider attempt.
    Usage {
        caller: String,
        #[serde(flatten)]
        outcome: CallOutcome,
    },
    /// A security event.
    Security(SecurityEvent),
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    /// Hand a record to the sink. Must not block and must not fail the caller.
    fn submit(&self, record: AuditRecord);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn submit(&self, _record: AuditRecord) {}
}

/// Sink that appends one JSON object per line to a file from a background task.
#[derive(Debug)]
pub struct JsonlAuditSink {
    tx: mpsc::UnboundedSender<AuditRecord>,
}

impl JsonlAuditSink {
    /// Start the writer task. Must be called from within a tokio runtime.
    ///
    /// The task ends once every sender has been dropped and the queue drained.
    pub fn spawn(path: impl Into<PathBuf>) -> Result<(Self, JoinHandle<()>)> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<AuditRecord>();
        let handle = tokio::spawn(async move {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await;
            let mut file = match file {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Audit sink unavailable");
                    return;
                }
            };

            while let Some(record) = rx.recv().await {
                let mut line = match serde_json::to_vec(&record) {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::debug!(error = %e, "Failed to serialize audit record");
                        continue;
                    }
                };
                line.push(b'\n');
                if let Err(e) = file.write_all(&line).await {
                    tracing::warn!(path = %path.display(), error = %e, "Audit write failed");
                }
            }
            let _ = file.flush().await;
        });

        Ok((Self { tx }, handle))
    }
}

impl AuditSink for JsonlAuditSink {
    fn submit(&self, record: AuditRecord) {
        if self.tx.send(record).is_err() {
            tracing::debug!("Audit sink closed; record dropped");
        }
    }
}
