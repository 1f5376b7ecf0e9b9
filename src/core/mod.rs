//! Core orchestration: models, provider state, limits, and the dispatch loop.

pub mod budgets;
pub mod clock;
pub mod credentials;
pub mod events;
pub mod guard;
pub mod http;
pub mod logging;
pub mod maintenance;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod quota;
pub mod rate_limit;

pub use budgets::{BudgetLevel, BudgetLimits, ResolvedBudget, resolve_budget};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use credentials::{CredentialStatus, CredentialStore, Secret};
pub use events::{
    AuditRecord, AuditSink, JsonlAuditSink, NoopAuditSink, SecurityEvent, SecurityEventKind,
    SecurityEventLog, Severity,
};
pub use guard::{ContentGuard, GuardVerdict, PatternRule};
pub use maintenance::{Maintenance, MaintenanceSchedule, MaintenanceTask};
pub use models::{
    AiRequest, CallOutcome, Capability, FailureKind, NoProviderReason, OrchestrationResult,
    ProviderFailure, RequestOptions,
};
pub use orchestrator::{ANONYMOUS_CALLER, Orchestrator, OrchestratorBuilder};
pub use provider::{
    AuthScheme, CostTable, HealthStatus, ProviderDescriptor, ProviderKind, ProviderRegistry,
    ProviderSnapshot, ProviderStats, RateLimits, Tier,
};
pub use quota::{QuotaCheck, QuotaLedger, QuotaSnapshot};
pub use rate_limit::{CallerLimits, RateLimiter};
