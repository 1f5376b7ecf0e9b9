//! Background maintenance.
//!
//! Each [`MaintenanceTask`] runs on its own `tokio` interval against a shared
//! [`Orchestrator`]. [`Maintenance::shutdown`] signals every task through a
//! `watch` channel and joins them.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::core::orchestrator::Orchestrator;
use crate::storage::config::Config;

/// One periodic job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaintenanceTask {
    /// Apply due hour/day/month quota resets.
    QuotaReset,
    /// Rotate credential rings older than the rotation interval.
    CredentialRotation,
    /// Drop expired cache entries and save the snapshot.
    CacheSweep,
    /// Restore providers whose cool-down has passed.
    CoolDownExpiry,
    /// Drop security events older than the maximum age.
    EventPrune,
    /// Forget rate windows with no live timestamps.
    RateWindowPrune,
}

impl MaintenanceTask {
    pub const ALL: &'static [Self] = &[
        Self::QuotaReset,
        Self::CredentialRotation,
        Self::CacheSweep,
        Self::CoolDownExpiry,
        Self::EventPrune,
        Self::RateWindowPrune,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::QuotaReset => "quota-reset",
            Self::CredentialRotation => "credential-rotation",
            Self::CacheSweep => "cache-sweep",
            Self::CoolDownExpiry => "cool-down-expiry",
            Self::EventPrune => "event-prune",
            Self::RateWindowPrune => "rate-window-prune",
        }
    }

    /// Run the job once. Returns how many items it touched.
    pub fn run(self, orchestrator: &Orchestrator) -> usize {
        match self {
            Self::QuotaReset => orchestrator.ledger().roll_over().len(),
            Self::CredentialRotation => orchestrator
                .rotation_interval()
                .map_or(0, |every| orchestrator.credentials().rotate_due(every).len()),
            Self::CacheSweep => {
                let Some(cache) = orchestrator.cache() else {
                    return 0;
                };
                let removed = cache.sweep_expired();
                if let Err(e) = orchestrator.save_cache_snapshot() {
                    tracing::warn!(error = %e, "Cache snapshot not saved");
                }
                removed
            }
            Self::CoolDownExpiry => orchestrator
                .registry()
                .expire_cool_downs(orchestrator.clock().now())
                .len(),
            Self::EventPrune => orchestrator.events().prune(),
            Self::RateWindowPrune => orchestrator.limiter().prune_idle(),
        }
    }
}

/// Period of each task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSchedule {
    pub quota_reset: Duration,
    pub credential_rotation: Duration,
    pub cache_sweep: Duration,
    pub cool_down_expiry: Duration,
    pub event_prune: Duration,
    pub rate_window_prune: Duration,
}

impl MaintenanceSchedule {
    /// Every task on the same period.
    #[must_use]
    pub const fn uniform(period: Duration) -> Self {
        Self {
            quota_reset: period,
            credential_rotation: period,
            cache_sweep: period,
            cool_down_expiry: period,
            event_prune: period,
            rate_window_prune: period,
        }
    }

    /// Every task on `general.maintenance_interval_seconds`.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self::uniform(Duration::from_secs(config.general.maintenance_interval_seconds))
    }

    #[must_use]
    pub const fn period(&self, task: MaintenanceTask) -> Duration {
        match task {
            MaintenanceTask::QuotaReset => self.quota_reset,
            MaintenanceTask::CredentialRotation => self.credential_rotation,
            MaintenanceTask::CacheSweep => self.cache_sweep,
            MaintenanceTask::CoolDownExpiry => self.cool_down_expiry,
            MaintenanceTask::EventPrune => self.event_prune,
            MaintenanceTask::RateWindowPrune => self.rate_window_prune,
        }
    }
}

impl Default for MaintenanceSchedule {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(60))
    }
}

/// Running maintenance tasks.
#[derive(Debug)]
pub struct Maintenance {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<(MaintenanceTask, JoinHandle<()>)>,
}

impl Maintenance {
    /// Start every task. Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(orchestrator: Arc<Orchestrator>, schedule: MaintenanceSchedule) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = MaintenanceTask::ALL
            .iter()
            .map(|&task| {
                let handle = tokio::spawn(run_task(
                    task,
                    schedule.period(task),
                    orchestrator.clone(),
                    shutdown_rx.clone(),
                ));
                (task, handle)
            })
            .collect();
        tracing::debug!(tasks = MaintenanceTask::ALL.len(), "Maintenance started");
        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Number of running tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let (tasks, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        for (task, joined) in tasks.into_iter().zip(join_all(handles).await) {
            if let Err(e) = joined {
                tracing::warn!(task = task.name(), error = %e, "Maintenance task ended abnormally");
            }
        }
        tracing::debug!("Maintenance stopped");
    }
}

async fn run_task(
    task: MaintenanceTask,
    period: Duration,
    orchestrator: Arc<Orchestrator>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let touched = task.run(&orchestrator);
                if touched > 0 {
                    tracing::debug!(task = task.name(), touched, "Maintenance pass");
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
