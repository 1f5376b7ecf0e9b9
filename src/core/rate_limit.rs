//! Sliding-window rate limiter.
//!
//! Every provider has a set of provider-wide windows (per minute, hour, day,
//! from provider config) and, per caller identity, a set of caller windows
//! (per minute and per day, from the global limits). A request must fit in
//! every window and is recorded in all of them or none.
//!
//! All windows of one provider live in a single `DashMap` entry, so acquisition
//! is atomic per provider while different providers never contend.

use std::collections::{HashMap, VecDeque};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::core::clock::SharedClock;
use crate::core::provider::{ProviderRegistry, RateLimits};

/// Per-caller limits applied to every provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallerLimits {
    pub per_minute: Option<u32>,
    pub per_day: Option<u32>,
}

#[derive(Debug, Clone)]
struct Window {
    span: Duration,
    limit: u32,
    stamps: VecDeque<DateTime<Utc>>,
}

impl Window {
    fn new(span: Duration, limit: u32) -> Self {
        Self {
            span,
            limit,
            stamps: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.span;
        while self.stamps.front().is_some_and(|t| *t <= cutoff) {
            self.stamps.pop_front();
        }
    }

    fn has_room(&self) -> bool {
        self.stamps.len() < self.limit as usize
    }

    /// [`has_room`](Self::has_room) as of `now`, without pruning.
    fn has_room_at(&self, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.span;
        self.stamps.iter().filter(|t| **t > cutoff).count() < self.limit as usize
    }

    /// Time until the oldest stamp leaves the window, if the window is full.
    fn wait(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.has_room() {
            return None;
        }
        self.stamps
            .front()
            .map(|oldest| (*oldest + self.span - now).max(Duration::zero()))
    }
}

fn windows(tiers: &[(Duration, Option<u32>)]) -> Vec<Window> {
    tiers
        .iter()
        .filter_map(|(span, limit)| limit.map(|l| Window::new(*span, l)))
        .collect()
}

#[derive(Debug, Default)]
struct ProviderWindows {
    provider: Vec<Window>,
    callers: HashMap<String, Vec<Window>>,
}

fn caller_tiers(limits: CallerLimits) -> Vec<Window> {
    windows(&[
        (Duration::minutes(1), limits.per_minute),
        (Duration::days(1), limits.per_day),
    ])
}

/// Sliding-window admission per provider and per (provider, caller).
#[derive(Debug)]
pub struct RateLimiter {
    state: DashMap<String, ProviderWindows>,
    caller_limits: CallerLimits,
    clock: SharedClock,
}

impl RateLimiter {
    /// Create a limiter with provider-wide windows for every registered provider.
    #[must_use]
    pub fn new(registry: &ProviderRegistry, caller_limits: CallerLimits, clock: SharedClock) -> Self {
        let state = DashMap::new();
        for descriptor in registry.iter() {
            state.insert(
                descriptor.id.clone(),
                ProviderWindows {
                    provider: provider_tiers(descriptor.rate_limits),
                    callers: HashMap::new(),
                },
            );
        }
        Self {
            state,
            caller_limits,
            clock,
        }
    }

    /// Admit and record one call if every window has room.
    pub fn try_acquire(&self, provider: &str, caller: &str) -> bool {
        let now = self.clock.now();
        let limits = self.caller_limits;
        let mut entry = self.state.entry(provider.to_string()).or_default();
        let ProviderWindows {
            provider: provider_windows,
            callers,
        } = entry.value_mut();
        let caller_windows = callers
            .entry(caller.to_string())
            .or_insert_with(|| caller_tiers(limits));

        for w in provider_windows.iter_mut().chain(caller_windows.iter_mut()) {
            w.prune(now);
        }
        let admitted = provider_windows
            .iter()
            .chain(caller_windows.iter())
            .all(Window::has_room);

        if !admitted {
            return false;
        }
        for w in provider_windows.iter_mut().chain(caller_windows.iter_mut()) {
            w.stamps.push_back(now);
        }
        true
    }

    /// Whether [`try_acquire`](Self::try_acquire) would succeed right now.
    /// Read-only: consumes nothing and creates no state for unseen keys.
    #[must_use]
    pub fn would_admit(&self, provider: &str, caller: &str) -> bool {
        let now = self.clock.now();
        let Some(entry) = self.state.get(provider) else {
            return caller_tiers(self.caller_limits).iter().all(Window::has_room);
        };
        let provider_fits = entry.provider.iter().all(|w| w.has_room_at(now));
        provider_fits
            && match entry.callers.get(caller) {
                Some(windows) => windows.iter().all(|w| w.has_room_at(now)),
                None => caller_tiers(self.caller_limits).iter().all(Window::has_room),
            }
    }

    /// Estimated wait until a call for (`provider`, `caller`) would be admitted.
    /// `None` when it would be admitted now.
    #[must_use]
    pub fn retry_after(&self, provider: &str, caller: &str) -> Option<StdDuration> {
        let now = self.clock.now();
        let entry = self.state.get(provider)?;
        let provider_wait = entry.provider.iter().filter_map(|w| {
            let mut w = w.clone();
            w.prune(now);
            w.wait(now)
        });
        let caller_wait = entry
            .callers
            .get(caller)
            .into_iter()
            .flatten()
            .filter_map(|w| {
                let mut w = w.clone();
                w.prune(now);
                w.wait(now)
            });
        provider_wait
            .chain(caller_wait)
            .max()
            .and_then(|d| d.to_std().ok())
    }

    /// Drop caller windows that no longer hold any timestamps.
    /// Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for mut entry in self.state.iter_mut() {
            let windows = entry.value_mut();
            for w in &mut windows.provider {
                w.prune(now);
            }
            let before = windows.callers.len();
            windows.callers.retain(|_, ws| {
                for w in ws.iter_mut() {
                    w.prune(now);
                }
                ws.iter().any(|w| !w.stamps.is_empty())
            });
            removed += before - windows.callers.len();
        }
        removed
    }
}

fn provider_tiers(limits: RateLimits) -> Vec<Window> {
    windows(&[
        (Duration::minutes(1), limits.per_minute),
        (Duration::hours(1), limits.per_hour),
        (Duration::days(1), limits.per_day),
    ])
}
