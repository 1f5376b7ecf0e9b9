//! Credential store with ring rotation.
//!
//! Each provider owns an ordered ring of secrets. The head of the ring is the
//! current credential. Rotation moves the head to the tail and advances the
//! position counter; a single-credential ring never rotates.
//!
//! Config values are credential *references*:
//!
//! - `env:OPENAI_API_KEY` reads an environment variable
//! - `keyring:airo/openai` reads the OS keyring (service `airo`, user `openai`)
//! - anything else is used literally

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::clock::SharedClock;
use crate::error::{AiroError, Result};

// =============================================================================
// Secret
// =============================================================================

/// A credential value. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for attaching to an outbound request.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short SHA-256 fingerprint, safe for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret({})", self.fingerprint())
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[redacted]")
    }
}

/// Resolve a credential reference from config.
pub fn resolve_credential(reference: &str) -> Result<Secret> {
    let reference = reference.trim();
    if let Some(var) = reference.strip_prefix("env:") {
        let value = std::env::var(var).map_err(|_| {
            AiroError::config(
                "providers.credentials",
                format!("environment variable {var} is not set"),
            )
        })?;
        if value.trim().is_empty() {
            return Err(AiroError::config(
                "providers.credentials",
                format!("environment variable {var} is empty"),
            ));
        }
        return Ok(Secret::new(value.trim()));
    }

    if let Some(path) = reference.strip_prefix("keyring:") {
        let (service, user) = path.split_once('/').ok_or_else(|| {
            AiroError::config(
                "providers.credentials",
                format!("keyring reference '{reference}' must be keyring:service/user"),
            )
        })?;
        let entry = keyring::Entry::new(service, user).map_err(|e| {
            AiroError::config("providers.credentials", format!("keyring {service}/{user}: {e}"))
        })?;
        let value = entry.get_password().map_err(|e| {
            AiroError::config("providers.credentials", format!("keyring {service}/{user}: {e}"))
        })?;
        return Ok(Secret::new(value));
    }

    if reference.is_empty() {
        return Err(AiroError::config("providers.credentials", "empty credential"));
    }
    Ok(Secret::new(reference))
}

// =============================================================================
// Credential Set
// =============================================================================

/// Ordered credentials for one provider.
#[derive(Debug, Clone)]
pub struct CredentialSet {
    ring: VecDeque<Secret>,
    position: usize,
    last_rotated: DateTime<Utc>,
    rotations: u64,
}

impl CredentialSet {
    #[must_use]
    pub fn new(secrets: Vec<Secret>, now: DateTime<Utc>) -> Self {
        Self {
            ring: secrets.into(),
            position: 0,
            last_rotated: now,
            rotations: 0,
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<&Secret> {
        self.ring.front()
    }

    /// Index of the current credential in configuration order.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Advance the ring by one. Returns `false` when there is nothing to rotate to.
    pub fn rotate(&mut self, now: DateTime<Utc>) -> bool {
        if self.ring.len() <= 1 {
            return false;
        }
        self.ring.rotate_left(1);
        self.position = (self.position + 1) % self.ring.len();
        self.last_rotated = now;
        self.rotations += 1;
        true
    }
}

/// Reporting view of a credential set.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStatus {
    pub provider: String,
    pub count: usize,
    pub position: usize,
    pub rotations: u64,
    pub last_rotated: DateTime<Utc>,
    /// Fingerprint of the current credential.
    pub current: Option<String>,
}

// =============================================================================
// Credential Store
// =============================================================================

/// Credentials for every provider, each set behind its own lock.
#[derive(Debug)]
pub struct CredentialStore {
    sets: HashMap<String, RwLock<CredentialSet>>,
    clock: SharedClock,
}

impl CredentialStore {
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            sets: HashMap::new(),
            clock,
        }
    }

    /// Register the credentials for a provider, replacing any existing set.
    pub fn insert(&mut self, provider: impl Into<String>, secrets: Vec<Secret>) {
        let set = CredentialSet::new(secrets, self.clock.now());
        self.sets.insert(provider.into(), RwLock::new(set));
    }

    /// The credential to use for the next call, if the provider has any.
    #[must_use]
    pub fn current_credential(&self, provider: &str) -> Option<Secret> {
        self.sets.get(provider)?.read().current().cloned()
    }

    /// Position of the current credential, if the provider has a set.
    #[must_use]
    pub fn position(&self, provider: &str) -> Option<usize> {
        self.sets.get(provider).map(|s| s.read().position())
    }

    #[must_use]
    pub fn count(&self, provider: &str) -> usize {
        self.sets.get(provider).map_or(0, |s| s.read().len())
    }

    /// Rotate one provider's ring. Returns `true` if the current credential changed.
    pub fn rotate(&self, provider: &str) -> bool {
        let Some(set) = self.sets.get(provider) else {
            return false;
        };
        let mut set = set.write();
        self.advance(provider, &mut set)
    }

    /// Rotate away from `failed` only if it is still the current credential.
    ///
    /// Calls that fail with the same key race to report it; the first one
    /// rotates and the rest see a different current key and do nothing.
    pub fn rotate_if_current(&self, provider: &str, failed: &Secret) -> bool {
        let Some(set) = self.sets.get(provider) else {
            return false;
        };
        let mut set = set.write();
        if set.current() != Some(failed) {
            tracing::debug!(
                provider,
                credential = %failed.fingerprint(),
                "Credential already rotated"
            );
            return false;
        }
        self.advance(provider, &mut set)
    }

    fn advance(&self, provider: &str, set: &mut CredentialSet) -> bool {
        let rotated = set.rotate(self.clock.now());
        if rotated {
            tracing::info!(
                provider,
                position = set.position(),
                credential = %set.current().map(Secret::fingerprint).unwrap_or_default(),
                "Credential rotated"
            );
        }
        rotated
    }

    /// Rotate every set whose last rotation is at least `interval` old.
    /// Returns the providers that rotated.
    pub fn rotate_due(&self, interval: Duration) -> Vec<String> {
        let now = self.clock.now();
        let mut rotated = Vec::new();
        for (provider, set) in &self.sets {
            let mut set = set.write();
            if now - set.last_rotated >= interval {
                if set.rotate(now) {
                    rotated.push(provider.clone());
                } else {
                    // Keep single-credential sets from being re-checked every tick.
                    set.last_rotated = now;
                }
            }
        }
        rotated.sort();
        rotated
    }

    #[must_use]
    pub fn status(&self, provider: &str) -> Option<CredentialStatus> {
        let set = self.sets.get(provider)?.read();
        Some(CredentialStatus {
            provider: provider.to_string(),
            count: set.len(),
            position: set.position(),
            rotations: set.rotations,
            last_rotated: set.last_rotated,
            current: set.current().map(Secret::fingerprint),
        })
    }
}
