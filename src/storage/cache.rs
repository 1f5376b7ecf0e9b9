//! Content-addressed response cache.
//!
//! Keys are fingerprints of the normalized request (content, capability, and
//! material options), never of the provider that answered. The cache is
//! bounded: overflow evicts the least-recently-inserted entry. Entries older
//! than the TTL read as misses.
//!
//! The cache can optionally be persisted as a JSON snapshot, written atomically
//! (temp file + rename). Snapshot failures are logged and otherwise ignored.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::clock::SharedClock;
use crate::core::models::AiRequest;
use crate::error::Result;

/// Default maximum number of cached responses.
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

/// Default time-to-live in seconds.
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

const SNAPSHOT_VERSION: u32 = 1;

// =============================================================================
// Fingerprint
// =============================================================================

/// Trim and collapse internal whitespace.
#[must_use]
pub fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable cache key for a request: SHA-256 hex of the normalized content,
/// capability, and every material option.
#[must_use]
pub fn fingerprint(request: &AiRequest) -> String {
    let options = &request.options;
    let mut hasher = Sha256::new();
    hasher.update(b"airo/v1\0");
    hasher.update(request.capability.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(normalize_content(&request.content).as_bytes());
    hasher.update(b"\0");
    if let Some(language) = &options.language {
        hasher.update(format!("language={}\0", language.trim().to_lowercase()).as_bytes());
    }
    if let Some(max_tokens) = options.max_tokens {
        hasher.update(format!("max_tokens={max_tokens}\0").as_bytes());
    }
    if let Some(temperature) = options.temperature {
        hasher.update(format!("temperature={temperature}\0").as_bytes());
    }
    // BTreeMap iterates in key order.
    for (key, value) in &options.extra {
        hasher.update(format!("{key}={value}\0").as_bytes());
    }
    hex::encode(hasher.finalize())
}

// =============================================================================
// Entries and Metrics
// =============================================================================

/// A cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: String,
    pub created_at: DateTime<Utc>,
    /// Provider that produced the value. Informational only.
    pub provider: String,
}

/// Cache counters.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub writes: AtomicU64,
    pub evictions: AtomicU64,
    pub expirations: AtomicU64,
}

/// Point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when there were none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, (CacheEntry, u64)>,
    /// Insertion order as (key, generation). Stale generations are skipped.
    order: VecDeque<(String, u64)>,
    generation: u64,
}

impl CacheInner {
    fn insert(&mut self, key: String, entry: CacheEntry) {
        self.generation += 1;
        let generation = self.generation;
        self.order.push_back((key.clone(), generation));
        self.entries.insert(key, (entry, generation));
    }

    /// Remove the least-recently-inserted live entry.
    fn evict_oldest(&mut self) -> bool {
        while let Some((key, generation)) = self.order.pop_front() {
            if self
                .entries
                .get(&key)
                .is_some_and(|(_, g)| *g == generation)
            {
                self.entries.remove(&key);
                return true;
            }
        }
        false
    }

    fn compact_order(&mut self) {
        if self.order.len() > self.entries.len().saturating_mul(2).max(64) {
            let entries = &self.entries;
            self.order
                .retain(|(key, generation)| entries.get(key).is_some_and(|(_, g)| g == generation));
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    /// Oldest first.
    entries: Vec<(String, CacheEntry)>,
}

// =============================================================================
// Response Cache
// =============================================================================

/// Bounded, TTL-checked response cache.
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
    ttl: Duration,
    clock: SharedClock,
    metrics: CacheMetrics,
}

impl ResponseCache {
    #[must_use]
    pub fn new(max_entries: usize, ttl: std::time::Duration, clock: SharedClock) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_entries,
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(365)),
            clock,
            metrics: CacheMetrics::default(),
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at >= self.ttl
    }

    /// Look up a fingerprint. Expired entries are misses.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        match inner.entries.get(key) {
            Some((entry, _)) if !self.is_expired(entry, now) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            Some(_) => {
                self.metrics.expirations.fetch_add(1, Ordering::Relaxed);
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value. Last write wins.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>, provider: impl Into<String>) {
        if self.max_entries == 0 {
            return;
        }
        let entry = CacheEntry {
            value: value.into(),
            created_at: self.clock.now(),
            provider: provider.into(),
        };
        let key = key.into();
        let mut inner = self.inner.lock();
        let replacing = inner.entries.contains_key(&key);
        inner.insert(key, entry);
        self.metrics.writes.fetch_add(1, Ordering::Relaxed);

        if !replacing {
            while inner.entries.len() > self.max_entries {
                if !inner.evict_oldest() {
                    break;
                }
                self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        inner.compact_order();
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, (entry, _)| now - entry.created_at < self.ttl);
        let removed = before - inner.entries.len();
        inner.compact_order();
        self.metrics
            .expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        *self.inner.lock() = CacheInner::default();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            writes: self.metrics.writes.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
            expirations: self.metrics.expirations.load(Ordering::Relaxed),
        }
    }

    /// Write all live entries to `path` atomically. Returns the number written.
    pub fn save_snapshot(&self, path: &Path) -> Result<usize> {
        let now = self.clock.now();
        let snapshot = {
            let inner = self.inner.lock();
            let entries = inner
                .order
                .iter()
                .filter_map(|(key, generation)| {
                    let (entry, g) = inner.entries.get(key)?;
                    (g == generation && !self.is_expired(entry, now))
                        .then(|| (key.clone(), entry.clone()))
                })
                .collect::<Vec<_>>();
            Snapshot {
                version: SNAPSHOT_VERSION,
                saved_at: now,
                entries,
            }
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec(&snapshot)?;
        write_atomic(path, &content)?;
        tracing::debug!(path = %path.display(), entries = snapshot.entries.len(), "Cache snapshot saved");
        Ok(snapshot.entries.len())
    }

    /// Load entries from a snapshot, skipping expired ones. A missing file loads nothing.
    pub fn load_snapshot(&self, path: &Path) -> Result<usize> {
        let content = match std::fs::read(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(
                path = %path.display(),
                version = snapshot.version,
                "Ignoring cache snapshot with unknown version"
            );
            return Ok(0);
        }

        let now = self.clock.now();
        let mut loaded = 0;
        let mut inner = self.inner.lock();
        for (key, entry) in snapshot.entries {
            if self.is_expired(&entry, now) {
                continue;
            }
            inner.insert(key, entry);
            loaded += 1;
            while inner.entries.len() > self.max_entries {
                if !inner.evict_oldest() {
                    break;
                }
            }
        }
        inner.compact_order();
        tracing::debug!(path = %path.display(), loaded, "Cache snapshot loaded");
        Ok(loaded.min(inner.entries.len()))
    }
}

/// Write content atomically using a temp file and rename.
fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("cache"),
        std::process::id()
    ));

    {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    std::fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::models::{Capability, RequestOptions};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap(),
        ))
    }

    fn cache(max: usize, clock: Arc<ManualClock>) -> ResponseCache {
        ResponseCache::new(max, std::time::Duration::from_secs(60), clock)
    }

    #[test]
    fn fingerprint_ignores_whitespace_but_not_capability_or_options() {
        let a = AiRequest::new(Capability::Correction, "  i has   a cat ");
        let b = AiRequest::new(Capability::Correction, "i has a cat");
        let c = AiRequest::new(Capability::Generation, "i has a cat");
        let d = b.clone().with_options(RequestOptions {
            language: Some("fr".to_string()),
            ..Default::default()
        });
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&b), fingerprint(&c));
        assert_ne!(fingerprint(&b), fingerprint(&d));
        assert_eq!(fingerprint(&a).len(), 64);
    }

    #[test]
    fn put_then_get() {
        let c = cache(10, clock());
        c.put("k", "v", "openai");
        let hit = c.get("k").unwrap();
        assert_eq!(hit.value, "v");
        assert_eq!(hit.provider, "openai");
        assert!(c.get("other").is_none());
        let stats = c.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn expired_entries_miss_and_are_overwritten() {
        let clock = clock();
        let c = cache(10, clock.clone());
        c.put("k", "old", "openai");
        clock.advance(Duration::seconds(61));
        assert!(c.get("k").is_none());
        c.put("k", "new", "anthropic");
        assert_eq!(c.get("k").unwrap().value, "new");
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn overflow_evicts_least_recently_inserted() {
        let c = cache(2, clock());
        c.put("a", "1", "p");
        c.put("b", "2", "p");
        c.get("a"); // reads do not refresh insertion order
        c.put("c", "3", "p");
        assert!(c.get("a").is_none());
        assert!(c.get("b").is_some());
        assert!(c.get("c").is_some());
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn reinsert_moves_key_to_newest() {
        let c = cache(2, clock());
        c.put("a", "1", "p");
        c.put("b", "2", "p");
        c.put("a", "1b", "p");
        c.put("c", "3", "p");
        assert!(c.get("b").is_none());
        assert_eq!(c.get("a").unwrap().value, "1b");
    }

    #[test]
    fn sweep_removes_expired() {
        let clock = clock();
        let c = cache(10, clock.clone());
        c.put("a", "1", "p");
        clock.advance(Duration::seconds(30));
        c.put("b", "2", "p");
        clock.advance(Duration::seconds(31));
        assert_eq!(c.sweep_expired(), 1);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn snapshot_round_trip_skips_expired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache/snapshot.json");
        let clock = clock();
        let c = cache(10, clock.clone());
        c.put("a", "1", "p");
        clock.advance(Duration::seconds(30));
        c.put("b", "2", "p");
        assert_eq!(c.save_snapshot(&path).unwrap(), 2);

        clock.advance(Duration::seconds(31));
        let restored = cache(10, clock);
        assert_eq!(restored.load_snapshot(&path).unwrap(), 1);
        assert_eq!(restored.get("b").unwrap().value, "2");
        assert!(restored.get("a").is_none());
    }

    #[test]
    fn missing_snapshot_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let c = cache(10, clock());
        assert_eq!(c.load_snapshot(&dir.path().join("absent.json")).unwrap(), 0);
    }
}
