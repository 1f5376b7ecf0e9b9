//! Response cache persistence across orchestrator restarts.

use airo::core::models::{Capability, RequestOptions};
use airo::test_utils::{Harness, ScriptedAdapter, TestDir, scripted_provider};

const TTL_SECONDS: u64 = 600;

fn harness_with_snapshot(dir: &TestDir, adapter: std::sync::Arc<ScriptedAdapter>) -> Harness {
    let snapshot = dir.file_path("cache/snapshot.json");
    Harness::builder()
        .provider(scripted_provider("p1", 1), adapter)
        .configure(move |c| {
            c.cache.snapshot_path = Some(snapshot);
            c.limits.cache_ttl_seconds = TTL_SECONDS;
        })
        .build()
}

#[tokio::test]
async fn saved_entries_are_served_after_restart() {
    let dir = TestDir::new();
    let first = ScriptedAdapter::always_ok("Good morning.");
    let harness = harness_with_snapshot(&dir, first.clone());
    harness
        .orchestrator
        .orchestrate(Capability::Correction, "good morning", RequestOptions::default(), "u1")
        .await
        .unwrap();
    assert_eq!(harness.orchestrator.save_cache_snapshot().unwrap(), 1);
    assert!(dir.file_path("cache/snapshot.json").exists());

    let second = ScriptedAdapter::always_ok("unused");
    let restarted = harness_with_snapshot(&dir, second.clone());
    let result = restarted
        .orchestrator
        .orchestrate(Capability::Correction, "good morning", RequestOptions::default(), "u2")
        .await
        .unwrap();

    assert!(result.cached);
    assert_eq!(result.payload, "Good morning.");
    assert_eq!(result.provider, "p1");
    assert_eq!(second.calls(), 0);
}

#[tokio::test]
async fn expired_entries_are_not_persisted() {
    let dir = TestDir::new();
    let adapter = ScriptedAdapter::always_ok("Hi.");
    let harness = harness_with_snapshot(&dir, adapter);
    harness
        .orchestrator
        .orchestrate(Capability::Correction, "hi", RequestOptions::default(), "u1")
        .await
        .unwrap();

    harness
        .clock
        .advance(chrono::Duration::seconds(TTL_SECONDS as i64 + 1));
    assert_eq!(harness.orchestrator.save_cache_snapshot().unwrap(), 0);
}

#[tokio::test]
async fn corrupt_snapshot_starts_an_empty_cache() {
    let dir = TestDir::new();
    dir.create_file("cache/snapshot.json", "{not json");
    let adapter = ScriptedAdapter::always_ok("Fine.");
    let harness = harness_with_snapshot(&dir, adapter.clone());

    let result = harness
        .orchestrator
        .orchestrate(Capability::Correction, "fine", RequestOptions::default(), "u1")
        .await
        .unwrap();
    assert!(!result.cached);
    assert_eq!(adapter.calls(), 1);
}
