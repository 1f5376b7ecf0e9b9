//! Shared helpers for integration tests.
//!
//! - `log_capture`: a `tracing` layer that records events for assertions

#![allow(dead_code)]

pub mod log_capture;

use std::path::PathBuf;

use airo::test_utils::TestDir;

/// One `[[providers]]` table for a remote provider at `endpoint`.
pub fn remote_provider_toml(
    id: &str,
    kind: &str,
    endpoint: &str,
    priority: u32,
    credentials: &[&str],
) -> String {
    let credentials = credentials
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"
[[providers]]
id = "{id}"
kind = "{kind}"
priority = {priority}
endpoint = "{endpoint}"
credentials = [{credentials}]
timeout_seconds = 5
"#
    )
}

/// Write `body` as `config.toml` in `dir`.
pub fn write_config(dir: &TestDir, body: &str) -> PathBuf {
    dir.create_file("config.toml", body)
}
