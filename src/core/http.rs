//! HTTP client utilities.
//!
//! One client is shared by every remote adapter; per-provider timeouts are
//! applied on each request.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::{AiroError, Result};

/// Connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .user_agent(format!("airo/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AiroError::Other(anyhow::anyhow!("failed to build HTTP client: {e}")))
}
