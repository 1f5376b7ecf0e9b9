//! airo - AI Request Orchestration & Resilience Layer
//!
//! Routes text-processing requests (grammar correction, generation, chat)
//! across a fleet of AI providers, enforcing per-provider
//! quotas and rate limits, rotating credentials, caching responses, and
//! falling back when a provider fails.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::core::{Orchestrator, OrchestratorBuilder};
pub use error::{AiroError, ExitCode, Result};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
