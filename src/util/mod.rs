//! Formatting helpers for command output.

pub mod format;

pub use format::{format_cost, format_latency};
