//! Number formatting utilities.

/// Format a cost in USD. Sub-cent amounts keep four decimals.
#[must_use]
pub fn format_cost(value: f64) -> String {
    if value != 0.0 && value.abs() < 0.01 {
        format!("${value:.4}")
    } else {
        format!("${value:.2}")
    }
}

/// Format a latency in milliseconds, switching to seconds above one second.
#[must_use]
pub fn format_latency(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else {
        format!("{ms:.0}ms")
    }
}
