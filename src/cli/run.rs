//! `run` command implementation: one-shot orchestration.

use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncReadExt;

use crate::cli::args::{OutputFormat, RunArgs};
use crate::cli::print_json;
use crate::core::events::{AuditSink, JsonlAuditSink};
use crate::core::models::{Capability, OrchestrationResult, RequestOptions};
use crate::core::orchestrator::Orchestrator;
use crate::error::Result;
use crate::storage::config::Config;
use crate::util::{format_cost, format_latency};

/// Execute the `run` command.
pub async fn execute(
    args: &RunArgs,
    config_path: Option<&Path>,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    args.validate()?;
    let capability = Capability::from_name(&args.capability)?;
    let config = Config::load(config_path)?;

    let content = match &args.content {
        Some(content) if content != "-" => content.clone(),
        _ => read_stdin().await?,
    };

    let mut builder = Orchestrator::builder(config.clone());
    let mut audit_task = None;
    if let Some(path) = &config.audit.jsonl_path {
        let (sink, handle) = JsonlAuditSink::spawn(path)?;
        let sink: Arc<dyn AuditSink> = Arc::new(sink);
        builder = builder.audit_sink(sink);
        audit_task = Some(handle);
    }
    let orchestrator = builder.build()?;

    let options = RequestOptions {
        language: args.language.clone(),
        max_tokens: args.max_tokens,
        temperature: args.temperature,
        ..RequestOptions::default()
    };

    tracing::debug!(%capability, caller = %args.caller, chars = content.chars().count(), "Running request");
    let result = orchestrator
        .orchestrate(capability, &content, options, &args.caller)
        .await;

    if let Err(e) = orchestrator.save_cache_snapshot() {
        tracing::warn!(error = %e, "Cache snapshot not saved");
    }

    // The audit task drains once the last sink handle is gone.
    drop(orchestrator);
    if let Some(handle) = audit_task
        && let Err(e) = handle.await
    {
        tracing::warn!(error = %e, "Audit writer ended abnormally");
    }

    let result = result?;
    match format {
        OutputFormat::Json => print_json(&result, pretty),
        OutputFormat::Human => {
            print!("{}", render_human(&result));
            Ok(())
        }
    }
}

async fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    Ok(buf)
}

fn render_human(result: &OrchestrationResult) -> String {
    let mut out = result.payload.clone();
    if !out.ends_with('\n') {
        out.push('\n');
    }

    if result.cached {
        out.push_str(&format!("\n[{} | cached]\n", result.provider));
        return out;
    }

    let cost: f64 = result.attempts.iter().map(|a| a.cost_usd).sum();
    #[allow(clippy::cast_precision_loss)]
    let latency: f64 = result.attempts.iter().map(|a| a.latency_ms as f64).sum();
    out.push_str(&format!(
        "\n[{} | {} attempt(s) | {} | {}]\n",
        result.provider,
        result.attempts.len(),
        format_cost(cost),
        format_latency(latency)
    ));
    for attempt in result.attempts.iter().filter(|a| !a.success) {
        out.push_str(&format!(
            "  {} failed: {}\n",
            attempt.provider,
            attempt.error.as_deref().unwrap_or("unknown error")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::CallOutcome;
    use chrono::Utc;

    fn outcome(provider: &str, success: bool) -> CallOutcome {
        CallOutcome {
            provider: provider.to_string(),
            success,
            latency_ms: 120,
            cost_usd: 0.002,
            units: 40,
            error: (!success).then(|| "HTTP 503".to_string()),
            at: Utc::now(),
        }
    }

    #[test]
    fn human_output_lists_failed_attempts() {
        let result = OrchestrationResult {
            payload: "Fixed text.".to_string(),
            provider: "anthropic".to_string(),
            cached: false,
            attempts: vec![outcome("openai", false), outcome("anthropic", true)],
        };
        let out = render_human(&result);
        assert!(out.starts_with("Fixed text.\n"));
        assert!(out.contains("[anthropic | 2 attempt(s) | $0.0040 | 240ms]"));
        assert!(out.contains("openai failed: HTTP 503"));
    }

    #[test]
    fn human_output_marks_cache_hits() {
        let result = OrchestrationResult {
            payload: "Hi.".to_string(),
            provider: "local".to_string(),
            cached: true,
            attempts: Vec::new(),
        };
        assert!(render_human(&result).contains("[local | cached]"));
    }
}
