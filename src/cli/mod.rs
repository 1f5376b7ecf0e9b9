//! CLI argument parsing and command dispatch.

pub mod args;
pub mod check;
pub mod providers;
pub mod run;

pub use args::{Cli, Commands, OutputFormat, RunArgs};

use serde_json::json;

use crate::error::AiroError;

/// Print a serializable value as JSON.
pub(crate) fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> crate::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

/// Render an error for the terminal, with its code and fix suggestions.
#[must_use]
pub fn render_error(err: &AiroError, format: OutputFormat, pretty: bool) -> String {
    match format {
        OutputFormat::Json => {
            let suggestions: Vec<_> = err
                .fix_suggestions()
                .into_iter()
                .map(|s| {
                    json!({
                        "commands": s.commands,
                        "context": s.context,
                        "prevention": s.prevention,
                    })
                })
                .collect();
            let value = json!({
                "error": {
                    "code": err.error_code(),
                    "category": err.category().description(),
                    "message": err.to_string(),
                    "retryable": err.is_retryable(),
                    "suggestions": suggestions,
                }
            });
            let rendered = if pretty {
                serde_json::to_string_pretty(&value)
            } else {
                serde_json::to_string(&value)
            };
            rendered.unwrap_or_else(|_| err.to_string())
        }
        OutputFormat::Human => {
            let mut out = format!("error[{}]: {err}", err.error_code());
            for suggestion in err.fix_suggestions() {
                out.push_str(&format!("\n\n  {}", suggestion.context));
                for command in &suggestion.commands {
                    out.push_str(&format!("\n    $ {command}"));
                }
                if let Some(prevention) = &suggestion.prevention {
                    out.push_str(&format!("\n  Tip: {prevention}"));
                }
            }
            out
        }
    }
}
