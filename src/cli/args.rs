//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// AI Request Orchestration & Resilience Layer.
#[derive(Parser, Debug)]
#[command(name = "airo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Configuration file (defaults to the platform config dir)
    #[arg(long, value_name = "PATH", global = true, env = "AIRO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate the configuration, then print a summary
    CheckConfig,

    /// List configured providers
    Providers,

    /// Orchestrate a single request
    Run(RunArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Capability to request (correction, generation, chat)
    #[arg(long, short = 'c', value_name = "CAPABILITY")]
    pub capability: String,

    /// Caller identity for per-caller rate limits
    #[arg(long, value_name = "ID", default_value = "")]
    pub caller: String,

    /// Language code of the content (e.g. en-US)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Upper bound on generated tokens
    #[arg(long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[arg(long, value_name = "T")]
    pub temperature: Option<f32>,

    /// Content to process; "-" or nothing reads stdin
    #[arg(value_name = "CONTENT")]
    pub content: Option<String>,
}

impl RunArgs {
    /// Validate argument combinations.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AiroError;

        if self.max_tokens == Some(0) {
            return Err(AiroError::config("max_tokens", "--max-tokens must be greater than 0"));
        }
        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(AiroError::config(
                "temperature",
                format!("--temperature must be between 0 and 2, got {t}"),
            ));
        }
        Ok(())
    }

    /// Whether the content comes from stdin.
    #[must_use]
    pub fn reads_stdin(&self) -> bool {
        self.content.as_deref().is_none_or(|c| c == "-")
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_overrides_format() {
        let cli = Cli::parse_from(["airo", "--json", "providers"]);
        assert_eq!(cli.effective_format(), OutputFormat::Json);
    }

    #[test]
    fn run_args_parse_globals_after_subcommand() {
        let cli = Cli::parse_from([
            "airo",
            "run",
            "--capability",
            "correction",
            "--config",
            "/tmp/airo.toml",
            "hello",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/airo.toml")));
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.content.as_deref(), Some("hello"));
        assert!(!args.reads_stdin());
    }

    #[test]
    fn run_args_validate() {
        let mut args = RunArgs {
            capability: "correction".to_string(),
            caller: String::new(),
            language: None,
            max_tokens: Some(0),
            temperature: None,
            content: Some("-".to_string()),
        };
        assert!(args.validate().is_err());
        assert!(args.reads_stdin());

        args.max_tokens = Some(64);
        args.temperature = Some(3.5);
        assert!(args.validate().is_err());

        args.temperature = Some(0.7);
        assert!(args.validate().is_ok());
    }
}
