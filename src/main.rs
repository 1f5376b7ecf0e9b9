//! airo - AI Request Orchestration & Resilience Layer
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use airo::cli::{Cli, Commands};
use airo::core::logging::{self, LogLevel, LogSettings};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = LogSettings::resolve(
        cli.log_level.as_deref().and_then(LogLevel::from_arg),
        cli.json_output,
        cli.verbose,
    );
    logging::init(&settings);

    let format = cli.effective_format();
    let pretty = cli.pretty;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(code = e.error_code(), "{e}");
            eprintln!("{}", airo::cli::render_error(&e, format, pretty));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> airo::Result<()> {
    let format = cli.effective_format();
    let pretty = cli.pretty;
    let config = cli.config.as_deref();

    match &cli.command {
        Commands::CheckConfig => airo::cli::check::execute(config, format, pretty),
        Commands::Providers => airo::cli::providers::execute(config, format, pretty),
        Commands::Run(args) => airo::cli::run::execute(args, config, format, pretty).await,
    }
}
