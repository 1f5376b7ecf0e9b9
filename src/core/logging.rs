//! Logging setup.
//!
//! Diagnostics go to stderr (or `AIRO_LOG_FILE`) so stdout stays reserved for
//! command output. Precedence for each setting: CLI flag, then environment,
//! then the default.
//!
//! | Variable          | Meaning                                      |
//! |-------------------|----------------------------------------------|
//! | `AIRO_LOG`        | level: trace, debug, info, warn, error       |
//! | `AIRO_LOG_FORMAT` | human, compact, json                         |
//! | `AIRO_LOG_FILE`   | append logs to this file instead of stderr   |
//! | `RUST_LOG`        | full `EnvFilter` directive, overrides level  |

use std::fs::OpenOptions;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const LOG_LEVEL_ENV: &str = "AIRO_LOG";
pub const LOG_FORMAT_ENV: &str = "AIRO_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "AIRO_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs (one event per line).
    Json,
    /// Compact logs (single line, terse).
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" => Some(Self::Human),
            "json" | "jsonl" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from CLI argument or environment.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "verbose" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "critical" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Level from `AIRO_LOG`.
#[must_use]
pub fn log_level_from_env() -> Option<LogLevel> {
    env_value(LOG_LEVEL_ENV).and_then(|v| LogLevel::from_arg(&v))
}

/// Format from `AIRO_LOG_FORMAT`.
#[must_use]
pub fn log_format_from_env() -> Option<LogFormat> {
    env_value(LOG_FORMAT_ENV).and_then(|v| LogFormat::from_arg(&v))
}

/// File from `AIRO_LOG_FILE`.
#[must_use]
pub fn log_file_from_env() -> Option<PathBuf> {
    env_value(LOG_FILE_ENV).map(PathBuf::from)
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Combine CLI flags with the environment.
    ///
    /// `verbose` raises the default level to debug; `json_output` selects JSON
    /// logs unless a format is given explicitly in the environment.
    #[must_use]
    pub fn resolve(cli_level: Option<LogLevel>, json_output: bool, verbose: bool) -> Self {
        let level = cli_level
            .or_else(log_level_from_env)
            .unwrap_or(if verbose { LogLevel::Debug } else { LogLevel::default() });
        let format = log_format_from_env().unwrap_or(if json_output {
            LogFormat::Json
        } else {
            LogFormat::Human
        });
        Self {
            level,
            format,
            file: log_file_from_env(),
        }
    }
}

/// Install the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init(settings: &LogSettings) {
    let file = settings.file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    let writer = || -> BoxMakeWriter {
        match file.as_ref().and_then(|f| f.try_clone().ok()) {
            Some(file) => BoxMakeWriter::new(file),
            None => BoxMakeWriter::new(std::io::stderr),
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("airo={}", settings.level.as_filter())));

    match settings.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_current_span(false)
                .with_writer(writer())
                .try_init()
                .ok();
        }
        LogFormat::Compact => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .with_writer(writer())
                .with_target(true)
                .try_init()
                .ok();
        }
        LogFormat::Human => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer())
                .with_target(false)
                .without_time()
                .try_init()
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[allow(unsafe_code)]
    fn with_env_var(key: &str, value: &str, f: impl FnOnce()) {
        let _guard = ENV_LOCK.lock().unwrap();
        let prior = std::env::var(key).ok();
        unsafe {
            std::env::set_var(key, value);
        }
        f();
        match prior {
            Some(val) => unsafe {
                std::env::set_var(key, val);
            },
            None => unsafe {
                std::env::remove_var(key);
            },
        }
    }

    #[test]
    fn env_level_is_parsed() {
        with_env_var(LOG_LEVEL_ENV, "trace", || {
            assert_eq!(log_level_from_env(), Some(LogLevel::Trace));
        });
        with_env_var(LOG_LEVEL_ENV, "  ", || {
            assert_eq!(log_level_from_env(), None);
        });
    }

    #[test]
    fn cli_level_beats_env() {
        with_env_var(LOG_LEVEL_ENV, "error", || {
            let settings = LogSettings::resolve(Some(LogLevel::Info), false, false);
            assert_eq!(settings.level, LogLevel::Info);
            let settings = LogSettings::resolve(None, false, true);
            assert_eq!(settings.level, LogLevel::Error);
        });
    }

    #[test]
    fn json_output_selects_json_format() {
        let _guard = ENV_LOCK.lock().unwrap();
        if std::env::var(LOG_FORMAT_ENV).is_err() {
            assert_eq!(LogSettings::resolve(None, true, false).format, LogFormat::Json);
        }
    }

    #[test]
    fn format_aliases() {
        assert_eq!(LogFormat::from_arg("JSONL"), Some(LogFormat::Json));
        assert_eq!(LogFormat::from_arg("nope"), None);
        assert_eq!(LogLevel::from_arg("critical"), Some(LogLevel::Error));
    }
}
