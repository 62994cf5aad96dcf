//! Structured logging
//!
//! Level, format and destination come from `LoggingConfig`; each can be overridden through the
//! `FLOWGATE_LOG*` environment variables. Command output owns stdout, so logs go to stderr
//! unless configured otherwise.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Full `EnvFilter` directive string; wins over every level setting
pub const ENV_LOG: &str = "FLOWGATE_LOG";
pub const ENV_LOG_FORMAT: &str = "FLOWGATE_LOG_FORMAT";
pub const ENV_LOG_OUTPUT: &str = "FLOWGATE_LOG_OUTPUT";
/// `module=level,module2=level` added on top of the configured level
pub const ENV_LOG_MODULES: &str = "FLOWGATE_LOG_MODULES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error or off
    pub level: String,
    /// text or json
    pub format: String,
    /// stdout, stderr, file or both
    pub output: String,
    /// Used when output is "file"
    pub file: PathBuf,
    /// ANSI colours for text logs on a terminal stream
    pub color: bool,
    /// Per-module levels, e.g. `flowgate::source::cache = "debug"`
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text.to_string(),
            output: LogOutput::Stderr.to_string(),
            file: PathBuf::from("flowgate.log"),
            color: true,
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ApiError::ConfigError(format!(
                "unknown log format \"{}\", expected text or json",
                other
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// stdout and stderr
    Both,
    File,
}

impl FromStr for LogOutput {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "both" => Ok(LogOutput::Both),
            "file" => Ok(LogOutput::File),
            other => Err(ApiError::ConfigError(format!(
                "unknown log output \"{}\", expected stdout, stderr, both or file",
                other
            ))),
        }
    }
}

impl fmt::Display for LogOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogOutput::Stdout => "stdout",
            LogOutput::Stderr => "stderr",
            LogOutput::Both => "both",
            LogOutput::File => "file",
        })
    }
}

/// Install the global subscriber
///
/// Environment variables take precedence over `config`, which takes precedence over
/// `LoggingConfig::default()`. Fails if a subscriber is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    let filter = env_filter(config)?;
    let format = env_override(ENV_LOG_FORMAT, &config.format)?;
    let output: LogOutput = env_override(ENV_LOG_OUTPUT, &config.output)?;
    let writer = make_writer(output, &config.file)?;
    let ansi = config.color && output != LogOutput::File;

    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);
    let registry = Registry::default().with(filter);
    let installed = match format {
        LogFormat::Json => registry.with(layer.json()).try_init(),
        LogFormat::Text => registry.with(layer.with_ansi(ansi)).try_init(),
    };
    installed.map_err(|e| ApiError::ConfigError(format!("failed to install logger: {}", e)))
}

/// Check the format and output names without installing anything
pub fn validate_config(config: &LoggingConfig) -> Result<(), String> {
    config
        .format
        .parse::<LogFormat>()
        .map_err(|e| e.to_string())?;
    config
        .output
        .parse::<LogOutput>()
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// The environment value when set and non-empty, else the configured one
fn env_override<T: FromStr<Err = ApiError>>(var: &str, configured: &str) -> Result<T, ApiError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => value.parse(),
        _ => configured.parse(),
    }
}

fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env(ENV_LOG) {
        return Ok(filter);
    }
    if config.level.eq_ignore_ascii_case("off") {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(&config.level);
    for (module, level) in &config.modules {
        filter = filter.add_directive(module_directive(module, level)?);
    }
    if let Ok(raw) = std::env::var(ENV_LOG_MODULES) {
        for (module, level) in raw.split(',').filter_map(|term| term.split_once('=')) {
            filter = filter.add_directive(module_directive(module, level)?);
        }
    }
    Ok(filter)
}

fn module_directive(module: &str, level: &str) -> Result<Directive, ApiError> {
    format!("{}={}", module.trim(), level.trim())
        .parse()
        .map_err(|e| ApiError::ConfigError(format!("invalid log directive for {}: {}", module, e)))
}

fn make_writer(output: LogOutput, file: &Path) -> Result<BoxMakeWriter, ApiError> {
    Ok(match output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::Both => BoxMakeWriter::new(std::io::stdout.and(std::io::stderr)),
        LogOutput::File => {
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ApiError::ConfigError(format!(
                        "failed to create log directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            let handle = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .map_err(|e| {
                    ApiError::ConfigError(format!(
                        "failed to open log file {}: {}",
                        file.display(),
                        e
                    ))
                })?;
            BoxMakeWriter::new(std::sync::Mutex::new(handle))
        }
    })
}
