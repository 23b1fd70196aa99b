//! Configuration resolution: flag, then environment, then default.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const FILE_ENV: &str = "AMF_FILE";
pub const LOG_LEVEL_ENV: &str = "AMF_LOG_LEVEL";
pub const FORMAT_ENV: &str = "AMF_FORMAT";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Text,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "text" => Ok(OutputFormat::Text),
            other => anyhow::bail!("Unknown output format '{other}' (expected json or text)"),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Text => f.write_str("text"),
        }
    }
}

/// Resolve the input HTML file.
pub fn resolve_file(explicit: Option<&str>) -> Option<String> {
    if let Some(path) = explicit {
        return Some(path.to_string());
    }
    std::env::var(FILE_ENV).ok().filter(|p| !p.is_empty())
}

/// Resolve the log filter directive.
pub fn resolve_log_level(explicit: Option<&str>) -> String {
    if let Some(level) = explicit {
        return level.to_string();
    }
    std::env::var(LOG_LEVEL_ENV)
        .ok()
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// Resolve the output format.
pub fn resolve_format(explicit: Option<&str>) -> anyhow::Result<OutputFormat> {
    if let Some(format) = explicit {
        return format.parse();
    }
    match std::env::var(FORMAT_ENV) {
        Ok(format) if !format.is_empty() => format.parse(),
        _ => Ok(OutputFormat::default()),
    }
}

/// REPL history file under the home directory.
pub fn history_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".amf_history")
}
