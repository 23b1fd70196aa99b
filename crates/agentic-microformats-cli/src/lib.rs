//! AgenticMicroformats CLI — inspect agent-readable pages from the terminal.

pub mod commands;
pub mod config;
pub mod repl;

pub use commands::Page;
pub use config::{resolve_file, resolve_format, resolve_log_level, OutputFormat};
