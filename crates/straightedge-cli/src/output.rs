//! Shared output layer for pretty/text/JSON parity across all CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its output
//! accordingly: pretty output for humans, compact text for agents, or stable JSON.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use straightedge_core::ErrorCode;
use straightedge_core::detection::SinkError;
use straightedge_core::event::StreamError;

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<34} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, visual framing).
    Pretty,
    /// Token-efficient plain text for agents and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Core resolution logic, separated from I/O for testability.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }

    if json_flag {
        return OutputMode::Json;
    }

    if let Some(val) = format_env {
        match val.to_lowercase().as_str() {
            "json" => return OutputMode::Json,
            "text" => return OutputMode::Text,
            "pretty" => return OutputMode::Pretty,
            _ => {} // unknown value: fall through to TTY detection
        }
    }

    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, and TTY defaults.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env_val = std::env::var("FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(format_flag, json_flag, env_val.as_deref(), is_tty)
}

/// Render a serializable value with explicit pretty/text renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Optional suggestion for how to fix the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (e.g. "E4001").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// Create a simple error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }

    fn with_code(mut self, code: ErrorCode) -> Self {
        self.suggestion = code.hint().map(str::to_string);
        self.error_code = Some(code.code().to_string());
        self
    }
}

/// Find the most specific [`ErrorCode`] along an error's cause chain.
fn error_code_of(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        if let Some(stream) = cause.downcast_ref::<StreamError>() {
            return Some(stream.code());
        }
        if cause.downcast_ref::<SinkError>().is_some() {
            return Some(ErrorCode::SinkWriteFailed);
        }
        ErrorCode::from_prefixed(&cause.to_string())
    })
}

impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        let error = Self::new(format!("{err:#}"));
        match error_code_of(err) {
            Some(code) => error.with_code(code),
            None => error,
        }
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "error: {}", error.message)?;
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Format a rate for humans; infinite rates read as "inf".
pub fn format_rate(rate: f64) -> String {
    if rate.is_infinite() {
        "inf".to_string()
    } else {
        format!("{rate:.1}")
    }
}
