//! # stdio
//!
//! Operator-facing terminal output for the enginecare manager.
//! Diagnostics go through `tracing`; this crate prints the short event lines
//! an operator watches while the worker scales up and down.
//!
//! ## Format
//!
//! ```text
//! ➜ TITLE: message
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use stdio::{Style, event};
//!
//! event("DEPLOY", "Provisioning new Docker container...", Style::Warning);
//! event("CONTAINER", "Worker is now Active", Style::Success);
//! ```
//!
//! ## Log Levels
//!
//! Control output with `LOG_LEVEL` environment variable:
//! - `error` - Errors only
//! - `info` - Default (lifecycle events)
//! - `debug` - Also show `System` events
//!
//! Colour is dropped when `NO_COLOR` is set or stderr is not a terminal.

use std::env;
use std::io::IsTerminal;
use std::sync::OnceLock;

const RESET: &str = "\x1b[0m";

/// Log level for operator output
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum LogLevel {
    Error = 0,
    Info = 1,
    Debug = 2,
}

impl LogLevel {
    fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }
}

/// Visual style of an event line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Style {
    Info,
    Warning,
    Error,
    Success,
    /// Low-importance housekeeping, only printed at `debug`.
    System,
}

impl Style {
    fn ansi(self) -> &'static str {
        match self {
            Style::Info => "\x1b[36m",
            Style::Warning => "\x1b[33m",
            Style::Error => "\x1b[1;31m",
            Style::Success => "\x1b[1;32m",
            Style::System => "\x1b[2;37m",
        }
    }

    fn min_level(self) -> LogLevel {
        match self {
            Style::Error => LogLevel::Error,
            Style::System => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }
}

static LOG_LEVEL: OnceLock<LogLevel> = OnceLock::new();
static COLOR: OnceLock<bool> = OnceLock::new();

fn emit_line(line: &str) {
    eprintln!("{}", line);
}

/// Get the current log level (cached from LOG_LEVEL env var)
pub fn log_level() -> LogLevel {
    *LOG_LEVEL.get_or_init(|| {
        env::var("LOG_LEVEL")
            .map(|s| LogLevel::from_str(&s))
            .unwrap_or(LogLevel::Info)
    })
}

fn color_enabled() -> bool {
    *COLOR.get_or_init(|| env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal())
}

/// Check if debug logging is enabled
pub fn is_debug() -> bool {
    log_level() >= LogLevel::Debug
}

/// Render an event line without printing it.
pub fn format_event(title: &str, message: &str, style: Style, color: bool) -> String {
    if color {
        format!("{}➜ {}:{} {}", style.ansi(), title, RESET, message)
    } else {
        format!("➜ {}: {}", title, message)
    }
}

/// Print a lifecycle event.
///
/// # Example
/// ```
/// stdio::event("AUTO-SCALING", "Container idle for 301s. Stopping...", stdio::Style::Warning);
/// // Output: ➜ AUTO-SCALING: Container idle for 301s. Stopping...
/// ```
pub fn event(title: &str, message: &str, style: Style) {
    if log_level() >= style.min_level() {
        emit_line(&format_event(title, message, style, color_enabled()));
    }
}

/// Shorthand for an `Info` event.
pub fn info(title: &str, message: &str) {
    event(title, message, Style::Info);
}

/// Shorthand for a `Warning` event.
pub fn warn(title: &str, message: &str) {
    event(title, message, Style::Warning);
}

/// Shorthand for an `Error` event. Always printed.
pub fn error(title: &str, message: &str) {
    event(title, message, Style::Error);
}

/// Shorthand for a `Success` event.
pub fn success(title: &str, message: &str) {
    event(title, message, Style::Success);
}

/// Shorthand for a `System` event (debug only).
pub fn system(message: &str) {
    event("SYSTEM", message, Style::System);
}

/// Render a boxed banner.
pub fn format_banner(title: &str, subtitle: &str) -> String {
    let width = title.chars().count().max(subtitle.chars().count()) + 2;
    let rule = "─".repeat(width);
    format!(
        "╭{rule}╮\n│ {title:<inner$} │\n│ {subtitle:<inner$} │\n╰{rule}╯",
        inner = width - 2
    )
}

/// Print the start-up banner.
pub fn banner(title: &str, subtitle: &str) {
    if log_level() < LogLevel::Info {
        return;
    }
    let text = format_banner(title, subtitle);
    if color_enabled() {
        emit_line(&format!("\x1b[1;34m{}{}", text, RESET));
    } else {
        emit_line(&text);
    }
}

/// Print a raw line (no formatting).
pub fn raw(message: &str) {
    emit_line(message);
}

/// Event with format string support
///
/// # Example
/// ```
/// stdio::eventf!("RESULT", stdio::Style::Success, "AI Predicted RUL: {} cycles", 112.4);
/// ```
#[macro_export]
macro_rules! eventf {
    ($title:expr, $style:expr, $($arg:tt)*) => {
        $crate::event($title, &format!($($arg)*), $style)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("error"), LogLevel::Error);
        assert_eq!(LogLevel::from_str("info"), LogLevel::Info);
        assert_eq!(LogLevel::from_str("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("DEBUG"), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_style_thresholds() {
        assert_eq!(Style::Error.min_level(), LogLevel::Error);
        assert_eq!(Style::Warning.min_level(), LogLevel::Info);
        assert_eq!(Style::System.min_level(), LogLevel::Debug);
    }

    #[test]
    fn plain_event_has_arrow_and_title() {
        let line = format_event("DEPLOY", "Container Successfully Deployed", Style::Success, false);
        assert_eq!(line, "➜ DEPLOY: Container Successfully Deployed");
    }

    #[test]
    fn colored_event_resets_after_title() {
        let line = format_event("COLD START", "waking", Style::Warning, true);
        assert!(line.starts_with("\x1b[33m➜ COLD START:"));
        assert!(line.ends_with("\x1b[0m waking"));
    }

    #[test]
    fn banner_pads_to_widest_line() {
        let text = format_banner("ENGINE CARE MANAGER", "Online");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        let widths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();
        assert!(widths.iter().all(|w| *w == widths[0]));
    }
}
