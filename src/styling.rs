//! Style constants and message formatting for terminal output.
//!
//! Styles are `anstyle::Style` constants used inline:
//! `format!("{ERROR}message{ERROR:#}")`. The `{:#}` alternate form renders
//! the reset sequence. Output goes through `anstream` so ANSI codes are
//! stripped automatically when stdout/stderr is not a terminal.

use anstyle::{AnsiColor, Color, Style};

/// Error style - use as `{ERROR}text{ERROR:#}`
pub const ERROR: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red)));

/// Bold error style for emphasized words inside error messages
pub const ERROR_BOLD: Style = Style::new()
    .fg_color(Some(Color::Ansi(AnsiColor::Red)))
    .bold();

/// Warning style - use as `{WARNING}text{WARNING:#}`
pub const WARNING: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));

/// Hint style - dimmed secondary text
pub const HINT: Style = Style::new().dimmed();

/// Success style
pub const GREEN: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green)));

/// Heading / emphasis style for status tables
pub const BOLD: Style = Style::new().bold();

/// Secondary value style for status tables
pub const CYAN: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan)));

pub const ERROR_EMOJI: &str = "❌";
pub const WARNING_EMOJI: &str = "🟡";
pub const HINT_EMOJI: &str = "💡";
pub const SUCCESS_EMOJI: &str = "✅";

/// Format an error message with emoji and red styling
pub fn format_error(msg: &str) -> String {
    format!("{ERROR_EMOJI} {ERROR}{msg}{ERROR:#}")
}

/// Format an error message with a bold middle segment:
/// `format_error_with_bold("Unknown profile '", name, "'")`
pub fn format_error_with_bold(prefix: &str, bold: &str, suffix: &str) -> String {
    format!("{ERROR_EMOJI} {ERROR}{prefix}{ERROR_BOLD}{bold}{ERROR_BOLD:#}{ERROR}{suffix}{ERROR:#}")
}

/// Format a warning message with emoji and yellow styling
pub fn format_warning(msg: &str) -> String {
    format!("{WARNING_EMOJI} {WARNING}{msg}{WARNING:#}")
}

/// Format a hint message with emoji and dim styling
pub fn format_hint(msg: &str) -> String {
    format!("{HINT_EMOJI} {HINT}{msg}{HINT:#}")
}

/// Format a success message with emoji and green styling
pub fn format_success(msg: &str) -> String {
    format!("{SUCCESS_EMOJI} {GREEN}{msg}{GREEN:#}")
}
