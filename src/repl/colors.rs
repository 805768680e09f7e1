//! ANSI color helpers for pretty terminal output.
//!
//! Simple, tasteful colors that work on most terminals.

/// ANSI escape codes
pub mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const ITALIC: &str = "\x1b[3m";

    // Colors
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const MAGENTA: &str = "\x1b[35m";
    pub const CYAN: &str = "\x1b[36m";
    pub const WHITE: &str = "\x1b[37m";
    pub const GRAY: &str = "\x1b[90m";

    // Bright variants
    pub const BRIGHT_GREEN: &str = "\x1b[92m";
    pub const BRIGHT_CYAN: &str = "\x1b[96m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const BRIGHT_BLUE: &str = "\x1b[94m";
    pub const BRIGHT_MAGENTA: &str = "\x1b[95m";
}

use ansi::*;

/// Resolve a participant's configured color name to its escape code.
/// Unknown names fall back to plain white rather than failing — a typo
/// in a config file should never stop the assistant from starting.
fn resolve_color(name: &str) -> &'static str {
    match name {
        "red" => RED,
        "green" => GREEN,
        "yellow" => YELLOW,
        "blue" => BLUE,
        "magenta" => MAGENTA,
        "cyan" => CYAN,
        "gray" | "grey" => GRAY,
        "bright_green" => BRIGHT_GREEN,
        "bright_cyan" => BRIGHT_CYAN,
        "bright_yellow" => BRIGHT_YELLOW,
        "bright_blue" => BRIGHT_BLUE,
        "bright_magenta" => BRIGHT_MAGENTA,
        _ => WHITE,
    }
}

/// Format a participant's display name in its configured color.
pub fn participant_name(display_name: &str, color: &str) -> String {
    format!("{}{}{}{}", BOLD, resolve_color(color), display_name, RESET)
}

/// Format a participant's streamed response text in its configured
/// color, dimmed slightly so it reads as prose rather than a label.
pub fn participant_text(text: &str, color: &str) -> String {
    format!("{}{}{}", resolve_color(color), text, RESET)
}

/// Format a tool name (cyan, bold)
pub fn tool_name(name: &str) -> String {
    format!("{}{}{}{}", BOLD, CYAN, name, RESET)
}

/// Format a tool result preview (dim)
pub fn tool_result(result: &str) -> String {
    format!("{}{}{}", DIM, result, RESET)
}

/// Format a success message (green)
pub fn success(msg: &str) -> String {
    format!("{}{}{}", GREEN, msg, RESET)
}

/// Format an error message (red)
pub fn error(msg: &str) -> String {
    format!("{}{}{}", RED, msg, RESET)
}

/// Format a warning message (yellow)
pub fn warning(msg: &str) -> String {
    format!("{}{}{}", YELLOW, msg, RESET)
}

/// Format a status/info message (gray/dim)
pub fn status(msg: &str) -> String {
    format!("{}{}{}", GRAY, msg, RESET)
}

/// Format a file path (blue)
pub fn file_path(path: &str) -> String {
    format!("{}{}{}", BLUE, path, RESET)
}

/// Format a header (bold)
pub fn header(msg: &str) -> String {
    format!("{}{}{}", BOLD, msg, RESET)
}

/// Format the prompt
pub fn prompt() -> String {
    format!("{}{}>>> {}", BOLD, MAGENTA, RESET)
}

/// Format the continuation prompt
pub fn continuation_prompt() -> String {
    format!("{}{}... {}", BOLD, MAGENTA, RESET)
}

/// Format a "thinking"/evaluating indicator for a participant that has
/// not yet decided whether it will speak.
pub fn evaluating(display_name: &str) -> String {
    format!("{}[{} is thinking...]{}", DIM, display_name, RESET)
}

/// Format token usage
pub fn tokens(input: u64, output: u64, cached_pct: Option<u64>) -> String {
    let cache_str = cached_pct
        .map(|p| format!(", {}% cached", p))
        .unwrap_or_default();
    format!(
        "{}[tokens: {} in / {} out{}]{}",
        DIM, input, output, cache_str, RESET
    )
}

/// Format a horizontal separator
pub fn separator(width: usize) -> String {
    format!("{}{}{}", DIM, "─".repeat(width), RESET)
}

/// Format startup banner line
pub fn banner_line(label: &str, value: &str) -> String {
    format!("{}{:<12}{} {}", DIM, label, RESET, value)
}

/// Format startup banner with accent
pub fn banner_accent(text: &str) -> String {
    format!("{}{}{}{}", BOLD, MAGENTA, text, RESET)
}
