//! Human-facing status lines
//!
//! Colored, emoji-prefixed output. Colors are dropped when `NO_COLOR` is set.

use crossterm::style::{StyledContent, Stylize};
use std::fmt::Display;

fn color_enabled() -> bool {
    std::env::var_os("NO_COLOR").map_or(true, |v| v.is_empty())
}

fn paint<D: Display>(text: D, style: impl FnOnce(D) -> StyledContent<D>) -> String {
    if color_enabled() {
        style(text).to_string()
    } else {
        text.to_string()
    }
}

/// Bold rendering of a command line, for prompts and echoes
pub fn command(cmd: &str) -> String {
    paint(cmd, |c| c.bold().underlined())
}

pub fn info(message: impl Display) {
    println!("{}", paint(format!("ℹ️  {}", message), |m| m.cyan()));
}

pub fn warn(message: impl Display) {
    println!("{}", paint(format!("⚠️  {}", message), |m| m.yellow()));
}

pub fn success(message: impl Display) {
    println!("{}", paint(format!("✅ {}", message), |m| m.green()));
}

/// Errors go to stderr so they never mix with captured output
pub fn error(message: impl Display) {
    eprintln!("{}", paint(format!("❌ {}", message), |m| m.red()));
}

/// Plain backend text, printed as-is
pub fn plain(message: impl Display) {
    println!("{}", message);
}
