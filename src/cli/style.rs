//! Terminal styling helpers

use indicatif::ProgressStyle;
use owo_colors::{OwoColorize, Stream};
use std::fmt::Display;

/// Success marker
pub const CHECK: &str = "✓";
/// Failure marker
pub const CROSS: &str = "✗";
/// Neutral marker
pub const DOT: &str = "·";

/// Semantic colors, applied only when stdout supports them
pub trait Stylize {
    /// Bold
    fn emphasis(&self) -> String;
    /// Cyan
    fn accent(&self) -> String;
    /// Dimmed
    fn muted(&self) -> String;
    /// Green
    fn success(&self) -> String;
    /// Yellow
    fn warn(&self) -> String;
    /// Red
    fn error(&self) -> String;
}

impl<T: Display> Stylize for T {
    fn emphasis(&self) -> String {
        self.if_supports_color(Stream::Stdout, |t| t.bold()).to_string()
    }

    fn accent(&self) -> String {
        self.if_supports_color(Stream::Stdout, |t| t.cyan()).to_string()
    }

    fn muted(&self) -> String {
        self.if_supports_color(Stream::Stdout, |t| t.dimmed()).to_string()
    }

    fn success(&self) -> String {
        self.if_supports_color(Stream::Stdout, |t| t.green()).to_string()
    }

    fn warn(&self) -> String {
        self.if_supports_color(Stream::Stdout, |t| t.yellow()).to_string()
    }

    fn error(&self) -> String {
        self.if_supports_color(Stream::Stdout, |t| t.red()).to_string()
    }
}

/// Green check mark
pub fn check() -> String {
    CHECK.success()
}

/// Red cross
pub fn cross() -> String {
    CROSS.error()
}

/// `text` as a clickable link when the terminal supports it
pub fn link(text: &str, url: &str) -> String {
    if !url.is_empty() && supports_hyperlinks::on(supports_hyperlinks::Stream::Stdout) {
        terminal_link::Link::new(text, url).to_string()
    } else {
        text.to_string()
    }
}

/// Spinner used while providers are queried
pub fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}
