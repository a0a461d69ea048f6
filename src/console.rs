//! Operator-facing status lines.
//!
//! Every pipeline sub-step reports through a [`Console`], which prints a
//! timestamped, colored line and keeps the entry so the run can be inspected
//! afterwards.

use crossterm::style::{Color, Stylize};

/// Unicode symbols used in status lines.
pub mod symbols {
    pub const SUCCESS: &str = "\u{25cf}"; // ●
    pub const STEP: &str = "\u{25b6}"; // ▶
    pub const WARNING: &str = "\u{26a0}"; // ⚠
    pub const ERROR: &str = "\u{2717}"; // ✗
    pub const DETAIL: &str = "\u{2514}\u{2500}"; // └─
}

/// Color palette.
pub mod colors {
    use crossterm::style::Color;

    pub const TEXT_SECONDARY: Color = Color::DarkGrey;
    pub const SUCCESS: Color = Color::Green;
    pub const WARNING: Color = Color::Yellow;
    pub const ERROR: Color = Color::Red;
    pub const ACCENT: Color = Color::Cyan;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Step,
    Success,
    Warning,
    Error,
    /// Indented continuation line (command suggestions, report rows).
    Detail,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
    pub level: LogLevel,
}

impl LogEntry {
    fn new(message: impl Into<String>, level: LogLevel) -> Self {
        let now = chrono::Local::now();
        Self {
            timestamp: now.format("%H:%M:%S").to_string(),
            message: message.into(),
            level,
        }
    }

    fn render(&self) -> String {
        let (icon, color) = match self.level {
            LogLevel::Info => ("i", Color::Reset),
            LogLevel::Step => (symbols::STEP, colors::ACCENT),
            LogLevel::Success => (symbols::SUCCESS, colors::SUCCESS),
            LogLevel::Warning => (symbols::WARNING, colors::WARNING),
            LogLevel::Error => (symbols::ERROR, colors::ERROR),
            LogLevel::Detail => {
                return format!(
                    "            {} {}",
                    symbols::DETAIL.with(colors::TEXT_SECONDARY),
                    self.message
                )
            }
        };

        let message = if self.level == LogLevel::Step {
            self.message.clone().with(color).bold()
        } else {
            self.message.clone().with(color)
        };

        format!(
            "  {}  {}  {}",
            self.timestamp.clone().with(colors::TEXT_SECONDARY),
            icon.with(color),
            message
        )
    }
}

/// Collects status lines and (unless silent) prints them to stdout.
#[derive(Debug)]
pub struct Console {
    entries: Vec<LogEntry>,
    echo: bool,
}

impl Console {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            echo: true,
        }
    }

    /// A console that records without printing.
    pub fn silent() -> Self {
        Self {
            entries: Vec::new(),
            echo: false,
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(message, LogLevel::Info));
    }

    pub fn step(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(message, LogLevel::Step));
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(message, LogLevel::Success));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(message, LogLevel::Warning));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(message, LogLevel::Error));
    }

    pub fn detail(&mut self, message: impl Into<String>) {
        self.push(LogEntry::new(message, LogLevel::Detail));
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Whether any entry at `level` contains `needle`.
    #[cfg(test)]
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    fn push(&mut self, entry: LogEntry) {
        if self.echo {
            println!("{}", entry.render());
        }
        self.entries.push(entry);
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_console_records_levels_in_order() {
        let mut console = Console::silent();
        console.step("Stopping AP services");
        console.warning("hostapd: stop failed");
        console.success("done");

        let levels: Vec<LogLevel> = console.entries().iter().map(|e| e.level).collect();
        assert_eq!(
            levels,
            vec![LogLevel::Step, LogLevel::Warning, LogLevel::Success]
        );
        assert!(console.contains(LogLevel::Warning, "hostapd"));
        assert!(!console.contains(LogLevel::Error, "hostapd"));
    }

    #[test]
    fn test_render_keeps_message_text() {
        let entry = LogEntry::new("sudo dhclient -v eth0", LogLevel::Detail);
        assert!(entry.render().contains("sudo dhclient -v eth0"));
    }
}
