//! Logcat Parsing
//!
//! Parses logs collected with `logcat -d` for display. Pass/fail decisions
//! never look at parsed entries, see `markers`.

use serde::{Deserialize, Serialize};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
    Silent,
}

impl LogLevel {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'V' => Some(LogLevel::Verbose),
            'D' => Some(LogLevel::Debug),
            'I' => Some(LogLevel::Info),
            'W' => Some(LogLevel::Warning),
            'E' => Some(LogLevel::Error),
            'F' => Some(LogLevel::Fatal),
            'S' => Some(LogLevel::Silent),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            LogLevel::Verbose => 'V',
            LogLevel::Debug => 'D',
            LogLevel::Info => 'I',
            LogLevel::Warning => 'W',
            LogLevel::Error => 'E',
            LogLevel::Fatal => 'F',
            LogLevel::Silent => 'S',
        }
    }
}

/// Parsed log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// `MM-DD HH:MM:SS.mmm`
    pub timestamp: String,
    pub pid: u32,
    pub tid: u32,
    pub level: LogLevel,
    pub tag: String,
    pub message: String,
}

impl LogEntry {
    /// Parse a logcat line (threadtime format)
    /// Format: MM-DD HH:MM:SS.mmm PID TID LEVEL TAG: MESSAGE
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let date = fields.next()?;
        let time = fields.next()?;
        let pid: u32 = fields.next()?.parse().ok()?;
        let tid: u32 = fields.next()?.parse().ok()?;
        let level_field = fields.next()?;
        if level_field.len() != 1 {
            return None;
        }
        let level = LogLevel::from_char(level_field.chars().next()?)?;

        // the prefix is digits and punctuation, so the first letter is the level
        let level_end = line.find(level_field)? + 1;
        let rest = line[level_end..].trim_start();
        let (tag, message) = match rest.find(": ") {
            Some(idx) => (rest[..idx].trim_end().to_string(), rest[idx + 2..].to_string()),
            None => (rest.trim_end_matches(':').trim_end().to_string(), String::new()),
        };

        Some(LogEntry {
            timestamp: format!("{} {}", date, time),
            pid,
            tid,
            level,
            tag,
            message,
        })
    }

    pub fn formatted(&self) -> String {
        format!(
            "{} {} {} {}/{}: {}",
            self.timestamp,
            self.pid,
            self.tid,
            self.level.as_char(),
            self.tag,
            self.message
        )
    }
}

/// Parse every recognizable line of a log dump
pub fn parse_logs(text: &str) -> Vec<LogEntry> {
    text.lines().filter_map(LogEntry::parse).collect()
}

/// Logcat filter
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub min_level: Option<LogLevel>,
    /// Exact tag matches; empty accepts every tag
    pub tags: Vec<String>,
    pub message_contains: Option<String>,
}

impl LogFilter {
    pub fn min_level(level: LogLevel) -> Self {
        Self {
            min_level: Some(level),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_message(mut self, needle: impl Into<String>) -> Self {
        self.message_contains = Some(needle.into());
        self
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(min) = self.min_level {
            if entry.level < min {
                return false;
            }
        }

        if !self.tags.is_empty() && !self.tags.contains(&entry.tag) {
            return false;
        }

        if let Some(ref needle) = self.message_contains {
            if !entry.message.contains(needle.as_str()) {
                return false;
            }
        }

        true
    }
}
