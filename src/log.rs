//! Sequenced log lines shared by the import log and the game console.
//!
//! Ids start at 1 so `since = 0` returns everything.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::utils::current_timestamp;

/// Maximum number of console lines kept for a running game.
pub const DEFAULT_CONSOLE_BUFFER: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Sequential ID for polling (`?since=<id>`)
    pub id: u64,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    pub source: LogSource,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Stdout,
    Stderr,
    /// Messages from the importer itself
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

/// Append-only buffer with sequential ids. A bounded buffer evicts its oldest
/// line once full; an unbounded one keeps everything.
#[derive(Debug)]
pub struct LogBuffer {
    lines: VecDeque<LogLine>,
    next_id: u64,
    max_size: Option<usize>,
}

impl LogBuffer {
    pub fn unbounded() -> Self {
        Self {
            lines: VecDeque::new(),
            next_id: 1,
            max_size: None,
        }
    }

    pub fn bounded(max_size: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_size.min(1024)),
            next_id: 1,
            max_size: Some(max_size.max(1)),
        }
    }

    /// Push a new line and return a copy of it.
    pub fn push(&mut self, source: LogSource, level: LogLevel, message: String) -> LogLine {
        let line = LogLine {
            id: self.next_id,
            timestamp: current_timestamp(),
            source,
            level,
            message,
        };
        self.next_id += 1;

        if let Some(max) = self.max_size {
            if self.lines.len() >= max {
                self.lines.pop_front();
            }
        }
        self.lines.push_back(line.clone());
        line
    }

    /// All lines with id > `since_id`.
    pub fn get_since(&self, since_id: u64) -> Vec<LogLine> {
        self.lines
            .iter()
            .filter(|l| l.id > since_id)
            .cloned()
            .collect()
    }

    /// The most recent `count` lines, oldest first.
    pub fn get_recent(&self, count: usize) -> Vec<LogLine> {
        self.lines.iter().rev().take(count).rev().cloned().collect()
    }

    pub fn all(&self) -> Vec<LogLine> {
        self.lines.iter().cloned().collect()
    }
}

/// Classify a console line using an optional regex with a named `level` group.
/// Lines that do not match default to Info.
pub fn parse_log_level(line: &str, pattern: Option<&Regex>) -> LogLevel {
    if let Some(re) = pattern {
        if let Some(level_match) = re.captures(line).and_then(|caps| caps.name("level")) {
            return match level_match.as_str().to_uppercase().as_str() {
                "ERROR" | "FATAL" => LogLevel::Error,
                "WARN" | "WARNING" => LogLevel::Warn,
                "DEBUG" | "TRACE" => LogLevel::Debug,
                _ => LogLevel::Info,
            };
        }
    }
    LogLevel::Info
}
