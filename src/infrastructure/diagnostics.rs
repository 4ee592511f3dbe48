//! Process-wide diagnostics handler for the I/O adapters.
//!
//! Adapters report service exceptions, skipped geometries and similar events
//! here with a severity class. The handler only logs; callers decide on
//! control flow themselves.

use log::Level;
use std::fmt;

pub const TARGET: &str = "wfs_extract::diagnostics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    None,
    Debug,
    Warning,
    Failure,
    Fatal,
}

impl Severity {
    pub fn level(self) -> Level {
        match self {
            Severity::None => Level::Trace,
            Severity::Debug => Level::Debug,
            Severity::Warning => Level::Warn,
            Severity::Failure | Severity::Fatal => Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Flattens a multi-line library message onto one line.
pub fn normalize(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn emit(severity: Severity, code: i32, message: &str) {
    log::log!(
        target: TARGET,
        severity.level(),
        "[{}] ({}) {}",
        severity,
        code,
        normalize(message)
    );
}
