//! Diagnostics sink
//!
//! Everything the VM reports (lookup misses, empty-stack pops, `Trace`
//! output, uncaught exceptions) goes through the [`DiagnosticsSink`] handed to
//! it at construction. There is no global logger.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Severity of a diagnostic record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticLevel {
    Trace,
    Debug,
    /// Script `Trace` output
    Info,
    /// Recoverable oddities: lookup misses, empty-stack pops
    Warn,
    /// Uncaught exceptions
    Error,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticLevel::Trace => "trace",
            DiagnosticLevel::Debug => "debug",
            DiagnosticLevel::Info => "info",
            DiagnosticLevel::Warn => "warn",
            DiagnosticLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// Receiver for VM diagnostics.
pub trait DiagnosticsSink {
    /// Write a message at the specified level.
    fn write(&self, level: DiagnosticLevel, message: &str);

    /// Whether records at `level` are wanted; lets the VM skip formatting.
    fn enabled(&self, _level: DiagnosticLevel) -> bool {
        true
    }
}

/// Forwards diagnostics to `tracing` under the `avm` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn write(&self, level: DiagnosticLevel, message: &str) {
        match level {
            DiagnosticLevel::Trace => tracing::trace!(target: "avm", "{message}"),
            DiagnosticLevel::Debug => tracing::debug!(target: "avm", "{message}"),
            DiagnosticLevel::Info => tracing::info!(target: "avm", "{message}"),
            DiagnosticLevel::Warn => tracing::warn!(target: "avm", "{message}"),
            DiagnosticLevel::Error => tracing::error!(target: "avm", "{message}"),
        }
    }

    fn enabled(&self, level: DiagnosticLevel) -> bool {
        match level {
            DiagnosticLevel::Trace => tracing::enabled!(target: "avm", tracing::Level::TRACE),
            DiagnosticLevel::Debug => tracing::enabled!(target: "avm", tracing::Level::DEBUG),
            DiagnosticLevel::Info => tracing::enabled!(target: "avm", tracing::Level::INFO),
            DiagnosticLevel::Warn => tracing::enabled!(target: "avm", tracing::Level::WARN),
            DiagnosticLevel::Error => tracing::enabled!(target: "avm", tracing::Level::ERROR),
        }
    }
}

/// Discards all diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpDiagnostics;

impl DiagnosticsSink for NoOpDiagnostics {
    fn write(&self, _level: DiagnosticLevel, _message: &str) {}

    fn enabled(&self, _level: DiagnosticLevel) -> bool {
        false
    }
}

/// One collected diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub level: DiagnosticLevel,
    pub message: String,
}

/// Collects records in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryDiagnostics {
    records: Rc<RefCell<Vec<DiagnosticRecord>>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.records.borrow().clone()
    }

    /// Messages at exactly `level`
    pub fn messages(&self, level: DiagnosticLevel) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.level == level)
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl DiagnosticsSink for MemoryDiagnostics {
    fn write(&self, level: DiagnosticLevel, message: &str) {
        self.records.borrow_mut().push(DiagnosticRecord {
            level,
            message: message.to_string(),
        });
    }
}
