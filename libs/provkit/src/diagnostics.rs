//! Diagnostics log - leveled entries a provider records about its own health.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

/// A single diagnostics entry. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub level: LogLevel,
    pub msg: String,
}

/// Append-only diagnostics log.
///
/// Entries are kept in call order for the lifetime of a provider instance.
/// Recording takes `&self` so that setup code and health checks can share the log.
#[derive(Debug, Default)]
pub struct Diagnostics {
    logs: RwLock<Vec<Log>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.push(LogLevel::Info, msg.into());
    }

    pub fn error(&self, msg: impl Into<String>) {
        self.push(LogLevel::Error, msg.into());
    }

    fn push(&self, level: LogLevel, msg: String) {
        match level {
            LogLevel::Info => tracing::debug!(%msg, "diagnostics: info"),
            LogLevel::Error => tracing::warn!(%msg, "diagnostics: error"),
        }
        self.logs.write().push(Log { level, msg });
    }

    /// True iff no entry has level `error`.
    pub fn has_no_errors(&self) -> bool {
        !self.logs.read().iter().any(|l| l.level == LogLevel::Error)
    }

    pub fn len(&self) -> usize {
        self.logs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.read().is_empty()
    }

    /// Returns the entries in call order as plain records for serialization.
    pub fn export(&self) -> Vec<Log> {
        self.logs.read().clone()
    }

    /// Independent copy of the log. Entries recorded on the fork do not reach `self`.
    pub fn fork(&self) -> Self {
        Self {
            logs: RwLock::new(self.export()),
        }
    }
}
