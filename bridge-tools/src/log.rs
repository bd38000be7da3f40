//! The `log` capability: guest and tool-call log lines routed into `tracing`.

use std::collections::VecDeque;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use bridge_primitives::{
    CapabilityDescriptor, CapabilityDescriptorBuilder, CapabilityName, ParamKind, ParamSpec,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::registry::{Capability, CapabilityError, CapabilityResult};

/// Registered name of the log capability.
pub const NAME: &str = "log";

/// `tracing` target used for forwarded log lines.
pub const TARGET: &str = "capbridge::guest";

const DEFAULT_HISTORY: usize = 256;

/// Severity attached to a forwarded log line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Very fine-grained diagnostics.
    Trace,
    /// Debugging detail.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Something unexpected that the caller recovered from.
    Warn,
    /// A failure.
    Error,
}

impl FromStr for LogLevel {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(CapabilityError::invalid_arguments(format!(
                "unknown log level `{other}`"
            ))),
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// A log line observed by the capability.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogRecord {
    /// Severity of the line.
    pub level: LogLevel,
    /// Message text exactly as received.
    pub message: String,
}

/// Forwards messages to `tracing` and keeps a bounded history of recent lines.
#[derive(Debug)]
pub struct LogCapability {
    capacity: usize,
    history: Mutex<VecDeque<LogRecord>>,
}

impl Default for LogCapability {
    fn default() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }
}

impl LogCapability {
    /// Creates a log capability retaining up to `capacity` recent records.
    ///
    /// A capacity of zero disables the history.
    #[must_use]
    pub fn with_history(capacity: usize) -> Self {
        Self {
            capacity,
            history: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY))),
        }
    }

    /// Describes the capability for registration and discovery.
    ///
    /// # Errors
    ///
    /// Propagates descriptor validation failures.
    pub fn descriptor() -> bridge_primitives::Result<CapabilityDescriptor> {
        CapabilityDescriptor::builder(CapabilityName::new(NAME)?)
            .description("Write a message to the host log")?
            .param(
                ParamSpec::required("message", ParamKind::String)?
                    .with_description("Text to log"),
            )?
            .param(
                ParamSpec::optional("level", ParamKind::String)?
                    .with_description("One of trace, debug, info, warn, error (default info)"),
            )
            .and_then(CapabilityDescriptorBuilder::build)
    }

    /// Emits a message and records it in the history.
    pub fn emit(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Trace => trace!(target: TARGET, "{message}"),
            LogLevel::Debug => debug!(target: TARGET, "{message}"),
            LogLevel::Info => info!(target: TARGET, "{message}"),
            LogLevel::Warn => warn!(target: TARGET, "{message}"),
            LogLevel::Error => error!(target: TARGET, "{message}"),
        }

        if self.capacity == 0 {
            return;
        }
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push_back(LogRecord {
            level,
            message: message.to_owned(),
        });
        while history.len() > self.capacity {
            history.pop_front();
        }
    }

    /// Returns the most recent records up to the requested limit, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<LogRecord> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}

impl Capability for LogCapability {
    fn invoke(&self, arguments: Value) -> CapabilityResult<Value> {
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| CapabilityError::invalid_arguments("`message` must be a string"))?;
        let level = match arguments.get("level").and_then(Value::as_str) {
            Some(level) => level.parse()?,
            None => LogLevel::default(),
        };

        self.emit(level, message);
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_messages_verbatim() {
        let log = LogCapability::with_history(4);
        log.invoke(json!({ "message": "héllo, guest" })).unwrap();
        log.invoke(json!({ "message": "careful", "level": "WARN" }))
            .unwrap();

        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "héllo, guest");
        assert_eq!(recent[0].level, LogLevel::Info);
        assert_eq!(recent[1].level, LogLevel::Warn);
    }

    #[test]
    fn history_is_bounded() {
        let log = LogCapability::with_history(2);
        for message in ["one", "two", "three"] {
            log.emit(LogLevel::Info, message);
        }

        let recent: Vec<_> = log.recent(10).into_iter().map(|r| r.message).collect();
        assert_eq!(recent, ["two", "three"]);
        assert_eq!(log.recent(1)[0].message, "three");
    }

    #[test]
    fn unknown_level_is_rejected() {
        let log = LogCapability::default();
        let err = log
            .invoke(json!({ "message": "x", "level": "loud" }))
            .expect_err("unknown level");
        assert!(matches!(err, CapabilityError::InvalidArguments { .. }));
        assert!(log.recent(1).is_empty());
    }

    #[test]
    fn descriptor_requires_message() {
        let descriptor = LogCapability::descriptor().unwrap();
        assert_eq!(descriptor.name().as_str(), NAME);
        assert_eq!(descriptor.input_schema()["required"], json!(["message"]));
    }
}
