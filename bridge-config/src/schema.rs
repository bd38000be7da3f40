//! Strongly typed configuration schema.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Result, bail, ensure};
use serde::{Deserialize, Serialize};

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Tool-call server.
    pub server: ServerSection,
    /// wasmtime sandbox.
    pub sandbox: SandboxSection,
    /// Host-call and logging limits.
    pub limits: LimitsSection,
    /// Log output.
    pub telemetry: TelemetrySection,
    /// Demo mailbox.
    pub mailbox: MailboxSection,
}

impl BridgeConfig {
    /// Checks cross-field constraints the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.server.max_concurrency > 0,
            "server.max_concurrency must be at least 1"
        );
        ensure!(
            self.server.max_body_bytes > 0,
            "server.max_body_bytes must be at least 1"
        );
        ensure!(
            self.server.path.starts_with('/'),
            "server.path must start with `/`, got `{}`",
            self.server.path
        );
        ensure!(
            self.sandbox.max_memory_bytes > 0,
            "sandbox.max_memory_bytes must be at least 1"
        );
        Ok(())
    }
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Listen address.
    pub listen: SocketAddr,
    /// JSON-RPC path.
    pub path: String,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Requests dispatched at once.
    pub max_concurrency: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8787)),
            path: "/rpc".to_owned(),
            max_body_bytes: 1024 * 1024,
            max_concurrency: 64,
        }
    }
}

/// `[sandbox]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxSection {
    /// Fuel per guest run; omitted means unmetered.
    pub fuel: Option<u64>,
    /// Guest linear memory cap.
    pub max_memory_bytes: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            fuel: None,
            max_memory_bytes: 64 * 1024 * 1024,
        }
    }
}

/// `[limits]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsSection {
    /// Largest guest log message.
    pub max_log_bytes: u32,
    /// Largest state key.
    pub max_key_bytes: u32,
    /// Largest state value.
    pub max_value_bytes: u32,
    /// Log records kept for inspection.
    pub log_history: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_log_bytes: 64 * 1024,
            max_key_bytes: 4 * 1024,
            max_value_bytes: 1024 * 1024,
            log_history: 256,
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => bail!("unknown log format `{other}`; expected pretty or json"),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

/// `[telemetry]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetrySection {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            format: LogFormat::Pretty,
        }
    }
}

/// `[mailbox]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MailboxSection {
    /// Directory holding `inbox.json` and `outbox.json`. Email tools are only
    /// registered when set.
    pub dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BridgeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.listen.port(), 8787);
        assert_eq!(config.server.path, "/rpc");
        assert_eq!(config.sandbox.fuel, None);
        assert_eq!(config.limits.max_value_bytes, 1_048_576);
    }

    #[test]
    fn validation_names_the_setting() {
        let mut config = BridgeConfig::default();
        config.server.path = "rpc".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.path"));

        let mut config = BridgeConfig::default();
        config.server.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.sandbox.max_memory_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
