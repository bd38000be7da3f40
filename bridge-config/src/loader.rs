//! Layered configuration loading.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::debug;

use crate::schema::{BridgeConfig, LogFormat};

/// Overrides `server.listen`.
pub const ENV_LISTEN: &str = "CAPBRIDGE_LISTEN";
/// Overrides `server.path`.
pub const ENV_RPC_PATH: &str = "CAPBRIDGE_RPC_PATH";
/// Overrides `sandbox.fuel`; `off` or an empty value disables metering.
pub const ENV_FUEL: &str = "CAPBRIDGE_FUEL";
/// Overrides `mailbox.dir`.
pub const ENV_MAILBOX_DIR: &str = "CAPBRIDGE_MAILBOX_DIR";
/// Overrides `telemetry.filter`.
pub const ENV_LOG: &str = "CAPBRIDGE_LOG";
/// Overrides `telemetry.format`.
pub const ENV_LOG_FORMAT: &str = "CAPBRIDGE_LOG_FORMAT";

/// Loads configuration from `path` (if any) and the process environment.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed, an environment value is
/// malformed, or the result does not validate.
pub fn load(path: Option<&Path>) -> Result<BridgeConfig> {
    let env: HashMap<String, String> = std::env::vars().collect();
    load_with_env(path, &env)
}

/// Like [`load`], reading overrides from `env` instead of the process
/// environment.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env<S: BuildHasher>(
    path: Option<&Path>,
    env: &HashMap<String, String, S>,
) -> Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => from_file(path)?,
        None => BridgeConfig::default(),
    };
    let applied = apply_env(&mut config, env)?;
    debug!(file = ?path, env_overrides = applied, "configuration loaded");
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Parses a TOML file. Missing sections and keys keep their defaults.
///
/// # Errors
///
/// Fails when the file cannot be read or is not valid configuration TOML.
pub fn from_file(path: &Path) -> Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    from_toml_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
}

/// Parses configuration TOML.
///
/// # Errors
///
/// Fails on syntax errors, unknown keys and mistyped values.
pub fn from_toml_str(raw: &str) -> Result<BridgeConfig> {
    Ok(toml::from_str(raw)?)
}

/// Applies `CAPBRIDGE_*` overrides and returns how many were set.
///
/// # Errors
///
/// Fails when a variable holds a value of the wrong shape.
pub fn apply_env<S: BuildHasher>(
    config: &mut BridgeConfig,
    env: &HashMap<String, String, S>,
) -> Result<usize> {
    let mut applied = 0;
    let mut var = |name: &str| {
        let value = env.get(name).map(|value| value.trim().to_owned());
        if value.is_some() {
            applied += 1;
        }
        value
    };

    if let Some(listen) = var(ENV_LISTEN) {
        config.server.listen = parse(ENV_LISTEN, &listen)?;
    }
    if let Some(path) = var(ENV_RPC_PATH) {
        config.server.path = path;
    }
    if let Some(fuel) = var(ENV_FUEL) {
        config.sandbox.fuel = match fuel.as_str() {
            "" | "off" | "none" => None,
            value => Some(parse(ENV_FUEL, value)?),
        };
    }
    if let Some(dir) = var(ENV_MAILBOX_DIR) {
        config.mailbox.dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
    }
    if let Some(filter) = var(ENV_LOG) {
        config.telemetry.filter = filter;
    }
    if let Some(format) = var(ENV_LOG_FORMAT) {
        config.telemetry.format = parse::<LogFormat>(ENV_LOG_FORMAT, &format)?;
    }

    Ok(applied)
}

fn parse<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|err| anyhow::anyhow!("{err}"))
        .with_context(|| format!("invalid {name} value `{value}`"))
}
