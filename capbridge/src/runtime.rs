use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_config::BridgeConfig;
use bridge_host::{BridgeLimits, HostBridge};
use bridge_tools::log::LogCapability;
use bridge_tools::mailbox::Mailbox;
use bridge_tools::state::StateStore;
use bridge_tools::{CapabilityRegistry, CapabilityResult, builtin};
use serde_json::Value;
use tracing::info;

/// Wires one registry into the sandbox bridge and the tool-call server.
#[derive(Debug)]
pub struct Runtime {
    config: BridgeConfig,
    registry: Arc<CapabilityRegistry>,
    state: Arc<StateStore>,
    log: Arc<LogCapability>,
    mailbox: Option<Arc<Mailbox>>,
    bridge: Arc<HostBridge>,
}

impl Runtime {
    /// Registers the built-ins and demo capabilities. Email tools are only
    /// registered when `mailbox.dir` is configured.
    ///
    /// # Errors
    ///
    /// Fails when the configuration does not validate or the mailbox directory
    /// cannot be opened.
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(CapabilityRegistry::new());
        let state = Arc::new(StateStore::new());
        let log = Arc::new(LogCapability::with_history(config.limits.log_history));
        builtin::install_core(&registry, &state, &log)?;

        let mailbox = match &config.mailbox.dir {
            Some(dir) => Some(Arc::new(Mailbox::open(dir).with_context(|| {
                format!("cannot open mailbox at {}", dir.display())
            })?)),
            None => None,
        };
        builtin::install_demo(&registry, mailbox.as_ref())?;

        let limits = BridgeLimits {
            max_log_bytes: config.limits.max_log_bytes,
            max_key_bytes: config.limits.max_key_bytes,
            max_value_bytes: config.limits.max_value_bytes,
        };
        let bridge = Arc::new(HostBridge::with_limits(Arc::clone(&registry), limits));

        info!(capabilities = registry.len(), "runtime ready");
        Ok(Self {
            config: config.clone(),
            registry,
            state,
            log,
            mailbox,
            bridge,
        })
    }

    /// Configuration the runtime was built from.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Backing store of `state_get`/`state_set`.
    #[must_use]
    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// The `log` capability, for inspecting recent lines.
    #[must_use]
    pub fn log(&self) -> &Arc<LogCapability> {
        &self.log
    }

    /// The mailbox, when configured.
    #[must_use]
    pub fn mailbox(&self) -> Option<&Arc<Mailbox>> {
        self.mailbox.as_ref()
    }

    /// The host bridge used by sandboxed guests.
    #[must_use]
    pub fn bridge(&self) -> &Arc<HostBridge> {
        &self.bridge
    }

    /// Calls a capability in-process.
    ///
    /// # Errors
    ///
    /// Propagates the registry's error.
    pub fn call(&self, name: &str, arguments: Value) -> CapabilityResult<Value> {
        self.registry.call(name, arguments)
    }

    /// A tool-call handler serving the shared registry.
    #[cfg(feature = "rpc")]
    #[must_use]
    pub fn tool_handler(&self) -> bridge_rpc::ToolCallHandler {
        bridge_rpc::ToolCallHandler::new(Arc::clone(&self.registry))
    }

    /// Server settings derived from `[server]`.
    ///
    /// # Errors
    ///
    /// Fails when `max_concurrency` is zero.
    #[cfg(feature = "rpc")]
    pub fn server_config(&self) -> Result<bridge_rpc::ServerConfig> {
        let server = &self.config.server;
        Ok(bridge_rpc::ServerConfig {
            listen: server.listen,
            path: server.path.clone(),
            max_body_bytes: server.max_body_bytes,
            max_concurrency: std::num::NonZeroUsize::new(server.max_concurrency)
                .context("server.max_concurrency must be at least 1")?,
        })
    }

    /// Starts the tool-call server on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails when the listen address cannot be bound.
    #[cfg(feature = "rpc")]
    pub fn serve(&self) -> Result<bridge_rpc::ServerHandle> {
        let server = bridge_rpc::ToolCallServer::new(self.tool_handler(), self.server_config()?);
        Ok(server.start()?)
    }

    /// A sandbox whose guests call into the shared registry.
    ///
    /// # Errors
    ///
    /// Fails when wasmtime rejects the engine configuration.
    #[cfg(feature = "wasmtime")]
    pub fn sandbox(&self) -> Result<bridge_host::Sandbox> {
        let config = bridge_host::SandboxConfig {
            fuel: self.config.sandbox.fuel,
            max_memory_bytes: self.config.sandbox.max_memory_bytes,
        };
        Ok(bridge_host::Sandbox::new(Arc::clone(&self.bridge), &config)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registers_core_and_demo_capabilities() {
        let runtime = Runtime::new(&BridgeConfig::default()).unwrap();
        let names = runtime.registry().names();
        for name in ["log", "state_get", "state_set", "echo", "array_sum"] {
            assert!(names.iter().any(|n| n == name), "{name} missing");
        }
        assert!(!runtime.registry().contains("email_send"));
        assert!(runtime.mailbox().is_none());
    }

    #[test]
    fn mailbox_tools_follow_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BridgeConfig::default();
        config.mailbox.dir = Some(dir.path().to_path_buf());

        let runtime = Runtime::new(&config).unwrap();
        let sent = runtime
            .call(
                "email_send",
                json!({ "to": "a@example.com", "subject": "s", "body": "b" }),
            )
            .unwrap();
        assert_eq!(sent["status"], "sent");
        assert_eq!(runtime.mailbox().unwrap().outbox().unwrap().len(), 1);
    }

    #[test]
    fn limits_flow_into_the_bridge() {
        let mut config = BridgeConfig::default();
        config.limits.max_key_bytes = 8;
        let runtime = Runtime::new(&config).unwrap();
        assert_eq!(runtime.bridge().limits().max_key_bytes, 8);
    }

    #[test]
    fn bridge_entry_points_reach_shared_state() {
        let runtime = Runtime::new(&BridgeConfig::default()).unwrap();
        let mut memory = vec![0_u8; 64];
        memory[..1].copy_from_slice(b"k");
        memory[8..10].copy_from_slice(b"v1");

        assert_eq!(runtime.bridge().state_set(&memory, 0, 1, 8, 2), 1);
        assert_eq!(runtime.state().get("k").as_deref(), Some("v1"));

        memory[16..20].copy_from_slice(&16_u32.to_le_bytes());
        assert_eq!(runtime.bridge().state_get(&mut memory, 0, 1, 16), 1);
        assert_eq!(&memory[20..24], &4_u32.to_le_bytes());
        assert_eq!(&memory[24..28], b"\"v1\"");
    }

    #[cfg(feature = "wasmtime")]
    #[test]
    fn sandbox_uses_configured_fuel() {
        let mut config = BridgeConfig::default();
        config.sandbox.fuel = Some(50_000);
        let runtime = Runtime::new(&config).unwrap();
        let outcome = runtime
            .sandbox()
            .unwrap()
            .run(br#"(module (func (export "run") (result i32) i32.const 7))"#, "run")
            .unwrap();
        assert_eq!(outcome.exit_code, 7);
        assert!(outcome.fuel_consumed.is_some());
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut config = BridgeConfig::default();
        config.server.path = "rpc".to_owned();
        assert!(Runtime::new(&config).is_err());
    }
}
