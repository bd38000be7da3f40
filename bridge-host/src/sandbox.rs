//! wasmtime runner that links guest modules against a [`HostBridge`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use wasmtime::{
    Caller, Config, Engine, Extern, Instance, Linker, Module, Store, StoreLimits,
    StoreLimitsBuilder, Trap,
};

use crate::abi::{self, Status};
use crate::bridge::HostBridge;

/// Result alias for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Engine and store settings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SandboxConfig {
    /// Fuel granted to each run; `None` disables metering.
    pub fuel: Option<u64>,
    /// Upper bound on the guest's linear memory.
    pub max_memory_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            fuel: None,
            max_memory_bytes: 64 * 1024 * 1024,
        }
    }
}

/// What a guest run produced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GuestOutcome {
    /// Value returned by the entry point.
    pub exit_code: i32,
    /// Fuel spent, when metering is enabled.
    pub fuel_consumed: Option<u64>,
}

/// Errors raised while compiling, instantiating or running a guest.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The engine or linker could not be configured.
    #[error("sandbox setup failed: {reason}")]
    Setup {
        /// Diagnostic from wasmtime.
        reason: String,
    },

    /// The module bytes are neither valid wasm nor valid wat.
    #[error("guest module does not compile: {reason}")]
    Compile {
        /// Diagnostic from wasmtime.
        reason: String,
    },

    /// Imports could not be resolved or the start function failed.
    #[error("guest module cannot be instantiated: {reason}")]
    Instantiate {
        /// Diagnostic from wasmtime.
        reason: String,
    },

    /// The entry export is missing or is not `() -> i32`.
    #[error("guest does not export `{entry}` as () -> i32: {reason}")]
    MissingEntry {
        /// Requested export.
        entry: String,
        /// Diagnostic from wasmtime.
        reason: String,
    },

    /// The guest trapped, including running out of fuel.
    #[error("guest trapped in `{entry}`: {reason}")]
    Trap {
        /// Entry point that was running.
        entry: String,
        /// Trap code, when wasmtime reported one.
        trap: Option<Trap>,
        /// Full diagnostic.
        reason: String,
    },
}

impl SandboxError {
    /// Returns `true` when the guest exhausted its fuel budget.
    #[must_use]
    pub fn is_out_of_fuel(&self) -> bool {
        matches!(self, Self::Trap { trap: Some(Trap::OutOfFuel), .. })
    }
}

fn reason(err: &wasmtime::Error) -> String {
    format!("{err:#}")
}

/// Per-run store data.
struct RunState {
    bridge: Arc<HostBridge>,
    limits: StoreLimits,
}

/// Compiles and runs guest modules against a shared bridge.
///
/// Each run gets a fresh [`Store`], so one guest can never observe another's
/// memory. Capability state lives in the registry and is shared.
pub struct Sandbox {
    engine: Engine,
    linker: Linker<RunState>,
    bridge: Arc<HostBridge>,
    config: SandboxConfig,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Sandbox {
    /// Builds an engine and a linker exposing the bridge's host functions.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Setup`] when wasmtime rejects the configuration.
    pub fn new(bridge: Arc<HostBridge>, config: &SandboxConfig) -> SandboxResult<Self> {
        let mut engine_config = Config::new();
        engine_config.consume_fuel(config.fuel.is_some());
        let engine = Engine::new(&engine_config).map_err(|err| SandboxError::Setup {
            reason: reason(&err),
        })?;

        let mut linker = Linker::new(&engine);
        add_to_linker(&mut linker, |state: &RunState| state.bridge.as_ref()).map_err(|err| {
            SandboxError::Setup {
                reason: reason(&err),
            }
        })?;

        Ok(Self {
            engine,
            linker,
            bridge,
            config: *config,
        })
    }

    /// Returns the bridge shared by every run.
    #[must_use]
    pub fn bridge(&self) -> &Arc<HostBridge> {
        &self.bridge
    }

    /// Returns the engine, e.g. for precompiling modules.
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compiles a binary module or its text format.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Compile`] for invalid input.
    pub fn compile(&self, bytes: &[u8]) -> SandboxResult<Module> {
        Module::new(&self.engine, bytes).map_err(|err| SandboxError::Compile {
            reason: reason(&err),
        })
    }

    /// Compiles `bytes` and runs the exported `entry`.
    ///
    /// # Errors
    ///
    /// See [`Sandbox::compile`] and [`Sandbox::run_module`].
    pub fn run(&self, bytes: &[u8], entry: &str) -> SandboxResult<GuestOutcome> {
        let module = self.compile(bytes)?;
        self.run_module(&module, entry)
    }

    /// Instantiates `module` in a fresh store and calls `entry: () -> i32`.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Instantiate`], [`SandboxError::MissingEntry`] or
    /// [`SandboxError::Trap`].
    pub fn run_module(&self, module: &Module, entry: &str) -> SandboxResult<GuestOutcome> {
        let limits = StoreLimitsBuilder::new()
            .memory_size(self.config.max_memory_bytes)
            .instances(1)
            .build();
        let mut store = Store::new(
            &self.engine,
            RunState {
                bridge: Arc::clone(&self.bridge),
                limits,
            },
        );
        store.limiter(|state| &mut state.limits);
        if let Some(fuel) = self.config.fuel {
            store.set_fuel(fuel).map_err(|err| SandboxError::Setup {
                reason: reason(&err),
            })?;
        }

        let instance: Instance =
            self.linker
                .instantiate(&mut store, module)
                .map_err(|err| SandboxError::Instantiate {
                    reason: reason(&err),
                })?;
        let func = instance
            .get_typed_func::<(), i32>(&mut store, entry)
            .map_err(|err| SandboxError::MissingEntry {
                entry: entry.to_owned(),
                reason: reason(&err),
            })?;

        debug!(entry, fuel = ?self.config.fuel, "running guest");
        let result = func.call(&mut store, ());
        let fuel_consumed = self
            .config
            .fuel
            .map(|budget| budget.saturating_sub(store.get_fuel().unwrap_or(0)));

        match result {
            Ok(exit_code) => {
                info!(entry, exit_code, ?fuel_consumed, "guest finished");
                Ok(GuestOutcome {
                    exit_code,
                    fuel_consumed,
                })
            }
            Err(err) => {
                let trap = err.downcast_ref::<Trap>().copied();
                warn!(entry, ?trap, ?fuel_consumed, error = %reason(&err), "guest trapped");
                Err(SandboxError::Trap {
                    entry: entry.to_owned(),
                    trap,
                    reason: reason(&err),
                })
            }
        }
    }
}

/// Registers the bridge's host functions under [`abi::MODULE`].
///
/// `bridge` projects the store data onto the bridge, which lets embedders keep
/// their own store type.
///
/// # Errors
///
/// Fails when one of the names is already defined in `linker`.
pub fn add_to_linker<T, F>(linker: &mut Linker<T>, bridge: F) -> wasmtime::Result<()>
where
    T: 'static,
    F: Fn(&T) -> &HostBridge + Send + Sync + Copy + 'static,
{
    linker.func_wrap(abi::MODULE, abi::BRIDGE_VERSION, || abi::ABI_VERSION)?;

    linker.func_wrap(
        abi::MODULE,
        abi::LOG,
        move |mut caller: Caller<'_, T>, ptr: u32, len: u32| -> u32 {
            with_memory(&mut caller, abi::LOG, |memory, state| {
                bridge(state).log(memory, ptr, len)
            })
        },
    )?;

    linker.func_wrap(
        abi::MODULE,
        abi::STATE_GET,
        move |mut caller: Caller<'_, T>, key_ptr: u32, key_len: u32, result_ptr: u32| -> u32 {
            with_memory(&mut caller, abi::STATE_GET, |memory, state| {
                bridge(state).state_get(memory, key_ptr, key_len, result_ptr)
            })
        },
    )?;

    linker.func_wrap(
        abi::MODULE,
        abi::STATE_SET,
        move |mut caller: Caller<'_, T>,
              key_ptr: u32,
              key_len: u32,
              value_ptr: u32,
              value_len: u32|
              -> u32 {
            with_memory(&mut caller, abi::STATE_SET, |memory, state| {
                bridge(state).state_set(memory, key_ptr, key_len, value_ptr, value_len)
            })
        },
    )?;

    Ok(())
}

fn with_memory<T>(
    caller: &mut Caller<'_, T>,
    entry: &'static str,
    call: impl FnOnce(&mut [u8], &T) -> u32,
) -> u32 {
    let Some(memory) = caller.get_export("memory").and_then(Extern::into_memory) else {
        warn!(entry, "guest exports no linear memory");
        return Status::Failure.into();
    };
    let (bytes, state) = memory.data_and_store_mut(caller);
    call(bytes, state)
}
