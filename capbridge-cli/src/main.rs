//! `capbridge` command-line front end.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use capbridge::Runtime;
use capbridge::config::{self, BridgeConfig};
use capbridge::rpc::ToolCallClient;
use capbridge::telemetry::CallTimer;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "capbridge",
    version,
    about = "Serve one capability registry to wasm guests and tool callers"
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, env = "CAPBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the JSON-RPC tool-call server until Ctrl-C.
    Serve,
    /// Execute a `.wasm` or `.wat` guest against the built-in capabilities.
    Run {
        /// Guest module.
        module: PathBuf,
        /// Exported `() -> i32` function to call.
        #[arg(long, default_value = "run")]
        entry: String,
    },
    /// Print the capability catalog.
    Tools,
    /// Call one capability, locally or on a remote server.
    Call {
        /// Capability name.
        name: String,
        /// Arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
        /// Remote JSON-RPC endpoint, e.g. `http://127.0.0.1:8787/rpc`.
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    capbridge::telemetry::init(&config.telemetry)?;

    match cli.command {
        Command::Serve => serve(&config).await,
        Command::Run { module, entry } => run(&config, &module, &entry),
        Command::Tools => tools(&config),
        Command::Call {
            name,
            args,
            endpoint,
        } => call(&config, &name, &args, endpoint.as_deref()).await,
    }
}

async fn serve(config: &BridgeConfig) -> Result<()> {
    let runtime = Runtime::new(config)?;
    let server = runtime.serve()?;
    info!(endpoint = %server.endpoint(), "press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl-C")?;
    info!("shutting down");
    server.shutdown().await?;
    Ok(())
}

fn run(config: &BridgeConfig, module: &Path, entry: &str) -> Result<()> {
    let bytes = std::fs::read(module)
        .with_context(|| format!("cannot read guest module {}", module.display()))?;
    let runtime = Runtime::new(config)?;
    let outcome = runtime.sandbox()?.run(&bytes, entry)?;

    let report = json!({
        "exit_code": outcome.exit_code,
        "fuel_consumed": outcome.fuel_consumed,
        "state": runtime.state().snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn tools(config: &BridgeConfig) -> Result<()> {
    let runtime = Runtime::new(config)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&runtime.registry().catalog())?
    );
    Ok(())
}

async fn call(
    config: &BridgeConfig,
    name: &str,
    args: &str,
    endpoint: Option<&str>,
) -> Result<()> {
    let arguments: Value =
        serde_json::from_str(args).with_context(|| format!("--args is not JSON: {args}"))?;
    if !arguments.is_object() {
        bail!("--args must be a JSON object");
    }

    let timer = CallTimer::start("cli-call");
    let result = match endpoint {
        Some(endpoint) => {
            ToolCallClient::new(endpoint)?
                .call_tool(name, arguments)
                .await?
        }
        None => Runtime::new(config)?.call(name, arguments)?,
    };
    timer.finish();

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
