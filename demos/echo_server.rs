//! Example: echo server controlled from the command line.
//!
//! # Generate a config, then run the server in the background
//! ```bash
//! cargo run --example echo_server -- generate /tmp/rpc/echo.toml --port 7890
//! cargo run --example echo_server -- start /tmp/rpc/echo.toml
//! ```
//!
//! # Call it
//! ```bash
//! curl 'http://localhost:7890/?method="sayhi"&params=["David"]&id="1"'
//! ```
//!
//! # Stop it
//! ```bash
//! cargo run --example echo_server -- stop /tmp/rpc/echo.toml
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rpc_remotes::server::arg;
use rpc_remotes::{Controller, Fault, JsonRpc, MethodTable, ServerConfig, Stopped};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "echo_server", about = "Run a JSON-RPC echo server as a daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the server in the background
    Start { config: PathBuf },
    /// Stop a running server
    Stop { config: PathBuf },
    /// Stop then start
    Restart { config: PathBuf },
    /// Serve in the foreground, logging to stderr
    Serve { config: PathBuf },
    /// Write a boilerplate config file
    Generate {
        target: PathBuf,
        #[arg(long, default_value = "localhost")]
        host: String,
        #[arg(long, default_value_t = 7890)]
        port: u16,
    },
}

fn echo_handler() -> MethodTable {
    MethodTable::new("Echo")
        .method("echo", |params| Ok(Value::Array(params)))
        .method("sayhi", |params| {
            let person: String = arg(&params, 0)?;
            Ok(format!("Hi {}", person).into())
        })
        .method("ping", |_| Ok(serde_json::json!({"pong": true})))
        .method("divide", |params| {
            let a: f64 = arg(&params, 0)?;
            let b: f64 = arg(&params, 1)?;
            if b == 0.0 {
                return Err(Fault::new("ZeroDivisionError", "division by zero").into());
            }
            Ok((a / b).into())
        })
}

fn controller(config: PathBuf) -> Result<Controller<JsonRpc, MethodTable>> {
    Ok(Controller::from_path(config, JsonRpc, echo_handler)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start { config } => {
            let mut ctl = controller(config)?;
            if let Some(log_path) = ctl.log_path() {
                rpc_remotes::logging::init_logging(log_path)?;
            }
            let pid = ctl.start()?;
            println!("{} started with pid {}", ctl, pid);
        }
        Command::Stop { config } => {
            rpc_remotes::logging::init_stderr_logging()?;
            match controller(config)?.stop()? {
                Stopped::NotRunning => println!("Server was not running"),
                Stopped::Terminated { pid, forced } => {
                    println!("Stopped pid {}{}", pid, if forced { " (killed)" } else { "" })
                }
            }
        }
        Command::Restart { config } => {
            let mut ctl = controller(config)?;
            if let Some(log_path) = ctl.log_path() {
                rpc_remotes::logging::init_logging(log_path)?;
            }
            let pid = ctl.restart()?;
            println!("{} restarted with pid {}", ctl, pid);
        }
        Command::Serve { config } => {
            rpc_remotes::logging::init_stderr_logging()?;
            controller(config)?.serve()?;
        }
        Command::Generate { target, host, port } => {
            ServerConfig::new(host, port).generate(&target)?;
            println!("Wrote {}", target.display());
        }
    }

    Ok(())
}
