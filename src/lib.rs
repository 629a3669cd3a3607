//! # rpc-remotes
//!
//! Uniform client proxies for remote APIs, a blocking HTTP server that
//! exposes a handler object over JSON-RPC (or JSONP), and a Unix daemon
//! controller that runs such a server in the background behind a pidfile.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rpc_remotes::{server::arg, HttpServer, JsonRpc, JsonRpcClient, MethodTable, RemoteProxy};
//!
//! // Server side
//! let mut server = HttpServer::new("localhost", 7890, JsonRpc, || {
//!     MethodTable::new("Greeter").method("sayhi", |params| {
//!         let person: String = arg(&params, 0)?;
//!         Ok(format!("Hi {}", person).into())
//!     })
//! });
//! std::thread::spawn(move || server.serve());
//!
//! // Client side
//! let client = JsonRpcClient::new("localhost:7890")?;
//! let greeting = client.method("sayhi").call(rpc_remotes::Args::new().arg("David")?)?;
//! assert_eq!(greeting, "Hi David");
//! # Ok::<(), rpc_remotes::RpcError>(())
//! ```
//!
//! ## Wire Format
//!
//! Each request is one HTTP GET (query string) or POST (form body) whose
//! fields are themselves JSON-encoded:
//!
//! ```text
//! method="sayhi"&params=["David"]&id="5f1c..."
//! ```
//!
//! The reply is a JSON object echoing the id:
//!
//! ```json
//! {"id":"5f1c...","result":"Hi David","error":null}
//! ```

pub mod chain;
pub mod config;
pub mod control;
pub mod daemon;
pub mod error;
pub mod http;
pub mod jsonp;
pub mod jsonrpc;
pub mod logging;
pub mod proxy;
pub mod server;
pub mod urlhelp;

// Re-exports for convenience
pub use chain::{client_chain, ChainList};
pub use config::{generate_config, ServerConfig};
pub use control::Controller;
pub use daemon::{pid_exists, Daemon, StopPolicy, Stopped};
pub use error::{DaemonError, Fault, Result, RpcError};
pub use jsonp::Jsonp;
pub use jsonrpc::{JsonRpc, JsonRpcClient};
pub use proxy::{Args, RemoteMethod, RemoteProxy, Session};
pub use server::{Handler, HttpServer, MethodTable, Protocol, Reply, Serve, ShutdownHandle};
pub use urlhelp::protocolise;
