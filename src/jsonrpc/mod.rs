//! JSON-RPC over HTTP.
//!
//! The client sends `method`, `params` and `id` as form fields (POST body or
//! GET query string), each field value JSON-encoded. The server answers with
//! `{"id": ..., "result": ..., "error": ...}` and always uses HTTP 200.

pub mod client;
pub mod server;
pub mod wire;

pub use client::{JsonRpcClient, Verb, DEFAULT_TIMEOUT};
pub use server::JsonRpc;
pub use wire::{Request, Response};

use crate::chain::{client_chain, ChainList};
use crate::error::Result;

/// Constructor used by [`chain`].
pub type ClientBuilder = fn(&str) -> Result<JsonRpcClient>;

/// A [`ChainList`] of JSON-RPC clients.
pub type ClientChain = ChainList<JsonRpcClient, ClientBuilder>;

/// Start a chain of clients, one per url.
///
/// ```rust
/// use rpc_remotes::RemoteProxy;
///
/// let clients = rpc_remotes::jsonrpc::chain("localhost")?.try_chain("example.com")?;
/// assert_eq!(clients[0].url(), "localhost");
/// # Ok::<(), rpc_remotes::RpcError>(())
/// ```
pub fn chain(url: &str) -> Result<ClientChain> {
    client_chain(build_client as ClientBuilder, url)
}

fn build_client(url: &str) -> Result<JsonRpcClient> {
    JsonRpcClient::new(url)
}
