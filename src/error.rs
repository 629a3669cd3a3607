//! Error types shared by clients, servers and the daemon controller.
//!
//! Protocol-level failures (unknown method, handler faults) never show up
//! here on the server side: they travel inside the JSON-RPC `error` field.
//! These types cover what the caller or the operator has to deal with.

use std::fmt;

use serde_json::Value;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors raised by proxies, servers and the controller.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Malformed or unexpected wire payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The response was not for the request we sent.
    #[error("API endpoint returned with id:{got}, expecting:{expected}")]
    IdMismatch { expected: String, got: Value },

    /// The remote side reported a failure.
    #[error("remote error: {0}")]
    Remote(String),

    /// Another socket already holds host:port.
    #[error("port {port} is already in use on {host}")]
    PortInUse { host: String, port: u16 },

    /// Connection refused, timed out, or otherwise failed in the HTTP client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Client configured with a verb other than GET or POST.
    #[error("unsupported HTTP verb {0}")]
    UnsupportedVerb(String),

    #[error("keyword arguments not supported by JSON RPC, try passing a map")]
    KeywordArguments,

    /// An extension point that the concrete type did not provide.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// Invalid or unreadable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The proxy or server was already closed.
    #[error("{0} is closed")]
    Closed(&'static str),

    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// Errors raised while controlling a daemonized server.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon already running with pid {pid}")]
    AlreadyRunning { pid: i32 },

    #[error("daemon did not write a live pid to {pidfile} within {waited_ms}ms")]
    StartTimeout { pidfile: String, waited_ms: u128 },

    #[error("process {pid} did not terminate")]
    FailedToTerminate { pid: i32 },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("pidfile error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to daemonize: {0}")]
    Daemonize(String),

    /// The supervised server failed to bind or serve.
    #[error("server error: {0}")]
    Server(Box<RpcError>),
}

impl From<RpcError> for DaemonError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Daemon(inner) => inner,
            other => DaemonError::Server(Box::new(other)),
        }
    }
}

/// A handler fault tagged with a kind, reported as `"<kind>: <message>"`.
///
/// Handlers return `anyhow::Result`, so any error works; wrapping it in a
/// `Fault` is only needed to control the kind shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    kind: String,
    message: String,
}

impl Fault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Render any handler error the way the server reports it.
    pub fn describe(err: &anyhow::Error) -> String {
        match err.downcast_ref::<Fault>() {
            Some(fault) => fault.to_string(),
            None => format!("Error: {}", err),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Fault {}
