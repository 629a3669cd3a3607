//! JSON-RPC client proxy.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::server::FLAVOUR;
use super::wire::{Request, Response};
use crate::error::{Result, RpcError};
use crate::proxy::{Args, RemoteProxy};
use crate::urlhelp::protocolise;

/// Default call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// HTTP verbs the client can send calls with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
}

impl FromStr for Verb {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Verb::Get),
            "POST" => Ok(Verb::Post),
            other => Err(RpcError::UnsupportedVerb(other.to_string())),
        }
    }
}

/// Client for a JSON-RPC endpoint.
///
/// ```rust,no_run
/// use rpc_remotes::{Args, JsonRpcClient, RemoteProxy};
///
/// let client = JsonRpcClient::new("http://localhost:7890")?.scoped();
/// let greeting = client.invoke("sayhi", Args::new().arg("Larry")?)?;
/// assert_eq!(greeting, "Hi Larry");
/// # Ok::<(), rpc_remotes::RpcError>(())
/// ```
pub struct JsonRpcClient {
    url: String,
    timeout: Duration,
    verb: String,
    http: Option<reqwest::blocking::Client>,
}

impl JsonRpcClient {
    /// Create a client for `url` with a 3 second timeout, sending POST.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(RpcError::Config("a JSON-RPC client needs a url".into()));
        }
        Ok(Self {
            url,
            timeout: DEFAULT_TIMEOUT,
            verb: "POST".into(),
            http: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.http = None;
        self
    }

    /// Set the HTTP verb. Anything but `GET` or `POST` makes every call fail.
    pub fn with_verb(mut self, verb: impl Into<String>) -> Self {
        self.verb = verb.into();
        self
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Make a call and return the id-checked response without collapsing
    /// its error field.
    pub fn call_raw(&self, method: &str, args: Args) -> Result<Response> {
        if args.has_keywords() {
            return Err(RpcError::KeywordArguments);
        }
        let verb: Verb = self.verb.parse()?;
        let http = self.transport()?;

        let request = Request::new(method, args.positional);
        let fields = request.to_fields()?;
        let request_id = request.id.as_str().unwrap_or_default().to_string();
        let target = protocolise(&self.url);

        debug!(method, id = %request_id, verb = %self.verb, url = %target, "Sending JSON-RPC call");

        let builder = match verb {
            Verb::Get => http.get(&target).query(&fields),
            Verb::Post => http.post(&target).form(&fields),
        };
        let reply = builder.header("X-flavour", "JSONRPC").send()?;
        let status = reply.status();
        let body = reply.text()?;

        if status.is_success() {
            return Response::parse_for(&body, &request_id);
        }
        match Response::parse_for(&body, &request_id) {
            Ok(response) => Err(RpcError::Remote(
                response
                    .error
                    .unwrap_or_else(|| response.result.to_string()),
            )),
            Err(e @ RpcError::IdMismatch { .. }) => Err(e),
            // Not a JSON-RPC body at all, e.g. a plain-text 500 from the server.
            Err(_) => Err(RpcError::Remote(format!("{}: {}", status, body.trim()))),
        }
    }

    fn transport(&self) -> Result<reqwest::blocking::Client> {
        match &self.http {
            Some(client) => Ok(client.clone()),
            None => Ok(reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()?),
        }
    }

    /// Build the HTTP transport now rather than on the first call.
    pub fn connect(&mut self) -> Result<()> {
        if self.http.is_none() {
            self.http = Some(
                reqwest::blocking::Client::builder()
                    .timeout(self.timeout)
                    .build()?,
            );
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.http.is_some()
    }
}

impl RemoteProxy for JsonRpcClient {
    fn flavour(&self) -> &str {
        FLAVOUR
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn api_call(&self, method: &str, args: Args) -> Result<Value> {
        self.call_raw(method, args)?
            .into_result()
            .map_err(RpcError::Remote)
    }

    fn close(&mut self) {
        if self.http.take().is_some() {
            debug!(url = %self.url, "Released HTTP transport");
        }
    }
}

impl PartialEq for JsonRpcClient {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("verb", &self.verb)
            .finish()
    }
}

impl fmt::Display for JsonRpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} Client for {}>", FLAVOUR, self.url)
    }
}
