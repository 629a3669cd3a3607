//! Blocking HTTP server shared by every RPC flavour.
//!
//! [`HttpServer`] owns the listening socket and the handler object. Protocol
//! specifics live behind the [`Protocol`] hooks: `procedure` decodes a request
//! and calls into the handler, `parse_response` encodes what it returned.
//!
//! # Example
//!
//! ```rust,no_run
//! use rpc_remotes::{HttpServer, JsonRpc, MethodTable};
//!
//! let mut server = HttpServer::new("localhost", 7890, JsonRpc, || {
//!     MethodTable::new("Greeter").method("sayhi", |params| {
//!         let person: String = rpc_remotes::server::arg(&params, 0)?;
//!         Ok(format!("Hi {}", person).into())
//!     })
//! });
//! server.serve()?;
//! # Ok::<(), rpc_remotes::RpcError>(())
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Method, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{Fault, Result, RpcError};
use crate::http::{read_request, HttpRequest, HttpResponse, ServiceResult};

/// Upper bound on one connection, from accept to the last byte written.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// The user's business-logic object.
pub trait Handler: Send {
    /// Name used in logs and `Display`.
    fn name(&self) -> &str;

    /// Whether `method` can be called.
    fn has_method(&self, method: &str) -> bool;

    /// Invoke `method` with positional `params`.
    ///
    /// Errors are reported back to the caller, never propagated. Wrap them in
    /// a [`Fault`] to choose the kind shown in the reply.
    fn call(&mut self, method: &str, params: Vec<Value>) -> anyhow::Result<Value>;
}

/// Deserialize positional argument `index`, failing with a `TypeError` fault.
pub fn arg<T: DeserializeOwned>(params: &[Value], index: usize) -> anyhow::Result<T> {
    let value = params
        .get(index)
        .ok_or_else(|| Fault::type_error(format!("missing positional argument {}", index)))?;
    serde_json::from_value(value.clone())
        .map_err(|e| Fault::type_error(format!("argument {}: {}", index, e)).into())
}

type MethodFn = Box<dyn FnMut(Vec<Value>) -> anyhow::Result<Value> + Send>;

/// A [`Handler`] assembled from closures.
pub struct MethodTable {
    name: String,
    methods: BTreeMap<String, MethodFn>,
}

impl MethodTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: BTreeMap::new(),
        }
    }

    /// Register `name`. A later registration replaces an earlier one.
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(Vec<Value>) -> anyhow::Result<Value> + Send + 'static,
    {
        self.methods.insert(name.into(), Box::new(f));
        self
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

impl Handler for MethodTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    fn call(&mut self, method: &str, params: Vec<Value>) -> anyhow::Result<Value> {
        match self.methods.get_mut(method) {
            Some(f) => f(params),
            None => Err(anyhow::anyhow!("Method \"{}\" not found", method)),
        }
    }
}

/// What a `procedure` hook produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub content: Value,
}

/// Protocol hooks plugged into [`HttpServer`].
pub trait Protocol: Send {
    /// Protocol family, e.g. `"JSON RPC"`.
    fn flavour(&self) -> &str;

    /// Decode `request`, dispatch it to `handler`, and describe the reply.
    fn procedure<H: Handler>(&self, handler: &mut H, request: &HttpRequest) -> Result<Reply> {
        let _ = (handler, request);
        Err(RpcError::NotImplemented("procedure"))
    }

    /// Encode the reply content. Strings pass through as-is, anything else
    /// is written as JSON.
    fn parse_response(&self, request: &HttpRequest, content: Value) -> Result<Vec<u8>> {
        let _ = request;
        match content {
            Value::String(s) => Ok(s.into_bytes()),
            other => Ok(serde_json::to_vec(&other)?),
        }
    }
}

/// Anything the daemon can run in the background.
pub trait Serve {
    /// Acquire resources (the listening socket) before the process detaches.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Block serving requests until shut down.
    fn serve(&mut self) -> Result<()>;

    /// Drop what `prepare` acquired, in a process that will not serve.
    fn release(&mut self) {}
}

enum ServerState {
    Unbound,
    Bound(TcpListener),
    Closed,
}

/// Stops a running [`HttpServer`] from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    addr: Option<SocketAddr>,
}

impl ShutdownHandle {
    /// Ask the accept loop to exit after the in-flight request.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        // Wake a blocked accept()
        if let Some(addr) = self.addr {
            let _ = TcpStream::connect_timeout(&addr, Duration::from_millis(200));
        }
    }
}

/// HTTP server binding a handler to host:port.
///
/// Lifecycle: unbound after [`new`](Self::new), bound by [`bind`](Self::bind)
/// or the first [`serve`](Self::serve), closed by [`close`](Self::close) or
/// drop.
pub struct HttpServer<P: Protocol, H: Handler> {
    host: String,
    port: u16,
    protocol: P,
    handler: H,
    state: ServerState,
    running: Arc<AtomicBool>,
}

impl<P: Protocol, H: Handler> HttpServer<P, H> {
    /// Create a server. `factory` builds the handler once; the server owns it.
    ///
    /// No socket is opened yet, so a server can be constructed to control an
    /// instance that is already running elsewhere.
    pub fn new(host: impl Into<String>, port: u16, protocol: P, factory: impl FnOnce() -> H) -> Self {
        Self::with_handler(host, port, protocol, factory())
    }

    /// Create a server around a pre-built handler.
    pub fn with_handler(host: impl Into<String>, port: u16, protocol: P, handler: H) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
            handler,
            state: ServerState::Unbound,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn flavour(&self) -> &str {
        self.protocol.flavour()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, ServerState::Bound(_))
    }

    /// Open the listening socket.
    pub fn bind(&mut self) -> Result<()> {
        match self.state {
            ServerState::Bound(_) => return Ok(()),
            ServerState::Closed => return Err(RpcError::Closed("server")),
            ServerState::Unbound => {}
        }

        let listener = TcpListener::bind((self.host.as_str(), self.port)).map_err(|e| {
            if e.kind() == ErrorKind::AddrInUse {
                RpcError::PortInUse {
                    host: self.host.clone(),
                    port: self.port,
                }
            } else {
                RpcError::Io(e)
            }
        })?;

        debug!(host = %self.host, port = self.port, "Bound listening socket");
        self.state = ServerState::Bound(listener);
        Ok(())
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            ServerState::Bound(listener) => listener.local_addr().ok(),
            _ => None,
        }
    }

    /// Handle for stopping [`serve`](Self::serve). Bind first so the handle
    /// can wake a blocked accept.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: self.running.clone(),
            addr: self.local_addr(),
        }
    }

    /// Release the listening socket. Safe to call more than once.
    pub fn close(&mut self) {
        if let ServerState::Bound(_) = self.state {
            info!(host = %self.host, port = self.port, "Closing listening socket");
        }
        self.state = ServerState::Closed;
    }

    /// Accept and answer requests one at a time (blocking).
    ///
    /// Requests are parsed by `hyper` on a single-threaded runtime owned by
    /// this call; a connection is finished before the next one is accepted.
    pub fn serve(&mut self) -> Result<()> {
        self.bind()?;
        let listener = match &self.state {
            ServerState::Bound(listener) => listener.try_clone()?,
            _ => return Err(RpcError::Closed("server")),
        };
        listener.set_nonblocking(true)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        info!(
            flavour = self.protocol.flavour(),
            handler = self.handler.name(),
            addr = ?listener.local_addr().ok(),
            "Serving {} on {}:{}",
            self.protocol.flavour(),
            self.host,
            self.port
        );

        let flavour = self.protocol.flavour().to_string();
        runtime.block_on(self.accept_loop(listener))?;

        info!(flavour = %flavour, "Server stopped");
        Ok(())
    }

    async fn accept_loop(&mut self, listener: TcpListener) -> Result<()> {
        let listener = tokio::net::TcpListener::from_std(listener)?;
        let running = self.running.clone();
        let server = RefCell::new(self);
        let server = &server;
        let mut backoff = AcceptBackoff::default();

        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => {
                    backoff.reset();
                    stream
                }
                Err(e) => {
                    // EMFILE and friends persist until something is released
                    let delay = backoff.next_delay();
                    warn!(error = %e, retry_ms = delay.as_millis() as u64, "Accept error");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            if !running.load(Ordering::SeqCst) {
                break;
            }

            let service = service_fn(move |request| handle_request(server, request));
            let connection = http1::Builder::new()
                .keep_alive(false)
                .serve_connection(TokioIo::new(stream), service);

            match tokio::time::timeout(CONNECTION_TIMEOUT, connection).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Connection error"),
                Err(_) => warn!(
                    timeout_secs = CONNECTION_TIMEOUT.as_secs(),
                    "Dropping stalled connection"
                ),
            }
        }

        Ok(())
    }

    /// Run the protocol hooks for one request.
    pub fn respond(&mut self, request: &HttpRequest) -> HttpResponse {
        if *request.method() != Method::GET && *request.method() != Method::POST {
            return HttpResponse::text(
                StatusCode::METHOD_NOT_ALLOWED,
                format!("Invalid HTTP verb {}", request.method()),
            );
        }

        let protocol = &self.protocol;
        let handler = &mut self.handler;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let reply = protocol.procedure(handler, request)?;
            let body = protocol.parse_response(request, reply.content)?;
            Ok::<_, RpcError>(HttpResponse::new(reply.status, reply.headers, body))
        }));

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(error = %e, "Procedure failed");
                HttpResponse::text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            Err(_) => {
                error!("Procedure panicked");
                HttpResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

/// Delay between failed accepts: doubles per failure, resets on success.
#[derive(Debug)]
struct AcceptBackoff {
    next: Duration,
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self {
            next: ACCEPT_BACKOFF_MIN,
        }
    }
}

impl AcceptBackoff {
    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(ACCEPT_BACKOFF_MAX);
        delay
    }

    fn reset(&mut self) {
        self.next = ACCEPT_BACKOFF_MIN;
    }
}

/// Read one request off the connection and answer it.
async fn handle_request<P: Protocol, H: Handler>(
    server: &RefCell<&mut HttpServer<P, H>>,
    request: hyper::Request<Incoming>,
) -> ServiceResult {
    let request = match read_request(request).await {
        Ok(request) => request,
        Err(response) => return Ok(response.into_hyper()),
    };

    let start = Instant::now();
    let response = server.borrow_mut().respond(&request);

    debug!(
        verb = %request.method(),
        path = %request.path(),
        status = response.status.as_u16(),
        server_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Request complete"
    );
    Ok(response.into_hyper())
}

impl<P: Protocol, H: Handler> Serve for HttpServer<P, H> {
    fn prepare(&mut self) -> Result<()> {
        self.bind()
    }

    fn serve(&mut self) -> Result<()> {
        HttpServer::serve(self)
    }

    fn release(&mut self) {
        if self.is_bound() {
            self.state = ServerState::Unbound;
        }
    }
}

impl<P: Protocol, H: Handler> Drop for HttpServer<P, H> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<P: Protocol, H: Handler> fmt::Display for HttpServer<P, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} Server on {}:{} calling {}>",
            self.protocol.flavour(),
            self.host,
            self.port,
            self.handler.name()
        )
    }
}

impl<P: Protocol, H: Handler> PartialEq for HttpServer<P, H> {
    fn eq(&self, other: &Self) -> bool {
        self.protocol.flavour() == other.protocol.flavour()
            && self.host == other.host
            && self.port == other.port
            && self.handler.name() == other.handler.name()
    }
}
