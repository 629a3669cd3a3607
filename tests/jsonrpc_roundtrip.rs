//! Integration tests for JSON-RPC over HTTP.
//!
//! Runs a real server on an ephemeral port in a background thread and talks
//! to it with the blocking client and with raw TCP.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rpc_remotes::server::arg;
use rpc_remotes::{
    remote_interface, Args, Fault, HttpServer, JsonRpc, JsonRpcClient, Jsonp, MethodTable,
    Protocol, RemoteProxy, RpcError, ShutdownHandle,
};
use serde_json::{json, Value};

// ============================================================================
// Test Handler
// ============================================================================

fn test_handler() -> MethodTable {
    let mut calls = 0u64;
    MethodTable::new("TestHandler")
        .method("sayhi", |params| {
            let person: String = arg(&params, 0)?;
            Ok(format!("Hi {}", person).into())
        })
        .method("add", |params| {
            let a: i64 = arg(&params, 0)?;
            let b: i64 = arg(&params, 1)?;
            Ok((a + b).into())
        })
        .method("fail", |_| Err(Fault::value_error("bad input").into()))
        .method("explode", |_| panic!("kaboom"))
        .method("count", move |_| {
            calls += 1;
            Ok(calls.into())
        })
}

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start<P: Protocol + 'static>(protocol: P) -> Self {
        let mut server = HttpServer::new("127.0.0.1", 0, protocol, test_handler);
        server.bind().expect("bind ephemeral port");
        let addr = server.local_addr().expect("bound address");
        let shutdown = server.shutdown_handle();
        let thread = thread::spawn(move || {
            server.serve().expect("serve loop");
        });
        Self {
            addr,
            shutdown,
            thread: Some(thread),
        }
    }

    fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn client(&self) -> JsonRpcClient {
        JsonRpcClient::new(self.url()).unwrap()
    }

    /// Send raw bytes and return the whole response.
    fn raw(&self, request: &str) -> String {
        let mut stream = TcpStream::connect(self.addr).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Body of a raw HTTP response.
fn body_of(response: &str) -> &str {
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or_default()
}

// ============================================================================
// Client Round Trips
// ============================================================================

#[test]
fn test_sayhi_post() {
    let server = TestServer::start(JsonRpc);
    let client = server.client();
    let result = client.invoke("sayhi", Args::new().arg("David").unwrap()).unwrap();
    assert_eq!(result, "Hi David");
}

#[test]
fn test_sayhi_get() {
    let server = TestServer::start(JsonRpc);
    let client = server.client().with_verb("GET");
    let result = client.method("sayhi").call(Args::new().arg("David").unwrap()).unwrap();
    assert_eq!(result, "Hi David");
}

#[test]
fn test_url_without_scheme() {
    let server = TestServer::start(JsonRpc);
    let client = JsonRpcClient::new(server.addr.to_string()).unwrap();
    let result = client.invoke("add", Args::positional([json!(2), json!(3)])).unwrap();
    assert_eq!(result, 5);
}

#[test]
fn test_response_echoes_request_id() {
    let server = TestServer::start(JsonRpc);
    let client = server.client();
    let response = client.call_raw("add", Args::positional([json!(1), json!(1)])).unwrap();
    assert_eq!(response.result, 2);
    assert!(response.error.is_none());
    assert!(response.id.is_string());
}

#[test]
fn test_handler_error_is_reported() {
    let server = TestServer::start(JsonRpc);
    let client = server.client();

    let err = client.method("fail").call0().unwrap_err();
    match err {
        RpcError::Remote(message) => assert_eq!(message, "ValueError: bad input"),
        other => panic!("unexpected error: {other}"),
    }

    // The server keeps serving after a failed call
    let result = client.invoke("add", Args::positional([json!(4), json!(5)])).unwrap();
    assert_eq!(result, 9);
}

#[test]
fn test_handler_panic_is_reported() {
    let server = TestServer::start(JsonRpc);
    let client = server.client();

    let response = client.call_raw("explode", Args::new()).unwrap();
    assert_eq!(response.error.as_deref(), Some("Panic: kaboom"));

    let result = client.invoke("sayhi", Args::new().arg("Larry").unwrap()).unwrap();
    assert_eq!(result, "Hi Larry");
}

#[test]
fn test_unknown_method() {
    let server = TestServer::start(JsonRpc);
    let response = server.client().call_raw("nope", Args::new()).unwrap();
    assert_eq!(response.error.as_deref(), Some("Method \"nope\" not found"));
    assert!(response.result.is_null());
}

#[test]
fn test_bad_argument_type() {
    let server = TestServer::start(JsonRpc);
    let response = server
        .client()
        .call_raw("add", Args::positional([json!("one"), json!(2)]))
        .unwrap();
    let error = response.error.unwrap();
    assert!(error.starts_with("TypeError: argument 0"), "{error}");
}

#[test]
fn test_handler_state_persists_between_calls() {
    let server = TestServer::start(JsonRpc);
    let client = server.client();
    assert_eq!(client.method("count").call0().unwrap(), 1);
    assert_eq!(client.method("count").call0().unwrap(), 2);
    assert_eq!(server.client().method("count").call0().unwrap(), 3);
}

#[test]
fn test_session_scope() {
    let server = TestServer::start(JsonRpc);
    let mut client = server.client();
    client.connect().unwrap();
    {
        let session = client.scoped();
        assert_eq!(session.to_string(), format!("<JSON RPC Client for {}>", server.url()));
        assert_eq!(session.method("count").call0().unwrap(), 1);
        assert!(session.is_connected());
    }
}

// ============================================================================
// Typed Interfaces
// ============================================================================

remote_interface! {
    trait TestApi {
        fn sayhi(person: String) -> String;
        fn add(a: i64, b: i64) -> i64;
    }
}

#[test]
fn test_remote_interface() {
    let server = TestServer::start(JsonRpc);
    let client = server.client();
    assert_eq!(client.sayhi("David".into()).unwrap(), "Hi David");
    assert_eq!(client.add(40, 2).unwrap(), 42);
}

#[test]
fn test_client_chain() {
    let server = TestServer::start(JsonRpc);
    let first = server.url();
    let second = server.addr.to_string();
    let clients = rpc_remotes::jsonrpc::chain(&first)
        .unwrap()
        .try_chain(second.as_str())
        .unwrap();
    assert_eq!(clients.len(), 2);
    for client in &clients {
        assert_eq!(client.sayhi("Chain".into()).unwrap(), "Hi Chain");
    }
}

// ============================================================================
// Raw HTTP
// ============================================================================

#[test]
fn test_invalid_verb_rejected() {
    let server = TestServer::start(JsonRpc);
    let response = server.raw("PUT / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 405"), "{response}");
    assert!(response.ends_with("Invalid HTTP verb PUT"), "{response}");
}

#[test]
fn test_missing_method_field() {
    let server = TestServer::start(JsonRpc);
    let response = server.raw("GET /?id=%227%22 HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let parsed: Value = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(parsed["id"], "7");
    assert_eq!(parsed["error"], "No method specified");
}

#[test]
fn test_malformed_header() {
    let server = TestServer::start(JsonRpc);
    let response = server.raw("GET / HTTP/1.1\r\nnot a header\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 400"), "{response}");

    // Still serving
    assert_eq!(server.client().method("count").call0().unwrap(), 1);
}

#[test]
fn test_chunked_post_body() {
    let server = TestServer::start(JsonRpc);
    let body = "method=%22sayhi%22&params=%5B%22David%22%5D&id=%221%22";
    let (first, second) = body.split_at(20);
    let request = format!(
        "POST / HTTP/1.1\r\nHost: localhost\r\n\
         Content-Type: application/x-www-form-urlencoded\r\n\
         Transfer-Encoding: chunked\r\n\r\n\
         {:x}\r\n{}\r\n{:x}\r\n{}\r\n0\r\n\r\n",
        first.len(),
        first,
        second.len(),
        second
    );
    let response = server.raw(&request);
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let parsed: Value = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(parsed, json!({"id": "1", "result": "Hi David", "error": null}));
}

#[test]
fn test_expect_continue() {
    let server = TestServer::start(JsonRpc);
    let body = "method=%22sayhi%22&params=%5B%22Larry%22%5D&id=%222%22";
    let mut stream = TcpStream::connect(server.addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    write!(
        stream,
        "POST / HTTP/1.1\r\nHost: localhost\r\n\
         Content-Type: application/x-www-form-urlencoded\r\n\
         Content-Length: {}\r\nExpect: 100-continue\r\n\r\n",
        body.len()
    )
    .unwrap();

    // The interim response arrives before any body is sent
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut status = String::new();
    reader.read_line(&mut status).unwrap();
    assert!(status.starts_with("HTTP/1.1 100"), "{status}");
    let mut blank = String::new();
    reader.read_line(&mut blank).unwrap();
    assert_eq!(blank, "\r\n");

    stream.write_all(body.as_bytes()).unwrap();
    let mut response = String::new();
    reader.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    let parsed: Value = serde_json::from_str(body_of(&response)).unwrap();
    assert_eq!(parsed["result"], "Hi Larry");
}

#[test]
fn test_port_in_use() {
    let server = TestServer::start(JsonRpc);
    let mut second = HttpServer::new("127.0.0.1", server.addr.port(), JsonRpc, test_handler);
    match second.bind() {
        Err(RpcError::PortInUse { port, .. }) => assert_eq!(port, server.addr.port()),
        other => panic!("expected PortInUse, got {:?}", other.err()),
    }
}

// ============================================================================
// JSONP
// ============================================================================

#[test]
fn test_jsonp_callback() {
    let server = TestServer::start(Jsonp);
    let response = server.raw(
        "GET /?method=%22sayhi%22&params=%5B%22David%22%5D&id=%221%22&callback=cb HTTP/1.1\r\n\
         Host: localhost\r\n\r\n",
    );
    assert!(
        response
            .to_ascii_lowercase()
            .contains("content-type: application/javascript"),
        "{response}"
    );
    let body = body_of(&response);
    let inner = body.strip_prefix("cb(").and_then(|s| s.strip_suffix(')')).unwrap();
    let parsed: Value = serde_json::from_str(inner).unwrap();
    assert_eq!(parsed, json!({"id": "1", "result": "Hi David", "error": null}));
}

// ============================================================================
// Misbehaving Servers
// ============================================================================

/// Answer one POST with whatever `reply` builds from the request's raw `id`
/// field. Returns the url to call.
fn stub_server<F>(reply: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(&str) -> (u16, String) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let thread = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    length = value.trim().parse().unwrap();
                }
            }
        }
        let mut body = vec![0; length];
        reader.read_exact(&mut body).unwrap();
        let id = url::form_urlencoded::parse(&body)
            .find(|(name, _)| name == "id")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        let (status, payload) = reply(&id);
        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            payload.len(),
            payload
        )
        .unwrap();
    });
    (url, thread)
}

#[test]
fn test_id_mismatch_is_rejected() {
    let (url, stub) =
        stub_server(|_| (200, r#"{"id":"not-yours","result":1,"error":null}"#.to_string()));
    let client = JsonRpcClient::new(url).unwrap();

    match client.method("ping").call0() {
        Err(RpcError::IdMismatch { expected, got }) => {
            assert_eq!(got, "not-yours");
            assert_eq!(expected.len(), 32);
        }
        other => panic!("expected IdMismatch, got {:?}", other),
    }
    stub.join().unwrap();
}

#[test]
fn test_error_status_with_jsonrpc_body() {
    let (url, stub) = stub_server(|id| {
        (
            500,
            format!(r#"{{"id":{},"result":null,"error":"ValueError: boom"}}"#, id),
        )
    });
    let client = JsonRpcClient::new(url).unwrap();

    match client.method("ping").call0() {
        Err(RpcError::Remote(message)) => assert_eq!(message, "ValueError: boom"),
        other => panic!("expected Remote, got {:?}", other),
    }
    stub.join().unwrap();
}

#[test]
fn test_error_status_with_plain_body() {
    let (url, stub) = stub_server(|_| (500, "Internal Server Error".to_string()));
    let client = JsonRpcClient::new(url).unwrap();

    match client.method("ping").call0() {
        Err(RpcError::Remote(message)) => {
            assert!(message.starts_with("500"), "{message}");
            assert!(message.ends_with(": Internal Server Error"), "{message}");
        }
        other => panic!("expected Remote, got {:?}", other),
    }
    stub.join().unwrap();
}
