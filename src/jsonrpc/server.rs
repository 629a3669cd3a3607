//! JSON-RPC procedure hooks for [`HttpServer`](crate::HttpServer).

use std::panic::{self, AssertUnwindSafe};

use http::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use super::wire::{DecodedFields, Response};
use crate::error::{Fault, Result};
use crate::http::HttpRequest;
use crate::server::{Handler, Protocol, Reply};

pub const FLAVOUR: &str = "JSON RPC";

/// The JSON-RPC protocol.
///
/// Failures are reported inside the payload; the HTTP status is always 200.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpc;

impl JsonRpc {
    /// Decode, validate and dispatch one call.
    pub fn dispatch<H: Handler>(&self, handler: &mut H, request: &HttpRequest) -> Response {
        let decoded = match DecodedFields::from_fields(request.fields()) {
            Ok(decoded) => decoded,
            Err((id, message)) => return Response::error(id, message),
        };
        let DecodedFields { method, params, id } = decoded;

        let method = match method {
            Value::String(name) if !name.is_empty() => name,
            Value::Null | Value::String(_) => return Response::error(id, "No method specified"),
            other => return Response::error(id, format!("Method \"{}\" not found", other)),
        };

        if !handler.has_method(&method) {
            return Response::error(id, format!("Method \"{}\" not found", method));
        }

        let params = match params {
            Value::Array(params) => params,
            Value::Null => Vec::new(),
            other => {
                let fault = Fault::type_error(format!("params must be a list, got {}", other));
                return Response::error(id, fault.to_string());
            }
        };

        debug!(method = %method, id = %id, "Dispatching JSON-RPC call");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.call(&method, params)));
        match outcome {
            Ok(Ok(result)) => Response::success(id, result),
            Ok(Err(err)) => {
                let message = Fault::describe(&err);
                debug!(method = %method, error = %message, "Handler returned an error");
                Response::error(id, message)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(method = %method, error = %message, "Handler panicked");
                Response::error(id, format!("Panic: {}", message))
            }
        }
    }

    pub(crate) fn json_reply(response: &Response, content_type: &str) -> Result<Reply> {
        Ok(Reply {
            status: StatusCode::OK,
            headers: vec![("Content-Type".into(), content_type.into())],
            content: serde_json::to_value(response)?,
        })
    }
}

impl Protocol for JsonRpc {
    fn flavour(&self) -> &str {
        FLAVOUR
    }

    fn procedure<H: Handler>(&self, handler: &mut H, request: &HttpRequest) -> Result<Reply> {
        let response = self.dispatch(handler, request);
        Self::json_reply(&response, "application/json")
    }

    fn parse_response(&self, _request: &HttpRequest, content: Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&content)?)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
