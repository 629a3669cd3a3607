//! JSONP flavour: JSON-RPC dispatch with the reply wrapped in a callback.

use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::http::HttpRequest;
use crate::jsonrpc::JsonRpc;
use crate::server::{Handler, Protocol, Reply};

pub const FLAVOUR: &str = "JSONP";

/// Query field naming the callback function.
pub const CALLBACK_FIELD: &str = "callback";

#[derive(Debug, Clone, Copy, Default)]
pub struct Jsonp;

impl Protocol for Jsonp {
    fn flavour(&self) -> &str {
        FLAVOUR
    }

    fn procedure<H: Handler>(&self, handler: &mut H, request: &HttpRequest) -> Result<Reply> {
        let response = JsonRpc.dispatch(handler, request);
        JsonRpc::json_reply(&response, "application/javascript")
    }

    /// `callback(<json>)`, or bare JSON when no usable callback was given.
    fn parse_response(&self, request: &HttpRequest, content: Value) -> Result<Vec<u8>> {
        let data = serde_json::to_string(&content)?;
        match request.query().get(CALLBACK_FIELD) {
            Some(callback) if is_callback_name(callback) => {
                Ok(format!("{}({})", callback, data).into_bytes())
            }
            Some(callback) => {
                warn!(callback = %callback, "Ignoring invalid JSONP callback");
                Ok(data.into_bytes())
            }
            None => Ok(data.into_bytes()),
        }
    }
}

/// A dotted JavaScript identifier path such as `jQuery123.cb`.
fn is_callback_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}
