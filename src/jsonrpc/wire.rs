//! JSON-RPC wire types and the field encoding boundary.
//!
//! Requests travel as form fields (POST body or GET query string) and every
//! field value is itself a JSON document:
//!
//! ```text
//! method=%22sayhi%22&params=%5B%22David%22%5D&id=%2201f3...%22
//! ```
//!
//! Responses are a plain JSON object:
//!
//! ```json
//! {"id":"01f3...","result":"Hi David","error":null}
//! ```
//!
//! Only this module knows about the double encoding; everything else works
//! with [`Request`] and [`Response`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RpcError};

/// Form field names.
pub const METHOD_FIELD: &str = "method";
pub const PARAMS_FIELD: &str = "params";
pub const ID_FIELD: &str = "id";

/// A JSON-RPC call.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub params: Vec<Value>,
    pub id: Value,
}

/// Reply to a [`Request`]. Exactly one of `result`/`error` carries meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Echo of the request id
    pub id: Value,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl Request {
    /// Create a request with a fresh correlation id.
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            id: Value::String(new_request_id()),
        }
    }

    /// Encode as form fields, each value JSON-encoded.
    pub fn to_fields(&self) -> Result<Vec<(&'static str, String)>> {
        Ok(vec![
            (PARAMS_FIELD, serde_json::to_string(&self.params)?),
            (ID_FIELD, serde_json::to_string(&self.id)?),
            (METHOD_FIELD, serde_json::to_string(&self.method)?),
        ])
    }
}

/// Fields decoded from the transport, before validation.
///
/// A missing field decodes to its default (`null`, `[]`, `null`).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFields {
    pub method: Value,
    pub params: Value,
    pub id: Value,
}

impl DecodedFields {
    /// Decode each field independently.
    ///
    /// On failure, returns the name of the offending field together with
    /// whatever id could be recovered so the error reply can still echo it.
    pub fn from_fields(fields: &HashMap<String, String>) -> std::result::Result<Self, (Value, String)> {
        let id = decode_field(fields, ID_FIELD, "null").map_err(|msg| (Value::Null, msg))?;
        let method = decode_field(fields, METHOD_FIELD, "null").map_err(|msg| (id.clone(), msg))?;
        let params = decode_field(fields, PARAMS_FIELD, "[]").map_err(|msg| (id.clone(), msg))?;
        Ok(Self { method, params, id })
    }
}

fn decode_field(
    fields: &HashMap<String, String>,
    name: &str,
    default: &str,
) -> std::result::Result<Value, String> {
    let raw = fields.get(name).map(String::as_str).unwrap_or(default);
    serde_json::from_str(raw).map_err(|e| format!("Invalid JSON in field `{}`: {}", name, e))
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    pub fn error(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Tagged view of the reply.
    pub fn into_result(self) -> std::result::Result<Value, String> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a response body and check it answers `expected_id`.
    pub fn parse_for(body: &str, expected_id: &str) -> Result<Self> {
        let response: Response = serde_json::from_str(body).map_err(|e| {
            RpcError::Protocol(format!("indecipherable JSON-RPC response: {}", e))
        })?;
        if response.id.as_str() != Some(expected_id) {
            return Err(RpcError::IdMismatch {
                expected: expected_id.to_string(),
                got: response.id,
            });
        }
        Ok(response)
    }
}

/// A fresh, high-entropy correlation token (UUIDv4 as 32 hex digits).
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_request_fields_are_json_encoded() {
        let request = Request {
            method: "sayhi".into(),
            params: vec![json!("David")],
            id: json!("HAI"),
        };
        let encoded: HashMap<_, _> = request.to_fields().unwrap().into_iter().collect();
        assert_eq!(encoded["method"], "\"sayhi\"");
        assert_eq!(encoded["params"], "[\"David\"]");
        assert_eq!(encoded["id"], "\"HAI\"");
    }

    #[test]
    fn test_request_ids_are_fresh() {
        let a = Request::new("ping", vec![]);
        let b = Request::new("ping", vec![]);
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.as_str().unwrap().len(), 32);
    }

    #[test]
    fn test_decode_defaults() {
        let decoded = DecodedFields::from_fields(&HashMap::new()).unwrap();
        assert_eq!(decoded.method, Value::Null);
        assert_eq!(decoded.params, json!([]));
        assert_eq!(decoded.id, Value::Null);
    }

    #[test]
    fn test_decode_bad_params_keeps_id() {
        let (id, msg) = DecodedFields::from_fields(&fields(&[
            ("id", "\"abc\""),
            ("method", "\"ping\""),
            ("params", "[unterminated"),
        ]))
        .unwrap_err();
        assert_eq!(id, json!("abc"));
        assert!(msg.starts_with("Invalid JSON in field `params`"));
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"id":"FOO", "result":"pong", "error":null}"#;
        let response = Response::parse_for(body, "FOO").unwrap();
        assert_eq!(response.into_result(), Ok(json!("pong")));
    }

    #[test]
    fn test_wrong_id() {
        let body = r#"{"id":"FOO", "result":"pong", "error":null}"#;
        let err = Response::parse_for(body, "FOO2").unwrap_err();
        assert!(matches!(err, RpcError::IdMismatch { .. }));
    }

    #[test]
    fn test_error_response_shape() {
        let json = Response::error(json!("x"), "No method specified").to_json().unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["result"], Value::Null);
        assert_eq!(parsed["error"], "No method specified");
        assert_eq!(parsed["id"], "x");
    }
}
