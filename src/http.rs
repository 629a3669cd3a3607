//! HTTP request and response views for the RPC servers.
//!
//! Framing (chunked bodies, `Expect: 100-continue`, header limits) is left to
//! `hyper`. [`HttpRequest`] wraps the request head together with the decoded
//! query string and form body; [`HttpResponse`] is what the protocol hooks
//! produce before it is handed back to `hyper`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::OnceLock;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE, SERVER};
use http::request::Parts;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use tracing::{error, warn};

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const SERVER_NAME: &str = concat!("rpc-remotes/", env!("CARGO_PKG_VERSION"));

/// An inbound request with its body fully read.
#[derive(Debug)]
pub struct HttpRequest {
    head: Parts,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
}

impl HttpRequest {
    /// Build from a request head and its complete body.
    ///
    /// The body is decoded as a form when the content type is form-urlencoded
    /// or absent.
    pub fn from_parts(head: Parts, body: &[u8]) -> Self {
        let query = head
            .uri
            .query()
            .map(|q| parse_urlencoded(q.as_bytes()))
            .unwrap_or_default();

        let is_form = match head.headers.get(CONTENT_TYPE) {
            Some(value) => value
                .to_str()
                .map(|ct| ct.starts_with(FORM_CONTENT_TYPE))
                .unwrap_or(false),
            None => true,
        };
        let form = if is_form {
            parse_urlencoded(body)
        } else {
            HashMap::new()
        };

        Self { head, query, form }
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn path(&self) -> &str {
        self.head.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Decoded query-string fields.
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Decoded form-body fields.
    pub fn form(&self) -> &HashMap<String, String> {
        &self.form
    }

    /// Fields for the request verb: the query string for GET, the form body
    /// for POST, nothing otherwise.
    pub fn fields(&self) -> &HashMap<String, String> {
        static EMPTY: OnceLock<HashMap<String, String>> = OnceLock::new();
        match *self.method() {
            Method::GET => &self.query,
            Method::POST => &self.form,
            _ => EMPTY.get_or_init(HashMap::new),
        }
    }
}

impl<B: AsRef<[u8]>> From<http::Request<B>> for HttpRequest {
    fn from(request: http::Request<B>) -> Self {
        let (head, body) = request.into_parts();
        Self::from_parts(head, body.as_ref())
    }
}

fn parse_urlencoded(input: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(input).into_owned().collect()
}

/// Read the body of a `hyper` request, up to [`MAX_BODY_BYTES`].
///
/// On failure the error response to send back is returned instead.
pub(crate) async fn read_request(
    request: hyper::Request<Incoming>,
) -> std::result::Result<HttpRequest, HttpResponse> {
    let (head, body) = request.into_parts();
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(HttpRequest::from_parts(head, &collected.to_bytes())),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(limit = MAX_BODY_BYTES, "Rejecting oversized request body");
            Err(HttpResponse::text(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()))
        }
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            Err(HttpResponse::text(StatusCode::BAD_REQUEST, e.to_string()))
        }
    }
}

/// An outbound response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(
            status,
            vec![("Content-Type".into(), "text/plain; charset=utf-8".into())],
            body.into(),
        )
    }

    /// Convert into a `hyper` response. Headers that are not valid HTTP turn
    /// the whole response into a 500.
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let mut builder = hyper::Response::builder()
            .status(self.status)
            .header(SERVER, HeaderValue::from_static(SERVER_NAME));
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match builder.body(Full::new(Bytes::from(self.body))) {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Invalid response headers");
                let mut response = hyper::Response::new(Full::new(Bytes::from_static(
                    b"Internal Server Error",
                )));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}

/// `hyper` service result type used by the server loop.
pub(crate) type ServiceResult = std::result::Result<hyper::Response<Full<Bytes>>, Infallible>;

/// A GET or POST request carrying `fields`, url-encoded the way clients send them.
#[cfg(test)]
pub(crate) fn request_with_fields(method: Method, fields: &[(&str, &str)]) -> HttpRequest {
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish();
    let builder = http::Request::builder().method(method.clone());
    let request = if method == Method::GET {
        builder.uri(format!("/?{}", encoded)).body(String::new())
    } else {
        builder.uri("/").body(encoded)
    };
    HttpRequest::from(request.expect("valid test request"))
}
