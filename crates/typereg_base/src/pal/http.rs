/* 📖 # Why a dedicated HTTP module in the PAL?

The service both serves HTTP (the lookup API) and consumes HTTP (the remote format
source). Both directions are expressed with the plain types in this module so that
RealPal can back them with tiny_http and reqwest while MockPal answers them from memory.

- **Testable web services**: MockPal routes requests straight into the service
- **Testable upstream**: MockPal serves canned responses for registered URLs
- **Synchronous simplicity**: a thread per request, no async runtime
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// HTTP methods supported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    /// Parse an HTTP method from a string.
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "HEAD" => Some(Self::Head),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP headers collection. Header names are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    inner: HashMap<String, String>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Insert a header, replacing any value stored under the same name.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .insert(key.into().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.inner.get(&key.to_ascii_lowercase())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(&key.to_ascii_lowercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.inner.remove(&key.to_ascii_lowercase())
    }

    /// Iterate over `(lowercase name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// HTTP message body.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HttpBody(Vec<u8>);

impl HttpBody {
    pub fn empty() -> Self {
        Self(vec![])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Content as a string if valid UTF-8.
    pub fn as_string(&self) -> Option<String> {
        String::from_utf8(self.0.clone()).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl std::fmt::Debug for HttpBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HttpBody").field(&self.0.len()).finish()
    }
}

impl From<Vec<u8>> for HttpBody {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<String> for HttpBody {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for HttpBody {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// Incoming HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: HttpMethod,
    path: String,
    headers: HttpHeaders,
    body: HttpBody,
}

impl HttpRequest {
    /// Create a new request. `path` may carry a query string.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HttpHeaders::new(),
            body: HttpBody::empty(),
        }
    }

    pub fn method(&self) -> &HttpMethod {
        &self.method
    }

    /// Full request target, including any query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request target with the query string removed.
    pub fn route_path(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    pub fn body(&self) -> &HttpBody {
        &self.body
    }

    pub fn with_body(mut self, body: impl Into<HttpBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }
}

/// HTTP status codes produced by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatusCode {
    Ok = 200,
    NoContent = 204,
    BadRequest = 400,
    Unauthorized = 401,
    NotFound = 404,
    MethodNotAllowed = 405,
    /// Returned by the server layer when a service fails with an unexpected error.
    NetworkConnectTimeoutError = 599,
}

impl HttpStatusCode {
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::NetworkConnectTimeoutError => "Network Connect Timeout Error",
        }
    }
}

/// Outgoing HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: HttpStatusCode,
    headers: HttpHeaders,
    body: HttpBody,
}

impl HttpResponse {
    pub fn new(status: HttpStatusCode) -> Self {
        Self {
            status,
            headers: HttpHeaders::new(),
            body: HttpBody::empty(),
        }
    }

    pub fn ok() -> Self {
        Self::new(HttpStatusCode::Ok)
    }

    pub fn no_content() -> Self {
        Self::new(HttpStatusCode::NoContent)
    }

    pub fn status(&self) -> HttpStatusCode {
        self.status
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    pub fn body(&self) -> &HttpBody {
        &self.body
    }

    pub fn into_body(self) -> HttpBody {
        self.body
    }

    pub fn with_body(mut self, body: impl Into<HttpBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        self.with_header("Content-Type", content_type)
    }

    pub fn with_status(mut self, status: HttpStatusCode) -> Self {
        self.status = status;
        self
    }

    /// Create a 200 response carrying an already serialized JSON body.
    pub fn json(body: impl Into<String>) -> Self {
        Self::ok()
            .with_content_type("application/json")
            .with_body(body.into())
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::ok()
            .with_content_type("text/plain")
            .with_body(body.into())
    }
}

/// Result of an outbound GET request.
///
/// Any status the remote answered with is a response, including 4xx/5xx; only
/// failures to obtain a response at all are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpFetchResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    /// Port to listen on. If None, the OS will assign an available port.
    pub port: Option<u16>,
    /// Server name sent in the `Server` header.
    pub server_name: String,
}

impl HttpServerConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            server_name: "typereg".to_string(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Address string; port 0 lets the OS pick.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port.unwrap_or(0))
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

/* 📖 # Why a single HttpService trait?

The service receives raw HttpRequest objects and returns HttpResponse objects, doing
its own routing. Expected failures (bad credentials, upstream errors, unknown routes)
are ordinary responses with a 4xx status. An `Err` means something unexpected broke
and the server layer answers it with HTTP 599 so it stands out in logs and clients.
*/

/// Trait for handling HTTP requests.
pub trait HttpService: std::fmt::Debug + Send + Sync + 'static {
    /// Handle an HTTP request and return a response.
    fn handle_request(&self, request: HttpRequest) -> crate::TypeRegResult<HttpResponse>;
}

/// Handle to a running HTTP server.
///
/// Clones share one shutdown flag. Calling [`HttpServerHandle::shutdown`] stops the
/// accept loop; requests already being handled run to completion.
#[derive(Debug, Clone)]
pub struct HttpServerHandle {
    port: u16,
    shutdown: Arc<AtomicBool>,
}

impl HttpServerHandle {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn address(&self, host: &str) -> String {
        format!("{}:{}", host, self.port)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Access the shutdown flag (for use by PAL implementations).
    pub fn shutdown_flag(&self) -> &Arc<AtomicBool> {
        &self.shutdown
    }
}
