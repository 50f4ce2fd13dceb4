use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::TypeRegError;
use crate::TypeRegResult;
use crate::error::ErrorKind;

use super::FilePath;
use super::http::{
    HttpFetchResponse, HttpRequest, HttpResponse, HttpServerConfig, HttpServerHandle, HttpService,
};
use super::traits::Pal;

/* 📖 # Why does MockPal answer outbound requests from a map?

The interesting behavior of the service is what happens when the remote format
source changes its answer: a new document, a 500, an unreachable host. MockPal keeps
one canned answer per URL that a test can swap between calls, and records every URL
it was asked for, so refresh semantics can be tested without any network.
*/

/// Canned answer for an outbound GET.
#[derive(Debug, Clone)]
enum CannedResponse {
    Response(HttpFetchResponse),
    Unreachable(String),
}

/// In-memory PAL implementation for testing.
///
/// ```
/// use typereg_base::{FilePath, MockPal, Pal};
///
/// let mock = MockPal::new();
/// mock.add_file(FilePath::from("conf/settings.toml"), b"port = 8080".to_vec());
/// let content = mock.read_file_to_string(&FilePath::from("conf/settings.toml")).unwrap();
/// assert_eq!(content, "port = 8080");
/// ```
#[derive(Debug, Clone)]
pub struct MockPal {
    files: Arc<Mutex<HashMap<FilePath, Vec<u8>>>>,
    responses: Arc<Mutex<HashMap<String, CannedResponse>>>,
    requested_urls: Arc<Mutex<Vec<String>>>,
    http_servers: Arc<Mutex<HashMap<u16, HttpServerInfo>>>,
    next_port: Arc<AtomicU16>,
}

/// Information about a registered HTTP server.
#[derive(Debug)]
struct HttpServerInfo {
    service: Box<dyn HttpService>,
    handle: HttpServerHandle,
}

impl MockPal {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            responses: Arc::new(Mutex::new(HashMap::new())),
            requested_urls: Arc::new(Mutex::new(Vec::new())),
            http_servers: Arc::new(Mutex::new(HashMap::new())),
            next_port: Arc::new(AtomicU16::new(10000)),
        }
    }

    /// Add a file to the mock storage.
    pub fn add_file(&self, path: FilePath, content: Vec<u8>) {
        self.files.lock().unwrap().insert(path, content);
    }

    /// Answer GET requests for `url` with the given status and body.
    pub fn set_url_response(&self, url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) {
        self.responses.lock().unwrap().insert(
            url.into(),
            CannedResponse::Response(HttpFetchResponse::new(status, body)),
        );
    }

    /// Make GET requests for `url` fail as if the host could not be reached.
    pub fn set_url_unreachable(&self, url: impl Into<String>, message: impl Into<String>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.into(), CannedResponse::Unreachable(message.into()));
    }

    /// URLs requested through `http_get`, in call order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requested_urls.lock().unwrap().clone()
    }

    /// Simulate an HTTP request to a server started on this PAL.
    ///
    /// Requests to a server whose handle was shut down are rejected.
    pub fn simulate_request(&self, port: u16, request: HttpRequest) -> TypeRegResult<HttpResponse> {
        let servers = self.http_servers.lock().unwrap();
        let server_info = servers
            .get(&port)
            .filter(|info| !info.handle.is_shutdown())
            .ok_or_else(|| crate::err!("No HTTP server running on port {}", port))?;

        server_info.service.handle_request(request)
    }

    /// Get the number of registered HTTP servers.
    pub fn http_server_count(&self) -> usize {
        self.http_servers.lock().unwrap().len()
    }
}

impl Default for MockPal {
    fn default() -> Self {
        Self::new()
    }
}

impl Pal for MockPal {
    fn file_exists(&self, path: &FilePath) -> TypeRegResult<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    fn read_file(&self, path: &FilePath) -> TypeRegResult<Box<dyn Read + 'static>> {
        let files = self.files.lock().unwrap();
        let content = files
            .get(path)
            .ok_or_else(|| {
                Box::new(TypeRegError::new(ErrorKind::FileError {
                    path: path.as_path().to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("File not found: {}", path),
                    ),
                }))
            })?
            .clone();
        Ok(Box::new(Cursor::new(content)))
    }

    fn http_get(&self, url: &str, _timeout: Duration) -> TypeRegResult<HttpFetchResponse> {
        self.requested_urls.lock().unwrap().push(url.to_string());
        let responses = self.responses.lock().unwrap();
        match responses.get(url) {
            Some(CannedResponse::Response(response)) => Ok(response.clone()),
            Some(CannedResponse::Unreachable(message)) => {
                Err(Box::new(TypeRegError::new(ErrorKind::UpstreamTransport {
                    url: url.to_string(),
                    message: message.clone(),
                })))
            }
            None => Ok(HttpFetchResponse::new(404, b"Not Found".to_vec())),
        }
    }

    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> TypeRegResult<HttpServerHandle> {
        let port = match config.port {
            Some(p) => p,
            None => self.next_port.fetch_add(1, Ordering::SeqCst),
        };
        let handle = HttpServerHandle::new(port);
        self.http_servers.lock().unwrap().insert(
            port,
            HttpServerInfo {
                service,
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pal::http::HttpMethod;

    #[test]
    fn test_read_file_and_missing_file() {
        let pal = MockPal::new();
        pal.add_file(FilePath::from("conf/settings.toml"), b"[default]".to_vec());

        assert!(pal.file_exists(&FilePath::from("conf/settings.toml")).unwrap());
        assert_eq!(
            pal.read_file_to_string(&FilePath::from("conf/settings.toml"))
                .unwrap(),
            "[default]"
        );
        assert!(pal.read_file(&FilePath::from("conf/.secrets.toml")).is_err());
    }

    #[test]
    fn test_http_get_returns_canned_response_and_records_url() {
        let pal = MockPal::new();
        pal.set_url_response("https://formats.test/dans.json", 200, b"{}".to_vec());

        let response = pal
            .http_get("https://formats.test/dans.json", Duration::from_secs(1))
            .unwrap();
        assert_eq!(response, HttpFetchResponse::new(200, b"{}".to_vec()));
        assert_eq!(pal.requested_urls(), vec!["https://formats.test/dans.json"]);
    }

    #[test]
    fn test_http_get_response_can_be_replaced() {
        let pal = MockPal::new();
        let url = "https://formats.test/dans.json";
        pal.set_url_response(url, 200, b"{}".to_vec());
        pal.set_url_response(url, 500, b"boom".to_vec());

        let response = pal.http_get(url, Duration::from_secs(1)).unwrap();
        assert_eq!(response.status, 500);
    }

    #[test]
    fn test_http_get_unknown_url_is_404() {
        let pal = MockPal::new();
        let response = pal
            .http_get("https://nowhere.test/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_http_get_unreachable() {
        let pal = MockPal::new();
        pal.set_url_unreachable("https://down.test/", "connection refused");

        let err = pal
            .http_get("https://down.test/", Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Request to 'https://down.test/' failed: connection refused"
        );
    }

    #[derive(Debug)]
    struct TestHttpService;

    impl HttpService for TestHttpService {
        fn handle_request(&self, request: HttpRequest) -> TypeRegResult<HttpResponse> {
            match request.route_path() {
                "/" => Ok(HttpResponse::json(r#"{"name":"test"}"#)),
                _ => Ok(HttpResponse::new(
                    crate::pal::http::HttpStatusCode::NotFound,
                )),
            }
        }
    }

    #[test]
    fn test_start_http_server_assigns_ports() {
        let pal = MockPal::new();
        let first = pal
            .start_http_server(Box::new(TestHttpService), HttpServerConfig::default())
            .unwrap();
        let second = pal
            .start_http_server(
                Box::new(TestHttpService),
                HttpServerConfig::default().with_port(2023),
            )
            .unwrap();

        assert!(first.port() >= 10000);
        assert_eq!(second.port(), 2023);
        assert_eq!(pal.http_server_count(), 2);
    }

    #[test]
    fn test_simulate_request() {
        let pal = MockPal::new();
        let handle = pal
            .start_http_server(Box::new(TestHttpService), HttpServerConfig::default())
            .unwrap();

        let ok = pal
            .simulate_request(handle.port(), HttpRequest::new(HttpMethod::Get, "/"))
            .unwrap();
        assert_eq!(ok.status().as_u16(), 200);

        let missing = pal
            .simulate_request(handle.port(), HttpRequest::new(HttpMethod::Get, "/x"))
            .unwrap();
        assert_eq!(missing.status().as_u16(), 404);
    }

    #[test]
    fn test_simulate_request_after_shutdown_fails() {
        let pal = MockPal::new();
        let handle = pal
            .start_http_server(Box::new(TestHttpService), HttpServerConfig::default())
            .unwrap();
        handle.shutdown();

        let result = pal.simulate_request(handle.port(), HttpRequest::new(HttpMethod::Get, "/"));
        assert!(result.is_err());
    }

    #[test]
    fn test_simulate_request_invalid_port() {
        let pal = MockPal::new();
        let result = pal.simulate_request(9999, HttpRequest::new(HttpMethod::Get, "/"));
        assert!(result.is_err());
    }
}
