use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::error::{ErrorKind, TypeRegError};
use crate::TypeRegResult;

use super::FilePath;
use super::http::{
    HttpFetchResponse, HttpMethod, HttpRequest, HttpResponse, HttpServerConfig,
    HttpServerHandle, HttpService, HttpStatusCode,
};
use super::traits::Pal;

/// How long the accept loop waits for a request before re-checking the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/* 📖 # Why blocking reqwest and tiny_http instead of an async stack?

The service does one outbound call per refresh and a handful of in-memory lookups per
request. A thread per request with blocking I/O keeps every code path a plain
function call, which is all this workload needs.
*/

/// PAL implementation backed by the real filesystem and network.
///
/// File paths are resolved relative to a configured base directory.
#[derive(Debug)]
pub struct RealPal {
    base_dir: PathBuf,
}

impl RealPal {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn resolve_path(&self, path: &FilePath) -> PathBuf {
        self.base_dir.join(path.as_path())
    }
}

fn transport_error(url: &str, message: impl Into<String>) -> Box<TypeRegError> {
    Box::new(TypeRegError::new(ErrorKind::UpstreamTransport {
        url: url.to_string(),
        message: message.into(),
    }))
}

/// Convert an incoming tiny_http request into the PAL request type.
fn read_request(request: &mut tiny_http::Request) -> Option<HttpRequest> {
    let method = HttpMethod::parse(request.method().as_str())?;
    let mut converted = HttpRequest::new(method, request.url());
    for header in request.headers() {
        converted
            .headers_mut()
            .insert(header.field.as_str().as_str(), header.value.as_str());
    }
    let mut body = Vec::new();
    if let Err(e) = request.as_reader().read_to_end(&mut body) {
        warn!(error = %e, "failed to read request body");
        return None;
    }
    Some(converted.with_body(body))
}

fn write_response(
    request: tiny_http::Request,
    response: HttpResponse,
    server_name: &str,
) -> std::io::Result<()> {
    let status = response.status().as_u16();
    let mut headers = Vec::with_capacity(response.headers().len() + 1);
    for (name, value) in response
        .headers()
        .iter()
        .chain(std::iter::once(("server", server_name)))
    {
        match tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => headers.push(header),
            Err(()) => warn!(name, "dropping response header with invalid bytes"),
        }
    }
    let mut out = tiny_http::Response::from_data(response.into_body().into_bytes())
        .with_status_code(status);
    for header in headers {
        out = out.with_header(header);
    }
    request.respond(out)
}

fn handle_connection(
    service: &dyn HttpService,
    mut request: tiny_http::Request,
    server_name: &str,
) {
    let Some(converted) = read_request(&mut request) else {
        let response = HttpResponse::new(HttpStatusCode::BadRequest);
        if let Err(e) = write_response(request, response, server_name) {
            warn!(error = %e, "failed to send response");
        }
        return;
    };
    let method = converted.method().clone();
    let path = converted.path().to_string();

    let response = match service.handle_request(converted) {
        Ok(response) => response,
        Err(e) => {
            error!(%method, %path, error = ?e, "request handling failed");
            HttpResponse::text(e.to_string())
                .with_status(HttpStatusCode::NetworkConnectTimeoutError)
        }
    };
    info!(%method, %path, status = response.status().as_u16(), "handled request");
    if let Err(e) = write_response(request, response, server_name) {
        warn!(%method, %path, error = %e, "failed to send response");
    }
}

impl Pal for RealPal {
    #[instrument(skip(self), fields(path = %path))]
    fn file_exists(&self, path: &FilePath) -> TypeRegResult<bool> {
        let resolved = self.resolve_path(path);
        let exists = resolved.exists();
        debug!(exists, resolved = %resolved.display(), "checked file existence");
        Ok(exists)
    }

    #[instrument(skip(self), fields(path = %path))]
    fn read_file(&self, path: &FilePath) -> TypeRegResult<Box<dyn std::io::Read + 'static>> {
        let resolved = self.resolve_path(path);
        debug!(resolved = %resolved.display(), "opening file for reading");
        let file = fs::File::open(&resolved).map_err(|e| {
            debug!(error = %e, "failed to open file");
            Box::new(TypeRegError::new(ErrorKind::FileError {
                path: resolved,
                source: e,
            }))
        })?;
        Ok(Box::new(file))
    }

    #[instrument(skip(self))]
    fn http_get(&self, url: &str, timeout: Duration) -> TypeRegResult<HttpFetchResponse> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| transport_error(url, e.to_string()))?;
        let response = client.get(url).send().map_err(|e| {
            debug!(error = %e, "request failed");
            transport_error(url, e.to_string())
        })?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| transport_error(url, format!("failed to read body: {}", e)))?;
        debug!(status, body_size = body.len(), "received response");
        Ok(HttpFetchResponse::new(status, body.to_vec()))
    }

    #[instrument(skip(self, service))]
    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> TypeRegResult<HttpServerHandle> {
        let address = config.address();
        let server = tiny_http::Server::http(&address).map_err(|e| {
            Box::new(TypeRegError::message(format!(
                "Failed to bind HTTP server to {}: {}",
                address, e
            )))
        })?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| crate::err!("HTTP server on {} has no IP address", address))?;
        info!(host = %config.host, port, "HTTP server listening");

        let handle = HttpServerHandle::new(port);
        let shutdown = handle.shutdown_flag().clone();
        let service: Arc<dyn HttpService> = Arc::from(service);
        let server_name: Arc<str> = Arc::from(config.server_name.as_str());

        thread::Builder::new()
            .name("http-accept".to_string())
            .spawn(move || {
                while !shutdown.load(std::sync::atomic::Ordering::SeqCst) {
                    let request = match server.recv_timeout(ACCEPT_POLL_INTERVAL) {
                        Ok(Some(request)) => request,
                        Ok(None) => continue,
                        Err(e) => {
                            error!(error = %e, "failed to accept request");
                            continue;
                        }
                    };
                    let service = Arc::clone(&service);
                    let server_name = Arc::clone(&server_name);
                    thread::spawn(move || {
                        handle_connection(service.as_ref(), request, &server_name)
                    });
                }
                info!("HTTP server stopped");
            })
            .map_err(|e| {
                Box::new(TypeRegError::message(format!(
                    "Failed to spawn HTTP accept thread: {}",
                    e
                )))
            })?;

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use tempfile::TempDir;

    fn setup_test_dir() -> (TempDir, RealPal) {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let pal = RealPal::new(temp_dir.path().to_path_buf());
        (temp_dir, pal)
    }

    #[test]
    fn test_file_exists() {
        let (temp_dir, pal) = setup_test_dir();
        fs::write(temp_dir.path().join("settings.toml"), "port = 1").unwrap();

        assert!(pal.file_exists(&FilePath::from("settings.toml")).unwrap());
        assert!(!pal.file_exists(&FilePath::from("missing.toml")).unwrap());
    }

    #[test]
    fn test_read_file_to_string() {
        let (temp_dir, pal) = setup_test_dir();
        fs::create_dir(temp_dir.path().join("conf")).unwrap();
        fs::write(temp_dir.path().join("conf/settings.toml"), "title = 'x'").unwrap();

        let content = pal
            .read_file_to_string(&FilePath::from("conf/settings.toml"))
            .unwrap();
        assert_eq!(content, "title = 'x'");
    }

    #[test]
    fn test_read_file_not_found() {
        let (_temp_dir, pal) = setup_test_dir();
        let err = pal.read_file(&FilePath::from("nope.toml")).err().unwrap();
        assert!(matches!(err.kind(), ErrorKind::FileError { .. }));
    }

    #[test]
    fn test_http_get_unreachable_host_is_transport_error() {
        let (_temp_dir, pal) = setup_test_dir();
        // Port 9 (discard) on localhost is not expected to be listening.
        let err = pal
            .http_get("http://127.0.0.1:9/formats.json", Duration::from_secs(2))
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UpstreamTransport { .. }));
    }

    #[derive(Debug)]
    struct EchoPathService;

    impl HttpService for EchoPathService {
        fn handle_request(&self, request: HttpRequest) -> TypeRegResult<HttpResponse> {
            if request.route_path() == "/boom" {
                crate::bail!("exploded");
            }
            Ok(HttpResponse::json(format!(
                r#"{{"path":"{}"}}"#,
                request.route_path()
            )))
        }
    }

    fn raw_get(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        write!(
            stream,
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_http_server_round_trip_and_shutdown() {
        let (_temp_dir, pal) = setup_test_dir();
        let handle = pal
            .start_http_server(Box::new(EchoPathService), HttpServerConfig::default())
            .unwrap();

        let response = raw_get(handle.port(), "/type/txt?x=1");
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#"{"path":"/type/txt"}"#));

        let failed = raw_get(handle.port(), "/boom");
        assert!(failed.starts_with("HTTP/1.1 599"));

        handle.shutdown();
        assert!(handle.is_shutdown());
    }
}
