/* 📖 # Why a single unified API service?

The ApiService is the only HttpService the binary registers. It does its own routing
on the query-less request path, so every route shares the same CORS headers, the same
`{"detail": ...}` error bodies and the same cache handle.

- `GET /` -> service name and version
- `GET /type/{filetype}` -> membership check for one extension
- `GET /type-list-simple` -> all extensions
- `GET /type-list-grouped` -> extensions per type
- `GET /dans-formats` -> the cached document as fetched
- `POST /dans-formats/refresh` -> re-fetch, bearer token required
- `GET /openapi.json` -> machine-readable description of the above

Expected failures (unknown route, wrong method, bad token, upstream failure) are
responses. An `Err` from `handle_request` means something unexpected broke, and the
server layer turns it into a 599.
*/

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use typereg_base::TypeRegResult;
use typereg_base::error::{ErrorKind, TypeRegError};
use typereg_base::pal::http::{HttpMethod, HttpRequest, HttpResponse, HttpService, HttpStatusCode};

use crate::auth::{CredentialVerifier, authorize};
use crate::cache::FormatCache;
use crate::formats::TypeGroup;

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
const ALLOW_HEADERS: &str = "Authorization, Content-Type";
const REQUEST_METHOD_HEADER: &str = "Access-Control-Request-Method";

/// Descriptive metadata of the running service.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub title: String,
    pub description: String,
    pub version: String,
}

impl ServiceInfo {
    /// Create service info whose title equals the name.
    ///
    /// ```
    /// use typereg_engine::ServiceInfo;
    ///
    /// let info = ServiceInfo::new("Type registry service", "0.1.0");
    /// assert_eq!(info.title, "Type registry service");
    /// ```
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            description: String::new(),
            version: version.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Serialize)]
struct InfoResponse<'a> {
    name: &'a str,
    version: &'a str,
}

#[derive(Serialize)]
struct CheckResponse<'a> {
    checked: &'a str,
    accepted: bool,
}

#[derive(Serialize)]
struct SimpleListResponse {
    list: Vec<String>,
}

#[derive(Serialize)]
struct GroupedListResponse {
    #[serde(rename = "type")]
    types: Vec<TypeGroup>,
}

#[derive(Serialize)]
struct DetailResponse<'a> {
    detail: &'a str,
}

/// Routes known to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Info,
    CheckType(String),
    TypeListSimple,
    TypeListGrouped,
    DansFormats,
    Refresh,
    OpenApi,
}

impl Route {
    /// Match a query-less path. Returns None for unknown paths.
    fn parse(path: &str) -> Option<Self> {
        let route = match path {
            "/" => Self::Info,
            "/type-list-simple" => Self::TypeListSimple,
            "/type-list-grouped" => Self::TypeListGrouped,
            "/dans-formats" => Self::DansFormats,
            "/dans-formats/refresh" => Self::Refresh,
            "/openapi.json" => Self::OpenApi,
            _ => {
                let decoded = urlencoding::decode(path.strip_prefix("/type/")?).ok()?;
                if decoded.is_empty() || decoded.contains('/') {
                    return None;
                }
                Self::CheckType(decoded.into_owned())
            }
        };
        Some(route)
    }

    fn method(&self) -> HttpMethod {
        match self {
            Self::Refresh => HttpMethod::Post,
            _ => HttpMethod::Get,
        }
    }
}

/// HTTP service answering every route of the type registry.
#[derive(Debug, Clone)]
pub struct ApiService {
    cache: FormatCache,
    verifier: Arc<dyn CredentialVerifier>,
    info: ServiceInfo,
}

impl ApiService {
    pub fn new(
        cache: FormatCache,
        verifier: Arc<dyn CredentialVerifier>,
        info: ServiceInfo,
    ) -> Self {
        Self {
            cache,
            verifier,
            info,
        }
    }

    pub fn info(&self) -> &ServiceInfo {
        &self.info
    }

    /// Serialize data to JSON and wrap in an HTTP 200 response.
    ///
    /// A serialization failure is an unexpected error and ends up as a 599.
    fn serialize_json_response<T: Serialize>(data: &T) -> TypeRegResult<HttpResponse> {
        serde_json::to_string(data)
            .map(HttpResponse::json)
            .map_err(|e| {
                Box::new(TypeRegError::message(format!(
                    "JSON serialization error: {}",
                    e
                )))
            })
    }

    fn detail_response(status: HttpStatusCode, detail: &str) -> TypeRegResult<HttpResponse> {
        Ok(Self::serialize_json_response(&DetailResponse { detail })?.with_status(status))
    }

    fn handle_info(&self) -> TypeRegResult<HttpResponse> {
        Self::serialize_json_response(&InfoResponse {
            name: &self.info.name,
            version: &self.info.version,
        })
    }

    fn handle_check(&self, extension: &str) -> TypeRegResult<HttpResponse> {
        let accepted = self.cache.get().document.check(extension);
        debug!(extension, accepted, "checked file type");
        Self::serialize_json_response(&CheckResponse {
            checked: extension,
            accepted,
        })
    }

    fn handle_list_simple(&self) -> TypeRegResult<HttpResponse> {
        Self::serialize_json_response(&SimpleListResponse {
            list: self.cache.get().document.list_extensions(),
        })
    }

    fn handle_list_grouped(&self) -> TypeRegResult<HttpResponse> {
        Self::serialize_json_response(&GroupedListResponse {
            types: self.cache.get().document.list_grouped(),
        })
    }

    fn handle_dans_formats(&self) -> TypeRegResult<HttpResponse> {
        Self::serialize_json_response(&self.cache.get().document)
    }

    fn handle_refresh(&self, request: &HttpRequest) -> TypeRegResult<HttpResponse> {
        if let Err(reason) = authorize(self.verifier.as_ref(), request.headers()) {
            warn!(?reason, "rejected refresh request");
            return Ok(Self::detail_response(HttpStatusCode::Unauthorized, reason.detail())?
                .with_header("WWW-Authenticate", "Bearer"));
        }

        match self.cache.refresh() {
            Ok(snapshot) => {
                info!(generation = snapshot.generation, "refresh requested by client succeeded");
                Self::serialize_json_response(snapshot.as_ref())
            }
            Err(e) => match e.kind() {
                ErrorKind::UpstreamStatus { .. } | ErrorKind::UpstreamTransport { .. } => {
                    warn!(error = %e, "refresh failed, keeping cached document");
                    Self::detail_response(HttpStatusCode::BadRequest, &e.kind().to_string())
                }
                _ => Err(e),
            },
        }
    }

    fn handle_openapi(&self) -> TypeRegResult<HttpResponse> {
        let get = |summary: &str| json!({"get": {"summary": summary}});
        let document = json!({
            "openapi": "3.1.0",
            "info": {
                "title": self.info.title,
                "description": self.info.description,
                "version": self.info.version,
            },
            "paths": {
                "/": get("Service name and version"),
                "/type/{filetype}": get("Check whether a file extension is an accepted format"),
                "/type-list-simple": get("All accepted file extensions"),
                "/type-list-grouped": get("Accepted file extensions per format type"),
                "/dans-formats": get("The cached format document"),
                "/dans-formats/refresh": {
                    "post": {
                        "summary": "Fetch the format document again",
                        "security": [{"bearer": []}],
                    }
                },
            },
            "components": {
                "securitySchemes": {"bearer": {"type": "http", "scheme": "bearer"}}
            },
        });
        Self::serialize_json_response(&document)
    }

    fn preflight_response() -> HttpResponse {
        HttpResponse::no_content()
            .with_header("Access-Control-Allow-Methods", ALLOW_METHODS)
            .with_header("Access-Control-Allow-Headers", ALLOW_HEADERS)
            .with_header("Access-Control-Allow-Credentials", "true")
    }

    fn route_request(&self, request: &HttpRequest) -> TypeRegResult<HttpResponse> {
        // Only CORS preflights are answered here; a bare OPTIONS is routed like any request.
        if request.method() == &HttpMethod::Options
            && request.headers().contains(REQUEST_METHOD_HEADER)
        {
            return Ok(Self::preflight_response());
        }

        let Some(route) = Route::parse(request.route_path()) else {
            return Self::detail_response(HttpStatusCode::NotFound, "Not Found");
        };
        let allowed = route.method();
        if request.method() != &allowed {
            return Ok(
                Self::detail_response(HttpStatusCode::MethodNotAllowed, "Method Not Allowed")?
                    .with_header("Allow", allowed.as_str()),
            );
        }

        match route {
            Route::Info => self.handle_info(),
            Route::CheckType(extension) => self.handle_check(&extension),
            Route::TypeListSimple => self.handle_list_simple(),
            Route::TypeListGrouped => self.handle_list_grouped(),
            Route::DansFormats => self.handle_dans_formats(),
            Route::Refresh => self.handle_refresh(request),
            Route::OpenApi => self.handle_openapi(),
        }
    }
}

impl HttpService for ApiService {
    fn handle_request(&self, request: HttpRequest) -> TypeRegResult<HttpResponse> {
        let response = self.route_request(&request)?;
        Ok(response.with_header("Access-Control-Allow-Origin", ALLOW_ORIGIN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use expect_test::expect;
    use typereg_base::{MockPal, PalHandle};

    use crate::auth::StaticApiKey;
    use crate::cache::FormatSource;

    const URL: &str = "https://formats.test/dans-formats.json";
    const TEXT_FORMATS: &str = r#"{"dans-formats":[{"type":"Text","format":[{"name":"Plain text","file-extension":"txt"},{"name":"CSV","file-extension":"csv"}]}]}"#;

    fn create_test_service() -> (MockPal, ApiService) {
        let mock = MockPal::new();
        mock.set_url_response(URL, 200, TEXT_FORMATS);
        let source = FormatSource::new(PalHandle::new(mock.clone()), URL, Duration::from_secs(5));
        let cache = FormatCache::load(source, "0.1.0").unwrap();
        let info = ServiceInfo::new("Type registry service", "0.1.0")
            .with_title("Type registry")
            .with_description("Accepted preservation formats");
        let service = ApiService::new(cache, Arc::new(StaticApiKey::new("s3cret")), info);
        (mock, service)
    }

    fn get(service: &ApiService, path: &str) -> HttpResponse {
        service
            .handle_request(HttpRequest::new(HttpMethod::Get, path))
            .unwrap()
    }

    fn body(response: &HttpResponse) -> String {
        response.body().as_string().unwrap()
    }

    fn refresh(service: &ApiService, authorization: Option<&str>) -> HttpResponse {
        let mut request = HttpRequest::new(HttpMethod::Post, "/dans-formats/refresh");
        if let Some(value) = authorization {
            request = request.with_header("Authorization", value);
        }
        service.handle_request(request).unwrap()
    }

    #[test]
    fn test_info_route() {
        let (_mock, service) = create_test_service();
        let response = get(&service, "/");
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers().get("Content-Type"),
            Some(&"application/json".to_string())
        );
        expect![[r#"{"name":"Type registry service","version":"0.1.0"}"#]].assert_eq(&body(&response));
    }

    #[test]
    fn test_check_type() {
        let (_mock, service) = create_test_service();
        expect![[r#"{"checked":"txt","accepted":true}"#]].assert_eq(&body(&get(&service, "/type/txt")));
        expect![[r#"{"checked":"pdf","accepted":false}"#]].assert_eq(&body(&get(&service, "/type/pdf")));
        expect![[r#"{"checked":"TXT","accepted":false}"#]].assert_eq(&body(&get(&service, "/type/TXT")));
    }

    #[test]
    fn test_check_type_decodes_path_segment() {
        let (_mock, service) = create_test_service();
        expect![[r#"{"checked":"tar gz","accepted":false}"#]]
            .assert_eq(&body(&get(&service, "/type/tar%20gz")));
    }

    #[test]
    fn test_check_type_ignores_query_string() {
        let (_mock, service) = create_test_service();
        expect![[r#"{"checked":"csv","accepted":true}"#]]
            .assert_eq(&body(&get(&service, "/type/csv?verbose=1")));
    }

    #[test]
    fn test_lists() {
        let (_mock, service) = create_test_service();
        expect![[r#"{"list":["txt","csv"]}"#]].assert_eq(&body(&get(&service, "/type-list-simple")));
        expect![[r#"{"type":[{"Text":["txt","csv"]}]}"#]]
            .assert_eq(&body(&get(&service, "/type-list-grouped")));
    }

    #[test]
    fn test_dans_formats_returns_document_verbatim() {
        let (_mock, service) = create_test_service();
        assert_eq!(body(&get(&service, "/dans-formats")), TEXT_FORMATS);
    }

    #[test]
    fn test_unknown_route_is_404() {
        let (_mock, service) = create_test_service();
        for path in ["/types", "/type/", "/type/a/b", "/type/a%2Fb", "/dans-formats/other"] {
            let response = get(&service, path);
            assert_eq!(response.status().as_u16(), 404, "{}", path);
            expect![[r#"{"detail":"Not Found"}"#]].assert_eq(&body(&response));
        }
    }

    #[test]
    fn test_wrong_method_is_405() {
        let (_mock, service) = create_test_service();
        let response = service
            .handle_request(HttpRequest::new(HttpMethod::Post, "/type-list-simple"))
            .unwrap();
        assert_eq!(response.status().as_u16(), 405);
        assert_eq!(response.headers().get("Allow"), Some(&"GET".to_string()));
        expect![[r#"{"detail":"Method Not Allowed"}"#]].assert_eq(&body(&response));

        let response = get(&service, "/dans-formats/refresh");
        assert_eq!(response.status().as_u16(), 405);
        assert_eq!(response.headers().get("Allow"), Some(&"POST".to_string()));
    }

    #[test]
    fn test_cors_headers() {
        let (_mock, service) = create_test_service();
        let response = get(&service, "/type-list-simple");
        assert_eq!(
            response.headers().get("Access-Control-Allow-Origin"),
            Some(&"*".to_string())
        );
        let missing = get(&service, "/nope");
        assert_eq!(
            missing.headers().get("Access-Control-Allow-Origin"),
            Some(&"*".to_string())
        );

        let preflight = service
            .handle_request(
                HttpRequest::new(HttpMethod::Options, "/dans-formats/refresh")
                    .with_header("Origin", "https://app.test")
                    .with_header("Access-Control-Request-Method", "POST"),
            )
            .unwrap();
        assert_eq!(preflight.status().as_u16(), 204);
        assert!(preflight.body().is_empty());
        assert_eq!(
            preflight.headers().get("Access-Control-Allow-Credentials"),
            Some(&"true".to_string())
        );
        assert!(preflight.headers().contains("Access-Control-Allow-Methods"));
        assert!(preflight.headers().contains("Access-Control-Allow-Headers"));
    }

    #[test]
    fn test_options_without_preflight_headers_is_routed() {
        let (_mock, service) = create_test_service();
        let known = service
            .handle_request(HttpRequest::new(HttpMethod::Options, "/type-list-simple"))
            .unwrap();
        assert_eq!(known.status().as_u16(), 405);
        assert_eq!(known.headers().get("Allow"), Some(&"GET".to_string()));

        let unknown = service
            .handle_request(HttpRequest::new(HttpMethod::Options, "/nope"))
            .unwrap();
        assert_eq!(unknown.status().as_u16(), 404);
        expect![[r#"{"detail":"Not Found"}"#]].assert_eq(&body(&unknown));
    }

    #[test]
    fn test_refresh_requires_credentials() {
        let (mock, service) = create_test_service();
        mock.set_url_response(URL, 200, r#"{"dans-formats":[]}"#);

        for authorization in [None, Some("Bearer wrong"), Some("Basic s3cret")] {
            let response = refresh(&service, authorization);
            assert_eq!(response.status().as_u16(), 401);
            assert_eq!(
                response.headers().get("WWW-Authenticate"),
                Some(&"Bearer".to_string())
            );
            expect![[r#"{"detail":"Forbidden"}"#]].assert_eq(&body(&response));
        }
        expect![[r#"{"list":["txt","csv"]}"#]].assert_eq(&body(&get(&service, "/type-list-simple")));
        assert_eq!(mock.requested_urls().len(), 1);
    }

    #[test]
    fn test_refresh_with_valid_key() {
        let (mock, service) = create_test_service();
        mock.set_url_response(
            URL,
            200,
            r#"{"dans-formats":[{"type":"Images","format":[{"file-extension":"tif"}]}]}"#,
        );

        let response = refresh(&service, Some("Bearer s3cret"));
        assert_eq!(response.status().as_u16(), 200);
        expect![[r#"{"dans_formats":{"dans-formats":[{"type":"Images","format":[{"file-extension":"tif"}]}]},"service-version":"0.1.0"}"#]]
            .assert_eq(&body(&response));
        expect![[r#"{"checked":"txt","accepted":false}"#]].assert_eq(&body(&get(&service, "/type/txt")));
    }

    #[test]
    fn test_refresh_upstream_failure_is_400() {
        let (mock, service) = create_test_service();
        mock.set_url_response(URL, 500, "boom");

        let response = refresh(&service, Some("Bearer s3cret"));
        assert_eq!(response.status().as_u16(), 400);
        expect![[r#"{"detail":"Response status code '500' from 'https://formats.test/dans-formats.json'"}"#]]
            .assert_eq(&body(&response));

        mock.set_url_unreachable(URL, "timed out");
        let response = refresh(&service, Some("Bearer s3cret"));
        assert_eq!(response.status().as_u16(), 400);
        expect![[r#"{"detail":"Request to 'https://formats.test/dans-formats.json' failed: timed out"}"#]]
            .assert_eq(&body(&response));

        assert_eq!(body(&get(&service, "/dans-formats")), TEXT_FORMATS);
    }

    #[test]
    fn test_openapi_uses_service_info() {
        let (_mock, service) = create_test_service();
        let response = get(&service, "/openapi.json");
        let document: serde_json::Value = serde_json::from_str(&body(&response)).unwrap();
        assert_eq!(document["info"]["title"], "Type registry");
        assert_eq!(document["info"]["description"], "Accepted preservation formats");
        assert_eq!(document["info"]["version"], "0.1.0");
        assert!(document["paths"]["/dans-formats/refresh"]["post"].is_object());
    }

    #[test]
    fn test_route_parse() {
        assert_eq!(Route::parse("/"), Some(Route::Info));
        assert_eq!(
            Route::parse("/type/pdf"),
            Some(Route::CheckType("pdf".to_string()))
        );
        assert_eq!(Route::parse("/type/%FF"), None);
        assert_eq!(Route::parse("/type/a%2Fb"), None);
        assert_eq!(Route::parse("/type/%2F"), None);
        assert_eq!(Route::parse("/unknown"), None);
        assert_eq!(Route::Refresh.method(), HttpMethod::Post);
    }
}
