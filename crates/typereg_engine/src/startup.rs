/* 📖 # Why a separate startup phase?

The service must not accept requests before the format document has been fetched once.
`start_service` does the fetch first and only then binds the listening socket, so a
failing format source means no server at all. The caller decides what happens next;
the binary logs the error and exits.
*/

use std::sync::Arc;

use tracing::info;

use typereg_base::pal::http::{HttpServerConfig, HttpServerHandle};
use typereg_base::{PalHandle, ResultExt, TypeRegResult};

use crate::api::{ApiService, ServiceInfo};
use crate::auth::StaticApiKey;
use crate::cache::{FormatCache, FormatSource};
use crate::settings::Settings;

/// A service that is accepting requests.
#[derive(Debug, Clone)]
pub struct RunningService {
    pub handle: HttpServerHandle,
    pub cache: FormatCache,
}

/// Fetch the format document, then start the HTTP server.
pub fn start_service(
    pal: PalHandle,
    settings: &Settings,
    version: &str,
) -> TypeRegResult<RunningService> {
    let source = FormatSource::new(
        pal.clone(),
        settings.dans_formats_url.clone(),
        settings.fetch_timeout,
    );
    let cache = FormatCache::load(source, version)
        .context("Failed to load the initial format document")?;
    info!(
        types = ?cache.get().document.type_names(),
        "available format types"
    );

    let info = ServiceInfo::new(settings.service_name.clone(), version)
        .with_title(settings.title.clone())
        .with_description(settings.description.clone());
    let service = ApiService::new(
        cache.clone(),
        Arc::new(StaticApiKey::new(settings.api_key.clone())),
        info,
    );

    let config = HttpServerConfig::new(settings.host.clone())
        .with_port(settings.port)
        .with_server_name(settings.service_name.clone());
    let handle = pal
        .start_http_server(Box::new(service), config)
        .context("Failed to start the HTTP server")?;
    info!(
        address = %handle.address(&settings.host),
        environment = %settings.environment,
        "service started"
    );

    Ok(RunningService { handle, cache })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use typereg_base::error::ErrorKind;
    use typereg_base::pal::http::{HttpMethod, HttpRequest};
    use typereg_base::{FilePath, MockPal};

    use crate::settings::load_settings;

    const URL: &str = "https://formats.test/dans-formats.json";

    fn settings_for(mock: &MockPal) -> Settings {
        mock.add_file(
            FilePath::from("conf/settings.toml"),
            format!(
                "[default]\ndans_formats_url = \"{}\"\napi_key = \"s3cret\"\nport = 8123\n",
                URL
            )
            .into_bytes(),
        );
        load_settings(mock, &HashMap::new()).unwrap()
    }

    #[test]
    fn test_start_service_serves_on_configured_port() {
        let mock = MockPal::new();
        mock.set_url_response(URL, 200, r#"{"formats":[{"type":"Text","format":[{"file-extension":"txt"}]}]}"#);
        let settings = settings_for(&mock);

        let running = start_service(PalHandle::new(mock.clone()), &settings, "0.1.0").unwrap();
        assert_eq!(running.handle.port(), 8123);
        assert_eq!(mock.http_server_count(), 1);

        let response = mock
            .simulate_request(8123, HttpRequest::new(HttpMethod::Get, "/type/txt"))
            .unwrap();
        assert_eq!(
            response.body().as_string().unwrap(),
            r#"{"checked":"txt","accepted":true}"#
        );
    }

    #[test]
    fn test_start_service_fails_without_document() {
        let mock = MockPal::new();
        mock.set_url_response(URL, 500, "");
        let settings = settings_for(&mock);

        let err = start_service(PalHandle::new(mock.clone()), &settings, "0.1.0").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UpstreamStatus { status: 500, .. }));
        assert_eq!(
            err.get_context(),
            ["Failed to load the initial format document".to_string()]
        );
        assert_eq!(mock.http_server_count(), 0);
    }
}
