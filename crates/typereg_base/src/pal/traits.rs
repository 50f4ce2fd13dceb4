use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use crate::TypeRegResult;
use crate::error::{ErrorKind, TypeRegError};

use super::file_path::FilePath;
use super::http::{HttpFetchResponse, HttpServerConfig, HttpServerHandle, HttpService};

/* 📖 # What goes through the Pal?

Every interaction with the outside world: reading configuration files, fetching the
remote format document and listening for HTTP requests. The engine only ever sees a
PalHandle, so tests swap in MockPal and control all three deterministically.
*/

/// Platform abstraction layer.
pub trait Pal: std::fmt::Debug + Send + Sync {
    /// Check whether a file exists.
    fn file_exists(&self, path: &FilePath) -> TypeRegResult<bool>;

    /// Open a file for reading.
    fn read_file(&self, path: &FilePath) -> TypeRegResult<Box<dyn Read + 'static>>;

    /// Read entire file contents as a UTF-8 string.
    fn read_file_to_string(&self, path: &FilePath) -> TypeRegResult<String> {
        let mut reader = self.read_file(path)?;
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).map_err(|e| {
            Box::new(TypeRegError::new(ErrorKind::FileError {
                path: path.as_path().to_path_buf(),
                source: e,
            }))
        })?;
        String::from_utf8(contents).map_err(|_e| crate::err!("File is not valid UTF-8: {}", path))
    }

    /// Perform a GET request against `url`.
    ///
    /// Returns the status and body for every response the remote sends, whatever the
    /// status. Fails with [`ErrorKind::UpstreamTransport`] when no response could be
    /// obtained within `timeout`.
    fn http_get(&self, url: &str, timeout: Duration) -> TypeRegResult<HttpFetchResponse>;

    /// Start an HTTP server with the given service.
    ///
    /// The server listens immediately; the returned handle reports the bound port
    /// and stops the server on `shutdown()`.
    fn start_http_server(
        &self,
        service: Box<dyn HttpService>,
        config: HttpServerConfig,
    ) -> TypeRegResult<HttpServerHandle>;
}

/// Handle to a PAL implementation, enabling shared ownership.
///
/// ```no_run
/// use typereg_base::{PalHandle, RealPal};
///
/// let pal = PalHandle::new(RealPal::new(".".into()));
/// let pal_clone = pal.clone(); // Cheap clone, shares the same implementation
/// ```
#[derive(Debug, Clone)]
pub struct PalHandle(Arc<dyn Pal>);

impl PalHandle {
    pub fn new(pal: impl Pal + 'static) -> Self {
        Self(Arc::new(pal))
    }
}

impl std::ops::Deref for PalHandle {
    type Target = dyn Pal;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}
