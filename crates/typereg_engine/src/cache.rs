/* 📖 # Why can't the cache be empty?

A `FormatCache` value only comes out of a successful `load()`. There is no "not yet
fetched" state to check on every request: the startup phase either gets a cache or
the process never starts serving.

Refresh fetches and parses the new document before taking the lock, then swaps one
`Arc`. Readers clone the current `Arc` under a read lock and query it without holding
anything, so a request sees either the old document or the new one, never a mix.
*/

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde::ser::SerializeMap;
use tracing::{debug, info, instrument, warn};

use typereg_base::error::{ErrorKind, TypeRegError};
use typereg_base::{PalHandle, TypeRegResult};

use crate::formats::FormatDocument;

/// Key the document is stored under in the serialized cache.
pub const CACHE_KEY: &str = "dans_formats";
/// Key of the service version in the serialized cache.
pub const SERVICE_VERSION_KEY: &str = "service-version";

/// Where the format document is fetched from.
#[derive(Debug, Clone)]
pub struct FormatSource {
    pal: PalHandle,
    url: String,
    timeout: Duration,
}

impl FormatSource {
    pub fn new(pal: PalHandle, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pal,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the document. Anything but a 200 with a JSON body is an error.
    #[instrument(skip(self), fields(url = %self.url))]
    pub fn fetch(&self) -> TypeRegResult<FormatDocument> {
        let response = self.pal.http_get(&self.url, self.timeout)?;
        if response.status != 200 {
            warn!(status = response.status, "format source answered with an error status");
            return Err(Box::new(TypeRegError::new(ErrorKind::UpstreamStatus {
                url: self.url.clone(),
                status: response.status,
            })));
        }
        let document = FormatDocument::from_slice(&response.body).map_err(|e| {
            Box::new(TypeRegError::new(ErrorKind::UpstreamTransport {
                url: self.url.clone(),
                message: format!("response body is not valid JSON: {}", e),
            }))
        })?;
        debug!(body_size = response.body.len(), "fetched format document");
        Ok(document)
    }
}

/// One immutable state of the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    pub document: FormatDocument,
    pub service_version: String,
    /// Number of successful refreshes before this snapshot; 0 for the startup load.
    pub generation: u64,
}

impl CacheSnapshot {
    /// Serialize as `{"dans_formats": ..., "service-version": ...}`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for CacheSnapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(CACHE_KEY, &self.document)?;
        map.serialize_entry(SERVICE_VERSION_KEY, &self.service_version)?;
        map.end()
    }
}

/// Shared, swappable holder of the current format document.
///
/// Clones share the same slot.
#[derive(Debug, Clone)]
pub struct FormatCache {
    source: FormatSource,
    current: Arc<RwLock<Arc<CacheSnapshot>>>,
}

impl FormatCache {
    /// Fetch the document for the first time.
    pub fn load(source: FormatSource, service_version: impl Into<String>) -> TypeRegResult<Self> {
        let document = source.fetch()?;
        let snapshot = CacheSnapshot {
            document,
            service_version: service_version.into(),
            generation: 0,
        };
        info!(url = source.url(), "format document loaded");
        Ok(Self {
            source,
            current: Arc::new(RwLock::new(Arc::new(snapshot))),
        })
    }

    /// The current snapshot.
    pub fn get(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Fetch the document again and replace the cached one.
    ///
    /// On failure the cached document stays as it was.
    pub fn refresh(&self) -> TypeRegResult<Arc<CacheSnapshot>> {
        let document = self.source.fetch()?;
        let mut current = self.current.write();
        let snapshot = Arc::new(CacheSnapshot {
            document,
            service_version: current.service_version.clone(),
            generation: current.generation + 1,
        });
        *current = Arc::clone(&snapshot);
        drop(current);
        info!(generation = snapshot.generation, "format document refreshed");
        Ok(snapshot)
    }

    pub fn service_version(&self) -> String {
        self.get().service_version.clone()
    }

    pub fn source(&self) -> &FormatSource {
        &self.source
    }
}
