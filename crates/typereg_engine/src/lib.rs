/* 📖 # What lives in typereg_engine?

Everything the service does between reading its settings and answering a request:
the format document and its queries, the cache that holds it, credential checks for
refresh, the HTTP API and the startup phase that wires them together.
*/

pub mod api;
pub mod auth;
pub mod cache;
pub mod formats;
pub mod settings;
pub mod startup;

pub use api::{ApiService, ServiceInfo};
pub use auth::{AuthError, CredentialVerifier, StaticApiKey};
pub use cache::{CacheSnapshot, FormatCache, FormatSource};
pub use formats::{FormatDocument, TypeGroup};
pub use settings::{Settings, load_settings};
pub use startup::{RunningService, start_service};
