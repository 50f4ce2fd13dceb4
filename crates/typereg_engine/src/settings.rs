/* 📖 # How are settings layered?

Settings are read once at startup, lowest precedence first:

1. built-in defaults
2. `conf/settings.toml`
3. `conf/.secrets.toml` (kept out of version control, holds the API key)
4. `TYPEREG_*` environment variables

Each file may hold root-level keys, a `[default]` table and one table per environment
(`[development]`, `[production]`, ...). Within a file the order is root keys, then
`[default]`, then the table of the active environment, selected by `TYPEREG_ENV`.
Keys are case-insensitive, so `LOG_LEVEL` and `log_level` are the same setting.

Environment values are read as TOML literals where possible (`TYPEREG_PORT=8080` is an
integer) and as plain strings otherwise, so URLs and keys need no quoting.
*/

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::debug;
use typereg_base::error::{ErrorKind, TypeRegError};
use typereg_base::tracing::{LogConfig, LogFormat};
use typereg_base::{FilePath, Pal, TypeRegResult};

pub const SETTINGS_FILE: &str = "conf/settings.toml";
pub const SECRETS_FILE: &str = "conf/.secrets.toml";
pub const ENV_PREFIX: &str = "TYPEREG_";
pub const ENVIRONMENT_VAR: &str = "TYPEREG_ENV";
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_SERVICE_NAME: &str = "Type registry service";
pub const DEFAULT_PORT: u16 = 2023;

/// Settings exactly as found in the merged layers, before defaults and validation.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(default, deserialize_with = "lenient_string")]
    service_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    dans_formats_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    api_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    host: Option<String>,
    port: Option<u16>,
    fetch_timeout_secs: Option<u64>,
    #[serde(default, deserialize_with = "lenient_string")]
    log_file: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    log_level: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    log_format: Option<String>,
}

/// Accept any scalar for a string setting; `TYPEREG_API_KEY=123456` parses as an integer.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Integer(i64),
        Float(f64),
        Boolean(bool),
    }

    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
        Scalar::Text(text) => text,
        Scalar::Integer(value) => value.to_string(),
        Scalar::Float(value) => value.to_string(),
        Scalar::Boolean(value) => value.to_string(),
    }))
}

/// Validated service settings.
#[derive(Clone)]
pub struct Settings {
    /// Name of the active environment section.
    pub environment: String,
    pub service_name: String,
    pub title: String,
    pub description: String,
    /// URL of the remote format source.
    pub dans_formats_url: String,
    /// Static key expected as bearer token on refresh.
    pub api_key: String,
    pub host: String,
    pub port: u16,
    /// Timeout for requests to the remote format source.
    pub fetch_timeout: Duration,
    pub log: LogConfig,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("environment", &self.environment)
            .field("service_name", &self.service_name)
            .field("title", &self.title)
            .field("description", &self.description)
            .field("dans_formats_url", &self.dans_formats_url)
            .field("api_key", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("log", &self.log)
            .finish()
    }
}

fn config_error(key: &str, message: impl Into<String>) -> Box<TypeRegError> {
    Box::new(TypeRegError::new(ErrorKind::Config {
        key: key.to_string(),
        message: message.into(),
    }))
}

/// Merge the keys of one settings file into `merged`.
fn apply_file_layer(merged: &mut toml::Table, file: toml::Table, environment: &str) {
    let mut default_section = None;
    let mut environment_section = None;
    for (key, value) in file {
        let key = key.to_ascii_lowercase();
        match value {
            toml::Value::Table(section) if key == "default" => default_section = Some(section),
            toml::Value::Table(section) if key == environment => {
                environment_section = Some(section)
            }
            // Sections of other environments.
            toml::Value::Table(_) => {}
            value => {
                merged.insert(key, value);
            }
        }
    }
    for section in [default_section, environment_section].into_iter().flatten() {
        for (key, value) in section {
            merged.insert(key.to_ascii_lowercase(), value);
        }
    }
}

/// Interpret an environment value as a TOML literal, falling back to a plain string.
fn parse_env_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {}", raw))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

fn apply_env_layer(merged: &mut toml::Table, env: &HashMap<String, String>) {
    for (name, raw) in env {
        if name == ENVIRONMENT_VAR {
            continue;
        }
        if let Some(key) = name.strip_prefix(ENV_PREFIX) {
            debug!(variable = %name, "applying environment override");
            merged.insert(key.to_ascii_lowercase(), parse_env_value(raw));
        }
    }
}

fn read_layer(pal: &dyn Pal, path: &str) -> TypeRegResult<Option<toml::Table>> {
    let file_path = FilePath::from(path);
    if !pal.file_exists(&file_path)? {
        debug!(path, "settings file not present");
        return Ok(None);
    }
    let content = pal.read_file_to_string(&file_path)?;
    let table = toml::from_str::<toml::Table>(&content)
        .map_err(|e| config_error(path, format!("invalid TOML: {}", e)))?;
    Ok(Some(table))
}

fn require(value: Option<String>, key: &str) -> TypeRegResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(config_error(
            key,
            format!(
                "must be set in {}, {} or {}{}",
                SETTINGS_FILE,
                SECRETS_FILE,
                ENV_PREFIX,
                key.to_ascii_uppercase()
            ),
        )),
    }
}

impl Settings {
    fn from_raw(raw: RawSettings, environment: String) -> TypeRegResult<Self> {
        let dans_formats_url = require(raw.dans_formats_url, "dans_formats_url")?;
        let api_key = require(raw.api_key, "api_key")?;
        let service_name = raw
            .service_name
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
        let format = match raw.log_format {
            Some(name) => LogFormat::parse(&name).ok_or_else(|| {
                config_error(
                    "log_format",
                    format!("unknown format '{}', expected full, compact, pretty or json", name),
                )
            })?,
            None => LogFormat::default(),
        };
        let port = raw.port.unwrap_or(DEFAULT_PORT);
        Ok(Self {
            environment,
            title: raw.title.unwrap_or_else(|| service_name.clone()),
            service_name,
            description: raw.description.unwrap_or_default(),
            dans_formats_url,
            api_key,
            host: raw.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            fetch_timeout: Duration::from_secs(raw.fetch_timeout_secs.unwrap_or(30)),
            log: LogConfig {
                file: raw.log_file.filter(|f| !f.is_empty()).map(PathBuf::from),
                level: raw.log_level.unwrap_or_else(|| "info".to_string()),
                format,
            },
        })
    }
}

/// Load settings from the configuration files (read through the PAL) and `env`.
///
/// `env` is passed in rather than read from the process so callers control it;
/// the binary passes `std::env::vars()`.
pub fn load_settings(pal: &dyn Pal, env: &HashMap<String, String>) -> TypeRegResult<Settings> {
    let environment = env
        .get(ENVIRONMENT_VAR)
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
    debug!(environment = %environment, "loading settings");

    let mut merged = toml::Table::new();
    for path in [SETTINGS_FILE, SECRETS_FILE] {
        if let Some(layer) = read_layer(pal, path)? {
            apply_file_layer(&mut merged, layer, &environment);
        }
    }
    apply_env_layer(&mut merged, env);

    let raw: RawSettings = toml::Value::Table(merged)
        .try_into()
        .map_err(|e: toml::de::Error| config_error("settings", e.to_string()))?;
    Settings::from_raw(raw, environment)
}
