use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_error::ErrorLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::{ErrorKind, TypeRegError, TypeRegResult};

pub use tracing::instrument;
pub use tracing::{debug, error, info, trace, warn};

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    /// Parse a format name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "full" => Some(Self::Full),
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Where and how log output is written.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log file to append to. Logs go to stdout when unset.
    pub file: Option<PathBuf>,
    /// Filter directive, e.g. `info` or `typereg_engine=debug,info`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: "info".to_string(),
            format: LogFormat::Full,
        }
    }
}

/// Build the filter for the given config. `RUST_LOG` wins over the configured level.
fn build_filter(config: &LogConfig) -> TypeRegResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| {
        Box::new(TypeRegError::new(ErrorKind::Config {
            key: "log_level".to_string(),
            message: e.to_string(),
        }))
    })
}

fn format_layer<W>(format: LogFormat, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(writer);
    match format {
        LogFormat::Full => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Install the global tracing subscriber.
pub fn init_tracing(config: &LogConfig) -> TypeRegResult<()> {
    let filter = build_filter(config)?;
    let fmt_layer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| {
                    Box::new(TypeRegError::new(ErrorKind::FileError {
                        path: path.clone(),
                        source,
                    }))
                })?;
            format_layer(config.format, Mutex::new(file))
        }
        None => format_layer(config.format, std::io::stdout),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| {
            Box::new(TypeRegError::message(format!(
                "Failed to install tracing subscriber: {}",
                e
            )))
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("Compact"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("FULL"), Some(LogFormat::Full));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert!(config.file.is_none());
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Full);
    }
}
