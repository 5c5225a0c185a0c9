use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to write logs to file
    #[serde(default = "default_file_logging")]
    pub file_logging: bool,

    /// Log file directory
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Log file name prefix, rotated daily
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Whether to log to console
    #[serde(default = "default_console_logging")]
    pub console_logging: bool,

    /// Log format (json, pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether to include target/module
    #[serde(default = "default_include_target")]
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_logging: default_file_logging(),
            log_dir: default_log_dir(),
            log_file: default_log_file(),
            console_logging: default_console_logging(),
            format: default_log_format(),
            include_target: default_include_target(),
        }
    }
}

// Default values
fn default_log_level() -> String { "info".to_string() }
fn default_file_logging() -> bool { false }
fn default_log_dir() -> PathBuf { PathBuf::from("logs") }
fn default_log_file() -> String { "faucet.log".to_string() }
fn default_console_logging() -> bool { true }
fn default_log_format() -> String { "pretty".to_string() }
fn default_include_target() -> bool { true }

/// Log format types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl From<&str> for LogFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Initialize logging system.
///
/// Returns the file writer guard when file logging is enabled; it must be kept
/// alive until the program exits or buffered lines are lost.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let format = LogFormat::from(config.format.as_str());
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.console_logging {
        let layer = fmt::layer().with_target(config.include_target);
        let filter = build_env_filter(config)?;
        layers.push(match format {
            LogFormat::Json => layer.json().with_filter(filter).boxed(),
            LogFormat::Compact => layer.compact().with_filter(filter).boxed(),
            LogFormat::Pretty => layer.pretty().with_filter(filter).boxed(),
        });
    }

    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);

        // Files always get JSON lines regardless of the console format.
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_target(config.include_target)
                .with_writer(writer)
                .with_filter(build_env_filter(config)?)
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::info!("Logging system initialized with level: {}", config.level);
    Ok(guard)
}

/// Build environment filter from configuration
fn build_env_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let mut filter_string = config.level.clone();

    // Add RUST_LOG environment variable if present
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        if !rust_log.is_empty() {
            filter_string.push(',');
            filter_string.push_str(&rust_log);
        }
    }

    Ok(EnvFilter::try_new(filter_string)?)
}

/// Initialize logging for testing. Safe to call from several tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
        assert!(config.console_logging);
        assert!(!config.file_logging);
        assert_eq!(config.log_file, "faucet.log");
    }

    #[test]
    fn test_log_format_conversion() {
        assert_eq!(LogFormat::from("json"), LogFormat::Json);
        assert_eq!(LogFormat::from("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::from("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from("invalid"), LogFormat::Pretty); // default
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: LoggingConfig = serde_json::from_str(r#"{"level":"debug"}"#).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, "pretty");
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_env_filter_building() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };
        let filter = build_env_filter(&config).unwrap();
        assert!(filter.to_string().contains("warn"));
    }
}
