//! # Observability
//!
//! Centralized logging layer for the Knugget client processes.
//!
//! Every binary is a **log producer**: it calls [`init`] once at startup and
//! uses standard `tracing` macros everywhere else. Producers have no
//! knowledge of where logs go or who consumes them.
//!
//! All processes append structured JSONL to a single central file,
//! `~/.knugget/logs/knugget.jsonl` by default, which makes
//! `tail -f ~/.knugget/logs/knugget.jsonl | jq` the whole story for local
//! debugging. Multi-process safety comes from append-only writes with
//! per-line flush semantics.
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init("knugget");
//!     tracing::info!("ready");
//! }
//! ```

mod json_layer;
mod writer;

use std::io;
use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use json_layer::JsonLayer;
pub use writer::CentralLogWriter;
use writer::WriterFactory;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the emitting process (e.g. "knugget", "bridge-peer").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g. "debug", "info").
    /// Overridden by the `RUST_LOG` environment variable when set.
    pub default_level: String,

    /// Custom log file path. Defaults to `~/.knugget/logs/knugget.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit a compact rendering to stderr for immediate feedback.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".knugget")
        .join("logs")
        .join("knugget.jsonl")
}

/// Initialize the logging layer with default settings.
///
/// # Panics
///
/// Panics if the log file cannot be created or opened.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the logging layer with custom configuration.
///
/// ```rust,ignore
/// observability::init_with_config(observability::LogConfig {
///     service_name: "knugget".into(),
///     default_level: "debug".into(),
///     also_stderr: true,
///     ..Default::default()
/// });
/// ```
pub fn init_with_config(config: LogConfig) {
    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);

    let writer = CentralLogWriter::new(&log_path)
        .unwrap_or_else(|e| panic!("failed to open log file {:?}: {}", log_path, e));

    let json_layer = JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer));

    let stderr_layer = if config.also_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(io::stderr)
                .with_ansi(true),
        )
    } else {
        None
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter))
        .with(stderr_layer.map(|l| {
            l.with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
        }))
        .init();

    tracing::info!(
        log_path = %log_path.display(),
        "observability initialized"
    );
}

/// Re-export tracing macros so callers can use `observability::info!()`
/// interchangeably with `tracing::info!()`.
pub use tracing::{debug, error, info, instrument, span, trace, warn, Level};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }

    #[test]
    fn test_default_path_is_under_knugget_home() {
        let path = default_log_path();
        let rendered = path.to_string_lossy();
        assert!(rendered.contains(".knugget"));
        assert!(rendered.ends_with("knugget.jsonl"));
    }
}
