//! Logging initialization for Knugget processes.
//!
//! Thin wrapper over the observability crate. All client processes write
//! structured JSONL to `~/.knugget/logs/knugget.jsonl`.

#[allow(unused_imports)]
pub use observability::{init, init_with_config, LogConfig};

/// Initialize the logging system for the client.
///
/// Sets up tracing with:
/// - Structured JSONL output to `~/.knugget/logs/knugget.jsonl`
/// - Log level from RUST_LOG env var or the provided default
/// - Service name included in every log line
///
/// # Example
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("client started");
/// ```
pub fn init_logging(level: &str) {
    observability::init_with_config(observability::LogConfig {
        service_name: "knugget".into(),
        default_level: level.into(),
        also_stderr: true, // Show logs on stderr for foreground mode
        ..Default::default()
    });
}
