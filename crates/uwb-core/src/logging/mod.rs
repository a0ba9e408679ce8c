//! Structured logging foundation for the pipeline.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for batch jobs
//!
//! # Usage
//!
//! ```ignore
//! use uwb_core::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::from_env());
//! ```
//!
//! All output goes to stderr. Every ingestion and export call carries a
//! `call_id` field so interleaved calls can be told apart.

pub mod config;
pub mod events;

pub use config::{LogConfig, LogFormat};
pub use events::event_names;

use std::io::IsTerminal;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events pass the default filter.
const PIPELINE_TARGETS: &[&str] = &[
    "uwb_core",
    "uwb_wire",
    "uwb_export",
    "resolve",
    "decode",
    "ingest",
    "status",
    "export",
];

fn default_filter(level: LevelFilter) -> EnvFilter {
    let level = level.to_string().to_lowercase();
    let directives = PIPELINE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::new(directives)
}

/// Initialize the logging subsystem.
///
/// A full `RUST_LOG` directive string wins over `config.level`. Calling this
/// twice is harmless: the second subscriber is not installed.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_env("UWB_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| default_filter(config.level));

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(use_ansi);
            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Logging already initialized; keeping existing subscriber");
    }
}

/// Initialize logging with defaults (for tests and simple cases).
pub fn init_default_logging() {
    init_logging(&LogConfig::from_env());
}

/// Generate a unique id for one ingestion or export call.
pub fn generate_call_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("call-{}", &uuid[..12])
}
