//! Tracing setup and PII redaction for the Themis core.
//!
//! The core never logs plaintext field values or key material directly;
//! call sites that must mention a value route it through [`PiiRedactor`]
//! first, and every fallible boundary in the other crates is wrapped in a
//! `tracing::instrument` span carrying identifiers (table, column, key_id)
//! but never payloads.

pub mod config;
pub mod redactor;

pub use config::LoggerConfig;
pub use redactor::{PiiRedactor, RedactionConfig};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber for a process embedding the
/// Themis core. Safe to call more than once; later calls are ignored.
pub fn init(config: &LoggerConfig) {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
