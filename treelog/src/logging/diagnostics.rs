//! Diagnostic sink
//!
//! Where the log store reports its own failures and mirrors records, the way
//! the platform log sits next to the file log. The default sink forwards to
//! `tracing`; `init_diagnostics` wires a subscriber with optional rotation.

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::Severity;

/// Fire-and-forget reporting channel. Implementations must not panic or block.
pub trait DiagnosticSink: Send + Sync {
    /// Report an internal failure
    fn emit(&self, tag: &str, message: &str, error: Option<&(dyn std::error::Error + 'static)>);

    /// Mirror a record written through one of the severity entry points
    fn echo(&self, _severity: Severity, _tag: &str, _message: &str) {}
}

/// Sink that turns everything into `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, tag: &str, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        match error {
            Some(err) => tracing::error!(tag, error = %err, "{}", message),
            None => tracing::error!(tag, "{}", message),
        }
    }

    fn echo(&self, severity: Severity, tag: &str, message: &str) {
        match severity {
            Severity::Verbose => tracing::trace!(tag, "{}", message),
            Severity::Debug => tracing::debug!(tag, "{}", message),
            Severity::Info => tracing::info!(tag, "{}", message),
            Severity::Warn => tracing::warn!(tag, "{}", message),
            Severity::Error | Severity::Assert => tracing::error!(tag, "{}", message),
        }
    }
}

/// Initialize the diagnostics subscriber
///
/// Console output always; when `log_dir` is given, also a daily rolling file
/// keeping 7 days. `RUST_LOG` overrides `level`.
pub fn init_diagnostics(level: &str, log_dir: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("treelog")
                .filename_suffix("log")
                .max_log_files(7)
                .build(dir)?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // The writer must outlive every event, which is the rest of the process
            std::mem::forget(guard);

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    if let Some(dir) = log_dir {
        tracing::debug!("Diagnostics mirrored to {:?}", dir);
    }
    Ok(())
}
