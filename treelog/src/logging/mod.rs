//! Logging module with size rotation and export capabilities
//!
//! Provides the append-only log store, its two storage backends, the
//! diagnostics channel it reports through, and export helpers for support
//! debugging.

pub mod backend;
pub mod commands;
pub mod diagnostics;
pub mod line;
pub mod severity;
pub mod store;

pub use backend::{LegacyPathBackend, LogBackend, LogRoot, TreeProviderBackend};
pub use commands::{clear_log, export_logs, log_info, LogInfo};
pub use diagnostics::{init_diagnostics, DiagnosticSink, TracingSink};
pub use severity::Severity;
pub use store::{normalize_path, LogListener, LogStore, DEFAULT_LOG_FILE, DEFAULT_MAX_BYTES};
