//! treelog
//!
//! Append-only text logging for storage that is only reachable through a
//! document provider (opaque ids, one round trip per navigation step), with a
//! plain filesystem fallback that rotates the file once it grows past a limit.

pub mod error;
pub mod logging;
pub mod provider;
pub mod resolver;
pub mod settings;

pub use error::{LogFault, StorageFault};
pub use logging::{LogRoot, LogStore, Severity};
pub use provider::{DirectoryEntry, DocumentProvider, DocumentRow, StorageHandle};
pub use resolver::TreeResolver;
pub use settings::LogSettings;
