use thiserror::Error;

/// Failures reported by a document provider
#[derive(Debug, Error)]
pub enum StorageFault {
    #[error("Permission denied for document {document_id}")]
    PermissionDenied { document_id: String },

    #[error("Document not found: {document_id}")]
    NotFound { document_id: String },

    #[error("Invalid display name: {name:?}")]
    InvalidName { name: String },

    #[error("Provider rejected the request: {reason}")]
    Rejected { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a log write that did not reach the file
#[derive(Debug, Error)]
pub enum LogFault {
    /// Logging is switched off; nothing was attempted
    #[error("Logging is disabled")]
    Disabled,

    /// No storage root has been configured yet
    #[error("No log root configured")]
    Unconfigured,

    /// The tree backend could not find the log file under the root
    #[error("Log file {file_name:?} not found under the configured root")]
    Unresolved { file_name: String },

    #[error("Log write failed: {0}")]
    WriteFailed(#[from] StorageFault),
}

impl From<std::io::Error> for LogFault {
    fn from(err: std::io::Error) -> Self {
        LogFault::WriteFailed(StorageFault::Io(err))
    }
}
