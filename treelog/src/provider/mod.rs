//! Document Providers
//!
//! The capability surface the resolver and the tree backend depend on. A
//! provider exposes a hierarchical namespace through opaque document ids;
//! there is no path addressing, so every navigation step is a query.

pub mod fs;
pub mod memory;

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::StorageFault;

pub use fs::FsProvider;
pub use memory::MemoryProvider;

/// MIME type providers report for directories
pub const MIME_TYPE_DIR: &str = "vnd.android.document/directory";

/// MIME type used when the caller does not pick one
pub const MIME_TYPE_BINARY: &str = "application/octet-stream";

/// MIME type used for log files
pub const MIME_TYPE_TEXT: &str = "text/plain";

/// Opaque reference to a node in a provider-backed tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageHandle {
    /// Provider-assigned document id
    pub document_id: String,
    /// Id of the tree the document was reached through
    pub tree_id: String,
    /// Provider-supplied name, not guaranteed unique or path-like
    pub display_name: String,
}

impl StorageHandle {
    pub fn new(
        document_id: impl Into<String>,
        tree_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            tree_id: tree_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Build the handle of a child row reached through this handle's tree
    pub fn child(&self, row: &DocumentRow) -> Self {
        Self {
            document_id: row.document_id.clone(),
            tree_id: self.tree_id.clone(),
            display_name: row.display_name.clone(),
        }
    }
}

impl PartialEq for StorageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.tree_id == other.tree_id && self.document_id == other.document_id
    }
}

impl Eq for StorageHandle {}

/// One row of a provider query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub document_id: String,
    pub display_name: String,
    pub mime_type: String,
    pub size: Option<u64>,
}

impl DocumentRow {
    pub fn is_directory(&self) -> bool {
        self.mime_type == MIME_TYPE_DIR
    }
}

/// A child of a directory as returned by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub handle: StorageHandle,
    pub is_directory: bool,
    pub display_name: String,
}

/// Storage provider capability
///
/// Queries return `None` when the provider hands back no cursor at all
/// (unknown document, revoked grant). Mutating calls report a [`StorageFault`].
pub trait DocumentProvider: Send + Sync {
    /// Identity of the tree this provider serves. Two providers reporting the
    /// same id reach the same documents.
    fn tree_id(&self) -> &str;

    /// List the direct children of `parent`. Ordering is provider-defined.
    fn query_children(&self, parent: &StorageHandle) -> Option<Vec<DocumentRow>>;

    /// Metadata of a single document
    fn query_document(&self, handle: &StorageHandle) -> Option<DocumentRow>;

    /// Create a document under `parent`. Providers differ on duplicate names:
    /// some reject them, some return a suffixed display name.
    fn create_document(
        &self,
        parent: &StorageHandle,
        mime_type: &str,
        display_name: &str,
    ) -> Result<StorageHandle, StorageFault>;

    fn open_for_append(&self, handle: &StorageHandle) -> Result<Box<dyn Write + Send>, StorageFault>;

    fn open_for_read(&self, handle: &StorageHandle) -> Result<Box<dyn Read + Send>, StorageFault>;

    /// Open for writing, truncating the existing content
    fn open_for_overwrite(&self, handle: &StorageHandle)
        -> Result<Box<dyn Write + Send>, StorageFault>;

    /// Returns `Ok(false)` when the document was already gone
    fn delete_document(&self, handle: &StorageHandle) -> Result<bool, StorageFault>;
}
