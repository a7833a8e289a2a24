//! In-memory document provider
//!
//! A virtual tree with opaque ids, used by tests and by callers that want a
//! scratch tree. Children keep insertion order and duplicate display names are
//! allowed, as with the more permissive platform providers.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::{DocumentProvider, DocumentRow, StorageHandle, MIME_TYPE_DIR};
use crate::error::StorageFault;

/// Most recent listings kept for inspection
const LISTING_HISTORY: usize = 256;

#[derive(Debug)]
struct Node {
    parent: Option<String>,
    display_name: String,
    mime_type: String,
    data: Vec<u8>,
    children: Vec<String>,
}

impl Node {
    fn row(&self, document_id: &str) -> DocumentRow {
        let is_dir = self.mime_type == MIME_TYPE_DIR;
        DocumentRow {
            document_id: document_id.to_string(),
            display_name: self.display_name.clone(),
            mime_type: self.mime_type.clone(),
            size: if is_dir { None } else { Some(self.data.len() as u64) },
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<String, Node>,
    revoked: bool,
    /// Parent ids of the latest `query_children` calls, oldest first
    listed: VecDeque<String>,
    listings: usize,
    creates: usize,
}

/// Provider backed by an in-process tree
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    tree_id: String,
    root_id: String,
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        let root_id = Uuid::new_v4().to_string();
        let mut inner = Inner::default();
        inner.nodes.insert(
            root_id.clone(),
            Node {
                parent: None,
                display_name: "root".to_string(),
                mime_type: MIME_TYPE_DIR.to_string(),
                data: Vec::new(),
                children: Vec::new(),
            },
        );

        Self {
            tree_id: Uuid::new_v4().to_string(),
            root_id,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Handle of the tree root, the entry point a user would grant
    pub fn root_handle(&self) -> StorageHandle {
        StorageHandle::new(self.root_id.clone(), self.tree_id.clone(), "root")
    }

    /// Parent document id, `None` for the root or unknown ids
    pub fn parent_of(&self, document_id: &str) -> Option<String> {
        self.lock().nodes.get(document_id).and_then(|n| n.parent.clone())
    }

    /// Simulate the user revoking the tree grant
    pub fn revoke(&self) {
        self.lock().revoked = true;
    }

    pub fn restore(&self) {
        self.lock().revoked = false;
    }

    /// Number of `query_children` calls served so far
    pub fn child_query_count(&self) -> usize {
        self.lock().listings
    }

    /// Parent ids of the last `n` listings, oldest first. Only the latest
    /// 256 are remembered.
    pub fn recent_listings(&self, n: usize) -> Vec<String> {
        let inner = self.lock();
        let skip = inner.listed.len().saturating_sub(n);
        inner.listed.iter().skip(skip).cloned().collect()
    }

    pub fn create_count(&self) -> usize {
        self.lock().creates
    }

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Current bytes of a document, bypassing the provider surface
    pub fn contents(&self, handle: &StorageHandle) -> Option<Vec<u8>> {
        self.lock().nodes.get(&handle.document_id).map(|n| n.data.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_access(&self, inner: &Inner, handle: &StorageHandle) -> Result<(), StorageFault> {
        if inner.revoked || handle.tree_id != self.tree_id {
            return Err(StorageFault::PermissionDenied {
                document_id: handle.document_id.clone(),
            });
        }
        if !inner.nodes.contains_key(&handle.document_id) {
            return Err(StorageFault::NotFound {
                document_id: handle.document_id.clone(),
            });
        }
        Ok(())
    }

    fn open_writer(
        &self,
        handle: &StorageHandle,
        truncate: bool,
    ) -> Result<Box<dyn Write + Send>, StorageFault> {
        let inner = self.lock();
        self.check_access(&inner, handle)?;
        if inner.nodes[&handle.document_id].mime_type == MIME_TYPE_DIR {
            return Err(StorageFault::Rejected {
                reason: format!("{} is a directory", handle.display_name),
            });
        }

        Ok(Box::new(MemoryWriter {
            inner: Arc::clone(&self.inner),
            document_id: handle.document_id.clone(),
            buffer: Vec::new(),
            truncate,
        }))
    }
}

impl DocumentProvider for MemoryProvider {
    fn tree_id(&self) -> &str {
        &self.tree_id
    }

    fn query_children(&self, parent: &StorageHandle) -> Option<Vec<DocumentRow>> {
        let mut inner = self.lock();
        if inner.revoked || parent.tree_id != self.tree_id {
            return None;
        }
        inner.listings += 1;
        if inner.listed.len() == LISTING_HISTORY {
            inner.listed.pop_front();
        }
        inner.listed.push_back(parent.document_id.clone());

        let node = inner.nodes.get(&parent.document_id)?;
        let rows = node
            .children
            .iter()
            .filter_map(|id| inner.nodes.get(id).map(|child| child.row(id)))
            .collect();
        Some(rows)
    }

    fn query_document(&self, handle: &StorageHandle) -> Option<DocumentRow> {
        let inner = self.lock();
        if inner.revoked || handle.tree_id != self.tree_id {
            return None;
        }
        inner
            .nodes
            .get(&handle.document_id)
            .map(|n| n.row(&handle.document_id))
    }

    fn create_document(
        &self,
        parent: &StorageHandle,
        mime_type: &str,
        display_name: &str,
    ) -> Result<StorageHandle, StorageFault> {
        if display_name.is_empty() || display_name.contains('/') {
            return Err(StorageFault::InvalidName {
                name: display_name.to_string(),
            });
        }

        let mut inner = self.lock();
        self.check_access(&inner, parent)?;
        if inner.nodes[&parent.document_id].mime_type != MIME_TYPE_DIR {
            return Err(StorageFault::Rejected {
                reason: format!("{} is not a directory", parent.display_name),
            });
        }

        let id = Uuid::new_v4().to_string();
        inner.nodes.insert(
            id.clone(),
            Node {
                parent: Some(parent.document_id.clone()),
                display_name: display_name.to_string(),
                mime_type: mime_type.to_string(),
                data: Vec::new(),
                children: Vec::new(),
            },
        );
        if let Some(p) = inner.nodes.get_mut(&parent.document_id) {
            p.children.push(id.clone());
        }
        inner.creates += 1;

        Ok(StorageHandle::new(id, self.tree_id.clone(), display_name))
    }

    fn open_for_append(&self, handle: &StorageHandle) -> Result<Box<dyn Write + Send>, StorageFault> {
        self.open_writer(handle, false)
    }

    fn open_for_read(&self, handle: &StorageHandle) -> Result<Box<dyn Read + Send>, StorageFault> {
        let inner = self.lock();
        self.check_access(&inner, handle)?;
        let data = inner.nodes[&handle.document_id].data.clone();
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_for_overwrite(
        &self,
        handle: &StorageHandle,
    ) -> Result<Box<dyn Write + Send>, StorageFault> {
        self.open_writer(handle, true)
    }

    fn delete_document(&self, handle: &StorageHandle) -> Result<bool, StorageFault> {
        let mut inner = self.lock();
        if inner.revoked || handle.tree_id != self.tree_id {
            return Err(StorageFault::PermissionDenied {
                document_id: handle.document_id.clone(),
            });
        }
        if handle.document_id == self.root_id {
            return Err(StorageFault::Rejected {
                reason: "the tree root cannot be deleted".to_string(),
            });
        }
        let Some(node) = inner.nodes.remove(&handle.document_id) else {
            return Ok(false);
        };

        if let Some(parent) = node.parent.as_ref().and_then(|p| inner.nodes.get_mut(p)) {
            parent.children.retain(|c| c != &handle.document_id);
        }
        let mut pending = node.children;
        while let Some(id) = pending.pop() {
            if let Some(child) = inner.nodes.remove(&id) {
                pending.extend(child.children);
            }
        }
        Ok(true)
    }
}

/// Buffers writes and commits them to the node on flush or drop
struct MemoryWriter {
    inner: Arc<Mutex<Inner>>,
    document_id: String,
    buffer: Vec<u8>,
    truncate: bool,
}

impl MemoryWriter {
    fn commit(&mut self) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.revoked {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "grant revoked"));
        }
        let node = inner
            .nodes
            .get_mut(&self.document_id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "document was deleted"))?;
        if self.truncate {
            node.data.clear();
            self.truncate = false;
        }
        node.data.append(&mut self.buffer);
        Ok(())
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit()
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if !self.buffer.is_empty() || self.truncate {
            let _ = self.commit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MIME_TYPE_TEXT;

    #[test]
    fn test_create_and_list_children() {
        let provider = MemoryProvider::new();
        let root = provider.root_handle();

        provider.create_document(&root, MIME_TYPE_DIR, "logs").unwrap();
        provider.create_document(&root, MIME_TYPE_TEXT, "a.txt").unwrap();

        let rows = provider.query_children(&root).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].display_name, "logs");
        assert!(rows[0].is_directory());
        assert_eq!(rows[1].display_name, "a.txt");
        assert_eq!(rows[1].size, Some(0));
        assert_eq!(provider.create_count(), 2);
    }

    #[test]
    fn test_duplicate_names_allowed() {
        let provider = MemoryProvider::new();
        let root = provider.root_handle();

        let a = provider.create_document(&root, MIME_TYPE_DIR, "dup").unwrap();
        let b = provider.create_document(&root, MIME_TYPE_DIR, "dup").unwrap();
        assert_ne!(a, b);
        assert_eq!(provider.query_children(&root).unwrap().len(), 2);
    }

    #[test]
    fn test_writes_commit_on_drop() {
        let provider = MemoryProvider::new();
        let root = provider.root_handle();
        let file = provider.create_document(&root, MIME_TYPE_TEXT, "log.txt").unwrap();

        {
            let mut w = provider.open_for_append(&file).unwrap();
            w.write_all(b"one\n").unwrap();
        }
        {
            let mut w = provider.open_for_append(&file).unwrap();
            w.write_all(b"two\n").unwrap();
        }
        assert_eq!(provider.contents(&file).unwrap(), b"one\ntwo\n");

        {
            let mut w = provider.open_for_overwrite(&file).unwrap();
            w.write_all(b"fresh").unwrap();
        }
        assert_eq!(provider.contents(&file).unwrap(), b"fresh");
    }

    #[test]
    fn test_listing_history_is_bounded() {
        let provider = MemoryProvider::new();
        let root = provider.root_handle();
        let dir = provider.create_document(&root, MIME_TYPE_DIR, "d").unwrap();

        for _ in 0..LISTING_HISTORY + 10 {
            provider.query_children(&root).unwrap();
        }
        provider.query_children(&dir).unwrap();

        assert_eq!(provider.child_query_count(), LISTING_HISTORY + 11);
        assert_eq!(provider.recent_listings(usize::MAX).len(), LISTING_HISTORY);
        assert_eq!(
            provider.recent_listings(2),
            vec![root.document_id.clone(), dir.document_id.clone()]
        );
    }

    #[test]
    fn test_revoked_grant() {
        let provider = MemoryProvider::new();
        let root = provider.root_handle();
        provider.revoke();

        assert!(provider.query_children(&root).is_none());
        let err = provider.create_document(&root, MIME_TYPE_DIR, "x").unwrap_err();
        assert!(matches!(err, StorageFault::PermissionDenied { .. }));

        provider.restore();
        assert!(provider.query_children(&root).is_some());
    }

    #[test]
    fn test_delete_is_recursive() {
        let provider = MemoryProvider::new();
        let root = provider.root_handle();
        let dir = provider.create_document(&root, MIME_TYPE_DIR, "a").unwrap();
        provider.create_document(&dir, MIME_TYPE_TEXT, "f.txt").unwrap();
        assert_eq!(provider.node_count(), 3);

        assert!(provider.delete_document(&dir).unwrap());
        assert_eq!(provider.node_count(), 1);
        assert!(!provider.delete_document(&dir).unwrap());
        assert!(provider.query_children(&root).unwrap().is_empty());
    }

    #[test]
    fn test_foreign_tree_rejected() {
        let provider = MemoryProvider::new();
        let other = MemoryProvider::new();
        assert!(provider.query_children(&other.root_handle()).is_none());
    }
}
