//! Tree Resolver
//!
//! Locates or materializes entries in a provider-backed tree. The provider
//! offers no indexed lookup, so resolution is done by listing directories one
//! query at a time.

use std::collections::{HashSet, VecDeque};
use std::io::{self, Write};
use std::sync::Arc;

use percent_encoding::percent_decode_str;

use crate::error::StorageFault;
use crate::provider::{
    DirectoryEntry, DocumentProvider, StorageHandle, MIME_TYPE_BINARY, MIME_TYPE_DIR,
};

/// Search and creation helpers over a [`DocumentProvider`]
#[derive(Clone)]
pub struct TreeResolver {
    provider: Arc<dyn DocumentProvider>,
}

impl TreeResolver {
    pub fn new(provider: Arc<dyn DocumentProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn DocumentProvider> {
        &self.provider
    }

    /// List the children of `parent` with one provider query.
    ///
    /// Never fails: a missing cursor yields an empty list. With both filters
    /// off every entry is returned.
    pub fn list_children(
        &self,
        parent: &StorageHandle,
        only_directories: bool,
        only_files: bool,
    ) -> Vec<DirectoryEntry> {
        let Some(rows) = self.provider.query_children(parent) else {
            tracing::debug!("No cursor for children of {}", parent.document_id);
            return Vec::new();
        };

        rows.into_iter()
            .filter(|row| {
                let is_dir = row.is_directory();
                !(only_directories && !is_dir) && !(only_files && is_dir)
            })
            .map(|row| DirectoryEntry {
                handle: parent.child(&row),
                is_directory: row.is_directory(),
                display_name: row.display_name,
            })
            .collect()
    }

    /// First direct sub-directory of `parent` named `name` (case-sensitive)
    pub fn find_direct_child(&self, parent: &StorageHandle, name: &str) -> Option<StorageHandle> {
        self.list_children(parent, true, false)
            .into_iter()
            .find(|entry| entry.display_name == name)
            .map(|entry| entry.handle)
    }

    /// Walk a `/`-separated directory path below `root`, creating any missing
    /// segment, and return the last directory. Empty segments are skipped.
    ///
    /// A segment whose name is taken by a file is rejected, as is a directory
    /// the provider created under another name: neither could be found again
    /// by the next call.
    pub fn resolve_path(&self, root: &StorageHandle, path: &str) -> Result<StorageHandle, StorageFault> {
        let mut current = root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let children = self.list_children(&current, false, false);
            if let Some(existing) = children
                .iter()
                .find(|entry| entry.is_directory && entry.display_name == segment)
            {
                current = existing.handle.clone();
                continue;
            }
            if children.iter().any(|entry| entry.display_name == segment) {
                return Err(StorageFault::Rejected {
                    reason: format!("{} under {} is not a directory", segment, current.display_name),
                });
            }

            tracing::debug!("Creating directory {} under {}", segment, current.display_name);
            let created = self.create_directory(&current, segment)?;
            current = self.expect_name(created, segment)?;
        }
        Ok(current)
    }

    /// Keep `created` only if the provider kept the requested name
    pub(crate) fn expect_name(
        &self,
        created: StorageHandle,
        name: &str,
    ) -> Result<StorageHandle, StorageFault> {
        if created.display_name == name {
            return Ok(created);
        }
        if let Err(e) = self.delete(&created) {
            tracing::warn!("Failed to remove renamed {}: {}", created.display_name, e);
        }
        Err(StorageFault::Rejected {
            reason: format!("{} was created as {}", name, created.display_name),
        })
    }

    /// Read-only counterpart of [`resolve_path`](Self::resolve_path)
    pub fn directory_path_exists(&self, root: &StorageHandle, path: &str) -> bool {
        let mut current = root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            match self.find_direct_child(&current, segment) {
                Some(next) => current = next,
                None => return false,
            }
        }
        true
    }

    /// Breadth-first search for a file named `file_name` anywhere below `root`.
    ///
    /// The queue and visited set belong to this call. Each directory is listed
    /// at most once; the first matching file wins. Cost is proportional to the
    /// size of the subtree and no bound is enforced.
    pub fn find_file_by_name(&self, root: &StorageHandle, file_name: &str) -> Option<StorageHandle> {
        let mut queue = VecDeque::new();
        let mut visited = HashSet::new();
        visited.insert(root.document_id.clone());
        queue.push_back(root.clone());

        while let Some(dir) = queue.pop_front() {
            for entry in self.list_children(&dir, false, false) {
                if entry.is_directory {
                    if visited.insert(entry.handle.document_id.clone()) {
                        queue.push_back(entry.handle);
                    }
                } else if entry.display_name == file_name {
                    return Some(entry.handle);
                }
            }
        }

        tracing::debug!(
            "{} not found under {} ({} directories searched)",
            file_name,
            root.display_name,
            visited.len()
        );
        None
    }

    /// Whether `dir` directly contains a file named `file_name`. Percent-encoded
    /// names are decoded before comparing.
    pub fn file_exists(&self, dir: &StorageHandle, file_name: &str) -> bool {
        let wanted = if file_name.contains('%') {
            percent_decode_str(file_name).decode_utf8_lossy().to_string()
        } else {
            file_name.to_string()
        };

        self.list_children(dir, false, true)
            .iter()
            .any(|entry| entry.display_name == wanted)
    }

    pub fn create_directory(&self, parent: &StorageHandle, name: &str) -> Result<StorageHandle, StorageFault> {
        self.provider.create_document(parent, MIME_TYPE_DIR, name)
    }

    /// Create an empty file. Some providers suffix duplicate names, so the
    /// returned display name may differ from `name`.
    pub fn create_file(&self, parent: &StorageHandle, name: &str) -> Result<StorageHandle, StorageFault> {
        self.create_file_with_type(parent, name, MIME_TYPE_BINARY)
    }

    pub fn create_file_with_type(
        &self,
        parent: &StorageHandle,
        name: &str,
        mime_type: &str,
    ) -> Result<StorageHandle, StorageFault> {
        self.provider.create_document(parent, mime_type, name)
    }

    pub fn display_name(&self, handle: &StorageHandle) -> Option<String> {
        self.provider.query_document(handle).map(|row| row.display_name)
    }

    /// Replace the content of `dst` with the content of `src`
    pub fn copy_file(&self, src: &StorageHandle, dst: &StorageHandle) -> Result<u64, StorageFault> {
        let mut reader = self.provider.open_for_read(src)?;
        let mut writer = self.provider.open_for_overwrite(dst)?;
        let copied = io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        Ok(copied)
    }

    pub fn delete(&self, handle: &StorageHandle) -> Result<bool, StorageFault> {
        self.provider.delete_document(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{FsProvider, MemoryProvider, MIME_TYPE_TEXT};

    fn fixture() -> (MemoryProvider, TreeResolver) {
        let provider = MemoryProvider::new();
        let resolver = TreeResolver::new(Arc::new(provider.clone()));
        (provider, resolver)
    }

    /// Follow parent links from `id` and report whether `root_id` is reached
    fn reaches_root(provider: &MemoryProvider, id: &str, root_id: &str) -> bool {
        let mut current = id.to_string();
        while let Some(parent) = provider.parent_of(&current) {
            if parent == root_id {
                return true;
            }
            current = parent;
        }
        false
    }

    #[test]
    fn test_list_children_filters() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        resolver.create_directory(&root, "dir").unwrap();
        resolver.create_file(&root, "file.txt").unwrap();

        assert_eq!(resolver.list_children(&root, false, false).len(), 2);

        let dirs = resolver.list_children(&root, true, false);
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].is_directory);

        let files = resolver.list_children(&root, false, true);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].display_name, "file.txt");
    }

    #[test]
    fn test_list_children_without_cursor_is_empty() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        resolver.create_directory(&root, "dir").unwrap();
        provider.revoke();

        assert!(resolver.list_children(&root, false, false).is_empty());
    }

    #[test]
    fn test_find_direct_child_ignores_files_and_case() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        resolver.create_file(&root, "logs").unwrap();
        let dir = resolver.create_directory(&root, "logs").unwrap();

        assert_eq!(resolver.find_direct_child(&root, "logs"), Some(dir));
        assert_eq!(resolver.find_direct_child(&root, "Logs"), None);
    }

    #[test]
    fn test_resolve_path_is_idempotent() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();

        let first = resolver.resolve_path(&root, "a/b/c").unwrap();
        assert_eq!(provider.create_count(), 3);

        let second = resolver.resolve_path(&root, "a/b/c").unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.create_count(), 3);
        assert!(resolver.directory_path_exists(&root, "a/b/c"));
        assert!(!resolver.directory_path_exists(&root, "a/x"));
    }

    #[test]
    fn test_resolve_path_reuses_existing_prefix() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        let a = resolver.resolve_path(&root, "a").unwrap();

        let ab = resolver.resolve_path(&root, "/a//b/").unwrap();
        assert_eq!(provider.parent_of(&ab.document_id), Some(a.document_id));
        assert_eq!(provider.create_count(), 2);
    }

    #[test]
    fn test_resolve_path_rejects_file_in_the_way() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logs"), b"").unwrap();
        let provider = FsProvider::new(dir.path()).unwrap();
        let root = provider.root_handle();
        let resolver = TreeResolver::new(Arc::new(provider));

        for _ in 0..2 {
            let err = resolver.resolve_path(&root, "logs/x").unwrap_err();
            assert!(matches!(err, StorageFault::Rejected { .. }));
        }
        let names: Vec<String> = resolver
            .list_children(&root, false, false)
            .into_iter()
            .map(|entry| entry.display_name)
            .collect();
        assert_eq!(names, vec!["logs".to_string()]);
    }

    #[test]
    fn test_resolve_path_is_idempotent_on_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FsProvider::new(dir.path()).unwrap();
        let root = provider.root_handle();
        let resolver = TreeResolver::new(Arc::new(provider));

        let first = resolver.resolve_path(&root, "logs/x").unwrap();
        let second = resolver.resolve_path(&root, "logs/x").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.document_id, "logs/x");
    }

    #[test]
    fn test_resolve_path_fails_when_revoked() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        provider.revoke();

        let err = resolver.resolve_path(&root, "a/b").unwrap_err();
        assert!(matches!(err, StorageFault::PermissionDenied { .. }));
    }

    #[test]
    fn test_find_file_by_name_reaches_root() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        let deep = resolver.resolve_path(&root, "x/y/z").unwrap();
        let target = resolver.create_file(&deep, "ApplicationLog.txt").unwrap();
        resolver.resolve_path(&root, "w/v").unwrap();

        let found = resolver.find_file_by_name(&root, "ApplicationLog.txt").unwrap();
        assert_eq!(found, target);
        assert!(reaches_root(&provider, &found.document_id, &root.document_id));
    }

    #[test]
    fn test_find_file_by_name_prefers_shallowest() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        let deep = resolver.resolve_path(&root, "a/b").unwrap();
        resolver.create_file(&deep, "log.txt").unwrap();
        let shallow_dir = resolver.resolve_path(&root, "c").unwrap();
        let shallow = resolver.create_file(&shallow_dir, "log.txt").unwrap();

        assert_eq!(resolver.find_file_by_name(&root, "log.txt"), Some(shallow));
    }

    #[test]
    fn test_find_file_by_name_skips_directories_with_same_name() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        let dir = resolver.create_directory(&root, "log.txt").unwrap();
        let file = resolver.create_file(&dir, "log.txt").unwrap();

        assert_eq!(resolver.find_file_by_name(&root, "log.txt"), Some(file));
    }

    #[test]
    fn test_find_file_by_name_miss_visits_every_directory_once() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        resolver.resolve_path(&root, "a/b/c").unwrap();
        resolver.resolve_path(&root, "a/d").unwrap();
        let e = resolver.resolve_path(&root, "e").unwrap();
        resolver.create_file(&e, "other.txt").unwrap();

        let before = provider.child_query_count();
        assert_eq!(resolver.find_file_by_name(&root, "missing.txt"), None);

        let listed = provider.recent_listings(provider.child_query_count() - before);
        // root, a, e, b, d, c
        assert_eq!(listed.len(), 6);
        let unique: HashSet<&String> = listed.iter().collect();
        assert_eq!(unique.len(), listed.len());
        assert_eq!(listed[0], root.document_id);
    }

    #[test]
    fn test_find_file_by_name_calls_are_independent() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        let a = resolver.resolve_path(&root, "a").unwrap();
        let first = resolver.create_file(&a, "one.txt").unwrap();
        let b = resolver.resolve_path(&root, "b").unwrap();
        let second = resolver.create_file(&b, "two.txt").unwrap();

        assert_eq!(resolver.find_file_by_name(&root, "one.txt"), Some(first));
        assert_eq!(resolver.find_file_by_name(&root, "two.txt"), Some(second));
        assert_eq!(resolver.find_file_by_name(&a, "two.txt"), None);
    }

    #[test]
    fn test_file_exists_decodes_names() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        resolver.create_file(&root, "my log.txt").unwrap();

        assert!(resolver.file_exists(&root, "my log.txt"));
        assert!(resolver.file_exists(&root, "my%20log.txt"));
        assert!(!resolver.file_exists(&root, "other.txt"));
    }

    #[test]
    fn test_copy_and_delete() {
        let (provider, resolver) = fixture();
        let root = provider.root_handle();
        let src = resolver.create_file_with_type(&root, "src.txt", MIME_TYPE_TEXT).unwrap();
        let dst = resolver.create_file(&root, "dst.txt").unwrap();
        {
            let mut w = provider.open_for_append(&src).unwrap();
            w.write_all(b"payload").unwrap();
        }

        assert_eq!(resolver.copy_file(&src, &dst).unwrap(), 7);
        assert_eq!(provider.contents(&dst).unwrap(), b"payload");
        assert_eq!(resolver.display_name(&dst).as_deref(), Some("dst.txt"));

        assert!(resolver.delete(&src).unwrap());
        assert_eq!(resolver.display_name(&src), None);
    }
}
