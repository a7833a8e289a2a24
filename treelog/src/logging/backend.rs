//! Log backends
//!
//! Two ways of reaching the log file, picked once when the root is configured:
//! a conventional path under a base directory (with size rotation), or a file
//! located by name inside a provider-backed tree (no rotation, since recreating
//! the document would drop its grant).

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{LogFault, StorageFault};
use crate::provider::{DocumentProvider, StorageHandle, MIME_TYPE_TEXT};
use crate::resolver::TreeResolver;

/// Where the log lives
#[derive(Clone)]
pub enum LogRoot {
    /// Base directory on the local filesystem
    Path(PathBuf),
    /// Root of a provider-backed tree
    Tree {
        provider: Arc<dyn DocumentProvider>,
        root: StorageHandle,
    },
}

impl LogRoot {
    pub fn tree(provider: Arc<dyn DocumentProvider>, root: StorageHandle) -> Self {
        LogRoot::Tree { provider, root }
    }

    /// Same location: equal paths, or the same root in the same tree. Separate
    /// provider instances over one tree count as the same location.
    pub fn same_as(&self, other: &LogRoot) -> bool {
        match (self, other) {
            (LogRoot::Path(a), LogRoot::Path(b)) => a == b,
            (
                LogRoot::Tree { provider: pa, root: ra },
                LogRoot::Tree { provider: pb, root: rb },
            ) => (Arc::ptr_eq(pa, pb) || pa.tree_id() == pb.tree_id()) && ra == rb,
            _ => false,
        }
    }

    pub(crate) fn into_backend(self) -> LogBackend {
        match self {
            LogRoot::Path(base_dir) => LogBackend::LegacyPath(LegacyPathBackend::new(base_dir)),
            LogRoot::Tree { provider, root } => {
                LogBackend::TreeProvider(TreeProviderBackend::new(provider, root))
            }
        }
    }
}

impl std::fmt::Debug for LogRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogRoot::Path(p) => f.debug_tuple("Path").field(p).finish(),
            LogRoot::Tree { root, .. } => f.debug_struct("Tree").field("root", root).finish(),
        }
    }
}

/// Backend selected for the configured root
pub enum LogBackend {
    LegacyPath(LegacyPathBackend),
    TreeProvider(TreeProviderBackend),
}

impl LogBackend {
    /// Root this backend was built from
    pub fn root(&self) -> LogRoot {
        match self {
            Self::LegacyPath(b) => LogRoot::Path(b.base_dir.clone()),
            Self::TreeProvider(b) => LogRoot::Tree {
                provider: Arc::clone(b.resolver.provider()),
                root: b.root.clone(),
            },
        }
    }

    /// Backend name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::LegacyPath(_) => "legacy-path",
            Self::TreeProvider(_) => "tree-provider",
        }
    }
}

/// Bounded append over a plain file path
pub struct LegacyPathBackend {
    base_dir: PathBuf,
}

impl LegacyPathBackend {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn target(&self, path: &str) -> PathBuf {
        self.base_dir.join(path.trim_start_matches('/'))
    }

    /// Make sure the file and its parents exist
    pub fn ensure_file(&self, path: &str) -> Result<PathBuf, LogFault> {
        let target = self.target(path);
        if !target.exists() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            File::create(&target)?;
        }
        Ok(target)
    }

    /// Append `line`, first replacing the file with an empty one if it already
    /// exceeds `max_bytes`. Returns whether a rotation happened.
    pub fn append(&self, path: &str, max_bytes: u64, line: &str) -> Result<bool, LogFault> {
        let target = self.ensure_file(path)?;

        let rotated = if fs::metadata(&target)?.len() > max_bytes {
            fs::remove_file(&target)?;
            File::create(&target)?;
            true
        } else {
            false
        };

        let mut file = OpenOptions::new().append(true).open(&target)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(rotated)
    }

    pub fn size(&self, path: &str) -> Result<Option<u64>, LogFault> {
        match fs::metadata(self.target(path)) {
            Ok(m) => Ok(Some(m.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read(&self, path: &str) -> Result<Option<Vec<u8>>, LogFault> {
        match fs::read(self.target(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn remove(&self, path: &str) -> Result<bool, LogFault> {
        match fs::remove_file(self.target(path)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

/// Append over a document located by name inside a provider tree
pub struct TreeProviderBackend {
    resolver: TreeResolver,
    root: StorageHandle,
}

impl TreeProviderBackend {
    pub fn new(provider: Arc<dyn DocumentProvider>, root: StorageHandle) -> Self {
        Self {
            resolver: TreeResolver::new(provider),
            root,
        }
    }

    pub fn root(&self) -> &StorageHandle {
        &self.root
    }

    /// Search the tree for the log file. `None` on a miss.
    pub fn resolve(&self, file_name: &str) -> Option<StorageHandle> {
        self.resolver.find_file_by_name(&self.root, file_name)
    }

    /// Create the directory part of `path` and the file itself
    pub fn provision(&self, path: &str) -> Result<StorageHandle, StorageFault> {
        let (dir_path, file_name) = split_path(path);
        if let Some(existing) = self.resolve(file_name) {
            return Ok(existing);
        }
        let dir = self.resolver.resolve_path(&self.root, dir_path)?;
        let created = self
            .resolver
            .create_file_with_type(&dir, file_name, MIME_TYPE_TEXT)?;
        self.resolver.expect_name(created, file_name)
    }

    pub fn append(&self, file: &StorageHandle, line: &str) -> Result<(), StorageFault> {
        let mut writer = self.resolver.provider().open_for_append(file)?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    pub fn size(&self, file: &StorageHandle) -> Option<u64> {
        self.resolver
            .provider()
            .query_document(file)
            .and_then(|row| row.size)
    }

    pub fn read(&self, file: &StorageHandle) -> Result<Vec<u8>, StorageFault> {
        let mut reader = self.resolver.provider().open_for_read(file)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    pub fn remove(&self, file: &StorageHandle) -> Result<bool, StorageFault> {
        self.resolver.delete(file)
    }
}

/// Split `a/b/name.txt` into (`a/b`, `name.txt`)
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("ApplicationLog.txt"), ("", "ApplicationLog.txt"));
        assert_eq!(split_path("logs/app/run.txt"), ("logs/app", "run.txt"));
    }

    #[test]
    fn test_legacy_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LegacyPathBackend::new(dir.path().to_path_buf());

        let rotated = backend.append("nested/dir/log.txt", 1024, "line\r\n").unwrap();
        assert!(!rotated);
        assert_eq!(
            fs::read_to_string(dir.path().join("nested/dir/log.txt")).unwrap(),
            "line\r\n"
        );
    }

    #[test]
    fn test_legacy_rotation_keeps_only_triggering_line() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LegacyPathBackend::new(dir.path().to_path_buf());
        let max = 64;
        let line = "0123456789abcdef\r\n"; // 18 bytes

        let mut rotations = 0;
        for _ in 0..4 {
            if backend.append("log.txt", max, line).unwrap() {
                rotations += 1;
            }
        }
        // 72 bytes after four writes, still not rotated: the check runs before a write
        assert_eq!(rotations, 0);
        assert_eq!(backend.size("log.txt").unwrap(), Some(72));

        assert!(backend.append("log.txt", max, "trigger\r\n").unwrap());
        assert_eq!(backend.read("log.txt").unwrap().unwrap(), b"trigger\r\n");
    }

    #[test]
    fn test_legacy_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LegacyPathBackend::new(dir.path().to_path_buf());
        assert_eq!(backend.size("none.txt").unwrap(), None);
        assert_eq!(backend.read("none.txt").unwrap(), None);
        assert!(!backend.remove("none.txt").unwrap());
    }

    #[test]
    fn test_tree_provision_then_append() {
        let provider = MemoryProvider::new();
        let backend = TreeProviderBackend::new(Arc::new(provider.clone()), provider.root_handle());

        assert!(backend.resolve("run.txt").is_none());
        let file = backend.provision("logs/run.txt").unwrap();
        assert_eq!(backend.provision("logs/run.txt").unwrap(), file);
        assert_eq!(backend.resolve("run.txt"), Some(file.clone()));

        backend.append(&file, "a\r\n").unwrap();
        backend.append(&file, "b\r\n").unwrap();
        assert_eq!(backend.read(&file).unwrap(), b"a\r\nb\r\n");
        assert_eq!(backend.size(&file), Some(6));
    }

    #[test]
    fn test_tree_provision_rejects_renamed_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("run.txt")).unwrap();
        let provider = crate::provider::FsProvider::new(dir.path()).unwrap();
        let backend = TreeProviderBackend::new(Arc::new(provider.clone()), provider.root_handle());

        for _ in 0..2 {
            assert!(matches!(
                backend.provision("run.txt"),
                Err(StorageFault::Rejected { .. })
            ));
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_same_root() {
        let provider: Arc<dyn DocumentProvider> = Arc::new(MemoryProvider::new());
        let other: Arc<dyn DocumentProvider> = Arc::new(MemoryProvider::new());
        let root = StorageHandle::new("r", "t", "root");

        let a = LogRoot::tree(Arc::clone(&provider), root.clone());
        assert!(a.same_as(&LogRoot::tree(Arc::clone(&provider), root.clone())));
        assert!(!a.same_as(&LogRoot::tree(other, root)));
        assert!(!a.same_as(&LogRoot::Path(PathBuf::from("/tmp"))));
    }

    #[test]
    fn test_same_root_across_filesystem_providers() {
        let dir = tempfile::tempdir().unwrap();
        let first = crate::provider::FsProvider::new(dir.path()).unwrap();
        let second = crate::provider::FsProvider::new(dir.path()).unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let third = crate::provider::FsProvider::new(elsewhere.path()).unwrap();

        let a = LogRoot::tree(Arc::new(first.clone()), first.root_handle());
        assert!(a.same_as(&LogRoot::tree(Arc::new(second.clone()), second.root_handle())));
        assert!(!a.same_as(&LogRoot::tree(Arc::new(third.clone()), third.root_handle())));
    }
}
