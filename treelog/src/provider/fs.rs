//! Filesystem-backed document provider
//!
//! Presents a real directory through the provider surface. Document ids are
//! `/`-separated paths relative to the root directory, `.` being the root.
//! Symbolic links are never listed or followed, so every reachable document
//! lives below the root.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use super::{
    DocumentProvider, DocumentRow, StorageHandle, MIME_TYPE_BINARY, MIME_TYPE_DIR, MIME_TYPE_TEXT,
};
use crate::error::StorageFault;

const ROOT_ID: &str = ".";

/// Provider rooted at a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsProvider {
    root_dir: PathBuf,
    tree_id: String,
}

impl FsProvider {
    /// Create a provider for `root_dir`, creating the directory if needed
    pub fn new(root_dir: impl Into<PathBuf>) -> Result<Self, StorageFault> {
        let root_dir = root_dir.into();
        fs::create_dir_all(&root_dir)?;
        let tree_id = root_dir.to_string_lossy().to_string();
        Ok(Self { root_dir, tree_id })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn root_handle(&self) -> StorageHandle {
        let name = self
            .root_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.tree_id.clone());
        StorageHandle::new(ROOT_ID, self.tree_id.clone(), name)
    }

    /// Map a document id onto a path below the root, refusing anything that
    /// would leave it, including ids that pass through a symbolic link
    fn resolve(&self, handle: &StorageHandle) -> Result<PathBuf, StorageFault> {
        if handle.tree_id != self.tree_id {
            return Err(StorageFault::PermissionDenied {
                document_id: handle.document_id.clone(),
            });
        }
        if handle.document_id == ROOT_ID {
            return Ok(self.root_dir.clone());
        }

        let relative = Path::new(&handle.document_id);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(StorageFault::PermissionDenied {
                document_id: handle.document_id.clone(),
            });
        }

        let mut path = self.root_dir.clone();
        for component in relative.components() {
            path.push(component);
            if is_symlink(&path) {
                return Err(StorageFault::PermissionDenied {
                    document_id: handle.document_id.clone(),
                });
            }
        }
        Ok(path)
    }

    fn child_id(parent_id: &str, name: &str) -> String {
        if parent_id == ROOT_ID {
            name.to_string()
        } else {
            format!("{}/{}", parent_id, name)
        }
    }

    fn row_for(document_id: String, path: &Path) -> Option<DocumentRow> {
        let metadata = if document_id == ROOT_ID {
            fs::metadata(path).ok()?
        } else {
            let metadata = fs::symlink_metadata(path).ok()?;
            if metadata.file_type().is_symlink() {
                return None;
            }
            metadata
        };
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if metadata.is_dir() {
            Some(DocumentRow {
                document_id,
                display_name,
                mime_type: MIME_TYPE_DIR.to_string(),
                size: None,
            })
        } else {
            Some(DocumentRow {
                document_id,
                mime_type: mime_for_name(&display_name).to_string(),
                display_name,
                size: Some(metadata.len()),
            })
        }
    }

    /// Pick a free name the way platform providers do: `name (1).ext`, `name (2).ext`, ...
    fn unique_name(dir: &Path, display_name: &str) -> String {
        if !dir.join(display_name).exists() {
            return display_name.to_string();
        }

        let (stem, ext) = match display_name.rfind('.') {
            Some(idx) if idx > 0 => (&display_name[..idx], &display_name[idx..]),
            _ => (display_name, ""),
        };
        let mut n = 1;
        loop {
            let candidate = format!("{} ({}){}", stem, n, ext);
            if !dir.join(&candidate).exists() {
                return candidate;
            }
            n += 1;
        }
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn mime_for_name(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("txt") | Some("log") => MIME_TYPE_TEXT,
        _ => MIME_TYPE_BINARY,
    }
}

fn validate_name(name: &str) -> Result<(), StorageFault> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(StorageFault::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

impl DocumentProvider for FsProvider {
    fn tree_id(&self) -> &str {
        &self.tree_id
    }

    fn query_children(&self, parent: &StorageHandle) -> Option<Vec<DocumentRow>> {
        let dir = self.resolve(parent).ok()?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("No children for {:?}: {}", dir, e);
                return None;
            }
        };

        let rows = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| !t.is_symlink()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                Self::row_for(Self::child_id(&parent.document_id, &name), &entry.path())
            })
            .collect();
        Some(rows)
    }

    fn query_document(&self, handle: &StorageHandle) -> Option<DocumentRow> {
        let path = self.resolve(handle).ok()?;
        Self::row_for(handle.document_id.clone(), &path)
    }

    fn create_document(
        &self,
        parent: &StorageHandle,
        mime_type: &str,
        display_name: &str,
    ) -> Result<StorageHandle, StorageFault> {
        validate_name(display_name)?;
        let dir = self.resolve(parent)?;
        if !dir.is_dir() {
            return Err(StorageFault::NotFound {
                document_id: parent.document_id.clone(),
            });
        }

        let name = Self::unique_name(&dir, display_name);
        let path = dir.join(&name);
        if mime_type == MIME_TYPE_DIR {
            fs::create_dir(&path)?;
        } else {
            OpenOptions::new().write(true).create_new(true).open(&path)?;
        }

        Ok(StorageHandle::new(
            Self::child_id(&parent.document_id, &name),
            self.tree_id.clone(),
            name,
        ))
    }

    fn open_for_append(&self, handle: &StorageHandle) -> Result<Box<dyn Write + Send>, StorageFault> {
        let path = self.resolve(handle)?;
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StorageFault::NotFound {
                    document_id: handle.document_id.clone(),
                },
                _ => StorageFault::Io(e),
            })?;
        Ok(Box::new(file))
    }

    fn open_for_read(&self, handle: &StorageHandle) -> Result<Box<dyn Read + Send>, StorageFault> {
        let path = self.resolve(handle)?;
        Ok(Box::new(File::open(path)?))
    }

    fn open_for_overwrite(
        &self,
        handle: &StorageHandle,
    ) -> Result<Box<dyn Write + Send>, StorageFault> {
        let path = self.resolve(handle)?;
        let file = OpenOptions::new().write(true).truncate(true).open(path)?;
        Ok(Box::new(file))
    }

    fn delete_document(&self, handle: &StorageHandle) -> Result<bool, StorageFault> {
        if handle.document_id == ROOT_ID {
            return Err(StorageFault::Rejected {
                reason: "the tree root cannot be deleted".to_string(),
            });
        }
        let path = self.resolve(handle)?;
        let metadata = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        Ok(true)
    }
}
