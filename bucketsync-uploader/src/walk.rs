//! Depth-first traversal of the upload root.
//!
//! Instead of recursing, [`Walk`] keeps an explicit stack of pending directory entries. Each
//! listing is read to the end and closed before the walk descends, so neither the call stack nor
//! the number of open file descriptors grows with the depth of the tree.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, UploadError};

/// The kind of a non-directory entry yielded by [`Walk`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryKind {
    /// A regular file, or a symlink resolving to one.
    File,
    /// Sockets, FIFOs, device nodes and similar.
    Other,
}

/// A non-directory entry below the walk root.
#[derive(Clone, Debug)]
pub struct Entry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Pre-order, depth-first walk over all non-directory entries below a root.
///
/// Sibling order is whatever the underlying directory listing returns. Entries are inspected with
/// `stat`, so symlinks are followed.
#[derive(Debug)]
pub struct Walk {
    /// Unvisited entries of each directory on the current path, deepest last. Every list is
    /// reversed so that popping yields listing order.
    pending: Vec<Vec<PathBuf>>,
}

impl Walk {
    /// Lists the root directory.
    ///
    /// Fails if the root cannot be listed.
    pub async fn new(root: &Path) -> Result<Self> {
        let entries = list_dir(root).await?;
        Ok(Self {
            pending: vec![entries],
        })
    }

    /// Returns the next non-directory entry, or `None` once the tree is exhausted.
    ///
    /// Directories are descended into as soon as they are encountered. After an error the walk
    /// can be resumed: an entry that failed to stat is passed over, and a directory that failed
    /// to list is never entered.
    pub async fn next_entry(&mut self) -> Result<Option<Entry>> {
        loop {
            let Some(entries) = self.pending.last_mut() else {
                return Ok(None);
            };
            let Some(path) = entries.pop() else {
                self.pending.pop();
                continue;
            };

            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(cause) => return Err(UploadError::Stat { path, cause }),
            };

            if metadata.is_dir() {
                let entries = list_dir(&path).await?;
                self.pending.push(entries);
                continue;
            }

            let kind = if metadata.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            return Ok(Some(Entry { path, kind }));
        }
    }
}

/// Reads a complete directory listing. The directory handle is closed on return.
async fn list_dir(path: &Path) -> Result<Vec<PathBuf>> {
    let list_error = |cause| UploadError::ListDirectory {
        path: path.to_owned(),
        cause,
    };

    let mut read_dir = tokio::fs::read_dir(path).await.map_err(list_error)?;
    let mut entries = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(list_error)? {
        entries.push(entry.path());
    }

    entries.reverse();
    Ok(entries)
}

/// Computes the object key of `path` relative to `root`.
///
/// Segments are joined with `/` regardless of the platform. A non-empty `prefix` is prepended,
/// separated by exactly one `/`.
pub fn object_key(root: &Path, path: &Path, prefix: &str) -> Result<String> {
    let invalid = || UploadError::ObjectKey {
        path: path.to_owned(),
    };

    let relative = path.strip_prefix(root).map_err(|_| invalid())?;

    let mut key = prefix.trim_matches('/').to_owned();
    let mut segments = 0;
    for component in relative.components() {
        let Component::Normal(segment) = component else {
            return Err(invalid());
        };
        let segment = segment.to_str().ok_or_else(invalid)?;

        if !key.is_empty() {
            key.push('/');
        }
        key.push_str(segment);
        segments += 1;
    }

    if segments == 0 {
        return Err(invalid());
    }

    Ok(key)
}
