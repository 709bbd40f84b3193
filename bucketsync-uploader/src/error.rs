use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while walking the local directory tree.
///
/// These abort an upload run unless entries are skipped. Failed uploads of individual files are
/// not represented here; they are collected in the
/// [`UploadReport`](crate::uploader::UploadReport) instead.
#[derive(Debug, Error)]
pub enum UploadError {
    /// A directory could not be listed.
    #[error("failed to list directory `{}`", path.display())]
    ListDirectory {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },

    /// The metadata of a directory entry could not be read.
    #[error("failed to stat `{}`", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },

    /// The contents of a file could not be read.
    #[error("failed to read file `{}`", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },

    /// The path cannot be expressed as an object key.
    #[error("cannot derive an object key for `{}`", path.display())]
    ObjectKey { path: PathBuf },
}

/// Result type for upload operations.
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
