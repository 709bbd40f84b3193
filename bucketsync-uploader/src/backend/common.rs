use std::fmt::Debug;

use bytes::Bytes;
use thiserror::Error;

use crate::config::CannedAcl;

/// A type-erased [`Backend`] instance.
pub type BoxedBackend = Box<dyn Backend>;

/// A single object to be written by a [`Backend`].
#[derive(Clone, Debug)]
pub struct UploadTarget {
    /// The destination bucket.
    pub bucket: String,
    /// The object key, using `/` as segment separator.
    pub key: String,
    /// The full object contents.
    pub payload: Bytes,
    /// The canned ACL applied to the object.
    pub acl: CannedAcl,
    /// An explicit content type, if configured.
    pub content_type: Option<String>,
}

#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Stores the target's payload under its bucket and key, replacing any existing object.
    async fn put_object(&self, target: &UploadTarget) -> BackendResult<()>;
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// IO errors related to file operations.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors returned by the S3 API or encountered while sending the request.
    #[error("s3 error: {context}")]
    S3 {
        context: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Any other error stemming from one of the storage backends.
    #[error("storage backend error: {context}")]
    Generic {
        context: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
