//! Sequential upload of a directory tree.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::{Interval, MissedTickBehavior};

use crate::backend::{BackendError, BoxedBackend, UploadTarget};
use crate::config::{TraversalPolicy, Upload};
use crate::error::{Result, UploadError};
use crate::walk::{self, EntryKind, Walk};

/// An object whose upload was rejected by the backend.
#[derive(Debug)]
pub struct FailedUpload {
    pub key: String,
    pub error: BackendError,
}

/// Outcome of a completed upload run.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Keys of all successfully uploaded objects, in upload order.
    pub uploaded: Vec<String>,
    /// Files whose upload failed. The walk continued past each of them.
    pub failed: Vec<FailedUpload>,
    /// Entries that were not uploaded because they are not regular files or could not be read.
    pub skipped: Vec<PathBuf>,
}

impl UploadReport {
    /// Returns `true` if every file that was found has been uploaded.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Uploads every regular file below a root directory, one at a time.
///
/// Upload failures are logged and recorded in the [`UploadReport`]; they never stop the walk.
/// Failures to list, stat or read local entries abort the run unless
/// [`TraversalPolicy::Skip`] is configured.
#[derive(Debug)]
pub struct Uploader {
    config: Upload,
    backend: BoxedBackend,
}

impl Uploader {
    /// Creates an uploader writing to the given backend.
    pub fn new(config: Upload, backend: BoxedBackend) -> Self {
        Self { config, backend }
    }

    /// Walks the configured root and uploads each regular file to the configured bucket.
    pub async fn upload_directory(&self) -> Result<UploadReport> {
        let mut report = UploadReport::default();

        let result = self.walk(&mut report).await;
        if let Err(ref error) = result {
            tracing::error!(
                error = error as &dyn std::error::Error,
                uploaded = report.uploaded.len(),
                failed = report.failed.len(),
                last_uploaded = report.uploaded.last().map(String::as_str),
                "upload aborted"
            );
        }

        result.map(|()| report)
    }

    async fn walk(&self, report: &mut UploadReport) -> Result<()> {
        let root = &self.config.root;
        tracing::info!(
            root = %root.display(),
            bucket = %self.config.bucket,
            backend = self.backend.name(),
            "uploading directory"
        );

        let mut pacer = self.config.rate_limit.map(pacer);
        let mut tree = Walk::new(root).await?;

        loop {
            let entry = match tree.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    self.handle_traversal_error(error, report)?;
                    continue;
                }
            };

            if entry.kind == EntryKind::Other {
                tracing::debug!(path = %entry.path.display(), "skipping non-regular file");
                report.skipped.push(entry.path);
                continue;
            }

            let payload = match tokio::fs::read(&entry.path).await {
                Ok(payload) => Bytes::from(payload),
                Err(cause) => {
                    let error = UploadError::ReadFile {
                        path: entry.path,
                        cause,
                    };
                    self.handle_traversal_error(error, report)?;
                    continue;
                }
            };

            let key = match walk::object_key(root, &entry.path, &self.config.key_prefix) {
                Ok(key) => key,
                Err(error) => {
                    self.handle_traversal_error(error, report)?;
                    continue;
                }
            };

            if let Some(pacer) = pacer.as_mut() {
                pacer.tick().await;
            }

            self.upload_file(key, payload, report).await;
        }

        Ok(())
    }

    async fn upload_file(&self, key: String, payload: Bytes, report: &mut UploadReport) {
        let target = UploadTarget {
            bucket: self.config.bucket.clone(),
            key,
            payload,
            acl: self.config.acl,
            content_type: self.config.content_type.clone(),
        };

        match self.backend.put_object(&target).await {
            Ok(()) => {
                tracing::info!(key = %target.key, size = target.payload.len(), "file uploaded");
                report.uploaded.push(target.key);
            }
            Err(error) => {
                tracing::error!(
                    key = %target.key,
                    error = &error as &dyn std::error::Error,
                    "failed to upload file"
                );
                report.failed.push(FailedUpload {
                    key: target.key,
                    error,
                });
            }
        }
    }

    fn handle_traversal_error(&self, error: UploadError, report: &mut UploadReport) -> Result<()> {
        match self.config.traversal_errors {
            TraversalPolicy::Abort => Err(error),
            TraversalPolicy::Skip => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "skipping unreadable entry"
                );
                let (UploadError::ListDirectory { path, .. }
                | UploadError::Stat { path, .. }
                | UploadError::ReadFile { path, .. }
                | UploadError::ObjectKey { path }) = error;
                report.skipped.push(path);
                Ok(())
            }
        }
    }
}

fn pacer(uploads_per_second: NonZeroU32) -> Interval {
    let period = Duration::from_secs(1) / uploads_per_second.get();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
