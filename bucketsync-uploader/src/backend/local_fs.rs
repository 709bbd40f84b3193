use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::common::{Backend, BackendResult, UploadTarget};

/// Writes objects to `<path>/<bucket>/<key>` on the local filesystem.
///
/// ACLs and content types are not persisted.
#[derive(Debug)]
pub struct LocalFsBackend {
    path: PathBuf,
}

impl LocalFsBackend {
    pub fn new(path: &Path) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Backend for LocalFsBackend {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    #[tracing::instrument(level = "trace", fields(bucket = %target.bucket, key = %target.key), skip_all)]
    async fn put_object(&self, target: &UploadTarget) -> BackendResult<()> {
        tracing::debug!("Writing to local_fs backend");
        let path = self.path.join(&target.bucket).join(&target.key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;

        file.write_all(&target.payload).await?;
        file.flush().await?;
        file.sync_data().await?;

        Ok(())
    }
}
