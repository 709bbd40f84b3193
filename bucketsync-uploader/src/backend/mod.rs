//! Storage backends that objects can be written to.

use secrecy::ExposeSecret;

use crate::config::Storage;

mod common;
#[cfg(test)]
pub(crate) mod in_memory;
mod local_fs;
mod s3_compatible;

pub use common::{Backend, BackendError, BackendResult, BoxedBackend, UploadTarget};
pub use local_fs::LocalFsBackend;
pub use s3_compatible::{S3CompatibleBackend, S3CompatibleBackendConfig};

/// Constructs the backend described by the storage configuration.
pub fn from_config(storage: &Storage) -> BackendResult<BoxedBackend> {
    Ok(match storage {
        Storage::FileSystem { path } => Box::new(LocalFsBackend::new(path)),
        Storage::S3Compatible {
            endpoint,
            region,
            path_style,
            access_key,
            secret_key,
        } => {
            let (Some(access_key), Some(secret_key)) = (access_key, secret_key) else {
                return Err(BackendError::Generic {
                    context: "s3compatible storage requires `access_key` and `secret_key`".into(),
                    cause: None,
                });
            };

            Box::new(S3CompatibleBackend::new(S3CompatibleBackendConfig {
                endpoint: endpoint.clone(),
                region: region.clone(),
                path_style: *path_style,
                access_key: access_key.expose_secret().as_str().to_owned(),
                secret_key: secret_key.expose_secret().as_str().to_owned(),
            }))
        }
    })
}
