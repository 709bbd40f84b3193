use std::fmt;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region, RequestChecksumCalculation};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;

use super::common::{Backend, BackendError, BackendResult, UploadTarget};

/// Connection settings of an [`S3CompatibleBackend`].
pub struct S3CompatibleBackendConfig {
    pub endpoint: String,
    pub region: String,
    pub path_style: bool,
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for S3CompatibleBackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CompatibleBackendConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("path_style", &self.path_style)
            .finish_non_exhaustive()
    }
}

pub struct S3CompatibleBackend {
    client: aws_sdk_s3::Client,
    endpoint: String,
}

impl S3CompatibleBackend {
    /// Creates a new S3 compatible backend with static credentials.
    pub fn new(config: S3CompatibleBackendConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key,
            config.secret_key,
            None,
            None,
            "bucketsync",
        );

        let s3_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(config.path_style)
            // Not every S3-compatible service accepts the default flexible checksums.
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            endpoint: config.endpoint,
        }
    }
}

impl fmt::Debug for S3CompatibleBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Compatible")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Backend for S3CompatibleBackend {
    fn name(&self) -> &'static str {
        "s3-compatible"
    }

    #[tracing::instrument(level = "trace", fields(bucket = %target.bucket, key = %target.key), skip_all)]
    async fn put_object(&self, target: &UploadTarget) -> BackendResult<()> {
        tracing::debug!("Writing to s3_compatible backend");

        self.client
            .put_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .body(ByteStream::from(target.payload.clone()))
            .acl(ObjectCannedAcl::from(target.acl.as_str()))
            .set_content_type(target.content_type.clone())
            .send()
            .await
            .map_err(|err| BackendError::S3 {
                context: format!(
                    "failed to put object `{}`: {}",
                    target.key,
                    DisplayErrorContext(&err)
                ),
                cause: Box::new(err),
            })?;

        Ok(())
    }
}
