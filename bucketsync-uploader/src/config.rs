//! Configuration for the directory uploader.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `BSU__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `BSU__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `BSU__UPLOAD__ROOT=/srv/assets` sets the directory to upload
//! - `BSU__UPLOAD__BUCKET=my-bucket` sets the destination bucket
//! - `BSU__STORAGE__TYPE=s3compatible` selects the storage backend
//! - `BSU__STORAGE__ENDPOINT=https://jp-osa-1.linodeobjects.com` sets the S3 endpoint
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! upload:
//!   root: /srv/assets
//!   bucket: my-bucket
//!
//! storage:
//!   type: s3compatible
//!   endpoint: https://jp-osa-1.linodeobjects.com
//!   region: jp-osa-1
//! ```

use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "BSU__";

/// Newtype around `String` that protects against accidental logging of credentials in our
/// configuration struct. Use with [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Storage backend configuration.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
///
/// Used in: [`Config::storage`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Local filesystem storage backend (type `"filesystem"`).
    ///
    /// Writes every object to `<path>/<bucket>/<key>`. Useful for dry runs and for inspecting
    /// what an upload would produce.
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: filesystem
    ///   path: /tmp/bucketsync
    /// ```
    FileSystem {
        /// Directory below which buckets are created.
        ///
        /// # Default
        ///
        /// `"data"` (relative to the working directory)
        ///
        /// # Environment Variables
        ///
        /// - `BSU__STORAGE__TYPE=filesystem`
        /// - `BSU__STORAGE__PATH=/path/to/storage`
        path: PathBuf,
    },

    /// S3-compatible storage backend (type `"s3compatible"`).
    ///
    /// Supports Amazon S3 and other S3-compatible services such as Linode Object Storage or
    /// MinIO. Credentials are a static access/secret key pair.
    ///
    /// # Example
    ///
    /// ```yaml
    /// storage:
    ///   type: s3compatible
    ///   endpoint: https://jp-osa-1.linodeobjects.com
    ///   region: jp-osa-1
    ///   access_key: AKIA...
    ///   secret_key: ...
    /// ```
    S3Compatible {
        /// S3 endpoint URL.
        ///
        /// # Environment Variables
        ///
        /// - `BSU__STORAGE__ENDPOINT=https://jp-osa-1.linodeobjects.com`
        endpoint: String,

        /// Signing region.
        ///
        /// # Default
        ///
        /// `"us-east-1"`
        #[serde(default = "default_region")]
        region: String,

        /// Whether to address buckets in the path instead of the host name.
        ///
        /// Most S3-compatible providers require this.
        ///
        /// # Default
        ///
        /// `true`
        #[serde(default = "default_path_style")]
        path_style: bool,

        /// Access key ID. Redacted from logs.
        ///
        /// # Environment Variables
        ///
        /// - `BSU__STORAGE__ACCESS_KEY`
        #[serde(default)]
        access_key: Option<SecretBox<ConfigSecret>>,

        /// Secret access key. Redacted from logs.
        ///
        /// # Environment Variables
        ///
        /// - `BSU__STORAGE__SECRET_KEY`
        #[serde(default)]
        secret_key: Option<SecretBox<ConfigSecret>>,
    },
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

fn default_path_style() -> bool {
    true
}

/// Canned access control list applied to every uploaded object.
///
/// Used in: [`Upload::acl`]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CannedAcl {
    /// Only the bucket owner has access.
    Private,
    /// Anyone can read the object.
    #[default]
    PublicRead,
    /// Anyone can read and write the object.
    PublicReadWrite,
    /// Any authenticated user can read the object.
    AuthenticatedRead,
    /// The bucket owner can read the object.
    BucketOwnerRead,
    /// The bucket owner has full control over the object.
    BucketOwnerFullControl,
}

impl CannedAcl {
    /// Returns the `x-amz-acl` value of this ACL.
    pub fn as_str(self) -> &'static str {
        match self {
            CannedAcl::Private => "private",
            CannedAcl::PublicRead => "public-read",
            CannedAcl::PublicReadWrite => "public-read-write",
            CannedAcl::AuthenticatedRead => "authenticated-read",
            CannedAcl::BucketOwnerRead => "bucket-owner-read",
            CannedAcl::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a directory cannot be listed or an entry cannot be read.
///
/// Failed uploads never stop the walk. Failures while walking the tree do, unless this is set to
/// [`TraversalPolicy::Skip`].
///
/// Used in: [`Upload::traversal_errors`]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalPolicy {
    /// Abort the whole run on the first traversal error.
    #[default]
    Abort,
    /// Log a warning, skip the unreadable entry and keep walking.
    ///
    /// A failure to list the upload root is still fatal.
    Skip,
}

/// What to upload and how.
///
/// Used in: [`Config::upload`]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Upload {
    /// Local directory whose contents are uploaded.
    ///
    /// # Default
    ///
    /// `"."`
    ///
    /// # Environment Variable
    ///
    /// `BSU__UPLOAD__ROOT`
    pub root: PathBuf,

    /// Destination bucket. Must be set.
    ///
    /// # Environment Variable
    ///
    /// `BSU__UPLOAD__BUCKET`
    pub bucket: String,

    /// Prefix prepended to every object key, joined with a single `/`.
    ///
    /// # Default
    ///
    /// Empty (keys are the plain relative paths)
    ///
    /// # Environment Variable
    ///
    /// `BSU__UPLOAD__KEY_PREFIX`
    pub key_prefix: String,

    /// Canned ACL for uploaded objects.
    ///
    /// # Default
    ///
    /// `public-read`
    ///
    /// # Environment Variable
    ///
    /// `BSU__UPLOAD__ACL`
    pub acl: CannedAcl,

    /// Content type sent with every object.
    ///
    /// # Default
    ///
    /// `None` (the storage service decides)
    ///
    /// # Environment Variable
    ///
    /// `BSU__UPLOAD__CONTENT_TYPE`
    pub content_type: Option<String>,

    /// Maximum number of uploads started per second.
    ///
    /// Uploads stay strictly sequential, this only spaces them out. Must be greater than zero.
    ///
    /// # Default
    ///
    /// `None` (no pacing)
    ///
    /// # Environment Variable
    ///
    /// `BSU__UPLOAD__RATE_LIMIT`
    pub rate_limit: Option<NonZeroU32>,

    /// Handling of directory listing, stat and read failures.
    ///
    /// # Default
    ///
    /// `abort`
    ///
    /// # Environment Variable
    ///
    /// `BSU__UPLOAD__TRAVERSAL_ERRORS`
    pub traversal_errors: TraversalPolicy,
}

impl Default for Upload {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            bucket: String::new(),
            key_prefix: String::new(),
            acl: CannedAcl::default(),
            content_type: None,
            rate_limit: None,
            traversal_errors: TraversalPolicy::default(),
        }
    }
}

/// The log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,
    /// Pretty printing with colors.
    Pretty,
    /// Simplified plain text output.
    Simplified,
    /// JSON lines.
    Json,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable takes precedence if set.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `BSU__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `auto`
    ///
    /// # Environment Variable
    ///
    /// `BSU__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the uploader.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// The directory to upload and the upload parameters. See [`Upload`].
    pub upload: Upload,

    /// Where objects are written to. See [`Storage`].
    ///
    /// # Default
    ///
    /// Filesystem storage in the `./data` directory
    pub storage: Storage,

    /// Log verbosity and output format. See [`Logging`].
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload: Upload::default(),
            storage: Storage::FileSystem {
                path: PathBuf::from("data"),
            },
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the given YAML file, if any, and the environment.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `BSU__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.upload.root, Path::new("."));
            assert_eq!(config.upload.acl, CannedAcl::PublicRead);
            assert_eq!(config.upload.traversal_errors, TraversalPolicy::Abort);
            assert!(config.upload.key_prefix.is_empty());
            assert!(matches!(config.storage, Storage::FileSystem { .. }));
            assert_eq!(config.logging.level, LevelFilter::INFO);

            Ok(())
        });
    }

    #[test]
    fn rejects_zero_rate_limit() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BSU__UPLOAD__RATE_LIMIT", "0");

            let err = Config::load(None).unwrap_err();
            assert!(format!("{err:?}").contains("rate_limit"), "{err:?}");

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BSU__UPLOAD__ROOT", "/srv/assets");
            jail.set_env("BSU__UPLOAD__BUCKET", "my-bucket");
            jail.set_env("BSU__UPLOAD__ACL", "private");
            jail.set_env("BSU__UPLOAD__RATE_LIMIT", "300");
            jail.set_env("BSU__UPLOAD__TRAVERSAL_ERRORS", "skip");
            jail.set_env("BSU__STORAGE__TYPE", "s3compatible");
            jail.set_env("BSU__STORAGE__ENDPOINT", "https://jp-osa-1.linodeobjects.com");
            jail.set_env("BSU__STORAGE__REGION", "jp-osa-1");
            jail.set_env("BSU__STORAGE__ACCESS_KEY", "access");
            jail.set_env("BSU__STORAGE__SECRET_KEY", "secret");
            jail.set_env("BSU__LOGGING__LEVEL", "debug");

            let config = Config::load(None).unwrap();

            assert_eq!(config.upload.root, Path::new("/srv/assets"));
            assert_eq!(config.upload.bucket, "my-bucket");
            assert_eq!(config.upload.acl, CannedAcl::Private);
            assert_eq!(config.upload.rate_limit, NonZeroU32::new(300));
            assert_eq!(config.upload.traversal_errors, TraversalPolicy::Skip);
            assert_eq!(config.logging.level, LevelFilter::DEBUG);

            let Storage::S3Compatible {
                endpoint,
                region,
                path_style,
                access_key,
                secret_key,
            } = &dbg!(&config).storage
            else {
                panic!("expected s3 storage");
            };
            assert_eq!(endpoint, "https://jp-osa-1.linodeobjects.com");
            assert_eq!(region, "jp-osa-1");
            assert!(*path_style);
            assert_eq!(
                access_key.as_ref().unwrap().expose_secret().as_str(),
                "access"
            );
            assert_eq!(
                secret_key.as_ref().unwrap().expose_secret().as_str(),
                "secret"
            );

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            upload:
                root: /srv/assets
                bucket: from-yaml
                key_prefix: new_code
                content_type: application/octet-stream
            storage:
                type: s3compatible
                endpoint: http://localhost:9000
            logging:
                format: json
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("BSU__UPLOAD__BUCKET", "from-env");

            let config = Config::load(Some(tempfile.path())).unwrap();

            // Env should overwrite the yaml config
            assert_eq!(config.upload.bucket, "from-env");
            assert_eq!(config.upload.key_prefix, "new_code");
            assert_eq!(
                config.upload.content_type.as_deref(),
                Some("application/octet-stream")
            );
            assert_eq!(config.logging.format, LogFormat::Json);

            let Storage::S3Compatible {
                endpoint, region, ..
            } = &config.storage
            else {
                panic!("expected s3 storage");
            };
            assert_eq!(endpoint, "http://localhost:9000");
            assert_eq!(region, "us-east-1");

            Ok(())
        });
    }

    #[test]
    fn secrets_are_redacted() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BSU__STORAGE__TYPE", "s3compatible");
            jail.set_env("BSU__STORAGE__ENDPOINT", "http://localhost:9000");
            jail.set_env("BSU__STORAGE__SECRET_KEY", "hunter2");

            let config = Config::load(None).unwrap();
            let debug = format!("{config:?}");
            assert!(!debug.contains("hunter2"));

            Ok(())
        });
    }

    #[test]
    fn acl_values() {
        assert_eq!(CannedAcl::PublicRead.to_string(), "public-read");
        assert_eq!(
            CannedAcl::BucketOwnerFullControl.as_str(),
            "bucket-owner-full-control"
        );
    }
}
