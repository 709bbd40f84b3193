use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use argh::FromArgs;

use crate::config::Config;
use crate::uploader::Uploader;
use crate::{backend, observability};

/// Uploads a local directory tree to an S3-compatible bucket.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Version(VersionCommand),
}

/// upload every file below the configured root directory
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {}

/// print the uploader version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    // Uploads are strictly sequential, a single thread is all we need.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    if config.upload.bucket.is_empty() {
        bail!("no destination bucket configured (set `upload.bucket`)");
    }

    let backend = backend::from_config(&config.storage)?;
    let uploader = Uploader::new(config.upload, backend);

    let report = uploader
        .upload_directory()
        .await
        .context("error uploading directory")?;

    tracing::info!(
        uploaded = report.uploaded.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        "all files processed"
    );

    Ok(())
}
