//! The `bucketsync-loadtest` binary.
//!
//! Exports the configured scenario as a k6 script, or runs it with the built-in
//! constant-arrival-rate executor.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::path::PathBuf;

use anyhow::Context;
use argh::FromArgs;
use tracing_subscriber::EnvFilter;

use bucketsync_loadtest::config::Config;
use bucketsync_loadtest::executor::{self, print_metrics};
use bucketsync_loadtest::http::HttpTarget;

/// Constant arrival rate load test against an HTTP endpoint
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// target URL, overrides the configuration file
    #[argh(option, short = 't')]
    target: Option<String>,

    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    K6(K6Command),
    Run(RunCommand),
    Version(VersionCommand),
}

/// print the scenario as a k6 script
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "k6")]
struct K6Command {
    /// print only the k6 options object as JSON
    #[argh(switch)]
    options: bool,
}

/// run the scenario with the built-in executor
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {}

/// print the load test version
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => {
            let target = args
                .target
                .clone()
                .context("either a config file or a target URL is required")?;
            Config::new(target)
        }
    };

    if let Some(target) = &args.target {
        config.target = target.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO")),
        )
        .init();

    let config = load_config(&args)?;
    let scenario = config.scenario();
    scenario.validate()?;

    match args.command {
        Command::K6(K6Command { options: true }) => {
            println!("{:#}", scenario.to_k6_options());
        }
        Command::K6(K6Command { options: false }) => {
            print!("{}", scenario.to_k6_script()?);
        }
        Command::Run(RunCommand {}) => {
            let target = HttpTarget::new(&scenario.target, config.request_timeout)?;
            let metrics = executor::run(target, &scenario).await?;
            print_metrics(&scenario, &metrics);
        }
        Command::Version(_) => unreachable!(),
    }

    Ok(())
}
