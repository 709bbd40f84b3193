use std::env;
use std::io::IsTerminal;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

use crate::config::{LogFormat, Logging};

pub fn init_tracing(config: &Logging) {
    let format = match config.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .flatten_event(true)
            .boxed(),
        LogFormat::Simplified | LogFormat::Auto => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true)
            .boxed(),
    };

    let (level, env_filter) = parse_rust_log(config.level);

    tracing_subscriber::registry()
        .with(layer.with_filter(level))
        .with(env_filter)
        .init();
}

fn parse_rust_log(default_level: LevelFilter) -> (LevelFilter, EnvFilter) {
    // Try to parse RUST_LOG as a simple level filter and apply default levels internally.
    // Otherwise, use it literally if the user knows which overrides they want to run.
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => LevelFilter::from_level(level),
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => default_level,
    };

    // This is the maximum verbosity that will be logged, we filter this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        bucketsync_uploader=TRACE,\
        aws_smithy_runtime=WARN,\
        aws_config=WARN,\
        hyper_util=WARN,\
        ",
    );

    (level, env_filter)
}
