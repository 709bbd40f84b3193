//! YAML configuration of the load test binary.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::scenario::{ArrivalRate, DEFAULT_GRACEFUL_STOP, Scenario};

/// The YAML configuration of a load test run.
///
/// Only `target` is required, the scenario defaults to `high_load`.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// The URL requested by every iteration.
    pub target: String,

    /// Name of the scenario, `high_load` by default.
    #[serde(default = "default_name")]
    pub name: String,

    /// Arrival rate and virtual user pool, using k6 field names.
    #[serde(default)]
    pub scenario: ArrivalRate,

    /// Per-request timeout of the built-in executor. No timeout by default.
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// How long in-flight iterations may run past the scenario duration, `30s` by default.
    #[serde(default = "default_graceful_stop", with = "humantime_serde")]
    pub graceful_stop: Duration,
}

fn default_name() -> String {
    "high_load".to_owned()
}

fn default_graceful_stop() -> Duration {
    DEFAULT_GRACEFUL_STOP
}

impl Config {
    /// Creates the default `high_load` configuration for the given target.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            name: default_name(),
            scenario: ArrivalRate::default(),
            request_timeout: None,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }

    /// Reads the configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let config_file = std::fs::File::open(path).context("failed to open config file")?;
        serde_yaml::from_reader(config_file).context("failed to parse config YAML")
    }

    /// Returns the scenario described by this configuration.
    pub fn scenario(&self) -> Scenario {
        Scenario {
            name: self.name.clone(),
            target: self.target.clone(),
            arrival_rate: self.scenario.clone(),
            graceful_stop: self.graceful_stop,
        }
    }
}
