//! A module for defining the [`Scenario`] that is run against a load balancer endpoint.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// How long in-flight iterations may continue after the scenario's duration, as in k6.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Name of the only check recorded per iteration.
pub const STATUS_CHECK: &str = "status was 200";

/// The per-iteration assertion: passes if and only if the response status is `200`.
pub fn status_was_200(status: StatusCode) -> bool {
    status == StatusCode::OK
}

/// The scheduling strategy of a scenario.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Executor {
    /// Starts a fixed number of iterations per time unit, independent of iteration duration.
    #[default]
    ConstantArrivalRate,
}

/// Parameters of a constant-arrival-rate workload.
///
/// Field names serialize the way k6 expects them in its `options.scenarios` block.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArrivalRate {
    /// Always [`Executor::ConstantArrivalRate`].
    pub executor: Executor,
    /// Iterations started per [`time_unit`](Self::time_unit).
    pub rate: u64,
    /// The period `rate` refers to.
    #[serde(with = "humantime_serde")]
    pub time_unit: Duration,
    /// Total wall-clock time during which iterations are started.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Virtual users allocated before the test starts.
    #[serde(rename = "preAllocatedVUs")]
    pub pre_allocated_vus: usize,
    /// Upper bound for the virtual user pool.
    #[serde(rename = "maxVUs")]
    pub max_vus: usize,
}

impl Default for ArrivalRate {
    fn default() -> Self {
        Self {
            executor: Executor::ConstantArrivalRate,
            rate: 150_000,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(60),
            pre_allocated_vus: 2_000,
            max_vus: 50_000,
        }
    }
}

impl ArrivalRate {
    /// Returns how many iterations must have started `elapsed` into the run.
    ///
    /// The first iteration starts immediately, the `n`-th one at `n * time_unit / rate`. The
    /// result never exceeds [`total_iterations`](Self::total_iterations).
    pub fn due_iterations(&self, elapsed: Duration) -> u64 {
        let due = elapsed.as_nanos() * u128::from(self.rate) / self.time_unit.as_nanos() + 1;
        u64::try_from(due)
            .unwrap_or(u64::MAX)
            .min(self.total_iterations())
    }

    /// Returns the number of iterations started over the whole duration.
    pub fn total_iterations(&self) -> u64 {
        let total = (self.duration.as_nanos() * u128::from(self.rate))
            .div_ceil(self.time_unit.as_nanos());
        u64::try_from(total).unwrap_or(u64::MAX)
    }
}

/// Reasons a scenario cannot be run.
#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    /// No iterations would ever start.
    #[error("rate must be greater than zero")]
    ZeroRate,
    /// The rate refers to an empty period.
    #[error("time unit must be greater than zero")]
    ZeroTimeUnit,
    /// No virtual user could ever run an iteration.
    #[error("maxVUs must be greater than zero")]
    ZeroMaxVus,
    /// The pool would start out larger than its limit.
    #[error("preAllocatedVUs ({pre_allocated}) exceeds maxVUs ({max})")]
    TooManyPreAllocated {
        /// The configured `preAllocatedVUs`.
        pre_allocated: usize,
        /// The configured `maxVUs`.
        max: usize,
    },
}

/// A named workload issuing `GET` requests against a single target URL.
#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
    /// The key of the scenario in k6 options.
    pub name: String,
    /// The URL requested by every iteration.
    pub target: String,
    /// Pacing and pool parameters.
    pub arrival_rate: ArrivalRate,
    /// Time granted to in-flight iterations once the duration has elapsed. Iterations still
    /// running afterwards are interrupted.
    pub graceful_stop: Duration,
}

impl Scenario {
    /// The `high_load` scenario: 150k requests per second for one minute, backed by 2000
    /// pre-allocated and at most 50000 virtual users.
    pub fn high_load(target: impl Into<String>) -> Self {
        Self {
            name: "high_load".to_owned(),
            target: target.into(),
            arrival_rate: ArrivalRate::default(),
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }

    /// Checks that the parameters describe a runnable workload.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let arrival_rate = &self.arrival_rate;
        if arrival_rate.rate == 0 {
            return Err(ScenarioError::ZeroRate);
        }
        if arrival_rate.time_unit.is_zero() {
            return Err(ScenarioError::ZeroTimeUnit);
        }
        if arrival_rate.max_vus == 0 {
            return Err(ScenarioError::ZeroMaxVus);
        }
        if arrival_rate.pre_allocated_vus > arrival_rate.max_vus {
            return Err(ScenarioError::TooManyPreAllocated {
                pre_allocated: arrival_rate.pre_allocated_vus,
                max: arrival_rate.max_vus,
            });
        }
        Ok(())
    }

    /// Returns the k6 `options` object declaring this scenario.
    pub fn to_k6_options(&self) -> serde_json::Value {
        json!({
            "scenarios": {
                &self.name: &self.arrival_rate,
            }
        })
    }

    /// Renders a complete k6 script running this scenario.
    pub fn to_k6_script(&self) -> serde_json::Result<String> {
        let options = serde_json::to_string_pretty(&self.to_k6_options())?;
        let target = serde_json::to_string(&self.target)?;
        let check = serde_json::to_string(STATUS_CHECK)?;

        Ok(format!(
            "import http from 'k6/http';\n\
             import {{ check }} from 'k6';\n\
             \n\
             export const options = {options};\n\
             \n\
             export default function () {{\n\
             \x20   const res = http.get({target});\n\
             \x20   check(res, {{\n\
             \x20       {check}: (r) => r.status === 200,\n\
             \x20   }});\n\
             }}\n"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_load_options() {
        let scenario = Scenario::high_load("http://lb.example.com/");
        let options = scenario.to_k6_options();

        let high_load = options["scenarios"]["high_load"].as_object().unwrap();
        let mut keys: Vec<_> = high_load.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            [
                "duration",
                "executor",
                "maxVUs",
                "preAllocatedVUs",
                "rate",
                "timeUnit"
            ]
        );

        assert_eq!(high_load["executor"], "constant-arrival-rate");
        assert_eq!(high_load["rate"], 150_000);
        assert_eq!(high_load["timeUnit"], "1s");
        assert_eq!(high_load["duration"], "1m");
        assert_eq!(high_load["preAllocatedVUs"], 2_000);
        assert_eq!(high_load["maxVUs"], 50_000);
    }

    #[test]
    fn status_check() {
        assert_eq!(STATUS_CHECK, "status was 200");
        assert!(status_was_200(StatusCode::OK));
        assert!(!status_was_200(StatusCode::CREATED));
        assert!(!status_was_200(StatusCode::NO_CONTENT));
        assert!(!status_was_200(StatusCode::MOVED_PERMANENTLY));
        assert!(!status_was_200(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn parses_k6_style_yaml() {
        let arrival_rate: ArrivalRate = serde_yaml::from_str(
            r#"
            rate: 500
            timeUnit: 100ms
            duration: 30s
            preAllocatedVUs: 10
            maxVUs: 20
            "#,
        )
        .unwrap();

        assert_eq!(arrival_rate.executor, Executor::ConstantArrivalRate);
        assert_eq!(arrival_rate.rate, 500);
        assert_eq!(arrival_rate.time_unit, Duration::from_millis(100));
        assert_eq!(arrival_rate.duration, Duration::from_secs(30));
        assert_eq!(arrival_rate.pre_allocated_vus, 10);
        assert_eq!(arrival_rate.max_vus, 20);
    }

    #[test]
    fn due_iterations() {
        let arrival_rate = ArrivalRate {
            rate: 10,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(2),
            ..Default::default()
        };

        assert_eq!(arrival_rate.total_iterations(), 20);
        assert_eq!(arrival_rate.due_iterations(Duration::ZERO), 1);
        assert_eq!(arrival_rate.due_iterations(Duration::from_millis(99)), 1);
        assert_eq!(arrival_rate.due_iterations(Duration::from_millis(100)), 2);
        assert_eq!(arrival_rate.due_iterations(Duration::from_millis(1950)), 20);
        assert_eq!(arrival_rate.due_iterations(Duration::from_secs(5)), 20);

        assert_eq!(ArrivalRate::default().total_iterations(), 9_000_000);
    }

    #[test]
    fn validation() {
        let mut scenario = Scenario::high_load("http://localhost/");
        assert_eq!(scenario.validate(), Ok(()));

        scenario.arrival_rate.pre_allocated_vus = 60_000;
        assert_eq!(
            scenario.validate(),
            Err(ScenarioError::TooManyPreAllocated {
                pre_allocated: 60_000,
                max: 50_000
            })
        );

        scenario.arrival_rate.rate = 0;
        assert_eq!(scenario.validate(), Err(ScenarioError::ZeroRate));
    }

    #[test]
    fn renders_k6_script() {
        let script = Scenario::high_load("http://lb.example.com/")
            .to_k6_script()
            .unwrap();

        assert!(script.starts_with("import http from 'k6/http';\n"));
        assert!(script.contains("\"preAllocatedVUs\": 2000"));
        assert!(script.contains("    const res = http.get(\"http://lb.example.com/\");\n"));
        assert!(script.contains("        \"status was 200\": (r) => r.status === 200,\n"));
    }
}
