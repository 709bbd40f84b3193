//! Run a [`Scenario`] with a constant arrival rate and print metrics.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use sketches_ddsketch::DDSketch;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use yansi::Paint;

use crate::http::Target;
use crate::scenario::{STATUS_CHECK, Scenario, status_was_200};

/// How often the scheduler checks for iterations that are due.
const SCHEDULER_TICK: Duration = Duration::from_millis(1);

/// Counters and timings collected while running a scenario.
#[derive(Default)]
pub struct RunMetrics {
    /// Iterations that were started.
    pub iterations: u64,
    /// Iterations that were due but found no free virtual user.
    pub dropped_iterations: u64,
    /// Iterations aborted because they were still running after the graceful stop period.
    pub interrupted_iterations: u64,
    /// Iterations whose response satisfied the status check.
    pub checks_passed: u64,
    /// Iterations whose response failed the status check, including failed requests.
    pub checks_failed: u64,
    /// Requests that did not produce a response at all.
    pub request_failures: u64,
    /// The size the virtual user pool grew to.
    pub vus_allocated: usize,
    /// Request latencies in seconds.
    pub latency: DDSketch,
}

impl fmt::Debug for RunMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunMetrics")
            .field("iterations", &self.iterations)
            .field("dropped_iterations", &self.dropped_iterations)
            .field("interrupted_iterations", &self.interrupted_iterations)
            .field("checks_passed", &self.checks_passed)
            .field("checks_failed", &self.checks_failed)
            .field("request_failures", &self.request_failures)
            .field("vus_allocated", &self.vus_allocated)
            .finish_non_exhaustive()
    }
}

/// A pool of virtual users that grows on demand up to a maximum.
#[derive(Debug)]
struct VuPool {
    semaphore: Arc<Semaphore>,
    allocated: usize,
    max: usize,
}

impl VuPool {
    fn new(pre_allocated: usize, max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(pre_allocated)),
            allocated: pre_allocated,
            max,
        }
    }

    /// Takes an idle virtual user, allocating a new one if all are busy.
    ///
    /// Returns `None` once `max` virtual users are busy.
    fn try_acquire(&mut self) -> Option<OwnedSemaphorePermit> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Some(permit);
        }
        if self.allocated >= self.max {
            return None;
        }

        self.semaphore.add_permits(1);
        self.allocated += 1;
        Arc::clone(&self.semaphore).try_acquire_owned().ok()
    }
}

/// Runs the scenario against the target and returns the collected metrics.
///
/// Iterations are started at the scenario's arrival rate regardless of how long each of them
/// takes. Iterations still in flight when the duration has elapsed are awaited for at most the
/// scenario's graceful stop period and interrupted afterwards.
pub async fn run<T: Target>(target: T, scenario: &Scenario) -> Result<RunMetrics> {
    scenario.validate()?;
    let arrival_rate = &scenario.arrival_rate;

    tracing::info!(
        scenario = %scenario.name,
        target = %scenario.target,
        rate = arrival_rate.rate,
        time_unit = ?arrival_rate.time_unit,
        duration = ?arrival_rate.duration,
        "starting scenario"
    );

    let bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::with_template("{spinner} {msg} {elapsed}")?)
        .with_message(format!("Running scenario {}:", scenario.name));
    bar.enable_steady_tick(Duration::from_millis(100));

    let target = Arc::new(target);
    let metrics = Arc::new(Mutex::new(RunMetrics::default()));
    let mut pool = VuPool::new(arrival_rate.pre_allocated_vus, arrival_rate.max_vus);

    let start = tokio::time::Instant::now();
    let sleep = tokio::time::sleep_until(start + arrival_rate.duration);
    tokio::pin!(sleep);

    let mut ticker = tokio::time::interval(SCHEDULER_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut tasks = JoinSet::new();
    let mut started = 0;
    let mut dropped = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut sleep => break,
        }

        // reap finished iterations
        while tasks.try_join_next().is_some() {}

        let due = arrival_rate.due_iterations(start.elapsed());
        while started + dropped < due {
            let Some(permit) = pool.try_acquire() else {
                dropped += 1;
                continue;
            };
            started += 1;

            let target = Arc::clone(&target);
            let metrics = Arc::clone(&metrics);
            tasks.spawn(async move {
                run_iteration(target.as_ref(), &metrics).await;
                drop(permit);
            });
        }
    }

    let drain = async { while tasks.join_next().await.is_some() {} };
    let drained = tokio::time::timeout(scenario.graceful_stop, drain).await;
    let interrupted = match drained {
        Ok(()) => 0,
        Err(_) => {
            let interrupted = tasks.len() as u64;
            tasks.shutdown().await;
            interrupted
        }
    };
    bar.finish_and_clear();

    let mut metrics = {
        let mut metrics = metrics.lock().unwrap();
        std::mem::take(&mut *metrics)
    };
    metrics.iterations = started;
    metrics.dropped_iterations = dropped;
    metrics.interrupted_iterations = interrupted;
    metrics.vus_allocated = pool.allocated;

    if dropped > 0 {
        tracing::warn!(
            dropped,
            max_vus = arrival_rate.max_vus,
            "not enough virtual users to sustain the arrival rate"
        );
    }
    if interrupted > 0 {
        tracing::warn!(
            interrupted,
            graceful_stop = ?scenario.graceful_stop,
            "iterations still running after the graceful stop were interrupted"
        );
    }

    Ok(metrics)
}

async fn run_iteration<T: Target>(target: &T, metrics: &Mutex<RunMetrics>) {
    let start = Instant::now();
    let result = target.get().await;
    let elapsed = start.elapsed().as_secs_f64();

    let mut metrics = metrics.lock().unwrap();
    match result {
        Ok(status) => {
            metrics.latency.add(elapsed);
            if status_was_200(status) {
                metrics.checks_passed += 1;
            } else {
                tracing::trace!(%status, "check failed");
                metrics.checks_failed += 1;
            }
        }
        Err(err) => {
            tracing::debug!(error = %err, "request failed");
            metrics.request_failures += 1;
            metrics.checks_failed += 1;
        }
    }
}

/// Prints a human readable summary of a finished run to stdout.
pub fn print_metrics(scenario: &Scenario, metrics: &RunMetrics) {
    let duration = scenario.arrival_rate.duration;

    println!();
    println!(
        "{} {} (rate: {}/{:?}, duration: {:?})",
        "## Scenario".bold(),
        scenario.name.as_str().bold().blue(),
        scenario.arrival_rate.rate.bold(),
        scenario.arrival_rate.time_unit,
        duration,
    );

    print!(
        "{} ({} started",
        "ITERATIONS:".bold().green(),
        metrics.iterations.bold()
    );
    if metrics.dropped_iterations > 0 {
        print!(
            ", {}",
            format!("{} DROPPED", metrics.dropped_iterations)
                .bold()
                .red()
        );
    }
    if metrics.interrupted_iterations > 0 {
        print!(
            ", {}",
            format!("{} INTERRUPTED", metrics.interrupted_iterations)
                .bold()
                .yellow()
        );
    }
    println!(", vus: {})", metrics.vus_allocated);
    print_ops(metrics.iterations, duration);
    println!();

    let checks = metrics.checks_passed + metrics.checks_failed;
    if checks > 0 {
        let ratio = metrics.checks_passed as f64 / checks as f64 * 100.0;
        println!(
            "{} {STATUS_CHECK}: {:.2}% ({} passed, {} failed)",
            "CHECK:".bold().green(),
            ratio.bold(),
            metrics.checks_passed,
            metrics.checks_failed,
        );
    }
    if metrics.request_failures > 0 {
        println!(
            "{}",
            format!("{} REQUEST FAILURES", metrics.request_failures)
                .bold()
                .red()
        );
    }

    if metrics.latency.count() > 0 {
        print_percentiles(&metrics.latency, Duration::from_secs_f64);
    }
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let quantile = |q| sketch.quantile(q).ok().flatten().unwrap_or_default();

    let ops = sketch.count();
    let avg = map(sketch.sum().unwrap_or_default() / ops as f64);
    let p50 = map(quantile(0.5));
    let p90 = map(quantile(0.9));
    let p99 = map(quantile(0.99));
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}

fn print_ops(ops: u64, duration: Duration) {
    let ops_ps = ops as f64 / duration.as_secs_f64();
    print!("  {:.2} iterations/s", ops_ps.bold());
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use reqwest::StatusCode;

    use super::*;
    use crate::scenario::ArrivalRate;

    #[derive(Debug)]
    struct FakeTarget {
        status: StatusCode,
        delay: Duration,
        calls: Arc<AtomicU64>,
    }

    impl FakeTarget {
        fn new(status: StatusCode, delay: Duration) -> (Self, Arc<AtomicU64>) {
            let calls = Arc::new(AtomicU64::new(0));
            let target = Self {
                status,
                delay,
                calls: Arc::clone(&calls),
            };
            (target, calls)
        }
    }

    #[async_trait::async_trait]
    impl Target for FakeTarget {
        async fn get(&self) -> anyhow::Result<StatusCode> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(self.delay).await;
            Ok(self.status)
        }
    }

    #[derive(Debug)]
    struct BrokenTarget;

    #[async_trait::async_trait]
    impl Target for BrokenTarget {
        async fn get(&self) -> anyhow::Result<StatusCode> {
            anyhow::bail!("connection refused")
        }
    }

    fn make_scenario(rate: u64, duration: Duration, pre_allocated: usize, max: usize) -> Scenario {
        Scenario {
            name: "testing".into(),
            arrival_rate: ArrivalRate {
                rate,
                time_unit: Duration::from_secs(1),
                duration,
                pre_allocated_vus: pre_allocated,
                max_vus: max,
                ..Default::default()
            },
            ..Scenario::high_load("http://localhost/")
        }
    }

    #[test]
    fn pool_grows_up_to_max() {
        let mut pool = VuPool::new(1, 3);

        let permits: Vec<_> = (0..3).map(|_| pool.try_acquire().unwrap()).collect();
        assert_eq!(pool.allocated, 3);
        assert!(pool.try_acquire().is_none());

        drop(permits);
        assert!(pool.try_acquire().is_some());
        assert_eq!(pool.allocated, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn starts_iterations_at_arrival_rate() {
        let (target, calls) = FakeTarget::new(StatusCode::OK, Duration::from_millis(5));
        let scenario = make_scenario(100, Duration::from_secs(1), 10, 10);

        let metrics = run(target, &scenario).await.unwrap();

        assert!((99..=100).contains(&metrics.iterations), "{metrics:?}");
        assert_eq!(calls.load(Ordering::Relaxed), metrics.iterations);
        assert_eq!(metrics.checks_passed, metrics.iterations);
        assert_eq!(metrics.checks_failed, 0);
        assert_eq!(metrics.dropped_iterations, 0);
        assert_eq!(metrics.latency.count() as u64, metrics.iterations);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_is_independent_of_iteration_duration() {
        // Every iteration outlives the whole run, so each one needs its own virtual user.
        let (target, _calls) = FakeTarget::new(StatusCode::OK, Duration::from_secs(10));
        let scenario = make_scenario(20, Duration::from_secs(1), 2, 100);

        let metrics = run(target, &scenario).await.unwrap();

        assert!((19..=20).contains(&metrics.iterations), "{metrics:?}");
        assert_eq!(metrics.vus_allocated as u64, metrics.iterations);
        assert_eq!(metrics.dropped_iterations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drops_iterations_without_free_vus() {
        let (target, calls) = FakeTarget::new(StatusCode::OK, Duration::from_secs(10));
        let scenario = make_scenario(10, Duration::from_secs(1), 1, 3);

        let metrics = run(target, &scenario).await.unwrap();

        assert_eq!(metrics.iterations, 3);
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.vus_allocated, 3);
        assert!(metrics.dropped_iterations >= 6, "{metrics:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn interrupts_hung_iterations_after_graceful_stop() {
        let (target, calls) = FakeTarget::new(StatusCode::OK, Duration::from_secs(3600));
        let scenario = Scenario {
            graceful_stop: Duration::from_secs(5),
            ..make_scenario(10, Duration::from_secs(1), 10, 10)
        };

        let start = tokio::time::Instant::now();
        let metrics = run(target, &scenario).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(6));
        assert!(start.elapsed() < Duration::from_secs(60), "{:?}", start.elapsed());
        assert_eq!(metrics.iterations, 10);
        assert_eq!(calls.load(Ordering::Relaxed), 10);
        assert_eq!(metrics.interrupted_iterations, 10);
        assert_eq!(metrics.checks_passed + metrics.checks_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_200_fails_check() {
        let (target, _calls) = FakeTarget::new(StatusCode::BAD_GATEWAY, Duration::ZERO);
        let scenario = make_scenario(10, Duration::from_secs(1), 1, 1);

        let metrics = run(target, &scenario).await.unwrap();

        assert!(metrics.iterations > 0);
        assert_eq!(metrics.checks_passed, 0);
        assert_eq!(metrics.checks_failed, metrics.iterations);
        assert_eq!(metrics.request_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn request_errors_fail_check() {
        let scenario = make_scenario(10, Duration::from_secs(1), 1, 1);

        let metrics = run(BrokenTarget, &scenario).await.unwrap();

        assert!(metrics.iterations > 0);
        assert_eq!(metrics.request_failures, metrics.iterations);
        assert_eq!(metrics.checks_failed, metrics.iterations);
        assert_eq!(metrics.latency.count(), 0);
    }

    #[tokio::test]
    async fn rejects_invalid_scenarios() {
        let (target, calls) = FakeTarget::new(StatusCode::OK, Duration::ZERO);
        let scenario = make_scenario(10, Duration::from_secs(1), 5, 1);

        run(target, &scenario).await.unwrap_err();
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }
}
