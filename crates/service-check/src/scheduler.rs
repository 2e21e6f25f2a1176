//! Fixed-interval poll loop.
//!
//! Every tick reloads the config, fans out one task per service and waits for
//! all of them before the next tick is scheduled, so passes never overlap.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::check::{check_service, CheckOutcome};
use crate::config::LoadFailurePolicy;
use crate::error::Result;
use crate::probe::Prober;
use crate::remediate::ExposureRemover;
use crate::services::{load_service_checks, ConfigSource};

/// Time source driving the tick cadence.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep_until(&self, deadline: Instant);
}

/// Wall-clock time via the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

/// Next tick boundary after `previous`. Boundaries already passed while a slow
/// pass was running are dropped rather than fired back to back.
pub fn next_deadline(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let mut next = previous + interval;
    while next <= now {
        next += interval;
    }
    next
}

/// Spawn-N / join-all group collecting every task's result.
pub struct TaskGroup<T> {
    tasks: JoinSet<T>,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task. Nothing is cancelled; results arrive in completion order.
    pub async fn join_all(mut self) -> Vec<std::result::Result<T, JoinError>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(result) = self.tasks.join_next().await {
            results.push(result);
        }
        results
    }
}

impl<T: Send + 'static> Default for TaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Tally of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub healthy: usize,
    pub remediated: usize,
    pub remediation_failed: usize,
    /// Tasks that panicked before producing an outcome
    pub panicked: usize,
}

impl PassReport {
    pub fn record(&mut self, outcome: CheckOutcome) {
        match outcome {
            CheckOutcome::Healthy => self.healthy += 1,
            CheckOutcome::Remediated => self.remediated += 1,
            CheckOutcome::RemediationFailed => self.remediation_failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.healthy + self.remediated + self.remediation_failed + self.panicked
    }
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub configmap_namespace: String,
    pub configmap_name: String,
    pub interval: Duration,
    pub on_load_failure: LoadFailurePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            configmap_namespace: "default".to_string(),
            configmap_name: "service-check-config".to_string(),
            interval: Duration::from_secs(15),
            on_load_failure: LoadFailurePolicy::Abort,
        }
    }
}

/// Drives load → check → remediate passes on a fixed interval.
pub struct Scheduler {
    config: SchedulerConfig,
    source: Arc<dyn ConfigSource>,
    prober: Arc<dyn Prober>,
    remover: Arc<dyn ExposureRemover>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        source: Arc<dyn ConfigSource>,
        prober: Arc<dyn Prober>,
        remover: Arc<dyn ExposureRemover>,
    ) -> Self {
        Self {
            config,
            source,
            prober,
            remover,
            clock: Arc::new(TokioClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one pass immediately: load, fan out, join.
    pub async fn run_once(&self) -> Result<PassReport> {
        let services = load_service_checks(
            self.source.as_ref(),
            &self.config.configmap_namespace,
            &self.config.configmap_name,
        )
        .await?;

        let mut group = TaskGroup::new();
        for service in services {
            let prober = Arc::clone(&self.prober);
            let remover = Arc::clone(&self.remover);
            group.spawn(async move {
                check_service(prober.as_ref(), remover.as_ref(), &service).await
            });
        }
        debug!(tasks = group.len(), "Dispatched service checks");

        let mut report = PassReport::default();
        for result in group.join_all().await {
            match result {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(error = %e, "Service check task did not complete");
                    report.panicked += 1;
                }
            }
        }

        info!(
            healthy = report.healthy,
            remediated = report.remediated,
            remediation_failed = report.remediation_failed,
            panicked = report.panicked,
            "Pass complete"
        );
        Ok(report)
    }

    /// Poll forever. Returns only when a load error hits the `Abort` policy.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Poll until `shutdown` resolves. Shutdown is observed between passes;
    /// an in-flight pass always runs to completion.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.drive(shutdown, None, |_| {}).await
    }

    /// Run exactly `ticks` ticks on the configured cadence and return the
    /// reports of the passes that ran. Skipped ticks produce no report.
    pub async fn run_ticks(&self, ticks: usize) -> Result<Vec<PassReport>> {
        let mut reports = Vec::new();
        self.drive(std::future::pending(), Some(ticks), |report| {
            reports.push(report);
        })
        .await?;
        Ok(reports)
    }

    async fn drive<F, R>(&self, shutdown: F, max_ticks: Option<usize>, mut on_report: R) -> Result<()>
    where
        F: Future<Output = ()>,
        R: FnMut(PassReport),
    {
        tokio::pin!(shutdown);

        info!(
            configmap = %self.config.configmap_name,
            namespace = %self.config.configmap_namespace,
            interval_secs = self.config.interval.as_secs(),
            "Start polling"
        );

        let mut deadline = self.clock.now() + self.config.interval;
        let mut ticks = 0usize;

        while max_ticks.is_none_or(|max| ticks < max) {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("Shutdown requested, stopping poll loop");
                    return Ok(());
                }
                () = self.clock.sleep_until(deadline) => {}
            }
            ticks += 1;

            match self.run_once().await {
                Ok(report) => on_report(report),
                Err(e)
                    if e.is_config_error()
                        && self.config.on_load_failure == LoadFailurePolicy::Skip =>
                {
                    warn!(
                        configmap = %self.config.configmap_name,
                        namespace = %self.config.configmap_namespace,
                        error = %e,
                        "Error loading service checks, skipping tick"
                    );
                }
                Err(e) => {
                    error!(
                        configmap = %self.config.configmap_name,
                        namespace = %self.config.configmap_namespace,
                        error = %e,
                        "Error loading service checks, aborting"
                    );
                    return Err(e);
                }
            }

            deadline = next_deadline(deadline, self.config.interval, self.clock.now());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::probe::ProbeResult;
    use crate::services::{ServiceCheck, SERVICES_KEY};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Load,
        ProbeStart(String),
        ProbeEnd(String),
        Delete(String, String),
    }

    type Log = Arc<Mutex<Vec<Event>>>;

    struct ManualClock {
        now: Mutex<Instant>,
        sleeps: Mutex<Vec<Instant>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
                sleeps: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        async fn sleep_until(&self, deadline: Instant) {
            let mut now = self.now.lock().unwrap();
            if deadline > *now {
                *now = deadline;
            }
            self.sleeps.lock().unwrap().push(deadline);
        }
    }

    struct ScriptedSource {
        yaml: String,
        fail_first: usize,
        calls: AtomicUsize,
        log: Log,
    }

    #[async_trait]
    impl ConfigSource for ScriptedSource {
        async fn fetch(&self, _namespace: &str, _name: &str) -> Result<BTreeMap<String, String>> {
            self.log.lock().unwrap().push(Event::Load);
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
                return Err(Error::ConfigFormat("boom".to_string()));
            }
            let mut data = BTreeMap::new();
            data.insert(SERVICES_KEY.to_string(), self.yaml.clone());
            Ok(data)
        }
    }

    /// Healthy unless the command is `fail`; sleeps `port` ms so tasks finish out of order.
    struct SlowProber {
        log: Log,
    }

    #[async_trait]
    impl Prober for SlowProber {
        async fn probe(&self, service: &ServiceCheck) -> ProbeResult {
            self.log
                .lock()
                .unwrap()
                .push(Event::ProbeStart(service.name.clone()));
            tokio::time::sleep(Duration::from_millis(service.port.unsigned_abs())).await;
            self.log
                .lock()
                .unwrap()
                .push(Event::ProbeEnd(service.name.clone()));
            if service.command == "fail" {
                ProbeResult::Failed { exit_code: Some(1) }
            } else {
                ProbeResult::Healthy
            }
        }
    }

    struct LoggingRemover {
        log: Log,
    }

    #[async_trait]
    impl ExposureRemover for LoggingRemover {
        async fn remove(&self, namespace: &str, endpoint: &str) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(Event::Delete(namespace.to_string(), endpoint.to_string()));
            Ok(())
        }
    }

    const YAML: &str = r#"
services:
  - name: slow
    port: 300
    command: "ok"
  - name: broken
    namespace: shop
    endpoint: cart
    port: 20
    command: "fail"
  - name: fast
    port: 5
    command: "ok"
"#;

    fn scheduler(fail_first: usize, policy: LoadFailurePolicy) -> (Scheduler, Log, Arc<ManualClock>) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let clock = Arc::new(ManualClock::new());
        let source = ScriptedSource {
            yaml: YAML.to_string(),
            fail_first,
            calls: AtomicUsize::new(0),
            log: Arc::clone(&log),
        };
        let config = SchedulerConfig {
            on_load_failure: policy,
            ..Default::default()
        };
        let scheduler = Scheduler::new(
            config,
            Arc::new(source),
            Arc::new(SlowProber {
                log: Arc::clone(&log),
            }),
            Arc::new(LoggingRemover {
                log: Arc::clone(&log),
            }),
        )
        .with_clock(clock.clone());
        (scheduler, log, clock)
    }

    #[test]
    fn next_deadline_keeps_cadence() {
        let start = Instant::now();
        let interval = Duration::from_secs(15);
        assert_eq!(next_deadline(start, interval, start), start + interval);
    }

    #[test]
    fn next_deadline_drops_missed_ticks() {
        let start = Instant::now();
        let interval = Duration::from_secs(15);
        let now = start + Duration::from_secs(40);
        assert_eq!(next_deadline(start, interval, now), start + Duration::from_secs(45));
    }

    #[tokio::test]
    async fn task_group_collects_every_result() {
        let mut group = TaskGroup::new();
        for i in 0..5u32 {
            group.spawn(async move { i * 2 });
        }
        assert_eq!(group.len(), 5);
        let mut values: Vec<u32> = group.join_all().await.into_iter().map(|r| r.unwrap()).collect();
        values.sort_unstable();
        assert_eq!(values, vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn task_group_reports_panics() {
        let mut group: TaskGroup<()> = TaskGroup::new();
        group.spawn(async { panic!("probe exploded") });
        group.spawn(async {});
        let results = group.join_all().await;
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_tallies_outcomes_and_deletes_by_endpoint() {
        let (scheduler, log, _) = scheduler(0, LoadFailurePolicy::Abort);
        let report = scheduler.run_once().await.unwrap();
        assert_eq!(report.healthy, 2);
        assert_eq!(report.remediated, 1);
        assert_eq!(report.total(), 3);

        let deletes: Vec<_> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, Event::Delete(..)))
            .cloned()
            .collect();
        assert_eq!(deletes, vec![Event::Delete("shop".to_string(), "cart".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn passes_never_overlap() {
        let (scheduler, log, _) = scheduler(0, LoadFailurePolicy::Abort);
        let reports = scheduler.run_ticks(3).await.unwrap();
        assert_eq!(reports.len(), 3);

        let log = log.lock().unwrap();
        let loads: Vec<usize> = log
            .iter()
            .enumerate()
            .filter(|(_, e)| **e == Event::Load)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(loads.len(), 3);

        // Every probe of tick N must end before tick N+1 loads its config.
        for window in loads.windows(2) {
            let (this_tick, next_tick) = (window[0], window[1]);
            let starts = log[this_tick..next_tick]
                .iter()
                .filter(|e| matches!(e, Event::ProbeStart(_)))
                .count();
            let ends = log[this_tick..next_tick]
                .iter()
                .filter(|e| matches!(e, Event::ProbeEnd(_)))
                .count();
            assert_eq!(starts, 3);
            assert_eq!(ends, 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_the_interval() {
        let (scheduler, _, clock) = scheduler(0, LoadFailurePolicy::Abort);
        let start = clock.now();
        scheduler.run_ticks(3).await.unwrap();

        let interval = scheduler.config().interval;
        let sleeps = clock.sleeps.lock().unwrap().clone();
        assert_eq!(
            sleeps,
            vec![start + interval, start + interval * 2, start + interval * 3]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn abort_policy_stops_on_load_error() {
        let (scheduler, log, _) = scheduler(1, LoadFailurePolicy::Abort);
        let err = scheduler.run_ticks(3).await.unwrap_err();
        assert!(matches!(err, Error::ConfigFormat(_)));
        let loads = log.lock().unwrap().iter().filter(|e| **e == Event::Load).count();
        assert_eq!(loads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_policy_retries_next_tick() {
        let (scheduler, _, _) = scheduler(1, LoadFailurePolicy::Skip);
        let reports = scheduler.run_ticks(3).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.total() == 3));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_between_passes() {
        let (scheduler, log, _) = scheduler(0, LoadFailurePolicy::Abort);
        scheduler.run_until(async {}).await.unwrap();
        assert!(log.lock().unwrap().is_empty());
    }
}
