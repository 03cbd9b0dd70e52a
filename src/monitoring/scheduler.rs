//! Owns every recurring monitoring timer. One driver task sleeps on a
//! priority queue keyed by next-fire time instead of holding one OS timer
//! per target, so resource usage stays bounded under many targets.
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::db::models::{NewSpeedTestResult, SpeedTestResult};
use crate::db::repositories::{RepositoryError, SpeedTestResultRepository, TargetRepository};

use super::config_service::SpeedTestConfigService;
use super::error::MonitorError;
use super::events::{EventBus, MonitorEvent};
use super::speed_test::{SpeedTestMeasurement, SpeedTestRunner};

/// Scheduler-side bookkeeping for one monitored target.
struct ActiveMonitor {
    interval: Duration,
    /// In-flight guard: true while a probe for this target is running.
    running: bool,
    /// Invalidates queue entries armed before an interval change.
    generation: u64,
    /// Identifies this monitor instance across stop/start cycles; an
    /// interval update keeps it so the in-flight guard is still released.
    run_token: u64,
    last_run_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct FireEntry {
    at: Instant,
    generation: u64,
    target_id: String,
}

struct SchedulerState {
    monitors: HashMap<String, ActiveMonitor>,
    /// Insertion order of target ids, for deterministic listing.
    order: Vec<String>,
    queue: BinaryHeap<Reverse<FireEntry>>,
    next_token: u64,
}

impl SchedulerState {
    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub target_id: String,
    pub interval_ms: u64,
    pub running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

pub struct MonitoringScheduler {
    state: Mutex<SchedulerState>,
    wake: Notify,
    runner: Arc<dyn SpeedTestRunner>,
    config_service: Arc<SpeedTestConfigService>,
    targets: Arc<dyn TargetRepository>,
    results: Arc<dyn SpeedTestResultRepository>,
    events: EventBus,
}

impl MonitoringScheduler {
    pub fn new(
        runner: Arc<dyn SpeedTestRunner>,
        config_service: Arc<SpeedTestConfigService>,
        targets: Arc<dyn TargetRepository>,
        results: Arc<dyn SpeedTestResultRepository>,
        events: EventBus,
    ) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                monitors: HashMap::new(),
                order: Vec::new(),
                queue: BinaryHeap::new(),
                next_token: 0,
            }),
            wake: Notify::new(),
            runner,
            config_service,
            targets,
            results,
            events,
        }
    }

    /// Starts recurring monitoring for a target, the first tick one full
    /// interval from now. Starting an already-monitored target replaces
    /// its interval in place without disturbing an in-flight probe.
    pub fn start_monitoring(&self, target_id: &str, interval_ms: i64) -> Result<(), MonitorError> {
        if interval_ms <= 0 {
            return Err(MonitorError::InvalidInterval(interval_ms));
        }
        let interval = Duration::from_millis(interval_ms as u64);

        {
            let mut state = self.state.lock().unwrap();
            let generation = state.next_token();
            match state.monitors.get_mut(target_id) {
                Some(monitor) => {
                    info!(
                        target_id = %target_id,
                        interval_ms = interval_ms,
                        "monitoring interval updated"
                    );
                    monitor.interval = interval;
                    monitor.generation = generation;
                }
                None => {
                    info!(
                        target_id = %target_id,
                        interval_ms = interval_ms,
                        "monitoring started"
                    );
                    state.monitors.insert(
                        target_id.to_string(),
                        ActiveMonitor {
                            interval,
                            running: false,
                            generation,
                            run_token: generation,
                            last_run_at: None,
                            consecutive_failures: 0,
                        },
                    );
                    state.order.push(target_id.to_string());
                }
            }
            state.queue.push(Reverse(FireEntry {
                at: Instant::now() + interval,
                generation,
                target_id: target_id.to_string(),
            }));
        }

        self.wake.notify_one();
        self.events.publish(MonitorEvent::MonitoringStarted {
            target_id: target_id.to_string(),
            interval_ms,
        });
        Ok(())
    }

    /// Cancels the timer for a target. Idempotent: stopping an unknown or
    /// already-stopped target is a no-op. An in-flight probe is not
    /// aborted, but its result is discarded on completion.
    pub fn stop_monitoring(&self, target_id: &str) {
        let removed = {
            let mut state = self.state.lock().unwrap();
            let removed = state.monitors.remove(target_id).is_some();
            if removed {
                state.order.retain(|id| id != target_id);
            }
            removed
        };

        if removed {
            info!(target_id = %target_id, "monitoring stopped");
            self.wake.notify_one();
            self.events.publish(MonitorEvent::MonitoringStopped {
                target_id: target_id.to_string(),
            });
        } else {
            debug!(target_id = %target_id, "stop requested for target not being monitored");
        }
    }

    /// Cancels every timer; used during graceful shutdown.
    pub fn stop_all(&self) {
        let stopped = {
            let mut state = self.state.lock().unwrap();
            let stopped = state.monitors.len();
            state.monitors.clear();
            state.order.clear();
            state.queue.clear();
            stopped
        };
        info!(stopped = stopped, "all monitoring stopped");
        self.wake.notify_one();
    }

    /// Currently monitored target ids in insertion order.
    pub fn get_active_targets(&self) -> Vec<String> {
        self.state.lock().unwrap().order.clone()
    }

    pub fn monitor_status(&self, target_id: &str) -> Option<MonitorStatus> {
        let state = self.state.lock().unwrap();
        state.monitors.get(target_id).map(|monitor| MonitorStatus {
            target_id: target_id.to_string(),
            interval_ms: monitor.interval.as_millis() as u64,
            running: monitor.running,
            last_run_at: monitor.last_run_at,
            consecutive_failures: monitor.consecutive_failures,
        })
    }

    /// One-shot speed test outside the schedule: resolve config, probe,
    /// persist, emit.
    pub async fn run_speed_test(&self, target_id: &str) -> Result<SpeedTestResult, MonitorError> {
        let target = self
            .targets
            .find_by_id(target_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("target {target_id}")))?;
        let config = self
            .config_service
            .resolve_config(&target.owner_id, &target)
            .await?;
        let measurement = self.runner.run(&target, &config).await?;
        let result = self
            .results
            .create(new_result(target_id, measurement, config.speed_test_url_id))
            .await?;
        self.events.publish(MonitorEvent::SpeedTestCompleted {
            target_id: target_id.to_string(),
            result: result.clone(),
        });
        Ok(result)
    }

    /// Driver loop: sleeps until the earliest pending deadline, firing due
    /// entries; woken early whenever start/stop mutates the schedule.
    pub async fn run(self: Arc<Self>) {
        info!("monitoring scheduler started");
        loop {
            match self.next_deadline() {
                None => self.wake.notified().await,
                Some(at) => {
                    tokio::select! {
                        _ = sleep_until(at) => self.fire_due(),
                        _ = self.wake.notified() => {}
                    }
                }
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let mut state = self.state.lock().unwrap();
        loop {
            let (at, target_id, generation) = match state.queue.peek() {
                None => return None,
                Some(Reverse(entry)) => (entry.at, entry.target_id.clone(), entry.generation),
            };
            let valid = state
                .monitors
                .get(&target_id)
                .is_some_and(|m| m.generation == generation);
            if valid {
                return Some(at);
            }
            state.queue.pop();
        }
    }

    /// Pops every due entry, re-arms it on fixed cadence and claims the
    /// in-flight guard. Guard bookkeeping happens entirely inside the
    /// lock, with no await, so the read-check-set is atomic.
    fn fire_due(self: &Arc<Self>) {
        let now = Instant::now();
        let mut due: Vec<(String, u64)> = Vec::new();

        {
            let mut state = self.state.lock().unwrap();
            loop {
                if !matches!(state.queue.peek(), Some(Reverse(entry)) if entry.at <= now) {
                    break;
                }
                let Some(Reverse(entry)) = state.queue.pop() else {
                    break;
                };

                let rearm = match state.monitors.get_mut(&entry.target_id) {
                    Some(monitor) if monitor.generation == entry.generation => {
                        let mut at = entry.at + monitor.interval;
                        // Catch up after a stall instead of firing a burst.
                        while at <= now {
                            at += monitor.interval;
                        }
                        let claimed = if monitor.running {
                            debug!(
                                target_id = %entry.target_id,
                                "previous run still in flight, skipping tick"
                            );
                            None
                        } else {
                            monitor.running = true;
                            Some(monitor.run_token)
                        };
                        Some((at, entry.generation, claimed))
                    }
                    // Stale entry: target stopped or interval re-armed.
                    _ => None,
                };

                if let Some((at, generation, claimed)) = rearm {
                    state.queue.push(Reverse(FireEntry {
                        at,
                        generation,
                        target_id: entry.target_id.clone(),
                    }));
                    if let Some(run_token) = claimed {
                        due.push((entry.target_id, run_token));
                    }
                }
            }
        }

        for (target_id, run_token) in due {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                scheduler.execute_tick(target_id, run_token).await;
            });
        }
    }

    /// One tick: probe, persist, emit, release the guard. Every failure is
    /// caught here so a bad tick never stops the schedule or the process.
    async fn execute_tick(&self, target_id: String, run_token: u64) {
        debug!(target_id = %target_id, "tick started");

        let outcome: Result<Option<(SpeedTestMeasurement, Option<String>)>, MonitorError> =
            async {
                let Some(target) = self.targets.find_by_id(&target_id).await? else {
                    return Ok(None);
                };
                let config = self
                    .config_service
                    .resolve_config(&target.owner_id, &target)
                    .await?;
                let measurement = self.runner.run(&target, &config).await?;
                Ok(Some((measurement, config.speed_test_url_id)))
            }
            .await;

        match outcome {
            Ok(None) => {
                warn!(target_id = %target_id, "target no longer exists, stopping its monitor");
                self.stop_monitoring(&target_id);
            }
            Ok(Some((measurement, speed_test_url_id))) => {
                if !self.is_current(&target_id, run_token) {
                    debug!(
                        target_id = %target_id,
                        "monitor stopped while probe was in flight, discarding late result"
                    );
                    return;
                }
                let success = measurement.success;
                match self
                    .results
                    .create(new_result(&target_id, measurement, speed_test_url_id))
                    .await
                {
                    Ok(result) => {
                        self.events.publish(MonitorEvent::SpeedTestCompleted {
                            target_id: target_id.clone(),
                            result,
                        });
                    }
                    Err(e) => {
                        error!(
                            target_id = %target_id,
                            error = %e,
                            "failed to persist speed test result"
                        );
                        self.events.publish(MonitorEvent::MonitoringError {
                            target_id: target_id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
                self.finish_tick(&target_id, run_token, success);
            }
            Err(e) => {
                error!(target_id = %target_id, error = %e, "tick execution failed");
                self.events.publish(MonitorEvent::MonitoringError {
                    target_id: target_id.clone(),
                    error: e.to_string(),
                });
                self.finish_tick(&target_id, run_token, false);
            }
        }
    }

    fn is_current(&self, target_id: &str, run_token: u64) -> bool {
        let state = self.state.lock().unwrap();
        state
            .monitors
            .get(target_id)
            .is_some_and(|m| m.run_token == run_token)
    }

    /// Releases the in-flight guard and updates bookkeeping. Called on
    /// every exit path of a tick whose monitor instance still exists.
    fn finish_tick(&self, target_id: &str, run_token: u64, success: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(monitor) = state.monitors.get_mut(target_id) {
            if monitor.run_token != run_token {
                return;
            }
            monitor.running = false;
            monitor.last_run_at = Some(Utc::now());
            if success {
                monitor.consecutive_failures = 0;
            } else {
                monitor.consecutive_failures += 1;
            }
        }
    }
}

fn new_result(
    target_id: &str,
    measurement: SpeedTestMeasurement,
    speed_test_url_id: Option<String>,
) -> NewSpeedTestResult {
    NewSpeedTestResult {
        target_id: target_id.to_string(),
        ping_ms: measurement.ping_ms,
        jitter_ms: measurement.jitter_ms,
        download_mbps: measurement.download_mbps,
        success: measurement.success,
        error: measurement.error,
        speed_test_url_id,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::sleep;

    use super::*;
    use crate::db::memory::{
        InMemorySpeedTestResultRepository, InMemoryTargetRepository,
        InMemoryUserSpeedTestPreferenceRepository,
    };
    use crate::db::models::{CreateTarget, MonitoringTarget};
    use crate::monitoring::config_service::SpeedTestConfig;

    struct StubRunner {
        calls: AtomicUsize,
        delays: StdMutex<VecDeque<Duration>>,
        succeed: bool,
    }

    impl StubRunner {
        fn instant() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delays: StdMutex::new(VecDeque::new()),
                succeed: true,
            }
        }

        fn with_delays(delays: Vec<Duration>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delays: StdMutex::new(delays.into()),
                succeed: true,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delays: StdMutex::new(VecDeque::new()),
                succeed: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SpeedTestRunner for StubRunner {
        async fn run(
            &self,
            _target: &MonitoringTarget,
            _config: &SpeedTestConfig,
        ) -> Result<SpeedTestMeasurement, MonitorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.lock().unwrap().pop_front();
            if let Some(delay) = delay {
                sleep(delay).await;
            }
            if self.succeed {
                Ok(SpeedTestMeasurement {
                    ping_ms: Some(12.5),
                    jitter_ms: Some(0.8),
                    download_mbps: Some(94.2),
                    success: true,
                    error: None,
                })
            } else {
                Ok(SpeedTestMeasurement {
                    ping_ms: None,
                    jitter_ms: None,
                    download_mbps: None,
                    success: false,
                    error: Some("timeout".to_string()),
                })
            }
        }
    }

    struct FailingResultRepository;

    #[async_trait]
    impl SpeedTestResultRepository for FailingResultRepository {
        async fn create(
            &self,
            _data: NewSpeedTestResult,
        ) -> Result<SpeedTestResult, RepositoryError> {
            Err(RepositoryError::NotFound("results table".to_string()))
        }

        async fn find_by_target(
            &self,
            _target_id: &str,
            _limit: i64,
        ) -> Result<Vec<SpeedTestResult>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        scheduler: Arc<MonitoringScheduler>,
        runner: Arc<StubRunner>,
        targets: Arc<InMemoryTargetRepository>,
        results: Arc<InMemorySpeedTestResultRepository>,
        events: EventBus,
    }

    fn spawn_scheduler(
        runner: Arc<StubRunner>,
        targets: Arc<InMemoryTargetRepository>,
        results: Arc<dyn SpeedTestResultRepository>,
        events: EventBus,
    ) -> Arc<MonitoringScheduler> {
        let preferences = Arc::new(InMemoryUserSpeedTestPreferenceRepository::new());
        let config_service = Arc::new(SpeedTestConfigService::new(
            preferences,
            None,
            Duration::from_secs(10),
            0,
        ));
        let scheduler = Arc::new(MonitoringScheduler::new(
            runner,
            config_service,
            targets,
            results,
            events,
        ));
        tokio::spawn(scheduler.clone().run());
        scheduler
    }

    fn fixture(runner: StubRunner) -> Fixture {
        let runner = Arc::new(runner);
        let targets = Arc::new(InMemoryTargetRepository::new());
        let results = Arc::new(InMemorySpeedTestResultRepository::new());
        let events = EventBus::new(64);
        let scheduler = spawn_scheduler(
            runner.clone(),
            targets.clone(),
            results.clone(),
            events.clone(),
        );
        Fixture {
            scheduler,
            runner,
            targets,
            results,
            events,
        }
    }

    async fn seed_target(fx: &Fixture) -> MonitoringTarget {
        fx.targets
            .create(CreateTarget {
                name: "home router".to_string(),
                address: "https://example.com".to_string(),
                owner_id: "u1".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_interval_when_runs_are_fast() {
        let fx = fixture(StubRunner::instant());
        let target = seed_target(&fx).await;

        fx.scheduler.start_monitoring(&target.id, 100).unwrap();
        sleep(Duration::from_millis(550)).await;

        assert_eq!(fx.runner.calls(), 5);
        assert_eq!(fx.results.all().len(), 5);
        assert_eq!(fx.scheduler.get_active_targets(), vec![target.id.clone()]);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_run_skips_ticks_instead_of_queueing() {
        // First run takes 1200ms with a 1000ms interval: the tick at
        // t=2000 must be skipped, the one at t=3000 must fire.
        let fx = fixture(StubRunner::with_delays(vec![Duration::from_millis(1200)]));
        let target = seed_target(&fx).await;

        fx.scheduler.start_monitoring(&target.id, 1000).unwrap();

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(fx.runner.calls(), 1);

        sleep(Duration::from_millis(1000)).await; // past t=2000
        assert_eq!(fx.runner.calls(), 1, "tick during in-flight run must be skipped");

        sleep(Duration::from_millis(1000)).await; // past t=3000
        assert_eq!(fx.runner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_target_does_not_stall_other_targets() {
        let fx = fixture(StubRunner::with_delays(vec![Duration::from_secs(50)]));
        let slow = seed_target(&fx).await;
        let fast = fx
            .targets
            .create(CreateTarget {
                name: "gateway".to_string(),
                address: "192.168.1.1".to_string(),
                owner_id: "u1".to_string(),
            })
            .await
            .unwrap();

        fx.scheduler.start_monitoring(&slow.id, 1000).unwrap();
        fx.scheduler.start_monitoring(&fast.id, 1000).unwrap();

        sleep(Duration::from_millis(4500)).await;

        // slow: one in-flight run; fast: one run per interval.
        assert_eq!(fx.runner.calls(), 1 + 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_unknown_targets_are_a_noop() {
        let fx = fixture(StubRunner::instant());
        let target = seed_target(&fx).await;

        fx.scheduler.stop_monitoring("no-such-target");

        fx.scheduler.start_monitoring(&target.id, 100).unwrap();
        fx.scheduler.stop_monitoring(&target.id);
        fx.scheduler.stop_monitoring(&target.id);

        assert!(fx.scheduler.get_active_targets().is_empty());
        sleep(Duration::from_millis(500)).await;
        assert_eq!(fx.runner.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_interval_without_duplicating_the_entry() {
        let fx = fixture(StubRunner::instant());
        let target = seed_target(&fx).await;

        fx.scheduler.start_monitoring(&target.id, 1000).unwrap();
        fx.scheduler.start_monitoring(&target.id, 200).unwrap();

        assert_eq!(fx.scheduler.get_active_targets().len(), 1);
        let status = fx.scheduler.monitor_status(&target.id).unwrap();
        assert_eq!(status.interval_ms, 200);

        sleep(Duration::from_millis(1050)).await;
        // New cadence only: ticks at 200..1000, none from the old 1000ms arm.
        assert_eq!(fx.runner.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_non_positive_intervals() {
        let fx = fixture(StubRunner::instant());

        assert!(matches!(
            fx.scheduler.start_monitoring("t1", 0),
            Err(MonitorError::InvalidInterval(0))
        ));
        assert!(matches!(
            fx.scheduler.start_monitoring("t1", -5),
            Err(MonitorError::InvalidInterval(-5))
        ));
        assert!(fx.scheduler.get_active_targets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_keeps_the_schedule_running() {
        let runner = Arc::new(StubRunner::instant());
        let targets = Arc::new(InMemoryTargetRepository::new());
        let bus = EventBus::new(64);
        let scheduler = spawn_scheduler(
            runner.clone(),
            targets.clone(),
            Arc::new(FailingResultRepository),
            bus.clone(),
        );
        let target = targets
            .create(CreateTarget {
                name: "home router".to_string(),
                address: "https://example.com".to_string(),
                owner_id: "u1".to_string(),
            })
            .await
            .unwrap();
        let mut events = bus.subscribe();

        scheduler.start_monitoring(&target.id, 100).unwrap();
        sleep(Duration::from_millis(250)).await;

        assert_eq!(runner.calls(), 2, "schedule must survive repository failures");

        let mut saw_error = false;
        loop {
            match events.try_recv() {
                Ok(MonitorEvent::MonitoringError { .. }) => saw_error = true,
                Ok(MonitorEvent::SpeedTestCompleted { .. }) => {
                    panic!("no completion event may be emitted when persistence fails")
                }
                Ok(_) => {}
                Err(TryRecvError::Empty) => break,
                Err(e) => panic!("event stream broken: {e}"),
            }
        }
        assert!(saw_error);
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_after_stop_is_discarded() {
        let fx = fixture(StubRunner::with_delays(vec![Duration::from_millis(500)]));
        let target = seed_target(&fx).await;
        let mut events = fx.events.subscribe();

        fx.scheduler.start_monitoring(&target.id, 1000).unwrap();
        sleep(Duration::from_millis(1100)).await; // run in flight since t=1000
        assert_eq!(fx.runner.calls(), 1);

        fx.scheduler.stop_monitoring(&target.id);
        sleep(Duration::from_millis(600)).await; // probe finishes around t=1500

        assert!(fx.results.all().is_empty(), "late result must not be persisted");
        loop {
            match events.try_recv() {
                Ok(MonitorEvent::SpeedTestCompleted { .. }) => {
                    panic!("late result must not be emitted")
                }
                Ok(_) => {}
                Err(TryRecvError::Empty) => break,
                Err(e) => panic!("event stream broken: {e}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_target_row_stops_its_monitor() {
        let fx = fixture(StubRunner::instant());

        fx.scheduler.start_monitoring("ghost", 100).unwrap();
        sleep(Duration::from_millis(250)).await;

        assert_eq!(fx.runner.calls(), 0);
        assert!(fx.scheduler.get_active_targets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn successful_tick_persists_and_emits() {
        let fx = fixture(StubRunner::instant());
        let target = seed_target(&fx).await;
        let mut events = fx.events.subscribe();

        fx.scheduler.start_monitoring(&target.id, 100).unwrap();
        sleep(Duration::from_millis(150)).await;

        let results = fx.results.all();
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].ping_ms, Some(12.5));
        assert_eq!(results[0].speed_test_url_id.as_deref(), Some("cachefly-10mb"));

        let mut saw_completion = false;
        loop {
            match events.try_recv() {
                Ok(MonitorEvent::SpeedTestCompleted { target_id, result }) => {
                    assert_eq!(target_id, target.id);
                    assert!(result.success);
                    saw_completion = true;
                }
                Ok(_) => {}
                Err(TryRecvError::Empty) => break,
                Err(e) => panic!("event stream broken: {e}"),
            }
        }
        assert!(saw_completion);

        let status = fx.scheduler.monitor_status(&target.id).unwrap();
        assert!(!status.running);
        assert!(status.last_run_at.is_some());
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_failures_accumulate_without_backoff() {
        let fx = fixture(StubRunner::failing());
        let target = seed_target(&fx).await;

        fx.scheduler.start_monitoring(&target.id, 100).unwrap();
        sleep(Duration::from_millis(350)).await;

        // No back-off, no auto-disable: the schedule keeps retrying.
        assert_eq!(fx.runner.calls(), 3);
        let status = fx.scheduler.monitor_status(&target.id).unwrap();
        assert_eq!(status.consecutive_failures, 3);

        let results = fx.results.all();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.success));
        assert_eq!(results[0].error.as_deref(), Some("timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_cancels_every_timer() {
        let fx = fixture(StubRunner::instant());
        let t1 = seed_target(&fx).await;
        let t2 = seed_target(&fx).await;

        fx.scheduler.start_monitoring(&t1.id, 100).unwrap();
        fx.scheduler.start_monitoring(&t2.id, 100).unwrap();
        fx.scheduler.stop_all();

        assert!(fx.scheduler.get_active_targets().is_empty());
        sleep(Duration::from_millis(500)).await;
        assert_eq!(fx.runner.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_speed_test_persists_and_returns_the_result() {
        let fx = fixture(StubRunner::instant());
        let target = seed_target(&fx).await;

        let result = fx.scheduler.run_speed_test(&target.id).await.unwrap();
        assert!(result.success);
        assert_eq!(result.target_id, target.id);
        assert_eq!(fx.results.all().len(), 1);

        let missing = fx.scheduler.run_speed_test("no-such-target").await;
        assert!(matches!(
            missing,
            Err(MonitorError::Repository(RepositoryError::NotFound(_)))
        ));
    }
}
