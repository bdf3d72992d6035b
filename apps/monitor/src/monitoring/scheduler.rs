use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::checker::Probe;
use super::detector::detect;
use super::types::{MonitorEvent, Observation, ProbeResult, Transition};
use crate::config::{ConfigError, MonitorSettings};
use crate::database::HistoryStore;
use crate::error::StorageError;

const EVENT_CAPACITY: usize = 64;

/// Lifecycle of the monitoring loop. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// What happened during one pass over the endpoints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub results: Vec<ProbeResult>,
    pub transitions: Vec<Transition>,
    /// A stop request cut the cycle short
    pub interrupted: bool,
}

/// Time left to wait so that cycles start `interval` apart
pub fn sleep_duration(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Monitoring scheduler - probes every endpoint once per cycle, records the
/// results and reports status changes
pub struct MonitoringScheduler {
    settings: MonitorSettings,
    probe: Arc<dyn Probe>,
    store: Arc<dyn HistoryStore>,
    shutdown: CancellationToken,
    events: broadcast::Sender<MonitorEvent>,
    state: watch::Sender<SchedulerState>,
}

impl MonitoringScheduler {
    /// Create a scheduler, rejecting unusable settings up front
    pub fn new(
        settings: MonitorSettings,
        probe: Arc<dyn Probe>,
        store: Arc<dyn HistoryStore>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(SchedulerState::Idle);

        Ok(Self { settings, probe, store, shutdown: CancellationToken::new(), events, state })
    }

    /// Use an externally owned token as the stop signal
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Request a graceful stop. The loop returns at the next endpoint
    /// boundary, abandoning an in-flight probe or sleep.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run cycles until stopped.
    ///
    /// Returns `Ok` after a stop request and the storage error that aborted
    /// the loop otherwise, for the caller to report. Either way the scheduler
    /// ends up `Stopped`.
    pub async fn run(&self) -> Result<(), StorageError> {
        let outcome = self.run_until_stopped().await;
        self.state.send_replace(SchedulerState::Stopped);

        if outcome.is_ok() {
            info!("Uptime monitor stopped");
        }

        outcome
    }

    /// Initialize the store and run a single cycle
    pub async fn run_once(&self) -> Result<CycleReport, StorageError> {
        self.store.init().await?;
        self.run_cycle().await
    }

    async fn run_until_stopped(&self) -> Result<(), StorageError> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }

        self.store.init().await?;
        self.state.send_replace(SchedulerState::Running);
        info!("Uptime monitor started - watching {} URLs", self.settings.endpoints.len());

        let interval = self.settings.interval();

        loop {
            let cycle_start = Instant::now();

            let report = self.run_cycle().await?;
            if report.interrupted {
                break;
            }

            let pause = sleep_duration(interval, cycle_start.elapsed());
            info!("Sleeping {:.0}s...", pause.as_secs_f64());

            // An interval past the clock's range means no further cycle
            let Some(deadline) = cycle_start.checked_add(interval) else {
                self.shutdown.cancelled().await;
                break;
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep_until(deadline) => {}
            }
        }

        Ok(())
    }

    /// Probe every configured endpoint once, in configured order
    pub async fn run_cycle(&self) -> Result<CycleReport, StorageError> {
        let mut report = CycleReport::default();
        let timeout = self.settings.timeout();

        for endpoint in &self.settings.endpoints {
            if self.shutdown.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let probed = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                result = self.probe.check(endpoint, timeout) => Some(result),
            };

            let Some(result) = probed else {
                debug!(endpoint = %endpoint, "Probe abandoned on shutdown");
                report.interrupted = true;
                break;
            };

            if let Some(transition) = self.record(&result).await? {
                report.transitions.push(transition);
            }
            report.results.push(result);
        }

        Ok(report)
    }

    /// Compare against the previous status, persist, then publish
    async fn record(&self, result: &ProbeResult) -> Result<Option<Transition>, StorageError> {
        // Read before write: the comparison is against the previous cycle
        let previous = self.store.last_status(result.endpoint()).await?;
        self.store.save(result).await?;

        let transition = detect(previous, result);
        if let Some(transition) = &transition {
            self.emit(MonitorEvent::Alert(transition.clone()));
        }
        self.emit(MonitorEvent::Observation(Observation::from(result)));

        Ok(transition)
    }

    fn emit(&self, event: MonitorEvent) {
        match &event {
            MonitorEvent::Observation(observation) => info!(
                endpoint = %observation.endpoint,
                status = %observation.status,
                response_time = %observation.response_time_label(),
                "{}",
                observation
            ),
            MonitorEvent::Alert(transition) => warn!(
                endpoint = %transition.endpoint,
                from = %transition.from,
                to = %transition.to,
                status_code = ?transition.status_code,
                "{}",
                transition
            ),
        }

        // Ignore errors if there are no receivers
        let _ = self.events.send(event);
    }
}
