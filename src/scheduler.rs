//! Fleet of per-core duty-cycle workers.
//!
//! The scheduler owns one worker thread per logical core between `start` and `stop`,
//! and pushes live setting changes into them without restarting anything.
//!
//! Calls into a single scheduler must be serialized by the caller; the scheduler only
//! synchronizes with its own workers. On Linux the timer precision request is bound to
//! the thread that called `start`, so `stop` (or the drop) belongs on that thread too;
//! from another thread the release fails and is logged.

use crate::cancel::{CancelSource, CancelToken};
use crate::platform::{HostPlatform, PlatformControl};
use crate::worker::{DutyCycleWorker, DutySettings, WorkerConfig, WorkerSnapshot, PERIOD_MS};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lowest accepted aggregate target, in percent.
pub const MIN_TARGET_PERCENT: f64 = 1.0;

/// Highest accepted aggregate target, in percent.
pub const MAX_TARGET_PERCENT: f64 = 10.0;

/// Target used until the first `start` or `update_settings`.
pub const DEFAULT_TARGET_PERCENT: f64 = 3.0;

/// How long `stop` waits for each worker thread to exit.
pub const STOP_GRACE: Duration = Duration::from_millis(200);

/// Timer granularity requested while running, in milliseconds.
const TIMER_PRECISION_MS: u32 = 1;

/// Clamps an aggregate target into `[MIN_TARGET_PERCENT, MAX_TARGET_PERCENT]`.
///
/// NaN maps to the minimum so no input is ever rejected.
pub fn clamp_target_percent(target_total_percent: f64) -> f64 {
    if target_total_percent.is_nan() {
        return MIN_TARGET_PERCENT;
    }
    target_total_percent.clamp(MIN_TARGET_PERCENT, MAX_TARGET_PERCENT)
}

/// Per-core duty cycle for an aggregate target.
///
/// Every core runs the same fraction: N cores at X% each average to X% overall.
pub fn per_core_duty_cycle(target_total_percent: f64) -> f64 {
    target_total_percent / 100.0
}

/// Delay before worker `core_index` of `core_count` starts its first cycle.
///
/// Spreads first busy phases evenly over one period; worker 0 starts immediately.
pub fn stagger_offset(core_index: usize, core_count: usize) -> Duration {
    let core_count = core_count.max(1) as u64;
    Duration::from_millis(core_index as u64 * PERIOD_MS / core_count)
}

/// Outcome of a `stop` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StopSummary {
    /// Workers that exited within the grace period.
    pub joined: usize,
    /// Workers that exited by panicking.
    pub panicked: usize,
    /// Workers still running when the grace period ran out; they are detached.
    pub timed_out: usize,
}

/// One live worker thread plus the state it shares with the scheduler.
struct WorkerHandle {
    config: Arc<WorkerConfig>,
    thread: JoinHandle<()>,
    /// Disconnects when the worker thread finishes, panics included.
    exited: Receiver<()>,
}

enum JoinOutcome {
    Joined,
    Panicked,
    TimedOut,
}

impl WorkerHandle {
    fn join_within(self, grace: Duration) -> JoinOutcome {
        match self.exited.recv_timeout(grace) {
            Err(RecvTimeoutError::Timeout) => JoinOutcome::TimedOut,
            _ => match self.thread.join() {
                Ok(()) => JoinOutcome::Joined,
                Err(_) => JoinOutcome::Panicked,
            },
        }
    }
}

/// Load scheduler: Stopped until `start`, Running until `stop`.
pub struct LoadScheduler<P: PlatformControl = HostPlatform> {
    platform: Arc<P>,
    core_count: usize,
    target_total_percent: f64,
    eco_mode: bool,
    running: bool,
    cancel: Option<CancelSource>,
    workers: Vec<WorkerHandle>,
}

impl LoadScheduler<HostPlatform> {
    /// Creates a scheduler for every logical core of the host.
    pub fn new() -> Self {
        Self::with_platform(HostPlatform, num_cpus::get())
    }
}

impl Default for LoadScheduler<HostPlatform> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PlatformControl> LoadScheduler<P> {
    /// Creates a scheduler driving `core_count` workers through `platform`.
    ///
    /// A `core_count` of zero is treated as one.
    pub fn with_platform(platform: P, core_count: usize) -> Self {
        Self {
            platform: Arc::new(platform),
            core_count: core_count.max(1),
            target_total_percent: DEFAULT_TARGET_PERCENT,
            eco_mode: false,
            running: false,
            cancel: None,
            workers: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn core_count(&self) -> usize {
        self.core_count
    }

    pub fn target_total_percent(&self) -> f64 {
        self.target_total_percent
    }

    pub fn eco_mode(&self) -> bool {
        self.eco_mode
    }

    /// Copies of every live worker's shared state, in core order. Empty when stopped.
    pub fn worker_snapshots(&self) -> Vec<WorkerSnapshot> {
        self.workers.iter().map(|w| w.config.snapshot()).collect()
    }

    fn duty_settings(&self) -> DutySettings {
        DutySettings {
            duty_cycle: per_core_duty_cycle(self.target_total_percent),
            eco_mode: self.eco_mode,
        }
    }

    /// Starts one worker per core. A running scheduler is stopped first.
    ///
    /// Steps:
    /// 1. Stop any previous run
    /// 2. Request timer precision and lower process priority (best-effort)
    /// 3. Spawn staggered worker threads
    pub fn start(&mut self, target_total_percent: f64, eco_mode: bool) {
        if self.running {
            self.stop();
        }

        if let Err(e) = self.platform.set_timer_precision(TIMER_PRECISION_MS) {
            warn!(error = %e, "timer precision request failed, continuing with default resolution");
        }
        if let Err(e) = self.platform.lower_process_priority() {
            warn!(error = %e, "could not lower process priority, continuing at current priority");
        }

        self.target_total_percent = clamp_target_percent(target_total_percent);
        self.eco_mode = eco_mode;

        let source = CancelSource::new();
        let settings = self.duty_settings();
        self.workers.clear();

        for core_index in 0..self.core_count {
            let config = Arc::new(WorkerConfig::new(
                core_index,
                stagger_offset(core_index, self.core_count),
                settings,
            ));
            if let Some(handle) = self.spawn_worker(config, source.token()) {
                self.workers.push(handle);
            }
        }

        self.cancel = Some(source);
        self.running = true;

        info!(
            target_percent = self.target_total_percent,
            eco_mode = self.eco_mode,
            duty_cycle = settings.duty_cycle,
            workers = self.workers.len(),
            cores = self.core_count,
            "load generation started"
        );
    }

    fn spawn_worker(
        &self,
        config: Arc<WorkerConfig>,
        cancel: CancelToken,
    ) -> Option<WorkerHandle> {
        let core_index = config.core_index();
        let (exited_tx, exited_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(0);
        let platform = Arc::clone(&self.platform);
        let shared = Arc::clone(&config);

        let spawned = thread::Builder::new()
            .name(format!("cpu-worker-{core_index}"))
            .spawn(move || {
                // Dropped on return or unwind, which is what `stop` waits for.
                let _exited = exited_tx;

                if let Err(e) = platform.prepare_worker_thread() {
                    debug!(core = core_index, error = %e, "worker thread priority unchanged");
                }
                if cancel.wait(shared.stagger()) {
                    return;
                }
                DutyCycleWorker::new(shared).run(&cancel);
            });

        match spawned {
            Ok(thread) => Some(WorkerHandle {
                config,
                thread,
                exited: exited_rx,
            }),
            Err(e) => {
                warn!(core = core_index, error = %e, "failed to spawn worker thread");
                None
            }
        }
    }

    /// Cancels every worker and waits up to [`STOP_GRACE`] for each to exit.
    ///
    /// Workers that overrun the grace period are detached, never killed. The timer
    /// precision request is always released. No-op when not running.
    pub fn stop(&mut self) -> StopSummary {
        let mut summary = StopSummary::default();
        if !self.running {
            return summary;
        }

        if let Some(mut source) = self.cancel.take() {
            source.cancel();
        }

        for handle in self.workers.drain(..) {
            let core_index = handle.config.core_index();
            let cycles = handle.config.cycles_completed();
            match handle.join_within(STOP_GRACE) {
                JoinOutcome::Joined => {
                    debug!(core = core_index, cycles, "worker exited");
                    summary.joined += 1;
                }
                JoinOutcome::Panicked => {
                    warn!(core = core_index, cycles, "worker thread panicked");
                    summary.panicked += 1;
                }
                JoinOutcome::TimedOut => {
                    warn!(
                        core = core_index,
                        grace_ms = STOP_GRACE.as_millis() as u64,
                        "worker did not exit in time, detaching"
                    );
                    summary.timed_out += 1;
                }
            }
        }

        if let Err(e) = self.platform.reset_timer_precision() {
            warn!(error = %e, "failed to release timer precision request");
        }
        self.running = false;

        info!(
            joined = summary.joined,
            panicked = summary.panicked,
            timed_out = summary.timed_out,
            "load generation stopped"
        );
        summary
    }

    /// Stores a new aggregate target and eco flag, and pushes them into live workers.
    ///
    /// Workers are not restarted or re-staggered; each picks the change up at the top of
    /// its next cycle. While stopped, the values are kept for the next `start`.
    pub fn update_settings(&mut self, target_total_percent: f64, eco_mode: bool) {
        self.target_total_percent = clamp_target_percent(target_total_percent);
        self.eco_mode = eco_mode;

        if !self.running {
            debug!(
                target_percent = self.target_total_percent,
                eco_mode = self.eco_mode,
                "settings stored for next start"
            );
            return;
        }

        let settings = self.duty_settings();
        for worker in &self.workers {
            worker.config.set_settings(settings);
        }

        info!(
            target_percent = self.target_total_percent,
            eco_mode = self.eco_mode,
            duty_cycle = settings.duty_cycle,
            "dynamic target update"
        );
    }
}

impl<P: PlatformControl> Drop for LoadScheduler<P> {
    fn drop(&mut self) {
        self.stop();
    }
}
