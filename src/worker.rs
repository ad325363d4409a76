//! Per-core duty-cycle loop.
//!
//! Each cycle is one busy phase followed by one sleep (or yield) phase. Cycle
//! boundaries are anchored to an absolute deadline that advances by exactly one
//! period, so a late cycle does not shift the long-run frequency.

use crate::cancel::CancelToken;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Length of one busy + sleep cycle in milliseconds, shared by every worker.
pub const PERIOD_MS: u64 = 1000;

/// Length of one busy + sleep cycle.
pub const PERIOD: Duration = Duration::from_millis(PERIOD_MS);

/// Maximum eco-mode offset applied to the duty cycle, in absolute fractions of the period.
pub const ECO_JITTER: f64 = 0.025;

/// Remaining times at or below this are yielded instead of slept.
pub const MIN_SLEEP: Duration = Duration::from_millis(1);

/// Lateness, in periods, after which the deadline is re-anchored to now.
pub const MAX_DRIFT_PERIODS: u32 = 2;

/// The live-updatable part of a worker's configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutySettings {
    /// Fraction of each period spent busy, in `[0, 1]`.
    pub duty_cycle: f64,
    /// Apply per-cycle jitter.
    pub eco_mode: bool,
}

/// State shared between the scheduler and one worker loop.
///
/// The settings lock is only held for a copy in or out, never across a phase.
#[derive(Debug)]
pub struct WorkerConfig {
    core_index: usize,
    stagger: Duration,
    settings: Mutex<DutySettings>,
    cycles_completed: AtomicU64,
    /// Bits of the duty cycle the loop chose for its current cycle; NaN before the first.
    last_duty_cycle: AtomicU64,
}

/// Point-in-time copy of a worker's shared state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerSnapshot {
    pub core_index: usize,
    pub stagger: Duration,
    pub duty_cycle: f64,
    pub eco_mode: bool,
    pub cycles_completed: u64,
    /// Duty cycle the loop actually applied to its latest cycle, jitter included.
    pub last_duty_cycle: Option<f64>,
}

impl WorkerConfig {
    pub fn new(core_index: usize, stagger: Duration, settings: DutySettings) -> Self {
        Self {
            core_index,
            stagger,
            settings: Mutex::new(settings),
            cycles_completed: AtomicU64::new(0),
            last_duty_cycle: AtomicU64::new(f64::NAN.to_bits()),
        }
    }

    pub fn core_index(&self) -> usize {
        self.core_index
    }

    /// Delay before this worker's first cycle.
    pub fn stagger(&self) -> Duration {
        self.stagger
    }

    pub fn settings(&self) -> DutySettings {
        *self.settings.lock()
    }

    /// Replaces the live settings; the loop picks them up at the top of its next cycle.
    pub fn set_settings(&self, settings: DutySettings) {
        *self.settings.lock() = settings;
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    /// Effective duty cycle of the latest cycle, or `None` before the loop has run one.
    pub fn last_duty_cycle(&self) -> Option<f64> {
        let duty = f64::from_bits(self.last_duty_cycle.load(Ordering::Relaxed));
        (!duty.is_nan()).then_some(duty)
    }

    fn record_duty_cycle(&self, duty: f64) {
        self.last_duty_cycle.store(duty.to_bits(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        let settings = self.settings();
        WorkerSnapshot {
            core_index: self.core_index,
            stagger: self.stagger,
            duty_cycle: settings.duty_cycle,
            eco_mode: settings.eco_mode,
            cycles_completed: self.cycles_completed(),
            last_duty_cycle: self.last_duty_cycle(),
        }
    }
}

/// Busy time for one cycle of `period` at `duty_cycle`.
pub fn busy_duration(duty_cycle: f64, period: Duration) -> Duration {
    if !duty_cycle.is_finite() || duty_cycle <= 0.0 {
        return Duration::ZERO;
    }
    period.mul_f64(duty_cycle.min(1.0))
}

/// Duty cycle to use for one cycle, with eco-mode jitter applied if enabled.
///
/// The result is always within `[0, 1]`.
pub fn effective_duty_cycle<R: Rng + ?Sized>(settings: DutySettings, rng: &mut R) -> f64 {
    let duty = if settings.eco_mode {
        settings.duty_cycle + rng.gen_range(-ECO_JITTER..=ECO_JITTER)
    } else {
        settings.duty_cycle
    };
    duty.clamp(0.0, 1.0)
}

/// Deadline for the cycle after the one that ended at `deadline`, observed at `now`.
///
/// Normally `deadline + period`. If `now` is already `MAX_DRIFT_PERIODS` periods or more
/// past that, the schedule re-anchors to `now + period` instead of replaying missed cycles.
pub fn next_deadline(deadline: Instant, now: Instant, period: Duration) -> Instant {
    let next = deadline + period;
    let lateness = now.saturating_duration_since(next);
    if lateness >= period * MAX_DRIFT_PERIODS {
        now + period
    } else {
        next
    }
}

/// Duty-cycle loop bound to one [`WorkerConfig`].
pub struct DutyCycleWorker {
    config: Arc<WorkerConfig>,
    period: Duration,
    rng: StdRng,
}

impl DutyCycleWorker {
    pub fn new(config: Arc<WorkerConfig>) -> Self {
        Self {
            config,
            period: PERIOD,
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    fn with_period(config: Arc<WorkerConfig>, period: Duration) -> Self {
        Self {
            config,
            period,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    /// Runs cycles until `cancel` fires.
    ///
    /// Cancellation is checked at the top of each cycle, on every busy-phase iteration,
    /// and by the sleep itself. Shared state is left for the scheduler to clean up.
    pub fn run(&mut self, cancel: &CancelToken) {
        let mut deadline = Instant::now() + self.period;

        while !cancel.is_cancelled() {
            let phase_start = Instant::now();
            let duty = effective_duty_cycle(self.config.settings(), &mut self.rng);
            self.config.record_duty_cycle(duty);
            let busy = busy_duration(duty, self.period);

            // 1. Busy phase: never yields.
            while phase_start.elapsed() < busy {
                if cancel.is_cancelled() {
                    return;
                }
                self.pulse();
            }

            // 2. Sleep phase: wait out whatever is left of this cycle.
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining > MIN_SLEEP {
                if cancel.wait(remaining) {
                    return;
                }
            } else {
                thread::yield_now();
            }

            self.config.cycles_completed.fetch_add(1, Ordering::Relaxed);
            deadline = next_deadline(deadline, Instant::now(), self.period);
        }
    }

    /// A short burst of floating-point work the optimizer cannot drop.
    #[inline]
    fn pulse(&mut self) {
        for _ in 0..10 {
            let a: f64 = self.rng.gen();
            black_box((a * a + 1.0).sqrt());
        }
    }
}
