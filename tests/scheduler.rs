use cpu_idle_stabilizer::{
    LoadScheduler, OsError, PlatformControl, StopSummary, WorkerSnapshot, MAX_TARGET_PERCENT,
    MIN_TARGET_PERCENT, PERIOD, STOP_GRACE,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    SetPrecision(u32),
    ResetPrecision,
    LowerPriority,
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Call>>,
    prepared_threads: AtomicUsize,
}

impl Recorder {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// Records every platform request; optionally fails all of them.
#[derive(Clone, Default)]
struct RecordingPlatform {
    recorder: Arc<Recorder>,
    fail: bool,
}

impl RecordingPlatform {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn outcome(&self) -> Result<(), OsError> {
        if self.fail {
            Err(OsError::Unsupported("test platform"))
        } else {
            Ok(())
        }
    }
}

impl PlatformControl for RecordingPlatform {
    fn set_timer_precision(&self, period_ms: u32) -> Result<(), OsError> {
        self.recorder.push(Call::SetPrecision(period_ms));
        self.outcome()
    }

    fn reset_timer_precision(&self) -> Result<(), OsError> {
        self.recorder.push(Call::ResetPrecision);
        self.outcome()
    }

    fn lower_process_priority(&self) -> Result<(), OsError> {
        self.recorder.push(Call::LowerPriority);
        self.outcome()
    }

    fn prepare_worker_thread(&self) -> Result<(), OsError> {
        self.recorder.prepared_threads.fetch_add(1, Ordering::SeqCst);
        self.outcome()
    }
}

fn scheduler(core_count: usize) -> (LoadScheduler<RecordingPlatform>, Arc<Recorder>) {
    let platform = RecordingPlatform::default();
    let recorder = Arc::clone(&platform.recorder);
    (LoadScheduler::with_platform(platform, core_count), recorder)
}

#[test]
fn starts_one_worker_per_core_with_uniform_duty_cycle() {
    let (mut scheduler, recorder) = scheduler(4);
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.core_count(), 4);

    scheduler.start(3.0, false);
    assert!(scheduler.is_running());
    assert_eq!(scheduler.target_total_percent(), 3.0);
    assert!(!scheduler.eco_mode());

    let workers = scheduler.worker_snapshots();
    assert_eq!(workers.len(), 4);
    for (i, worker) in workers.iter().enumerate() {
        assert_eq!(worker.core_index, i);
        assert_eq!(worker.duty_cycle, 0.03);
        assert!(!worker.eco_mode);
    }
    let staggers: Vec<u128> = workers.iter().map(|w| w.stagger.as_millis()).collect();
    assert_eq!(staggers, vec![0, 250, 500, 750]);

    assert_eq!(
        recorder.calls(),
        vec![Call::SetPrecision(1), Call::LowerPriority]
    );

    let summary = scheduler.stop();
    assert_eq!(
        summary,
        StopSummary {
            joined: 4,
            panicked: 0,
            timed_out: 0
        }
    );
    assert!(!scheduler.is_running());
    assert!(scheduler.worker_snapshots().is_empty());
    assert_eq!(recorder.calls().last(), Some(&Call::ResetPrecision));
}

#[test]
fn targets_are_clamped_on_start_and_update() {
    let (mut scheduler, _) = scheduler(2);

    scheduler.start(0.2, false);
    assert_eq!(scheduler.target_total_percent(), MIN_TARGET_PERCENT);
    assert!(scheduler
        .worker_snapshots()
        .iter()
        .all(|w| w.duty_cycle == 0.01));

    scheduler.update_settings(15.0, false);
    assert_eq!(scheduler.target_total_percent(), MAX_TARGET_PERCENT);
    assert!(scheduler
        .worker_snapshots()
        .iter()
        .all(|w| w.duty_cycle == 0.1));

    scheduler.stop();
}

#[test]
fn stop_when_not_running_is_a_no_op() {
    let (mut scheduler, recorder) = scheduler(3);

    assert_eq!(scheduler.stop(), StopSummary::default());
    assert_eq!(scheduler.stop(), StopSummary::default());
    assert!(!scheduler.is_running());
    assert!(recorder.calls().is_empty());
}

#[test]
fn starting_twice_replaces_workers() {
    let (mut scheduler, recorder) = scheduler(3);

    scheduler.start(2.0, false);
    scheduler.start(4.0, true);

    let workers = scheduler.worker_snapshots();
    assert_eq!(workers.len(), 3);
    assert!(workers.iter().all(|w| w.duty_cycle == 0.04 && w.eco_mode));
    assert_eq!(
        recorder.calls(),
        vec![
            Call::SetPrecision(1),
            Call::LowerPriority,
            Call::ResetPrecision,
            Call::SetPrecision(1),
            Call::LowerPriority,
        ]
    );

    assert_eq!(scheduler.stop().joined, 3);
}

#[test]
fn update_while_stopped_is_stored_for_later() {
    let (mut scheduler, recorder) = scheduler(2);

    scheduler.update_settings(6.0, true);
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.target_total_percent(), 6.0);
    assert!(scheduler.eco_mode());
    assert!(scheduler.worker_snapshots().is_empty());
    assert!(recorder.calls().is_empty());
}

/// Polls the live workers until `done` holds for every one of them, giving up after `limit`.
fn wait_for_workers(
    scheduler: &LoadScheduler<RecordingPlatform>,
    limit: Duration,
    done: impl Fn(&WorkerSnapshot) -> bool,
) -> bool {
    let give_up = Instant::now() + limit;
    loop {
        if scheduler.worker_snapshots().iter().all(&done) {
            return true;
        }
        if Instant::now() >= give_up {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn live_update_reaches_every_worker_without_restart() {
    let (mut scheduler, _) = scheduler(4);
    scheduler.start(3.0, false);
    let before = scheduler.worker_snapshots();

    // Every worker is past its stagger and running cycles at the start target.
    assert!(wait_for_workers(&scheduler, PERIOD * 3, |w| {
        w.last_duty_cycle == Some(0.03)
    }));

    scheduler.update_settings(5.0, false);
    let updated_at = Instant::now();
    let after = scheduler.worker_snapshots();
    assert_eq!(after.len(), 4);
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(new.core_index, old.core_index);
        assert_eq!(new.stagger, old.stagger);
        assert_eq!(new.duty_cycle, 0.05);
    }

    // The running loops apply the new target from their next cycle on.
    assert!(wait_for_workers(&scheduler, PERIOD * 3, |w| {
        w.last_duty_cycle == Some(0.05)
    }));
    let elapsed = updated_at.elapsed();
    assert!(elapsed <= PERIOD + PERIOD / 2, "update took {elapsed:?}");

    // Turning eco mode on live makes the applied value jitter around the target.
    scheduler.update_settings(5.0, true);
    assert!(wait_for_workers(&scheduler, PERIOD * 3, |w| {
        w.last_duty_cycle.is_some_and(|d| d != 0.05)
    }));
    for worker in scheduler.worker_snapshots() {
        let applied = worker.last_duty_cycle.unwrap();
        assert!((applied - 0.05).abs() <= 0.025 + 1e-12, "{applied}");
        assert!(worker.cycles_completed >= 1);
    }

    assert_eq!(scheduler.stop().joined, 4);
}

#[test]
fn stop_interrupts_busy_and_sleeping_workers() {
    let (mut scheduler, recorder) = scheduler(4);
    scheduler.start(10.0, true);
    thread::sleep(Duration::from_millis(60));

    let started = Instant::now();
    let summary = scheduler.stop();
    let elapsed = started.elapsed();

    assert_eq!(summary.joined, 4);
    assert_eq!(summary.timed_out, 0);
    assert!(elapsed < STOP_GRACE * 4, "stop took {elapsed:?}");
    assert!(!scheduler.is_running());
    assert_eq!(recorder.prepared_threads.load(Ordering::SeqCst), 4);
}

#[test]
fn platform_failures_do_not_prevent_running() {
    let mut scheduler = LoadScheduler::with_platform(RecordingPlatform::failing(), 2);

    scheduler.start(3.0, false);
    assert!(scheduler.is_running());
    assert_eq!(scheduler.worker_snapshots().len(), 2);

    let summary = scheduler.stop();
    assert_eq!(summary.joined, 2);
    assert!(!scheduler.is_running());
}

#[test]
fn zero_cores_is_treated_as_one() {
    let (mut scheduler, _) = scheduler(0);
    assert_eq!(scheduler.core_count(), 1);
    scheduler.start(1.0, false);
    assert_eq!(scheduler.worker_snapshots().len(), 1);
    scheduler.stop();
}

#[test]
fn restart_after_stop_uses_fresh_workers() {
    let (mut scheduler, _) = scheduler(2);

    scheduler.start(3.0, false);
    scheduler.stop();
    scheduler.start(7.0, false);

    let workers = scheduler.worker_snapshots();
    assert_eq!(workers.len(), 2);
    assert!(workers.iter().all(|w| w.duty_cycle == 0.07 && w.cycles_completed == 0));
    scheduler.stop();
}

#[test]
fn dropping_a_running_scheduler_releases_timer_precision() {
    let (mut scheduler, recorder) = scheduler(2);
    scheduler.start(3.0, false);
    drop(scheduler);
    assert_eq!(recorder.calls().last(), Some(&Call::ResetPrecision));
}

#[test]
fn host_platform_start_and_stop() {
    let mut scheduler = LoadScheduler::new();
    assert!(scheduler.core_count() >= 1);

    scheduler.start(1.0, true);
    assert_eq!(scheduler.worker_snapshots().len(), scheduler.core_count());
    thread::sleep(Duration::from_millis(50));

    let summary = scheduler.stop();
    assert_eq!(summary.joined + summary.timed_out, scheduler.core_count());
    assert_eq!(summary.panicked, 0);
    assert!(!scheduler.is_running());
}
