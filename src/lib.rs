//! Steady low-level CPU load across every logical core.
//!
//! [`LoadScheduler`] runs one [`DutyCycleWorker`] thread per core. Each worker alternates a
//! busy spin and an interruptible sleep inside a fixed 1 s period, so the machine never
//! sits fully idle. Settings can change while running and take effect within one period.
//!
//! ```no_run
//! use cpu_idle_stabilizer::LoadScheduler;
//!
//! let mut scheduler = LoadScheduler::new();
//! scheduler.start(3.0, false);
//! scheduler.update_settings(5.0, true);
//! scheduler.stop();
//! ```

pub mod cancel;
pub mod cli;
pub mod platform;
pub mod scheduler;
pub mod settings;
pub mod worker;

pub use cancel::{CancelSource, CancelToken};
pub use platform::{HostPlatform, PlatformControl};
pub use scheduler::{
    clamp_target_percent, per_core_duty_cycle, stagger_offset, LoadScheduler, StopSummary,
    MAX_TARGET_PERCENT, MIN_TARGET_PERCENT, STOP_GRACE,
};
pub use settings::{SettingsError, UserSettings};
pub use worker::{DutyCycleWorker, DutySettings, WorkerConfig, WorkerSnapshot, PERIOD, PERIOD_MS};

pub use os_api::OsError;
