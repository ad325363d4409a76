//! Host OS hooks used by the scheduler.
//!
//! Every hook is best-effort: the scheduler logs failures and keeps going.

use os_api::{OsError, PriorityClass, OS};

/// OS requests made around a scheduler run.
pub trait PlatformControl: Send + Sync + 'static {
    /// Requests wake-up granularity of `period_ms`, replacing any earlier request.
    fn set_timer_precision(&self, period_ms: u32) -> Result<(), OsError>;

    /// Releases the outstanding precision request, if any.
    fn reset_timer_precision(&self) -> Result<(), OsError>;

    /// Lowers the scheduling priority of the whole process.
    fn lower_process_priority(&self) -> Result<(), OsError>;

    /// Called on each worker thread before its first cycle.
    fn prepare_worker_thread(&self) -> Result<(), OsError>;
}

/// [`PlatformControl`] backed by the real host through `os_api`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostPlatform;

impl PlatformControl for HostPlatform {
    fn set_timer_precision(&self, period_ms: u32) -> Result<(), OsError> {
        OS::set_timer_precision(period_ms)
    }

    fn reset_timer_precision(&self) -> Result<(), OsError> {
        OS::reset_timer_precision()
    }

    fn lower_process_priority(&self) -> Result<(), OsError> {
        OS::set_current_process_priority(PriorityClass::BelowNormal)
    }

    fn prepare_worker_thread(&self) -> Result<(), OsError> {
        OS::lower_current_thread_priority()
    }
}
