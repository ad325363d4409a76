//! Hosts without a dedicated implementation: every request is a successful no-op.

use crate::{OsError, PriorityClass};

pub struct OS;

impl OS {
    pub fn set_current_process_priority(_priority: PriorityClass) -> Result<(), OsError> {
        Ok(())
    }

    pub fn lower_current_thread_priority() -> Result<(), OsError> {
        Ok(())
    }

    pub fn set_timer_precision(_period_ms: u32) -> Result<(), OsError> {
        Ok(())
    }

    pub fn reset_timer_precision() -> Result<(), OsError> {
        Ok(())
    }
}
