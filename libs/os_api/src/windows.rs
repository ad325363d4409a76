use std::sync::{Mutex, PoisonError};

use windows::Win32::Media::{timeBeginPeriod, timeEndPeriod};
use windows::Win32::System::Threading::{
    ABOVE_NORMAL_PRIORITY_CLASS, BELOW_NORMAL_PRIORITY_CLASS, GetCurrentProcess,
    GetCurrentThread, HIGH_PRIORITY_CLASS, IDLE_PRIORITY_CLASS,
    NORMAL_PRIORITY_CLASS, PROCESS_CREATION_FLAGS, REALTIME_PRIORITY_CLASS, SetPriorityClass,
    SetThreadPriority, THREAD_PRIORITY_LOWEST,
};

use crate::{OsError, PriorityClass};

/// Period passed to the outstanding `timeBeginPeriod` call; 0 when none is active.
static CURRENT_TIMER_PERIOD: Mutex<u32> = Mutex::new(0);

pub struct OS;

impl OS {
    // helper: map our PriorityClass to WinAPI constant
    fn transform_to_win_priority(p: PriorityClass) -> PROCESS_CREATION_FLAGS {
        match p {
            PriorityClass::Idle => IDLE_PRIORITY_CLASS,
            PriorityClass::BelowNormal => BELOW_NORMAL_PRIORITY_CLASS,
            PriorityClass::Normal => NORMAL_PRIORITY_CLASS,
            PriorityClass::AboveNormal => ABOVE_NORMAL_PRIORITY_CLASS,
            PriorityClass::High => HIGH_PRIORITY_CLASS,
            PriorityClass::Realtime => REALTIME_PRIORITY_CLASS,
        }
    }

    /// Sets the priority class for the current process.
    pub fn set_current_process_priority(priority: PriorityClass) -> Result<(), OsError> {
        unsafe {
            SetPriorityClass(GetCurrentProcess(), Self::transform_to_win_priority(priority))
                .map_err(|e| OsError::call("SetPriorityClass", e))
        }
    }

    /// Drops the calling thread to `THREAD_PRIORITY_LOWEST`.
    pub fn lower_current_thread_priority() -> Result<(), OsError> {
        unsafe {
            SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_LOWEST)
                .map_err(|e| OsError::call("SetThreadPriority", e))
        }
    }

    /// Raises the system timer resolution to `period_ms` via `timeBeginPeriod`.
    ///
    /// A previous request is released first, so at most one is outstanding.
    pub fn set_timer_precision(period_ms: u32) -> Result<(), OsError> {
        let mut current = CURRENT_TIMER_PERIOD
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *current != 0 {
            unsafe { timeEndPeriod(*current) };
            *current = 0;
        }

        let result = unsafe { timeBeginPeriod(period_ms) };
        if result != 0 {
            return Err(OsError::call(
                "timeBeginPeriod",
                format!("MMRESULT {result}"),
            ));
        }
        *current = period_ms;
        Ok(())
    }

    /// Releases the outstanding `timeBeginPeriod` request. No-op when none is active.
    pub fn reset_timer_precision() -> Result<(), OsError> {
        let mut current = CURRENT_TIMER_PERIOD
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *current == 0 {
            return Ok(());
        }

        let period = std::mem::take(&mut *current);
        let result = unsafe { timeEndPeriod(period) };
        if result != 0 {
            return Err(OsError::call("timeEndPeriod", format!("MMRESULT {result}")));
        }
        Ok(())
    }
}
