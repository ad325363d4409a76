use std::io;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};

use libc::{PR_GET_TIMERSLACK, PR_SET_TIMERSLACK, PRIO_PROCESS, c_ulong, prctl, setpriority};

use crate::{OsError, PriorityClass};

/// Timer slack requested while a precision request is active.
const PRECISE_TIMER_SLACK_NS: c_ulong = 1_000;

/// Slack that was in effect before the outstanding precision request.
///
/// Timer slack belongs to a thread, so the record remembers which one asked.
struct SavedSlack {
    owner: ThreadId,
    slack: c_ulong,
}

static SAVED_TIMER_SLACK: Mutex<Option<SavedSlack>> = Mutex::new(None);

pub struct OS;

impl OS {
    // ---- helpers ----

    fn current_tid() -> libc::id_t {
        unsafe { libc::syscall(libc::SYS_gettid) as libc::id_t }
    }

    fn set_nice(who: libc::id_t, nice: i32, call: &'static str) -> Result<(), OsError> {
        let ret = unsafe { setpriority(PRIO_PROCESS, who, nice) };
        if ret == 0 {
            Ok(())
        } else {
            Err(OsError::call(call, io::Error::last_os_error()))
        }
    }

    fn set_timer_slack(slack_ns: c_ulong) -> Result<(), OsError> {
        let ret = unsafe { prctl(PR_SET_TIMERSLACK, slack_ns, 0 as c_ulong, 0 as c_ulong, 0 as c_ulong) };
        if ret == 0 {
            Ok(())
        } else {
            Err(OsError::call(
                "prctl(PR_SET_TIMERSLACK)",
                io::Error::last_os_error(),
            ))
        }
    }

    fn timer_slack() -> Result<c_ulong, OsError> {
        let slack = unsafe { prctl(PR_GET_TIMERSLACK, 0 as c_ulong, 0 as c_ulong, 0 as c_ulong, 0 as c_ulong) };
        if slack < 0 {
            return Err(OsError::call(
                "prctl(PR_GET_TIMERSLACK)",
                io::Error::last_os_error(),
            ));
        }
        Ok(slack as c_ulong)
    }

    /// Sets the priority class of the calling process.
    ///
    /// Linux keeps nice values per thread: this applies to the calling thread and to
    /// every thread it spawns afterwards. Realtime is not granted here.
    pub fn set_current_process_priority(priority: PriorityClass) -> Result<(), OsError> {
        if priority == PriorityClass::Realtime {
            return Err(OsError::Unsupported("realtime process priority"));
        }
        Self::set_nice(0, priority.to_nice(), "setpriority")
    }

    /// Drops the calling thread to the lowest scheduling priority (nice 19).
    pub fn lower_current_thread_priority() -> Result<(), OsError> {
        Self::set_nice(
            Self::current_tid(),
            PriorityClass::Idle.to_nice(),
            "setpriority(thread)",
        )
    }

    /// Requests fine-grained timer wake-ups for the calling thread and threads it spawns later.
    ///
    /// The period is not used on Linux: the kernel timer slack is tightened instead.
    /// A previous request made on this thread is released first. One made on another
    /// thread is forgotten, since its slack can only be restored from that thread.
    pub fn set_timer_precision(_period_ms: u32) -> Result<(), OsError> {
        let mut saved = SAVED_TIMER_SLACK.lock().unwrap_or_else(PoisonError::into_inner);
        let me = thread::current().id();
        if let Some(previous) = saved.take() {
            if previous.owner == me {
                Self::set_timer_slack(previous.slack)?;
            }
        }

        let current = Self::timer_slack()?;

        Self::set_timer_slack(PRECISE_TIMER_SLACK_NS)?;
        *saved = Some(SavedSlack {
            owner: me,
            slack: current,
        });
        Ok(())
    }

    /// Releases the outstanding precision request. No-op when none is active.
    ///
    /// Must run on the thread that made the request. From any other thread the
    /// request stays outstanding and `OsError::ForeignThread` is returned.
    pub fn reset_timer_precision() -> Result<(), OsError> {
        let mut saved = SAVED_TIMER_SLACK.lock().unwrap_or_else(PoisonError::into_inner);
        match saved.take() {
            Some(previous) if previous.owner != thread::current().id() => {
                *saved = Some(previous);
                Err(OsError::ForeignThread("timer precision"))
            }
            Some(previous) => Self::set_timer_slack(previous.slack),
            None => Ok(()),
        }
    }
}
