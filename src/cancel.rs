//! Cooperative cancellation shared by the scheduler and its workers.
//!
//! The signal is a zero-capacity channel that never carries a message: cancelling
//! drops the only sender, which disconnects every receiver at once. That makes both
//! polling (`is_cancelled`) and timed waits (`wait`) observe it immediately.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

/// Owning side of the signal, held by the scheduler for the lifetime of one run.
pub struct CancelSource {
    sender: Option<Sender<()>>,
    receiver: Receiver<()>,
}

/// Worker side of the signal. Cheap to clone.
#[derive(Clone)]
pub struct CancelToken {
    receiver: Receiver<()>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(0);
        Self {
            sender: Some(sender),
            receiver,
        }
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            receiver: self.receiver.clone(),
        }
    }

    /// Broadcasts cancellation to every token. Idempotent.
    pub fn cancel(&mut self) {
        self.sender.take();
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Blocks for up to `timeout`, returning early once cancelled.
    ///
    /// Returns `true` if cancellation was observed, `false` if the full timeout elapsed.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) | Ok(()) => true,
        }
    }
}
