use thiserror::Error;

/// Failure of a host OS request.
#[derive(Debug, Error)]
pub enum OsError {
    /// The OS call itself reported an error.
    #[error("{call} failed: {message}")]
    Call {
        call: &'static str,
        message: String,
    },
    /// The request is not available on this platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    /// A per-thread request was released from a thread that did not make it.
    #[error("{0} must be released on the thread that requested it")]
    ForeignThread(&'static str),
}

impl OsError {
    pub(crate) fn call(call: &'static str, message: impl ToString) -> Self {
        Self::Call {
            call,
            message: message.to_string(),
        }
    }
}
