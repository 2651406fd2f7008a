use thiserror::Error;

/// Why a single delivery attempt failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    #[error("endpoint answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("attempt timed out")]
    Timeout,
}

impl AttemptFailure {
    /// Short label used to tag metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AttemptFailure::Status { .. } => "status",
            AttemptFailure::Transport(_) => "transport",
            AttemptFailure::Timeout => "timeout",
        }
    }
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("delivery failed after {attempts} attempts: {last}")]
    DeliveryFailed { attempts: u32, last: AttemptFailure },

    #[error("delivery cancelled")]
    Cancelled,

    #[error("could not build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
