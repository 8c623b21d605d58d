//! Error status: how a caller should react to an error

use std::fmt;

/// Whether an error is worth retrying.
///
/// - `Permanent`: retrying will not help (bad prompt, missing model, missing usage data)
/// - `Temporary`: the same call may succeed later (rate limits, network hiccups)
/// - `Persistent`: was temporary, but retries have already been exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    Permanent,
    Temporary,
    Persistent,
}

impl ErrorStatus {
    /// Only temporary errors are retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorStatus::Temporary)
    }

    /// Promote a temporary status to persistent after failed retries
    pub fn persist(self) -> Self {
        match self {
            ErrorStatus::Temporary => ErrorStatus::Persistent,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Permanent => "permanent",
            ErrorStatus::Temporary => "temporary",
            ErrorStatus::Persistent => "persistent",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
