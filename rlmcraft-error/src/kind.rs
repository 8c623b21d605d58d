//! Error kinds for rlmcraft operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on ErrorKind to decide whether a run can continue. Parsing
/// and formatting never produce errors; accounting and configuration kinds
/// are fatal for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Prompt / model resolution errors
    // =========================================================================
    /// Prompt has a shape the callee cannot accept
    InvalidPrompt,

    /// No model given for a call and no default configured
    ModelMissing,

    // =========================================================================
    // Accounting errors
    // =========================================================================
    /// A completed call reported no usage data
    UsageMissing,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// Rate limit exceeded
    RateLimited,

    /// Provider not available
    ProviderUnavailable,

    /// Provider rejected the credentials
    AuthenticationFailed,

    // =========================================================================
    // Execution errors
    // =========================================================================
    /// The REPL session itself failed (not the code it ran)
    ExecutionFailed,

    // =========================================================================
    // IO / encoding errors
    // =========================================================================
    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Prompt / model
            ErrorKind::InvalidPrompt => "InvalidPrompt",
            ErrorKind::ModelMissing => "ModelMissing",

            // Accounting
            ErrorKind::UsageMissing => "UsageMissing",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",

            // Execution
            ErrorKind::ExecutionFailed => "ExecutionFailed",

            // IO
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
