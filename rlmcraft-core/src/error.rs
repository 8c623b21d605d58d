//! rlmcraft-core error types
//!
//! Re-exports rlmcraft-error and provides core-specific conveniences.

pub use rlmcraft_error::{Error, ErrorKind, ErrorStatus, Result};

/// Create an InvalidPrompt error
pub fn invalid_prompt(shape: impl Into<String>) -> Error {
    Error::invalid_prompt(shape)
}

/// Create a ModelMissing error
pub fn model_missing(provider: impl Into<String>) -> Error {
    Error::model_missing(provider)
}

/// Create a UsageMissing error
pub fn usage_missing(model: impl Into<String>) -> Error {
    Error::usage_missing(model)
}

/// Create a ConfigInvalid error
pub fn config_invalid(message: impl Into<String>) -> Error {
    Error::config_invalid(message)
}

/// Create a SerializationFailed error
pub fn serialization_error(message: impl Into<String>) -> Error {
    Error::serialization_failed(message)
}
