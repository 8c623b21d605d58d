//! # rlmcraft-error
//!
//! Unified error handling for rlmcraft.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., UsageMissing, InvalidPrompt)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use rlmcraft_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::ModelMissing, "no model given and no default configured")
//!         .with_operation("client::completion")
//!         .with_context("provider", "openai"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, rlmcraft_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using rlmcraft Error
pub type Result<T> = std::result::Result<T, Error>;
