//! # rlmcraft core
//!
//! Trajectory management for language models that answer by writing code.
//!
//! ## Core Concepts
//! - **Markers**: ```` ```repl ```` code blocks plus `FINAL(...)` / `FINAL_VAR(...)` answers
//! - **Execution results**: stdout, stderr and bindings reported by a REPL session
//! - **Trajectory**: iterations rendered back into chat history, with truncation
//! - **Usage**: per-model call and token accounting, nested calls included
//! - **Provider**: Trait-based LLM communication (OpenAI-compatible, Anthropic)

pub mod error;
pub mod types;
pub mod prompt;
pub mod parsing;
pub mod format;
pub mod usage;
pub mod repl;
pub mod client;
pub mod provider;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use types::{
    ModelUsageSummary, UsageSummary, ChatCompletionRecord, ReplValue,
    ExecutionResult, CodeBlock, Iteration, RunMetadata,
};
pub use prompt::{Prompt, ReplContext, QueryMetadata};
pub use parsing::{
    find_code_blocks, find_final_answer, find_final_marker, resolve_reference,
    FinalMarker, ResolvedReference,
};
pub use format::{
    format_execution_result, format_iteration, truncate,
    NO_OUTPUT, DEFAULT_MAX_CHARACTER_LENGTH,
};
pub use usage::UsageLedger;
pub use repl::ReplEnvironment;
pub use client::{ModelClient, LmClient};
pub use provider::{
    LlmProvider, ProviderConfig, ProviderType, ProviderError, Backend,
    ChatMessage, Role, CompletionRequest, CompletionResponse, FinishReason, Usage,
    OpenAIProvider, AnthropicProvider,
};
