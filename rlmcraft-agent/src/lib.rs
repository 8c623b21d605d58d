//! # rlmcraft agent
//!
//! The agent orchestrates the model <-> REPL loop:
//! 1. The prompt is loaded into the REPL session as `context`
//! 2. The model is told the context's shape and the query
//! 3. Every ```` ```repl ```` block in its response runs in the session, in order
//! 4. Results are fed back, truncated, as the next turn's history
//! 5. Repeat until `FINAL(...)` / `FINAL_VAR(...)`, a ceiling, or cancellation
//!
//! The model is the brain, the REPL is the body.

mod agent;
mod logger;
mod prompts;

pub use agent::{Agent, AgentConfig, AgentResult, ExhaustionLimit, NestedUsage, RunOutcome};
pub use logger::{read_trajectory, TrajectoryLogger};
pub use prompts::{metadata_prompt, CONTINUE_PROMPT, DEFAULT_SYSTEM_PROMPT};
