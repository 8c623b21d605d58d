//! REPL collaborator contract
//!
//! The session that actually runs model-written code lives outside this
//! crate. It is stateful: bindings made by one `execute_code` call are
//! visible to the next.

use crate::error::Result;
use crate::prompt::ReplContext;
use crate::types::ExecutionResult;
use async_trait::async_trait;

/// A stateful code-execution session.
///
/// Errors raised by the executed code itself belong in
/// `ExecutionResult::stderr`. An `Err` from `execute_code` means the session
/// is broken and ends the run.
#[async_trait]
pub trait ReplEnvironment: Send {
    /// Bind the run's prompt as the session's `context` variable
    async fn load_context(&mut self, context: ReplContext) -> Result<()>;

    /// Run one snippet.
    ///
    /// Model calls the snippet makes are reported in
    /// `ExecutionResult::rlm_calls`, whichever client served them.
    async fn execute_code(&mut self, code: &str) -> Result<ExecutionResult>;

    /// Release session resources. Called once when a run ends.
    async fn cleanup(&mut self) -> Result<()>;

    /// Statement that prints the value bound to `name`
    fn final_var_statement(&self, name: &str) -> String {
        format!("print(FINAL_VAR({}))", python_str_literal(name))
    }

    /// Environment label recorded in run metadata
    fn environment_type(&self) -> &str {
        "local"
    }
}

/// Quote `s` as a single-quoted string literal
pub fn python_str_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
