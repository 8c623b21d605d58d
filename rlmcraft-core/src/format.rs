//! # Trajectory Formatting
//!
//! Renders execution results for display and turns a finished iteration
//! into the messages appended to the next model call.

use crate::provider::ChatMessage;
use crate::types::{ExecutionResult, Iteration};

/// Rendered in place of an execution result that shows nothing
pub const NO_OUTPUT: &str = "No output";

/// Default cap on a rendered result, in characters
pub const DEFAULT_MAX_CHARACTER_LENGTH: usize = 20_000;

/// Bindings that never appear in the variable listing
const RESERVED_NAMES: [&str; 3] = ["__builtins__", "__name__", "__doc__"];

/// Render one execution result.
///
/// Sections appear in order (stdout, stderr, variable names) and are
/// separated by a blank line. Only bindings with simple values are listed.
pub fn format_execution_result(result: &ExecutionResult) -> String {
    let mut parts = Vec::new();

    if !result.stdout.is_empty() {
        parts.push(format!("\n{}", result.stdout));
    }

    if !result.stderr.is_empty() {
        parts.push(format!("\n{}", result.stderr));
    }

    let names: Vec<String> = result
        .locals
        .iter()
        .filter(|(name, value)| {
            !name.starts_with('_') && !RESERVED_NAMES.contains(&name.as_str()) && value.is_simple()
        })
        .map(|(name, _)| format!("'{}'", name))
        .collect();

    if !names.is_empty() {
        parts.push(format!("REPL variables: [{}]\n", names.join(", ")));
    }

    if parts.is_empty() {
        NO_OUTPUT.to_string()
    } else {
        parts.join("\n\n")
    }
}

/// Cut `text` to `max` characters, reporting how many were dropped
pub fn truncate(text: &str, max: usize) -> String {
    let len = text.chars().count();
    if len <= max {
        return text.to_string();
    }

    let kept: String = text.chars().take(max).collect();
    format!("{}... + [{} chars...]", kept, len - max)
}

/// Messages to append after `iteration`: the model's response, then one
/// user message per executed code block.
pub fn format_iteration(iteration: &Iteration, max_character_length: usize) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(iteration.code_blocks.len() + 1);
    messages.push(ChatMessage::assistant(iteration.response.clone()));

    for block in &iteration.code_blocks {
        let result = truncate(&format_execution_result(&block.result), max_character_length);
        messages.push(ChatMessage::user(format!(
            "Code executed:\n```python\n{}\n```\n\nREPL output:\n{}",
            block.code, result
        )));
    }

    messages
}
