//! Test doubles: a provider that replays scripted replies and a tiny
//! in-memory REPL session.
//!
//! The REPL understands just enough to drive a run: `name = expr`,
//! `print(expr)` and `print(FINAL_VAR('name'))`, where `expr` is a literal,
//! a variable, or a sum of integers.

use crate::error::{Error, Result};
use crate::prompt::ReplContext;
use crate::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ProviderError, Usage,
};
use crate::repl::ReplEnvironment;
use crate::types::{ChatCompletionRecord, ExecutionResult, ReplValue};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

// ============================================================================
// Scripted provider
// ============================================================================

/// One canned provider reply
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    pub content: String,
    pub usage: Option<Usage>,
}

impl ScriptedReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        }
    }

    pub fn with_usage(mut self, prompt_tokens: usize, completion_tokens: usize) -> Self {
        self.usage = Some(Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        });
        self
    }

    pub fn without_usage(mut self) -> Self {
        self.usage = None;
        self
    }
}

/// Replays replies in order and remembers every request
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
    default_model: Option<String>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    /// Shorthand for replies that only differ in text
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(ScriptedReply::text).collect())
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let model = request.model.clone().unwrap_or_default();
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| ProviderError::Other("script exhausted".into()))?;

        Ok(CompletionResponse {
            id: "scripted".into(),
            model,
            content: Some(reply.content),
            finish_reason: FinishReason::Stop,
            usage: reply.usage,
        })
    }
}

// ============================================================================
// In-memory REPL
// ============================================================================

/// A REPL session holding variables in a map
#[derive(Debug, Default)]
pub struct InMemoryRepl {
    variables: BTreeMap<String, ReplValue>,
    executed: Vec<String>,
    pending_calls: Vec<ChatCompletionRecord>,
    fail_on: Option<String>,
    cleanups: usize,
}

impl InMemoryRepl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `execute_code` fail as a broken session would when the code
    /// contains `marker`
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_on = Some(marker.into());
        self
    }

    /// Attach nested model call records to the next execution result
    pub fn push_nested_call(&mut self, record: ChatCompletionRecord) {
        self.pending_calls.push(record);
    }

    pub fn get(&self, name: &str) -> Option<&ReplValue> {
        self.variables.get(name)
    }

    /// Every snippet executed, in order
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn cleanup_count(&self) -> usize {
        self.cleanups
    }

    fn run_line(&mut self, line: &str, stdout: &mut String, stderr: &mut String) {
        if let Some(inner) = line.strip_prefix("print(").and_then(|s| s.strip_suffix(')')) {
            if let Some(name) = inner.strip_prefix("FINAL_VAR(").and_then(|s| s.strip_suffix(')')) {
                let name = name.trim().trim_matches('\'').trim_matches('"');
                match self.variables.get(name) {
                    Some(value) => stdout.push_str(&display(value)),
                    None => stdout.push_str(&format!("Error: Variable '{}' not found", name)),
                }
                stdout.push('\n');
                return;
            }

            match self.eval(inner) {
                Ok(value) => {
                    stdout.push_str(&display(&value));
                    stdout.push('\n');
                }
                Err(message) => push_line(stderr, &message),
            }
            return;
        }

        if let Some((name, expr)) = line.split_once('=') {
            let name = name.trim();
            if is_identifier(name) {
                match self.eval(expr) {
                    Ok(value) => {
                        self.variables.insert(name.to_string(), value);
                    }
                    Err(message) => push_line(stderr, &message),
                }
                return;
            }
        }

        push_line(stderr, &format!("SyntaxError: unsupported statement: {}", line));
    }

    fn eval(&self, expr: &str) -> std::result::Result<ReplValue, String> {
        let expr = expr.trim();
        if expr.contains('+') && !is_quoted(expr) {
            let mut total = 0i64;
            for term in expr.split('+') {
                match self.eval(term)? {
                    ReplValue::Int(n) => total += n,
                    other => {
                        return Err(format!(
                            "TypeError: unsupported operand type for +: {}",
                            display(&other)
                        ))
                    }
                }
            }
            return Ok(ReplValue::Int(total));
        }

        if is_quoted(expr) {
            return Ok(ReplValue::Str(expr[1..expr.len() - 1].to_string()));
        }
        match expr {
            "True" => return Ok(ReplValue::Bool(true)),
            "False" => return Ok(ReplValue::Bool(false)),
            "None" => return Ok(ReplValue::None),
            _ => {}
        }
        if let Ok(n) = expr.parse::<i64>() {
            return Ok(ReplValue::Int(n));
        }
        if let Ok(f) = expr.parse::<f64>() {
            return Ok(ReplValue::Float(f));
        }

        self.variables
            .get(expr)
            .cloned()
            .ok_or_else(|| format!("NameError: name '{}' is not defined", expr))
    }
}

#[async_trait]
impl ReplEnvironment for InMemoryRepl {
    async fn load_context(&mut self, context: ReplContext) -> Result<()> {
        let value = match context {
            ReplContext::Text(text) => ReplValue::Str(text),
            ReplContext::Data(data) => ReplValue::from_json(&data),
        };
        self.variables.insert("context".into(), value);
        Ok(())
    }

    async fn execute_code(&mut self, code: &str) -> Result<ExecutionResult> {
        if let Some(marker) = &self.fail_on {
            if code.contains(marker.as_str()) {
                return Err(Error::execution_failed("session crashed")
                    .with_operation("testing::execute_code"));
            }
        }
        self.executed.push(code.to_string());

        let mut stdout = String::new();
        let mut stderr = String::new();
        for line in code.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.run_line(line, &mut stdout, &mut stderr);
        }

        Ok(ExecutionResult::new(stdout, stderr)
            .with_locals(self.variables.clone())
            .with_execution_time(0.0)
            .with_calls(std::mem::take(&mut self.pending_calls)))
    }

    async fn cleanup(&mut self) -> Result<()> {
        self.cleanups += 1;
        Ok(())
    }
}

fn push_line(buf: &mut String, line: &str) {
    buf.push_str(line);
    buf.push('\n');
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn display(value: &ReplValue) -> String {
    match value {
        ReplValue::None => "None".into(),
        ReplValue::Bool(true) => "True".into(),
        ReplValue::Bool(false) => "False".into(),
        ReplValue::Int(n) => n.to_string(),
        ReplValue::Float(f) => f.to_string(),
        ReplValue::Str(s) => s.clone(),
        other => other.to_json().to_string(),
    }
}
