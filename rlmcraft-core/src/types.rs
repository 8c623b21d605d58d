//! # Trajectory Types
//!
//! Records produced while a run iterates: usage summaries, model call
//! records, REPL execution results, code blocks and iterations. Everything
//! here is append-only; nothing is mutated once its iteration completes.
//!
//! Every record exports to a canonical JSON shape via serde, which is what
//! the trajectory log writes.

use crate::prompt::Prompt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Usage
// ============================================================================

/// Counters for a single model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsageSummary {
    pub total_calls: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

impl ModelUsageSummary {
    pub fn new(total_calls: u64, total_input_tokens: u64, total_output_tokens: u64) -> Self {
        Self {
            total_calls,
            total_input_tokens,
            total_output_tokens,
        }
    }

    /// Add another summary's counters to this one
    pub fn add(&mut self, other: &ModelUsageSummary) {
        self.total_calls += other.total_calls;
        self.total_input_tokens += other.total_input_tokens;
        self.total_output_tokens += other.total_output_tokens;
    }

    /// Counters accumulated since `earlier` (saturating at zero)
    pub fn since(&self, earlier: &ModelUsageSummary) -> ModelUsageSummary {
        ModelUsageSummary {
            total_calls: self.total_calls.saturating_sub(earlier.total_calls),
            total_input_tokens: self.total_input_tokens.saturating_sub(earlier.total_input_tokens),
            total_output_tokens: self.total_output_tokens.saturating_sub(earlier.total_output_tokens),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_calls == 0 && self.total_input_tokens == 0 && self.total_output_tokens == 0
    }
}

/// Per-model usage breakdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    #[serde(default)]
    pub model_usage_summaries: BTreeMap<String, ModelUsageSummary>,
}

impl UsageSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary for a single model
    pub fn single(model: impl Into<String>, usage: ModelUsageSummary) -> Self {
        let mut model_usage_summaries = BTreeMap::new();
        model_usage_summaries.insert(model.into(), usage);
        Self {
            model_usage_summaries,
        }
    }

    pub fn get(&self, model: &str) -> Option<&ModelUsageSummary> {
        self.model_usage_summaries.get(model)
    }

    /// Fold another summary into this one, model by model
    pub fn merge(&mut self, other: &UsageSummary) {
        for (model, usage) in &other.model_usage_summaries {
            self.model_usage_summaries
                .entry(model.clone())
                .or_default()
                .add(usage);
        }
    }

    /// Per-model difference against an earlier snapshot of the same ledger.
    /// Models with nothing new are left out.
    pub fn since(&self, earlier: &UsageSummary) -> UsageSummary {
        let model_usage_summaries = self
            .model_usage_summaries
            .iter()
            .filter_map(|(model, usage)| {
                let delta = match earlier.get(model) {
                    Some(before) => usage.since(before),
                    None => *usage,
                };
                (!delta.is_empty()).then(|| (model.clone(), delta))
            })
            .collect();
        UsageSummary {
            model_usage_summaries,
        }
    }

    /// Calls across every model
    pub fn total_calls(&self) -> u64 {
        self.model_usage_summaries.values().map(|u| u.total_calls).sum()
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.model_usage_summaries.values().map(|u| u.total_input_tokens).sum()
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.model_usage_summaries.values().map(|u| u.total_output_tokens).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.model_usage_summaries.is_empty()
    }
}

// ============================================================================
// Model call records
// ============================================================================

/// Record of a single LLM call, typically one made from inside the REPL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRecord {
    pub root_model: String,
    pub prompt: Prompt,
    pub response: String,
    pub usage_summary: UsageSummary,
    /// Wall-clock seconds
    pub execution_time: f64,
}

// ============================================================================
// REPL values
// ============================================================================

/// A variable binding as reported by the REPL session.
///
/// The set of shapes is closed; anything the session cannot describe more
/// precisely arrives as `Opaque` with its textual representation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ReplValue>),
    Tuple(Vec<ReplValue>),
    Dict(Vec<(String, ReplValue)>),
    Module { name: String },
    Callable { kind: String, name: String },
    Opaque { type_name: String, repr: String },
}

impl ReplValue {
    /// Text, numbers, booleans, sequences, mappings and tuples
    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            ReplValue::Bool(_)
                | ReplValue::Int(_)
                | ReplValue::Float(_)
                | ReplValue::Str(_)
                | ReplValue::List(_)
                | ReplValue::Tuple(_)
                | ReplValue::Dict(_)
        )
    }

    /// Canonical JSON export
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            ReplValue::None => Value::Null,
            ReplValue::Bool(b) => Value::Bool(*b),
            ReplValue::Int(i) => Value::from(*i),
            ReplValue::Float(f) => Value::from(*f),
            ReplValue::Str(s) => Value::String(s.clone()),
            ReplValue::List(items) | ReplValue::Tuple(items) => {
                Value::Array(items.iter().map(ReplValue::to_json).collect())
            }
            ReplValue::Dict(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            ReplValue::Module { name } => Value::String(format!("<module '{}'>", name)),
            ReplValue::Callable { kind, name } => Value::String(format!("<{} '{}'>", kind, name)),
            ReplValue::Opaque { type_name, repr } => {
                if repr.is_empty() {
                    Value::String(format!("<{}>", type_name))
                } else {
                    Value::String(repr.clone())
                }
            }
        }
    }
}

impl ReplValue {
    /// Plain JSON data as a value
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => ReplValue::None,
            Value::Bool(b) => ReplValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ReplValue::Int(i),
                None => ReplValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => ReplValue::Str(s.clone()),
            Value::Array(items) => ReplValue::List(items.iter().map(ReplValue::from_json).collect()),
            Value::Object(map) => ReplValue::Dict(
                map.iter()
                    .map(|(k, v)| (k.clone(), ReplValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for ReplValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Imports the canonical export. Tuples come back as lists; modules,
/// callables and opaque values come back as their text.
impl<'de> Deserialize<'de> for ReplValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(|value| ReplValue::from_json(&value))
    }
}

impl From<&str> for ReplValue {
    fn from(s: &str) -> Self {
        ReplValue::Str(s.to_string())
    }
}

impl From<String> for ReplValue {
    fn from(s: String) -> Self {
        ReplValue::Str(s)
    }
}

impl From<i64> for ReplValue {
    fn from(i: i64) -> Self {
        ReplValue::Int(i)
    }
}

impl From<f64> for ReplValue {
    fn from(f: f64) -> Self {
        ReplValue::Float(f)
    }
}

impl From<bool> for ReplValue {
    fn from(b: bool) -> Self {
        ReplValue::Bool(b)
    }
}

// ============================================================================
// Execution results
// ============================================================================

/// Outcome of running one snippet in the REPL session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub locals: BTreeMap<String, ReplValue>,
    /// Wall-clock seconds, when the session measured it
    #[serde(default)]
    pub execution_time: Option<f64>,
    /// Model calls made by the code while it ran
    #[serde(default)]
    pub rlm_calls: Vec<ChatCompletionRecord>,
}

impl ExecutionResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn with_local(mut self, name: impl Into<String>, value: impl Into<ReplValue>) -> Self {
        self.locals.insert(name.into(), value.into());
        self
    }

    pub fn with_locals(mut self, locals: BTreeMap<String, ReplValue>) -> Self {
        self.locals = locals;
        self
    }

    pub fn with_execution_time(mut self, secs: f64) -> Self {
        self.execution_time = Some(secs);
        self
    }

    pub fn with_calls(mut self, calls: Vec<ChatCompletionRecord>) -> Self {
        self.rlm_calls = calls;
        self
    }

    /// Usage of every nested call, merged
    pub fn nested_usage(&self) -> UsageSummary {
        let mut total = UsageSummary::new();
        for call in &self.rlm_calls {
            total.merge(&call.usage_summary);
        }
        total
    }
}

/// One extracted snippet paired with its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub code: String,
    pub result: ExecutionResult,
}

/// One round trip: model response, executed snippets, final-answer check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub prompt: Prompt,
    pub response: String,
    pub code_blocks: Vec<CodeBlock>,
    pub final_answer: Option<String>,
    /// Wall-clock seconds
    pub iteration_time: Option<f64>,
}

impl Iteration {
    pub fn new(prompt: Prompt, response: impl Into<String>, code_blocks: Vec<CodeBlock>) -> Self {
        Self {
            prompt,
            response: response.into(),
            code_blocks,
            final_answer: None,
            iteration_time: None,
        }
    }

    /// Every model call made from inside this iteration's code blocks
    pub fn nested_calls(&self) -> impl Iterator<Item = &ChatCompletionRecord> {
        self.code_blocks.iter().flat_map(|b| b.result.rlm_calls.iter())
    }

    pub fn nested_usage(&self) -> UsageSummary {
        let mut total = UsageSummary::new();
        for block in &self.code_blocks {
            total.merge(&block.result.nested_usage());
        }
        total
    }
}

// ============================================================================
// Run metadata
// ============================================================================

/// Configuration snapshot written at the start of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub root_model: String,
    pub max_depth: usize,
    pub max_iterations: usize,
    pub backend: String,
    pub backend_kwargs: BTreeMap<String, ReplValue>,
    pub environment_type: String,
    pub environment_kwargs: BTreeMap<String, ReplValue>,
    pub other_backends: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn usage(calls: u64, input: u64, output: u64) -> ModelUsageSummary {
        ModelUsageSummary::new(calls, input, output)
    }

    #[test]
    fn test_usage_summary_roundtrip() {
        let mut summary = UsageSummary::single("gpt-4o", usage(3, 1200, 300));
        summary.merge(&UsageSummary::single("gpt-4o-mini", usage(7, 900, 120)));

        let exported = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            exported["model_usage_summaries"]["gpt-4o"],
            json!({"total_calls": 3, "total_input_tokens": 1200, "total_output_tokens": 300})
        );

        let imported: UsageSummary = serde_json::from_value(exported).unwrap();
        assert_eq!(imported, summary);
    }

    #[test]
    fn test_usage_summary_import_without_models() {
        let imported: UsageSummary = serde_json::from_value(json!({})).unwrap();
        assert!(imported.is_empty());
    }

    #[test]
    fn test_merge_and_totals() {
        let mut total = UsageSummary::single("a", usage(1, 10, 5));
        total.merge(&UsageSummary::single("a", usage(2, 20, 10)));
        total.merge(&UsageSummary::single("b", usage(1, 1, 1)));

        assert_eq!(total.get("a"), Some(&usage(3, 30, 15)));
        assert_eq!(total.total_calls(), 4);
        assert_eq!(total.total_input_tokens(), 31);
        assert_eq!(total.total_output_tokens(), 16);
    }

    #[test]
    fn test_since_drops_untouched_models() {
        let mut before = UsageSummary::single("a", usage(1, 10, 5));
        before.merge(&UsageSummary::single("b", usage(1, 1, 1)));

        let mut after = before.clone();
        after.merge(&UsageSummary::single("a", usage(2, 20, 10)));
        after.merge(&UsageSummary::single("c", usage(1, 4, 2)));

        let delta = after.since(&before);
        assert_eq!(delta.get("a"), Some(&usage(2, 20, 10)));
        assert_eq!(delta.get("b"), None);
        assert_eq!(delta.get("c"), Some(&usage(1, 4, 2)));
    }

    #[test]
    fn test_repl_value_export() {
        let value = ReplValue::Dict(vec![
            ("n".into(), ReplValue::Int(3)),
            ("pair".into(), ReplValue::Tuple(vec![ReplValue::Int(4), ReplValue::Str("x".into())])),
            ("json".into(), ReplValue::Module { name: "json".into() }),
            ("f".into(), ReplValue::Callable { kind: "function".into(), name: "helper".into() }),
            ("obj".into(), ReplValue::Opaque { type_name: "Foo".into(), repr: "Foo(1)".into() }),
            ("none".into(), ReplValue::None),
        ]);

        assert_eq!(
            value.to_json(),
            json!({
                "n": 3,
                "pair": [4, "x"],
                "json": "<module 'json'>",
                "f": "<function 'helper'>",
                "obj": "Foo(1)",
                "none": null,
            })
        );
    }

    #[test]
    fn test_simple_values() {
        assert!(ReplValue::Str("a".into()).is_simple());
        assert!(ReplValue::Tuple(vec![]).is_simple());
        assert!(!ReplValue::None.is_simple());
        assert!(!ReplValue::Module { name: "re".into() }.is_simple());
        assert!(!ReplValue::Callable { kind: "function".into(), name: "f".into() }.is_simple());
    }

    #[test]
    fn test_code_block_export() {
        let call = ChatCompletionRecord {
            root_model: "gpt-4o-mini".into(),
            prompt: Prompt::Text("summarize chunk 0".into()),
            response: "a summary".into(),
            usage_summary: UsageSummary::single("gpt-4o-mini", usage(1, 50, 10)),
            execution_time: 0.5,
        };
        let block = CodeBlock {
            code: "s = llm_query(chunks[0])".into(),
            result: ExecutionResult::new("", "")
                .with_local("s", "a summary")
                .with_execution_time(0.6)
                .with_calls(vec![call]),
        };

        let exported = serde_json::to_value(&block).unwrap();
        assert_eq!(exported["code"], "s = llm_query(chunks[0])");
        assert_eq!(exported["result"]["locals"]["s"], "a summary");
        assert_eq!(exported["result"]["rlm_calls"][0]["root_model"], "gpt-4o-mini");
        assert_eq!(exported["result"]["rlm_calls"][0]["prompt"], "summarize chunk 0");
        assert_eq!(block.result.nested_usage().total_calls(), 1);
    }

    #[test]
    fn test_chat_completion_record_roundtrip() {
        let record = ChatCompletionRecord {
            root_model: "gpt-4o".into(),
            prompt: Prompt::OrderedChunks(vec![json!({"role": "user", "content": "hi"})]),
            response: "hello".into(),
            usage_summary: UsageSummary::single("gpt-4o", usage(1, 2, 1)),
            execution_time: 1.25,
        };
        let text = serde_json::to_string(&record).unwrap();
        let back: ChatCompletionRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_iteration_export_and_nested_usage() {
        let nested = |tokens| ChatCompletionRecord {
            root_model: "sub".into(),
            prompt: Prompt::Text("q".into()),
            response: "r".into(),
            usage_summary: UsageSummary::single("sub", usage(1, tokens, 1)),
            execution_time: 0.1,
        };
        let mut iteration = Iteration::new(
            Prompt::Text("ctx".into()),
            "```repl\nx = 1\n```",
            vec![
                CodeBlock {
                    code: "x = 1".into(),
                    result: ExecutionResult::default().with_calls(vec![nested(5)]),
                },
                CodeBlock {
                    code: "y = 2".into(),
                    result: ExecutionResult::default().with_calls(vec![nested(7), nested(1)]),
                },
            ],
        );
        iteration.iteration_time = Some(2.0);

        assert_eq!(iteration.nested_calls().count(), 3);
        assert_eq!(iteration.nested_usage().get("sub"), Some(&usage(3, 13, 3)));

        let exported = serde_json::to_value(&iteration).unwrap();
        assert_eq!(exported["final_answer"], serde_json::Value::Null);
        assert_eq!(exported["code_blocks"].as_array().unwrap().len(), 2);
        assert_eq!(exported["iteration_time"], 2.0);
    }

    #[test]
    fn test_iteration_import() {
        let mut iteration = Iteration::new(
            Prompt::Text("ctx".into()),
            "```repl\nx = 40 + 2\n```\nFINAL_VAR(x)",
            vec![CodeBlock {
                code: "x = 40 + 2".into(),
                result: ExecutionResult::new("42\n", "")
                    .with_local("x", 42i64)
                    .with_local("ratio", 0.5)
                    .with_local("tags", ReplValue::List(vec!["a".into(), ReplValue::None])),
            }],
        );
        iteration.final_answer = Some("42".into());

        let text = serde_json::to_string(&iteration).unwrap();
        let back: Iteration = serde_json::from_str(&text).unwrap();
        assert_eq!(back, iteration);
    }

    #[test]
    fn test_repl_value_import_is_lossy_for_described_values() {
        let back: ReplValue = serde_json::from_value(json!({
            "pair": [4, "x"],
            "json": "<module 'json'>",
            "big": 1.5e300,
        }))
        .unwrap();

        assert_eq!(
            back,
            ReplValue::Dict(vec![
                ("big".into(), ReplValue::Float(1.5e300)),
                ("json".into(), ReplValue::Str("<module 'json'>".into())),
                ("pair".into(), ReplValue::List(vec![ReplValue::Int(4), ReplValue::Str("x".into())])),
            ])
        );
    }

    #[test]
    fn test_execution_result_import_defaults() {
        let result: ExecutionResult = serde_json::from_value(json!({"stdout": "hi\n"})).unwrap();
        assert_eq!(result, ExecutionResult::new("hi\n", ""));
    }
}
