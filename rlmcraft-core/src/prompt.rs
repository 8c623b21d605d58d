//! # Prompt Shapes
//!
//! A prompt is plain text, a keyed mapping of chunks, or an ordered list of
//! chunks (which may be role-tagged chat messages). The shape is decided once,
//! when the prompt is built or imported, never by inspecting values later.

use crate::error::{self, Result};
use crate::provider::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The three accepted prompt shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    KeyedChunks(Map<String, Value>),
    OrderedChunks(Vec<Value>),
}

impl Prompt {
    /// Import a prompt from arbitrary JSON. Numbers, booleans and null are rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Prompt::Text(s)),
            Value::Object(map) => Ok(Prompt::KeyedChunks(map)),
            Value::Array(items) => Ok(Prompt::OrderedChunks(items)),
            other => Err(error::invalid_prompt(json_type_name(&other))
                .with_operation("prompt::from_value")),
        }
    }

    /// Build an ordered prompt out of chat history
    pub fn from_messages(messages: &[ChatMessage]) -> Self {
        Prompt::OrderedChunks(
            messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
                .collect(),
        )
    }

    /// Name of the shape, as reported in `QueryMetadata`
    pub fn shape(&self) -> &'static str {
        match self {
            Prompt::Text(_) => "text",
            Prompt::KeyedChunks(_) => "keyed-mapping",
            Prompt::OrderedChunks(_) => "ordered-list",
        }
    }

    /// Convert to chat messages for a model call.
    ///
    /// Text becomes a single user message; an ordered list must consist of
    /// role-tagged messages. Anything else is an `InvalidPrompt`.
    pub fn to_messages(&self) -> Result<Vec<ChatMessage>> {
        match self {
            Prompt::Text(text) => Ok(vec![ChatMessage::user(text.clone())]),
            Prompt::KeyedChunks(_) => {
                Err(error::invalid_prompt(self.shape()).with_operation("prompt::to_messages"))
            }
            Prompt::OrderedChunks(items) => {
                if items.is_empty() {
                    return Err(error::invalid_prompt("empty message list")
                        .with_operation("prompt::to_messages"));
                }
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        serde_json::from_value::<ChatMessage>(item.clone()).map_err(|e| {
                            error::invalid_prompt("ordered-list of non-messages")
                                .with_operation("prompt::to_messages")
                                .with_context("index", i.to_string())
                                .set_source(e)
                        })
                    })
                    .collect()
            }
        }
    }

    /// What the REPL session should see as its `context` variable
    pub fn to_repl_context(&self) -> ReplContext {
        match self {
            Prompt::Text(text) => ReplContext::Text(text.clone()),
            Prompt::KeyedChunks(map) => ReplContext::Data(Value::Object(map.clone())),
            Prompt::OrderedChunks(items) => {
                let is_messages = items
                    .first()
                    .and_then(Value::as_object)
                    .map(|first| first.contains_key("content"))
                    .unwrap_or(false);
                if is_messages {
                    ReplContext::Data(Value::Array(
                        items
                            .iter()
                            .map(|m| m.get("content").cloned().unwrap_or_else(|| Value::from("")))
                            .collect(),
                    ))
                } else {
                    ReplContext::Data(Value::Array(items.clone()))
                }
            }
        }
    }
}

impl From<&str> for Prompt {
    fn from(s: &str) -> Self {
        Prompt::Text(s.to_string())
    }
}

impl From<String> for Prompt {
    fn from(s: String) -> Self {
        Prompt::Text(s)
    }
}

/// Context handed to the REPL session: either a string or structured data
#[derive(Debug, Clone, PartialEq)]
pub enum ReplContext {
    Text(String),
    Data(Value),
}

// ============================================================================
// Query metadata
// ============================================================================

/// Shape statistics for a prompt, recomputed for every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryMetadata {
    pub context_lengths: Vec<usize>,
    pub context_total_length: usize,
    pub context_type: &'static str,
}

impl QueryMetadata {
    pub fn new(prompt: &Prompt) -> Self {
        let context_lengths = match prompt {
            Prompt::Text(text) => vec![char_len(text)],
            Prompt::KeyedChunks(map) => map.values().map(chunk_len).collect(),
            Prompt::OrderedChunks(items) => match items.first() {
                None => vec![0],
                Some(Value::Object(first)) if first.contains_key("content") => items
                    .iter()
                    .map(|chunk| match chunk.get("content") {
                        Some(Value::String(s)) => char_len(s),
                        Some(other) => char_len(&other.to_string()),
                        None => 0,
                    })
                    .collect(),
                Some(_) => items.iter().map(chunk_len).collect(),
            },
        };

        Self {
            context_total_length: context_lengths.iter().sum(),
            context_lengths,
            context_type: prompt.shape(),
        }
    }
}

/// Character count for strings, encoded length for everything else
fn chunk_len(chunk: &Value) -> usize {
    match chunk {
        Value::String(s) => char_len(s),
        other => char_len(&other.to_string()),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
