//! Prompts the orchestrator seeds and steers a run with

use rlmcraft_core::QueryMetadata;

/// Lengths listed in full before the rest are summarized
const MAX_LISTED_CHUNKS: usize = 100;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are tasked with answering a query with associated context. You can access, transform, and analyze this context interactively in a REPL environment that can recursively query sub-LLMs, which you are strongly encouraged to use as much as possible. You will be queried iteratively until you provide a final answer.

The REPL environment is initialized with:
1. A `context` variable that contains extremely important information about your query. Check its content to understand what you are working with, and look through it sufficiently as you answer your query.
2. A `llm_query(prompt)` function that queries a sub-LLM inside your REPL environment. Use it to analyze chunks of the context that are too large to read at once.
3. `print()` statements, whose output you will see on the next turn.

When you want to execute code in the REPL environment, wrap it in triple backticks with the `repl` language identifier:
```repl
chunk = context[:10000]
summary = llm_query(f"Summarize this text: {chunk}")
print(summary)
```

Variables persist between code blocks and between turns, so build up your answer step by step. Output from each block is truncated when it is very long, so store intermediate results in variables instead of printing everything.

When you are done, provide your final answer on its own line using one of:
1. FINAL(your final answer here) to give the answer directly
2. FINAL_VAR(variable_name) to return a variable you created in the REPL as your answer

Do not use these tags until you have finished the task. Think step by step, plan, and execute the plan immediately in your response."#;

/// Sent after a response that had no code block and no final answer
pub const CONTINUE_PROMPT: &str = "Your last response contained no ```repl``` code block and no final answer. Continue working in the REPL environment, or answer with FINAL(...) or FINAL_VAR(...).";

/// First user message of a run: the shape of `context` and the query.
pub fn metadata_prompt(metadata: &QueryMetadata, query: Option<&str>) -> String {
    let lengths = &metadata.context_lengths;
    let listed = if lengths.len() > MAX_LISTED_CHUNKS {
        format!(
            "{:?}... [{} others]",
            &lengths[..MAX_LISTED_CHUNKS],
            lengths.len() - MAX_LISTED_CHUNKS
        )
    } else {
        format!("{:?}", lengths)
    };

    let mut prompt = format!(
        "Your context is a {} with {} total characters, and is broken up into chunks of char lengths: {}.",
        metadata.context_type, metadata.context_total_length, listed
    );

    match query {
        Some(query) => prompt.push_str(&format!(
            "\n\nUse the REPL environment to answer the original query: \"{}\"",
            query
        )),
        None => prompt.push_str(
            "\n\nUse the REPL environment to look through the context and answer the query it contains.",
        ),
    }
    prompt
}

/// Fed back when a `FINAL_VAR` names a variable the session does not hold
pub fn unresolved_reference_prompt(name: &str, output: &str) -> String {
    format!(
        "FINAL_VAR({}) could not be resolved:\n{}\n\nAssign the variable in a ```repl``` block first, or answer with FINAL(...).",
        name, output
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlmcraft_core::Prompt;

    #[test]
    fn test_metadata_prompt() {
        let metadata = QueryMetadata::new(&Prompt::from("abcdef"));
        let prompt = metadata_prompt(&metadata, Some("How long?"));

        assert!(prompt.starts_with(
            "Your context is a text with 6 total characters, and is broken up into chunks of char lengths: [6]."
        ));
        assert!(prompt.ends_with("\"How long?\""));
    }

    #[test]
    fn test_long_chunk_lists_are_summarized() {
        let chunks = (0..105).map(|_| serde_json::json!("ab")).collect();
        let metadata = QueryMetadata::new(&Prompt::OrderedChunks(chunks));
        let prompt = metadata_prompt(&metadata, None);

        assert!(prompt.contains("210 total characters"));
        assert!(prompt.contains("... [5 others]"));
    }
}
