//! # Marker Parser
//!
//! Pulls ```` ```repl ```` code blocks and final-answer markers out of raw
//! model text.
//!
//! Two final-answer forms exist, both anchored to the start of a line:
//!
//! - `FINAL_VAR(name)` names a REPL variable whose value is the answer. It is
//!   checked first and, when present, always wins.
//! - `FINAL(payload)` carries the answer inline. The payload is matched
//!   greedily up to the last closing parenthesis on its line, so
//!   `FINAL(f(a, b))` yields `f(a, b)`.

use crate::error::Result;
use crate::repl::ReplEnvironment;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```repl\s*\n(.*?)\n```").expect("valid regex"));

static FINAL_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ms)^\s*FINAL_VAR\((.*?)\)").expect("valid regex"));

static FINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ms)^\s*FINAL\((.*)\)\s*$").expect("valid regex"));

/// Extract every REPL code block, in order, trimmed.
///
/// Returns an empty vector when the text has none.
pub fn find_code_blocks(text: &str) -> Vec<String> {
    CODE_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// A final-answer marker found in model text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalMarker {
    /// `FINAL(payload)`, already trimmed
    Literal(String),
    /// `FINAL_VAR(name)`, with surrounding quotes stripped
    Reference(String),
}

/// Locate the final-answer marker without resolving it.
pub fn find_final_marker(text: &str) -> Option<FinalMarker> {
    if let Some(caps) = FINAL_VAR.captures(text) {
        let name = caps
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .trim()
            .trim_matches('"')
            .trim_matches('\'');
        return Some(FinalMarker::Reference(name.to_string()));
    }

    FINAL
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| FinalMarker::Literal(m.as_str().trim().to_string()))
}

/// What the session printed for a `FINAL_VAR` variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    /// Trimmed stdout, or trimmed stderr when stdout is empty
    pub text: String,
    /// Whether the variable was bound when it was printed. Sessions that
    /// report no bindings at all are taken at their word.
    pub bound: bool,
}

/// Ask `environment` to print the variable `name`
pub async fn resolve_reference(
    name: &str,
    environment: &mut dyn ReplEnvironment,
) -> Result<ResolvedReference> {
    let statement = environment.final_var_statement(name);
    debug!(variable = %name, "resolving FINAL_VAR");
    let result = environment
        .execute_code(&statement)
        .await
        .map_err(|e| e.with_operation("parsing::resolve_reference"))?;

    let stdout = result.stdout.trim();
    let text = if stdout.is_empty() {
        result.stderr.trim().to_string()
    } else {
        stdout.to_string()
    };

    Ok(ResolvedReference {
        text,
        bound: result.locals.is_empty() || result.locals.contains_key(name),
    })
}

/// Find and resolve the final answer in `text`.
///
/// A `FINAL_VAR` marker is resolved by asking `environment` to print the
/// variable; its stdout is the answer, or its stderr when stdout is empty.
/// Without an environment the reference cannot be resolved and the result is
/// `None`, even if a `FINAL(...)` marker follows.
pub async fn find_final_answer(
    text: &str,
    environment: Option<&mut dyn ReplEnvironment>,
) -> Result<Option<String>> {
    match find_final_marker(text) {
        None => Ok(None),
        Some(FinalMarker::Literal(answer)) => Ok(Some(answer)),
        Some(FinalMarker::Reference(name)) => {
            let Some(env) = environment else {
                warn!(variable = %name, "FINAL_VAR marker found without an executor");
                return Ok(None);
            };
            let resolved = resolve_reference(&name, env)
                .await
                .map_err(|e| e.with_operation("parsing::find_final_answer"))?;
            Ok(Some(resolved.text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryRepl;

    #[test]
    fn test_single_code_block() {
        let text = "Let me check.\n```repl\nx = 1\nprint(x)\n```\nDone.";
        assert_eq!(find_code_blocks(text), vec!["x = 1\nprint(x)"]);
    }

    #[test]
    fn test_code_blocks_in_order() {
        let text = "```repl\n  a = 1  \n```\ntext\n```python\nignored = 1\n```\n```repl   \nb = 2\n```";
        assert_eq!(find_code_blocks(text), vec!["a = 1", "b = 2"]);
    }

    #[test]
    fn test_no_code_blocks() {
        assert!(find_code_blocks("just prose").is_empty());
        assert!(find_code_blocks("```\nplain fence\n```").is_empty());
    }

    #[test]
    fn test_final_literal() {
        assert_eq!(
            find_final_marker("FINAL(42)"),
            Some(FinalMarker::Literal("42".into()))
        );
        assert_eq!(
            find_final_marker("Reasoning...\n   FINAL(  the answer  )  \n"),
            Some(FinalMarker::Literal("the answer".into()))
        );
    }

    #[test]
    fn test_final_greedy() {
        assert_eq!(
            find_final_marker("FINAL(func(arg1, arg2))"),
            Some(FinalMarker::Literal("func(arg1, arg2)".into()))
        );
        assert_eq!(
            find_final_marker("FINAL([1, 2, 3], (4, 5))"),
            Some(FinalMarker::Literal("[1, 2, 3], (4, 5)".into()))
        );
        assert_eq!(
            find_final_marker("FINAL({'a': {'b': (1, 2)}})"),
            Some(FinalMarker::Literal("{'a': {'b': (1, 2)}}".into()))
        );
    }

    #[test]
    fn test_final_multiline_payload() {
        assert_eq!(
            find_final_marker("FINAL(line one\nline two)"),
            Some(FinalMarker::Literal("line one\nline two".into()))
        );
    }

    #[test]
    fn test_mid_line_never_matches() {
        assert_eq!(find_final_marker("The result is FINAL(42)"), None);
        assert_eq!(find_final_marker("use FINAL_VAR(x) when done"), None);
    }

    #[test]
    fn test_final_var_name() {
        assert_eq!(
            find_final_marker("FINAL_VAR(result)"),
            Some(FinalMarker::Reference("result".into()))
        );
        assert_eq!(
            find_final_marker("  FINAL_VAR( \"answer\" )"),
            Some(FinalMarker::Reference("answer".into()))
        );
        assert_eq!(
            find_final_marker("FINAL_VAR('answer')"),
            Some(FinalMarker::Reference("answer".into()))
        );
    }

    #[test]
    fn test_final_var_precedence() {
        let text = "FINAL(y)\nFINAL_VAR(x)";
        assert_eq!(find_final_marker(text), Some(FinalMarker::Reference("x".into())));
    }

    #[tokio::test]
    async fn test_literal_without_executor() {
        let answer = find_final_answer("FINAL(42)", None).await.unwrap();
        assert_eq!(answer.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_reference_without_executor() {
        let answer = find_final_answer("FINAL_VAR(x)\nFINAL(y)", None).await.unwrap();
        assert_eq!(answer, None);
    }

    #[tokio::test]
    async fn test_reference_resolved() {
        let mut repl = InMemoryRepl::new();
        repl.execute_code("x = 'resolved'").await.unwrap();

        let answer = find_final_answer("FINAL_VAR(x)\nFINAL(y)", Some(&mut repl))
            .await
            .unwrap();
        assert_eq!(answer.as_deref(), Some("resolved"));
    }

    #[tokio::test]
    async fn test_reference_missing_variable() {
        let mut repl = InMemoryRepl::new();
        let answer = find_final_answer("FINAL_VAR(nope)", Some(&mut repl)).await.unwrap();
        assert!(answer.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_resolve_reference_reports_binding() {
        let mut repl = InMemoryRepl::new();
        repl.execute_code("x = 1").await.unwrap();

        let found = resolve_reference("x", &mut repl).await.unwrap();
        assert_eq!(found, ResolvedReference { text: "1".into(), bound: true });

        let missing = resolve_reference("y", &mut repl).await.unwrap();
        assert!(!missing.bound);
        assert_eq!(missing.text, "Error: Variable 'y' not found");
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let response = "Let's compute.\n```repl\nx = 40 + 2\nprint(x)\n```\nFINAL_VAR(x)";
        let mut repl = InMemoryRepl::new();

        let blocks = find_code_blocks(response);
        assert_eq!(blocks, vec!["x = 40 + 2\nprint(x)"]);
        for code in &blocks {
            repl.execute_code(code).await.unwrap();
        }

        let answer = find_final_answer(response, Some(&mut repl)).await.unwrap();
        assert_eq!(answer.as_deref(), Some("42"));
    }
}
