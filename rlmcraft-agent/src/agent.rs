//! Agent implementation - orchestrates the model <-> REPL loop

use crate::logger::TrajectoryLogger;
use crate::prompts::{self, CONTINUE_PROMPT, DEFAULT_SYSTEM_PROMPT};
use rlmcraft_core::{
    find_code_blocks, find_final_marker, format_iteration, resolve_reference, ChatMessage,
    CodeBlock, FinalMarker, Iteration, ModelClient, Prompt, QueryMetadata, ReplEnvironment,
    ReplValue, Result, RunMetadata, UsageSummary, DEFAULT_MAX_CHARACTER_LENGTH,
};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model for the root calls; the client default when `None`
    pub root_model: Option<String>,
    pub max_iterations: usize,
    /// Nesting ceiling for recursive runs
    pub max_depth: usize,
    /// Nesting level of this run
    pub depth: usize,
    /// Cap on each rendered execution result fed back to the model
    pub max_character_length: usize,
    /// Wall-clock budget for the whole run
    pub deadline: Option<Duration>,
    pub system_prompt: String,
    /// How `rlm_calls` reported by the REPL count toward run usage
    pub nested_usage: NestedUsage,
}

/// Which client the REPL's nested model calls go through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NestedUsage {
    /// The run's own client; its ledger already counts every nested call
    #[default]
    SharedClient,
    /// Another client; the nested records are added to the run's usage
    SeparateClient,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            root_model: None,
            max_iterations: 30,
            max_depth: 1,
            depth: 0,
            max_character_length: DEFAULT_MAX_CHARACTER_LENGTH,
            deadline: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            nested_usage: NestedUsage::default(),
        }
    }
}

impl AgentConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.root_model = Some(model.into());
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_depth(mut self, max: usize) -> Self {
        self.max_depth = max;
        self
    }

    pub fn with_max_character_length(mut self, max: usize) -> Self {
        self.max_character_length = max;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_nested_usage(mut self, nested_usage: NestedUsage) -> Self {
        self.nested_usage = nested_usage;
        self
    }

    /// Config for a run started from inside this one
    pub fn child_config(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self.clone()
        }
    }
}

/// Which ceiling ended a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionLimit {
    Iterations,
    Depth,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { answer: String },
    Exhausted { limit: ExhaustionLimit },
    Cancelled,
}

/// Result from agent execution
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub outcome: RunOutcome,
    /// Every iteration, in order
    pub trajectory: Vec<Iteration>,
    /// Root calls plus every nested call made from the REPL, each counted once
    pub usage: UsageSummary,
    pub execution_time: Duration,
}

impl AgentResult {
    pub fn answer(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Completed { answer } => Some(answer),
            _ => None,
        }
    }
}

/// The agent orchestrator - manages the model <-> REPL loop
pub struct Agent<C, E> {
    client: C,
    environment: E,
    config: AgentConfig,
    cancel: CancellationToken,
    logger: Option<TrajectoryLogger>,
}

impl<C: ModelClient, E: ReplEnvironment> Agent<C, E> {
    pub fn new(client: C, environment: E, config: AgentConfig) -> Self {
        Self {
            client,
            environment,
            config,
            cancel: CancellationToken::new(),
            logger: None,
        }
    }

    /// Stop the run when `token` is cancelled; checked before each iteration
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_logger(mut self, logger: TrajectoryLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    /// Configuration snapshot for this run
    pub fn metadata(&self) -> RunMetadata {
        let root_model = self.root_model().unwrap_or_default().to_string();
        let mut backend_kwargs = BTreeMap::new();
        backend_kwargs.insert("model_name".to_string(), ReplValue::Str(root_model.clone()));

        RunMetadata {
            root_model,
            max_depth: self.config.max_depth,
            max_iterations: self.config.max_iterations,
            backend: self.client.backend().to_string(),
            backend_kwargs,
            environment_type: self.environment.environment_type().to_string(),
            environment_kwargs: BTreeMap::new(),
            other_backends: None,
        }
    }

    fn root_model(&self) -> Option<&str> {
        self.config.root_model.as_deref().or(self.client.model_name())
    }

    /// Run `prompt` to completion.
    ///
    /// `query` is the question to answer about the prompt; without one the
    /// model is told the prompt carries it. The REPL session is cleaned up
    /// however the run ends.
    pub async fn run(&mut self, prompt: Prompt, query: Option<&str>) -> Result<AgentResult> {
        let start = Instant::now();
        let usage_before = self.client.get_usage_summary();
        let mut trajectory = Vec::new();

        let outcome = self.run_loop(&prompt, query, start, &mut trajectory).await;
        let cleanup = self.environment.cleanup().await;

        let outcome = match (outcome, cleanup) {
            (Ok(outcome), Ok(())) => outcome,
            (Ok(_), Err(e)) => return Err(e.with_operation("agent::run")),
            (Err(e), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    warn!(error = %cleanup_err, "REPL cleanup failed after run error");
                }
                return Err(e.with_operation("agent::run"));
            }
        };

        let mut usage = self.client.get_usage_summary().since(&usage_before);
        if self.config.nested_usage == NestedUsage::SeparateClient {
            for iteration in &trajectory {
                usage.merge(&iteration.nested_usage());
            }
        }

        let execution_time = start.elapsed();
        match &outcome {
            RunOutcome::Completed { .. } => info!(
                iterations = trajectory.len(),
                calls = usage.total_calls(),
                input_tokens = usage.total_input_tokens(),
                output_tokens = usage.total_output_tokens(),
                elapsed_ms = execution_time.as_millis() as u64,
                "run completed"
            ),
            other => warn!(
                outcome = ?other,
                iterations = trajectory.len(),
                calls = usage.total_calls(),
                "run ended without an answer"
            ),
        }

        Ok(AgentResult {
            outcome,
            trajectory,
            usage,
            execution_time,
        })
    }

    async fn run_loop(
        &mut self,
        prompt: &Prompt,
        query: Option<&str>,
        start: Instant,
        trajectory: &mut Vec<Iteration>,
    ) -> Result<RunOutcome> {
        if self.config.depth >= self.config.max_depth {
            warn!(depth = self.config.depth, max_depth = self.config.max_depth, "depth ceiling reached");
            return Ok(RunOutcome::Exhausted { limit: ExhaustionLimit::Depth });
        }

        let metadata = self.metadata();
        info!(
            root_model = %metadata.root_model,
            backend = %metadata.backend,
            max_iterations = metadata.max_iterations,
            depth = self.config.depth,
            "run started"
        );
        if let Some(logger) = self.logger.as_mut() {
            logger.log_metadata(&metadata)?;
        }

        self.environment.load_context(prompt.to_repl_context()).await?;

        let query_metadata = QueryMetadata::new(prompt);
        let mut history = vec![
            ChatMessage::system(self.config.system_prompt.clone()),
            ChatMessage::user(prompts::metadata_prompt(&query_metadata, query)),
        ];
        let model = self.config.root_model.clone();

        for index in 0..self.config.max_iterations {
            if self.cancel.is_cancelled() {
                warn!(iteration = index, "run cancelled");
                return Ok(RunOutcome::Cancelled);
            }
            if let Some(deadline) = self.config.deadline {
                if start.elapsed() >= deadline {
                    warn!(iteration = index, "run deadline passed");
                    return Ok(RunOutcome::Cancelled);
                }
            }

            let iteration_start = Instant::now();
            let turn_prompt = Prompt::from_messages(&history);
            let response = self
                .client
                .acompletion(&turn_prompt, model.as_deref())
                .await
                .map_err(|e| e.with_context("iteration", index.to_string()))?;
            debug!(iteration = index, chars = response.chars().count(), "model responded");

            let mut code_blocks = Vec::new();
            for code in find_code_blocks(&response) {
                debug!(iteration = index, block = code_blocks.len(), "executing code block");
                let result = self
                    .environment
                    .execute_code(&code)
                    .await
                    .map_err(|e| e.with_context("iteration", index.to_string()))?;
                code_blocks.push(CodeBlock { code, result });
            }

            let (final_answer, unresolved) = self.check_final(&response).await?;

            let mut iteration = Iteration::new(turn_prompt, response, code_blocks);
            iteration.final_answer = final_answer.clone();
            iteration.iteration_time = Some(iteration_start.elapsed().as_secs_f64());

            if let Some(logger) = self.logger.as_mut() {
                logger.log_iteration(&iteration)?;
            }

            history.extend(format_iteration(&iteration, self.config.max_character_length));
            if let Some((name, output)) = unresolved {
                history.push(ChatMessage::user(prompts::unresolved_reference_prompt(&name, &output)));
            } else if iteration.code_blocks.is_empty() && final_answer.is_none() {
                history.push(ChatMessage::user(CONTINUE_PROMPT));
            }
            trajectory.push(iteration);

            if let Some(answer) = final_answer {
                return Ok(RunOutcome::Completed { answer });
            }
        }

        warn!(max_iterations = self.config.max_iterations, "iteration ceiling reached");
        Ok(RunOutcome::Exhausted { limit: ExhaustionLimit::Iterations })
    }

    /// Look for the final answer with the session available.
    ///
    /// A `FINAL_VAR` naming a variable the session does not hold is not an
    /// answer; its output comes back as the second element instead.
    async fn check_final(
        &mut self,
        response: &str,
    ) -> Result<(Option<String>, Option<(String, String)>)> {
        match find_final_marker(response) {
            None => Ok((None, None)),
            Some(FinalMarker::Literal(answer)) => Ok((Some(answer), None)),
            Some(FinalMarker::Reference(name)) => {
                let environment: &mut dyn ReplEnvironment = &mut self.environment;
                let resolved = resolve_reference(&name, environment).await?;
                if resolved.bound {
                    Ok((Some(resolved.text), None))
                } else {
                    debug!(variable = %name, "FINAL_VAR names an unbound variable");
                    Ok((None, Some((name, resolved.text))))
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
