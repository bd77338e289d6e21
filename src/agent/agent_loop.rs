//! Bounded-step agent loop.
//!
//! Implements the ReAct control loop and its Reflexion variant: call the
//! model with the transcript and tool schemas, classify the reply as a
//! final answer or a batch of tool invocations, dispatch tools and append
//! their observations, and repeat until an answer arrives or the step
//! budget runs out.
//!
//! Tool failures are fed back to the model as ordinary observations and
//! never abort a run. Transport failures and protocol violations (a reply
//! with neither content nor invocations) are fatal: continuing past them
//! would corrupt the transcript invariant that every invocation is answered
//! before the next model call.

use crate::agent::prompt;
use crate::agent::tools::{SchemaError, ToolRegistry};
use crate::llm::{ChatMessage, LlmClient, LlmError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Step budget used when the caller does not override it.
pub const DEFAULT_MAX_STEPS: usize = 15;

/// Returned in place of an answer when the step budget is exhausted.
pub const STEP_LIMIT_SENTINEL: &str = "Failed to complete the analysis within the step limit.";

/// Which control loop drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentVariant {
    /// Thought/Action/Observation loop.
    #[default]
    React,
    /// ReAct plus a self-critique turn after each tool round.
    Reflexion,
}

impl AgentVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentVariant::React => "react",
            AgentVariant::Reflexion => "reflexion",
        }
    }
}

/// Configuration for one agent run.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub variant: AgentVariant,
    pub max_steps: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            variant: AgentVariant::React,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Fatal run failures. Tool failures never appear here; they become
/// observations instead.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("schema synthesis failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("protocol error: assistant reply carried neither content nor tool calls")]
    EmptyReply,
}

/// How a run ended. Always one of the two; a run never returns a silent
/// partial answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// The model produced a final answer.
    Answer(String),
    /// The step budget ran out first.
    StepBudgetExhausted,
}

impl AgentOutcome {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, AgentOutcome::StepBudgetExhausted)
    }

    /// The report text: the answer, or the fixed sentinel.
    pub fn into_text(self) -> String {
        match self {
            AgentOutcome::Answer(text) => text,
            AgentOutcome::StepBudgetExhausted => STEP_LIMIT_SENTINEL.to_string(),
        }
    }
}

/// The codebase analysis agent. One instance drives one isolated run with
/// its own append-only transcript.
pub struct AnalysisAgent {
    config: AgentConfig,
    client: Box<dyn LlmClient>,
    registry: ToolRegistry,
    memory: Vec<ChatMessage>,
    steps_used: usize,
}

impl AnalysisAgent {
    pub fn new(config: AgentConfig, client: Box<dyn LlmClient>, registry: ToolRegistry) -> Self {
        Self {
            config,
            client,
            registry,
            memory: Vec::new(),
            steps_used: 0,
        }
    }

    /// The transcript accumulated so far.
    pub fn memory(&self) -> &[ChatMessage] {
        &self.memory
    }

    /// Model calls made by the last run.
    pub fn steps_used(&self) -> usize {
        self.steps_used
    }

    fn initialise_memory(&mut self, root: &Path, user_prompt: &str) {
        self.memory.clear();
        self.memory
            .push(ChatMessage::system(prompt::system_prompt(self.config.variant)));
        self.memory
            .push(ChatMessage::user(prompt::initial_user_message(root, user_prompt)));
        self.steps_used = 0;
    }

    /// Run the agent over the codebase at `root` with the given prompt.
    pub async fn run(&mut self, root: &Path, user_prompt: &str) -> Result<AgentOutcome, AgentError> {
        // Fail fast before the first model call: a tool whose schema cannot
        // be expressed must never be offered to the model.
        let schemas = self.registry.synthesize_schemas()?;

        self.initialise_memory(root, user_prompt);
        if self.registry.is_empty() {
            warn!("No tools registered; the model can only answer from the prompt");
        }
        info!(
            "Starting {} analysis with {} tools, budget {} steps",
            self.config.variant.as_str(),
            self.registry.len(),
            self.config.max_steps
        );

        for step in 0..self.config.max_steps {
            self.steps_used = step + 1;
            debug!("--- step {} ---", step + 1);

            let reply = self.client.complete(&self.memory, &schemas).await?;
            self.memory
                .push(ChatMessage::assistant(reply.content.clone(), reply.tool_calls.clone()));

            if reply.tool_calls.is_empty() {
                let content = reply.content.unwrap_or_default();
                if content.trim().is_empty() {
                    return Err(AgentError::EmptyReply);
                }
                info!("Final answer after {} step(s)", step + 1);
                return Ok(AgentOutcome::Answer(content));
            }

            // Answer every invocation from this turn, in invocation order,
            // before the next model call.
            for call in &reply.tool_calls {
                debug!("Dispatching tool {} ({})", call.function.name, call.id);
                let observation = self
                    .registry
                    .dispatch(&call.function.name, &call.function.arguments);
                self.memory.push(ChatMessage::tool(call.id.clone(), observation));
            }

            if self.config.variant == AgentVariant::Reflexion {
                self.memory
                    .push(ChatMessage::user(prompt::REFLECTION_INSTRUCTION));
            }

            debug!("Memory length: {} messages", self.memory.len());
        }

        warn!(
            "Step budget of {} exhausted without a final answer",
            self.config.max_steps
        );
        Ok(AgentOutcome::StepBudgetExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AssistantReply, ToolInvocation};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Stub client that replays a fixed script of replies. Once the script
    /// is down to its last reply it keeps returning it.
    struct ScriptedClient {
        script: Mutex<Vec<AssistantReply>>,
    }

    impl ScriptedClient {
        fn new(mut replies: Vec<AssistantReply>) -> Self {
            replies.reverse();
            Self {
                script: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[serde_json::Value],
        ) -> Result<AssistantReply, LlmError> {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.pop().unwrap())
            } else {
                Ok(script.last().cloned().unwrap_or_default())
            }
        }
    }

    fn tool_reply(n: usize) -> AssistantReply {
        AssistantReply {
            content: None,
            tool_calls: vec![ToolInvocation::new(
                format!("call_{n}"),
                "calculate",
                r#"{"expression": "1 + 1"}"#,
            )],
        }
    }

    fn answer_reply(text: &str) -> AssistantReply {
        AssistantReply {
            content: Some(text.to_string()),
            tool_calls: vec![],
        }
    }

    fn agent_with(config: AgentConfig, replies: Vec<AssistantReply>, temp_dir: &TempDir) -> AnalysisAgent {
        let explorer = crate::explorer::Explorer::new(temp_dir.path()).unwrap();
        let registry = ToolRegistry::builtin(Arc::new(explorer));
        AnalysisAgent::new(config, Box::new(ScriptedClient::new(replies)), registry)
    }

    #[tokio::test]
    async fn test_immediate_answer() {
        let temp_dir = TempDir::new().unwrap();
        let mut agent = agent_with(
            AgentConfig::default(),
            vec![answer_reply("The codebase is small.")],
            &temp_dir,
        );

        let outcome = agent.run(temp_dir.path(), "describe it").await.unwrap();
        assert_eq!(
            outcome,
            AgentOutcome::Answer("The codebase is small.".to_string())
        );
        assert_eq!(agent.steps_used(), 1);
        // system + user + assistant
        assert_eq!(agent.memory().len(), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_with_exact_memory_growth() {
        let temp_dir = TempDir::new().unwrap();
        let max_steps = 4;
        let mut agent = agent_with(
            AgentConfig {
                variant: AgentVariant::React,
                max_steps,
            },
            vec![tool_reply(1)],
            &temp_dir,
        );

        let outcome = agent.run(temp_dir.path(), "never finishes").await.unwrap();
        assert!(outcome.is_exhausted());
        assert_eq!(outcome.into_text(), STEP_LIMIT_SENTINEL);
        assert_eq!(agent.steps_used(), max_steps);
        // 2 seed messages + per step: 1 assistant + 1 tool observation
        assert_eq!(agent.memory().len(), 2 + max_steps * 2);
    }

    #[tokio::test]
    async fn test_every_invocation_is_answered_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let two_calls = AssistantReply {
            content: None,
            tool_calls: vec![
                ToolInvocation::new("call_a", "calculate", r#"{"expression": "2"}"#),
                ToolInvocation::new("call_b", "no_such_tool", "{}"),
            ],
        };
        let mut agent = agent_with(
            AgentConfig::default(),
            vec![two_calls, answer_reply("done")],
            &temp_dir,
        );

        agent.run(temp_dir.path(), "go").await.unwrap();

        let memory = agent.memory();
        // system, user, assistant(2 calls), tool a, tool b, assistant answer
        assert_eq!(memory.len(), 6);
        assert_eq!(memory[3].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(memory[4].tool_call_id.as_deref(), Some("call_b"));
        // The unknown tool surfaced as an error observation, not a crash
        assert!(memory[4].content.as_ref().unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_reflexion_appends_reflection_turn() {
        let temp_dir = TempDir::new().unwrap();
        let mut agent = agent_with(
            AgentConfig {
                variant: AgentVariant::Reflexion,
                max_steps: DEFAULT_MAX_STEPS,
            },
            vec![tool_reply(1), answer_reply("done")],
            &temp_dir,
        );

        agent.run(temp_dir.path(), "go").await.unwrap();

        let memory = agent.memory();
        // system, user, assistant(call), tool, reflection user, assistant answer
        assert_eq!(memory.len(), 6);
        assert_eq!(memory[4].role, "user");
        assert_eq!(
            memory[4].content.as_deref(),
            Some(prompt::REFLECTION_INSTRUCTION)
        );
    }

    #[tokio::test]
    async fn test_empty_reply_is_a_protocol_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut agent = agent_with(
            AgentConfig::default(),
            vec![AssistantReply {
                content: None,
                tool_calls: vec![],
            }],
            &temp_dir,
        );

        let result = agent.run(temp_dir.path(), "go").await;
        assert!(matches!(result, Err(AgentError::EmptyReply)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_fatal() {
        struct FailingClient;

        #[async_trait]
        impl LlmClient for FailingClient {
            async fn complete(
                &self,
                _messages: &[ChatMessage],
                _tools: &[serde_json::Value],
            ) -> Result<AssistantReply, LlmError> {
                Err(LlmError::Connect("http://localhost:9".to_string()))
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let explorer = crate::explorer::Explorer::new(temp_dir.path()).unwrap();
        let registry = ToolRegistry::builtin(Arc::new(explorer));
        let mut agent = AnalysisAgent::new(
            AgentConfig::default(),
            Box::new(FailingClient),
            registry,
        );

        let result = agent.run(temp_dir.path(), "go").await;
        assert!(matches!(result, Err(AgentError::Llm(_))));
    }

    #[tokio::test]
    async fn test_runs_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let mut agent = agent_with(
            AgentConfig::default(),
            vec![answer_reply("first"), answer_reply("second")],
            &temp_dir,
        );

        let first = agent.run(temp_dir.path(), "one").await.unwrap();
        let len_after_first = agent.memory().len();
        let second = agent.run(temp_dir.path(), "two").await.unwrap();

        assert_eq!(first, AgentOutcome::Answer("first".to_string()));
        assert_eq!(second, AgentOutcome::Answer("second".to_string()));
        // Memory is reseeded per run, not carried over
        assert_eq!(agent.memory().len(), len_after_first);
    }
}
