//! LLM agent: prompt assembly, tool registry, and the bounded-step control
//! loop.

pub mod agent_loop;
pub mod prompt;
pub mod tools;

pub use agent_loop::{AgentConfig, AgentOutcome, AgentVariant, AnalysisAgent};
pub use tools::ToolRegistry;
