//! Command-line interface argument parsing.
//!
//! All CLI argument parsing lives here, including validation and default
//! values.

use crate::agent::AgentVariant;
use clap::Parser;
use std::path::PathBuf;

/// Codescribe - LLM-powered codebase analyst
///
/// Point it at a directory and give it an analysis prompt; an LLM agent
/// explores the codebase with filesystem tools and writes a Markdown
/// report.
///
/// Examples:
///   codescribe --directory ./my-project --prompt "Describe the architecture"
///   codescribe --directory ./my-project --prompt-file prompts/security.md
///   codescribe --directory ./my-project --prompt "..." --agent reflexion
///   codescribe --directory ./my-project --dry-run
///   codescribe --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the codebase directory to analyse
    #[arg(
        short,
        long,
        value_name = "DIR",
        required_unless_present = "init_config"
    )]
    pub directory: Option<PathBuf>,

    /// Analysis prompt text
    #[arg(short, long, value_name = "TEXT", conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// Path to a file containing the analysis prompt
    #[arg(long, value_name = "FILE")]
    pub prompt_file: Option<PathBuf>,

    /// Model to use for analysis
    ///
    /// Any model reachable through the configured OpenAI-compatible
    /// endpoint. Can also be set via CODESCRIBE_MODEL or .codescribe.toml.
    #[arg(short, long, default_value = "gpt-4o-mini", env = "CODESCRIBE_MODEL")]
    pub model: String,

    /// OpenAI-compatible API base URL
    #[arg(
        long,
        default_value = "https://api.openai.com/v1",
        env = "CODESCRIBE_BASE_URL"
    )]
    pub base_url: String,

    /// API key for the model endpoint
    #[arg(long, env = "CODESCRIBE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Agent variant driving the analysis loop
    #[arg(long, value_enum, value_name = "VARIANT")]
    pub agent: Option<AgentKind>,

    /// Maximum number of model calls before giving up
    #[arg(long, value_name = "N")]
    pub max_steps: Option<usize>,

    /// Temperature for model responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Directory reports are written to
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .codescribe.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// List the files the agent could see, without calling the model
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .codescribe.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Agent variant as selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AgentKind {
    /// Thought/Action/Observation loop
    React,
    /// ReAct with a self-critique turn after each tool round
    Reflexion,
}

impl From<AgentKind> for AgentVariant {
    fn from(kind: AgentKind) -> Self {
        match kind {
            AgentKind::React => AgentVariant::React,
            AgentKind::Reflexion => AgentVariant::Reflexion,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref directory) = self.directory {
            if !directory.exists() {
                return Err(format!("Directory does not exist: {}", directory.display()));
            }
            if !directory.is_dir() {
                return Err(format!("Not a directory: {}", directory.display()));
            }
        }

        // A prompt is needed for everything except --dry-run
        if !self.dry_run && self.prompt.is_none() && self.prompt_file.is_none() {
            return Err("Either --prompt or --prompt-file is required".to_string());
        }

        if !self.dry_run && self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(
                "An API key is required (--api-key or CODESCRIBE_API_KEY)".to_string(),
            );
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("Base URL must start with 'http://' or 'https://'".to_string());
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if let Some(max_steps) = self.max_steps {
            if max_steps == 0 {
                return Err("Max steps must be at least 1".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            directory: Some(PathBuf::from(".")),
            prompt: Some("Describe the codebase".to_string()),
            prompt_file: None,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: Some("sk-test".to_string()),
            agent: None,
            max_steps: None,
            temperature: None,
            timeout: None,
            output_dir: None,
            config: None,
            verbose: false,
            quiet: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_valid_args_pass() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_missing_prompt_fails() {
        let mut args = make_args();
        args.prompt = None;
        assert!(args.validate().is_err());

        args.dry_run = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_fails_outside_dry_run() {
        let mut args = make_args();
        args.api_key = None;
        assert!(args.validate().is_err());

        args.dry_run = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_missing_directory_fails() {
        let mut args = make_args();
        args.directory = Some(PathBuf::from("/definitely/not/a/real/path"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_temperature_range() {
        let mut args = make_args();
        args.temperature = Some(0.5);
        assert!(args.validate().is_ok());
        args.temperature = Some(1.5);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_conflicting_verbosity_flags() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_zero_max_steps_rejected() {
        let mut args = make_args();
        args.max_steps = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_agent_kind_maps_to_variant() {
        assert_eq!(AgentVariant::from(AgentKind::React), AgentVariant::React);
        assert_eq!(
            AgentVariant::from(AgentKind::Reflexion),
            AgentVariant::Reflexion
        );
    }
}
