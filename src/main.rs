//! Codescribe - LLM-powered codebase analyst
//!
//! A CLI tool that points an LLM agent at a local directory, lets it
//! explore the code through filesystem tools, and writes a Markdown
//! analysis report.
//!
//! Exit codes:
//!   0 - Success (final answer produced)
//!   1 - Runtime error (connection, config, protocol failure, etc.)
//!   2 - Step budget exhausted before a final answer

mod agent;
mod cli;
mod config;
mod evaluator;
mod explorer;
mod ignore;
mod llm;
mod report;

use agent::{AgentConfig, AnalysisAgent, ToolRegistry};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use cli::Args;
use config::Config;
use explorer::{Explorer, FindOptions};
use indicatif::{ProgressBar, ProgressStyle};
use llm::openai::{LlmSettings, OpenAiClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    // Parse and validate command-line arguments
    let args = Args::parse_args();
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        match handle_init_config() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("❌ Error: {:#}", e);
                std::process::exit(1);
            }
        }
    }

    init_logging(&args);
    info!("Codescribe v{}", env!("CARGO_PKG_VERSION"));

    match run_analysis(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .codescribe.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".codescribe.toml");

    if path.exists() {
        bail!(".codescribe.toml already exists. Remove it first or edit it manually.");
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .codescribe.toml")?;

    println!("✅ Created .codescribe.toml with default settings.");
    println!("   Edit it to customize model, agent variant, step budget, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete analysis workflow. Returns the exit code (0 or 2).
async fn run_analysis(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration and apply CLI precedence
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let Some(directory) = args.directory.clone() else {
        bail!("--directory is required");
    };
    let explorer = Arc::new(
        Explorer::new(&directory).context("Failed to open the codebase directory")?,
    );
    info!("Analysing {}", explorer.root().display());

    // Handle --dry-run: enumerate files and exit
    if args.dry_run {
        return handle_dry_run(&explorer);
    }

    let prompt_text = read_prompt(&args)?;

    // Build the tool registry and the model client
    let registry = ToolRegistry::builtin(explorer.clone());
    let settings = LlmSettings {
        base_url: config.model.base_url.clone(),
        api_key: args.api_key.clone().unwrap_or_default(),
        model: config.model.name.clone(),
        temperature: config.model.temperature,
        timeout_seconds: config.model.timeout_seconds,
    };
    let client = OpenAiClient::new(settings)?;

    let agent_config = AgentConfig {
        variant: config.agent.variant,
        max_steps: config.agent.max_steps,
    };

    println!("🤖 Model: {} via {}", config.model.name, config.model.base_url);
    println!(
        "   Agent: {} | Step budget: {}",
        agent_config.variant.as_str(),
        agent_config.max_steps
    );
    println!("\n🔬 Running codebase analysis...\n");

    let spinner = (!args.quiet).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message("exploring the codebase...");
        pb
    });

    let mut agent = AnalysisAgent::new(agent_config.clone(), Box::new(client), registry);
    let outcome = agent.run(explorer.root(), &prompt_text).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let outcome = outcome.context("Agent run failed")?;

    // Build and save the report
    let duration = start_time.elapsed().as_secs_f64();
    let exhausted = outcome.is_exhausted();
    let steps_used = agent.steps_used();

    let metadata = report::RunMetadata {
        directory: explorer.root().display().to_string(),
        model: config.model.name.clone(),
        agent_variant: agent_config.variant.as_str().to_string(),
        steps_used,
        max_steps: agent_config.max_steps,
        analysis_date: Utc::now(),
        duration_seconds: duration,
        budget_exhausted: exhausted,
    };

    let content = report::render_report(&metadata, &outcome.into_text());
    let output_dir = PathBuf::from(&config.general.output_dir);
    let report_path =
        report::save_report(&output_dir, &config.model.name, &content, metadata.analysis_date)?;

    println!("📊 Analysis summary:");
    println!("   Steps used: {} of {}", steps_used, agent_config.max_steps);
    println!("   Duration: {:.1}s", duration);
    println!("\n✅ Report saved to: {}", report_path.display());

    if exhausted {
        eprintln!(
            "\n⛔ Step budget exhausted before the model produced a final answer (exit code 2)."
        );
        return Ok(2);
    }

    Ok(0)
}

/// Handle --dry-run: list the files the agent could see, then exit.
fn handle_dry_run(explorer: &Explorer) -> Result<i32> {
    println!("\n🔍 Dry run: listing files the agent could see (no model calls)...\n");

    let entries = explorer.find_files(&FindOptions::default())?;

    if entries.is_empty() {
        println!("   No visible files found.");
    } else {
        for entry in &entries {
            println!(
                "   📄 {} ({} bytes)",
                entry.relative.display(),
                entry.size.unwrap_or(0)
            );
        }
        println!("\n   Total: {} files", entries.len());
    }

    println!("\n✅ Dry run complete. No model calls were made.");
    Ok(0)
}

/// Resolve the analysis prompt from --prompt or --prompt-file.
fn read_prompt(args: &Args) -> Result<String> {
    if let Some(ref prompt) = args.prompt {
        let trimmed = prompt.trim();
        if trimmed.is_empty() {
            bail!("The analysis prompt is empty");
        }
        return Ok(trimmed.to_string());
    }

    let Some(ref path) = args.prompt_file else {
        bail!("Either --prompt or --prompt-file is required");
    };
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

    // Prompt files occasionally arrive in legacy encodings; decode lossily
    // rather than refusing them.
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(
                "Prompt file {} is not valid UTF-8; decoding lossily",
                path.display()
            );
            String::from_utf8_lossy(e.as_bytes()).to_string()
        }
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        bail!("Prompt file is empty: {}", path.display());
    }
    Ok(trimmed.to_string())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .codescribe.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
