//! Markdown report rendering and saving.
//!
//! Wraps the agent's final answer with a metadata header and writes it to a
//! timestamped file under the output directory.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Metadata about one analysis run.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    /// Directory that was analysed.
    pub directory: String,
    /// Model used for the run.
    pub model: String,
    /// Agent variant ("react" or "reflexion").
    pub agent_variant: String,
    /// Model calls made.
    pub steps_used: usize,
    /// Step budget for the run.
    pub max_steps: usize,
    /// When the analysis finished.
    pub analysis_date: DateTime<Utc>,
    /// Wall-clock duration in seconds.
    pub duration_seconds: f64,
    /// Whether the run ended on the step budget instead of an answer.
    pub budget_exhausted: bool,
}

/// Render the complete report: title, metadata, analysis body, footer.
pub fn render_report(metadata: &RunMetadata, analysis: &str) -> String {
    let mut output = String::new();

    output.push_str("# Codebase Analysis\n\n");
    output.push_str(&metadata_section(metadata));
    output.push_str("## Analysis\n\n");
    output.push_str(analysis.trim_end());
    output.push_str("\n\n");
    output.push_str(&footer(metadata));

    output
}

fn metadata_section(metadata: &RunMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Directory:** `{}`\n", metadata.directory));
    section.push_str(&format!("- **Model:** `{}`\n", metadata.model));
    section.push_str(&format!("- **Agent:** {}\n", metadata.agent_variant));
    section.push_str(&format!(
        "- **Steps Used:** {} of {}\n",
        metadata.steps_used, metadata.max_steps
    ));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    if metadata.budget_exhausted {
        section.push_str("- **Outcome:** step budget exhausted\n");
    }
    section.push('\n');

    section
}

fn footer(metadata: &RunMetadata) -> String {
    format!(
        "---\n\n*Generated by codescribe v{} using `{}`*\n",
        env!("CARGO_PKG_VERSION"),
        metadata.model
    )
}

/// Write the report to `<output_dir>/<timestamp>-<model>.md` and return the
/// path. The output directory is created if needed.
pub fn save_report(
    output_dir: &Path,
    model: &str,
    content: &str,
    timestamp: DateTime<Utc>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            output_dir.display()
        )
    })?;

    let filename = format!(
        "{}-{}.md",
        timestamp.format("%Y%m%d-%H%M%S"),
        sanitize_model_name(model)
    );
    let path = output_dir.join(filename);

    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(path)
}

/// Model names may contain path separators (e.g. "openai/gpt-4o-mini");
/// flatten anything unsafe for a filename.
fn sanitize_model_name(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
