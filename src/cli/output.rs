//! CLI output formatting

use crate::{
    core::state::{PipelineSummary, StepState},
    execution::RegistrationEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a step state for display
pub fn format_step_state(state: StepState) -> String {
    match state {
        StepState::Unconfigured => style("UNCONFIGURED").red().to_string(),
        StepState::Configured => style("CONFIGURED").yellow().to_string(),
        StepState::Performed => style("PERFORMED").green().to_string(),
    }
}

/// Format a working-directory summary for display
pub fn format_summary(summary: &PipelineSummary) -> String {
    let mut lines = Vec::new();
    let icon = if summary.is_complete() { CHECK } else { INFO };
    lines.push(format!(
        "{} {} ({}/{} steps performed, {})",
        icon,
        style(summary.workdir.display()).bold(),
        summary.performed_steps(),
        summary.total_steps(),
        style(format!("{:.0}%", summary.progress() * 100.0)).cyan()
    ));

    for (label, image) in [("fixed", &summary.fixed), ("moving", &summary.moving)] {
        match image {
            Some(path) => lines.push(format!("  {}: {}", label, style(path.display()).dim())),
            None => lines.push(format!("  {}{}: {}", WARN, label, style("missing").yellow())),
        }
    }

    for (index, step) in summary.steps.iter().enumerate() {
        lines.push(format!(
            "  {:>2}. {} {}",
            index,
            style(&step.name).cyan(),
            format_step_state(step.state)
        ));
    }
    lines.join("\n")
}

/// Format a registration event for display
pub fn format_registration_event(event: &RegistrationEvent) -> String {
    match event {
        RegistrationEvent::PipelineStarted {
            workdir,
            total_steps,
        } => format!(
            "{} Registering in {} ({} steps)",
            ROCKET,
            style(workdir.display()).bold(),
            total_steps
        ),
        RegistrationEvent::StepStarted { step, index, total } => format!(
            "{} {} ({}/{})",
            SPINNER,
            style(step).cyan(),
            index + 1,
            total
        ),
        RegistrationEvent::StepSkipped { step } => {
            format!("{} {} {}", SKIP, style(step).dim(), style("already performed").dim())
        }
        RegistrationEvent::StepCompleted { step, .. } => {
            format!("{} {}", CHECK, style(step).green())
        }
        RegistrationEvent::StepFailed { step, error } => {
            format!("{} {}: {}", CROSS, style(step).red(), style(error).dim())
        }
        RegistrationEvent::TransformApplied { step, kind, invert } => format!(
            "{} Applied {}{} to {}",
            CHECK,
            style(step).cyan(),
            if *invert { " (inverse)" } else { "" },
            kind
        ),
        RegistrationEvent::PipelineCompleted {
            success,
            performed,
            skipped,
        } => {
            let status = if *success {
                format!("{} completed", style("successfully").green())
            } else {
                style("failed").red().to_string()
            };
            format!(
                "{} Registration {} ({} performed, {} skipped)",
                INFO, status, performed, skipped
            )
        }
    }
}

/// Format engine output with truncation, keeping the last lines
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let tail = lines[lines.len() - max_lines..].join("\n");
        format!(
            "{}... ({} earlier lines)\n{}",
            style("[truncated]").dim(),
            lines.len() - max_lines,
            tail
        )
    }
}
