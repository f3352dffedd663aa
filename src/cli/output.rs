//! CLI output formatting

use crate::core::failure::Failure;
use crate::core::step::PipelineStep;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format a failure for the final report
pub fn format_failure(failure: &Failure) -> String {
    let (icon, kind) = if failure.soft {
        (WARN, style("SOFT FAILURE").yellow())
    } else {
        (CROSS, style("FAILURE").red())
    };

    let mut line = format!(
        "{}{} {}",
        icon,
        kind,
        style(failure.to_string()).dim()
    );

    if let Some(incident) = &failure.telemetry_id {
        line.push_str(&format!(" (incident {})", style(incident).cyan()));
    }

    line
}

/// Format the `name - description` listing of modules
pub fn format_module_list(modules: &[(String, String)]) -> String {
    let width = modules.iter().map(|(name, _)| name.len()).max().unwrap_or(0);

    modules
        .iter()
        .map(|(name, description)| {
            format!(
                "  {}  {}",
                style(format!("{:width$}", name, width = width)).bold(),
                description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format the `function - module` listing of shared functions
pub fn format_shared_list(functions: &[(String, String)]) -> String {
    if functions.is_empty() {
        return format!("{}no shared functions available", INFO);
    }

    let width = functions.iter().map(|(name, _)| name.len()).max().unwrap_or(0);

    functions
        .iter()
        .map(|(function, module)| {
            format!(
                "  {}  {}",
                style(format!("{:width$}", function, width = width)).cyan(),
                style(module).dim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Command line that re-runs `steps`, one module per line
pub fn format_command_line(program: &str, global: &[String], steps: &[PipelineStep]) -> String {
    let mut lines = vec![std::iter::once(program.to_string())
        .chain(global.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")];

    for step in steps {
        let argv = step.argv().unwrap_or_default();
        let line = std::iter::once(step.designation())
            .chain(argv.iter().map(|arg| quote(arg)))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(format!("    {}", line));
    }

    lines.join(" \\\n")
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}
