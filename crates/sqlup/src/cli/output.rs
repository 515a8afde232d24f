//! Console rendering for upgrade events.

use console::style;

use sqlup_core::event::{ScriptEvent, SkipReason};

pub(crate) fn banner(title: &str) {
    println!();
    println!("  {} {}", style("SQLUP").bold().cyan(), title);
    println!();
}

/// Event sink that prints one line per event.
pub(crate) fn print_event(event: ScriptEvent) {
    match event {
        ScriptEvent::Applied {
            script,
            duration_ms,
        } => println!(
            "  {} {} {}",
            style("✓").green(),
            script,
            style(format!("({} ms)", duration_ms)).dim()
        ),
        ScriptEvent::Skipped {
            script,
            reason: SkipReason::AlreadyApplied,
        } => tracing::debug!(%script, "Already applied"),
        ScriptEvent::Skipped {
            script,
            reason: SkipReason::ChecksumDrift,
        } => println!(
            "  {} {} {}",
            style("○").yellow(),
            script,
            style("changed after it was applied, skipped").yellow()
        ),
        ScriptEvent::Failed { script, error } => {
            eprintln!("  {} {}", style("✗").red(), style(&script).red());
            eprintln!("    {}", error);
        }
        ScriptEvent::Warning { message } => {
            println!("  {} {}", style("⚠").yellow(), message)
        }
    }
}
