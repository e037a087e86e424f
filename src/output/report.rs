//! Tables describing the collection and the work done on it.

use std::sync::Arc;

use console::style;

use crate::collection::{ModCollectionEntry, ModEvent, ModState};
use crate::install::WorkReport;

/// Human readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn styled_state(state: ModState) -> String {
    let label = state.to_string();
    match state {
        ModState::Installed => style(label).green().to_string(),
        ModState::Downloading | ModState::Extracting => style(label).cyan().to_string(),
        ModState::InstallationPending | ModState::UpdatePending => {
            style(label).yellow().to_string()
        }
        ModState::UninstallPending => style(label).dim().to_string(),
    }
}

fn retry_label(entry: &ModCollectionEntry) -> String {
    let snapshot = entry.snapshot();
    match snapshot.terminal_failure_reason {
        Some(reason) => style(format!("failed: {}", reason)).red().to_string(),
        None if snapshot.should_not_retry => style("no retry this session").red().to_string(),
        None => format!(
            "{}/{} retries",
            snapshot.retries_remaining,
            entry.default_retries()
        ),
    }
}

/// Print every entry of the collection.
pub fn print_collection<'a>(entries: impl IntoIterator<Item = &'a Arc<ModCollectionEntry>>) {
    println!();
    println!("{}", style("Mod collection:").bold());
    let mut count = 0;
    for entry in entries {
        count += 1;
        let profile = entry.profile();
        let size = entry
            .size_on_disk()
            .map(format_size)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>10}  {:<28} {:<22} {:>10}  {} subscriber(s)  {}",
            entry.id(),
            profile.name,
            styled_state(entry.state()),
            size,
            entry.subscriber_count(),
            retry_label(entry)
        );
    }
    if count == 0 {
        println!("  {}", style("(empty)").dim());
    }
}

/// Print entries in the order they would be attempted.
pub fn print_queue(entries: &[Arc<ModCollectionEntry>]) {
    println!();
    println!("{}", style("Retry queue:").bold());
    if entries.is_empty() {
        println!("  {}", style("(empty)").dim());
        return;
    }
    for (position, entry) in entries.iter().enumerate() {
        println!(
            "  {:>3}. {:>10}  {:<22} {}",
            position + 1,
            entry.id(),
            styled_state(entry.state()),
            retry_label(entry)
        );
    }
}

/// Print what a pass over the work queue did.
pub fn print_work_report(report: &WorkReport) {
    println!();
    println!("{}", style("═".repeat(50)).dim());
    println!("{}", style("Summary:").bold());
    println!("  Installed:   {}", style(report.installed.len()).green());
    println!("  Uninstalled: {}", report.uninstalled.len());
    if !report.failed.is_empty() {
        println!("  Failed:      {}", style(report.failed.len()).red());
        for (id, code) in &report.failed {
            println!("    {} {}", id, style(code).red());
        }
    }
    println!("{}", style("═".repeat(50)).dim());
}

/// Print drained mod events, oldest first.
pub fn print_events(events: &[ModEvent]) {
    for event in events {
        let outcome = match event.status {
            Some(code) => style(code.to_string()).red().to_string(),
            None => style("ok").green().to_string(),
        };
        println!(
            "  {} {:>10} {:?} {}",
            style(event.recorded_at.format("%H:%M:%S")).dim(),
            event.id,
            event.kind,
            outcome
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
