//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use smoke_core::{DefaultRun, RemoteSummary, Snapshot, TestStatus};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print the outcome of a default run.
pub fn print_run(run: &DefaultRun, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_results(&run.local);
            print_counts("local", &run.local);
            if let Some(remote) = &run.remote {
                print_remote(remote);
            }
            print_verdict(run.is_success());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(run).unwrap_or_default());
        }
    }
}

/// Print a local snapshot on its own.
pub fn print_snapshot(snapshot: &Snapshot, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_results(snapshot);
            print_counts("local", snapshot);
            print_verdict(snapshot.is_success());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(snapshot).unwrap_or_default());
        }
    }
}

/// Print a remote summary on its own.
pub fn print_remote_run(summary: &RemoteSummary, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_remote(summary);
            print_verdict(summary.is_success());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary).unwrap_or_default());
        }
    }
}

fn print_results(snapshot: &Snapshot) {
    if snapshot.results.is_empty() {
        println!("No tests ran.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Test", "Status", "Time (ms)", "Message"]);

    for record in &snapshot.results {
        let (status, elapsed, message) = match &record.status {
            TestStatus::Passed { elapsed_ms } => (Cell::new("pass").fg(Color::Green), format!("{:.1}", elapsed_ms), String::new()),
            TestStatus::Failed { failure } => (Cell::new("fail").fg(Color::Red), String::new(), failure.message.clone()),
            TestStatus::Running => (Cell::new("running").fg(Color::Yellow), String::new(), String::new()),
        };
        table.add_row(vec![Cell::new(&record.name), status, Cell::new(elapsed), Cell::new(message)]);
    }

    println!("{table}");
}

fn print_counts(label: &str, snapshot: &Snapshot) {
    println!(
        "{}: {} total, {} passed, {} failed, {} scaffold failures",
        label.bold(),
        snapshot.total_count,
        snapshot.pass_count.to_string().green(),
        colour_count(snapshot.fail_count),
        colour_count(snapshot.scaffold_fail_count),
    );
    if snapshot.unexpected {
        println!("{}", "an unexpected condition was reported; see the smoke:unexpected log".yellow());
    }
}

fn print_remote(summary: &RemoteSummary) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Remote", "Total", "Pass", "Fail", "Scaffold fail"]);

    for log in &summary.logs {
        table.add_row(vec![
            log.id.clone(),
            log.snapshot.total_count.to_string(),
            log.snapshot.pass_count.to_string(),
            log.snapshot.fail_count.to_string(),
            log.snapshot.scaffold_fail_count.to_string(),
        ]);
    }
    table.add_row(vec![
        "all".to_string(),
        summary.total_count.to_string(),
        summary.pass_count.to_string(),
        summary.fail_count.to_string(),
        summary.scaffold_fail_count.to_string(),
    ]);

    println!("{table}");
}

fn colour_count(count: u64) -> colored::ColoredString {
    if count == 0 {
        count.to_string().normal()
    } else {
        count.to_string().red()
    }
}

fn print_verdict(success: bool) {
    if success {
        println!("{}", "✅ all tests passed".green());
    } else {
        println!("{}", "❌ there were failures".red());
    }
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}
