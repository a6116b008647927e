use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::*;
use indicatif::HumanBytes;
use log_archiver_core::RunStatistics;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const TOOL_NAME: &str = "log-archiver";
const SUMMARY_ERROR_LIMIT: usize = 5;
const MB: f64 = 1024.0 * 1024.0;

/// Host name for the run report, `unknown-host` if the OS will not say.
pub fn hostname() -> String {
    ::hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "unknown-host".to_string())
}

fn ratio_text(stats: &RunStatistics) -> String {
    match stats.compression_ratio() {
        Some(ratio) => format!("{:.1}%", ratio),
        None => "n/a".to_string(),
    }
}

/// The first few errors, then a count of the rest.
pub fn error_preview(errors: &[String], limit: usize) -> Vec<String> {
    let mut lines: Vec<String> = errors.iter().take(limit).cloned().collect();
    if errors.len() > limit {
        lines.push(format!("... and {} more errors", errors.len() - limit));
    }
    lines
}

pub fn print_summary(stats: &RunStatistics) {
    println!();
    println!("{}", "Archive summary".bold());
    println!(
        "  Files processed: {}, archived: {}, originals deleted: {}",
        stats.files_processed.to_string().cyan(),
        stats.files_archived.to_string().green(),
        stats.files_deleted.to_string().yellow(),
    );
    println!(
        "  Containers created: {}, old archives removed: {}",
        stats.containers_created, stats.containers_removed
    );
    println!(
        "  Size: {} -> {} (saved {})",
        HumanBytes(stats.total_size_before),
        HumanBytes(stats.total_size_after),
        ratio_text(stats).green(),
    );
    println!(
        "  Duration: {}",
        format!("{:.2}s", stats.duration().as_secs_f64()).green()
    );

    if stats.has_errors() {
        println!(
            "  {} {}",
            "Errors:".red().bold(),
            stats.errors.len().to_string().red()
        );
        for line in error_preview(&stats.errors, SUMMARY_ERROR_LIMIT) {
            println!("    {}", line);
        }
    }
}

pub fn report_file_name(started_at: &DateTime<Local>) -> String {
    format!(
        "compression_report_{}.txt",
        started_at.format("%Y%m%d_%H%M%S")
    )
}

pub fn render_report(stats: &RunStatistics, host: &str) -> String {
    let mut out = String::new();
    let end = stats.finished_at.unwrap_or(stats.started_at);

    let _ = writeln!(out, "{} run report", TOOL_NAME);
    let _ = writeln!(out, "Host: {}", host);
    let _ = writeln!(out, "Started: {}", stats.started_at.to_rfc3339());
    let _ = writeln!(out, "Finished: {}", end.to_rfc3339());
    let _ = writeln!(out, "Duration: {:.2}s", stats.duration().as_secs_f64());
    let _ = writeln!(out, "Workers: {}", stats.workers);
    let _ = writeln!(out, "Groups: {}", stats.group_count);
    let _ = writeln!(out);
    let _ = writeln!(out, "Files processed: {}", stats.files_processed);
    let _ = writeln!(out, "Files archived: {}", stats.files_archived);
    let _ = writeln!(out, "Originals deleted: {}", stats.files_deleted);
    let _ = writeln!(out, "Containers created: {}", stats.containers_created);
    let _ = writeln!(out, "Old archives removed: {}", stats.containers_removed);
    let _ = writeln!(
        out,
        "Size before: {:.2} MB",
        stats.total_size_before as f64 / MB
    );
    let _ = writeln!(
        out,
        "Size after: {:.2} MB",
        stats.total_size_after as f64 / MB
    );
    let _ = writeln!(out, "Compression ratio: {}", ratio_text(stats));
    let _ = writeln!(out, "Throughput: {:.2} MB/s", stats.throughput_mb_per_sec());
    let _ = writeln!(out);
    if stats.errors.is_empty() {
        let _ = writeln!(out, "Errors: none");
    } else {
        let _ = writeln!(out, "Errors ({}):", stats.errors.len());
        for err in &stats.errors {
            let _ = writeln!(out, "  - {}", err);
        }
    }
    out
}

/// Write the run report into `dir` and return its path.
pub fn write_run_report(stats: &RunStatistics, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating report directory {}", dir.display()))?;
    let path = dir.join(report_file_name(&stats.started_at));
    fs::write(&path, render_report(stats, &hostname()))
        .with_context(|| format!("writing report {}", path.display()))?;
    Ok(path)
}
