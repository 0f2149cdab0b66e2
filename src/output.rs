//! CLI output formatting for intake, planning, and batch runs.
//!
//! # Information-First Display
//!
//! Output is **image-centric**. Every image leads with its positional index and
//! name; sizes, format, and outcome follow as indented context lines. Sizes are
//! always human-readable ([`format_bytes`]), and reductions are shown next to
//! their quality class so a batch reads as a before/after inventory.
//!
//! # Output Format
//!
//! ## Plan
//!
//! ```text
//! Plan (2 images)
//! 001 holiday.jpg (4000x3000)
//!     2.4 MB → 200 KB (8.1% of original)
//!     Aggressive: very small target, expect heavy quality loss
//! 002 icon.png
//!     12 KB → 200 KB (1666.7% of original)
//!     Not compressible: target is not below the original, skipped
//!
//! Recommended target: 130 KB
//! ```
//!
//! ## Run
//!
//! ```text
//! 001 holiday.jpg
//!     2.4 MB → 198.31 KB (91.9% smaller, excellent)
//!     JPEG 1600x1200, quality 0.42, resize
//! 002 icon.png
//!     Error occurred: Target size 204800 bytes is too close to the original 12288 bytes
//!
//! Completed 1 of 2 images, 1 failed
//! Total: 2.41 MB → 198.31 KB (92% smaller)
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::batch::{Advisory, BatchEvent, BatchPlan};
use crate::intake::{Intake, Tool};
use crate::types::{CompressionStatus, ResultSummary, Severity};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Human-readable byte count with binary units and at most two decimals.
///
/// ```
/// # use imgfit::output::format_bytes;
/// assert_eq!(format_bytes(0), "0 Bytes");
/// assert_eq!(format_bytes(512), "512 Bytes");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(2 * 1024 * 1024), "2 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut unit = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1024.0 && unit < UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }
    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

/// Display text for a result status.
pub fn status_text(status: CompressionStatus) -> &'static str {
    match status {
        CompressionStatus::Pending => "Ready to compress",
        CompressionStatus::Processing => "Compressing...",
        CompressionStatus::Completed => "Completed",
        CompressionStatus::Error => "Error occurred",
    }
}

/// Message prefix for a [`Severity`].
pub fn severity_prefix(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => status_text(CompressionStatus::Error),
        Severity::Warning => "Warning",
        Severity::Info => "Note",
    }
}

/// Display class for a reduction ratio in `[0, 1]`.
pub fn quality_class(reduction_ratio: f64) -> &'static str {
    if reduction_ratio >= 0.5 {
        "excellent"
    } else if reduction_ratio >= 0.25 {
        "good"
    } else {
        "fair"
    }
}

fn reduction_text(ratio: f64) -> String {
    if ratio >= 0.0 {
        format!("{:.1}% smaller, {}", ratio * 100.0, quality_class(ratio))
    } else {
        format!("{:.1}% larger", -ratio * 100.0)
    }
}

fn advisory_text(advisory: Advisory) -> &'static str {
    match advisory {
        Advisory::NotCompressible => "Not compressible: target is not below the original, skipped",
        Advisory::Aggressive => "Aggressive: very small target, expect heavy quality loss",
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "image" } else { "images" }
}

// ============================================================================
// Intake
// ============================================================================

/// Format the admitted selection and any skipped-file warning.
pub fn format_intake(intake: &Intake, tool: Tool) -> Vec<String> {
    let mut lines = vec![format!(
        "Selected {} {}",
        intake.accepted.len(),
        plural(intake.accepted.len())
    )];
    if let Some(warning) = intake.warning(tool) {
        lines.push(format!("{}: {warning}", severity_prefix(Severity::Warning)));
    }
    lines
}

pub fn print_intake(intake: &Intake, tool: Tool) {
    for line in format_intake(intake, tool) {
        println!("{}", line);
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Format planned targets with their advisories.
pub fn format_plan(plan: &BatchPlan, recommended: Option<u64>) -> Vec<String> {
    let mut lines = vec![format!(
        "Plan ({} {})",
        plan.targets.len(),
        plural(plan.targets.len())
    )];
    for (i, planned) in plan.targets.iter().enumerate() {
        match planned.dimensions {
            Some(d) => lines.push(format!(
                "{} {} ({}x{})",
                format_index(i + 1),
                planned.name,
                d.width,
                d.height
            )),
            None => lines.push(format!("{} {}", format_index(i + 1), planned.name)),
        }
        lines.push(format!(
            "    {} \u{2192} {} ({:.1}% of original)",
            format_bytes(planned.original_size),
            format_bytes(planned.target_size),
            planned.ratio() * 100.0
        ));
        if let Some(advisory) = planned.advisory {
            lines.push(format!("    {}", advisory_text(advisory)));
        }
    }
    if let Some(bytes) = recommended {
        lines.push(String::new());
        lines.push(format!("Recommended target: {}", format_bytes(bytes)));
    }
    lines
}

pub fn print_plan(plan: &BatchPlan, recommended: Option<u64>) {
    for line in format_plan(plan, recommended) {
        println!("{}", line);
    }
}

// ============================================================================
// Run
// ============================================================================

/// Context lines for one finished image.
fn result_lines(summary: &ResultSummary) -> Vec<String> {
    if let Some(failure) = &summary.failure {
        return vec![format!(
            "    {}: {}",
            severity_prefix(failure.kind.severity()),
            failure.message
        )];
    }
    if summary.status != CompressionStatus::Completed {
        return vec![format!("    {}", status_text(summary.status))];
    }

    let mut lines = vec![format!(
        "    {} \u{2192} {} ({})",
        format_bytes(summary.original_size),
        format_bytes(summary.size),
        reduction_text(summary.reduction_ratio)
    )];

    let mut detail = Vec::new();
    if let Some(format) = summary.format.and_then(crate::format::OutputFormat::from_mime) {
        match summary.dimensions {
            Some(d) => detail.push(format!("{format} {}x{}", d.width, d.height)),
            None => detail.push(format.to_string()),
        }
    }
    match summary.quality {
        Some(q) => detail.push(format!("quality {q:.2}")),
        None => detail.push("original bytes".to_string()),
    }
    if let Some(strategy) = summary.strategy {
        detail.push(format!("{strategy:?}").to_lowercase());
    }
    lines.push(format!("    {}", detail.join(", ")));

    if let Some(target) = summary.target
        && !summary.within_tolerance
    {
        lines.push(format!(
            "    {}: missed target {} by {}",
            severity_prefix(Severity::Warning),
            format_bytes(target),
            format_bytes(summary.size.abs_diff(target))
        ));
    }
    lines
}

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::ImageStarted { index, name } => {
            vec![format!("{} {}", format_index(index + 1), name)]
        }
        BatchEvent::ImageFinished { summary, .. } => result_lines(summary),
    }
}

/// Format end-of-run totals.
pub fn format_summary(summaries: &[ResultSummary], cancelled: bool) -> Vec<String> {
    let count = |status: CompressionStatus| summaries.iter().filter(|s| s.status == status).count();
    let completed = count(CompressionStatus::Completed);
    let failed = count(CompressionStatus::Error);
    let pending = count(CompressionStatus::Pending);

    let mut lines = vec![String::new()];
    let mut headline = format!(
        "Completed {} of {} {}",
        completed,
        summaries.len(),
        plural(summaries.len())
    );
    if failed > 0 {
        headline.push_str(&format!(", {failed} failed"));
    }
    lines.push(headline);

    let done: Vec<&ResultSummary> = summaries
        .iter()
        .filter(|s| s.status == CompressionStatus::Completed)
        .collect();
    if !done.is_empty() {
        let before: u64 = done.iter().map(|s| s.original_size).sum();
        let after: u64 = done.iter().map(|s| s.size).sum();
        let saved = if before == 0 {
            0.0
        } else {
            (before as f64 - after as f64) / before as f64
        };
        lines.push(format!(
            "Total: {} \u{2192} {} ({:.0}% smaller)",
            format_bytes(before),
            format_bytes(after),
            saved * 100.0
        ));
    }
    if cancelled {
        lines.push(format!(
            "Cancelled: {} {} left pending",
            pending,
            plural(pending)
        ));
    }
    lines
}

pub fn print_summary(summaries: &[ResultSummary], cancelled: bool) {
    for line in format_summary(summaries, cancelled) {
        println!("{}", line);
    }
}
