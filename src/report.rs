use crate::aggregate::{Aggregation, DetailedRow, SummaryRow};
use crate::util::{ensure_dir, round_half_even};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

pub const DETAILED_HEADER: [&str; 10] = [
    "index",
    "category",
    "subtask",
    "status",
    "consistency",
    "reasoning",
    "quality",
    "overall",
    "rationale",
    "failure_reason",
];

pub const SUMMARY_HEADER: [&str; 10] = [
    "scope",
    "subtask",
    "consistency",
    "reasoning",
    "quality",
    "overall",
    "accuracy",
    "judged",
    "incomplete",
    "needs_review",
];

/// JSON form of the summary report.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport<'a> {
    pub language: &'a str,
    pub model: &'a str,
    pub generated_at: String,
    pub total_samples: usize,
    pub rows: &'a [SummaryRow],
}

pub fn fmt_score(v: Option<f64>, decimals: u32) -> String {
    match v {
        Some(x) => format!("{:.*}", decimals as usize, round_half_even(x, decimals)),
        None => String::new(),
    }
}

fn detailed_record(r: &DetailedRow, decimals: u32) -> [String; 10] {
    [
        r.index.to_string(),
        r.category.to_string(),
        r.subtask.clone(),
        r.status.as_str().to_string(),
        fmt_score(r.consistency, decimals),
        fmt_score(r.reasoning, decimals),
        fmt_score(r.quality, decimals),
        fmt_score(r.overall, decimals),
        r.rationale.clone(),
        r.failure_reason.clone(),
    ]
}

fn summary_record(r: &SummaryRow, decimals: u32) -> [String; 10] {
    [
        r.scope.clone(),
        r.subtask.clone().unwrap_or_default(),
        fmt_score(r.consistency, decimals),
        fmt_score(r.reasoning, decimals),
        fmt_score(r.quality, decimals),
        fmt_score(r.overall, decimals),
        fmt_score(r.accuracy, decimals),
        r.judged.to_string(),
        r.incomplete.to_string(),
        r.needs_review.to_string(),
    ]
}

pub fn write_detailed_csv(path: &Path, agg: &Aggregation, decimals: u32) -> Result<()> {
    write_csv(
        path,
        &DETAILED_HEADER,
        agg.detailed.iter().map(|r| detailed_record(r, decimals)),
    )
}

pub fn write_summary_csv(path: &Path, agg: &Aggregation, decimals: u32) -> Result<()> {
    write_csv(
        path,
        &SUMMARY_HEADER,
        agg.summary.iter().map(|r| summary_record(r, decimals)),
    )
}

pub fn write_summary_json(path: &Path, report: &SummaryReport<'_>) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("writing summary: {}", path.display()))
}

fn write_csv<const N: usize>(
    path: &Path,
    header: &[&str; N],
    rows: impl Iterator<Item = [String; N]>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("creating report: {}", path.display()))?;
    w.write_record(header)?;
    for row in rows {
        w.write_record(&row)?;
    }
    w.flush()
        .with_context(|| format!("flushing report: {}", path.display()))?;
    Ok(())
}
