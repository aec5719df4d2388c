use crate::checkpoint::{FailureKind, FailureRecord, JudgmentResult};
use crate::config::Scoring;
use crate::manifest::{Category, Manifest, Sample};
use crate::parser::Dimension;
use crate::util::{mean, round_half_even};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const OVERALL: &str = "Overall";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    Ok,
    NeedsReview,
    Failed(FailureKind),
    NotJudged,
}

impl SampleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleStatus::Ok => "ok",
            SampleStatus::NeedsReview => "needs_review",
            SampleStatus::Failed(kind) => kind.as_str(),
            SampleStatus::NotJudged => "not_judged",
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, SampleStatus::Ok | SampleStatus::NeedsReview)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedRow {
    pub index: u64,
    pub category: Category,
    pub subtask: String,
    pub status: SampleStatus,
    pub consistency: Option<f64>,
    pub reasoning: Option<f64>,
    pub quality: Option<f64>,
    pub overall: Option<f64>,
    pub rationale: String,
    pub failure_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    /// Category name or [`OVERALL`].
    pub scope: String,
    pub subtask: Option<String>,
    pub consistency: Option<f64>,
    pub reasoning: Option<f64>,
    pub quality: Option<f64>,
    pub overall: Option<f64>,
    /// Share of judged samples with every dimension at the maximum score.
    pub accuracy: Option<f64>,
    pub judged: usize,
    pub incomplete: usize,
    pub needs_review: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub detailed: Vec<DetailedRow>,
    pub summary: Vec<SummaryRow>,
}

/// Detailed rows carry raw values; summary means are rounded half-to-even.
/// Pure function of its inputs: rows are produced in manifest-index order and
/// every mean folds values in that order, so reruns are bit-identical.
pub fn aggregate(
    results: &BTreeMap<u64, JudgmentResult>,
    manifest: &Manifest,
    failures: &BTreeMap<u64, FailureRecord>,
    scoring: &Scoring,
) -> Aggregation {
    let mut samples: Vec<&Sample> = manifest.samples.iter().collect();
    samples.sort_by_key(|s| s.index);

    let detailed: Vec<DetailedRow> = samples
        .iter()
        .map(|s| detailed_row(s, results.get(&s.index), failures.get(&s.index)))
        .collect();

    let mut summary = Vec::new();
    for category in Category::ALL {
        let in_category: Vec<&DetailedRow> =
            detailed.iter().filter(|r| r.category == category).collect();
        if in_category.is_empty() {
            continue;
        }
        summary.push(summary_row(category.as_str(), None, &in_category, scoring));

        if scoring.by_subtask {
            let subtasks: BTreeSet<&str> = in_category.iter().map(|r| r.subtask.as_str()).collect();
            for subtask in subtasks {
                let rows: Vec<&DetailedRow> = in_category
                    .iter()
                    .copied()
                    .filter(|r| r.subtask == subtask)
                    .collect();
                summary.push(summary_row(category.as_str(), Some(subtask), &rows, scoring));
            }
        }
    }
    let all: Vec<&DetailedRow> = detailed.iter().collect();
    summary.push(summary_row(OVERALL, None, &all, scoring));

    Aggregation { detailed, summary }
}

fn detailed_row(
    sample: &Sample,
    result: Option<&JudgmentResult>,
    failure: Option<&FailureRecord>,
) -> DetailedRow {
    match result {
        Some(r) => DetailedRow {
            index: sample.index,
            category: sample.category,
            subtask: sample.subtask.clone(),
            status: if r.needs_review {
                SampleStatus::NeedsReview
            } else {
                SampleStatus::Ok
            },
            consistency: r.consistency,
            reasoning: r.reasoning,
            quality: r.quality,
            overall: r.overall,
            rationale: r.rationale.clone(),
            failure_reason: r.issues.join("; "),
        },
        None => DetailedRow {
            index: sample.index,
            category: sample.category,
            subtask: sample.subtask.clone(),
            status: failure
                .map(|f| SampleStatus::Failed(f.kind))
                .unwrap_or(SampleStatus::NotJudged),
            consistency: None,
            reasoning: None,
            quality: None,
            overall: None,
            rationale: String::new(),
            failure_reason: failure.map(|f| f.message.clone()).unwrap_or_default(),
        },
    }
}

fn summary_row(
    scope: &str,
    subtask: Option<&str>,
    rows: &[&DetailedRow],
    scoring: &Scoring,
) -> SummaryRow {
    let complete: Vec<&DetailedRow> = rows.iter().copied().filter(|r| r.status.is_complete()).collect();
    let column = |pick: &dyn Fn(&DetailedRow) -> Option<f64>| -> Option<f64> {
        let values: Vec<f64> = complete.iter().filter_map(|r| pick(*r)).collect();
        mean(&values).map(|m| round_half_even(m, scoring.decimals))
    };

    let perfect = complete
        .iter()
        .filter(|r| {
            Dimension::ALL
                .iter()
                .all(|d| dim_of(r, *d) == Some(scoring.max_score))
        })
        .count();
    let accuracy = if complete.is_empty() {
        None
    } else {
        Some(round_half_even(
            perfect as f64 / complete.len() as f64,
            scoring.decimals,
        ))
    };

    SummaryRow {
        scope: scope.to_string(),
        subtask: subtask.map(str::to_string),
        consistency: column(&|r: &DetailedRow| r.consistency),
        reasoning: column(&|r: &DetailedRow| r.reasoning),
        quality: column(&|r: &DetailedRow| r.quality),
        overall: column(&|r: &DetailedRow| r.overall),
        accuracy,
        judged: complete.len(),
        incomplete: rows.len() - complete.len(),
        needs_review: complete
            .iter()
            .filter(|r| r.status == SampleStatus::NeedsReview)
            .count(),
    }
}

fn dim_of(r: &DetailedRow, dim: Dimension) -> Option<f64> {
    match dim {
        Dimension::Consistency => r.consistency,
        Dimension::Reasoning => r.reasoning,
        Dimension::Quality => r.quality,
    }
}
