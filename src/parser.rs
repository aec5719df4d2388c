//! Best-effort extraction of scores from free-form judge output.
//!
//! Every field is extracted on its own. A field that cannot be read becomes
//! `None` and adds an entry to `issues`; the response only fails as a whole
//! when none of the three scores is present.

use crate::config::Scoring;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Consistency,
    Reasoning,
    Quality,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [
        Dimension::Consistency,
        Dimension::Reasoning,
        Dimension::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Consistency => "consistency",
            Dimension::Reasoning => "reasoning",
            Dimension::Quality => "quality",
        }
    }

    fn json_keys(&self) -> &'static [&'static str] {
        match self {
            Dimension::Consistency => &["consistency", "consistency_score"],
            Dimension::Reasoning => &["reasoning", "reasoning_score", "instruction_reasoning"],
            Dimension::Quality => &["quality", "quality_score", "visual_quality", "plausibility"],
        }
    }

    fn line_regex(&self) -> &'static Regex {
        match self {
            Dimension::Consistency => &CONSISTENCY_RE,
            Dimension::Reasoning => &REASONING_RE,
            Dimension::Quality => &QUALITY_RE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedJudgment {
    pub consistency: Option<f64>,
    pub reasoning: Option<f64>,
    pub quality: Option<f64>,
    pub rationale: Option<String>,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl ParsedJudgment {
    pub fn needs_review(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn score(&self, dim: Dimension) -> Option<f64> {
        match dim {
            Dimension::Consistency => self.consistency,
            Dimension::Reasoning => self.reasoning,
            Dimension::Quality => self.quality,
        }
    }

    fn set_score(&mut self, dim: Dimension, v: Option<f64>) {
        match dim {
            Dimension::Consistency => self.consistency = v,
            Dimension::Reasoning => self.reasoning = v,
            Dimension::Quality => self.quality = v,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("no score fields found in judge response ({} chars)", raw_len)]
pub struct ParseFailure {
    pub raw_len: usize,
}

// Labels may carry markdown emphasis, list bullets and a trailing "score".
// Values may be written "4", "4.5" or "4/5".
const LABEL_PREFIX: &str = r"(?im)^[\s>#*\-]*\**\s*";
const VALUE_SUFFIX: &str = r"(?:\s+score)?\s*\**\s*[:=]\s*\**\s*(-?\d+(?:\.\d+)?)(?:\s*/\s*\d+(?:\.\d+)?)?";

static CONSISTENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| label_regex("consistency"));
static REASONING_RE: LazyLock<Regex> =
    LazyLock::new(|| label_regex(r"(?:instruction\s+)?reasoning"));
static QUALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| label_regex(r"(?:visual\s+|image\s+)?quality"));
static RATIONALE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s>#*\-]*\**\s*(?:rationale|explanation|reason)\s*\**\s*[:=]\s*\**\s*(.*)$")
        .expect("rationale regex")
});

fn label_regex(label: &str) -> Regex {
    Regex::new(&format!("{LABEL_PREFIX}{label}{VALUE_SUFFIX}")).expect("label regex")
}

pub fn parse(raw: &str, scoring: &Scoring) -> Result<ParsedJudgment, ParseFailure> {
    // NFKC folds full-width colons and digits that some judges emit for CJK prompts.
    let normalized: String = raw.nfkc().collect();
    let body = strip_code_fence(&normalized);

    let mut parsed = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => from_json(&map),
        _ => from_lines(body),
    };

    if Dimension::ALL.iter().all(|d| parsed.score(*d).is_none()) {
        return Err(ParseFailure { raw_len: raw.len() });
    }

    for dim in Dimension::ALL {
        match parsed.score(dim) {
            None => parsed.issues.push(format!("missing {} score", dim.as_str())),
            Some(v) => {
                // Unlike f64::clamp this cannot panic on an inverted range.
                let clamped = v.max(scoring.min_score).min(scoring.max_score);
                if clamped != v {
                    parsed.issues.push(format!(
                        "{} score {v} outside [{}, {}]; clamped to {clamped}",
                        dim.as_str(),
                        scoring.min_score,
                        scoring.max_score
                    ));
                    parsed.set_score(dim, Some(clamped));
                }
            }
        }
    }
    if parsed.rationale.is_none() {
        parsed.issues.push("missing rationale".into());
    }
    Ok(parsed)
}

fn from_json(map: &serde_json::Map<String, Value>) -> ParsedJudgment {
    let lookup = |keys: &[&str]| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| keys.iter().any(|want| k.eq_ignore_ascii_case(want)))
            .map(|(_, v)| v)
    };

    let mut parsed = ParsedJudgment::default();
    for dim in Dimension::ALL {
        // "NaN" and "inf" parse as f64 but are not scores.
        let v = lookup(dim.json_keys())
            .and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().split('/').next()?.trim().parse().ok(),
                _ => None,
            })
            .filter(|v: &f64| v.is_finite());
        parsed.set_score(dim, v);
    }
    parsed.rationale = lookup(&["rationale", "explanation", "reason"])
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    parsed
}

fn from_lines(body: &str) -> ParsedJudgment {
    let mut parsed = ParsedJudgment::default();
    for dim in Dimension::ALL {
        let v = dim
            .line_regex()
            .captures(body)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|v| v.is_finite());
        parsed.set_score(dim, v);
    }
    parsed.rationale = extract_rationale(body);
    parsed
}

/// The rationale runs from its label until the next score label or the end.
fn extract_rationale(body: &str) -> Option<String> {
    let mut lines = body.lines();
    let mut collected = Vec::new();
    for line in lines.by_ref() {
        if let Some(c) = RATIONALE_RE.captures(line) {
            collected.push(c.get(1).map(|m| m.as_str()).unwrap_or_default().trim());
            break;
        }
    }
    if collected.is_empty() {
        return None;
    }
    for line in lines {
        if Dimension::ALL.iter().any(|d| d.line_regex().is_match(line)) {
            break;
        }
        collected.push(line.trim());
    }
    let text = collected
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Some(text.trim_matches('*').trim().to_string()).filter(|s| !s.is_empty())
}

/// Removes one surrounding ``` fence (with optional language tag).
pub fn strip_code_fence(text: &str) -> &str {
    let stripped = text.trim();
    let Some(rest) = stripped.strip_prefix("```") else {
        return stripped;
    };
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
