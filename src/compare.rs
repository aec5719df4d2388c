//! Cross-language comparison of per-sample overall scores.

use crate::config::Output;
use crate::util::ensure_dir;
use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CompareOptions {
    pub root: PathBuf,
    pub langs: Vec<String>,
    pub base_lang: Option<String>,
    pub threshold: f64,
    /// Detailed report file name template, `{lang}` substituted.
    pub detailed_filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareRow {
    pub index: u64,
    pub category: Option<String>,
    pub subtask: Option<String>,
    /// One entry per language, in `langs` order.
    pub scores: Vec<Option<f64>>,
    pub score_diff: f64,
    pub score_max: f64,
    pub score_min: f64,
    pub missing_langs: Vec<String>,
    pub valid_langs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareOutcome {
    pub langs: Vec<String>,
    pub total: usize,
    pub rows: Vec<CompareRow>,
}

#[derive(Debug, Clone, Default)]
struct LangRow {
    category: Option<String>,
    subtask: Option<String>,
    overall: Option<f64>,
}

pub fn parse_langs(raw: &str) -> Result<Vec<String>> {
    let langs: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if langs.is_empty() {
        bail!("no languages provided via --langs");
    }
    Ok(langs)
}

pub fn detailed_path(opts: &CompareOptions, lang: &str) -> PathBuf {
    opts.root
        .join(lang)
        .join(Output::file_for(&opts.detailed_filename, lang))
}

/// Reads `index` and `overall` (plus `category`/`subtask` when present) from
/// one detailed report.
fn load_lang(path: &Path) -> Result<BTreeMap<u64, LangRow>> {
    if !path.exists() {
        bail!("missing file: {}", path.display());
    }
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("opening report: {}", path.display()))?;
    let headers = rdr.headers()?.clone();
    let col = |name: &str| headers.iter().position(|h| h == name);
    let (Some(index_col), Some(score_col)) = (col("index"), col("overall")) else {
        bail!("{} missing columns: index, overall", path.display());
    };
    let category_col = col("category");
    let subtask_col = col("subtask");

    let mut rows = BTreeMap::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("{}: record {}", path.display(), line + 1))?;
        let index: u64 = rec
            .get(index_col)
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| anyhow!("{}: record {} has a bad index", path.display(), line + 1))?;
        let text = |c: Option<usize>| {
            c.and_then(|c| rec.get(c))
                .map(str::to_string)
                .filter(|s| !s.is_empty())
        };
        rows.insert(
            index,
            LangRow {
                category: text(category_col),
                subtask: text(subtask_col),
                overall: rec.get(score_col).and_then(|s| s.trim().parse().ok()),
            },
        );
    }
    Ok(rows)
}

pub fn compare(opts: &CompareOptions) -> Result<CompareOutcome> {
    if opts.langs.len() < 2 {
        bail!("need at least two languages to compare");
    }
    let base = opts.base_lang.clone().unwrap_or_else(|| opts.langs[0].clone());
    if !opts.langs.contains(&base) {
        bail!("--base-lang {base} not in --langs {:?}", opts.langs);
    }

    let mut tables = BTreeMap::new();
    for lang in &opts.langs {
        tables.insert(lang.as_str(), load_lang(&detailed_path(opts, lang))?);
    }

    let all_indices: BTreeSet<u64> = tables.values().flat_map(|t| t.keys().copied()).collect();
    let base_table = &tables[base.as_str()];

    let mut rows = Vec::new();
    for index in &all_indices {
        let scores: Vec<Option<f64>> = opts
            .langs
            .iter()
            .map(|l| tables[l.as_str()].get(index).and_then(|r| r.overall))
            .collect();
        let present: Vec<f64> = scores.iter().flatten().copied().collect();
        if present.len() < 2 {
            continue;
        }
        let score_max = present.iter().copied().fold(f64::MIN, f64::max);
        let score_min = present.iter().copied().fold(f64::MAX, f64::min);
        let score_diff = score_max - score_min;
        if score_diff < opts.threshold {
            continue;
        }
        let missing_langs = opts
            .langs
            .iter()
            .zip(&scores)
            .filter(|(_, s)| s.is_none())
            .map(|(l, _)| l.clone())
            .collect();
        let meta = base_table.get(index).cloned().unwrap_or_default();
        rows.push(CompareRow {
            index: *index,
            category: meta.category,
            subtask: meta.subtask,
            scores,
            score_diff,
            score_max,
            score_min,
            missing_langs,
            valid_langs: present.len(),
        });
    }
    // Stable sort keeps index order among equal gaps.
    rows.sort_by(|a, b| b.score_diff.total_cmp(&a.score_diff));

    Ok(CompareOutcome {
        langs: opts.langs.clone(),
        total: all_indices.len(),
        rows,
    })
}

pub fn write_compare_csv(path: &Path, outcome: &CompareOutcome) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("creating comparison: {}", path.display()))?;

    let mut header = vec!["index".to_string(), "category".into(), "subtask".into()];
    header.extend(outcome.langs.iter().map(|l| format!("score_{l}")));
    header.extend(
        ["score_diff", "score_max", "score_min", "missing_langs", "valid_langs"]
            .map(String::from),
    );
    w.write_record(&header)?;

    let num = |v: f64| format!("{v:.2}");
    for r in &outcome.rows {
        let mut rec = vec![
            r.index.to_string(),
            r.category.clone().unwrap_or_default(),
            r.subtask.clone().unwrap_or_default(),
        ];
        rec.extend(r.scores.iter().map(|s| s.map(num).unwrap_or_default()));
        rec.push(num(r.score_diff));
        rec.push(num(r.score_max));
        rec.push(num(r.score_min));
        rec.push(r.missing_langs.join(","));
        rec.push(r.valid_langs.to_string());
        w.write_record(&rec)?;
    }
    w.flush()?;
    Ok(())
}
