//! Durable per-language progress: committed judgments and failure records.
//!
//! Both files are rewritten whole through `util::atomic_write`, so the copy on
//! disk is always a complete snapshot. Entries live in ordered maps, which
//! keeps their serialised bytes stable across rewrites.

use crate::judge::JudgeError;
use crate::parser::{Dimension, ParsedJudgment};
use crate::util::{atomic_write, now_rfc3339};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointHeader {
    pub version: u32,
    pub language: String,
    pub model: String,
    pub manifest_sha256: String,
}

impl CheckpointHeader {
    pub fn new(language: &str, model: &str, manifest_sha256: &str) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            language: language.to_string(),
            model: model.to_string(),
            manifest_sha256: manifest_sha256.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentResult {
    pub index: u64,
    pub consistency: Option<f64>,
    pub reasoning: Option<f64>,
    pub quality: Option<f64>,
    pub overall: Option<f64>,
    pub rationale: String,
    pub needs_review: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    /// Kept verbatim so scores can be re-extracted offline.
    pub raw_response: String,
    pub model: String,
    pub judged_at: String,
}

impl JudgmentResult {
    pub fn from_parsed(index: u64, parsed: ParsedJudgment, raw: String, model: &str) -> Self {
        Self::from_parsed_at(index, parsed, raw, model, now_rfc3339())
    }

    pub fn from_parsed_at(
        index: u64,
        parsed: ParsedJudgment,
        raw: String,
        model: &str,
        judged_at: String,
    ) -> Self {
        let needs_review = parsed.needs_review();
        let overall = overall_of(parsed.consistency, parsed.reasoning, parsed.quality);
        Self {
            index,
            consistency: parsed.consistency,
            reasoning: parsed.reasoning,
            quality: parsed.quality,
            overall,
            rationale: parsed.rationale.unwrap_or_default(),
            needs_review,
            issues: parsed.issues,
            raw_response: raw,
            model: model.to_string(),
            judged_at,
        }
    }

    pub fn score(&self, dim: Dimension) -> Option<f64> {
        match dim {
            Dimension::Consistency => self.consistency,
            Dimension::Reasoning => self.reasoning,
            Dimension::Quality => self.quality,
        }
    }
}

/// Mean of the three sub-scores, or `None` if any of them is missing.
pub fn overall_of(c: Option<f64>, r: Option<f64>, q: Option<f64>) -> Option<f64> {
    Some((c? + r? + q?) / 3.0)
}

#[derive(Debug, Deserialize)]
struct CheckpointFile {
    header: CheckpointHeader,
    entries: BTreeMap<u64, JudgmentResult>,
}

#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    header: CheckpointHeader,
    entries: BTreeMap<u64, JudgmentResult>,
}

impl CheckpointStore {
    /// Loads committed results and checks they belong to this run. Nothing is
    /// written until the first [`CheckpointStore::put`].
    pub fn open(path: &Path, header: CheckpointHeader) -> Result<Self> {
        let entries = match read_file(path)? {
            None => BTreeMap::new(),
            Some(file) => {
                validate_header(path, &file.header, &header)?;
                file.entries
            }
        };
        debug!(path = %path.display(), committed = entries.len(), "checkpoint opened");
        Ok(Self {
            path: path.to_path_buf(),
            header,
            entries,
        })
    }

    /// All committed results; empty when no checkpoint exists yet.
    pub fn load(path: &Path) -> Result<BTreeMap<u64, JudgmentResult>> {
        Ok(read_file(path)?.map(|f| f.entries).unwrap_or_default())
    }

    pub fn load_header(path: &Path) -> Result<Option<CheckpointHeader>> {
        Ok(read_file(path)?.map(|f| f.header))
    }

    pub fn contains(&self, index: u64) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn get(&self, index: u64) -> Option<&JudgmentResult> {
        self.entries.get(&index)
    }

    pub fn entries(&self) -> &BTreeMap<u64, JudgmentResult> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Commits `result` durably; re-putting an index overwrites it.
    pub fn put(&mut self, result: JudgmentResult) -> Result<()> {
        let index = result.index;
        let previous = self.entries.insert(index, result);
        if let Err(err) = self.persist() {
            // Keep memory in line with disk.
            match previous {
                Some(prev) => self.entries.insert(index, prev),
                None => self.entries.remove(&index),
            };
            return Err(err);
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let file = CheckpointFileRef {
            header: &self.header,
            entries: &self.entries,
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        atomic_write(&self.path, &bytes)
            .with_context(|| format!("writing checkpoint: {}", self.path.display()))
    }
}

#[derive(Serialize)]
struct CheckpointFileRef<'a> {
    header: &'a CheckpointHeader,
    entries: &'a BTreeMap<u64, JudgmentResult>,
}

fn read_file(path: &Path) -> Result<Option<CheckpointFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read(path)
        .with_context(|| format!("reading checkpoint: {}", path.display()))?;
    let file: CheckpointFile = serde_json::from_slice(&raw).with_context(|| {
        format!(
            "checkpoint is corrupt: {} (refusing to discard prior progress; \
             fix or remove it, or pass --force-restart)",
            path.display()
        )
    })?;
    for (key, entry) in &file.entries {
        if *key != entry.index {
            bail!(
                "checkpoint is corrupt: {} (key {key} holds index {})",
                path.display(),
                entry.index
            );
        }
    }
    Ok(Some(file))
}

fn validate_header(path: &Path, found: &CheckpointHeader, want: &CheckpointHeader) -> Result<()> {
    let mut mismatches = Vec::new();
    if found.version != want.version {
        mismatches.push(format!("version={} (expected {})", found.version, want.version));
    }
    if found.language != want.language {
        mismatches.push(format!("language={:?} (expected {:?})", found.language, want.language));
    }
    if found.model != want.model {
        mismatches.push(format!("model={:?} (expected {:?})", found.model, want.model));
    }
    if !mismatches.is_empty() {
        bail!(
            "checkpoint {} does not match current run: {}. Use --force-restart to discard old progress.",
            path.display(),
            mismatches.join("; ")
        );
    }
    if found.manifest_sha256 != want.manifest_sha256 {
        warn!(
            path = %path.display(),
            "manifest changed since checkpoint was written; committed judgments are kept"
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ArtifactMissing,
    JudgeRequestError,
    RetriesExhausted,
    MalformedOutput,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ArtifactMissing => "artifact_missing",
            FailureKind::JudgeRequestError => "judge_request_error",
            FailureKind::RetriesExhausted => "retries_exhausted",
            FailureKind::MalformedOutput => "malformed_output",
        }
    }
}

impl From<&JudgeError> for FailureKind {
    fn from(err: &JudgeError) -> Self {
        match err {
            JudgeError::ArtifactMissing { .. } => FailureKind::ArtifactMissing,
            JudgeError::Request { .. } => FailureKind::JudgeRequestError,
            JudgeError::Transient { .. } | JudgeError::RetriesExhausted { .. } => {
                FailureKind::RetriesExhausted
            }
            JudgeError::MalformedOutput { .. } => FailureKind::MalformedOutput,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub index: u64,
    pub kind: FailureKind,
    pub message: String,
    #[serde(default)]
    pub raw_response: Option<String>,
    pub recorded_at: String,
}

impl FailureRecord {
    pub fn from_error(index: u64, err: &JudgeError) -> Self {
        let raw_response = match err {
            JudgeError::MalformedOutput { raw, .. } => Some(raw.clone()),
            _ => None,
        };
        Self {
            index,
            kind: FailureKind::from(err),
            message: err.to_string(),
            raw_response,
            recorded_at: now_rfc3339(),
        }
    }
}

/// Latest failure per index. Cleared once the index is judged successfully.
#[derive(Debug)]
pub struct FailureLog {
    path: PathBuf,
    entries: BTreeMap<u64, FailureRecord>,
}

impl FailureLog {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            entries: Self::load(path)?,
        })
    }

    pub fn load(path: &Path) -> Result<BTreeMap<u64, FailureRecord>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read(path)
            .with_context(|| format!("reading failures: {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("failures file is corrupt: {}", path.display()))
    }

    pub fn entries(&self) -> &BTreeMap<u64, FailureRecord> {
        &self.entries
    }

    pub fn record(&mut self, rec: FailureRecord) -> Result<()> {
        self.entries.insert(rec.index, rec);
        self.persist()
    }

    pub fn clear(&mut self, index: u64) -> Result<()> {
        if self.entries.remove(&index).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        atomic_write(&self.path, &bytes)
            .with_context(|| format!("writing failures: {}", self.path.display()))
    }
}
