use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::util::sha256_hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    TemporalReasoning,
    CausalReasoning,
    SpatialReasoning,
    LogicalReasoning,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::TemporalReasoning,
        Category::CausalReasoning,
        Category::SpatialReasoning,
        Category::LogicalReasoning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::TemporalReasoning => "temporal_reasoning",
            Category::CausalReasoning => "causal_reasoning",
            Category::SpatialReasoning => "spatial_reasoning",
            Category::LogicalReasoning => "logical_reasoning",
        }
    }

    pub fn parse(raw: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub index: u64,
    pub category: Category,
    pub subtask: String,
    pub instruction: String,
    pub reference: Option<String>,
    /// Source image the edit was applied to, resolved against the manifest directory.
    pub source_image: Option<PathBuf>,
    pub reasoning_image: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: PathBuf,
    pub sha256: String,
    pub samples: Vec<Sample>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("manifest does not exist: {}", path.display());
        }
        let raw = std::fs::read(path)
            .with_context(|| format!("reading manifest: {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let samples = parse_samples(&raw, base_dir)
            .with_context(|| format!("parsing manifest: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            sha256: sha256_hex(&raw),
            samples,
        })
    }

    pub fn get(&self, index: u64) -> Option<&Sample> {
        self.samples.iter().find(|s| s.index == index)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Raw manifest row. Everything is optional so that validation can name the
/// missing field instead of surfacing a generic serde error.
#[derive(Debug, Deserialize)]
struct RawSample {
    index: Option<u64>,
    category: Option<String>,
    subtask: Option<String>,
    instruction: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    reasoning_img: Option<String>,
}

pub fn parse_samples(raw: &[u8], base_dir: &Path) -> Result<Vec<Sample>> {
    let rows: Vec<RawSample> =
        serde_json::from_slice(raw).with_context(|| "manifest must be a JSON array of objects")?;

    let mut seen = HashSet::new();
    let mut samples = Vec::with_capacity(rows.len());
    for (pos, row) in rows.into_iter().enumerate() {
        let index = row
            .index
            .ok_or_else(|| anyhow!("sample #{pos}: missing field `index`"))?;
        if !seen.insert(index) {
            bail!("sample #{pos}: duplicate index {index}");
        }
        let category_raw = row
            .category
            .ok_or_else(|| anyhow!("sample {index}: missing field `category`"))?;
        let category = Category::parse(&category_raw)
            .ok_or_else(|| anyhow!("sample {index}: unknown category `{category_raw}`"))?;
        let subtask = non_empty(row.subtask)
            .ok_or_else(|| anyhow!("sample {index}: missing field `subtask`"))?;
        let instruction = non_empty(row.instruction)
            .ok_or_else(|| anyhow!("sample {index}: missing field `instruction`"))?;

        samples.push(Sample {
            index,
            category,
            subtask,
            instruction,
            reference: non_empty(row.reference),
            source_image: non_empty(row.image).map(|p| base_dir.join(p)),
            reasoning_image: non_empty(row.reasoning_img).map(|p| base_dir.join(p)),
        });
    }
    Ok(samples)
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// `data_total_zh.json` -> `zh`; anything without a two-letter suffix is `en`.
pub fn infer_language(manifest: &Path) -> String {
    let stem = manifest
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match stem.rsplit_once('_') {
        Some((_, code)) if code.len() == 2 && code.chars().all(|c| c.is_ascii_lowercase()) => {
            code.to_string()
        }
        _ => "en".to_string(),
    }
}
