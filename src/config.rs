use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "https://api.bltcy.ai/v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub judge: Judge,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default)]
    pub artifacts: Artifacts,
    #[serde(default)]
    pub scoring: Scoring,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate()
            .with_context(|| format!("invalid config: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()
    }

    /// Loads `path` when given, else `./judgebench.toml` if present, else defaults.
    pub fn resolve(user: Option<&Path>) -> Result<Self> {
        if let Some(p) = user {
            return Self::load(p);
        }
        let default = Path::new("judgebench.toml");
        if default.exists() {
            Self::load(default)
        } else {
            Ok(Self::default())
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub resume: bool,
    pub workers: usize,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            resume: true,
            workers: 1,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub images_root: String,
    pub out_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            images_root: "outputs".into(),
            out_dir: "outputs/judge".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Judge {
    pub model: String,
    /// Empty means `OPENAI_BASE_URL`, then [`DEFAULT_BASE_URL`].
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_seconds: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub parse_retries: u32,
    pub include_source_image: bool,
    pub include_reasoning_image: bool,
}
impl Default for Judge {
    fn default() -> Self {
        Self {
            model: "gpt-4.1".into(),
            base_url: "".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_seconds: 120,
            temperature: 0.0,
            max_tokens: 1024,
            parse_retries: 1,
            include_source_image: true,
            include_reasoning_image: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Retry {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    pub jitter_fraction: f64,
}
impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay_ms: 1_500,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
            jitter_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Artifacts {
    pub extensions: Vec<String>,
}
impl Default for Artifacts {
    fn default() -> Self {
        Self {
            extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scoring {
    pub min_score: f64,
    pub max_score: f64,
    pub decimals: u32,
    pub by_subtask: bool,
}
/// Largest `decimals` that still rounds exactly in an `f64`.
pub const MAX_DECIMALS: u32 = 15;

impl Scoring {
    pub fn validate(&self) -> Result<()> {
        if !self.min_score.is_finite() || !self.max_score.is_finite() {
            bail!(
                "scoring bounds must be finite (min_score={}, max_score={})",
                self.min_score,
                self.max_score
            );
        }
        if self.min_score >= self.max_score {
            bail!(
                "scoring.min_score ({}) must be below scoring.max_score ({})",
                self.min_score,
                self.max_score
            );
        }
        if self.decimals > MAX_DECIMALS {
            bail!("scoring.decimals must be at most {MAX_DECIMALS}, got {}", self.decimals);
        }
        Ok(())
    }
}

impl Default for Scoring {
    fn default() -> Self {
        Self {
            min_score: 1.0,
            max_score: 5.0,
            decimals: 2,
            by_subtask: true,
        }
    }
}

/// File names under `<out_dir>/<lang>/`; `{lang}` is substituted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub checkpoint_filename: String,
    pub failures_filename: String,
    pub detailed_filename: String,
    pub summary_filename: String,
    pub write_summary_json: bool,
    pub summary_json_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            checkpoint_filename: "{lang}_judge.checkpoint.json".into(),
            failures_filename: "{lang}_judge.failures.json".into(),
            detailed_filename: "{lang}_judge.csv".into(),
            summary_filename: "{lang}_judge_summary.csv".into(),
            write_summary_json: true,
            summary_json_filename: "{lang}_judge_summary.json".into(),
        }
    }
}

impl Output {
    pub fn file_for(template: &str, lang: &str) -> String {
        template.replace("{lang}", lang)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
        }
    }
}
