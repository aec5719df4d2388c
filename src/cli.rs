use crate::{
    aggregate::{Aggregation, aggregate},
    artifact::ArtifactResolver,
    checkpoint::{CheckpointHeader, CheckpointStore, FailureLog},
    compare::{self, CompareOptions},
    config::{Config, Output},
    judge::{Credentials, HttpTransport, JudgeClient, JudgeSettings, RetryPolicy},
    manifest::{Manifest, infer_language},
    pipeline::{Pipeline, reparse_all},
    report::{self, SummaryReport},
    util::{ensure_dir, now_rfc3339},
};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "judgebench")]
#[command(about = "Resumable LMM-as-judge scoring for multilingual image-editing benchmarks")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./judgebench.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved configuration and credential status.
    Doctor {},
    /// Judge every sample not yet in the checkpoint, then write reports.
    Evaluate {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        images_root: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Language code; inferred from the manifest file name when omitted.
        #[arg(long)]
        language: Option<String>,
        /// Only judge the first N manifest samples.
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        workers: Option<usize>,
        /// Discard any existing checkpoint and failure records first.
        #[arg(long)]
        force_restart: bool,
    },
    /// Rebuild reports from the checkpoint without calling the judge.
    Summarize {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        language: Option<String>,
        /// Re-extract scores from the stored raw responses.
        #[arg(long)]
        reparse: bool,
    },
    /// List samples whose overall score differs across languages.
    Compare {
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long, default_value = "en,zh,es,ar")]
        langs: String,
        #[arg(long)]
        base_lang: Option<String>,
        #[arg(long, default_value_t = 1.0)]
        threshold: f64,
        #[arg(long)]
        output_file: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let mut cfg = Config::resolve(args.config.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => {
            let log_path = resolve_log_path(&cfg);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            doctor(&cfg)
        }
        Command::Evaluate {
            manifest,
            images_root,
            output,
            language,
            limit,
            workers,
            force_restart,
        } => {
            if let Some(p) = images_root {
                cfg.paths.images_root = p.display().to_string();
            }
            if let Some(p) = output {
                cfg.paths.out_dir = p.display().to_string();
            }
            if let Some(w) = workers {
                cfg.global.workers = *w;
            }
            let log_path = resolve_log_path(&cfg);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            evaluate(
                &cfg,
                manifest,
                language.as_deref(),
                *limit,
                *force_restart,
            )
        }
        Command::Summarize {
            manifest,
            output,
            language,
            reparse,
        } => {
            if let Some(p) = output {
                cfg.paths.out_dir = p.display().to_string();
            }
            let log_path = resolve_log_path(&cfg);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            summarize(&cfg, manifest, language.as_deref(), *reparse)
        }
        Command::Compare {
            root,
            langs,
            base_lang,
            threshold,
            output_file,
        } => {
            let _guard = init_logging(&args, &cfg, None)?;
            let root = root
                .clone()
                .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
            let output_file = output_file
                .clone()
                .unwrap_or_else(|| root.join("compare").join("large_diffs.csv"));
            let opts = CompareOptions {
                root,
                langs: compare::parse_langs(langs)?,
                base_lang: base_lang.clone(),
                threshold: *threshold,
                detailed_filename: cfg.output.detailed_filename.clone(),
            };
            run_compare(&opts, &output_file)
        }
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor(cfg: &Config) -> Result<()> {
    let creds = Credentials::from_env(&cfg.judge);
    let diag = serde_json::json!({
        "judge": {
            "model": cfg.judge.model,
            "endpoint": creds.as_ref().map(|c| c.endpoint.clone()).ok(),
            "api_key_env": cfg.judge.api_key_env,
            "api_key_set": creds.is_ok(),
            "timeout_seconds": cfg.judge.timeout_seconds,
        },
        "retry": cfg.retry,
        "workers": cfg.global.workers,
        "images_root": cfg.paths.images_root,
        "out_dir": cfg.paths.out_dir,
        "scoring": cfg.scoring,
    });
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(())
}

/// Per-language output locations.
pub struct LangPaths {
    pub dir: PathBuf,
    pub checkpoint: PathBuf,
    pub failures: PathBuf,
    pub detailed: PathBuf,
    pub summary: PathBuf,
    pub summary_json: PathBuf,
}

impl LangPaths {
    pub fn new(cfg: &Config, lang: &str) -> Self {
        let dir = PathBuf::from(&cfg.paths.out_dir).join(lang);
        let file = |template: &str| dir.join(Output::file_for(template, lang));
        Self {
            checkpoint: file(&cfg.output.checkpoint_filename),
            failures: file(&cfg.output.failures_filename),
            detailed: file(&cfg.output.detailed_filename),
            summary: file(&cfg.output.summary_filename),
            summary_json: file(&cfg.output.summary_json_filename),
            dir,
        }
    }
}

fn evaluate(
    cfg: &Config,
    manifest_path: &Path,
    language: Option<&str>,
    limit: Option<usize>,
    force_restart: bool,
) -> Result<()> {
    // Preconditions first: nothing below may run without a credential and a manifest.
    let creds = Credentials::from_env(&cfg.judge)?;
    let manifest = Manifest::load(manifest_path)?;
    let lang = language
        .map(str::to_string)
        .unwrap_or_else(|| infer_language(manifest_path));
    let paths = LangPaths::new(cfg, &lang);

    if force_restart {
        for p in [&paths.checkpoint, &paths.failures] {
            if p.exists() {
                warn!("--force-restart: removing {}", p.display());
                std::fs::remove_file(p).with_context(|| format!("removing {}", p.display()))?;
            }
        }
    } else if paths.checkpoint.exists() && !cfg.global.resume {
        bail!(
            "checkpoint already exists and resume=false: {}",
            paths.checkpoint.display()
        );
    }

    let header = CheckpointHeader::new(&lang, &cfg.judge.model, &manifest.sha256);
    let mut store = CheckpointStore::open(&paths.checkpoint, header)?;
    let mut failures = FailureLog::open(&paths.failures)?;

    ensure_dir(&paths.dir)?;
    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).context("serializing effective config")?;
        std::fs::write(paths.dir.join("effective-config.toml"), raw)?;
    }

    info!(
        lang = %lang,
        manifest = %manifest_path.display(),
        samples = manifest.len(),
        endpoint = %creds.endpoint,
        model = %cfg.judge.model,
        "evaluate"
    );

    let transport = HttpTransport::new(creds, Duration::from_secs(cfg.judge.timeout_seconds))?;
    let client = JudgeClient::new(
        transport,
        JudgeSettings::from_config(cfg),
        RetryPolicy::from(&cfg.retry),
    );
    let resolver = ArtifactResolver::new(
        Path::new(&cfg.paths.images_root),
        &lang,
        &cfg.artifacts.extensions,
    );
    let pipeline = Pipeline::new(client, resolver, cfg.judge.parse_retries, cfg.global.workers);

    let selected = match limit {
        Some(n) => &manifest.samples[..n.min(manifest.len())],
        None => &manifest.samples[..],
    };
    let stats = pipeline.run(selected, &mut store, &mut failures)?;

    let agg = aggregate(store.entries(), &manifest, failures.entries(), &cfg.scoring);
    write_reports(cfg, &paths, &lang, &cfg.judge.model, &agg)?;

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "language": lang,
                "stats": stats,
                "detailed": paths.detailed,
                "summary": paths.summary,
                "status": "ok"
            }))?
        );
    }
    Ok(())
}

fn summarize(cfg: &Config, manifest_path: &Path, language: Option<&str>, reparse: bool) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let lang = language
        .map(str::to_string)
        .unwrap_or_else(|| infer_language(manifest_path));
    let paths = LangPaths::new(cfg, &lang);

    let model = CheckpointStore::load_header(&paths.checkpoint)?
        .map(|h| h.model)
        .unwrap_or_else(|| cfg.judge.model.clone());
    let mut results = CheckpointStore::load(&paths.checkpoint)?;
    if results.is_empty() {
        warn!("no committed judgments at {}", paths.checkpoint.display());
    }
    if reparse {
        results = reparse_all(&results, &cfg.scoring);
    }
    let failures = FailureLog::load(&paths.failures)?;

    let agg = aggregate(&results, &manifest, &failures, &cfg.scoring);
    write_reports(cfg, &paths, &lang, &model, &agg)?;

    if cfg.global.print_summary {
        println!("{}", serde_json::to_string_pretty(&agg.summary)?);
    }
    Ok(())
}

fn write_reports(
    cfg: &Config,
    paths: &LangPaths,
    lang: &str,
    model: &str,
    agg: &Aggregation,
) -> Result<()> {
    let decimals = cfg.scoring.decimals;
    report::write_detailed_csv(&paths.detailed, agg, decimals)?;
    report::write_summary_csv(&paths.summary, agg, decimals)?;
    if cfg.output.write_summary_json {
        report::write_summary_json(
            &paths.summary_json,
            &SummaryReport {
                language: lang,
                model,
                generated_at: now_rfc3339(),
                total_samples: agg.detailed.len(),
                rows: &agg.summary,
            },
        )?;
    }
    let incomplete: BTreeMap<&str, usize> =
        agg.detailed
            .iter()
            .filter(|r| !r.status.is_complete())
            .fold(BTreeMap::new(), |mut acc, r| {
                *acc.entry(r.status.as_str()).or_insert(0) += 1;
                acc
            });
    info!(
        detailed = %paths.detailed.display(),
        summary = %paths.summary.display(),
        ?incomplete,
        "reports written"
    );
    Ok(())
}

fn run_compare(opts: &CompareOptions, output_file: &Path) -> Result<()> {
    let outcome = compare::compare(opts)?;
    compare::write_compare_csv(output_file, &outcome)?;
    println!("Total samples: {}", outcome.total);
    println!(
        "Hit samples: {} (threshold >= {})",
        outcome.rows.len(),
        opts.threshold
    );
    println!("Output: {}", output_file.display());
    Ok(())
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("judgebench.log"))
}
