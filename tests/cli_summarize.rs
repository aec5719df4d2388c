use clap::Parser;
use judgebench::checkpoint::{CheckpointHeader, CheckpointStore, JudgmentResult};
use judgebench::cli::{Args, dispatch};
use judgebench::parser::ParsedJudgment;

// One dispatch per binary: the tracing subscriber is process-global.
#[test]
fn summarize_rebuilds_reports_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("judge");
    let config = dir.path().join("judgebench.toml");
    std::fs::write(
        &config,
        format!(
            "[paths]\nout_dir = \"{}\"\n\n[logging]\nwrite_to_file = false\n",
            out_dir.display()
        ),
    )
    .unwrap();
    let manifest = dir.path().join("data_total_zh.json");
    std::fs::write(
        &manifest,
        r#"[
  {"index": 0, "category": "temporal_reasoning", "subtask": "aging", "instruction": "a"},
  {"index": 1, "category": "temporal_reasoning", "subtask": "aging", "instruction": "b"}
]"#,
    )
    .unwrap();

    let checkpoint = out_dir.join("zh/zh_judge.checkpoint.json");
    let mut store =
        CheckpointStore::open(&checkpoint, CheckpointHeader::new("zh", "gpt-4.1", "x")).unwrap();
    store
        .put(JudgmentResult::from_parsed_at(
            0,
            ParsedJudgment {
                consistency: Some(3.0),
                reasoning: Some(4.0),
                quality: Some(5.0),
                rationale: Some("ok".into()),
                issues: vec![],
            },
            "Consistency: 3\nReasoning: 4\nQuality: 5\nRationale: ok".into(),
            "gpt-4.1",
            "2026-01-01T00:00:00Z".into(),
        ))
        .unwrap();

    let args = Args::parse_from([
        "judgebench",
        "--config",
        config.to_str().unwrap(),
        "summarize",
        "--manifest",
        manifest.to_str().unwrap(),
        "--reparse",
    ]);
    dispatch(args).expect("summarize");

    let detailed = std::fs::read_to_string(out_dir.join("zh/zh_judge.csv")).unwrap();
    let lines: Vec<&str> = detailed.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[1], "0,temporal_reasoning,aging,ok,3.00,4.00,5.00,4.00,ok,");
    assert_eq!(lines[2], "1,temporal_reasoning,aging,not_judged,,,,,,");

    let summary = std::fs::read_to_string(out_dir.join("zh/zh_judge_summary.csv")).unwrap();
    assert!(
        summary
            .lines()
            .any(|l| l == "Overall,,3.00,4.00,5.00,4.00,0.00,1,1,0"),
        "{summary}"
    );

    let json: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(out_dir.join("zh/zh_judge_summary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(json["language"], "zh");
    assert_eq!(json["total_samples"], 2);
}
