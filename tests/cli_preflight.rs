use clap::Parser;
use judgebench::cli::{Args, dispatch};

// Logging can only be installed once per process, so this binary holds a single dispatch.
#[test]
fn evaluate_without_credentials_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("judge");
    let config = dir.path().join("judgebench.toml");
    std::fs::write(
        &config,
        format!(
            r#"
[paths]
images_root = "{images}"
out_dir = "{out}"

[judge]
api_key_env = "JUDGEBENCH_TEST_KEY_THAT_IS_NEVER_SET"

[logging]
write_to_file = false
"#,
            images = dir.path().join("images").display(),
            out = out_dir.display(),
        ),
    )
    .unwrap();
    let manifest = dir.path().join("data_total_es.json");
    std::fs::write(
        &manifest,
        r#"[{"index": 0, "category": "causal_reasoning", "subtask": "s", "instruction": "i"}]"#,
    )
    .unwrap();

    let args = Args::parse_from([
        "judgebench",
        "--config",
        config.to_str().unwrap(),
        "evaluate",
        "--manifest",
        manifest.to_str().unwrap(),
    ]);
    let err = dispatch(args).unwrap_err();
    assert!(
        err.to_string()
            .contains("JUDGEBENCH_TEST_KEY_THAT_IS_NEVER_SET is not set"),
        "{err:#}"
    );
    assert!(!out_dir.join("es").exists());
}
