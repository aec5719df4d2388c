use judgebench::manifest::{Category, Manifest, infer_language, parse_samples};
use std::path::Path;

#[test]
fn loads_samples_and_resolves_images() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_total.json");
    std::fs::write(
        &path,
        r#"[
  {"index": 0, "category": "temporal_reasoning", "subtask": "aging",
   "instruction": "Show this apple after two weeks.", "reference": "rotten apple",
   "image": "src/0.png", "reasoning_img": "ref/0.png"},
  {"index": 1, "category": "Spatial_Reasoning", "subtask": "rotation",
   "instruction": "Rotate the cube."}
]"#,
    )
    .unwrap();

    let m = Manifest::load(&path).expect("load");
    assert_eq!(m.len(), 2);
    assert_eq!(m.sha256.len(), 64);

    let first = m.get(0).unwrap();
    assert_eq!(first.category, Category::TemporalReasoning);
    assert_eq!(first.reference.as_deref(), Some("rotten apple"));
    assert_eq!(first.source_image.as_deref(), Some(dir.path().join("src/0.png").as_path()));
    assert_eq!(first.reasoning_image.as_deref(), Some(dir.path().join("ref/0.png").as_path()));

    let second = m.get(1).unwrap();
    assert_eq!(second.category, Category::SpatialReasoning);
    assert!(second.reference.is_none());
    assert!(second.source_image.is_none());
}

#[test]
fn missing_manifest_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Manifest::load(&dir.path().join("nope.json")).unwrap_err();
    assert!(err.to_string().contains("does not exist"), "{err:#}");
}

#[test]
fn missing_index_is_rejected() {
    let raw = br#"[{"category": "causal_reasoning", "subtask": "s", "instruction": "i"}]"#;
    let err = parse_samples(raw, Path::new(".")).unwrap_err();
    assert!(err.to_string().contains("missing field `index`"), "{err:#}");
}

#[test]
fn duplicate_index_is_rejected() {
    let raw = br#"[
        {"index": 3, "category": "causal_reasoning", "subtask": "s", "instruction": "i"},
        {"index": 3, "category": "logical_reasoning", "subtask": "s", "instruction": "i"}
    ]"#;
    let err = parse_samples(raw, Path::new(".")).unwrap_err();
    assert!(err.to_string().contains("duplicate index 3"), "{err:#}");
}

#[test]
fn unknown_category_is_rejected() {
    let raw = br#"[{"index": 1, "category": "emotional", "subtask": "s", "instruction": "i"}]"#;
    let err = parse_samples(raw, Path::new(".")).unwrap_err();
    assert!(err.to_string().contains("unknown category"), "{err:#}");
}

#[test]
fn blank_instruction_is_rejected() {
    let raw = br#"[{"index": 1, "category": "causal_reasoning", "subtask": "s", "instruction": "  "}]"#;
    let err = parse_samples(raw, Path::new(".")).unwrap_err();
    assert!(err.to_string().contains("missing field `instruction`"), "{err:#}");
}

#[test]
fn language_comes_from_file_suffix() {
    assert_eq!(infer_language(Path::new("data/data_total_zh.json")), "zh");
    assert_eq!(infer_language(Path::new("data_total_ar.json")), "ar");
    assert_eq!(infer_language(Path::new("data_total.json")), "en");
    assert_eq!(infer_language(Path::new("manifest.json")), "en");
}
