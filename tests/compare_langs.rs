use judgebench::compare::{CompareOptions, compare, parse_langs, write_compare_csv};
use judgebench::config::Output;
use std::path::Path;

fn write_report(root: &Path, lang: &str, rows: &[(u64, &str)]) {
    let dir = root.join(lang);
    std::fs::create_dir_all(&dir).unwrap();
    let mut body = String::from("index,category,subtask,status,overall\n");
    for (index, overall) in rows {
        body.push_str(&format!("{index},temporal_reasoning,aging_{lang},ok,{overall}\n"));
    }
    std::fs::write(dir.join(format!("{lang}_judge.csv")), body).unwrap();
}

fn opts(root: &Path, langs: &[&str], base: Option<&str>, threshold: f64) -> CompareOptions {
    CompareOptions {
        root: root.to_path_buf(),
        langs: langs.iter().map(|s| s.to_string()).collect(),
        base_lang: base.map(str::to_string),
        threshold,
        detailed_filename: Output::default().detailed_filename,
    }
}

#[test]
fn flags_large_gaps_sorted_by_difference() {
    let dir = tempfile::tempdir().unwrap();
    write_report(dir.path(), "en", &[(0, "4.00"), (1, "5.00"), (2, "3.00"), (3, "2.00")]);
    write_report(dir.path(), "zh", &[(0, "3.50"), (1, "2.00"), (2, "1.00"), (3, "")]);

    let out = compare(&opts(dir.path(), &["en", "zh"], None, 1.0)).unwrap();
    assert_eq!(out.total, 4);
    let indices: Vec<u64> = out.rows.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![1, 2]);
    assert_eq!(out.rows[0].score_diff, 3.0);
    assert_eq!(out.rows[0].scores, vec![Some(5.0), Some(2.0)]);
    assert_eq!(out.rows[0].subtask.as_deref(), Some("aging_en"));
}

#[test]
fn missing_languages_are_listed_and_rows_need_two_scores() {
    let dir = tempfile::tempdir().unwrap();
    write_report(dir.path(), "en", &[(0, "5.00"), (1, "5.00")]);
    write_report(dir.path(), "es", &[(0, "1.00")]);
    write_report(dir.path(), "ar", &[(0, "2.00"), (2, "4.00")]);

    let out = compare(&opts(dir.path(), &["en", "es", "ar"], Some("ar"), 0.5)).unwrap();
    assert_eq!(out.total, 3);
    assert_eq!(out.rows.len(), 1);
    let row = &out.rows[0];
    assert_eq!(row.index, 0);
    assert_eq!(row.valid_langs, 3);
    assert_eq!(row.score_max, 5.0);
    assert_eq!(row.score_min, 1.0);
    assert!(row.missing_langs.is_empty());
    assert_eq!(row.subtask.as_deref(), Some("aging_ar"));
}

#[test]
fn writes_csv_with_per_language_columns() {
    let dir = tempfile::tempdir().unwrap();
    write_report(dir.path(), "en", &[(0, "5.00"), (1, "4.00")]);
    write_report(dir.path(), "zh", &[(0, "1.00")]);
    write_report(dir.path(), "es", &[(0, "3.00"), (1, "1.50")]);

    let out = compare(&opts(dir.path(), &["en", "zh", "es"], None, 1.0)).unwrap();
    let path = dir.path().join("compare/large_diffs.csv");
    write_compare_csv(&path, &out).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "index,category,subtask,score_en,score_zh,score_es,score_diff,score_max,score_min,missing_langs,valid_langs"
    );
    assert_eq!(lines[1], "0,temporal_reasoning,aging_en,5.00,1.00,3.00,4.00,5.00,1.00,,3");
    assert_eq!(lines[2], "1,temporal_reasoning,aging_en,4.00,,1.50,2.50,4.00,1.50,zh,2");
}

#[test]
fn invalid_inputs_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_report(dir.path(), "en", &[(0, "5.00")]);

    let err = compare(&opts(dir.path(), &["en", "zh"], None, 1.0)).unwrap_err();
    assert!(err.to_string().contains("missing file"), "{err}");

    let err = compare(&opts(dir.path(), &["en", "zh"], Some("fr"), 1.0)).unwrap_err();
    assert!(err.to_string().contains("--base-lang fr"), "{err}");

    let err = compare(&opts(dir.path(), &["en"], None, 1.0)).unwrap_err();
    assert!(err.to_string().contains("at least two"), "{err}");

    assert!(parse_langs(" , ").is_err());
    assert_eq!(parse_langs("en, zh,,es").unwrap(), vec!["en", "zh", "es"]);
}

#[test]
fn report_without_overall_column_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    for lang in ["en", "zh"] {
        std::fs::create_dir_all(dir.path().join(lang)).unwrap();
        std::fs::write(
            dir.path().join(lang).join(format!("{lang}_judge.csv")),
            "index,score\n0,4\n",
        )
        .unwrap();
    }
    let err = compare(&opts(dir.path(), &["en", "zh"], None, 1.0)).unwrap_err();
    assert!(err.to_string().contains("missing columns"), "{err}");
}
