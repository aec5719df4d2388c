mod common;

use common::PNG_BYTES;
use judgebench::artifact::{ArtifactResolver, ImageKind, sniff_image};
use judgebench::manifest::Category;

fn exts() -> Vec<String> {
    vec!["png".into(), "jpg".into(), "jpeg".into()]
}

#[test]
fn resolves_first_existing_extension() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = ArtifactResolver::new(dir.path(), "es", &exts());
    let cat_dir = resolver.category_dir(Category::LogicalReasoning);
    assert_eq!(cat_dir, dir.path().join("es/images/logical_reasoning"));

    std::fs::create_dir_all(&cat_dir).unwrap();
    std::fs::write(cat_dir.join("5.jpeg"), b"\xFF\xD8\xFF\xE0").unwrap();
    assert_eq!(
        resolver.resolve(5, Category::LogicalReasoning),
        Some(cat_dir.join("5.jpeg"))
    );

    std::fs::write(cat_dir.join("5.png"), PNG_BYTES).unwrap();
    assert_eq!(
        resolver.resolve(5, Category::LogicalReasoning),
        Some(cat_dir.join("5.png"))
    );
}

#[test]
fn missing_artifact_reports_expected_path() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = ArtifactResolver::new(dir.path(), "en", &exts());
    assert!(resolver.resolve(9, Category::CausalReasoning).is_none());
    assert_eq!(
        resolver.expected_path(9, Category::CausalReasoning),
        dir.path().join("en/images/causal_reasoning/9.png")
    );
}

#[test]
fn other_language_dirs_are_not_consulted() {
    let dir = tempfile::tempdir().unwrap();
    common::write_image(dir.path(), "zh", Category::TemporalReasoning, 1);
    let resolver = ArtifactResolver::new(dir.path(), "en", &exts());
    assert!(resolver.resolve(1, Category::TemporalReasoning).is_none());
}

#[test]
fn sniffs_signatures_not_extensions() {
    assert_eq!(sniff_image(PNG_BYTES), Some(ImageKind::Png));
    assert_eq!(sniff_image(b"\xFF\xD8\xFF\xDB\x00"), Some(ImageKind::Jpeg));
    assert_eq!(sniff_image(b"GIF89a"), None);
    assert_eq!(sniff_image(b""), None);
    assert_eq!(ImageKind::Jpeg.mime(), "image/jpeg");
}
