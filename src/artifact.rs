use crate::manifest::Category;
use std::path::{Path, PathBuf};

/// Locates generated images under `<images_root>/<lang>/images/<category>/<index>.<ext>`.
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    root: PathBuf,
    language: String,
    extensions: Vec<String>,
}

impl ArtifactResolver {
    pub fn new(images_root: &Path, language: &str, extensions: &[String]) -> Self {
        Self {
            root: images_root.to_path_buf(),
            language: language.to_string(),
            extensions: extensions.to_vec(),
        }
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.root
            .join(&self.language)
            .join("images")
            .join(category.as_str())
    }

    /// First existing file in extension order, or `None`.
    pub fn resolve(&self, index: u64, category: Category) -> Option<PathBuf> {
        let dir = self.category_dir(category);
        self.extensions
            .iter()
            .map(|ext| dir.join(format!("{index}.{ext}")))
            .find(|p| p.is_file())
    }

    /// The path reported when nothing matched (first configured extension).
    pub fn expected_path(&self, index: u64, category: Category) -> PathBuf {
        let ext = self.extensions.first().map(String::as_str).unwrap_or("png");
        self.category_dir(category).join(format!("{index}.{ext}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }
}

/// Sniffs the file signature; extensions are not trusted.
pub fn sniff_image(bytes: &[u8]) -> Option<ImageKind> {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    if bytes.starts_with(PNG) {
        Some(ImageKind::Png)
    } else if bytes.len() > 3 && bytes[..3] == [0xFF, 0xD8, 0xFF] {
        Some(ImageKind::Jpeg)
    } else {
        None
    }
}
