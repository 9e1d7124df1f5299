use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::lexer::Flavor;
use super::{LanguageAnalyzer, FONT_EXTENSIONS, IMAGE_EXTENSIONS};
use crate::error::{CleanupError, Result};
use crate::model::{
    AssetFileAnalysis, AssetKind, BaseFileAnalysis, FileAnalysis, Language, ReferenceKind,
    SymbolReference,
};

static ASSET_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"["'(]\s*([^"'()\s]+?\.(?i:png|jpe?g|gif|svg|webp|ico|avif|bmp|woff2?|ttf|otf|eot))(?:[?#][^"')\s]*)?\s*["')]"#,
    )
    .unwrap()
});

/// String literals and `url()` arguments that name an image or font file.
pub fn asset_references(source: &str) -> Vec<SymbolReference> {
    ASSET_PATH_RE
        .captures_iter(source)
        .filter_map(|cap| {
            let m = cap.get(1)?;
            let line = source[..m.start()].matches('\n').count() as u32 + 1;
            Some(SymbolReference::new(m.as_str(), line, ReferenceKind::Asset))
        })
        .collect()
}

pub fn asset_kind(path: &Path) -> AssetKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        AssetKind::Image
    } else if FONT_EXTENSIONS.contains(&ext.as_str()) {
        AssetKind::Font
    } else {
        AssetKind::Other
    }
}

pub struct AssetAnalyzer;

impl AssetAnalyzer {
    fn build(path: &Path, size_bytes: u64) -> FileAnalysis {
        FileAnalysis::Asset(AssetFileAnalysis {
            base: BaseFileAnalysis::new(path, Language::Asset, size_bytes, 0),
            kind: asset_kind(path),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
    }
}

impl LanguageAnalyzer for AssetAnalyzer {
    fn language(&self) -> Language {
        Language::Asset
    }

    fn flavor(&self) -> Flavor {
        Flavor::Css
    }

    /// Binary content is never read; only metadata matters.
    fn parse_file(&self, path: &Path) -> Result<FileAnalysis> {
        let meta = std::fs::metadata(path).map_err(|e| CleanupError::io(path, e))?;
        Ok(Self::build(path, meta.len()))
    }

    fn analyze_source(&self, path: &Path, source: &str) -> Result<FileAnalysis> {
        Ok(Self::build(path, source.len() as u64))
    }

    fn validate_syntax(&self, _path: &Path, _source: &str) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_asset_references() {
        let src = "<img src=\"{{ asset('images/logo.png') }}\">\n.hero { background: url(../img/hero.JPG?v=2); }\n$x = 'not-an-asset.php';";
        let refs = asset_references(src);
        let names: Vec<_> = refs.iter().map(|r| (r.name.as_str(), r.line)).collect();
        assert_eq!(names, vec![("images/logo.png", 1), ("../img/hero.JPG", 2)]);
    }

    #[test]
    fn test_parse_file_uses_metadata() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logo.svg");
        std::fs::write(&path, [0u8, 159, 146, 150]).unwrap();
        match AssetAnalyzer.parse_file(&path).unwrap() {
            FileAnalysis::Asset(a) => {
                assert_eq!(a.kind, AssetKind::Image);
                assert_eq!(a.file_name, "logo.svg");
                assert_eq!(a.base.size_bytes, 4);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_missing_asset() {
        let err = AssetAnalyzer.parse_file(Path::new("/missing/a.png")).unwrap_err();
        assert!(matches!(err, CleanupError::FileNotFound(_)));
    }
}
