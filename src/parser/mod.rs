pub mod assets;
pub mod css;
pub mod javascript;
pub mod lexer;
pub mod php;
pub mod routes;
pub mod template;

use std::path::{Path, PathBuf};

use crate::config::SimilarityConfig;
use crate::error::{CleanupError, Result};
use crate::model::{
    BaseFileAnalysis, DuplicateMethodMatch, FileAnalysis, ImportKind, ImportRef, Language,
    MethodInfo, VariableInfo,
};
use crate::source::write_atomic;

pub use assets::AssetAnalyzer;
pub use css::CssAnalyzer;
pub use javascript::JsAnalyzer;
pub use lexer::Flavor;
pub use php::PhpAnalyzer;
pub use routes::RouteAnalyzer;
pub use template::TemplateAnalyzer;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "avif", "bmp"];
pub const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];

/// Per-language analysis and edit capability.
pub trait LanguageAnalyzer: Send + Sync {
    fn language(&self) -> Language;

    /// Lexer flavour used when comparing method bodies.
    fn flavor(&self) -> Flavor;

    fn analyze_source(&self, path: &Path, source: &str) -> Result<FileAnalysis>;

    fn validate_syntax(&self, path: &Path, source: &str) -> Result<()>;

    fn parse_file(&self, path: &Path) -> Result<FileAnalysis> {
        let source = read_source(path)?;
        self.analyze_source(path, &source)
    }

    fn symbols_case_insensitive(&self) -> bool {
        false
    }

    fn occurrences(&self, base: &BaseFileAnalysis, name: &str) -> u32 {
        if self.symbols_case_insensitive() {
            base.tokens
                .iter()
                .filter(|(token, _)| token.eq_ignore_ascii_case(name))
                .map(|(_, count)| *count)
                .sum()
        } else {
            base.token_count(name)
        }
    }

    /// Imports whose local name never appears outside import statements.
    fn find_unused_imports(&self, analysis: &FileAnalysis) -> Vec<ImportRef> {
        let base = analysis.base();
        base.imports
            .iter()
            .filter(|i| !matches!(i.kind, ImportKind::SideEffect | ImportKind::Stylesheet))
            .filter(|i| self.occurrences(base, &i.local_name) == 0)
            .cloned()
            .collect()
    }

    /// Methods referenced nowhere in their own file besides the declaration.
    fn find_unused_methods(&self, analysis: &FileAnalysis) -> Vec<MethodInfo> {
        let base = analysis.base();
        base.methods
            .iter()
            .filter(|m| !is_lifecycle_method(m))
            .filter(|m| self.occurrences(base, &m.name) <= 1)
            .cloned()
            .collect()
    }

    fn find_unused_variables(&self, analysis: &FileAnalysis) -> Vec<VariableInfo> {
        analysis
            .base()
            .variables
            .iter()
            .filter(|v| v.removable && !v.is_parameter)
            .filter(|v| v.lines.len() == 1 && v.declaration_line.is_some())
            .cloned()
            .collect()
    }

    fn find_duplicate_methods(
        &self,
        analyses: &[&BaseFileAnalysis],
        config: &SimilarityConfig,
    ) -> Vec<DuplicateMethodMatch> {
        crate::detector::similarity::find_duplicate_methods(
            self.language(),
            self.flavor(),
            analyses,
            config,
        )
    }

    /// Source with the given imports dropped; unchanged when none match.
    fn rewrite_without_imports(&self, _path: &Path, source: &str, _imports: &[ImportRef]) -> Result<String> {
        Ok(source.to_string())
    }

    /// Removes `imports` from the file on disk. Returns `false` when the
    /// rewrite would not validate, leaving the file untouched.
    fn remove_unused_imports(&self, path: &Path, imports: &[ImportRef]) -> Result<bool> {
        let source = read_source(path)?;
        let updated = self.rewrite_without_imports(path, &source, imports)?;
        if updated == source {
            return Ok(true);
        }
        if let Err(err) = self.validate_syntax(path, &updated) {
            tracing::warn!(path = %path.display(), error = %err, "import removal would break syntax");
            return Ok(false);
        }
        write_atomic(path, updated.as_bytes())?;
        Ok(true)
    }
}

/// Constructors and magic methods the runtime calls by itself.
pub fn is_lifecycle_method(method: &MethodInfo) -> bool {
    if method.name.starts_with("__") || method.name == "constructor" {
        return true;
    }
    method
        .owner
        .as_deref()
        .map(|owner| {
            owner
                .rsplit('\\')
                .next()
                .map(|short| short.eq_ignore_ascii_case(&method.name))
                .unwrap_or(false)
        })
        .unwrap_or(false)
}

pub fn read_source(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(CleanupError::FileNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|e| CleanupError::io(path, e))?;
    String::from_utf8(bytes).map_err(|e| CleanupError::parse(path, e.to_string()))
}

/// Whether `path` lies under `dir` (slash-separated, relative to any root).
pub fn path_in_dir(path: &Path, dir: &str) -> bool {
    let normalized = path.to_string_lossy().replace('\\', "/");
    let dir = dir.trim_matches('/');
    normalized.starts_with(&format!("{}/", dir)) || normalized.contains(&format!("/{}/", dir))
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn detect_language(root: &Path, path: &Path) -> Option<Language> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    let relative = path.strip_prefix(root).unwrap_or(path);
    let ext = extension_of(path);

    if name.ends_with(".blade.php") {
        return Some(Language::Template);
    }
    match ext.as_str() {
        "php" if relative.starts_with("routes") => Some(Language::Route),
        "php" => Some(Language::Php),
        "js" | "mjs" | "cjs" | "jsx" => Some(Language::JavaScript),
        "css" | "scss" => Some(Language::Css),
        e if IMAGE_EXTENSIONS.contains(&e) || FONT_EXTENSIONS.contains(&e) => Some(Language::Asset),
        _ => None,
    }
}

/// One analyzer per language, keyed by file path.
pub struct Analyzers {
    root: PathBuf,
    php: PhpAnalyzer,
    routes: RouteAnalyzer,
    js: JsAnalyzer,
    template: TemplateAnalyzer,
    css: CssAnalyzer,
    assets: AssetAnalyzer,
}

impl Analyzers {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            php: PhpAnalyzer,
            routes: RouteAnalyzer,
            js: JsAnalyzer,
            template: TemplateAnalyzer::new(&root),
            css: CssAnalyzer,
            assets: AssetAnalyzer,
            root,
        }
    }

    pub fn get(&self, language: Language) -> &dyn LanguageAnalyzer {
        match language {
            Language::Php => &self.php,
            Language::Route => &self.routes,
            Language::JavaScript => &self.js,
            Language::Template => &self.template,
            Language::Css => &self.css,
            Language::Asset => &self.assets,
        }
    }

    pub fn for_path(&self, path: &Path) -> Option<&dyn LanguageAnalyzer> {
        detect_language(&self.root, path).map(|language| self.get(language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Visibility;
    use tempfile::TempDir;

    #[test]
    fn test_detect_language() {
        let root = Path::new("/p");
        let cases = [
            ("/p/app/User.php", Some(Language::Php)),
            ("/p/routes/web.php", Some(Language::Route)),
            ("/p/resources/views/home.blade.php", Some(Language::Template)),
            ("/p/resources/js/app.js", Some(Language::JavaScript)),
            ("/p/resources/css/app.scss", Some(Language::Css)),
            ("/p/public/images/logo.PNG", Some(Language::Asset)),
            ("/p/README.md", None),
        ];
        for (path, expected) in cases {
            assert_eq!(detect_language(root, Path::new(path)), expected, "{}", path);
        }
    }

    #[test]
    fn test_path_in_dir() {
        assert!(path_in_dir(Path::new("/p/app/Models/User.php"), "app/Models"));
        assert!(path_in_dir(Path::new("app/Models/User.php"), "app/Models"));
        assert!(!path_in_dir(Path::new("/p/app/ModelsX/User.php"), "app/Models"));
    }

    #[test]
    fn test_parse_missing_file() {
        let err = PhpAnalyzer.parse_file(Path::new("/definitely/missing.php")).unwrap_err();
        assert!(matches!(err, CleanupError::FileNotFound(_)));
    }

    #[test]
    fn test_lifecycle_methods() {
        let method = |name: &str| MethodInfo {
            name: name.to_string(),
            owner: Some("App\\Legacy".to_string()),
            visibility: Visibility::Public,
            is_static: false,
            line: 1,
            start_line: 1,
            end_line: 1,
            parameters: vec![],
            body: String::new(),
        };
        assert!(is_lifecycle_method(&method("__construct")));
        assert!(is_lifecycle_method(&method("__get")));
        assert!(is_lifecycle_method(&method("Legacy")));
        assert!(!is_lifecycle_method(&method("handle")));
    }

    #[test]
    fn test_unused_imports_php() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Foo.php");
        std::fs::write(
            &path,
            "<?php\nnamespace App;\n\nuse App\\Models\\Post;\nuse App\\Models\\User;\n\nclass Foo\n{\n    public function a(): User\n    {\n        return new User();\n    }\n}\n",
        )
        .unwrap();
        let analysis = PhpAnalyzer.parse_file(&path).unwrap();
        let unused = PhpAnalyzer.find_unused_imports(&analysis);
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].symbol, "App\\Models\\Post");

        assert!(PhpAnalyzer.remove_unused_imports(&path, &unused).unwrap());
        let after = std::fs::read_to_string(&path).unwrap();
        assert!(!after.contains("Post"));
        assert!(after.contains("use App\\Models\\User;"));

        let again = PhpAnalyzer.parse_file(&path).unwrap();
        assert!(PhpAnalyzer.find_unused_imports(&again).is_empty());
        assert!(PhpAnalyzer.remove_unused_imports(&path, &unused).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), after);
    }

    #[test]
    fn test_unused_methods_and_variables() {
        let source = "<?php\nclass Foo\n{\n    public function __construct() {}\n\n    public function used()\n    {\n        $tmp = 1;\n        return $this->helper();\n    }\n\n    private function helper()\n    {\n        return 2;\n    }\n\n    private function orphan()\n    {\n        return 3;\n    }\n}\n";
        let analysis = PhpAnalyzer.analyze_source(Path::new("Foo.php"), source).unwrap();
        let methods: Vec<_> = PhpAnalyzer
            .find_unused_methods(&analysis)
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(methods, vec!["used".to_string(), "orphan".to_string()]);

        let vars: Vec<_> = PhpAnalyzer
            .find_unused_variables(&analysis)
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(vars, vec!["$tmp".to_string()]);
    }
}
