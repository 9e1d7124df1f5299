use std::path::Path;

use crate::error::Result;
use crate::model::{BaseFileAnalysis, ImportRef};
use crate::parser::LanguageAnalyzer;

fn same_import(a: &ImportRef, b: &ImportRef) -> bool {
    a.kind == b.kind
        && a.local_name == b.local_name
        && a.symbol.trim_start_matches('\\').eq_ignore_ascii_case(b.symbol.trim_start_matches('\\'))
        && a.source == b.source
}

/// Whether `import` is still declared on its recorded line.
pub fn import_is_current(current: &BaseFileAnalysis, import: &ImportRef) -> bool {
    current
        .imports
        .iter()
        .any(|i| i.line == import.line && same_import(i, import))
}

/// `source` without `imports`. Import statements that keep other names are
/// rewritten in place.
pub fn remove_imports(
    analyzer: &dyn LanguageAnalyzer,
    path: &Path,
    source: &str,
    imports: &[ImportRef],
) -> Result<String> {
    if imports.is_empty() {
        return Ok(source.to_string());
    }
    analyzer.rewrite_without_imports(path, source, imports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImportKind, Language};
    use crate::parser::{JsAnalyzer, PhpAnalyzer};

    #[test]
    fn test_php_grouped_use_keeps_siblings() {
        let source = "<?php\nnamespace App;\n\nuse App\\Models\\{Post, User};\n\nclass A\n{\n    public function a(): User\n    {\n        return new User();\n    }\n}\n";
        let path = Path::new("A.php");
        let record = PhpAnalyzer.analyze_source(path, source).unwrap();
        let unused = PhpAnalyzer.find_unused_imports(&record);
        assert_eq!(unused.len(), 1);
        assert!(import_is_current(record.base(), &unused[0]));

        let out = remove_imports(&PhpAnalyzer, path, source, &unused).unwrap();
        assert!(!out.contains("Post"));
        assert!(out.contains("User"));
        PhpAnalyzer.validate_syntax(path, &out).unwrap();
    }

    #[test]
    fn test_js_named_import_rewrite_is_idempotent() {
        let source = "import { a, b } from './lib';\n\nexport function run() {\n  return a();\n}\n";
        let path = Path::new("run.js");
        let record = JsAnalyzer.analyze_source(path, source).unwrap();
        assert_eq!(record.language(), Language::JavaScript);
        let unused = JsAnalyzer.find_unused_imports(&record);
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].local_name, "b");

        let once = remove_imports(&JsAnalyzer, path, source, &unused).unwrap();
        let twice = remove_imports(&JsAnalyzer, path, &once, &unused).unwrap();
        assert_eq!(once, twice);
        assert!(once.contains("import { a } from './lib'"));
    }

    #[test]
    fn test_stale_import_detected() {
        let mut base = BaseFileAnalysis::new("a.php", Language::Php, 10, 3);
        base.imports.push(ImportRef::new("App\\A", "A", 3, ImportKind::Class));
        assert!(import_is_current(&base, &ImportRef::new("\\App\\A", "A", 3, ImportKind::Class)));
        assert!(!import_is_current(&base, &ImportRef::new("App\\A", "A", 4, ImportKind::Class)));
        assert!(!import_is_current(&base, &ImportRef::new("App\\B", "B", 3, ImportKind::Class)));
    }
}
