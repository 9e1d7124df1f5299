use std::path::Path;

use super::assets::asset_references;
use super::lexer::{self, Flavor, Token, TokenKind};
use super::LanguageAnalyzer;
use crate::error::{CleanupError, Result};
use crate::model::{
    BaseFileAnalysis, CssFileAnalysis, CssSelector, FileAnalysis, ImportKind, ImportRef, Language,
    ReferenceKind, SymbolReference,
};

/// At-rules whose blocks hold further rules rather than declarations.
const NESTING_AT_RULES: &[&str] = &["media", "supports", "layer", "container", "document", "scope"];

const IMPORT_AT_RULES: &[&str] = &["import", "use", "forward"];

pub struct CssAnalyzer;

fn adjacent(a: &Token<'_>, b: &Token<'_>) -> bool {
    a.end == b.start
}

fn push_unique(list: &mut Vec<CssSelector>, name: &str, line: u32) {
    if !list.iter().any(|s| s.name == name) {
        list.push(CssSelector {
            name: name.to_string(),
            line,
        });
    }
}

fn prelude_selectors(prelude: &[Token<'_>], classes: &mut Vec<CssSelector>, ids: &mut Vec<CssSelector>) {
    for pair in prelude.windows(2) {
        let (marker, name) = (&pair[0], &pair[1]);
        if name.kind != TokenKind::Ident || !adjacent(marker, name) {
            continue;
        }
        match marker.text {
            "." => push_unique(classes, name.text, name.line),
            "#" => push_unique(ids, name.text, name.line),
            _ => {}
        }
    }
}

/// Class and id selectors declared in rule preludes.
pub fn selectors(sig: &[Token<'_>]) -> (Vec<CssSelector>, Vec<CssSelector>) {
    let mut classes = Vec::new();
    let mut ids = Vec::new();
    let mut prelude_start = 0;
    let mut i = 0;

    while i < sig.len() {
        match sig[i].text {
            "{" if i > 0 && sig[i - 1].text == "#" && adjacent(&sig[i - 1], &sig[i]) => {
                i = lexer::matching_close(sig, i).map(|c| c + 1).unwrap_or(i + 1);
            }
            "{" => {
                let prelude = &sig[prelude_start..i];
                let at_rule = match prelude {
                    [at, name, ..] if at.text == "@" => Some(name.text.to_ascii_lowercase()),
                    _ => None,
                };
                match at_rule {
                    Some(rule) if NESTING_AT_RULES.contains(&rule.as_str()) => i += 1,
                    Some(_) => {
                        i = lexer::matching_close(sig, i).map(|c| c + 1).unwrap_or(i + 1);
                    }
                    None => {
                        prelude_selectors(prelude, &mut classes, &mut ids);
                        i += 1;
                    }
                }
                prelude_start = i;
            }
            ";" | "}" => {
                i += 1;
                prelude_start = i;
            }
            _ => i += 1,
        }
    }

    (classes, ids)
}

fn imports(source: &str, sig: &[Token<'_>]) -> Vec<ImportRef> {
    let mut out = Vec::new();
    for i in 0..sig.len().saturating_sub(2) {
        let is_import = sig[i].text == "@"
            && IMPORT_AT_RULES
                .iter()
                .any(|r| sig[i + 1].is_keyword(r) && adjacent(&sig[i], &sig[i + 1]));
        if !is_import {
            continue;
        }
        let target = &sig[i + 2];
        let path = match target.kind {
            TokenKind::Str => Some(target.unquoted().to_string()),
            TokenKind::Ident if target.is_keyword("url") => lexer::matching_close(sig, i + 3)
                .filter(|_| sig.get(i + 3).map(|t| t.text == "(").unwrap_or(false))
                .map(|close| {
                    source[sig[i + 3].end..sig[close].start]
                        .trim()
                        .trim_matches(|c| c == '"' || c == '\'')
                        .to_string()
                }),
            _ => None,
        };
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            out.push(
                ImportRef::new(path.clone(), path.clone(), target.line, ImportKind::Stylesheet)
                    .with_source(path),
            );
        }
    }
    out
}

impl LanguageAnalyzer for CssAnalyzer {
    fn language(&self) -> Language {
        Language::Css
    }

    fn flavor(&self) -> Flavor {
        Flavor::Css
    }

    fn analyze_source(&self, path: &Path, source: &str) -> Result<FileAnalysis> {
        self.validate_syntax(path, source)?;
        let lexed = lexer::lex(source, Flavor::Css);
        let sig = lexed.significant();
        let (classes, ids) = selectors(&sig);

        let mut base = BaseFileAnalysis::new(
            path,
            Language::Css,
            source.len() as u64,
            source.lines().count() as u32,
        );
        base.imports = imports(source, &sig);
        base.references = base
            .imports
            .iter()
            .map(|i| SymbolReference::new(i.symbol.clone(), i.line, ReferenceKind::Stylesheet))
            .collect();
        base.references.extend(asset_references(source));
        base.tokens = lexer::count_tokens(&lexed.tokens, &[]);

        Ok(FileAnalysis::Css(CssFileAnalysis { base, classes, ids }))
    }

    fn validate_syntax(&self, path: &Path, source: &str) -> Result<()> {
        let lexed = lexer::lex(source, Flavor::Css);
        if let Some(err) = lexed.errors.first() {
            return Err(CleanupError::syntax(path, err.to_string()));
        }
        lexer::check_balance(&lexed.significant())
            .map_err(|err| CleanupError::syntax(path, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_CSS: &str = r#"@import 'buttons.css';
@import url("forms.css");

/* .commented-out { } */
.card, .card-header > a.link:hover {
    color: #fff;
    background: url(../images/bg.png);
}

#main .grid {
    margin: .5rem;
}

@media (max-width: 600px) {
    .card { padding: 0; }
    .mobile-only { display: block; }
}

@keyframes spin {
    from { transform: rotate(0deg); }
    to { transform: rotate(360deg); }
}
"#;

    fn analyze() -> CssFileAnalysis {
        match CssAnalyzer.analyze_source(Path::new("app.css"), APP_CSS).unwrap() {
            FileAnalysis::Css(c) => c,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_class_and_id_selectors() {
        let css = analyze();
        let classes: Vec<_> = css.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(classes, vec!["card", "card-header", "link", "grid", "mobile-only"]);
        let ids: Vec<_> = css.ids.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(ids, vec!["main"]);
        assert_eq!(css.classes[0].line, 5);
    }

    #[test]
    fn test_stylesheet_imports_never_unused() {
        let css = analyze();
        let paths: Vec<_> = css.base.imports.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(paths, vec!["buttons.css", "forms.css"]);
        let analysis = FileAnalysis::Css(css);
        assert!(CssAnalyzer.find_unused_imports(&analysis).is_empty());
    }

    #[test]
    fn test_asset_urls_are_references() {
        let css = analyze();
        assert!(css
            .base
            .references
            .iter()
            .any(|r| r.kind == ReferenceKind::Asset && r.name == "../images/bg.png"));
    }

    #[test]
    fn test_unbalanced_braces_rejected() {
        assert!(CssAnalyzer
            .validate_syntax(Path::new("a.css"), ".a { color: red;")
            .is_err());
    }
}
