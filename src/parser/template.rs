use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use super::assets::asset_references;
use super::lexer::{self, Flavor};
use super::LanguageAnalyzer;
use crate::detector::markup::extract_fragments;
use crate::error::{CleanupError, Result};
use crate::model::{
    BaseFileAnalysis, FileAnalysis, Language, ReferenceKind, SymbolReference, TemplateAnalysis,
};
use crate::safety::dynamic;

static DIRECTIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|[^\w@])@([A-Za-z]+)").unwrap());
static STRING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"'([^']*)'|"([^"]*)""#).unwrap());
static COMPONENT_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<x-([\w\-\.:]+)").unwrap());
static CLASS_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|\s)class\s*=\s*"([^"]*)""#).unwrap());
static SCRIPT_SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<script\b[^>]*\bsrc\s*=\s*["']([^"'{}]+)["']"#).unwrap());
static LINK_HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<link\b[^>]*\bhref\s*=\s*["']([^"'{}]+\.s?css)(?:\?[^"']*)?["']"#).unwrap());
static ASSET_HELPER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:asset|secure_asset|mix|Vite::asset)\s*\(\s*['"]([^'"]+)['"]"#).unwrap()
});

/// Block directives and the directives that may close them.
const BLOCKS: &[(&str, &[&str])] = &[
    ("if", &["endif"]),
    ("hasSection", &["endif"]),
    ("sectionMissing", &["endif"]),
    ("unless", &["endunless"]),
    ("isset", &["endisset"]),
    ("empty", &["endempty"]),
    ("auth", &["endauth"]),
    ("guest", &["endguest"]),
    ("foreach", &["endforeach"]),
    ("forelse", &["endforelse"]),
    ("for", &["endfor"]),
    ("while", &["endwhile"]),
    ("switch", &["endswitch"]),
    ("push", &["endpush"]),
    ("pushOnce", &["endPushOnce"]),
    ("prepend", &["endprepend"]),
    ("component", &["endcomponent"]),
    ("slot", &["endslot"]),
    ("can", &["endcan"]),
    ("cannot", &["endcannot"]),
    ("canany", &["endcanany"]),
    ("env", &["endenv"]),
    ("production", &["endproduction"]),
    ("error", &["enderror"]),
    ("once", &["endonce"]),
    ("fragment", &["endfragment"]),
    ("section", &["endsection", "show", "stop", "overwrite", "append"]),
    ("php", &["endphp"]),
    ("verbatim", &["endverbatim"]),
];

/// Directives that take a second argument as inline content instead of a block.
const INLINE_WITH_VALUE: &[&str] = &["section", "slot", "push", "prepend"];

const INCLUDE_DIRECTIVES: &[&str] = &[
    "include", "includeIf", "includeWhen", "includeUnless", "includeFirst", "each", "component",
];

#[derive(Debug)]
struct Directive<'s> {
    name: &'s str,
    args: Option<&'s str>,
    line: u32,
}

fn line_at(source: &str, offset: usize) -> u32 {
    source[..offset].matches('\n').count() as u32 + 1
}

/// Byte ranges of `{{ }}`, `{!! !!}` and `{{-- --}}` regions.
fn echo_ranges(path: &Path, source: &str) -> Result<Vec<(usize, usize)>> {
    let mut ranges = Vec::new();
    let mut pos = 0;
    while let Some(found) = source[pos..].find('{') {
        let start = pos + found;
        let rest = &source[start..];
        let escaped = start > 0 && source.as_bytes()[start - 1] == b'@';
        let (open, close) = if rest.starts_with("{{--") {
            ("{{--", "--}}")
        } else if rest.starts_with("{{") && !escaped {
            ("{{", "}}")
        } else if rest.starts_with("{!!") {
            ("{!!", "!!}")
        } else {
            pos = start + 1;
            continue;
        };
        match source[start + open.len()..].find(close) {
            Some(end) => {
                let end = start + open.len() + end + close.len();
                ranges.push((start, end));
                pos = end;
            }
            None => {
                return Err(CleanupError::syntax(
                    path,
                    format!("line {}: unclosed '{}'", line_at(source, start), open),
                ))
            }
        }
    }
    Ok(ranges)
}

fn balanced_args(source: &str, open: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn directives<'s>(source: &'s str, skip: &[(usize, usize)]) -> Vec<Directive<'s>> {
    let mut out = Vec::new();
    let mut raw_until: Option<&'static str> = None;

    for cap in DIRECTIVE_RE.captures_iter(source) {
        let name_match = match cap.get(2) {
            Some(m) => m,
            None => continue,
        };
        let at = name_match.start() - 1;
        if skip.iter().any(|&(s, e)| at >= s && at < e) {
            continue;
        }
        let name = name_match.as_str();

        if let Some(end) = raw_until {
            if name == end {
                raw_until = None;
                out.push(Directive {
                    name,
                    args: None,
                    line: line_at(source, at),
                });
            }
            continue;
        }

        let after = &source[name_match.end()..];
        let trimmed = after.trim_start_matches([' ', '\t']);
        let args = if trimmed.starts_with('(') {
            let open = name_match.end() + (after.len() - trimmed.len());
            balanced_args(source, open).map(|close| &source[open + 1..close])
        } else {
            None
        };

        match (name, args) {
            ("verbatim", _) => raw_until = Some("endverbatim"),
            ("php", None) => raw_until = Some("endphp"),
            _ => {}
        }

        out.push(Directive {
            name,
            args,
            line: line_at(source, at),
        });
    }
    out
}

fn has_top_level_comma(args: &str) -> bool {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in args.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => depth -= 1,
                ',' if depth == 0 => return true,
                _ => {}
            },
        }
    }
    false
}

fn opens_block(directive: &Directive<'_>) -> Option<&'static [&'static str]> {
    let closers = BLOCKS
        .iter()
        .find(|(open, _)| *open == directive.name)
        .map(|(_, closers)| *closers)?;
    match (directive.name, directive.args) {
        ("php", Some(_)) => None,
        ("empty", None) => None,
        (name, Some(args)) if INLINE_WITH_VALUE.contains(&name) && has_top_level_comma(args) => None,
        _ => Some(closers),
    }
}

fn is_closer(name: &str) -> bool {
    BLOCKS.iter().any(|(_, closers)| closers.contains(&name))
}

fn check_directives(path: &Path, directives: &[Directive<'_>]) -> Result<()> {
    let mut stack: Vec<(&str, &[&str], u32)> = Vec::new();
    for directive in directives {
        if let Some(closers) = opens_block(directive) {
            stack.push((directive.name, closers, directive.line));
            continue;
        }
        if !is_closer(directive.name) {
            continue;
        }
        match stack.last() {
            Some((_, closers, _)) if closers.contains(&directive.name) => {
                stack.pop();
            }
            Some((open, _, line)) => {
                return Err(CleanupError::syntax(
                    path,
                    format!(
                        "line {}: @{} does not close @{} opened on line {}",
                        directive.line, directive.name, open, line
                    ),
                ))
            }
            None => {
                return Err(CleanupError::syntax(
                    path,
                    format!("line {}: unexpected @{}", directive.line, directive.name),
                ))
            }
        }
    }
    match stack.last() {
        Some((open, _, line)) => Err(CleanupError::syntax(
            path,
            format!("line {}: @{} is never closed", line, open),
        )),
        None => Ok(()),
    }
}

fn string_args(args: &str) -> Vec<String> {
    STRING_RE
        .captures_iter(args)
        .filter_map(|cap| cap.get(1).or_else(|| cap.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn looks_like_view(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '/'))
}

fn script_kind(path: &str) -> Option<ReferenceKind> {
    let bare = path.split(['?', '#']).next().unwrap_or(path);
    if bare.ends_with(".js") || bare.ends_with(".mjs") || bare.ends_with(".jsx") {
        Some(ReferenceKind::Script)
    } else if bare.ends_with(".css") || bare.ends_with(".scss") {
        Some(ReferenceKind::Stylesheet)
    } else {
        None
    }
}

pub struct TemplateAnalyzer {
    views_dir: PathBuf,
}

impl TemplateAnalyzer {
    pub fn new(root: &Path) -> Self {
        Self {
            views_dir: root.join("resources").join("views"),
        }
    }

    /// Dotted view name (`layouts.app`) for a template under the views directory.
    pub fn view_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.views_dir).ok()?;
        let text = relative.to_string_lossy().replace('\\', "/");
        let stem = text.strip_suffix(".blade.php")?;
        Some(stem.replace('/', "."))
    }
}

impl LanguageAnalyzer for TemplateAnalyzer {
    fn language(&self) -> Language {
        Language::Template
    }

    fn flavor(&self) -> Flavor {
        Flavor::Php
    }

    fn analyze_source(&self, path: &Path, source: &str) -> Result<FileAnalysis> {
        let echoes = echo_ranges(path, source)?;
        let found = directives(source, &echoes);
        check_directives(path, &found)?;

        let mut base = BaseFileAnalysis::new(
            path,
            Language::Template,
            source.len() as u64,
            source.lines().count() as u32,
        );
        let mut sections = Vec::new();

        for directive in &found {
            let args = match directive.args {
                Some(args) => args,
                None => continue,
            };
            let strings = string_args(args);
            let kind = match directive.name {
                "extends" => Some(ReferenceKind::Layout),
                name if INCLUDE_DIRECTIVES.contains(&name) => Some(ReferenceKind::Include),
                "section" | "yield" | "hasSection" | "sectionMissing" => {
                    if let Some(first) = strings.first() {
                        if !sections.contains(first) {
                            sections.push(first.clone());
                        }
                    }
                    None
                }
                "vite" => {
                    for s in &strings {
                        if let Some(kind) = script_kind(s) {
                            base.references
                                .push(SymbolReference::new(s.clone(), directive.line, kind));
                        }
                    }
                    None
                }
                _ => None,
            };
            if let Some(kind) = kind {
                for view in strings.into_iter().filter(|s| looks_like_view(s)) {
                    base.references
                        .push(SymbolReference::new(view, directive.line, kind));
                }
            }
        }

        let mut components_used = Vec::new();
        for cap in COMPONENT_TAG_RE.captures_iter(source) {
            let name = &cap[1];
            if name == "slot" || name.starts_with("slot:") || name == "dynamic-component" {
                continue;
            }
            let line = line_at(source, cap.get(0).map(|m| m.start()).unwrap_or(0));
            base.references
                .push(SymbolReference::new(name, line, ReferenceKind::Component));
            if !components_used.iter().any(|c: &String| c == name) {
                components_used.push(name.to_string());
            }
        }

        for re in [&*SCRIPT_SRC_RE, &*LINK_HREF_RE, &*ASSET_HELPER_RE] {
            for cap in re.captures_iter(source) {
                let m = match cap.get(1) {
                    Some(m) => m,
                    None => continue,
                };
                if let Some(kind) = script_kind(m.as_str()) {
                    base.references.push(SymbolReference::new(
                        m.as_str(),
                        line_at(source, m.start()),
                        kind,
                    ));
                }
            }
        }
        base.references.extend(asset_references(source));

        let mut css_classes_used: Vec<String> = Vec::new();
        for cap in CLASS_ATTR_RE.captures_iter(source) {
            for class in cap[1].split_whitespace() {
                if class.contains(['{', '}', '$', '@', '(', ')']) {
                    continue;
                }
                if !css_classes_used.iter().any(|c| c == class) {
                    css_classes_used.push(class.to_string());
                }
            }
        }

        let mut tokens = BTreeMap::new();
        lexer::count_words(source, &mut tokens);
        base.tokens = tokens;
        base.dynamic_references = dynamic::scan(source, Language::Template);

        Ok(FileAnalysis::Template(TemplateAnalysis {
            base,
            view_name: self.view_name(path),
            sections,
            components_used,
            css_classes_used,
            fragments: extract_fragments(source),
        }))
    }

    fn validate_syntax(&self, path: &Path, source: &str) -> Result<()> {
        let echoes = echo_ranges(path, source)?;
        check_directives(path, &directives(source, &echoes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"@extends('layouts.app')

@section('title', 'Products')

@section('content')
    {{-- @if this is a comment --}}
    <div class="card shadow {{ $extra }}">
        <x-alert type="info" />
        <x-forms.input name="q" />
        @include('partials.header', ['user' => $user])
        @foreach ($products as $product)
            <p>{{ $product->name }} - contact us at sales@example.com</p>
        @endforeach
        @@notADirective
    </div>
    @vite(['resources/css/app.css', 'resources/js/app.js'])
    <img src="{{ asset('images/logo.png') }}">
@endsection
"#;

    fn analyze(source: &str) -> Result<TemplateAnalysis> {
        let analyzer = TemplateAnalyzer::new(Path::new("/p"));
        match analyzer.analyze_source(Path::new("/p/resources/views/products/index.blade.php"), source)? {
            FileAnalysis::Template(t) => Ok(t),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_view_name_and_sections() {
        let t = analyze(PAGE).unwrap();
        assert_eq!(t.view_name.as_deref(), Some("products.index"));
        assert_eq!(t.sections, vec!["title".to_string(), "content".to_string()]);
    }

    #[test]
    fn test_references() {
        let t = analyze(PAGE).unwrap();
        let refs: Vec<_> = t.base.references.iter().map(|r| (r.kind, r.name.as_str())).collect();
        assert!(refs.contains(&(ReferenceKind::Layout, "layouts.app")));
        assert!(refs.contains(&(ReferenceKind::Include, "partials.header")));
        assert!(refs.contains(&(ReferenceKind::Component, "alert")));
        assert!(refs.contains(&(ReferenceKind::Component, "forms.input")));
        assert!(refs.contains(&(ReferenceKind::Stylesheet, "resources/css/app.css")));
        assert!(refs.contains(&(ReferenceKind::Script, "resources/js/app.js")));
        assert!(refs.contains(&(ReferenceKind::Asset, "images/logo.png")));
        assert_eq!(t.components_used, vec!["alert".to_string(), "forms.input".to_string()]);
    }

    #[test]
    fn test_css_classes_skip_interpolation() {
        let t = analyze(PAGE).unwrap();
        assert_eq!(t.css_classes_used, vec!["card".to_string(), "shadow".to_string()]);
    }

    #[test]
    fn test_words_are_tokens() {
        let t = analyze(PAGE).unwrap();
        assert!(t.base.token_count("product") >= 1);
        assert!(t.base.token_count("name") >= 1);
    }

    #[test]
    fn test_unclosed_directive_is_syntax_error() {
        let err = analyze("@if ($a)\n<p>x</p>\n").unwrap_err();
        assert!(matches!(err, CleanupError::Syntax { .. }));
        assert!(analyze("@foreach ($a as $b)\n@endif\n").is_err());
        assert!(analyze("<p>{{ $a </p>").is_err());
    }

    #[test]
    fn test_forelse_empty_separator_and_inline_php() {
        let src = "@forelse ($items as $item)\n<li>{{ $item }}</li>\n@empty\n<li>none</li>\n@endforelse\n@php($x = 1)\n@php\n$y = 2;\n@endphp\n";
        assert!(analyze(src).is_ok());
    }
}
