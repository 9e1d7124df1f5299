use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CleanupError, Result};
use crate::model::{DynamicReference, Language};

struct Pattern {
    name: &'static str,
    regex: Regex,
}

fn patterns(defs: &[(&'static str, &str)]) -> Vec<Pattern> {
    defs.iter()
        .map(|&(name, re)| Pattern {
            name,
            regex: Regex::new(re).unwrap(),
        })
        .collect()
}

static PHP_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    patterns(&[
        ("variable-member", r"\$\w+\s*(?:->|::)\s*(?:\$|\{)"),
        ("variable-function", r"(?:^|[^\w$>:])\$\w+\s*\("),
        ("variable-variable", r"\$\$\w+|\$\{"),
        ("call-user-func", r"\bcall_user_func(?:_array)?\s*\("),
        ("variable-class", r"\bnew\s+\$\w+|\$\w+::\w+\s*\("),
        ("reflection", r"\b(?:method_exists|property_exists|is_callable)\s*\("),
        ("container-string", r"\b(?:app|resolve)\s*\(\s*\$"),
        ("magic-dispatch", r"function\s+__(?:call|callStatic|get|set)\b"),
        ("eval", r"\beval\s*\("),
    ])
});

static JS_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    patterns(&[
        ("computed-call", r"\[\s*[A-Za-z_$][\w$]*\s*\]\s*\("),
        ("eval", r"\beval\s*\(|\bnew\s+Function\s*\("),
        ("dynamic-import", r#"\bimport\s*\(\s*[^'"`\s)]"#),
        ("dynamic-require", r#"\brequire\s*\(\s*[^'"`\s)]"#),
        ("global-lookup", r"\b(?:window|globalThis)\s*\["),
    ])
});

static TEMPLATE_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    patterns(&[
        ("dynamic-include", r"@include(?:If|When|First)?\s*\(\s*\$"),
        ("dynamic-component", r"<x-dynamic-component\b|@component\s*\(\s*\$"),
        ("dynamic-view", r"\bview\s*\(\s*\$"),
        ("livewire-variable", r"@livewire\s*\(\s*\$"),
    ])
});

fn line_of(source: &str, offset: usize) -> u32 {
    source[..offset].matches('\n').count() as u32 + 1
}

fn snippet(source: &str, offset: usize) -> String {
    let start = source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = source[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(source.len());
    source[start..end].trim().chars().take(120).collect()
}

fn collect<'p>(
    source: &str,
    patterns: impl Iterator<Item = (&'p str, &'p Regex)>,
    out: &mut Vec<DynamicReference>,
) {
    for (name, regex) in patterns {
        for m in regex.find_iter(source) {
            let anchor = m.end().saturating_sub(1).max(m.start());
            let line = line_of(source, anchor);
            if out.iter().any(|d| d.line == line && d.pattern == name) {
                continue;
            }
            out.push(DynamicReference {
                line,
                pattern: name.to_string(),
                snippet: snippet(source, anchor),
            });
        }
    }
}

/// Constructs that reach symbols by computed name.
pub fn scan(source: &str, language: Language) -> Vec<DynamicReference> {
    let builtin: &[Pattern] = match language {
        Language::Php | Language::Route => PHP_PATTERNS.as_slice(),
        Language::JavaScript => JS_PATTERNS.as_slice(),
        Language::Template => TEMPLATE_PATTERNS.as_slice(),
        Language::Css | Language::Asset => &[],
    };
    let mut out = Vec::new();
    collect(source, builtin.iter().map(|p| (p.name, &p.regex)), &mut out);
    out.sort_by_key(|d| d.line);
    out
}

/// Additional project-specific patterns from the policy section.
#[derive(Debug, Default)]
pub struct DynamicPatterns {
    extra: Vec<(String, Regex)>,
}

impl DynamicPatterns {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let extra = patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map(|re| (p.clone(), re))
                    .map_err(|e| CleanupError::Config(format!("invalid dynamic pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { extra })
    }

    pub fn is_empty(&self) -> bool {
        self.extra.is_empty()
    }

    pub fn scan(&self, source: &str) -> Vec<DynamicReference> {
        let mut out = Vec::new();
        collect(
            source,
            self.extra.iter().map(|(name, re)| (name.as_str(), re)),
            &mut out,
        );
        out
    }
}
