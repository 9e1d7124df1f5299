use std::collections::{HashMap, HashSet};
use std::path::Path;

use rayon::prelude::*;

use crate::config::SimilarityConfig;
use crate::model::{
    BaseFileAnalysis, CodeLocation, DuplicateClassification, DuplicateMethodMatch, Language, MethodInfo,
};
use crate::parser::lexer::{lex, TokenKind};
use crate::parser::Flavor;

/// Above this many cell updates the edit distance gives way to trigram
/// overlap.
const MAX_EDIT_CELLS: usize = 4_000_000;

const KEYWORDS: &[&str] = &[
    "abstract", "array", "as", "async", "await", "break", "case", "catch", "class", "clone", "const",
    "continue", "default", "delete", "do", "echo", "else", "elseif", "empty", "extends", "false", "finally",
    "fn", "for", "foreach", "function", "if", "implements", "in", "instanceof", "isset", "let", "list",
    "match", "new", "null", "of", "parent", "print", "private", "protected", "public", "return", "self",
    "static", "super", "switch", "this", "throw", "true", "try", "typeof", "undefined", "unset", "use",
    "var", "void", "while", "yield",
];

fn is_keyword(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    KEYWORDS.contains(&lower.as_str())
}

/// Significant tokens of a code body. With `rename`, identifiers and
/// variables become positional placeholders (`v0`, `v1`, ...) so that two
/// bodies differing only in naming normalise to the same sequence.
pub fn normalize_tokens(body: &str, flavor: Flavor, rename: bool) -> Vec<String> {
    let source;
    let text = if flavor == Flavor::Php && !body.contains("<?php") {
        source = format!("<?php\n{}", body);
        source.as_str()
    } else {
        body
    };

    let lexed = lex(text, flavor);
    let mut names: HashMap<&str, usize> = HashMap::new();
    let mut out = Vec::new();
    for token in lexed.significant() {
        let normalized = match token.kind {
            TokenKind::Variable if token.text == "$this" => token.text.to_string(),
            TokenKind::Ident if is_keyword(token.text) => token.text.to_ascii_lowercase(),
            TokenKind::Ident | TokenKind::Variable if rename => {
                let next = names.len();
                format!("v{}", names.entry(token.text).or_insert(next))
            }
            _ => token.text.to_string(),
        };
        out.push(normalized);
    }
    out
}

/// Token-level edit distance, two rows.
pub fn levenshtein<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, x) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(x != y);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn trigrams(tokens: &[String]) -> HashSet<&[String]> {
    tokens.windows(3).collect()
}

/// Dice coefficient over token trigrams.
pub fn ngram_similarity(a: &[String], b: &[String]) -> f64 {
    if a.len() < 3 || b.len() < 3 {
        return if a == b { 1.0 } else { 0.0 };
    }
    let left = trigrams(a);
    let right = trigrams(b);
    let shared = left.intersection(&right).count();
    (2 * shared) as f64 / (left.len() + right.len()) as f64
}

/// Similarity in `[0.0, 1.0]`: normalised edit distance, or trigram overlap
/// for very large inputs.
pub fn token_similarity(a: &[String], b: &[String]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    if a.len().saturating_mul(b.len()) > MAX_EDIT_CELLS {
        return ngram_similarity(a, b);
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

pub fn score_sources(a: &str, b: &str, flavor: Flavor, rename: bool) -> f64 {
    token_similarity(&normalize_tokens(a, flavor, rename), &normalize_tokens(b, flavor, rename))
}

struct Candidate<'a> {
    file: &'a Path,
    method: &'a MethodInfo,
    tokens: Vec<String>,
}

impl Candidate<'_> {
    fn location(&self) -> CodeLocation {
        CodeLocation::new(self.file, self.method.start_line, self.method.end_line)
            .with_symbol(self.method.qualified_name())
    }
}

/// Pairwise comparison of every method across `analyses`. Methods are
/// sorted by length so each one is only compared with methods at most
/// `max_line_ratio` times longer.
pub fn find_duplicate_methods(
    language: Language,
    flavor: Flavor,
    analyses: &[&BaseFileAnalysis],
    config: &SimilarityConfig,
) -> Vec<DuplicateMethodMatch> {
    let mut candidates: Vec<Candidate> = analyses
        .par_iter()
        .flat_map_iter(|base| {
            base.methods
                .iter()
                .filter(|m| m.line_count() as usize >= config.min_method_lines && !m.body.trim().is_empty())
                .map(move |m| Candidate {
                    file: &base.path,
                    method: m,
                    tokens: normalize_tokens(&m.body, flavor, config.rename_identifiers),
                })
        })
        .filter(|c| c.tokens.len() > 2)
        .collect();
    candidates.sort_by(|a, b| {
        a.method
            .line_count()
            .cmp(&b.method.line_count())
            .then_with(|| a.file.cmp(b.file))
            .then_with(|| a.method.line.cmp(&b.method.line))
    });

    let mut pairs = Vec::new();
    for i in 0..candidates.len() {
        let limit = candidates[i].method.line_count() as f64 * config.max_line_ratio;
        for j in i + 1..candidates.len() {
            if candidates[j].method.line_count() as f64 > limit {
                break;
            }
            pairs.push((i, j));
        }
    }

    let mut matches: Vec<DuplicateMethodMatch> = pairs
        .par_iter()
        .filter_map(|&(i, j)| {
            let (a, b) = (&candidates[i], &candidates[j]);
            let score = token_similarity(&a.tokens, &b.tokens);
            if score < config.minimum_score {
                return None;
            }
            let classification =
                DuplicateClassification::classify(score, config.exact_threshold, config.near_threshold);
            let (first, second) = if (a.file, a.method.line) <= (b.file, b.method.line) {
                (a, b)
            } else {
                (b, a)
            };
            Some(DuplicateMethodMatch::new(
                language,
                first.location(),
                second.location(),
                score,
                classification,
            ))
        })
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.first.file.cmp(&b.first.file))
            .then_with(|| a.first.line.cmp(&b.first.line))
            .then_with(|| a.second.file.cmp(&b.second.file))
            .then_with(|| a.second.line.cmp(&b.second.line))
    });
    tracing::debug!(
        language = language.as_str(),
        compared = pairs.len(),
        matches = matches.len(),
        "duplicate methods scored"
    );
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Visibility;

    fn method(owner: &str, name: &str, line: u32, body: &str) -> MethodInfo {
        let lines = body.lines().count() as u32;
        MethodInfo {
            name: name.to_string(),
            owner: Some(owner.to_string()),
            visibility: Visibility::Public,
            is_static: false,
            line,
            start_line: line,
            end_line: line + lines,
            parameters: vec![],
            body: body.to_string(),
        }
    }

    fn tokens(n: usize, prefix: &str) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein(&["a", "b", "c"], &["a", "b", "c"]), 0);
        assert_eq!(levenshtein(&["a", "b", "c"], &["a", "x", "c"]), 1);
        assert_eq!(levenshtein(&["a", "b"], &[]), 2);
        assert_eq!(levenshtein(&["k", "i", "t", "t", "e", "n"], &["s", "i", "t", "t", "i", "n", "g"]), 3);
    }

    #[test]
    fn test_similarity_maps_to_classification() {
        let classify = |s| DuplicateClassification::classify(s, 0.95, 0.80);
        let base = tokens(100, "t");

        let mut near98 = base.clone();
        near98[10] = "x".into();
        near98[20] = "y".into();
        assert!((token_similarity(&base, &near98) - 0.98).abs() < 1e-9);
        assert_eq!(classify(token_similarity(&base, &near98)), DuplicateClassification::ExactDuplicate);

        let mut near85 = base.clone();
        for i in 0..15 {
            near85[i * 6] = format!("x{}", i);
        }
        assert_eq!(classify(token_similarity(&base, &near85)), DuplicateClassification::NearDuplicate);

        let mut near60 = base.clone();
        for i in 0..40 {
            near60[i * 2] = format!("x{}", i);
        }
        assert!((token_similarity(&base, &near60) - 0.60).abs() < 1e-9);
        assert_eq!(classify(token_similarity(&base, &near60)), DuplicateClassification::SimilarLogic);
    }

    #[test]
    fn test_renaming_ignores_identifier_choice() {
        let a = "{\n    $total = 0;\n    foreach ($items as $item) { $total += $item->price; }\n    return $total;\n}";
        let b = "{\n    $sum = 0;\n    foreach ($rows as $row) { $sum += $row->price; }\n    return $sum;\n}";
        assert_eq!(score_sources(a, b, Flavor::Php, true), 1.0);
        assert!(score_sources(a, b, Flavor::Php, false) < 1.0);
    }

    #[test]
    fn test_comments_and_whitespace_ignored() {
        let a = "{\n  // add\n  return a + b;\n}";
        let b = "{ return a   +   b; /* sum */ }";
        assert_eq!(score_sources(a, b, Flavor::JavaScript, false), 1.0);
    }

    #[test]
    fn test_ngram_fallback_bounds() {
        let a = tokens(10, "a");
        assert_eq!(ngram_similarity(&a, &a), 1.0);
        assert_eq!(ngram_similarity(&a, &tokens(10, "b")), 0.0);
    }

    #[test]
    fn test_find_duplicate_methods_respects_ratio() {
        let body = "{\n    $x = $this->load($id);\n    $x->save();\n    return $x;\n}";
        let long_body = format!("{{\n{}}}", "    $this->step();\n".repeat(20));

        let mut first = BaseFileAnalysis::new("/p/A.php", Language::Php, 1, 1);
        first.methods.push(method("A", "store", 3, body));
        first.methods.push(method("A", "huge", 20, &long_body));
        let mut second = BaseFileAnalysis::new("/p/B.php", Language::Php, 1, 1);
        second.methods.push(method("B", "persist", 5, body));

        let config = SimilarityConfig::default();
        let matches = find_duplicate_methods(Language::Php, Flavor::Php, &[&first, &second], &config);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].classification, DuplicateClassification::ExactDuplicate);
        assert_eq!(matches[0].first.symbol.as_deref(), Some("A::store"));
        assert_eq!(matches[0].second.symbol.as_deref(), Some("B::persist"));
    }
}
