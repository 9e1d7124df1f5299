use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::analysis::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateClassification {
    ExactDuplicate,
    NearDuplicate,
    SimilarLogic,
}

impl DuplicateClassification {
    /// `score >= exact` is exact, `score >= near` is near, anything else is
    /// similar logic.
    pub fn classify(score: f64, exact: f64, near: f64) -> Self {
        if score >= exact {
            DuplicateClassification::ExactDuplicate
        } else if score >= near {
            DuplicateClassification::NearDuplicate
        } else {
            DuplicateClassification::SimilarLogic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateClassification::ExactDuplicate => "exact_duplicate",
            DuplicateClassification::NearDuplicate => "near_duplicate",
            DuplicateClassification::SimilarLogic => "similar_logic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Low,
    Medium,
    High,
}

impl Effort {
    /// Effort from the amount of code involved and how alike the copies are.
    pub fn estimate(lines: u32, classification: DuplicateClassification) -> Self {
        match (classification, lines) {
            (DuplicateClassification::ExactDuplicate, 0..=30) => Effort::Low,
            (DuplicateClassification::ExactDuplicate, _) => Effort::Medium,
            (DuplicateClassification::NearDuplicate, 0..=15) => Effort::Low,
            (DuplicateClassification::NearDuplicate, 16..=60) => Effort::Medium,
            (DuplicateClassification::SimilarLogic, 0..=20) => Effort::Medium,
            _ => Effort::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLocation {
    pub file: PathBuf,
    pub line: u32,
    pub end_line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl CodeLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32, end_line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            end_line,
            symbol: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.line) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMethodMatch {
    pub language: Language,
    pub first: CodeLocation,
    pub second: CodeLocation,
    /// In `[0.0, 1.0]`.
    pub similarity: f64,
    pub classification: DuplicateClassification,
    pub effort: Effort,
    pub refactoring_steps: Vec<String>,
}

impl DuplicateMethodMatch {
    pub fn new(
        language: Language,
        first: CodeLocation,
        second: CodeLocation,
        similarity: f64,
        classification: DuplicateClassification,
    ) -> Self {
        let similarity = similarity.clamp(0.0, 1.0);
        let lines = first.line_count().max(second.line_count());
        let effort = Effort::estimate(lines, classification);
        let refactoring_steps = method_steps(&first, &second, classification);
        Self {
            language,
            first,
            second,
            similarity,
            classification,
            effort,
            refactoring_steps,
        }
    }

    /// Lines that disappear if the second copy delegates to the first.
    pub fn potential_line_savings(&self) -> u32 {
        self.second.line_count().saturating_sub(1)
    }

    pub fn to_suggestion(&self) -> RefactoringSuggestion {
        RefactoringSuggestion {
            title: format!(
                "Consolidate {} and {}",
                self.first.symbol.as_deref().unwrap_or("method"),
                self.second.symbol.as_deref().unwrap_or("method")
            ),
            classification: self.classification,
            effort: self.effort,
            locations: vec![self.first.clone(), self.second.clone()],
            similarity: self.similarity,
            steps: self.refactoring_steps.clone(),
        }
    }
}

fn method_steps(
    first: &CodeLocation,
    second: &CodeLocation,
    classification: DuplicateClassification,
) -> Vec<String> {
    let a = first.symbol.as_deref().unwrap_or("the first method");
    let b = second.symbol.as_deref().unwrap_or("the second method");
    let mut steps = Vec::new();
    match classification {
        DuplicateClassification::ExactDuplicate => {
            steps.push(format!("Keep {} as the single implementation", a));
            steps.push(format!("Replace the body of {} with a call to {}", b, a));
        }
        DuplicateClassification::NearDuplicate => {
            steps.push(format!("Diff {} against {} and list the differing values", a, b));
            steps.push("Extract a shared helper that takes the differing values as parameters".into());
            steps.push(format!("Rewrite {} and {} to call the helper", a, b));
        }
        DuplicateClassification::SimilarLogic => {
            steps.push(format!("Review {} and {} for a common abstraction", a, b));
            steps.push("Extract only the shared steps if the intent is the same".into());
        }
    }
    if first.file != second.file {
        steps.push("Move the shared code to a trait, service or module both files can use".into());
    }
    steps.push("Run the test suite".into());
    steps
}

/// Repeated markup that can become one reusable component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentExtractionSuggestion {
    /// Kebab-case component name, used as `<x-name />`.
    pub name: String,
    pub root_tag: String,
    pub occurrences: Vec<CodeLocation>,
    pub element_count: usize,
    pub line_savings: u32,
    pub similarity: f64,
    pub classification: DuplicateClassification,
    pub effort: Effort,
    /// Occurrences × line savings; higher is extracted first.
    pub priority: f64,
    /// Every occurrence is byte-identical, so replacement is mechanical.
    pub auto_applicable: bool,
    pub component_path: PathBuf,
    /// Markup placed in the new component file.
    pub content: String,
    pub refactoring_steps: Vec<String>,
}

impl ComponentExtractionSuggestion {
    pub fn priority_for(occurrences: usize, line_savings: u32) -> f64 {
        occurrences as f64 * line_savings as f64
    }

    pub fn tag(&self) -> String {
        format!("<x-{} />", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefactoringSuggestion {
    pub title: String,
    pub classification: DuplicateClassification,
    pub effort: Effort,
    pub locations: Vec<CodeLocation>,
    pub similarity: f64,
    pub steps: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_thresholds() {
        let classify = |s| DuplicateClassification::classify(s, 0.95, 0.80);
        assert_eq!(classify(0.98), DuplicateClassification::ExactDuplicate);
        assert_eq!(classify(0.95), DuplicateClassification::ExactDuplicate);
        assert_eq!(classify(0.85), DuplicateClassification::NearDuplicate);
        assert_eq!(classify(0.80), DuplicateClassification::NearDuplicate);
        assert_eq!(classify(0.60), DuplicateClassification::SimilarLogic);
    }

    #[test]
    fn test_classification_serializes_snake_case() {
        let json = serde_json::to_string(&DuplicateClassification::NearDuplicate).unwrap();
        assert_eq!(json, "\"near_duplicate\"");
    }

    #[test]
    fn test_match_clamps_similarity() {
        let m = DuplicateMethodMatch::new(
            Language::Php,
            CodeLocation::new("a.php", 1, 5).with_symbol("A::x"),
            CodeLocation::new("b.php", 1, 5).with_symbol("B::y"),
            1.3,
            DuplicateClassification::ExactDuplicate,
        );
        assert_eq!(m.similarity, 1.0);
        assert_eq!(m.effort, Effort::Low);
        assert!(m.refactoring_steps.iter().any(|s| s.contains("B::y")));
        assert_eq!(m.potential_line_savings(), 4);
    }

    #[test]
    fn test_priority_scales_with_occurrences() {
        assert!(
            ComponentExtractionSuggestion::priority_for(4, 10)
                > ComponentExtractionSuggestion::priority_for(2, 10)
        );
    }
}
