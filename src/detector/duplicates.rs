use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::similarity::token_similarity;
use crate::config::SimilarityConfig;
use crate::model::{
    BaseFileAnalysis, CodeLocation, CodebaseAnalysis, ComponentExtractionSuggestion, DuplicateClassification,
    DuplicateMethodMatch, Effort, Language, MarkupFragment, TemplateAnalysis,
};
use crate::parser::Analyzers;

pub const COMPONENTS_DIR: &str = "resources/views/components";

static CLASS_ATTR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"class\s*=\s*["']([^"']+)["']"#).unwrap());

/// Output of the duplicate detector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateFindings {
    pub methods: Vec<DuplicateMethodMatch>,
    pub components: Vec<ComponentExtractionSuggestion>,
}

impl DuplicateFindings {
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.components.is_empty()
    }
}

pub fn detect_duplicates(
    analysis: &CodebaseAnalysis,
    analyzers: &Analyzers,
    config: &SimilarityConfig,
) -> DuplicateFindings {
    let mut families: BTreeMap<Language, Vec<&BaseFileAnalysis>> = BTreeMap::new();
    for base in analysis.files() {
        if let Some(family) = base.language.duplicate_family() {
            families.entry(family).or_default().push(base);
        }
    }

    let mut methods = Vec::new();
    for (language, bases) in families {
        methods.extend(analyzers.get(language).find_duplicate_methods(&bases, config));
    }

    let components = find_component_candidates(&analysis.root, &analysis.templates, config);
    tracing::info!(
        methods = methods.len(),
        components = components.len(),
        "duplicate detection complete"
    );
    DuplicateFindings { methods, components }
}

struct Occurrence<'a> {
    file: &'a Path,
    fragment: &'a MarkupFragment,
}

fn kebab(raw: &str) -> String {
    let mut out = String::new();
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

fn component_name(fragment: &MarkupFragment, taken: &mut HashSet<String>) -> String {
    let first_line = fragment.text.lines().next().unwrap_or("");
    let base = CLASS_ATTR_RE
        .captures(first_line)
        .and_then(|c| c[1].split_whitespace().find(|w| !w.contains("{{")).map(kebab))
        .filter(|n| !n.is_empty() && n.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false))
        .unwrap_or_else(|| format!("{}-block", kebab(&fragment.root_tag)));

    let mut name = base.clone();
    let mut n = 2;
    while taken.contains(&name) {
        name = format!("{}-{}", base, n);
        n += 1;
    }
    taken.insert(name.clone());
    name
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

fn average_similarity(occurrences: &[Occurrence]) -> f64 {
    let first = words(&occurrences[0].fragment.text);
    let scores: Vec<f64> = occurrences[1..]
        .iter()
        .map(|o| token_similarity(&first, &words(&o.fragment.text)))
        .collect();
    scores.iter().sum::<f64>() / scores.len().max(1) as f64
}

fn component_steps(name: &str, occurrences: usize, auto: bool) -> Vec<String> {
    let mut steps = vec![format!("Create resources/views/components/{}.blade.php", name)];
    if auto {
        steps.push(format!("Replace the {} identical blocks with <x-{} />", occurrences, name));
    } else {
        steps.push("Move the differing text and variables into component props or slots".into());
        steps.push(format!("Replace each of the {} blocks with <x-{}> and its props", occurrences, name));
    }
    steps.push("Render the affected views and compare the output".into());
    steps
}

/// Groups template fragments by tag skeleton. Larger groups win; any
/// occurrence nested inside an already accepted occurrence is dropped.
pub fn find_component_candidates(
    root: &Path,
    templates: &[TemplateAnalysis],
    config: &SimilarityConfig,
) -> Vec<ComponentExtractionSuggestion> {
    let mut groups: BTreeMap<&str, Vec<Occurrence>> = BTreeMap::new();
    for template in templates {
        for fragment in &template.fragments {
            if fragment.element_count >= config.min_fragment_elements {
                groups.entry(fragment.skeleton.as_str()).or_default().push(Occurrence {
                    file: &template.base.path,
                    fragment,
                });
            }
        }
    }

    let mut ordered: Vec<Vec<Occurrence>> = groups.into_values().filter(|g| g.len() >= 2).collect();
    ordered.sort_by(|a, b| {
        b[0].fragment
            .element_count
            .cmp(&a[0].fragment.element_count)
            .then_with(|| b.len().cmp(&a.len()))
    });

    let mut taken: HashSet<String> = templates
        .iter()
        .filter_map(|t| t.view_name.as_deref())
        .filter_map(|v| v.strip_prefix("components."))
        .map(str::to_string)
        .collect();
    let mut accepted: Vec<(PathBuf, u32, u32)> = Vec::new();
    let mut suggestions = Vec::new();

    for group in ordered {
        let occurrences: Vec<Occurrence> = group
            .into_iter()
            .filter(|o| {
                !accepted
                    .iter()
                    .any(|(file, line, end)| file == o.file && *line <= o.fragment.line && o.fragment.end_line <= *end)
            })
            .collect();
        if occurrences.len() < 2 {
            continue;
        }

        let first = occurrences[0].fragment;
        let texts: BTreeSet<&str> = occurrences.iter().map(|o| o.fragment.text.as_str()).collect();
        let identical = texts.len() == 1;
        let similarity = if identical { 1.0 } else { average_similarity(&occurrences) };
        let classification = if identical {
            DuplicateClassification::ExactDuplicate
        } else {
            DuplicateClassification::classify(similarity, config.exact_threshold, config.near_threshold)
        };
        // Anonymous components do not see the parent's variables.
        let auto_applicable = identical && !first.text.contains('$');

        let name = component_name(first, &mut taken);
        let line_savings: u32 = occurrences.iter().map(|o| o.fragment.line_count() - 1).sum();
        let locations: Vec<CodeLocation> = occurrences
            .iter()
            .map(|o| CodeLocation::new(o.file, o.fragment.line, o.fragment.end_line))
            .collect();
        for location in &locations {
            accepted.push((location.file.clone(), location.line, location.end_line));
        }

        suggestions.push(ComponentExtractionSuggestion {
            refactoring_steps: component_steps(&name, locations.len(), auto_applicable),
            component_path: root.join(COMPONENTS_DIR).join(format!("{}.blade.php", name)),
            priority: ComponentExtractionSuggestion::priority_for(locations.len(), line_savings),
            effort: if auto_applicable {
                Effort::Low
            } else {
                Effort::estimate(first.line_count(), classification)
            },
            name,
            root_tag: first.root_tag.clone(),
            element_count: first.element_count,
            occurrences: locations,
            line_savings,
            similarity,
            classification,
            auto_applicable,
            content: format!("{}\n", first.text),
        });
    }

    suggestions.sort_by(|a, b| b.priority.total_cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
    suggestions
}
