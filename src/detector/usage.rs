use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::conventions::ConventionPolicy;
use crate::graph::{class_key, edge_usage_kind, method_key, GraphBuilder};
use crate::model::{
    symbol_key, BaseFileAnalysis, CodebaseAnalysis, CssSelector, Language, UsageKind, UsageLocation,
    UsageReport,
};
use crate::parser::path_in_dir;
use crate::resolver::SymbolResolver;

/// Lower-cased identifier → files mentioning it, parsed or not.
#[derive(Debug, Default, Clone)]
pub struct TokenIndex {
    by_token: HashMap<String, BTreeSet<PathBuf>>,
    outside_css: HashSet<String>,
}

impl TokenIndex {
    pub fn build(analysis: &CodebaseAnalysis) -> Self {
        let mut index = Self::default();
        for base in analysis.files() {
            for token in base.tokens.keys() {
                index.insert(token, &base.path, base.language != Language::Css);
            }
        }
        for (path, tokens) in &analysis.unparsed_tokens {
            for token in tokens {
                index.insert(token, path, true);
            }
        }
        index
    }

    fn insert(&mut self, token: &str, path: &Path, outside_css: bool) {
        let token = token.trim_start_matches('$').to_ascii_lowercase();
        if outside_css {
            self.outside_css.insert(token.clone());
        }
        self.by_token.entry(token).or_default().insert(path.to_path_buf());
    }

    pub fn files_with(&self, token: &str) -> impl Iterator<Item = &PathBuf> {
        self.by_token
            .get(&token.to_ascii_lowercase())
            .into_iter()
            .flat_map(|files| files.iter())
    }

    /// First file other than `file` that mentions `token`.
    pub fn first_outside(&self, token: &str, file: &Path) -> Option<&PathBuf> {
        self.files_with(token).find(|p| p.as_path() != file)
    }

    pub fn used_outside(&self, token: &str, file: &Path) -> bool {
        self.first_outside(token, file).is_some()
    }

    /// Mentioned by a template, script or PHP file.
    pub fn used_outside_css(&self, token: &str) -> bool {
        self.outside_css.contains(&token.to_ascii_lowercase())
    }
}

fn short_name(fqcn: &str) -> &str {
    fqcn.rsplit('\\').next().unwrap_or(fqcn)
}

fn file_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.split('.').next().filter(|s| !s.is_empty())
}

/// Names by which other files could mention `base` without a resolvable
/// reference.
fn textual_names(base: &BaseFileAnalysis) -> Vec<&str> {
    match base.language {
        Language::Php if !base.classes.is_empty() => base.classes.iter().map(|c| short_name(&c.fqcn)).collect(),
        Language::Template | Language::Route => Vec::new(),
        _ => file_stem(&base.path).into_iter().collect(),
    }
}

/// Reverse index, orphan and entry-point classification for one analysis.
pub struct UsageDetector<'a> {
    analysis: &'a CodebaseAnalysis,
    builder: GraphBuilder<'a>,
    policy: &'a ConventionPolicy,
    tokens: TokenIndex,
}

impl<'a> UsageDetector<'a> {
    pub fn new(analysis: &'a CodebaseAnalysis, resolver: &'a SymbolResolver, policy: &'a ConventionPolicy) -> Self {
        Self {
            analysis,
            builder: GraphBuilder::new(analysis, resolver),
            policy,
            tokens: TokenIndex::build(analysis),
        }
    }

    pub fn tokens(&self) -> &TokenIndex {
        &self.tokens
    }

    pub fn is_entry_point(&self, base: &BaseFileAnalysis) -> bool {
        base.language == Language::Route || self.policy.is_entry_point(self.analysis.relative(&base.path))
    }

    /// Every declared symbol and file mapped to the places that use it.
    pub fn scan_codebase_references(&self) -> UsageReport {
        let mut references: BTreeMap<String, Vec<UsageLocation>> = BTreeMap::new();
        let mut route_bound_methods = BTreeSet::new();
        let graph = &self.analysis.dependency_graph;

        for base in self.analysis.files() {
            let from_key = symbol_key::file(&base.path);
            for target in self.builder.targets(base) {
                let kind = if target.route_bound {
                    route_bound_methods.insert(target.node.clone());
                    UsageKind::RouteBinding
                } else {
                    edge_usage_kind(target.edge_type)
                };
                let location = UsageLocation::new(&base.path, Some(target.line), kind);
                let declaring = graph.node(&target.node).and_then(|n| n.file.clone());
                if let Some(declaring) = declaring.filter(|d| d != &base.path) {
                    let file_key = symbol_key::file(&declaring);
                    if file_key != target.node && file_key != from_key {
                        references.entry(file_key).or_default().push(location.clone());
                    }
                }
                references.entry(target.node).or_default().push(location);
            }
        }

        for base in self.analysis.files() {
            self.record_textual_uses(base, &mut references);
            self.record_conventions(base, &mut references);
        }

        for locations in references.values_mut() {
            locations.sort();
            locations.dedup();
        }

        let entry_points: Vec<PathBuf> = self
            .analysis
            .files()
            .filter(|b| self.is_entry_point(b))
            .map(|b| b.path.clone())
            .collect();

        let mut usage = UsageReport {
            references,
            orphaned_files: Vec::new(),
            entry_points,
            route_bound_methods,
            unused_css_selectors: Vec::new(),
            unused_assets: Vec::new(),
        };
        usage.orphaned_files = self.find_orphaned_files(&usage);
        usage.unused_assets = self.find_unused_assets();
        usage.unused_css_selectors = self.find_unused_css_selectors();
        usage
    }

    fn record_textual_uses(&self, base: &BaseFileAnalysis, references: &mut BTreeMap<String, Vec<UsageLocation>>) {
        let mut mention = |key: String, name: &str| {
            let hits: Vec<UsageLocation> = self
                .tokens
                .files_with(name)
                .filter(|p| p.as_path() != base.path)
                .map(|p| UsageLocation::new(p, None, UsageKind::Token))
                .collect();
            if !hits.is_empty() {
                references.entry(key).or_default().extend(hits);
            }
        };

        for class in &base.classes {
            mention(class_key(base, &class.fqcn), short_name(&class.fqcn));
        }
        for method in &base.methods {
            mention(method_key(base, method), &method.name);
        }
        if let Some(name) = textual_names(base).first() {
            mention(symbol_key::file(&base.path), name);
        }
    }

    fn record_conventions(&self, base: &BaseFileAnalysis, references: &mut BTreeMap<String, Vec<UsageLocation>>) {
        let relative = self.analysis.relative(&base.path);
        if self.is_entry_point(base) {
            references
                .entry(symbol_key::file(&base.path))
                .or_default()
                .push(UsageLocation::new(&base.path, None, UsageKind::EntryPoint));
        }
        if !matches!(base.language, Language::Php | Language::JavaScript) {
            return;
        }
        for method in &base.methods {
            if self.policy.is_implicit_method(relative, &method.name) {
                references
                    .entry(method_key(base, method))
                    .or_default()
                    .push(UsageLocation::new(&base.path, Some(method.line), UsageKind::Convention));
            }
        }
    }

    /// Files outside the allow-list with no inbound edge to the file or
    /// anything it declares, and no textual mention elsewhere.
    pub fn find_orphaned_files(&self, usage: &UsageReport) -> Vec<PathBuf> {
        let graph = &self.analysis.dependency_graph;
        let mut orphans: Vec<PathBuf> = self
            .analysis
            .files()
            .filter(|b| b.language != Language::Asset)
            .filter(|b| !usage.entry_points.contains(&b.path))
            .filter(|b| graph.inbound_to_file(&b.path).is_empty())
            .filter(|b| !textual_names(b).iter().any(|n| self.tokens.used_outside(n, &b.path)))
            .map(|b| b.path.clone())
            .collect();
        orphans.sort();
        orphans
    }

    /// Images and fonts under `public/` or `resources/` nothing points at.
    pub fn find_unused_assets(&self) -> Vec<PathBuf> {
        let graph = &self.analysis.dependency_graph;
        let mut unused: Vec<PathBuf> = self
            .analysis
            .asset_files
            .iter()
            .map(|a| &a.base)
            .filter(|b| {
                let relative = self.analysis.relative(&b.path);
                path_in_dir(relative, "public") || path_in_dir(relative, "resources")
            })
            .filter(|b| !self.is_entry_point(b))
            .filter(|b| graph.inbound_to_file(&b.path).is_empty())
            .filter(|b| {
                file_stem(&b.path)
                    .map(|stem| !self.tokens.used_outside(stem, &b.path))
                    .unwrap_or(false)
            })
            .map(|b| b.path.clone())
            .collect();
        unused.sort();
        unused
    }

    pub fn find_unused_css_selectors(&self) -> Vec<(PathBuf, CssSelector)> {
        let mut unused = Vec::new();
        for file in &self.analysis.css_files {
            for selector in file.classes.iter().chain(&file.ids) {
                if !self.tokens.used_outside_css(&selector.name) {
                    unused.push((file.base.path.clone(), selector.clone()));
                }
            }
        }
        unused
    }
}

/// Runs the reverse-index scan and stores the result, including each
/// file's `is_used` flag and usage locations.
pub fn detect_usage(analysis: &mut CodebaseAnalysis, resolver: &SymbolResolver, policy: &ConventionPolicy) {
    let usage = UsageDetector::new(analysis, resolver, policy).scan_codebase_references();

    let orphaned: HashSet<PathBuf> = usage
        .orphaned_files
        .iter()
        .chain(&usage.unused_assets)
        .cloned()
        .collect();
    let mut per_file: HashMap<PathBuf, Vec<UsageLocation>> = HashMap::new();
    for (key, locations) in &usage.references {
        if let Some(node) = analysis.dependency_graph.node(key) {
            if let Some(file) = &node.file {
                per_file.entry(file.clone()).or_default().extend(locations.iter().cloned());
            }
        }
    }

    for base in analysis.files_mut() {
        let mut locations = per_file.remove(&base.path).unwrap_or_default();
        locations.sort();
        locations.dedup();
        base.is_used = !orphaned.contains(&base.path);
        base.usage_locations = locations;
    }

    tracing::info!(
        symbols = usage.references.len(),
        orphaned = usage.orphaned_files.len(),
        unused_assets = usage.unused_assets.len(),
        "usage scan complete"
    );
    analysis.usage = usage;
}
