use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::graph::DependencyGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Php,
    JavaScript,
    Template,
    Css,
    Route,
    Asset,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Php => "php",
            Language::JavaScript => "javascript",
            Language::Template => "template",
            Language::Css => "css",
            Language::Route => "route",
            Language::Asset => "asset",
        }
    }

    /// Languages whose methods are compared against each other for duplication.
    pub fn duplicate_family(&self) -> Option<Language> {
        match self {
            Language::Php | Language::Route => Some(Language::Php),
            Language::JavaScript => Some(Language::JavaScript),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    Class,
    Function,
    Const,
    Named,
    Default,
    Namespace,
    SideEffect,
    Stylesheet,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportRef {
    /// Fully qualified symbol (`App\Models\User`) or imported binding name.
    pub symbol: String,
    /// Name the symbol is visible under inside the file.
    pub local_name: String,
    pub line: u32,
    /// Module specifier for JS/CSS imports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub kind: ImportKind,
}

impl ImportRef {
    pub fn new(symbol: impl Into<String>, local_name: impl Into<String>, line: u32, kind: ImportKind) -> Self {
        Self {
            symbol: symbol.into(),
            local_name: local_name.into(),
            line,
            source: None,
            kind,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    Class,
    Interface,
    Trait,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub fqcn: String,
    pub kind: ClassKind,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    /// Declaring class, `None` for free functions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub visibility: Visibility,
    pub is_static: bool,
    /// Line of the name token.
    pub line: u32,
    /// First line of the removable span, including doc comments and attributes.
    pub start_line: u32,
    pub end_line: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(skip)]
    pub body: String,
}

impl MethodInfo {
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}::{}", owner, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    /// Every line the variable appears on, declaration included.
    pub lines: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaration_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaration_end_line: Option<u32>,
    /// Declaration can be dropped without losing a side effect.
    pub removable: bool,
    /// Function parameter; never a removal candidate.
    #[serde(default)]
    pub is_parameter: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Class,
    Extends,
    Implements,
    TraitUse,
    Function,
    View,
    Component,
    Include,
    Layout,
    Stylesheet,
    Script,
    Asset,
    RouteAction,
    CssClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolReference {
    pub name: String,
    pub line: u32,
    pub kind: ReferenceKind,
}

impl SymbolReference {
    pub fn new(name: impl Into<String>, line: u32, kind: ReferenceKind) -> Self {
        Self {
            name: name.into(),
            line,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicReference {
    pub line: u32,
    pub pattern: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Import,
    Reference,
    Depends,
    Token,
    RouteBinding,
    Convention,
    EntryPoint,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsageLocation {
    pub file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub kind: UsageKind,
}

impl UsageLocation {
    pub fn new(file: impl Into<PathBuf>, line: Option<u32>, kind: UsageKind) -> Self {
        Self {
            file: file.into(),
            line,
            kind,
        }
    }
}

/// Fields shared by every language-specific analysis record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseFileAnalysis {
    pub path: PathBuf,
    pub language: Language,
    pub size_bytes: u64,
    pub line_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<ClassInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<SymbolReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_references: Vec<DynamicReference>,
    /// Identifier occurrence counts outside import statements, comments and
    /// strings included.
    #[serde(skip)]
    pub tokens: BTreeMap<String, u32>,
    pub is_used: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage_locations: Vec<UsageLocation>,
}

impl BaseFileAnalysis {
    pub fn new(path: impl Into<PathBuf>, language: Language, size_bytes: u64, line_count: u32) -> Self {
        Self {
            path: path.into(),
            language,
            size_bytes,
            line_count,
            classes: Vec::new(),
            methods: Vec::new(),
            variables: Vec::new(),
            imports: Vec::new(),
            references: Vec::new(),
            dynamic_references: Vec::new(),
            tokens: BTreeMap::new(),
            is_used: false,
            usage_locations: Vec::new(),
        }
    }

    pub fn token_count(&self, token: &str) -> u32 {
        self.tokens.get(token).copied().unwrap_or(0)
    }

    pub fn has_dynamic_references(&self) -> bool {
        !self.dynamic_references.is_empty()
    }

    pub fn average_line_bytes(&self) -> f64 {
        if self.line_count == 0 {
            return 0.0;
        }
        self.size_bytes as f64 / self.line_count as f64
    }

    pub fn method(&self, owner: Option<&str>, name: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.owner.as_deref() == owner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhpRole {
    Controller,
    Model,
    Migration,
    Seeder,
    Provider,
    Middleware,
    Command,
    Config,
    Test,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhpFileAnalysis {
    #[serde(flatten)]
    pub base: BaseFileAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub role: PhpRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsFileAnalysis {
    #[serde(flatten)]
    pub base: BaseFileAnalysis,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<String>,
}

/// A subtree of markup captured for structural comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupFragment {
    pub root_tag: String,
    pub line: u32,
    pub end_line: u32,
    pub element_count: usize,
    /// Canonical tag-tree shape, text and attribute values removed.
    pub skeleton: String,
    #[serde(skip)]
    pub text: String,
}

impl MarkupFragment {
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.line) + 1
    }

    pub fn contains(&self, other: &MarkupFragment) -> bool {
        self.line <= other.line && other.end_line <= self.end_line && self != other
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateAnalysis {
    #[serde(flatten)]
    pub base: BaseFileAnalysis,
    /// Dotted view name (`products.index`) when under a views directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub css_classes_used: Vec<String>,
    #[serde(skip)]
    pub fragments: Vec<MarkupFragment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssSelector {
    pub name: String,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CssFileAnalysis {
    #[serde(flatten)]
    pub base: BaseFileAnalysis,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<CssSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<CssSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub verb: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteAnalysis {
    #[serde(flatten)]
    pub base: BaseFileAnalysis,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<RouteDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Font,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetFileAnalysis {
    #[serde(flatten)]
    pub base: BaseFileAnalysis,
    pub kind: AssetKind,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum FileAnalysis {
    Php(PhpFileAnalysis),
    JavaScript(JsFileAnalysis),
    Template(TemplateAnalysis),
    Css(CssFileAnalysis),
    Route(RouteAnalysis),
    Asset(AssetFileAnalysis),
}

impl FileAnalysis {
    pub fn base(&self) -> &BaseFileAnalysis {
        match self {
            FileAnalysis::Php(a) => &a.base,
            FileAnalysis::JavaScript(a) => &a.base,
            FileAnalysis::Template(a) => &a.base,
            FileAnalysis::Css(a) => &a.base,
            FileAnalysis::Route(a) => &a.base,
            FileAnalysis::Asset(a) => &a.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut BaseFileAnalysis {
        match self {
            FileAnalysis::Php(a) => &mut a.base,
            FileAnalysis::JavaScript(a) => &mut a.base,
            FileAnalysis::Template(a) => &mut a.base,
            FileAnalysis::Css(a) => &mut a.base,
            FileAnalysis::Route(a) => &mut a.base,
            FileAnalysis::Asset(a) => &mut a.base,
        }
    }

    pub fn path(&self) -> &Path {
        &self.base().path
    }

    pub fn language(&self) -> Language {
        self.base().language
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Reverse usage index produced by the usage detector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageReport {
    /// Symbol key → places that reference it.
    pub references: BTreeMap<String, Vec<UsageLocation>>,
    pub orphaned_files: Vec<PathBuf>,
    pub entry_points: Vec<PathBuf>,
    pub route_bound_methods: BTreeSet<String>,
    pub unused_css_selectors: Vec<(PathBuf, CssSelector)>,
    pub unused_assets: Vec<PathBuf>,
}

impl UsageReport {
    pub fn locations(&self, key: &str) -> &[UsageLocation] {
        self.references.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_referenced(&self, key: &str) -> bool {
        !self.locations(key).is_empty()
    }

    pub fn is_orphaned(&self, path: &Path) -> bool {
        self.orphaned_files.iter().any(|p| p == path)
    }
}

/// Keys used in the usage index and dependency graph.
pub mod symbol_key {
    use std::path::Path;

    pub fn file(path: &Path) -> String {
        format!("file:{}", path.display())
    }

    pub fn class(fqcn: &str) -> String {
        format!("class:{}", fqcn.trim_start_matches('\\'))
    }

    pub fn method(file: &Path, owner: Option<&str>, name: &str) -> String {
        match owner {
            Some(owner) => format!("method:{}::{}", owner.trim_start_matches('\\'), name),
            None => format!("function:{}#{}", file.display(), name),
        }
    }

    pub fn view(name: &str) -> String {
        format!("view:{}", name)
    }

    pub fn component(name: &str) -> String {
        format!("component:{}", name)
    }

    pub fn css(selector: &str) -> String {
        format!("css:{}", selector)
    }
}

/// Aggregate produced by one analysis run; read-only input to planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodebaseAnalysis {
    pub root: PathBuf,
    pub php_files: Vec<PhpFileAnalysis>,
    pub route_files: Vec<RouteAnalysis>,
    pub js_files: Vec<JsFileAnalysis>,
    pub templates: Vec<TemplateAnalysis>,
    pub css_files: Vec<CssFileAnalysis>,
    pub asset_files: Vec<AssetFileAnalysis>,
    pub dependency_graph: DependencyGraph,
    pub usage: UsageReport,
    pub failures: Vec<AnalysisFailure>,
    pub skipped: Vec<SkippedFile>,
    /// Identifiers seen in files that failed to parse; treated as references.
    #[serde(skip)]
    pub unparsed_tokens: BTreeMap<PathBuf, BTreeSet<String>>,
    pub analyzed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl CodebaseAnalysis {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            php_files: Vec::new(),
            route_files: Vec::new(),
            js_files: Vec::new(),
            templates: Vec::new(),
            css_files: Vec::new(),
            asset_files: Vec::new(),
            dependency_graph: DependencyGraph::default(),
            usage: UsageReport::default(),
            failures: Vec::new(),
            skipped: Vec::new(),
            unparsed_tokens: BTreeMap::new(),
            analyzed_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn add(&mut self, analysis: FileAnalysis) {
        match analysis {
            FileAnalysis::Php(a) => self.php_files.push(a),
            FileAnalysis::Route(a) => self.route_files.push(a),
            FileAnalysis::JavaScript(a) => self.js_files.push(a),
            FileAnalysis::Template(a) => self.templates.push(a),
            FileAnalysis::Css(a) => self.css_files.push(a),
            FileAnalysis::Asset(a) => self.asset_files.push(a),
        }
    }

    pub fn record_failure(&mut self, path: impl Into<PathBuf>, error: impl ToString) {
        self.failures.push(AnalysisFailure {
            path: path.into(),
            error: error.to_string(),
        });
    }

    /// Whether every discovered file was analysed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = &BaseFileAnalysis> {
        self.php_files
            .iter()
            .map(|a| &a.base)
            .chain(self.route_files.iter().map(|a| &a.base))
            .chain(self.js_files.iter().map(|a| &a.base))
            .chain(self.templates.iter().map(|a| &a.base))
            .chain(self.css_files.iter().map(|a| &a.base))
            .chain(self.asset_files.iter().map(|a| &a.base))
    }

    pub fn files_mut(&mut self) -> impl Iterator<Item = &mut BaseFileAnalysis> {
        self.php_files
            .iter_mut()
            .map(|a| &mut a.base)
            .chain(self.route_files.iter_mut().map(|a| &mut a.base))
            .chain(self.js_files.iter_mut().map(|a| &mut a.base))
            .chain(self.templates.iter_mut().map(|a| &mut a.base))
            .chain(self.css_files.iter_mut().map(|a| &mut a.base))
            .chain(self.asset_files.iter_mut().map(|a| &mut a.base))
    }

    /// Every record as an owned `FileAnalysis`, in `files()` order.
    pub fn records(&self) -> impl Iterator<Item = FileAnalysis> + '_ {
        self.php_files
            .iter()
            .cloned()
            .map(FileAnalysis::Php)
            .chain(self.route_files.iter().cloned().map(FileAnalysis::Route))
            .chain(self.js_files.iter().cloned().map(FileAnalysis::JavaScript))
            .chain(self.templates.iter().cloned().map(FileAnalysis::Template))
            .chain(self.css_files.iter().cloned().map(FileAnalysis::Css))
            .chain(self.asset_files.iter().cloned().map(FileAnalysis::Asset))
    }

    pub fn file(&self, path: &Path) -> Option<&BaseFileAnalysis> {
        self.files().find(|f| f.path == path)
    }

    pub fn total_files(&self) -> usize {
        self.files().count()
    }

    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str, start: u32, end: u32) -> MethodInfo {
        MethodInfo {
            name: name.to_string(),
            owner: Some("App\\Foo".to_string()),
            visibility: Visibility::Public,
            is_static: false,
            line: start,
            start_line: start,
            end_line: end,
            parameters: vec![],
            body: String::new(),
        }
    }

    #[test]
    fn test_method_line_count_inclusive() {
        assert_eq!(method("a", 3, 7).line_count(), 5);
        assert_eq!(method("a", 3, 3).line_count(), 1);
    }

    #[test]
    fn test_codebase_preserves_insertion_order_per_variant() {
        let mut analysis = CodebaseAnalysis::new("/p");
        for name in ["b.php", "a.php"] {
            analysis.add(FileAnalysis::Php(PhpFileAnalysis {
                base: BaseFileAnalysis::new(format!("/p/{}", name), Language::Php, 10, 1),
                namespace: None,
                role: PhpRole::Other,
            }));
        }
        let names: Vec<_> = analysis.files().map(|f| f.path.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("/p/b.php"), PathBuf::from("/p/a.php")]);
        assert!(analysis.is_complete());
        analysis.record_failure("/p/c.php", "unbalanced braces");
        assert!(!analysis.is_complete());
    }

    #[test]
    fn test_symbol_keys() {
        assert_eq!(symbol_key::class("\\App\\User"), "class:App\\User");
        assert_eq!(
            symbol_key::method(Path::new("a.php"), Some("App\\User"), "posts"),
            "method:App\\User::posts"
        );
        assert_eq!(
            symbol_key::method(Path::new("a.js"), None, "init"),
            "function:a.js#init"
        );
    }

    #[test]
    fn test_fragment_containment() {
        let outer = MarkupFragment {
            root_tag: "div".into(),
            line: 1,
            end_line: 10,
            element_count: 6,
            skeleton: "div(p)".into(),
            text: String::new(),
        };
        let inner = MarkupFragment {
            line: 2,
            end_line: 5,
            ..outer.clone()
        };
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&outer));
    }
}
