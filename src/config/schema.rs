use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::model::OperationKind;

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Options recognised in `sweeper.json`. Unknown keys are rejected so a
/// misspelled switch never silently falls back to its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CleanupConfig {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    pub dry_run: bool,
    pub create_backup: bool,
    pub run_tests: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub include_file_types: Vec<String>,

    pub remove_unused_files: bool,
    pub remove_unused_imports: bool,
    pub remove_unused_methods: bool,
    pub remove_unused_variables: bool,
    pub remove_unused_assets: bool,
    pub refactor_duplicates: bool,
    pub create_components: bool,

    pub batch_size: usize,
    pub max_file_size: u64,

    pub similarity: SimilarityConfig,

    pub test_command: String,
    pub test_timeout_secs: u64,

    pub backup_dir: String,
    pub backup_retention: usize,
    pub git_checkpoint: bool,

    pub conventions: ConventionsConfig,
    pub policy: PolicyConfig,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            schema: None,
            dry_run: true,
            create_backup: true,
            run_tests: true,
            include_paths: Vec::new(),
            exclude_paths: default_exclude_paths(),
            include_file_types: default_file_types(),
            remove_unused_files: true,
            remove_unused_imports: true,
            remove_unused_methods: true,
            remove_unused_variables: true,
            remove_unused_assets: false,
            refactor_duplicates: true,
            create_components: true,
            batch_size: DEFAULT_BATCH_SIZE,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            similarity: SimilarityConfig::default(),
            test_command: "php artisan test".to_string(),
            test_timeout_secs: 600,
            backup_dir: ".sweeper/backups".to_string(),
            backup_retention: 5,
            git_checkpoint: false,
            conventions: ConventionsConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

fn default_exclude_paths() -> Vec<String> {
    [
        "vendor/**",
        "node_modules/**",
        "storage/**",
        ".git/**",
        "public/build/**",
        "public/vendor/**",
        "bootstrap/cache/**",
        ".sweeper/**",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_file_types() -> Vec<String> {
    [
        "php", "blade.php", "js", "mjs", "cjs", "jsx", "css", "scss", "png", "jpg", "jpeg",
        "gif", "svg", "webp", "ico", "woff", "woff2", "ttf", "eot",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl CleanupConfig {
    /// Restricts the run to the given operation kinds, switching the rest off.
    pub fn restrict_to(&mut self, kinds: &[OperationKind]) {
        self.remove_unused_files = kinds.contains(&OperationKind::Files);
        self.remove_unused_imports = kinds.contains(&OperationKind::Imports);
        self.remove_unused_methods = kinds.contains(&OperationKind::Methods);
        self.remove_unused_variables = kinds.contains(&OperationKind::Variables);
        self.refactor_duplicates = kinds.contains(&OperationKind::Duplicates);
        self.create_components = kinds.contains(&OperationKind::Components);
        if !self.remove_unused_files {
            self.remove_unused_assets = false;
        }
    }

    pub fn is_enabled(&self, kind: OperationKind) -> bool {
        match kind {
            OperationKind::Files => self.remove_unused_files,
            OperationKind::Imports => self.remove_unused_imports,
            OperationKind::Methods => self.remove_unused_methods,
            OperationKind::Variables => self.remove_unused_variables,
            OperationKind::Duplicates => self.refactor_duplicates,
            OperationKind::Components => self.create_components,
        }
    }

    /// Normalised extension list without leading dots, longest first so
    /// `blade.php` wins over `php`.
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self
            .include_file_types
            .iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        exts.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        exts.dedup();
        exts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SimilarityConfig {
    pub exact_threshold: f64,
    pub near_threshold: f64,
    pub minimum_score: f64,
    pub max_line_ratio: f64,
    pub min_method_lines: usize,
    pub min_fragment_elements: usize,
    pub rename_identifiers: bool,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            exact_threshold: 0.95,
            near_threshold: 0.80,
            minimum_score: 0.60,
            max_line_ratio: 2.0,
            min_method_lines: 3,
            min_fragment_elements: 4,
            rename_identifiers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ConventionsConfig {
    pub laravel: bool,
    pub vite: bool,
}

impl Default for ConventionsConfig {
    fn default() -> Self {
        Self {
            laravel: true,
            vite: true,
        }
    }
}

/// Deployment-specific policy merged over the enabled conventions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entry_points: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub protected_files: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub implicit_methods: Vec<ImplicitMethodRule>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dynamic_patterns: Vec<String>,
}

/// A method invoked by framework convention rather than by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImplicitMethodRule {
    /// Regex matched against the method name.
    pub pattern: String,

    /// Optional glob restricting the rule to matching files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ImplicitMethodRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            path: None,
        }
    }

    pub fn scoped(pattern: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            path: Some(path.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub root: PathBuf,
    pub config: CleanupConfig,
    pub composer: Option<ComposerJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ComposerJson {
    pub name: Option<String>,

    #[serde(default)]
    pub autoload: Autoload,

    #[serde(default)]
    pub autoload_dev: Autoload,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Autoload {
    #[serde(rename = "psr-4", default)]
    pub psr4: HashMap<String, Psr4Paths>,

    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Psr4Paths {
    Single(String),
    Many(Vec<String>),
}

impl Psr4Paths {
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Psr4Paths::Single(p) => vec![p.as_str()],
            Psr4Paths::Many(list) => list.iter().map(|s| s.as_str()).collect(),
        }
    }
}

impl ComposerJson {
    /// Namespace prefix → directories, from both autoload sections.
    pub fn psr4_roots(&self) -> Vec<(String, String)> {
        let mut roots = Vec::new();
        for section in [&self.autoload, &self.autoload_dev] {
            for (prefix, paths) in &section.psr4 {
                for path in paths.paths() {
                    roots.push((prefix.clone(), path.trim_end_matches('/').to_string()));
                }
            }
        }
        roots.sort();
        roots
    }

    pub fn autoload_files(&self) -> Vec<String> {
        self.autoload
            .files
            .iter()
            .chain(self.autoload_dev.files.iter())
            .cloned()
            .collect()
    }
}
