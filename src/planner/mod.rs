use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::CleanupConfig;
use crate::conventions::ConventionPolicy;
use crate::detector::DuplicateFindings;
use crate::graph::method_key;
use crate::model::{
    BaseFileAnalysis, ClassInfo, CleanupPlan, CodebaseAnalysis, ComponentExtractionSuggestion, FileAnalysis,
    FileDeletion, ImportRemoval, Language, ManualReviewItem, MethodInfo, MethodRemoval, OperationKind,
    VariableRemoval, Visibility,
};
use crate::parser::Analyzers;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

const DYNAMIC_VIEW_PATTERNS: &[&str] = &["dynamic-include", "dynamic-component", "dynamic-view", "livewire-variable"];
const DYNAMIC_CLASS_PATTERNS: &[&str] = &["variable-class", "container-string"];
const DYNAMIC_SCRIPT_PATTERNS: &[&str] = &["dynamic-import", "dynamic-require"];

/// Codebase-wide dynamic constructs that make whole families of files
/// unprovable as unused.
#[derive(Debug, Default, Clone, Copy)]
struct DynamicScope {
    views: bool,
    classes: bool,
    scripts: bool,
}

impl DynamicScope {
    fn of(analysis: &CodebaseAnalysis) -> Self {
        let mut scope = Self::default();
        for base in analysis.files() {
            for reference in &base.dynamic_references {
                let pattern = reference.pattern.as_str();
                scope.views |= DYNAMIC_VIEW_PATTERNS.contains(&pattern);
                scope.classes |= DYNAMIC_CLASS_PATTERNS.contains(&pattern);
                scope.scripts |= DYNAMIC_SCRIPT_PATTERNS.contains(&pattern);
            }
        }
        scope
    }

    /// Why deleting a file of this kind cannot be proven safe.
    fn blocks_deletion(&self, base: &BaseFileAnalysis) -> Option<&'static str> {
        match base.language {
            Language::Template if self.views => Some("views are resolved dynamically elsewhere in the codebase"),
            Language::Php if self.classes && !base.classes.is_empty() => {
                Some("classes are instantiated by computed name elsewhere in the codebase")
            }
            Language::JavaScript if self.scripts => Some("modules are imported by computed path elsewhere"),
            _ => None,
        }
    }
}

/// Turns an analysis and duplicate findings into a `CleanupPlan`. Reads
/// nothing from disk.
pub struct Planner<'a> {
    config: &'a CleanupConfig,
    analyzers: &'a Analyzers,
    policy: &'a ConventionPolicy,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a CleanupConfig, analyzers: &'a Analyzers, policy: &'a ConventionPolicy) -> Self {
        Self {
            config,
            analyzers,
            policy,
        }
    }

    pub fn plan(&self, analysis: &CodebaseAnalysis, duplicates: &DuplicateFindings) -> CleanupPlan {
        let mut plan = CleanupPlan::new();
        let scope = DynamicScope::of(analysis);

        self.plan_deletions(analysis, scope, &mut plan);

        let declared: HashSet<String> = analysis
            .files()
            .flat_map(|b| b.classes.iter().map(|c| c.fqcn.to_ascii_lowercase()))
            .collect();

        for record in analysis.records() {
            let base = record.base();
            if plan.is_deleted(&base.path) || base.language == Language::Asset {
                continue;
            }
            self.plan_file_edits(analysis, &record, &declared, &mut plan);
        }

        if self.config.refactor_duplicates {
            plan.duplicates_to_refactor = duplicates
                .methods
                .iter()
                .filter(|m| !plan.is_deleted(&m.first.file) && !plan.is_deleted(&m.second.file))
                .cloned()
                .collect();
        }
        if self.config.create_components {
            plan.components_to_create = duplicates
                .components
                .iter()
                .filter_map(|c| without_deleted(c, &plan))
                .collect();
        }

        sort_plan(&mut plan);
        let estimate = estimate_size_reduction(analysis, &plan);
        plan.set_estimated_size_reduction(estimate);

        tracing::info!(
            operations = plan.total_operations(),
            manual_review = plan.manual_review.len(),
            estimated_mb = plan.estimated_size_reduction,
            "cleanup plan generated"
        );
        plan
    }

    fn plan_deletions(&self, analysis: &CodebaseAnalysis, scope: DynamicScope, plan: &mut CleanupPlan) {
        let mut candidates: Vec<(&Path, &str)> = Vec::new();
        if self.config.remove_unused_files {
            candidates.extend(
                analysis
                    .usage
                    .orphaned_files
                    .iter()
                    .map(|p| (p.as_path(), "no inbound references and not an entry point")),
            );
        }
        if self.config.remove_unused_assets {
            candidates.extend(
                analysis
                    .usage
                    .unused_assets
                    .iter()
                    .map(|p| (p.as_path(), "asset never referenced by path or name")),
            );
        }

        for (path, reason) in candidates {
            let Some(base) = analysis.file(path) else {
                continue;
            };
            if let Some(blocked) = scope.blocks_deletion(base) {
                plan.manual_review.push(ManualReviewItem {
                    file: base.path.clone(),
                    kind: OperationKind::Files,
                    target: analysis.relative(&base.path).display().to_string(),
                    line: None,
                    reason: blocked.to_string(),
                });
                continue;
            }
            plan.files_to_delete.push(FileDeletion {
                path: base.path.clone(),
                size_bytes: base.size_bytes,
                line_count: base.line_count,
                reason: reason.to_string(),
            });
        }
    }

    fn plan_file_edits(
        &self,
        analysis: &CodebaseAnalysis,
        record: &FileAnalysis,
        declared: &HashSet<String>,
        plan: &mut CleanupPlan,
    ) {
        let base = record.base();
        let analyzer = self.analyzers.get(base.language);
        let dynamic = base
            .dynamic_references
            .first()
            .map(|d| format!("dynamic reference on line {} ({})", d.line, d.pattern));

        let review = |plan: &mut CleanupPlan, kind: OperationKind, target: String, line: u32, reason: &str| {
            plan.manual_review.push(ManualReviewItem {
                file: base.path.clone(),
                kind,
                target,
                line: Some(line),
                reason: reason.to_string(),
            });
        };

        if self.config.remove_unused_imports {
            for import in analyzer.find_unused_imports(record) {
                if let Some(reason) = &dynamic {
                    review(plan, OperationKind::Imports, import.symbol.clone(), import.line, reason);
                    continue;
                }
                plan.imports_to_remove.push(ImportRemoval {
                    file: base.path.clone(),
                    import,
                });
            }
        }

        if self.config.remove_unused_methods && matches!(base.language, Language::Php | Language::JavaScript) {
            let relative = analysis.relative(&base.path);
            for method in analyzer.find_unused_methods(record) {
                let key = method_key(base, &method);
                if analysis.usage.is_referenced(&key)
                    || analysis.usage.route_bound_methods.contains(&key)
                    || self.policy.is_implicit_method(relative, &method.name)
                {
                    continue;
                }
                let target = method.qualified_name();
                if let Some(reason) = &dynamic {
                    review(plan, OperationKind::Methods, target, method.line, reason);
                    continue;
                }
                if let Some(reason) = inherited_contract(base, &method, declared) {
                    review(plan, OperationKind::Methods, target, method.line, reason);
                    continue;
                }
                plan.methods_to_remove.push(MethodRemoval {
                    file: base.path.clone(),
                    owner: method.owner.clone(),
                    name: method.name.clone(),
                    line: method.line,
                    start_line: method.start_line,
                    end_line: method.end_line,
                });
            }
        }

        if self.config.remove_unused_variables {
            for variable in analyzer.find_unused_variables(record) {
                let Some(line) = variable.declaration_line else {
                    continue;
                };
                if let Some(reason) = &dynamic {
                    review(plan, OperationKind::Variables, variable.name.clone(), line, reason);
                    continue;
                }
                plan.variables_to_remove.push(VariableRemoval {
                    file: base.path.clone(),
                    name: variable.name.clone(),
                    line,
                    end_line: variable.declaration_end_line.unwrap_or(line).max(line),
                });
            }
        }
    }
}

fn owner_class<'b>(base: &'b BaseFileAnalysis, method: &MethodInfo) -> Option<&'b ClassInfo> {
    let owner = method.owner.as_deref()?;
    base.classes
        .iter()
        .find(|c| c.fqcn.eq_ignore_ascii_case(owner) || c.name == owner)
}

/// Public methods that may satisfy an interface or override a parent the
/// analysis cannot see.
fn inherited_contract(base: &BaseFileAnalysis, method: &MethodInfo, declared: &HashSet<String>) -> Option<&'static str> {
    if method.visibility != Visibility::Public {
        return None;
    }
    let class = owner_class(base, method)?;
    if !class.implements.is_empty() {
        return Some("public method of a class implementing an interface");
    }
    match &class.extends {
        Some(parent) if !declared.contains(&parent.trim_start_matches('\\').to_ascii_lowercase()) => {
            Some("may override a method of an external parent class")
        }
        _ => None,
    }
}

/// Drops occurrences in deleted files; `None` when fewer than two remain.
fn without_deleted(
    suggestion: &ComponentExtractionSuggestion,
    plan: &CleanupPlan,
) -> Option<ComponentExtractionSuggestion> {
    let mut kept = suggestion.clone();
    kept.occurrences.retain(|o| !plan.is_deleted(&o.file));
    if kept.occurrences.len() < 2 {
        return None;
    }
    if kept.occurrences.len() != suggestion.occurrences.len() {
        kept.line_savings = kept.occurrences.iter().map(|o| o.line_count() - 1).sum();
        kept.priority = ComponentExtractionSuggestion::priority_for(kept.occurrences.len(), kept.line_savings);
    }
    Some(kept)
}

fn sort_plan(plan: &mut CleanupPlan) {
    plan.files_to_delete.sort_by(|a, b| a.path.cmp(&b.path));
    plan.imports_to_remove
        .sort_by(|a, b| a.file.cmp(&b.file).then(a.import.line.cmp(&b.import.line)));
    plan.methods_to_remove
        .sort_by(|a, b| a.file.cmp(&b.file).then(a.start_line.cmp(&b.start_line)));
    plan.variables_to_remove
        .sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
    plan.manual_review
        .sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
}

/// Deleted bytes plus removed lines at each file's average line size.
pub fn estimate_size_reduction(analysis: &CodebaseAnalysis, plan: &CleanupPlan) -> f64 {
    let deleted: u64 = plan.files_to_delete.iter().map(|d| d.size_bytes).sum();

    let mut removed_lines: HashMap<PathBuf, u32> = HashMap::new();
    for removal in &plan.imports_to_remove {
        *removed_lines.entry(removal.file.clone()).or_default() += 1;
    }
    for removal in &plan.methods_to_remove {
        *removed_lines.entry(removal.file.clone()).or_default() += removal.line_count();
    }
    for removal in &plan.variables_to_remove {
        *removed_lines.entry(removal.file.clone()).or_default() += removal.end_line - removal.line + 1;
    }
    for component in plan.components_to_create.iter().filter(|c| c.auto_applicable) {
        for occurrence in &component.occurrences {
            *removed_lines.entry(occurrence.file.clone()).or_default() += occurrence.line_count() - 1;
        }
    }

    let edited: f64 = removed_lines
        .iter()
        .map(|(path, lines)| {
            analysis
                .file(path)
                .map(|b| b.average_line_bytes() * *lines as f64)
                .unwrap_or(0.0)
        })
        .sum();
    (deleted as f64 + edited) / BYTES_PER_MB
}

/// Duplicate detection followed by planning.
pub fn generate_cleanup_plan(
    analysis: &CodebaseAnalysis,
    duplicates: &DuplicateFindings,
    config: &CleanupConfig,
    analyzers: &Analyzers,
    policy: &ConventionPolicy,
) -> CleanupPlan {
    Planner::new(config, analyzers, policy).plan(analysis, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConventionsConfig, PolicyConfig};
    use crate::detector::{detect_duplicates, detect_usage};
    use crate::graph::{build_dependency_graph, index_symbols};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        analyzers: Analyzers,
        policy: ConventionPolicy,
        analysis: CodebaseAnalysis,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let analyzers = Analyzers::new(&root);
        let mut analysis = CodebaseAnalysis::new(&root);
        for (relative, source) in files {
            let path = root.join(relative);
            let analyzer = analyzers.for_path(&path).unwrap();
            analysis.add(analyzer.analyze_source(&path, source).unwrap());
        }
        let resolver = index_symbols(&analysis, None);
        analysis.dependency_graph = build_dependency_graph(&analysis, &resolver);
        let policy =
            ConventionPolicy::new(&root, &ConventionsConfig::default(), &PolicyConfig::default(), &[]).unwrap();
        detect_usage(&mut analysis, &resolver, &policy);
        Fixture {
            _temp: temp,
            root,
            analyzers,
            policy,
            analysis,
        }
    }

    fn plan(f: &Fixture, config: &CleanupConfig) -> CleanupPlan {
        let duplicates = detect_duplicates(&f.analysis, &f.analyzers, &config.similarity);
        generate_cleanup_plan(&f.analysis, &duplicates, config, &f.analyzers, &f.policy)
    }

    const SERVICE: &str = "<?php\nnamespace App\\Services;\n\nuse App\\Models\\Unused;\nuse App\\Models\\Used;\n\nclass Billing\n{\n    public function charge(): Used\n    {\n        return new Used();\n    }\n\n    private function forgotten()\n    {\n        return 1;\n    }\n}\n";
    const CONTROLLER: &str = "<?php\nnamespace App\\Http\\Controllers;\n\nuse App\\Services\\Billing;\n\nclass PayController\n{\n    public function __invoke(Billing $billing)\n    {\n        return $billing->charge();\n    }\n}\n";
    const ORPHAN: &str = "<?php\nnamespace App\\Support;\n\nclass Orphan\n{\n}\n";
    const ROUTES: &str = "<?php\n\nuse App\\Http\\Controllers\\PayController;\n\nRoute::post('/pay', PayController::class);\n";

    fn project() -> Vec<(&'static str, &'static str)> {
        vec![
            ("app/Services/Billing.php", SERVICE),
            ("app/Http/Controllers/PayController.php", CONTROLLER),
            ("app/Support/Orphan.php", ORPHAN),
            ("routes/web.php", ROUTES),
        ]
    }

    #[test]
    fn test_plan_collects_unused_code() {
        let f = fixture(&project());
        let plan = plan(&f, &CleanupConfig::default());

        let deleted: Vec<_> = plan.files_to_delete.iter().map(|d| d.path.clone()).collect();
        assert_eq!(deleted, vec![f.root.join("app/Support/Orphan.php")]);

        let imports: Vec<_> = plan.imports_to_remove.iter().map(|i| i.import.symbol.as_str()).collect();
        assert_eq!(imports, vec!["App\\Models\\Unused"]);

        let methods: Vec<_> = plan.methods_to_remove.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["forgotten"]);
        assert!(plan.estimated_size_reduction > 0.0);
        assert_eq!(
            plan.total_operations(),
            plan.files_to_delete.len() + plan.imports_to_remove.len() + plan.methods_to_remove.len()
                + plan.variables_to_remove.len() + plan.duplicates_to_refactor.len()
                + plan.components_to_create.len()
        );
    }

    #[test]
    fn test_delete_dominates_other_edits() {
        let orphan = "<?php\nnamespace App\\Support;\n\nuse App\\Models\\Nothing;\n\nclass Orphan\n{\n    private function gone()\n    {\n        return 1;\n    }\n}\n";
        let f = fixture(&[("app/Support/Orphan.php", orphan)]);
        let plan = plan(&f, &CleanupConfig::default());
        assert_eq!(plan.files_to_delete.len(), 1);
        assert!(plan.imports_to_remove.is_empty());
        assert!(plan.methods_to_remove.is_empty());
    }

    #[test]
    fn test_dynamic_call_downgrades_methods_in_file() {
        let dynamic = SERVICE.replace(
            "return 1;",
            "return 1;\n    }\n\n    public function dispatch($name)\n    {\n        return $this->$name();",
        );
        let mut files: Vec<(&str, &str)> = project();
        files[0] = ("app/Services/Billing.php", dynamic.as_str());
        let f = fixture(&files);
        let plan = plan(&f, &CleanupConfig::default());

        assert!(plan
            .methods_to_remove
            .iter()
            .all(|m| m.file != f.root.join("app/Services/Billing.php")));
        assert!(plan
            .manual_review
            .iter()
            .any(|r| r.kind == OperationKind::Methods && r.target.ends_with("forgotten")));
    }

    #[test]
    fn test_switches_disable_operations() {
        let f = fixture(&project());
        let mut config = CleanupConfig::default();
        config.restrict_to(&[OperationKind::Imports]);
        let plan = plan(&f, &config);
        assert!(plan.files_to_delete.is_empty());
        assert!(plan.methods_to_remove.is_empty());
        assert_eq!(plan.imports_to_remove.len(), 1);
    }

    #[test]
    fn test_planning_reads_nothing_from_disk() {
        let f = fixture(&project());
        // Nothing was ever written under the root.
        assert_eq!(std::fs::read_dir(&f.root).unwrap().count(), 0);
        let plan = plan(&f, &CleanupConfig::default());
        assert!(!plan.is_empty());
        assert_eq!(std::fs::read_dir(&f.root).unwrap().count(), 0);
    }

    #[test]
    fn test_public_override_of_external_parent_goes_to_review() {
        let source = "<?php\nnamespace App\\Http\\Middleware;\n\nuse Illuminate\\Foundation\\Http\\Middleware\\VerifyCsrfToken as Base;\n\nclass Csrf extends Base\n{\n    public function tokensMatch($request)\n    {\n        return true;\n    }\n}\n";
        let f = fixture(&[("app/Http/Middleware/Csrf.php", source)]);
        let config = CleanupConfig {
            remove_unused_files: false,
            ..CleanupConfig::default()
        };
        let plan = plan(&f, &config);
        assert!(plan.methods_to_remove.is_empty());
        assert!(plan
            .manual_review
            .iter()
            .any(|r| r.target.ends_with("::tokensMatch") && r.reason.contains("parent")));
    }
}
