use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use super::dynamic::{self, DynamicPatterns};
use crate::conventions::ConventionPolicy;
use crate::detector::TokenIndex;
use crate::error::Result;
use crate::model::{
    CleanupPlan, CodebaseAnalysis, ComponentExtractionSuggestion, DynamicReference, Language, OperationKind,
    RejectionReason, SafetyRejection,
};
use crate::parser::{detect_language, Analyzers};
use crate::source::SourceTree;

/// Files no cleanup may touch, whatever the analysis says.
pub const PROTECTED_PATTERNS: &[&str] = &[
    "composer.json",
    "composer.lock",
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "**/.env",
    "**/.env.*",
    ".env",
    ".env.*",
    "artisan",
    "server.php",
    "bootstrap/app.php",
    "bootstrap/providers.php",
    "public/index.php",
    "**/.htaccess",
    "**/.gitignore",
    "**/.gitattributes",
    ".git/**",
    "vite.config.*",
    "webpack.mix.js",
    "tailwind.config.*",
    "postcss.config.*",
    "phpunit.xml",
];

/// Constructors are never provably unused.
pub fn is_constructor(owner: Option<&str>, name: &str) -> bool {
    if name.eq_ignore_ascii_case("__construct") || name == "constructor" {
        return true;
    }
    owner
        .and_then(|o| o.rsplit(['\\', '.']).next())
        .map(|short| short.eq_ignore_ascii_case(name))
        .unwrap_or(false)
}

/// Whether `source` reaches symbols by computed name.
pub fn check_dynamic_references(source: &str, language: Language) -> bool {
    !dynamic::scan(source, language).is_empty()
}

/// Approved subset of a plan plus everything that was refused.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub approved: CleanupPlan,
    pub rejected: Vec<SafetyRejection>,
}

impl ValidationOutcome {
    pub fn is_safe(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Debug, Clone)]
enum FileState {
    Missing,
    Binary,
    Text {
        dynamic: Option<DynamicReference>,
        syntax_error: Option<String>,
    },
}

/// Re-checks a plan against the tree as it is now.
pub struct SafetyValidator<'a> {
    root: &'a Path,
    source: &'a dyn SourceTree,
    analyzers: &'a Analyzers,
    policy: &'a ConventionPolicy,
    protected: GlobSet,
    extra_patterns: DynamicPatterns,
    states: RefCell<HashMap<PathBuf, FileState>>,
}

impl<'a> SafetyValidator<'a> {
    pub fn new(
        root: &'a Path,
        source: &'a dyn SourceTree,
        analyzers: &'a Analyzers,
        policy: &'a ConventionPolicy,
        dynamic_patterns: &[String],
    ) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in PROTECTED_PATTERNS {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            root,
            source,
            analyzers,
            policy,
            protected: builder.build()?,
            extra_patterns: DynamicPatterns::new(dynamic_patterns)?,
            states: RefCell::new(HashMap::new()),
        })
    }

    pub fn is_protected(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(self.root).unwrap_or(path);
        let normalized = relative.to_string_lossy().replace('\\', "/");
        self.protected.is_match(&normalized) || self.policy.is_protected(relative)
    }

    fn language_of(&self, analysis: &CodebaseAnalysis, path: &Path) -> Option<Language> {
        analysis
            .file(path)
            .map(|b| b.language)
            .or_else(|| detect_language(self.root, path))
    }

    fn load_state(&self, analysis: &CodebaseAnalysis, path: &Path) -> FileState {
        if !self.source.exists(path) {
            return FileState::Missing;
        }
        let language = self.language_of(analysis, path);
        if matches!(language, None | Some(Language::Asset)) {
            return FileState::Binary;
        }
        let text = match self.source.read_to_string(path) {
            Ok(text) => text,
            Err(_) => return FileState::Binary,
        };
        let language = language.unwrap_or(Language::Asset);
        let mut found = dynamic::scan(&text, language);
        found.extend(self.extra_patterns.scan(&text));
        found.sort_by_key(|d| d.line);
        let syntax_error = self
            .analyzers
            .get(language)
            .validate_syntax(path, &text)
            .err()
            .map(|e| e.to_string());
        FileState::Text {
            dynamic: found.into_iter().next(),
            syntax_error,
        }
    }

    fn state(&self, analysis: &CodebaseAnalysis, path: &Path) -> FileState {
        if let Some(state) = self.states.borrow().get(path) {
            return state.clone();
        }
        let state = self.load_state(analysis, path);
        self.states.borrow_mut().insert(path.to_path_buf(), state.clone());
        state
    }

    /// Shared checks for in-place edits: protection, presence, parseability
    /// and dynamic dispatch.
    fn check_edit(&self, analysis: &CodebaseAnalysis, path: &Path) -> Option<(RejectionReason, Option<String>)> {
        if self.is_protected(path) {
            return Some((RejectionReason::ProtectedFile, None));
        }
        match self.state(analysis, path) {
            FileState::Missing => Some((RejectionReason::MissingFile, None)),
            FileState::Binary => None,
            FileState::Text {
                syntax_error: Some(message),
                ..
            } => Some((RejectionReason::SyntaxError, Some(message))),
            FileState::Text {
                dynamic: Some(reference),
                ..
            } => Some((
                RejectionReason::DynamicReference,
                Some(format!("line {}: {}", reference.line, reference.snippet)),
            )),
            FileState::Text { .. } => None,
        }
    }

    fn check_component(
        &self,
        analysis: &CodebaseAnalysis,
        component: &ComponentExtractionSuggestion,
    ) -> Option<(PathBuf, RejectionReason, Option<String>)> {
        if !component.auto_applicable {
            return None;
        }
        if self.source.exists(&component.component_path) {
            return Some((
                component.component_path.clone(),
                RejectionReason::StalePlan,
                Some("component file already exists".into()),
            ));
        }
        for occurrence in &component.occurrences {
            if self.is_protected(&occurrence.file) {
                return Some((occurrence.file.clone(), RejectionReason::ProtectedFile, None));
            }
            match self.state(analysis, &occurrence.file) {
                FileState::Missing => return Some((occurrence.file.clone(), RejectionReason::MissingFile, None)),
                FileState::Text {
                    syntax_error: Some(message),
                    ..
                } => return Some((occurrence.file.clone(), RejectionReason::SyntaxError, Some(message))),
                _ => {}
            }
        }
        None
    }

    /// Splits `plan` into the operations that may run and the rejections.
    pub fn validate(&self, plan: &CleanupPlan, analysis: &CodebaseAnalysis) -> ValidationOutcome {
        let tokens = TokenIndex::build(analysis);
        let mut approved = CleanupPlan {
            estimated_size_reduction: plan.estimated_size_reduction,
            manual_review: plan.manual_review.clone(),
            ..CleanupPlan::default()
        };
        let mut rejected = Vec::new();
        let mut reject = |kind: OperationKind, file: &Path, target: String, reason: RejectionReason, detail: Option<String>| {
            let mut rejection = SafetyRejection::new(kind, file, target, reason);
            if let Some(detail) = detail {
                rejection = rejection.with_detail(detail);
            }
            tracing::debug!(
                kind = %kind,
                path = %file.display(),
                reason = rejection.reason.as_str(),
                "operation rejected"
            );
            rejected.push(rejection);
        };

        for deletion in &plan.files_to_delete {
            let target = deletion.path.display().to_string();
            if self.is_protected(&deletion.path) {
                reject(OperationKind::Files, &deletion.path, target, RejectionReason::ProtectedFile, None);
            } else if !self.source.exists(&deletion.path) {
                reject(OperationKind::Files, &deletion.path, target, RejectionReason::MissingFile, None);
            } else if !analysis.usage.is_orphaned(&deletion.path) && !analysis.usage.unused_assets.contains(&deletion.path)
            {
                reject(
                    OperationKind::Files,
                    &deletion.path,
                    target,
                    RejectionReason::StillReferenced,
                    Some("file has inbound references".into()),
                );
            } else {
                approved.files_to_delete.push(deletion.clone());
            }
        }

        for removal in &plan.imports_to_remove {
            match self.check_edit(analysis, &removal.file) {
                Some((reason, detail)) => reject(
                    OperationKind::Imports,
                    &removal.file,
                    removal.import.symbol.clone(),
                    reason,
                    detail,
                ),
                None => approved.imports_to_remove.push(removal.clone()),
            }
        }

        for removal in &plan.methods_to_remove {
            let target = removal.display_name();
            if is_constructor(removal.owner.as_deref(), &removal.name) {
                reject(OperationKind::Methods, &removal.file, target, RejectionReason::Constructor, None);
                continue;
            }
            if let Some((reason, detail)) = self.check_edit(analysis, &removal.file) {
                reject(OperationKind::Methods, &removal.file, target, reason, detail);
                continue;
            }
            if let Some(other) = tokens.first_outside(&removal.name, &removal.file) {
                let detail = format!("mentioned in {}", analysis.relative(other).display());
                reject(
                    OperationKind::Methods,
                    &removal.file,
                    target,
                    RejectionReason::StillReferenced,
                    Some(detail),
                );
                continue;
            }
            approved.methods_to_remove.push(removal.clone());
        }

        for removal in &plan.variables_to_remove {
            match self.check_edit(analysis, &removal.file) {
                Some((reason, detail)) => {
                    reject(OperationKind::Variables, &removal.file, removal.name.clone(), reason, detail)
                }
                None => approved.variables_to_remove.push(removal.clone()),
            }
        }

        // Method duplicates are advisory and never touch disk.
        approved.duplicates_to_refactor = plan.duplicates_to_refactor.clone();

        for component in &plan.components_to_create {
            match self.check_component(analysis, component) {
                Some((file, reason, detail)) => {
                    reject(OperationKind::Components, &file, component.name.clone(), reason, detail)
                }
                None => approved.components_to_create.push(component.clone()),
            }
        }

        tracing::info!(
            approved = approved.total_operations(),
            rejected = rejected.len(),
            "safety validation complete"
        );
        ValidationOutcome { approved, rejected }
    }
}

/// Validates `plan` against the current tree.
pub fn validate_cleanup_safety(
    plan: &CleanupPlan,
    analysis: &CodebaseAnalysis,
    source: &dyn SourceTree,
    analyzers: &Analyzers,
    policy: &ConventionPolicy,
    dynamic_patterns: &[String],
) -> Result<ValidationOutcome> {
    let validator = SafetyValidator::new(&analysis.root, source, analyzers, policy, dynamic_patterns)?;
    Ok(validator.validate(plan, analysis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CleanupConfig, ConventionsConfig, PolicyConfig};
    use crate::model::{FileAnalysis, FileDeletion, ImportKind, ImportRef, ImportRemoval, MethodRemoval};
    use crate::source::FsSourceTree;
    use tempfile::TempDir;

    struct Env {
        temp: TempDir,
        analyzers: Analyzers,
        policy: ConventionPolicy,
        tree: FsSourceTree,
        analysis: CodebaseAnalysis,
    }

    fn env(files: &[(&str, &str)]) -> Env {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let analyzers = Analyzers::new(&root);
        let mut analysis = CodebaseAnalysis::new(&root);
        for (relative, content) in files {
            let path = root.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            if let Some(analyzer) = analyzers.for_path(&path) {
                let record: FileAnalysis = analyzer.analyze_source(&path, content).unwrap();
                analysis.add(record);
            }
        }
        let policy =
            ConventionPolicy::new(&root, &ConventionsConfig::default(), &PolicyConfig::default(), &[]).unwrap();
        let tree = FsSourceTree::new(&root, &CleanupConfig::default()).unwrap();
        Env {
            temp,
            analyzers,
            policy,
            tree,
            analysis,
        }
    }

    impl Env {
        fn path(&self, relative: &str) -> PathBuf {
            self.temp.path().join(relative)
        }

        fn validate(&self, plan: &CleanupPlan) -> ValidationOutcome {
            validate_cleanup_safety(plan, &self.analysis, &self.tree, &self.analyzers, &self.policy, &[]).unwrap()
        }
    }

    fn deletion(path: PathBuf) -> FileDeletion {
        FileDeletion {
            path,
            size_bytes: 10,
            line_count: 1,
            reason: "orphaned".into(),
        }
    }

    fn method(file: PathBuf, owner: &str, name: &str) -> MethodRemoval {
        MethodRemoval {
            file,
            owner: Some(owner.into()),
            name: name.into(),
            line: 5,
            start_line: 5,
            end_line: 8,
        }
    }

    const PLAIN: &str = "<?php\nnamespace App;\n\nclass Plain\n{\n    private function unused()\n    {\n        return 1;\n    }\n}\n";

    #[test]
    fn test_protected_files_always_rejected() {
        let e = env(&[("composer.json", "{}"), ("public/index.php", "<?php\n"), (".env", "APP_KEY=x\n")]);
        let mut plan = CleanupPlan::new();
        for name in ["composer.json", "public/index.php", ".env"] {
            plan.files_to_delete.push(deletion(e.path(name)));
        }
        let outcome = e.validate(&plan);
        assert!(outcome.approved.files_to_delete.is_empty());
        assert_eq!(outcome.rejected.len(), 3);
        assert!(outcome.rejected.iter().all(|r| r.reason == RejectionReason::ProtectedFile));
        assert!(!outcome.is_safe());
    }

    #[test]
    fn test_constructors_rejected_regardless_of_batch() {
        let e = env(&[("app/Plain.php", PLAIN)]);
        let file = e.path("app/Plain.php");
        let mut plan = CleanupPlan::new();
        plan.methods_to_remove.push(method(file.clone(), "App\\Plain", "__construct"));
        plan.methods_to_remove.push(method(file.clone(), "App\\Plain", "Plain"));
        plan.methods_to_remove.push(method(file, "App\\Plain", "unused"));

        let outcome = e.validate(&plan);
        let reasons: Vec<_> = outcome.rejected.iter().map(|r| r.reason).collect();
        assert_eq!(reasons, vec![RejectionReason::Constructor, RejectionReason::Constructor]);
        assert_eq!(outcome.approved.methods_to_remove.len(), 1);
        assert_eq!(outcome.approved.methods_to_remove[0].name, "unused");
    }

    #[test]
    fn test_dynamic_reference_rejects_edits_in_file() {
        let source = "<?php\nnamespace App;\n\nuse App\\Gone;\n\nclass Router\n{\n    public function go($name)\n    {\n        return $this->$name();\n    }\n}\n";
        let e = env(&[("app/Router.php", source)]);
        let file = e.path("app/Router.php");
        let mut plan = CleanupPlan::new();
        plan.imports_to_remove.push(ImportRemoval {
            file,
            import: ImportRef::new("App\\Gone", "Gone", 4, ImportKind::Class),
        });
        let outcome = e.validate(&plan);
        assert!(outcome.approved.imports_to_remove.is_empty());
        assert_eq!(outcome.rejected[0].reason, RejectionReason::DynamicReference);
        assert!(outcome.rejected[0].detail.as_deref().unwrap().starts_with("line 10"));
    }

    #[test]
    fn test_missing_and_still_referenced_files() {
        let e = env(&[("app/Plain.php", PLAIN)]);
        let mut plan = CleanupPlan::new();
        plan.files_to_delete.push(deletion(e.path("app/Vanished.php")));
        plan.files_to_delete.push(deletion(e.path("app/Plain.php")));
        let outcome = e.validate(&plan);
        let reasons: Vec<_> = outcome.rejected.iter().map(|r| r.reason).collect();
        assert_eq!(reasons, vec![RejectionReason::MissingFile, RejectionReason::StillReferenced]);
    }

    #[test]
    fn test_method_mentioned_elsewhere_is_still_referenced() {
        let caller = "<?php\nnamespace App;\n\nclass Caller\n{\n    public function run(Plain $p)\n    {\n        return $p->unused();\n    }\n}\n";
        let e = env(&[("app/Plain.php", PLAIN), ("app/Caller.php", caller)]);
        let mut plan = CleanupPlan::new();
        plan.methods_to_remove.push(method(e.path("app/Plain.php"), "App\\Plain", "unused"));
        let outcome = e.validate(&plan);
        assert_eq!(outcome.rejected[0].reason, RejectionReason::StillReferenced);
        assert_eq!(outcome.rejected[0].detail.as_deref(), Some("mentioned in app/Caller.php"));
    }

    #[test]
    fn test_helpers() {
        assert!(is_constructor(Some("App\\Legacy"), "legacy"));
        assert!(is_constructor(None, "constructor"));
        assert!(!is_constructor(Some("App\\Legacy"), "handle"));
        assert!(check_dynamic_references("<?php\ncall_user_func($f);\n", Language::Php));
        assert!(!check_dynamic_references("<?php\n$a->b();\n", Language::Php));
    }
}
