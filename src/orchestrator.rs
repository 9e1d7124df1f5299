use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;

use crate::backup::{BackupManager, BackupSession, GitCheckpoint, VersionControl};
use crate::config::{CleanupConfig, ResolvedConfig};
use crate::conventions::ConventionPolicy;
use crate::detector::{detect_duplicates, detect_usage};
use crate::error::{CleanupError, Result};
use crate::fixer::{CancellationToken, Executor, ProgressCallback};
use crate::graph::{build_dependency_graph, index_symbols};
use crate::model::{
    CleanupPlan, CleanupReport, CodebaseAnalysis, ExecutionSummary, FileAnalysis, FileModificationResult,
    Language, ModificationKind, PhaseTiming, TestOutcome,
};
use crate::parser::lexer::count_words;
use crate::parser::{detect_language, Analyzers};
use crate::planner::Planner;
use crate::report::{build_report, save_report, ReportInput};
use crate::safety::{validate_cleanup_safety, CommandTestRunner, DynamicPatterns, TestRunner};
use crate::source::{FsSourceTree, SourceTree};

const LANGUAGE_ORDER: [Language; 6] = [
    Language::Php,
    Language::Route,
    Language::JavaScript,
    Language::Template,
    Language::Css,
    Language::Asset,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Analyzing,
    Planning,
    Validating,
    DryRunReporting,
    Applying,
    Testing,
    RollingBack,
    Reporting,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Analyzing => "analyzing",
            RunState::Planning => "planning",
            RunState::Validating => "validating",
            RunState::DryRunReporting => "dry-run-reporting",
            RunState::Applying => "applying",
            RunState::Testing => "testing",
            RunState::RollingBack => "rolling-back",
            RunState::Reporting => "reporting",
            RunState::Done => "done",
        };
        f.write_str(name)
    }
}

fn enter(state: RunState) {
    tracing::info!(state = %state, "cleanup state");
}

fn timing(phase: &str, started: Instant) -> PhaseTiming {
    PhaseTiming {
        phase: phase.to_string(),
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

enum Parsed {
    Ok(FileAnalysis),
    Failed { error: CleanupError, tokens: Option<Vec<String>> },
}

/// Coordinates analyze, plan and execute. Holds configuration and
/// collaborators only; every call starts from the files on disk.
pub struct CleanupOrchestrator {
    resolved: ResolvedConfig,
    test_runner: Option<Arc<dyn TestRunner>>,
    version_control: Option<Arc<dyn VersionControl>>,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl CleanupOrchestrator {
    pub fn new(resolved: ResolvedConfig) -> Self {
        Self {
            resolved,
            test_runner: None,
            version_control: None,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_test_runner(mut self, runner: Arc<dyn TestRunner>) -> Self {
        self.test_runner = Some(runner);
        self
    }

    pub fn with_version_control(mut self, vcs: Arc<dyn VersionControl>) -> Self {
        self.version_control = Some(vcs);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Token that stops the current or next analysis or execution at a batch
    /// boundary. Each call clears it on return.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn root(&self) -> &Path {
        &self.resolved.root
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.resolved.config
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CleanupError::Cancelled);
        }
        Ok(())
    }

    fn policy(&self) -> Result<ConventionPolicy> {
        let extra: Vec<String> = self
            .resolved
            .composer
            .as_ref()
            .map(|c| c.autoload_files())
            .unwrap_or_default();
        let config = self.config();
        ConventionPolicy::new(self.root(), &config.conventions, &config.policy, &extra)
    }

    fn parse_one(
        &self,
        source: &dyn SourceTree,
        analyzers: &Analyzers,
        extra: &DynamicPatterns,
        language: Language,
        path: &Path,
    ) -> Parsed {
        let analyzer = analyzers.get(language);
        if language == Language::Asset {
            return match analyzer.parse_file(path) {
                Ok(analysis) => Parsed::Ok(analysis),
                Err(error) => Parsed::Failed { error, tokens: None },
            };
        }
        let text = match source.read_to_string(path) {
            Ok(text) => text,
            Err(error) => return Parsed::Failed { error, tokens: None },
        };
        match analyzer.analyze_source(path, &text) {
            Ok(mut analysis) => {
                if !extra.is_empty() {
                    analysis.base_mut().dynamic_references.extend(extra.scan(&text));
                }
                Parsed::Ok(analysis)
            }
            Err(error) => {
                let mut words = BTreeMap::new();
                count_words(&text, &mut words);
                Parsed::Failed {
                    error,
                    tokens: Some(words.into_keys().collect()),
                }
            }
        }
    }

    /// Parses every included file, one language batch at a time with the
    /// files of a batch in parallel, then builds the graph and usage report.
    /// A file that fails to parse is recorded and its words kept as
    /// references; the run continues.
    pub fn analyze_codebase(&self) -> Result<CodebaseAnalysis> {
        let result = self.analyze();
        self.cancel.reset();
        result
    }

    fn analyze(&self) -> Result<CodebaseAnalysis> {
        let started = Instant::now();
        let root = self.root();
        let config = self.config();
        let source = FsSourceTree::new(root, config)?;
        let analyzers = Analyzers::new(root);
        let extra = DynamicPatterns::new(&config.policy.dynamic_patterns)?;

        let listing = source.list_files(&config.include_paths, &config.extensions())?;
        let mut by_language: BTreeMap<Language, Vec<PathBuf>> = BTreeMap::new();
        for path in listing.files {
            if let Some(language) = detect_language(root, &path) {
                by_language.entry(language).or_default().push(path);
            }
        }

        let mut analysis = CodebaseAnalysis::new(root);
        analysis.skipped = listing.skipped;

        for language in LANGUAGE_ORDER {
            self.check_cancelled()?;
            let Some(paths) = by_language.get(&language) else {
                continue;
            };
            let batch_started = Instant::now();
            let parsed: Vec<(&PathBuf, Parsed)> = paths
                .par_iter()
                .map(|path| (path, self.parse_one(&source, &analyzers, &extra, language, path)))
                .collect();

            for (path, result) in parsed {
                match result {
                    Parsed::Ok(record) => analysis.add(record),
                    Parsed::Failed { error, tokens } => {
                        tracing::warn!(path = %path.display(), error = %error, "analysis failed");
                        if let Some(tokens) = tokens {
                            analysis.unparsed_tokens.insert(path.clone(), tokens.into_iter().collect());
                        }
                        analysis.record_failure(path, error);
                    }
                }
            }
            tracing::debug!(
                language = %language,
                files = paths.len(),
                elapsed_ms = batch_started.elapsed().as_millis() as u64,
                "language batch analysed"
            );
        }

        let resolver = index_symbols(&analysis, self.resolved.composer.as_ref());
        analysis.dependency_graph = build_dependency_graph(&analysis, &resolver);
        let policy = self.policy()?;
        detect_usage(&mut analysis, &resolver, &policy);

        analysis.analyzed_at = Utc::now();
        analysis.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            files = analysis.total_files(),
            failures = analysis.failures.len(),
            orphans = analysis.usage.orphaned_files.len(),
            duration_ms = analysis.duration_ms,
            "codebase analysed"
        );
        Ok(analysis)
    }

    fn plan_with(&self, analysis: &CodebaseAnalysis, analyzers: &Analyzers, policy: &ConventionPolicy) -> CleanupPlan {
        let config = self.config();
        let duplicates = if config.refactor_duplicates || config.create_components {
            detect_duplicates(analysis, analyzers, &config.similarity)
        } else {
            Default::default()
        };
        Planner::new(config, analyzers, policy).plan(analysis, &duplicates)
    }

    /// Pure with respect to disk: reads nothing beyond `analysis`.
    pub fn generate_cleanup_plan(&self, analysis: &CodebaseAnalysis) -> Result<CleanupPlan> {
        let analyzers = Analyzers::new(self.root());
        let policy = self.policy()?;
        Ok(self.plan_with(analysis, &analyzers, &policy))
    }

    /// Runs the project's test suite with the configured runner.
    pub fn run_test_validation(&self) -> TestOutcome {
        let started = Instant::now();
        let runner: Arc<dyn TestRunner> = match &self.test_runner {
            Some(runner) => Arc::clone(runner),
            None => Arc::new(CommandTestRunner::from_config(self.root(), self.config())),
        };
        match runner.run_project_tests() {
            Ok(outcome) => outcome,
            Err(err) => TestOutcome {
                passed: false,
                timed_out: false,
                duration_ms: started.elapsed().as_millis() as u64,
                output: err.to_string(),
            },
        }
    }

    fn take_checkpoint(&self, summary: &mut ExecutionSummary) -> Option<Arc<dyn VersionControl>> {
        if !self.config().git_checkpoint {
            return None;
        }
        let vcs: Arc<dyn VersionControl> = match &self.version_control {
            Some(vcs) => Arc::clone(vcs),
            None => Arc::new(
                GitCheckpoint::new(self.root())
                    .excluding(".sweeper")
                    .excluding(&self.config().backup_dir),
            ),
        };
        if !vcs.is_available() {
            summary.warnings.push("gitCheckpoint is enabled but the project is not a git work tree".to_string());
            return None;
        }
        match vcs.commit("sweeper: checkpoint before cleanup") {
            Ok(hash) => {
                summary.checkpoint = Some(hash);
                Some(vcs)
            }
            Err(err) => {
                summary.warnings.push(format!("git checkpoint failed: {}", err));
                None
            }
        }
    }

    /// Undoes every change of this run. Backups first, then the git
    /// checkpoint. Returns whether the tree was restored.
    fn roll_back(
        &self,
        session: Option<&BackupSession>,
        vcs: Option<&Arc<dyn VersionControl>>,
        checkpoint: Option<&str>,
        results: &mut [FileModificationResult],
        summary: &mut ExecutionSummary,
    ) -> bool {
        let mut restored = false;
        if let Some(session) = session {
            match session.restore_all() {
                Ok(_) => restored = true,
                Err(err) => summary.warnings.push(format!("restore from backup failed: {}", err)),
            }
        }
        if !restored {
            if let (Some(vcs), Some(checkpoint)) = (vcs, checkpoint) {
                match vcs.revert_to(checkpoint) {
                    Ok(true) => {
                        restored = true;
                        remove_created(results, summary);
                    }
                    Ok(false) => summary.warnings.push("git revert to checkpoint failed".to_string()),
                    Err(err) => summary.warnings.push(format!("git revert failed: {}", err)),
                }
            }
        }
        if restored {
            for result in results.iter_mut() {
                result.mark_restored();
            }
        }
        restored
    }

    /// analyze, plan, validate, then either simulate (dry run) or back up,
    /// apply, test and roll back on failure. Analysis errors abort the run;
    /// everything after is reported.
    pub fn execute_cleanup(&self) -> Result<CleanupReport> {
        let result = self.execute();
        self.cancel.reset();
        result
    }

    fn execute(&self) -> Result<CleanupReport> {
        let config = self.config();
        let root = self.root();
        let mut summary = ExecutionSummary::new(config.dry_run, Utc::now());

        enter(RunState::Idle);
        enter(RunState::Analyzing);
        let phase = Instant::now();
        let analysis = self.analyze()?;
        summary.phases.push(timing("analyze", phase));
        self.check_cancelled()?;

        enter(RunState::Planning);
        let phase = Instant::now();
        let analyzers = Analyzers::new(root);
        let policy = self.policy()?;
        let plan = self.plan_with(&analysis, &analyzers, &policy);
        summary.operations_planned = plan.total_operations();
        summary.phases.push(timing("plan", phase));

        enter(RunState::Validating);
        let phase = Instant::now();
        let source = FsSourceTree::new(root, config)?;
        let validation = validate_cleanup_safety(
            &plan,
            &analysis,
            &source,
            &analyzers,
            &policy,
            &config.policy.dynamic_patterns,
        )?;
        let approved = validation.approved;
        summary.rejected = validation.rejected;
        summary.phases.push(timing("validate", phase));

        if config.dry_run {
            enter(RunState::DryRunReporting);
            summary.finalize(Utc::now());
            let report = build_report(ReportInput {
                analysis: &analysis,
                plan: &approved,
                summary,
                file_results: Vec::new(),
            });
            enter(RunState::Done);
            return Ok(report);
        }

        enter(RunState::Applying);
        let phase = Instant::now();
        if !config.create_backup {
            tracing::warn!("backups disabled; rollback is unavailable for this run");
            summary
                .warnings
                .push("createBackup is disabled: changes from this run cannot be rolled back from backup".to_string());
        }
        let vcs = self.take_checkpoint(&mut summary);
        let manager = BackupManager::from_config(root, config);
        let session = if config.create_backup {
            Some(manager.start_session()?)
        } else {
            None
        };
        summary.backup_session = session.as_ref().map(|s| s.dir().to_path_buf());

        let mut executor = Executor::new(&source, &analyzers, config.batch_size).with_cancellation(self.cancel.clone());
        if let Some(session) = &session {
            executor = executor.with_backups(session);
        }
        if let Some(progress) = &self.progress {
            executor = executor.with_progress(Arc::clone(progress));
        }
        let execution = executor.execute(&approved);
        summary.operations_attempted = execution.operations_attempted;
        summary.operations_succeeded = execution.operations_succeeded;
        summary.operations_failed = execution.operations_failed;
        summary.operations_skipped = execution.operations_skipped;
        summary.cancelled = execution.cancelled;
        summary.warnings.extend(execution.validation_errors.iter().map(|e| format!("stale plan: {}", e)));
        let changed = execution.modified_paths().next().is_some();
        let mut file_results = execution.file_results;
        summary.phases.push(timing("apply", phase));

        if config.run_tests && changed {
            enter(RunState::Testing);
            let phase = Instant::now();
            let outcome = self.run_test_validation();
            summary.phases.push(timing("test", phase));
            let passed = outcome.passed;
            let timed_out = outcome.timed_out;
            summary.tests = Some(outcome);

            if !passed {
                enter(RunState::RollingBack);
                let reason = if timed_out {
                    format!("test suite timed out after {}s", config.test_timeout_secs)
                } else {
                    "test suite failed".to_string()
                };
                tracing::warn!(reason = %reason, "rolling back cleanup");
                let checkpoint = summary.checkpoint.clone();
                let restored = self.roll_back(
                    session.as_ref(),
                    vcs.as_ref(),
                    checkpoint.as_deref(),
                    &mut file_results,
                    &mut summary,
                );
                summary.rolled_back = restored;
                summary.rollback_reason = Some(if restored {
                    reason
                } else {
                    format!("{}; rollback could not be completed", reason)
                });
            }
        }

        if session.is_some() {
            if let Err(err) = manager.prune() {
                tracing::warn!(error = %err, "backup pruning failed");
            }
        }

        enter(RunState::Reporting);
        summary.finalize(Utc::now());
        let report = build_report(ReportInput {
            analysis: &analysis,
            plan: &approved,
            summary,
            file_results,
        });
        match save_report(root, &report) {
            Ok(path) => tracing::debug!(path = %path.display(), "report written"),
            Err(err) => tracing::warn!(error = %err, "could not write report"),
        }
        enter(RunState::Done);
        Ok(report)
    }
}

/// Deletes component views written by this run. A checkpoint revert leaves
/// them behind as untracked files.
fn remove_created(results: &[FileModificationResult], summary: &mut ExecutionSummary) {
    for result in results.iter().filter(|r| r.count(ModificationKind::CreateComponent) > 0) {
        let path = result.path();
        if !path.exists() {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed created component"),
            Err(err) => summary
                .warnings
                .push(format!("could not remove {}: {}", path.display(), err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use std::fs;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)], config: &str) -> TempDir {
        let temp = TempDir::new().unwrap();
        for (relative, content) in files {
            let path = temp.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        fs::write(temp.path().join("sweeper.json"), config).unwrap();
        temp
    }

    fn orchestrator(temp: &TempDir) -> CleanupOrchestrator {
        CleanupOrchestrator::new(load_config(temp.path(), None).unwrap())
    }

    #[test]
    fn test_state_names() {
        assert_eq!(RunState::DryRunReporting.to_string(), "dry-run-reporting");
        assert_eq!(RunState::RollingBack.to_string(), "rolling-back");
    }

    #[test]
    fn test_broken_file_is_recorded_not_fatal() {
        let temp = project(
            &[
                ("app/Good.php", "<?php\nnamespace App;\n\nclass Good\n{\n}\n"),
                ("app/Broken.php", "<?php\nclass Broken {\n    public function x() { return Helper::call(; \n"),
            ],
            "{}",
        );
        let analysis = orchestrator(&temp).analyze_codebase().unwrap();
        assert_eq!(analysis.failures.len(), 1);
        assert!(analysis.failures[0].path.ends_with("Broken.php"));
        let tokens = analysis.unparsed_tokens.values().next().unwrap();
        assert!(tokens.contains("Helper"));
        assert!(analysis.file(&temp.path().canonicalize().unwrap().join("app/Good.php")).is_some());
    }

    #[test]
    fn test_cancelled_before_analysis() {
        let temp = project(&[("app/A.php", "<?php\nclass A {}\n")], "{}");
        let orchestrator = orchestrator(&temp);
        orchestrator.cancellation_token().cancel();
        assert!(matches!(orchestrator.analyze_codebase(), Err(CleanupError::Cancelled)));
    }

    #[test]
    fn test_cancellation_does_not_outlive_the_call() {
        let temp = project(&[("app/A.php", "<?php\nclass A {}\n")], "{}");
        let orchestrator = orchestrator(&temp);
        let token = orchestrator.cancellation_token();

        token.cancel();
        assert!(matches!(orchestrator.analyze_codebase(), Err(CleanupError::Cancelled)));
        assert!(!token.is_cancelled());
        assert_eq!(orchestrator.analyze_codebase().unwrap().total_files(), 1);

        token.cancel();
        assert!(matches!(orchestrator.execute_cleanup(), Err(CleanupError::Cancelled)));
        let report = orchestrator.execute_cleanup().unwrap();
        assert!(!report.execution_summary().cancelled);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let source = "<?php\nnamespace App;\n\nuse App\\Models\\Gone;\n\nclass Kept\n{\n}\n";
        let temp = project(&[("app/Kept.php", source)], "{\"dryRun\": true}");
        let report = orchestrator(&temp).execute_cleanup().unwrap();
        assert!(report.execution_summary().dry_run);
        assert_eq!(fs::read_to_string(temp.path().join("app/Kept.php")).unwrap(), source);
        assert!(!temp.path().join(".sweeper").exists());
    }
}
