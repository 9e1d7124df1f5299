use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use super::components::{create_component, fragment_edit, fragment_is_current};
use super::imports::{import_is_current, remove_imports};
use super::members::{apply_line_edits, member_edits};
use crate::backup::{restore_from_backup, BackupSession};
use crate::model::{
    AppliedModification, CleanupPlan, ComponentExtractionSuggestion, FileDeletion, FileModificationPlan,
    FileModificationResult, ModificationKind,
};
use crate::parser::{Analyzers, LanguageAnalyzer};
use crate::source::SourceTree;

/// Shared flag checked between batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Called after each batch with (files done, files total).
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub file_results: Vec<FileModificationResult>,
    /// Stale-plan findings; the affected files were not touched.
    pub validation_errors: Vec<String>,
    pub operations_attempted: usize,
    pub operations_succeeded: usize,
    pub operations_failed: usize,
    pub operations_skipped: usize,
    pub cancelled: bool,
}

impl ExecutionOutcome {
    pub fn modified_paths(&self) -> impl Iterator<Item = &Path> {
        self.file_results
            .iter()
            .filter(|r| r.success() && !r.modifications.is_empty())
            .map(|r| r.path())
    }
}

enum Work<'p> {
    Edit(&'p FileModificationPlan),
    Delete(&'p FileDeletion),
}

impl Work<'_> {
    fn path(&self) -> &Path {
        match self {
            Work::Edit(plan) => &plan.path,
            Work::Delete(deletion) => &deletion.path,
        }
    }

    fn operations(&self) -> usize {
        match self {
            Work::Edit(plan) => plan.operation_count(),
            Work::Delete(_) => 1,
        }
    }
}

fn line_count(text: &str) -> u32 {
    text.lines().count() as u32
}

/// Applies an approved plan file by file, in batches.
pub struct Executor<'a> {
    source: &'a dyn SourceTree,
    analyzers: &'a Analyzers,
    backups: Option<&'a BackupSession>,
    batch_size: usize,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl<'a> Executor<'a> {
    pub fn new(source: &'a dyn SourceTree, analyzers: &'a Analyzers, batch_size: usize) -> Self {
        Self {
            source,
            analyzers,
            backups: None,
            batch_size: batch_size.max(1),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_backups(mut self, session: &'a BackupSession) -> Self {
        self.backups = Some(session);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn analyzer(&self, path: &Path) -> Option<&dyn LanguageAnalyzer> {
        self.analyzers.for_path(path)
    }

    fn validate_edit(
        &self,
        plan: &FileModificationPlan,
        components: &HashMap<&str, &ComponentExtractionSuggestion>,
    ) -> Vec<String> {
        if !self.source.exists(&plan.path) {
            return vec!["file no longer exists".to_string()];
        }
        let analyzer = match self.analyzer(&plan.path) {
            Some(analyzer) => analyzer,
            None => return vec!["no analyzer for this file type".to_string()],
        };
        let text = match self.source.read_to_string(&plan.path) {
            Ok(text) => text,
            Err(err) => return vec![err.to_string()],
        };
        let current = match analyzer.analyze_source(&plan.path, &text) {
            Ok(record) => record,
            Err(err) => return vec![format!("does not parse: {}", err)],
        };
        let base = current.base();

        let mut errors = Vec::new();
        for import in &plan.imports {
            if !import_is_current(base, import) {
                errors.push(format!("import {} not found on line {}", import.symbol, import.line));
            }
        }
        for method in &plan.methods {
            let found = base
                .method(method.owner.as_deref(), &method.name)
                .map(|m| m.line == method.line && m.start_line == method.start_line && m.end_line == method.end_line)
                .unwrap_or(false);
            if !found {
                errors.push(format!("method {} moved or was removed", method.name));
            }
        }
        for variable in &plan.variables {
            let still_there = base
                .variables
                .iter()
                .any(|v| v.name == variable.name && v.declaration_line == Some(variable.line));
            if !still_there {
                errors.push(format!("variable {} not declared on line {}", variable.name, variable.line));
            }
        }
        for fragment in &plan.fragments {
            let current = components
                .get(fragment.component.as_str())
                .map(|c| fragment_is_current(&text, fragment, &c.content))
                .unwrap_or(false);
            if !current {
                errors.push(format!(
                    "lines {}-{} no longer match component {}",
                    fragment.start_line, fragment.end_line, fragment.component
                ));
            }
        }
        errors
    }

    /// Stale-plan check run before any write: files exist, parse, and still
    /// declare every targeted symbol where the plan says. One entry per
    /// problem, keyed by the file it concerns.
    pub fn stale_findings(&self, plan: &CleanupPlan) -> Vec<(PathBuf, String)> {
        let components: HashMap<&str, &ComponentExtractionSuggestion> = plan
            .components_to_create
            .iter()
            .map(|c| (c.name.as_str(), c))
            .collect();
        let mut findings: Vec<(PathBuf, String)> = plan
            .file_plans()
            .par_iter()
            .flat_map_iter(|file_plan| {
                self.validate_edit(file_plan, &components)
                    .into_iter()
                    .map(|message| (file_plan.path.clone(), message))
            })
            .collect();
        for deletion in &plan.files_to_delete {
            if !self.source.exists(&deletion.path) {
                findings.push((deletion.path.clone(), "file no longer exists".to_string()));
            }
        }
        findings.sort();
        findings
    }

    /// [`Self::stale_findings`] rendered as `path: problem`.
    pub fn validate_modifications(&self, plan: &CleanupPlan) -> Vec<String> {
        self.stale_findings(plan)
            .iter()
            .map(|(path, message)| format!("{}: {}", path.display(), message))
            .collect()
    }

    fn backup(&self, path: &Path, result: &mut FileModificationResult) -> bool {
        let Some(session) = self.backups else {
            return true;
        };
        match session.create_file_backup(path) {
            Ok(backup) => {
                result.backup_path = Some(backup);
                true
            }
            Err(err) => {
                result.record_error(format!("backup failed: {}", err));
                false
            }
        }
    }

    /// One file, all or nothing: backup, edit, re-validate, write.
    fn apply_file(&self, plan: &FileModificationPlan) -> FileModificationResult {
        let path = plan.path.as_path();
        let mut result = FileModificationResult::new(path);
        let analyzer = match self.analyzer(path) {
            Some(analyzer) => analyzer,
            None => {
                result.record_error("no analyzer for this file type");
                return result;
            }
        };
        let original = match self.source.read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                result.record_error(err.to_string());
                return result;
            }
        };
        result.bytes_before = original.len() as u64;
        result.lines_before = line_count(&original);
        result.bytes_after = result.bytes_before;
        result.lines_after = result.lines_before;

        if !self.backup(path, &mut result) {
            return result;
        }

        let mut edits = member_edits(plan);
        edits.extend(plan.fragments.iter().map(|f| fragment_edit(&original, f)));

        let updated = apply_line_edits(path, &original, &edits)
            .and_then(|text| remove_imports(analyzer, path, &text, &plan.imports));
        let updated = match updated {
            Ok(text) => text,
            Err(err) => {
                result.record_error(err.to_string());
                return result;
            }
        };
        if let Err(err) = analyzer.validate_syntax(path, &updated) {
            result.record_error(format!("edited file would not parse: {}", err));
            return result;
        }

        if updated != original {
            if let Err(err) = self.source.write(path, updated.as_bytes()) {
                result.record_error(format!("write failed: {}", err));
                if let Some(backup) = result.backup_path.clone() {
                    match restore_from_backup(path, &backup) {
                        Ok(true) => result.mark_restored(),
                        Ok(false) => result.record_error("backup missing; file not restored"),
                        Err(restore) => result.record_error(format!("restore failed: {}", restore)),
                    }
                }
                return result;
            }
        }

        result.bytes_after = updated.len() as u64;
        result.lines_after = line_count(&updated);
        for edit in &edits {
            result.record(AppliedModification::now(edit.kind, edit.target.clone(), Some(edit.start)));
        }
        for import in &plan.imports {
            result.record(AppliedModification::now(
                ModificationKind::RemoveImport,
                import.symbol.clone(),
                Some(import.line),
            ));
        }
        tracing::debug!(
            path = %path.display(),
            operations = result.modifications.len(),
            lines_removed = result.lines_removed(),
            "file modified"
        );
        result
    }

    fn delete_file(&self, deletion: &FileDeletion) -> FileModificationResult {
        let path = deletion.path.as_path();
        let mut result = FileModificationResult::new(path);
        result.bytes_before = deletion.size_bytes;
        result.lines_before = deletion.line_count;
        result.bytes_after = deletion.size_bytes;
        result.lines_after = deletion.line_count;

        if !self.backup(path, &mut result) {
            return result;
        }
        match self.source.remove(path) {
            Ok(()) => {
                result.bytes_after = 0;
                result.lines_after = 0;
                result.record(AppliedModification::now(
                    ModificationKind::DeleteFile,
                    path.display().to_string(),
                    None,
                ));
                tracing::debug!(path = %path.display(), "file deleted");
            }
            Err(err) => result.record_error(format!("delete failed: {}", err)),
        }
        result
    }

    fn run(&self, work: &Work) -> FileModificationResult {
        match work {
            Work::Edit(plan) => self.apply_file(plan),
            Work::Delete(deletion) => self.delete_file(deletion),
        }
    }

    /// Applies `plan`. Files that fail the stale check are skipped; the
    /// rest run in batches of `batch_size`, files within a batch in
    /// parallel. Cancellation is honoured between batches.
    pub fn execute(&self, plan: &CleanupPlan) -> ExecutionOutcome {
        let findings = self.stale_findings(plan);
        let stale: HashSet<PathBuf> = findings.iter().map(|(path, _)| path.clone()).collect();
        let mut outcome = ExecutionOutcome {
            validation_errors: findings
                .iter()
                .map(|(path, message)| format!("{}: {}", path.display(), message))
                .collect(),
            ..ExecutionOutcome::default()
        };

        let file_plans = plan.file_plans();
        let mut work: Vec<Work> = Vec::new();
        for file_plan in &file_plans {
            work.push(Work::Edit(file_plan));
        }
        for deletion in &plan.files_to_delete {
            work.push(Work::Delete(deletion));
        }
        let (work, skipped): (Vec<Work>, Vec<Work>) = work.into_iter().partition(|w| !stale.contains(w.path()));
        outcome.operations_skipped += skipped.iter().map(Work::operations).sum::<usize>();
        for item in &skipped {
            tracing::warn!(path = %item.path().display(), "skipping stale file");
        }

        // Components whose occurrences are all still current get their view
        // written before any occurrence is replaced.
        let mut component_results: BTreeMap<String, FileModificationResult> = BTreeMap::new();
        for component in plan.components_to_create.iter().filter(|c| c.auto_applicable) {
            if component.occurrences.iter().any(|o| stale.contains(&o.file)) {
                outcome.operations_skipped += 1;
                continue;
            }
            component_results.insert(component.name.clone(), create_component(self.source, self.backups, component));
        }
        let created: HashSet<&str> = component_results
            .iter()
            .filter(|(_, r)| r.success())
            .map(|(name, _)| name.as_str())
            .collect();

        let total = work.len();
        let mut done = 0;
        let mut results: Vec<FileModificationResult> = Vec::with_capacity(total);
        for (index, batch) in work.chunks(self.batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                let remaining: usize = work[done..].iter().map(Work::operations).sum();
                outcome.operations_skipped += remaining;
                outcome.cancelled = true;
                tracing::warn!(batch = index, remaining_files = total - done, "execution cancelled");
                break;
            }
            let batch_results: Vec<FileModificationResult> = batch
                .par_iter()
                .map(|item| match item {
                    Work::Edit(file_plan)
                        if file_plan.fragments.iter().any(|f| !created.contains(f.component.as_str())) =>
                    {
                        let mut result = FileModificationResult::new(&file_plan.path);
                        result.record_error("component view was not created");
                        result
                    }
                    _ => self.run(item),
                })
                .collect();
            for (item, result) in batch.iter().zip(&batch_results) {
                outcome.operations_attempted += item.operations();
                if result.success() {
                    outcome.operations_succeeded += item.operations();
                } else {
                    outcome.operations_failed += item.operations();
                    tracing::warn!(path = %result.path().display(), errors = ?result.errors(), "file modification failed");
                }
            }
            results.extend(batch_results);
            done += batch.len();
            if let Some(progress) = &self.progress {
                progress(done, total);
            }
            tracing::debug!(batch = index, done, total, "batch complete");
        }

        let unused = self.remove_unused_components(&component_results, &results);
        for (name, result) in &component_results {
            if unused.contains(name) {
                outcome.operations_skipped += 1;
                continue;
            }
            outcome.operations_attempted += 1;
            if result.success() {
                outcome.operations_succeeded += 1;
            } else {
                outcome.operations_failed += 1;
            }
        }
        component_results.retain(|name, _| !unused.contains(name));
        results.extend(component_results.into_values());
        outcome.file_results = results;
        outcome
    }

    /// Deletes component views no occurrence ended up using and returns
    /// their names.
    fn remove_unused_components(
        &self,
        components: &BTreeMap<String, FileModificationResult>,
        results: &[FileModificationResult],
    ) -> HashSet<String> {
        let used: HashSet<&str> = results
            .iter()
            .filter(|r| r.success())
            .flat_map(|r| r.modifications.iter())
            .filter(|m| m.kind == ModificationKind::ReplaceFragment)
            .map(|m| m.target.as_str())
            .collect();
        let mut unused = HashSet::new();
        for (name, result) in components {
            if !result.success() || used.contains(name.as_str()) {
                continue;
            }
            match self.source.remove(result.path()) {
                Ok(()) => {
                    tracing::debug!(component = %name, "removed unused component");
                    unused.insert(name.clone());
                }
                Err(err) => tracing::warn!(component = %name, error = %err, "unused component not removed"),
            }
        }
        unused
    }
}
