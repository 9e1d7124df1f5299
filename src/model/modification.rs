use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::analysis::ImportRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub name: String,
    pub line: u32,
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableTarget {
    pub name: String,
    pub line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentReplacement {
    pub start_line: u32,
    pub end_line: u32,
    pub component: String,
}

/// All edits for a single file. The planner emits at most one per path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileModificationPlan {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodTarget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableTarget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<FragmentReplacement>,
}

impl FileModificationPlan {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            imports: Vec::new(),
            methods: Vec::new(),
            variables: Vec::new(),
            fragments: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.methods.is_empty()
            && self.variables.is_empty()
            && self.fragments.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.imports.len() + self.methods.len() + self.variables.len() + self.fragments.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationKind {
    RemoveImport,
    RemoveMethod,
    RemoveVariable,
    ReplaceFragment,
    CreateComponent,
    DeleteFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedModification {
    pub kind: ModificationKind,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub applied_at: DateTime<Utc>,
}

impl AppliedModification {
    pub fn now(kind: ModificationKind, target: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            kind,
            target: target.into(),
            line,
            applied_at: Utc::now(),
        }
    }
}

/// Outcome of one per-file transaction. `success` turns false on the first
/// recorded error and never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileModificationResult {
    path: PathBuf,
    success: bool,
    errors: Vec<String>,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub lines_before: u32,
    pub lines_after: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    pub modifications: Vec<AppliedModification>,
    /// Set once a failed write has been undone from backup.
    pub restored: bool,
}

impl FileModificationResult {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            success: true,
            errors: Vec::new(),
            bytes_before: 0,
            bytes_after: 0,
            lines_before: 0,
            lines_after: 0,
            backup_path: None,
            modifications: Vec::new(),
            restored: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.success = false;
    }

    pub fn record(&mut self, modification: AppliedModification) {
        self.modifications.push(modification);
    }

    /// Drops applied modifications after the file was restored.
    pub fn mark_restored(&mut self) {
        self.restored = true;
        self.modifications.clear();
        self.bytes_after = self.bytes_before;
        self.lines_after = self.lines_before;
    }

    pub fn bytes_removed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }

    pub fn lines_removed(&self) -> u32 {
        self.lines_before.saturating_sub(self.lines_after)
    }

    pub fn count(&self, kind: ModificationKind) -> usize {
        self.modifications.iter().filter(|m| m.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_success_until_error() {
        let mut result = FileModificationResult::new("a.php");
        assert!(result.success());
        result.record(AppliedModification::now(ModificationKind::RemoveImport, "App\\A", Some(3)));
        assert!(result.success());
        result.record_error("write failed");
        assert!(!result.success());
        assert_eq!(result.errors().len(), 1);
    }

    #[test]
    fn test_mark_restored_resets_deltas() {
        let mut result = FileModificationResult::new("a.php");
        result.bytes_before = 100;
        result.bytes_after = 60;
        result.lines_before = 10;
        result.lines_after = 6;
        result.record(AppliedModification::now(ModificationKind::RemoveMethod, "x", Some(2)));
        assert_eq!(result.bytes_removed(), 40);
        result.mark_restored();
        assert_eq!(result.bytes_removed(), 0);
        assert_eq!(result.lines_removed(), 0);
        assert!(result.modifications.is_empty());
    }

    #[test]
    fn test_plan_operation_count() {
        let mut plan = FileModificationPlan::new("a.php");
        assert!(plan.is_empty());
        plan.variables.push(VariableTarget {
            name: "$x".into(),
            line: 4,
            end_line: 4,
        });
        assert_eq!(plan.operation_count(), 1);
    }
}
