use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::analysis::ImportRef;
use super::duplicates::{ComponentExtractionSuggestion, DuplicateMethodMatch};
use super::modification::{FileModificationPlan, FragmentReplacement, MethodTarget, VariableTarget};

/// Operation families a run can be restricted to (`--only imports,variables`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Files,
    Imports,
    Methods,
    Variables,
    Duplicates,
    Components,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::Files,
        OperationKind::Imports,
        OperationKind::Methods,
        OperationKind::Variables,
        OperationKind::Duplicates,
        OperationKind::Components,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Files => "files",
            OperationKind::Imports => "imports",
            OperationKind::Methods => "methods",
            OperationKind::Variables => "variables",
            OperationKind::Duplicates => "duplicates",
            OperationKind::Components => "components",
        }
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "files" | "file" => Ok(OperationKind::Files),
            "imports" | "import" => Ok(OperationKind::Imports),
            "methods" | "method" => Ok(OperationKind::Methods),
            "variables" | "variable" | "vars" => Ok(OperationKind::Variables),
            "duplicates" | "duplicate" => Ok(OperationKind::Duplicates),
            "components" | "component" => Ok(OperationKind::Components),
            other => Err(format!(
                "unknown operation '{}' (expected one of: files, imports, methods, variables, duplicates, components)",
                other
            )),
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDeletion {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub line_count: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRemoval {
    pub file: PathBuf,
    pub import: ImportRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRemoval {
    pub file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub name: String,
    pub line: u32,
    pub start_line: u32,
    pub end_line: u32,
}

impl MethodRemoval {
    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub fn display_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}::{}", owner, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRemoval {
    pub file: PathBuf,
    pub name: String,
    pub line: u32,
    pub end_line: u32,
}

/// A candidate the pipeline could not prove safe; reported, never applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualReviewItem {
    pub file: PathBuf,
    pub kind: OperationKind,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    ProtectedFile,
    Constructor,
    DynamicReference,
    SyntaxError,
    StillReferenced,
    StalePlan,
    MissingFile,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::ProtectedFile => "protected file",
            RejectionReason::Constructor => "constructor or initializer",
            RejectionReason::DynamicReference => "dynamic reference in file",
            RejectionReason::SyntaxError => "file does not parse",
            RejectionReason::StillReferenced => "still referenced elsewhere",
            RejectionReason::StalePlan => "plan is stale",
            RejectionReason::MissingFile => "file not found",
        }
    }
}

/// An operation the safety gate refused; an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRejection {
    pub kind: OperationKind,
    pub file: PathBuf,
    pub target: String,
    pub reason: RejectionReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SafetyRejection {
    pub fn new(
        kind: OperationKind,
        file: impl Into<PathBuf>,
        target: impl Into<String>,
        reason: RejectionReason,
    ) -> Self {
        Self {
            kind,
            file: file.into(),
            target: target.into(),
            reason,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Pure value produced by the planner. Building one never touches disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupPlan {
    pub files_to_delete: Vec<FileDeletion>,
    pub imports_to_remove: Vec<ImportRemoval>,
    pub methods_to_remove: Vec<MethodRemoval>,
    pub variables_to_remove: Vec<VariableRemoval>,
    pub duplicates_to_refactor: Vec<DuplicateMethodMatch>,
    pub components_to_create: Vec<ComponentExtractionSuggestion>,
    /// Megabytes, never negative.
    pub estimated_size_reduction: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manual_review: Vec<ManualReviewItem>,
}

impl CleanupPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of the six operation lists. Manual-review items are not operations.
    pub fn total_operations(&self) -> usize {
        self.files_to_delete.len()
            + self.imports_to_remove.len()
            + self.methods_to_remove.len()
            + self.variables_to_remove.len()
            + self.duplicates_to_refactor.len()
            + self.components_to_create.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_operations() == 0
    }

    pub fn set_estimated_size_reduction(&mut self, megabytes: f64) {
        self.estimated_size_reduction = if megabytes.is_finite() {
            megabytes.max(0.0)
        } else {
            0.0
        };
    }

    pub fn is_deleted(&self, path: &Path) -> bool {
        self.files_to_delete.iter().any(|d| d.path == path)
    }

    /// Counts per operation kind, in `OperationKind::ALL` order.
    pub fn counts(&self) -> BTreeMap<OperationKind, usize> {
        OperationKind::ALL
            .iter()
            .map(|kind| {
                let n = match kind {
                    OperationKind::Files => self.files_to_delete.len(),
                    OperationKind::Imports => self.imports_to_remove.len(),
                    OperationKind::Methods => self.methods_to_remove.len(),
                    OperationKind::Variables => self.variables_to_remove.len(),
                    OperationKind::Duplicates => self.duplicates_to_refactor.len(),
                    OperationKind::Components => self.components_to_create.len(),
                };
                (*kind, n)
            })
            .collect()
    }

    /// Groups in-place edits into exactly one modification plan per file.
    /// Files scheduled for deletion get no edit plan.
    pub fn file_plans(&self) -> Vec<FileModificationPlan> {
        let mut plans: BTreeMap<&Path, FileModificationPlan> = BTreeMap::new();

        for removal in &self.imports_to_remove {
            plan_for(&mut plans, &removal.file)
                .imports
                .push(removal.import.clone());
        }

        for removal in &self.methods_to_remove {
            plan_for(&mut plans, &removal.file).methods.push(MethodTarget {
                owner: removal.owner.clone(),
                name: removal.name.clone(),
                line: removal.line,
                start_line: removal.start_line,
                end_line: removal.end_line,
            });
        }

        for removal in &self.variables_to_remove {
            plan_for(&mut plans, &removal.file)
                .variables
                .push(VariableTarget {
                    name: removal.name.clone(),
                    line: removal.line,
                    end_line: removal.end_line,
                });
        }

        for component in self.components_to_create.iter().filter(|c| c.auto_applicable) {
            for occurrence in &component.occurrences {
                plan_for(&mut plans, &occurrence.file)
                    .fragments
                    .push(FragmentReplacement {
                        start_line: occurrence.line,
                        end_line: occurrence.end_line,
                        component: component.name.clone(),
                    });
            }
        }

        plans
            .into_values()
            .filter(|p| !self.is_deleted(&p.path))
            .collect()
    }
}

fn plan_for<'a, 'p>(
    plans: &'a mut BTreeMap<&'p Path, FileModificationPlan>,
    path: &'p Path,
) -> &'a mut FileModificationPlan {
    plans
        .entry(path)
        .or_insert_with(|| FileModificationPlan::new(path))
}
