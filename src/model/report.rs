use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::modification::FileModificationResult;
use super::plan::SafetyRejection;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub files_removed: usize,
    pub lines_removed: usize,
    pub imports_removed: usize,
    pub methods_removed: usize,
    pub variables_removed: usize,
    pub duplicates_refactored: usize,
    pub components_created: usize,
}

impl ReportCounts {
    pub fn total(&self) -> usize {
        self.files_removed
            + self.imports_removed
            + self.methods_removed
            + self.variables_removed
            + self.duplicates_refactored
            + self.components_created
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
    Critical,
}

impl Level {
    fn points(self) -> u32 {
        match self {
            Level::Low => 1,
            Level::Medium => 2,
            Level::High => 3,
            Level::Critical => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub title: String,
    pub description: String,
    pub severity: Level,
    pub likelihood: Level,
    pub detection_difficulty: Level,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mitigation: Vec<String>,
    pub score: u32,
}

impl RiskAssessment {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        severity: Level,
        likelihood: Level,
        detection_difficulty: Level,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
            likelihood,
            detection_difficulty,
            mitigation: Vec::new(),
            score: Self::score_for(severity, likelihood, detection_difficulty),
        }
    }

    pub fn with_mitigation(mut self, step: impl Into<String>) -> Self {
        self.mitigation.push(step.into());
        self
    }

    /// Weighted 15/10/5 per level point, capped at 100.
    pub fn score_for(severity: Level, likelihood: Level, detection: Level) -> u32 {
        (severity.points() * 15 + likelihood.points() * 10 + detection.points() * 5).min(100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn ordinal(self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRecommendation {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub priority_score: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
}

impl MaintenanceRecommendation {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category: category.into(),
            priority,
            priority_score: priority.ordinal(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }
}

/// Narrative entry used by the performance, quality and future-work lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub title: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<f64>,
}

impl Improvement {
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
            metric: None,
        }
    }

    pub fn with_metric(mut self, value: f64) -> Self {
        self.metric = Some(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub passed: bool,
    pub timed_out: bool,
    pub duration_ms: u64,
    /// Tail of the runner output.
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub phases: Vec<PhaseTiming>,
    pub operations_planned: usize,
    pub operations_attempted: usize,
    pub operations_succeeded: usize,
    pub operations_failed: usize,
    pub operations_skipped: usize,
    success_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestOutcome>,
    pub rolled_back: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_session: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<SafetyRejection>,
}

impl ExecutionSummary {
    pub fn new(dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            dry_run,
            started_at,
            finished_at: started_at,
            duration_ms: 0,
            phases: Vec::new(),
            operations_planned: 0,
            operations_attempted: 0,
            operations_succeeded: 0,
            operations_failed: 0,
            operations_skipped: 0,
            success_rate: 100.0,
            tests: None,
            rolled_back: false,
            rollback_reason: None,
            backup_session: None,
            checkpoint: None,
            cancelled: false,
            warnings: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Recomputes the derived success rate; always within `[0, 100]`.
    pub fn finalize(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = finished_at;
        self.duration_ms = (finished_at - self.started_at).num_milliseconds().max(0) as u64;
        self.success_rate = Self::rate(self.operations_succeeded, self.operations_attempted);
    }

    pub fn success_rate(&self) -> f64 {
        self.success_rate.clamp(0.0, 100.0)
    }

    fn rate(succeeded: usize, attempted: usize) -> f64 {
        if attempted == 0 {
            return 100.0;
        }
        (succeeded.min(attempted) as f64 / attempted as f64 * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactSummary {
    pub files_analyzed: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub lines_removed: usize,
    pub bytes_removed: u64,
    pub size_reduction_mb: f64,
    pub manual_review_items: usize,
    pub analysis_failures: usize,
    pub unused_css_selectors: usize,
    pub unused_assets: usize,
}

/// Everything a report is assembled from.
#[derive(Debug, Clone)]
pub struct ReportParts {
    pub counts: ReportCounts,
    pub size_reduction_mb: f64,
    pub performance_improvements: Vec<Improvement>,
    pub maintenance_recommendations: Vec<MaintenanceRecommendation>,
    pub risk_assessments: Vec<RiskAssessment>,
    pub code_quality_improvements: Vec<Improvement>,
    pub future_optimization_opportunities: Vec<Improvement>,
    pub execution_summary: ExecutionSummary,
    pub impact_summary: ImpactSummary,
    pub file_results: Vec<FileModificationResult>,
}

/// Terminal output of an execute run; immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    counts: ReportCounts,
    size_reduction_mb: f64,
    performance_improvements: Vec<Improvement>,
    maintenance_recommendations: Vec<MaintenanceRecommendation>,
    risk_assessments: Vec<RiskAssessment>,
    code_quality_improvements: Vec<Improvement>,
    future_optimization_opportunities: Vec<Improvement>,
    execution_summary: ExecutionSummary,
    impact_summary: ImpactSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    file_results: Vec<FileModificationResult>,
}

impl CleanupReport {
    pub fn from_parts(parts: ReportParts) -> Self {
        let mut maintenance_recommendations = parts.maintenance_recommendations;
        maintenance_recommendations.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));
        let mut risk_assessments = parts.risk_assessments;
        risk_assessments.sort_by(|a, b| b.score.cmp(&a.score));

        Self {
            counts: parts.counts,
            size_reduction_mb: parts.size_reduction_mb.max(0.0),
            performance_improvements: parts.performance_improvements,
            maintenance_recommendations,
            risk_assessments,
            code_quality_improvements: parts.code_quality_improvements,
            future_optimization_opportunities: parts.future_optimization_opportunities,
            execution_summary: parts.execution_summary,
            impact_summary: parts.impact_summary,
            file_results: parts.file_results,
        }
    }

    pub fn counts(&self) -> &ReportCounts {
        &self.counts
    }

    pub fn size_reduction_mb(&self) -> f64 {
        self.size_reduction_mb
    }

    pub fn performance_improvements(&self) -> &[Improvement] {
        &self.performance_improvements
    }

    pub fn maintenance_recommendations(&self) -> &[MaintenanceRecommendation] {
        &self.maintenance_recommendations
    }

    pub fn risk_assessments(&self) -> &[RiskAssessment] {
        &self.risk_assessments
    }

    pub fn code_quality_improvements(&self) -> &[Improvement] {
        &self.code_quality_improvements
    }

    pub fn future_optimization_opportunities(&self) -> &[Improvement] {
        &self.future_optimization_opportunities
    }

    pub fn execution_summary(&self) -> &ExecutionSummary {
        &self.execution_summary
    }

    pub fn impact_summary(&self) -> &ImpactSummary {
        &self.impact_summary
    }

    pub fn file_results(&self) -> &[FileModificationResult] {
        &self.file_results
    }

    pub fn success_rate(&self) -> f64 {
        self.execution_summary.success_rate()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
