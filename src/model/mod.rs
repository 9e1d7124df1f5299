mod analysis;
mod duplicates;
mod graph;
mod modification;
mod plan;
mod report;

pub use analysis::{
    symbol_key, AnalysisFailure, AssetFileAnalysis, AssetKind, BaseFileAnalysis, ClassInfo,
    ClassKind, CodebaseAnalysis, CssFileAnalysis, CssSelector, DynamicReference, FileAnalysis,
    ImportKind, ImportRef, JsFileAnalysis, Language, MarkupFragment, MethodInfo, PhpFileAnalysis,
    PhpRole, ReferenceKind, RouteAnalysis, RouteDefinition, SkippedFile, SymbolReference,
    TemplateAnalysis, UsageKind, UsageLocation, UsageReport, VariableInfo, Visibility,
};
pub use duplicates::{
    CodeLocation, ComponentExtractionSuggestion, DuplicateClassification, DuplicateMethodMatch,
    Effort, RefactoringSuggestion,
};
pub use graph::{DependencyGraph, EdgeType, GraphEdge, GraphNode, NodeKind};
pub use modification::{
    AppliedModification, FileModificationPlan, FileModificationResult, FragmentReplacement,
    MethodTarget, ModificationKind, VariableTarget,
};
pub use plan::{
    CleanupPlan, FileDeletion, ImportRemoval, ManualReviewItem, MethodRemoval, OperationKind,
    RejectionReason, SafetyRejection, VariableRemoval,
};
pub use report::{
    CleanupReport, ExecutionSummary, ImpactSummary, Improvement, Level, MaintenanceRecommendation,
    PhaseTiming, Priority, ReportCounts, ReportParts, RiskAssessment, TestOutcome,
};
