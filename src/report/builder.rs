use crate::model::{
    CleanupPlan, CleanupReport, CodebaseAnalysis, ExecutionSummary, FileModificationResult, ImpactSummary,
    Improvement, Level, MaintenanceRecommendation, ModificationKind, Priority, ReportCounts, ReportParts,
    RiskAssessment,
};
use crate::planner::BYTES_PER_MB;

const LARGE_DELETION: usize = 25;

/// What an execute run hands to the report.
pub struct ReportInput<'a> {
    pub analysis: &'a CodebaseAnalysis,
    /// The plan as approved by the safety gate.
    pub plan: &'a CleanupPlan,
    pub summary: ExecutionSummary,
    pub file_results: Vec<FileModificationResult>,
}

/// Counts of what was actually applied. Restored files contribute nothing.
pub fn counts_from_results(results: &[FileModificationResult]) -> ReportCounts {
    let mut counts = ReportCounts::default();
    for result in results.iter().filter(|r| r.success() && !r.restored) {
        counts.files_removed += result.count(ModificationKind::DeleteFile);
        counts.imports_removed += result.count(ModificationKind::RemoveImport);
        counts.methods_removed += result.count(ModificationKind::RemoveMethod);
        counts.variables_removed += result.count(ModificationKind::RemoveVariable);
        counts.duplicates_refactored += result.count(ModificationKind::ReplaceFragment);
        counts.components_created += result.count(ModificationKind::CreateComponent);
        counts.lines_removed += result.lines_removed() as usize;
    }
    counts
}

/// Counts a dry run would have produced had every approved operation applied.
pub fn simulate_counts(plan: &CleanupPlan) -> ReportCounts {
    let components: Vec<_> = plan.components_to_create.iter().filter(|c| c.auto_applicable).collect();
    let fragment_lines: u32 = components
        .iter()
        .flat_map(|c| c.occurrences.iter())
        .map(|o| o.line_count().saturating_sub(1))
        .sum();
    let lines = plan.files_to_delete.iter().map(|d| d.line_count).sum::<u32>()
        + plan.imports_to_remove.len() as u32
        + plan.methods_to_remove.iter().map(|m| m.line_count()).sum::<u32>()
        + plan
            .variables_to_remove
            .iter()
            .map(|v| v.end_line.saturating_sub(v.line) + 1)
            .sum::<u32>()
        + fragment_lines;

    ReportCounts {
        files_removed: plan.files_to_delete.len(),
        lines_removed: lines as usize,
        imports_removed: plan.imports_to_remove.len(),
        methods_removed: plan.methods_to_remove.len(),
        variables_removed: plan.variables_to_remove.len(),
        duplicates_refactored: components.iter().map(|c| c.occurrences.len()).sum(),
        components_created: components.len(),
    }
}

fn impact(input: &ReportInput, counts: &ReportCounts, size_reduction_mb: f64) -> ImpactSummary {
    let usage = &input.analysis.usage;
    let (files_modified, bytes_removed) = if input.summary.dry_run {
        (
            input.plan.file_plans().len(),
            (size_reduction_mb * BYTES_PER_MB).round() as u64,
        )
    } else {
        let applied = input.file_results.iter().filter(|r| r.success() && !r.restored);
        let mut modified = 0;
        let mut bytes = 0;
        for result in applied {
            if result.count(ModificationKind::DeleteFile) == 0
                && result.count(ModificationKind::CreateComponent) == 0
                && !result.modifications.is_empty()
            {
                modified += 1;
            }
            bytes += result.bytes_removed();
        }
        (modified, bytes)
    };

    ImpactSummary {
        files_analyzed: input.analysis.total_files(),
        files_modified,
        files_deleted: counts.files_removed,
        lines_removed: counts.lines_removed,
        bytes_removed,
        size_reduction_mb,
        manual_review_items: input.plan.manual_review.len(),
        analysis_failures: input.analysis.failures.len(),
        unused_css_selectors: usage.unused_css_selectors.len(),
        unused_assets: usage.unused_assets.len(),
    }
}

fn risks(input: &ReportInput, counts: &ReportCounts) -> Vec<RiskAssessment> {
    let summary = &input.summary;
    let mut risks = Vec::new();

    let dynamic_files = input.analysis.files().filter(|f| f.has_dynamic_references()).count();
    if dynamic_files > 0 {
        risks.push(
            RiskAssessment::new(
                "Dynamic references",
                format!(
                    "{} file(s) resolve classes, views or methods at runtime; their removal candidates were held back",
                    dynamic_files
                ),
                Level::Medium,
                Level::Medium,
                Level::High,
            )
            .with_mitigation("Review the manual-review list before deleting anything by hand")
            .with_mitigation("Replace string-built class and view names with static references"),
        );
    }

    if !summary.dry_run && summary.backup_session.is_none() && summary.checkpoint.is_none() {
        risks.push(
            RiskAssessment::new(
                "No rollback available",
                "Backups were disabled and no git checkpoint was taken for this run",
                Level::High,
                Level::Medium,
                Level::Medium,
            )
            .with_mitigation("Re-run with createBackup enabled or commit the working tree first"),
        );
    }

    if !summary.dry_run && summary.tests.is_none() && counts.total() > 0 {
        risks.push(
            RiskAssessment::new(
                "Unverified changes",
                "The project test suite was not run after applying changes",
                Level::High,
                Level::Medium,
                Level::High,
            )
            .with_mitigation("Run the test suite before committing"),
        );
    }

    if let Some(tests) = summary.tests.as_ref().filter(|t| !t.passed) {
        let what = if tests.timed_out { "timed out" } else { "failed" };
        risks.push(
            RiskAssessment::new(
                "Test suite failure",
                format!("The test suite {} after cleanup; every change was rolled back", what),
                Level::Critical,
                Level::High,
                Level::Low,
            )
            .with_mitigation("Inspect the test output in the execution summary")
            .with_mitigation("Narrow the run with --only to find the offending operation"),
        );
    }

    if input.plan.files_to_delete.len() >= LARGE_DELETION {
        risks.push(
            RiskAssessment::new(
                "Large deletion set",
                format!("{} files are scheduled for deletion", input.plan.files_to_delete.len()),
                Level::Medium,
                Level::Low,
                Level::Medium,
            )
            .with_mitigation("Lower batchSize and review the deletion list"),
        );
    }

    if !input.analysis.failures.is_empty() {
        risks.push(
            RiskAssessment::new(
                "Incomplete analysis",
                format!(
                    "{} file(s) could not be parsed; identifiers found in them were treated as references",
                    input.analysis.failures.len()
                ),
                Level::Medium,
                Level::Low,
                Level::Medium,
            )
            .with_mitigation("Fix the syntax errors and analyse again"),
        );
    }

    if summary.operations_failed > 0 {
        risks.push(RiskAssessment::new(
            "Partial application",
            format!("{} operation(s) failed and were left unapplied", summary.operations_failed),
            Level::Low,
            Level::Medium,
            Level::Low,
        ));
    }
    risks
}

fn recommendations(input: &ReportInput) -> Vec<MaintenanceRecommendation> {
    let plan = input.plan;
    let usage = &input.analysis.usage;
    let mut recs = Vec::new();

    if !input.analysis.failures.is_empty() {
        let mut rec = MaintenanceRecommendation::new(
            "Fix unparsable files",
            format!("{} file(s) failed to parse", input.analysis.failures.len()),
            "correctness",
            Priority::High,
        );
        for failure in input.analysis.failures.iter().take(5) {
            rec = rec.with_action(format!("{}: {}", input.analysis.relative(&failure.path).display(), failure.error));
        }
        recs.push(rec);
    }

    if !plan.manual_review.is_empty() {
        let mut rec = MaintenanceRecommendation::new(
            "Review held-back candidates",
            format!("{} candidate(s) need a human decision", plan.manual_review.len()),
            "safety",
            Priority::High,
        );
        for item in plan.manual_review.iter().take(5) {
            rec = rec.with_action(format!("{} {}: {}", item.kind, item.target, item.reason));
        }
        recs.push(rec);
    }

    if !plan.duplicates_to_refactor.is_empty() {
        recs.push(
            MaintenanceRecommendation::new(
                "Consolidate duplicate methods",
                format!("{} pair(s) of methods share most of their logic", plan.duplicates_to_refactor.len()),
                "duplication",
                Priority::Medium,
            )
            .with_action("Move the shared body into a trait, base class or helper"),
        );
    }

    let manual_components = plan.components_to_create.iter().filter(|c| !c.auto_applicable).count();
    if manual_components > 0 {
        recs.push(
            MaintenanceRecommendation::new(
                "Extract similar markup",
                format!("{} fragment group(s) differ only in content", manual_components),
                "templates",
                Priority::Medium,
            )
            .with_action("Turn the varying parts into component props or slots"),
        );
    }

    if !usage.unused_css_selectors.is_empty() {
        recs.push(
            MaintenanceRecommendation::new(
                "Prune stylesheet selectors",
                format!("{} selector(s) are never referenced", usage.unused_css_selectors.len()),
                "styles",
                Priority::Low,
            )
            .with_action("Confirm the selectors are not built at runtime, then remove them"),
        );
    }

    let kept_assets = usage
        .unused_assets
        .iter()
        .filter(|a| !plan.is_deleted(a))
        .count();
    if kept_assets > 0 {
        recs.push(
            MaintenanceRecommendation::new(
                "Remove unreferenced assets",
                format!("{} asset(s) are not referenced by any analysed file", kept_assets),
                "assets",
                Priority::Low,
            )
            .with_action("Enable removeUnusedAssets once the list is confirmed"),
        );
    }

    if !input.summary.dry_run && input.summary.tests.is_none() {
        recs.push(MaintenanceRecommendation::new(
            "Run tests with cleanup",
            "Enable runTests so a failing suite rolls the run back automatically",
            "safety",
            Priority::Medium,
        ));
    }
    recs
}

fn performance(counts: &ReportCounts, size_reduction_mb: f64, input: &ReportInput) -> Vec<Improvement> {
    let mut items = Vec::new();
    if size_reduction_mb > 0.0 {
        items.push(
            Improvement::new("Smaller codebase", format!("{:.3} MB less source to ship and scan", size_reduction_mb))
                .with_metric(size_reduction_mb),
        );
    }
    if counts.files_removed > 0 {
        items.push(
            Improvement::new(
                "Fewer files to load",
                format!("{} file(s) removed from autoload and build inputs", counts.files_removed),
            )
            .with_metric(counts.files_removed as f64),
        );
    }
    if counts.imports_removed > 0 {
        items.push(
            Improvement::new(
                "Lighter imports",
                format!("{} unused import(s) no longer resolved", counts.imports_removed),
            )
            .with_metric(counts.imports_removed as f64),
        );
    }
    let selectors = input.analysis.usage.unused_css_selectors.len();
    if selectors > 0 {
        items.push(
            Improvement::new(
                "Stylesheet weight",
                format!("{} unused selector(s) could be dropped from the CSS bundle", selectors),
            )
            .with_metric(selectors as f64),
        );
    }
    items
}

fn quality(counts: &ReportCounts) -> Vec<Improvement> {
    let entries = [
        ("Dead methods removed", counts.methods_removed),
        ("Unused variables removed", counts.variables_removed),
        ("Duplicate markup replaced by components", counts.duplicates_refactored),
        ("Components created", counts.components_created),
        ("Lines removed", counts.lines_removed),
    ];
    entries
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(title, n)| Improvement::new(title, n.to_string()).with_metric(n as f64))
        .collect()
}

fn future(input: &ReportInput) -> Vec<Improvement> {
    let plan = input.plan;
    let mut items = Vec::new();
    let savings: u32 = plan
        .components_to_create
        .iter()
        .filter(|c| !c.auto_applicable)
        .map(|c| c.line_savings)
        .sum();
    if savings > 0 {
        items.push(
            Improvement::new("Parameterised components", format!("~{} lines could go with props or slots", savings))
                .with_metric(savings as f64),
        );
    }
    let duplicate_lines: u32 = plan
        .duplicates_to_refactor
        .iter()
        .map(|d| d.second.line_count())
        .sum();
    if duplicate_lines > 0 {
        items.push(
            Improvement::new("Shared method bodies", format!("~{} lines duplicated across methods", duplicate_lines))
                .with_metric(duplicate_lines as f64),
        );
    }
    if !plan.manual_review.is_empty() {
        items.push(
            Improvement::new(
                "Static references",
                "Candidates held back by dynamic references become removable once those references are static",
            )
            .with_metric(plan.manual_review.len() as f64),
        );
    }
    items
}

/// Assembles the report. A rolled-back run reports zero changes.
pub fn build_report(input: ReportInput) -> CleanupReport {
    let counts = if input.summary.rolled_back {
        ReportCounts::default()
    } else if input.summary.dry_run {
        simulate_counts(input.plan)
    } else {
        counts_from_results(&input.file_results)
    };

    let size_reduction_mb = if input.summary.rolled_back {
        0.0
    } else if input.summary.dry_run {
        input.plan.estimated_size_reduction
    } else {
        let bytes: u64 = input
            .file_results
            .iter()
            .filter(|r| r.success() && !r.restored)
            .map(|r| r.bytes_removed())
            .sum();
        bytes as f64 / BYTES_PER_MB
    };

    let parts = ReportParts {
        counts,
        size_reduction_mb,
        performance_improvements: performance(&counts, size_reduction_mb, &input),
        maintenance_recommendations: recommendations(&input),
        risk_assessments: risks(&input, &counts),
        code_quality_improvements: quality(&counts),
        future_optimization_opportunities: future(&input),
        impact_summary: impact(&input, &counts, size_reduction_mb),
        execution_summary: input.summary,
        file_results: input.file_results,
    };
    CleanupReport::from_parts(parts)
}
