use crate::model::{CleanupReport, Improvement};

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn improvements(out: &mut String, title: &str, items: &[Improvement]) {
    out.push_str(&format!("<h2>{}</h2>", escape_html(title)));
    if items.is_empty() {
        out.push_str("<p class=\"muted\">None</p>");
        return;
    }
    out.push_str("<ul>");
    for item in items {
        out.push_str(&format!(
            "<li><strong>{}</strong>: {}</li>",
            escape_html(&item.title),
            escape_html(&item.detail)
        ));
    }
    out.push_str("</ul>");
}

/// Presentation of the same data `to_json` serialises; adds nothing.
pub fn render_html(report: &CleanupReport) -> String {
    let summary = report.execution_summary();
    let counts = report.counts();
    let impact = report.impact_summary();

    let mut out = String::new();
    out.push_str(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8" />
<title>sweeper cleanup report</title>
<style>
body{font-family:system-ui,-apple-system,Segoe UI,Helvetica,Arial,sans-serif;margin:24px;line-height:1.5;}
h1,h2{margin-bottom:0.2em;}
table{border-collapse:collapse;width:100%;margin:0.5em 0;}
th,td{border:1px solid #ddd;padding:6px 8px;font-size:14px;}
th{background:#f5f5f5;text-align:left;}
code{background:#f6f8fa;padding:2px 4px;border-radius:4px;}
.muted{color:#666;}
.alert{background:#fdecea;border:1px solid #f5c2c0;padding:8px 12px;}
</style>
</head><body>
<h1>sweeper cleanup report</h1>
"#,
    );

    let mode = if summary.dry_run { "dry run" } else { "applied" };
    out.push_str(&format!(
        "<p class=\"muted\">{} &middot; {} &middot; {} ms &middot; success rate {:.1}%</p>",
        mode,
        escape_html(&summary.finished_at.to_rfc3339()),
        summary.duration_ms,
        report.success_rate()
    ));

    if summary.rolled_back {
        let reason = summary.rollback_reason.as_deref().unwrap_or("rolled back");
        out.push_str(&format!(
            "<p class=\"alert\"><strong>Rolled back:</strong> {}</p>",
            escape_html(reason)
        ));
    }
    for warning in &summary.warnings {
        out.push_str(&format!("<p class=\"alert\">{}</p>", escape_html(warning)));
    }

    out.push_str("<h2>Counts</h2><table><tr><th>Metric</th><th>Value</th></tr>");
    let rows = [
        ("Files removed", counts.files_removed.to_string()),
        ("Lines removed", counts.lines_removed.to_string()),
        ("Imports removed", counts.imports_removed.to_string()),
        ("Methods removed", counts.methods_removed.to_string()),
        ("Variables removed", counts.variables_removed.to_string()),
        ("Duplicates refactored", counts.duplicates_refactored.to_string()),
        ("Components created", counts.components_created.to_string()),
        ("Size reduction", format!("{:.3} MB", report.size_reduction_mb())),
    ];
    for (label, value) in rows {
        out.push_str(&format!("<tr><td>{}</td><td>{}</td></tr>", label, value));
    }
    out.push_str("</table>");

    out.push_str(&format!(
        "<h2>Impact</h2><p>{} files analysed, {} modified, {} deleted, {} bytes removed, {} left for manual review, {} failed to parse.</p>",
        impact.files_analyzed,
        impact.files_modified,
        impact.files_deleted,
        impact.bytes_removed,
        impact.manual_review_items,
        impact.analysis_failures
    ));

    out.push_str("<h2>Risk assessments</h2>");
    if report.risk_assessments().is_empty() {
        out.push_str("<p class=\"muted\">None</p>");
    } else {
        out.push_str("<table><tr><th>Risk</th><th>Score</th><th>Description</th><th>Mitigation</th></tr>");
        for risk in report.risk_assessments() {
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&risk.title),
                risk.score,
                escape_html(&risk.description),
                escape_html(&risk.mitigation.join("; "))
            ));
        }
        out.push_str("</table>");
    }

    out.push_str("<h2>Maintenance recommendations</h2>");
    if report.maintenance_recommendations().is_empty() {
        out.push_str("<p class=\"muted\">None</p>");
    } else {
        out.push_str("<ul>");
        for rec in report.maintenance_recommendations() {
            out.push_str(&format!(
                "<li><strong>{}</strong> <span class=\"muted\">({:?}, {})</span>: {}",
                escape_html(&rec.title),
                rec.priority,
                escape_html(&rec.category),
                escape_html(&rec.description)
            ));
            if !rec.actions.is_empty() {
                out.push_str("<ul>");
                for action in &rec.actions {
                    out.push_str(&format!("<li><code>{}</code></li>", escape_html(action)));
                }
                out.push_str("</ul>");
            }
            out.push_str("</li>");
        }
        out.push_str("</ul>");
    }

    improvements(&mut out, "Performance improvements", report.performance_improvements());
    improvements(&mut out, "Code quality improvements", report.code_quality_improvements());
    improvements(
        &mut out,
        "Future optimisation opportunities",
        report.future_optimization_opportunities(),
    );

    if !summary.rejected.is_empty() {
        out.push_str("<h2>Rejected operations</h2><table><tr><th>Kind</th><th>File</th><th>Target</th><th>Reason</th></tr>");
        for rejection in &summary.rejected {
            out.push_str(&format!(
                "<tr><td>{}</td><td><code>{}</code></td><td><code>{}</code></td><td>{}</td></tr>",
                rejection.kind,
                escape_html(&rejection.file.display().to_string()),
                escape_html(&rejection.target),
                escape_html(rejection.reason.as_str())
            ));
        }
        out.push_str("</table>");
    }

    out.push_str("</body></html>\n");
    out
}
