mod builder;
mod html;

use std::fs;
use std::path::{Path, PathBuf};

pub use builder::{build_report, counts_from_results, simulate_counts, ReportInput};
pub use html::render_html;

use crate::error::{CleanupError, Result};
use crate::model::CleanupReport;
use crate::source::write_atomic;

pub const LAST_REPORT: &str = ".sweeper/last-report.json";

pub fn last_report_path(root: &Path) -> PathBuf {
    root.join(LAST_REPORT)
}

pub fn save_report(root: &Path, report: &CleanupReport) -> Result<PathBuf> {
    let path = last_report_path(root);
    write_atomic(&path, report.to_json()?.as_bytes())?;
    tracing::debug!(path = %path.display(), "report saved");
    Ok(path)
}

pub fn load_report(path: &Path) -> Result<CleanupReport> {
    let content = fs::read_to_string(path).map_err(|e| CleanupError::io(path, e))?;
    Ok(serde_json::from_str(&content)?)
}
