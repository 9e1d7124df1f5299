pub mod backup;
pub mod cli;
pub mod config;
pub mod conventions;
pub mod detector;
pub mod error;
pub mod fixer;
pub mod graph;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod planner;
pub mod report;
pub mod resolver;
pub mod safety;
pub mod source;
pub mod watch;

pub use error::{CleanupError, Result};
pub use orchestrator::{CleanupOrchestrator, RunState};

use std::path::Path;

use model::{CleanupPlan, CleanupReport, CodebaseAnalysis};

pub fn analyze(path: &Path) -> Result<CodebaseAnalysis> {
    analyze_with_config(path, None)
}

pub fn analyze_with_config(path: &Path, config_path: Option<&Path>) -> Result<CodebaseAnalysis> {
    let resolved = config::load_config(path, config_path)?;
    CleanupOrchestrator::new(resolved).analyze_codebase()
}

pub fn plan(path: &Path, config_path: Option<&Path>) -> Result<CleanupPlan> {
    let resolved = config::load_config(path, config_path)?;
    let orchestrator = CleanupOrchestrator::new(resolved);
    let analysis = orchestrator.analyze_codebase()?;
    orchestrator.generate_cleanup_plan(&analysis)
}

pub fn execute(path: &Path, config_path: Option<&Path>) -> Result<CleanupReport> {
    let resolved = config::load_config(path, config_path)?;
    CleanupOrchestrator::new(resolved).execute_cleanup()
}
