use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use walkdir::WalkDir;

use sweeper::config::load_config;
use sweeper::model::{OperationKind, RejectionReason, TestOutcome};
use sweeper::safety::TestRunner;
use sweeper::{CleanupError, CleanupOrchestrator};

const SERVICE: &str = "<?php\nnamespace App\\Services;\n\nuse App\\Models\\Unused;\nuse App\\Models\\Used;\n\nclass Billing\n{\n    public function charge(): Used\n    {\n        return new Used();\n    }\n\n    private function forgotten()\n    {\n        return 1;\n    }\n}\n";
const CONTROLLER: &str = "<?php\nnamespace App\\Http\\Controllers;\n\nuse App\\Services\\Billing;\n\nclass PayController\n{\n    public function __invoke(Billing $billing)\n    {\n        return $billing->charge();\n    }\n}\n";
const ORPHAN: &str = "<?php\nnamespace App\\Support;\n\nclass Orphan\n{\n}\n";
const ROUTES: &str = "<?php\n\nuse App\\Http\\Controllers\\PayController;\n\nRoute::post('/pay', PayController::class);\n";
const NOTICE: &str = "    <div class=\"notice box\">\n        <h3>Heads up</h3>\n        <p>Free shipping</p>\n        <a href=\"/shipping\">More</a>\n    </div>\n";

fn laravel_project(config: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    for (relative, content) in [
        ("app/Services/Billing.php", SERVICE),
        ("app/Http/Controllers/PayController.php", CONTROLLER),
        ("app/Support/Orphan.php", ORPHAN),
        ("routes/web.php", ROUTES),
    ] {
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

fn read(temp: &TempDir, relative: &str) -> String {
    fs::read_to_string(temp.path().join(relative)).unwrap()
}

fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| (e.path().to_path_buf(), fs::read(e.path()).unwrap()))
        .collect()
}

fn git(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).current_dir(root).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

fn init_repo(root: &Path) -> bool {
    git(root, &["init", "-q"]).is_some()
        && git(root, &["config", "user.email", "sweeper@example.com"]).is_some()
        && git(root, &["config", "user.name", "sweeper"]).is_some()
}

struct ScriptedRunner {
    passed: bool,
    calls: AtomicUsize,
}

impl ScriptedRunner {
    fn new(passed: bool) -> Arc<Self> {
        Arc::new(Self {
            passed,
            calls: AtomicUsize::new(0),
        })
    }
}

impl TestRunner for ScriptedRunner {
    fn run_project_tests(&self) -> sweeper::Result<TestOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TestOutcome {
            passed: self.passed,
            timed_out: false,
            duration_ms: 1,
            output: if self.passed { "OK".into() } else { "1 failed".into() },
        })
    }
}

#[test]
fn test_apply_removes_unused_code() {
    let temp = laravel_project(r#"{"dryRun": false, "runTests": false}"#);
    let report = orchestrator(&temp).execute_cleanup().unwrap();

    let billing = read(&temp, "app/Services/Billing.php");
    assert!(!billing.contains("App\\Models\\Unused"));
    assert!(billing.contains("use App\\Models\\Used;"));
    assert!(!billing.contains("forgotten"));
    assert!(billing.contains("public function charge()"));
    assert!(!temp.path().join("app/Support/Orphan.php").exists());
    assert_eq!(read(&temp, "routes/web.php"), ROUTES);

    let counts = report.counts();
    assert_eq!(counts.files_removed, 1);
    assert_eq!(counts.imports_removed, 1);
    assert_eq!(counts.methods_removed, 1);
    assert!(counts.lines_removed > 0);

    let summary = report.execution_summary();
    assert!(!summary.dry_run);
    assert!(!summary.rolled_back);
    assert!(summary.tests.is_none());
    assert!(summary.backup_session.as_ref().unwrap().is_dir());
    assert!(temp.path().join(".sweeper/last-report.json").is_file());
}

#[test]
fn test_dry_run_leaves_tree_byte_identical() {
    let temp = laravel_project("{}");
    let before = snapshot(temp.path());

    let report = orchestrator(&temp).execute_cleanup().unwrap();

    assert_eq!(snapshot(temp.path()), before);
    assert!(report.execution_summary().dry_run);
    assert_eq!(report.execution_summary().operations_attempted, 0);
    assert_eq!(report.counts().imports_removed, 1);
    assert_eq!(report.counts().files_removed, 1);
    assert!(report.file_results().is_empty());
}

#[test]
fn test_failing_tests_roll_everything_back() {
    let temp = laravel_project(r#"{"dryRun": false}"#);
    let runner = ScriptedRunner::new(false);
    let report = orchestrator(&temp)
        .with_test_runner(runner.clone())
        .execute_cleanup()
        .unwrap();

    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(read(&temp, "app/Services/Billing.php"), SERVICE);
    assert_eq!(read(&temp, "app/Support/Orphan.php"), ORPHAN);

    let summary = report.execution_summary();
    assert!(summary.rolled_back);
    assert_eq!(summary.rollback_reason.as_deref(), Some("test suite failed"));
    assert!(!summary.tests.as_ref().unwrap().passed);
    assert_eq!(report.counts().total(), 0);
    assert_eq!(report.size_reduction_mb(), 0.0);
    assert!(report.file_results().iter().all(|r| r.restored));
}

#[test]
fn test_passing_tests_keep_changes() {
    let temp = laravel_project(r#"{"dryRun": false}"#);
    let runner = ScriptedRunner::new(true);
    let report = orchestrator(&temp)
        .with_test_runner(runner.clone())
        .execute_cleanup()
        .unwrap();

    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    assert!(!report.execution_summary().rolled_back);
    assert!(report.execution_summary().tests.as_ref().unwrap().passed);
    assert!(!temp.path().join("app/Support/Orphan.php").exists());
}

#[test]
fn test_second_run_finds_nothing_new() {
    let temp = laravel_project(r#"{"dryRun": false, "runTests": false}"#);
    orchestrator(&temp).execute_cleanup().unwrap();

    let plan = sweeper::plan(temp.path(), None).unwrap();
    assert!(plan.files_to_delete.is_empty());
    assert!(plan.imports_to_remove.is_empty());
    assert!(plan.methods_to_remove.is_empty());
    assert!(plan.variables_to_remove.is_empty());
}

#[test]
fn test_dynamic_call_sends_edits_to_manual_review() {
    let temp = laravel_project(r#"{"dryRun": false, "runTests": false}"#);
    let dynamic = SERVICE.replace(
        "return 1;",
        "return 1;\n    }\n\n    public function dispatch($name)\n    {\n        return $this->$name();",
    );
    fs::write(temp.path().join("app/Services/Billing.php"), &dynamic).unwrap();

    let report = orchestrator(&temp).execute_cleanup().unwrap();

    assert_eq!(read(&temp, "app/Services/Billing.php"), dynamic);
    assert_eq!(report.counts().methods_removed, 0);
    assert_eq!(report.counts().imports_removed, 0);
    assert!(report.impact_summary().manual_review_items > 0);
}

#[test]
fn test_protected_files_are_rejected() {
    let temp = laravel_project(
        r#"{"dryRun": false, "runTests": false, "policy": {"protectedFiles": ["app/Support/**"]}}"#,
    );
    let report = orchestrator(&temp).execute_cleanup().unwrap();

    assert_eq!(read(&temp, "app/Support/Orphan.php"), ORPHAN);
    let rejected = &report.execution_summary().rejected;
    assert!(rejected.iter().any(|r| r.kind == OperationKind::Files
        && r.reason == RejectionReason::ProtectedFile
        && r.file.ends_with("app/Support/Orphan.php")));
    assert_eq!(report.counts().files_removed, 0);
    assert_eq!(report.counts().imports_removed, 1);
}

#[test]
fn test_only_restricts_operations() {
    let temp = laravel_project(r#"{"dryRun": false, "runTests": false}"#);
    let mut resolved = load_config(temp.path(), None).unwrap();
    resolved.config.restrict_to(&[OperationKind::Imports]);
    let report = CleanupOrchestrator::new(resolved).execute_cleanup().unwrap();

    assert_eq!(report.counts().imports_removed, 1);
    assert_eq!(report.counts().methods_removed, 0);
    assert!(temp.path().join("app/Support/Orphan.php").exists());
    assert!(read(&temp, "app/Services/Billing.php").contains("forgotten"));
}

#[test]
fn test_saved_report_renders() {
    let temp = laravel_project(r#"{"dryRun": false, "runTests": false}"#);
    orchestrator(&temp).execute_cleanup().unwrap();

    let path = sweeper::report::last_report_path(temp.path());
    let report = sweeper::report::load_report(&path).unwrap();
    assert_eq!(report.counts().imports_removed, 1);
    let html = sweeper::report::render_html(&report);
    assert!(html.contains("<html"));
}

#[test]
fn test_git_rollback_removes_created_components() {
    let temp = laravel_project(
        r#"{"dryRun": false, "createBackup": false, "gitCheckpoint": true, "removeUnusedFiles": false, "similarity": {"minFragmentElements": 3}}"#,
    );
    if !init_repo(temp.path()) {
        return;
    }
    let main = format!("<main>\n{}</main>\n", NOTICE);
    let section = format!("<section>\n<h1>B</h1>\n{}</section>\n", NOTICE);
    let views = temp.path().join("resources/views");
    fs::create_dir_all(&views).unwrap();
    fs::write(views.join("a.blade.php"), &main).unwrap();
    fs::write(views.join("b.blade.php"), &section).unwrap();
    fs::create_dir_all(temp.path().join(".sweeper")).unwrap();
    fs::write(temp.path().join(".sweeper/notes.txt"), "local").unwrap();

    let runner = ScriptedRunner::new(false);
    let report = orchestrator(&temp)
        .with_test_runner(runner.clone())
        .execute_cleanup()
        .unwrap();

    let summary = report.execution_summary();
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    assert!(summary.checkpoint.is_some());
    assert!(summary.backup_session.is_none());
    assert!(summary.rolled_back);
    assert!(!views.join("components/notice.blade.php").exists());
    assert_eq!(read(&temp, "resources/views/a.blade.php"), main);
    assert_eq!(read(&temp, "resources/views/b.blade.php"), section);
    assert_eq!(read(&temp, "app/Services/Billing.php"), SERVICE);

    let tracked = git(temp.path(), &["ls-files"]).unwrap();
    assert!(tracked.lines().any(|l| l == "app/Services/Billing.php"));
    assert!(!tracked.contains(".sweeper"));
}

#[test]
fn test_cancelled_run_does_not_block_the_next() {
    let temp = laravel_project(r#"{"dryRun": false, "runTests": false}"#);
    let orchestrator = orchestrator(&temp);

    orchestrator.cancellation_token().cancel();
    assert!(matches!(orchestrator.execute_cleanup(), Err(CleanupError::Cancelled)));
    assert_eq!(read(&temp, "app/Services/Billing.php"), SERVICE);

    let report = orchestrator.execute_cleanup().unwrap();
    assert!(!report.execution_summary().cancelled);
    assert_eq!(report.counts().imports_removed, 1);
    assert!(!temp.path().join("app/Support/Orphan.php").exists());
}
