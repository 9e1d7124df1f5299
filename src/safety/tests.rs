use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::CleanupConfig;
use crate::error::{CleanupError, Result};
use crate::model::TestOutcome;

const OUTPUT_TAIL_CHARS: usize = 4000;
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait for output once the process is gone. Grandchildren may
/// keep the pipes open after a kill.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs the project's own test suite.
pub trait TestRunner: Send + Sync {
    fn run_project_tests(&self) -> Result<TestOutcome>;
}

/// Shell command run from the project root, killed after `timeout`.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    root: PathBuf,
    command: String,
    timeout: Duration,
}

impl CommandTestRunner {
    pub fn new(root: impl Into<PathBuf>, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            command: command.into(),
            timeout,
        }
    }

    pub fn from_config(root: &Path, config: &CleanupConfig) -> Self {
        Self::new(root, &config.test_command, Duration::from_secs(config.test_timeout_secs))
    }

    fn spawn(&self) -> std::io::Result<Child> {
        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C");
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c");
            c
        };
        command
            .arg(&self.command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
    }
}

fn drain(stream: Option<impl Read + Send + 'static>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut bytes);
        }
        let _ = tx.send(String::from_utf8_lossy(&bytes).into_owned());
    });
    rx
}

fn tail(output: &str) -> String {
    let count = output.chars().count();
    if count <= OUTPUT_TAIL_CHARS {
        return output.to_string();
    }
    output.chars().skip(count - OUTPUT_TAIL_CHARS).collect()
}

impl TestRunner for CommandTestRunner {
    fn run_project_tests(&self) -> Result<TestOutcome> {
        let started = Instant::now();
        tracing::info!(command = %self.command, timeout_secs = self.timeout.as_secs(), "running project tests");

        let mut child = self
            .spawn()
            .map_err(|e| CleanupError::TestRunner(format!("failed to start '{}': {}", self.command, e)))?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let mut timed_out = false;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) if started.elapsed() >= self.timeout => {
                    timed_out = true;
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(CleanupError::TestRunner(e.to_string())),
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let mut output = stdout.recv_timeout(DRAIN_GRACE).unwrap_or_default();
        output.push_str(&stderr.recv_timeout(DRAIN_GRACE).unwrap_or_default());
        if timed_out {
            output.push_str(&format!("\n[timed out after {}s]", self.timeout.as_secs()));
        }

        let outcome = TestOutcome {
            passed: status.map(|s| s.success()).unwrap_or(false),
            timed_out,
            duration_ms,
            output: tail(&output),
        };
        if outcome.passed {
            tracing::info!(duration_ms = outcome.duration_ms, "project tests passed");
        } else {
            tracing::warn!(timed_out, duration_ms = outcome.duration_ms, "project tests failed");
        }
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run(command: &str, timeout: Duration) -> TestOutcome {
        let temp = TempDir::new().unwrap();
        CommandTestRunner::new(temp.path(), command, timeout)
            .run_project_tests()
            .unwrap()
    }

    #[test]
    fn test_passing_command() {
        let outcome = run("echo ok", Duration::from_secs(10));
        assert!(outcome.passed);
        assert!(!outcome.timed_out);
        assert!(outcome.output.contains("ok"));
    }

    #[test]
    fn test_failing_command_captures_stderr() {
        let outcome = run("echo broken >&2; exit 3", Duration::from_secs(10));
        assert!(!outcome.passed);
        assert!(outcome.output.contains("broken"));
    }

    #[test]
    fn test_timeout_counts_as_failure() {
        let outcome = run("exec sleep 5", Duration::from_millis(200));
        assert!(!outcome.passed);
        assert!(outcome.timed_out);
        assert!(outcome.duration_ms < 5000);
    }

    #[test]
    fn test_tail_keeps_end() {
        let long = format!("{}END", "x".repeat(OUTPUT_TAIL_CHARS));
        let kept = tail(&long);
        assert_eq!(kept.chars().count(), OUTPUT_TAIL_CHARS);
        assert!(kept.ends_with("END"));
    }
}
