use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::{CleanupError, Result};

/// Project-wide snapshot a whole run can be rolled back to.
pub trait VersionControl: Send + Sync {
    fn is_available(&self) -> bool;

    /// Records the current tree and returns its identifier.
    fn commit(&self, description: &str) -> Result<String>;

    fn revert_to(&self, checkpoint: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct GitCheckpoint {
    root: PathBuf,
    excluded: Vec<String>,
}

impl GitCheckpoint {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: Vec::new(),
        }
    }

    /// Leaves `relative` out of checkpoint commits.
    pub fn excluding(mut self, relative: impl AsRef<str>) -> Self {
        let relative = relative.as_ref().trim_matches('/');
        if !relative.is_empty() && !self.excluded.iter().any(|e| e == relative) {
            self.excluded.push(relative.to_string());
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| CleanupError::Vcs(format!("git {}: {}", args.join(" "), e)))
    }

    fn git_ok(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args)?;
        if !output.status.success() {
            return Err(CleanupError::Vcs(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl VersionControl for GitCheckpoint {
    fn is_available(&self) -> bool {
        self.git(&["rev-parse", "--is-inside-work-tree"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn commit(&self, description: &str) -> Result<String> {
        let excludes: Vec<String> = self.excluded.iter().map(|e| format!(":(exclude){}", e)).collect();
        let mut add = vec!["add", "-A", "--", "."];
        add.extend(excludes.iter().map(String::as_str));
        self.git_ok(&add)?;
        self.git_ok(&["commit", "--allow-empty", "--no-verify", "-q", "-m", description])?;
        let hash = self.git_ok(&["rev-parse", "HEAD"])?;
        tracing::info!(checkpoint = %hash, "git checkpoint created");
        Ok(hash)
    }

    fn revert_to(&self, checkpoint: &str) -> Result<bool> {
        let output = self.git(&["reset", "--hard", "-q", checkpoint])?;
        if output.status.success() {
            tracing::info!(checkpoint, "reverted to git checkpoint");
        } else {
            tracing::warn!(
                checkpoint,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git revert failed"
            );
        }
        Ok(output.status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_repo(path: &Path) -> bool {
        let run = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(path)
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        };
        run(&["init", "-q"])
            && run(&["config", "user.email", "sweeper@example.com"])
            && run(&["config", "user.name", "sweeper"])
    }

    #[test]
    fn test_outside_repository_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let git = GitCheckpoint::new(temp.path().join("missing"));
        assert!(!git.is_available());
    }

    #[test]
    fn test_commit_and_revert() {
        let temp = TempDir::new().unwrap();
        if !init_repo(temp.path()) {
            return;
        }
        let file = temp.path().join("a.php");
        std::fs::write(&file, "<?php\n// before\n").unwrap();

        let git = GitCheckpoint::new(temp.path());
        assert!(git.is_available());
        let checkpoint = git.commit("sweeper checkpoint").unwrap();
        assert_eq!(checkpoint.len(), 40);

        std::fs::write(&file, "<?php\n// after\n").unwrap();
        assert!(git.revert_to(&checkpoint).unwrap());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "<?php\n// before\n");
    }

    #[test]
    fn test_excluded_paths_stay_out_of_commit() {
        let temp = TempDir::new().unwrap();
        if !init_repo(temp.path()) {
            return;
        }
        std::fs::write(temp.path().join("a.php"), "<?php\n").unwrap();
        let backups = temp.path().join(".sweeper/backups/s1");
        std::fs::create_dir_all(&backups).unwrap();
        std::fs::write(backups.join("a.php"), "<?php\n").unwrap();

        let git = GitCheckpoint::new(temp.path())
            .excluding(".sweeper")
            .excluding(".sweeper/backups/");
        assert_eq!(git.excluded, vec![".sweeper".to_string(), ".sweeper/backups".to_string()]);
        git.commit("sweeper checkpoint").unwrap();

        let tracked = git.git_ok(&["ls-files"]).unwrap();
        assert_eq!(tracked, "a.php");
    }
}
