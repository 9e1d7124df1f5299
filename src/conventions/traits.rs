use std::path::{Path, PathBuf};

use crate::config::{ConventionsConfig, ImplicitMethodRule};

/// A framework's implicit invocation paths: files it loads by location and
/// methods it calls by name.
pub trait Convention: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_enabled(&self, root: &Path, config: &ConventionsConfig) -> bool;

    /// Files whose presence signals the framework.
    fn marker_files(&self) -> &[&str];

    /// Globs (relative to the root) never treated as orphaned.
    fn entry_patterns(&self) -> &[&str];

    /// Globs never deleted, whatever the analysis says.
    fn protected_patterns(&self) -> &[&str] {
        &[]
    }

    fn implicit_methods(&self) -> Vec<ImplicitMethodRule> {
        Vec::new()
    }

    /// Entries read from the project's own configuration files.
    fn resolve_entries(&self, _root: &Path) -> Vec<String> {
        Vec::new()
    }
}

pub fn find_marker_file(root: &Path, patterns: &[&str]) -> Option<PathBuf> {
    patterns
        .iter()
        .map(|pattern| root.join(pattern))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_marker_file() {
        let temp = TempDir::new().unwrap();
        assert!(find_marker_file(temp.path(), &["artisan"]).is_none());
        std::fs::write(temp.path().join("artisan"), "#!/usr/bin/env php").unwrap();
        assert_eq!(
            find_marker_file(temp.path(), &["composer.json", "artisan"]),
            Some(temp.path().join("artisan"))
        );
    }
}
