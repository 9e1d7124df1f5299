mod laravel;
mod traits;
mod vite;

pub use laravel::LaravelConvention;
pub use traits::{find_marker_file, Convention};
pub use vite::ViteConvention;

use std::path::Path;
use std::sync::Arc;

use globset::{Glob, GlobMatcher, GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::config::{ConventionsConfig, ImplicitMethodRule, PolicyConfig};
use crate::error::{CleanupError, Result};

pub fn get_builtin_conventions() -> Vec<Arc<dyn Convention>> {
    vec![Arc::new(LaravelConvention), Arc::new(ViteConvention)]
}

pub fn detect_conventions(root: &Path, config: &ConventionsConfig) -> Vec<Arc<dyn Convention>> {
    get_builtin_conventions()
        .into_iter()
        .filter(|c| c.is_enabled(root, config))
        .collect()
}

struct ImplicitMethod {
    name: Regex,
    path: Option<GlobMatcher>,
}

fn relative_str(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Compiled policy table: enabled conventions merged with the project's
/// `policy` section. Paths are matched relative to the project root.
pub struct ConventionPolicy {
    names: Vec<&'static str>,
    entry_points: GlobSet,
    protected: GlobSet,
    implicit_methods: Vec<ImplicitMethod>,
}

impl std::fmt::Debug for ConventionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConventionPolicy")
            .field("conventions", &self.names)
            .field("implicit_methods", &self.implicit_methods.len())
            .finish()
    }
}

impl ConventionPolicy {
    /// `extra_entries` carries entry files discovered elsewhere, such as
    /// composer `autoload.files`.
    pub fn new(
        root: &Path,
        conventions: &ConventionsConfig,
        policy: &PolicyConfig,
        extra_entries: &[String],
    ) -> Result<Self> {
        let enabled = detect_conventions(root, conventions);

        let mut entries = GlobSetBuilder::new();
        let mut protected = GlobSetBuilder::new();
        let mut rules: Vec<ImplicitMethodRule> = Vec::new();

        for convention in &enabled {
            for pattern in convention.entry_patterns() {
                entries.add(Glob::new(pattern)?);
            }
            for entry in convention.resolve_entries(root) {
                entries.add(Glob::new(&entry)?);
            }
            for pattern in convention.protected_patterns() {
                protected.add(Glob::new(pattern)?);
            }
            rules.extend(convention.implicit_methods());
            tracing::debug!(convention = convention.name(), "convention enabled");
        }

        for pattern in policy.entry_points.iter().chain(extra_entries) {
            entries.add(Glob::new(pattern)?);
        }
        for pattern in &policy.protected_files {
            protected.add(Glob::new(pattern)?);
        }
        rules.extend(policy.implicit_methods.iter().cloned());

        let implicit_methods = rules
            .iter()
            .map(|rule| {
                let name = Regex::new(&rule.pattern).map_err(|e| {
                    CleanupError::Config(format!("implicit method pattern '{}': {}", rule.pattern, e))
                })?;
                let path = rule
                    .path
                    .as_deref()
                    .map(|p| Glob::new(p).map(|g| g.compile_matcher()))
                    .transpose()?;
                Ok(ImplicitMethod { name, path })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            names: enabled.iter().map(|c| c.name()).collect(),
            entry_points: entries.build()?,
            protected: protected.build()?,
            implicit_methods,
        })
    }

    pub fn conventions(&self) -> &[&'static str] {
        &self.names
    }

    pub fn is_entry_point(&self, relative: &Path) -> bool {
        self.entry_points.is_match(relative_str(relative))
    }

    pub fn is_protected(&self, relative: &Path) -> bool {
        self.protected.is_match(relative_str(relative))
    }

    /// Whether the framework calls `method` in `relative` by convention.
    pub fn is_implicit_method(&self, relative: &Path, method: &str) -> bool {
        let path = relative_str(relative);
        self.implicit_methods.iter().any(|rule| {
            rule.name.is_match(method)
                && rule.path.as_ref().map(|g| g.is_match(&path)).unwrap_or(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn laravel_root() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("artisan"), "").unwrap();
        temp
    }

    #[test]
    fn test_builtin_conventions() {
        let names: Vec<_> = get_builtin_conventions().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["laravel", "vite"]);
    }

    #[test]
    fn test_laravel_policy() {
        let temp = laravel_root();
        let policy = ConventionPolicy::new(
            temp.path(),
            &ConventionsConfig::default(),
            &PolicyConfig::default(),
            &[],
        )
        .unwrap();
        assert_eq!(policy.conventions(), &["laravel"]);
        assert!(policy.is_entry_point(Path::new("routes/web.php")));
        assert!(policy.is_entry_point(Path::new("database/migrations/2024_01_01_create_users.php")));
        assert!(!policy.is_entry_point(Path::new("app/Services/Cart.php")));
        assert!(policy.is_protected(Path::new("artisan")));
        assert!(policy.is_implicit_method(Path::new("app/Models/User.php"), "scopeActive"));
        assert!(policy.is_implicit_method(Path::new("app/Http/Controllers/A.php"), "store"));
        assert!(!policy.is_implicit_method(Path::new("app/Services/A.php"), "store"));
    }

    #[test]
    fn test_policy_overrides_merge() {
        let temp = TempDir::new().unwrap();
        let policy_config = PolicyConfig {
            entry_points: vec!["legacy/**".to_string()],
            protected_files: vec!["keep.php".to_string()],
            implicit_methods: vec![ImplicitMethodRule::scoped("^on[A-Z]", "app/Listeners/**")],
            dynamic_patterns: vec![],
        };
        let policy = ConventionPolicy::new(
            temp.path(),
            &ConventionsConfig::default(),
            &policy_config,
            &["app/helpers.php".to_string()],
        )
        .unwrap();
        assert!(policy.conventions().is_empty());
        assert!(policy.is_entry_point(Path::new("legacy/a.php")));
        assert!(policy.is_entry_point(Path::new("app/helpers.php")));
        assert!(policy.is_protected(Path::new("keep.php")));
        assert!(policy.is_implicit_method(Path::new("app/Listeners/X.php"), "onLogin"));
        assert!(!policy.is_implicit_method(Path::new("app/X.php"), "onLogin"));
    }
}
