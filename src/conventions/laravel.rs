use std::path::Path;

use super::traits::{find_marker_file, Convention};
use crate::config::{ConventionsConfig, ImplicitMethodRule};

pub struct LaravelConvention;

impl Convention for LaravelConvention {
    fn name(&self) -> &'static str {
        "laravel"
    }

    fn is_enabled(&self, root: &Path, config: &ConventionsConfig) -> bool {
        config.laravel && find_marker_file(root, self.marker_files()).is_some()
    }

    fn marker_files(&self) -> &[&str] {
        &["artisan", "bootstrap/app.php", "routes/web.php", "composer.json"]
    }

    fn entry_patterns(&self) -> &[&str] {
        &[
            "artisan",
            "server.php",
            "public/index.php",
            "routes/**",
            "bootstrap/**",
            "config/**",
            "database/migrations/**",
            "database/seeders/**",
            "database/seeds/**",
            "database/factories/**",
            "app/Providers/**",
            "app/Console/**",
            "app/Http/Kernel.php",
            "app/Http/Middleware/**",
            "app/Exceptions/**",
            "app/Policies/**",
            "app/Events/**",
            "app/Listeners/**",
            "app/Observers/**",
            "app/Jobs/**",
            "app/Mail/**",
            "app/Notifications/**",
            "resources/views/errors/**",
            "resources/views/vendor/**",
            "resources/lang/**",
            "lang/**",
            "tests/**",
        ]
    }

    fn protected_patterns(&self) -> &[&str] {
        &[
            "artisan",
            "server.php",
            "public/index.php",
            "public/.htaccess",
            "bootstrap/app.php",
            "config/**",
            "phpunit.xml",
        ]
    }

    fn implicit_methods(&self) -> Vec<ImplicitMethodRule> {
        vec![
            ImplicitMethodRule::new("^scope[A-Z]"),
            ImplicitMethodRule::new("^(get|set)[A-Z]\\w*Attribute$"),
            ImplicitMethodRule::new(
                "^(boot|booted|register|handle|terminate|up|down|run|definition|rules|authorize|messages|attributes|casts|render|report|broadcastOn|via|toArray|toMail|toDatabase|toBroadcast|build|content|envelope|failed|middleware)$",
            ),
            ImplicitMethodRule::scoped(
                "^(index|create|store|show|edit|update|destroy|__invoke)$",
                "app/Http/Controllers/**",
            ),
            ImplicitMethodRule::scoped(
                "^(viewAny|view|create|update|delete|restore|forceDelete|before)$",
                "app/Policies/**",
            ),
            ImplicitMethodRule::scoped("^(mount|updated\\w*|updating\\w*|hydrate\\w*)$", "app/Http/Livewire/**"),
            ImplicitMethodRule::scoped("^(mount|updated\\w*|updating\\w*|hydrate\\w*)$", "app/Livewire/**"),
            ImplicitMethodRule::scoped("^(test\\w*|setUp|tearDown)$", "tests/**"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use tempfile::TempDir;

    #[test]
    fn test_enabled_by_marker_and_flag() {
        let temp = TempDir::new().unwrap();
        let config = ConventionsConfig::default();
        assert!(!LaravelConvention.is_enabled(temp.path(), &config));

        std::fs::write(temp.path().join("artisan"), "").unwrap();
        assert!(LaravelConvention.is_enabled(temp.path(), &config));

        let off = ConventionsConfig {
            laravel: false,
            ..ConventionsConfig::default()
        };
        assert!(!LaravelConvention.is_enabled(temp.path(), &off));
    }

    #[test]
    fn test_implicit_method_patterns_compile() {
        for rule in LaravelConvention.implicit_methods() {
            assert!(Regex::new(&rule.pattern).is_ok(), "{}", rule.pattern);
        }
    }
}
