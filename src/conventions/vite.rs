use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::traits::{find_marker_file, Convention};
use crate::config::ConventionsConfig;

static INPUT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"input\s*:\s*\[([^\]]*)\]|input\s*:\s*(['\x22][^'\x22]+['\x22])").unwrap());
static STRING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).unwrap());
static MIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:\bmix\s*|\))\s*\.\s*(?:js|sass|postCss|css|scripts|styles)\s*\(\s*['"]([^'"]+)['"]"#).unwrap()
});

pub struct ViteConvention;

impl Convention for ViteConvention {
    fn name(&self) -> &'static str {
        "vite"
    }

    fn is_enabled(&self, root: &Path, config: &ConventionsConfig) -> bool {
        config.vite && find_marker_file(root, self.marker_files()).is_some()
    }

    fn marker_files(&self) -> &[&str] {
        &[
            "vite.config.js",
            "vite.config.mjs",
            "vite.config.ts",
            "webpack.mix.js",
            "package.json",
        ]
    }

    fn entry_patterns(&self) -> &[&str] {
        &[
            "vite.config.*",
            "webpack.mix.js",
            "tailwind.config.*",
            "postcss.config.*",
            "resources/js/app.js",
            "resources/js/bootstrap.js",
            "resources/css/app.css",
            "resources/sass/app.scss",
        ]
    }

    fn protected_patterns(&self) -> &[&str] {
        &["package.json", "package-lock.json", "vite.config.*", "webpack.mix.js"]
    }

    /// Bundle inputs declared in `vite.config.*` or `webpack.mix.js`.
    fn resolve_entries(&self, root: &Path) -> Vec<String> {
        let mut entries = Vec::new();
        for file in ["vite.config.js", "vite.config.mjs", "vite.config.ts"] {
            let Ok(content) = std::fs::read_to_string(root.join(file)) else {
                continue;
            };
            for cap in INPUT_RE.captures_iter(&content) {
                let list = cap.get(1).or_else(|| cap.get(2)).map(|m| m.as_str()).unwrap_or("");
                entries.extend(STRING_RE.captures_iter(list).map(|c| c[1].to_string()));
            }
        }
        if let Ok(content) = std::fs::read_to_string(root.join("webpack.mix.js")) {
            entries.extend(MIX_RE.captures_iter(&content).map(|c| c[1].to_string()));
        }
        entries.sort();
        entries.dedup();
        entries
    }
}
