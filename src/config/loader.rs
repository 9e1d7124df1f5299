use globset::Glob;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use super::schema::{CleanupConfig, ComposerJson, ResolvedConfig};
use crate::error::{CleanupError, Result};

const CONFIG_FILES: &[&str] = &[
    "sweeper.json",
    "sweeper.jsonc",
    ".sweeperrc",
    ".sweeperrc.json",
];

pub fn load_config(root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let root = root.canonicalize().map_err(|e| CleanupError::io(root, e))?;

    let config = if let Some(path) = config_path {
        load_config_file(path)?
    } else {
        find_and_load_config(&root)?
    };

    validate_config(&config)?;

    let composer = load_composer_json(&root)?;

    Ok(ResolvedConfig {
        root,
        config,
        composer,
    })
}

pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.exists())
}

fn find_and_load_config(root: &Path) -> Result<CleanupConfig> {
    match find_config_file(root) {
        Some(path) => load_config_file(&path),
        None => Ok(CleanupConfig::default()),
    }
}

pub fn load_config_file(path: &Path) -> Result<CleanupConfig> {
    let content = fs::read_to_string(path).map_err(|e| CleanupError::io(path, e))?;
    parse_config(&content)
        .map_err(|e| CleanupError::Config(format!("{}: {}", path.display(), e)))
}

pub fn parse_config(content: &str) -> std::result::Result<CleanupConfig, serde_json::Error> {
    serde_json::from_str(&strip_json_comments(content))
}

/// Rejects configurations that cannot drive a safe run.
pub fn validate_config(config: &CleanupConfig) -> Result<()> {
    if config.batch_size == 0 {
        return Err(CleanupError::Config("batchSize must be at least 1".into()));
    }

    let sim = &config.similarity;
    for (name, value) in [
        ("exactThreshold", sim.exact_threshold),
        ("nearThreshold", sim.near_threshold),
        ("minimumScore", sim.minimum_score),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(CleanupError::Config(format!(
                "similarity.{} must be within [0, 1], got {}",
                name, value
            )));
        }
    }
    if sim.near_threshold > sim.exact_threshold {
        return Err(CleanupError::Config(
            "similarity.nearThreshold cannot exceed exactThreshold".into(),
        ));
    }
    if sim.minimum_score > sim.near_threshold {
        return Err(CleanupError::Config(
            "similarity.minimumScore cannot exceed nearThreshold".into(),
        ));
    }
    if sim.max_line_ratio < 1.0 {
        return Err(CleanupError::Config(
            "similarity.maxLineRatio must be >= 1.0".into(),
        ));
    }

    for pattern in config
        .include_paths
        .iter()
        .chain(&config.exclude_paths)
        .chain(&config.policy.entry_points)
        .chain(&config.policy.protected_files)
    {
        Glob::new(pattern)?;
    }

    for rule in &config.policy.implicit_methods {
        Regex::new(&rule.pattern).map_err(|e| {
            CleanupError::Config(format!("implicit method pattern '{}': {}", rule.pattern, e))
        })?;
        if let Some(path) = &rule.path {
            Glob::new(path)?;
        }
    }

    for pattern in &config.policy.dynamic_patterns {
        Regex::new(pattern).map_err(|e| {
            CleanupError::Config(format!("dynamic pattern '{}': {}", pattern, e))
        })?;
    }

    if config.include_file_types.is_empty() {
        return Err(CleanupError::Config(
            "includeFileTypes must list at least one extension".into(),
        ));
    }

    Ok(())
}

fn load_composer_json(root: &Path) -> Result<Option<ComposerJson>> {
    let path = root.join("composer.json");
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|e| CleanupError::io(&path, e))?;

    match serde_json::from_str::<ComposerJson>(&content) {
        Ok(composer) => Ok(Some(composer)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable composer.json");
            Ok(None)
        }
    }
}

fn strip_json_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        if c == '\\' && in_string {
            result.push(c);
            escape_next = true;
            continue;
        }

        if c == '"' {
            in_string = !in_string;
            result.push(c);
            continue;
        }

        if in_string {
            result.push(c);
            continue;
        }

        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    while let Some(&ch) = chars.peek() {
                        if ch == '\n' {
                            break;
                        }
                        chars.next();
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    while let Some(ch) = chars.next() {
                        if ch == '*' && chars.peek() == Some(&'/') {
                            chars.next();
                            break;
                        }
                    }
                    continue;
                }
                _ => {}
            }
        }

        result.push(c);
    }

    result
}

pub fn generate_default_config() -> CleanupConfig {
    CleanupConfig {
        schema: Some("https://sweeper.dev/schema.json".to_string()),
        include_paths: vec![
            "app/**".to_string(),
            "routes/**".to_string(),
            "resources/**".to_string(),
            "public/**".to_string(),
        ],
        ..CleanupConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_safest_mode() {
        let config = parse_config("{}").unwrap();
        assert!(config.dry_run);
        assert!(config.create_backup);
        assert!(config.run_tests);
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn test_comments_are_stripped() {
        let input = r#"{
            // keep it safe
            "dryRun": false, /* really */
            "testCommand": "vendor/bin/phpunit // not a comment"
        }"#;
        let config = parse_config(input).unwrap();
        assert!(!config.dry_run);
        assert_eq!(config.test_command, "vendor/bin/phpunit // not a comment");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = parse_config(r#"{"dryRunn": false}"#).unwrap_err();
        assert!(err.to_string().contains("dryRunn"));
    }

    #[test]
    fn test_nested_unknown_keys_rejected() {
        assert!(parse_config(r#"{"similarity": {"exact": 0.9}}"#).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = CleanupConfig {
            batch_size: 0,
            ..CleanupConfig::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(CleanupError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = CleanupConfig::default();
        config.similarity.near_threshold = 0.99;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let mut config = CleanupConfig::default();
        config.policy.protected_files.push("app/[".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_reads_composer_psr4() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("composer.json"),
            r#"{"autoload": {"psr-4": {"App\\": "app/"}}, "autoload-dev": {"psr-4": {"Tests\\": ["tests/"]}}}"#,
        )
        .unwrap();

        let resolved = load_config(temp.path(), None).unwrap();
        let roots = resolved.composer.unwrap().psr4_roots();
        assert_eq!(
            roots,
            vec![
                ("App\\".to_string(), "app".to_string()),
                ("Tests\\".to_string(), "tests".to_string())
            ]
        );
    }

    #[test]
    fn test_load_config_from_project_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("sweeper.json"), r#"{"batchSize": 7}"#).unwrap();
        let resolved = load_config(temp.path(), None).unwrap();
        assert_eq!(resolved.config.batch_size, 7);
    }

    #[test]
    fn test_default_config_round_trips() {
        let config = generate_default_config();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed = parse_config(&json).unwrap();
        assert_eq!(parsed.include_paths, config.include_paths);
    }
}
