use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};

use crate::config::CleanupConfig;

pub struct WatchConfig {
    pub debounce_ms: u64,
    pub extensions: Vec<String>,
    /// Directory names whose changes never trigger a re-run.
    pub ignored_dirs: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::from_cleanup(&CleanupConfig::default())
    }
}

impl WatchConfig {
    pub fn from_cleanup(config: &CleanupConfig) -> Self {
        let backup_root = config
            .backup_dir
            .split('/')
            .find(|s| !s.is_empty())
            .unwrap_or(".sweeper")
            .to_string();
        let mut ignored_dirs: Vec<String> = ["vendor", "node_modules", "storage", ".git"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        ignored_dirs.push(backup_root);
        Self {
            debounce_ms: 300,
            extensions: config.extensions(),
            ignored_dirs,
        }
    }
}

/// Calls `callback` once up front, then with the changed files after every
/// debounced burst of relevant changes. Returns when the watcher closes.
pub fn watch<F>(root: &Path, config: WatchConfig, mut callback: F) -> Result<()>
where
    F: FnMut(&[PathBuf]) -> Result<()>,
{
    let (tx, rx) = channel();

    let mut debouncer = new_debouncer(
        Duration::from_millis(config.debounce_ms),
        move |res: Result<Vec<notify_debouncer_mini::DebouncedEvent>, _>| {
            if let Ok(events) = res {
                let paths: Vec<PathBuf> = events
                    .into_iter()
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                    .map(|e| e.path)
                    .collect();

                if !paths.is_empty() {
                    let _ = tx.send(paths);
                }
            }
        },
    )?;

    debouncer.watcher().watch(root, RecursiveMode::Recursive)?;
    tracing::debug!(root = %root.display(), "watching for changes");

    callback(&[])?;

    while let Ok(paths) = rx.recv() {
        let relevant: Vec<PathBuf> = paths
            .into_iter()
            .filter(|p| is_relevant_file(root, p, &config))
            .collect();

        if !relevant.is_empty() {
            tracing::debug!(files = relevant.len(), "change detected");
            callback(&relevant)?;
        }
    }

    Ok(())
}

fn is_relevant_file(root: &Path, path: &Path, config: &WatchConfig) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let ignored = relative
        .components()
        .any(|c| config.ignored_dirs.iter().any(|d| c.as_os_str() == d.as_str()));
    if ignored {
        return false;
    }
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
        return false;
    };
    config.extensions.iter().any(|ext| {
        name.len() > ext.len() && name.ends_with(ext.as_str()) && name.as_bytes()[name.len() - ext.len() - 1] == b'.'
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_config_default() {
        let config = WatchConfig::default();
        assert_eq!(config.debounce_ms, 300);
        assert!(config.extensions.contains(&"blade.php".to_string()));
        assert!(config.ignored_dirs.contains(&".sweeper".to_string()));
    }

    #[test]
    fn test_is_relevant_file() {
        let root = Path::new("/p");
        let config = WatchConfig::default();

        assert!(is_relevant_file(root, Path::new("/p/app/User.php"), &config));
        assert!(is_relevant_file(root, Path::new("/p/resources/views/home.blade.php"), &config));
        assert!(is_relevant_file(root, Path::new("/p/resources/js/app.js"), &config));
        assert!(!is_relevant_file(root, Path::new("/p/README.md"), &config));
        assert!(!is_relevant_file(root, Path::new("/p/vendor/x/y.php"), &config));
        assert!(!is_relevant_file(root, Path::new("/p/.sweeper/backups/a/files/x.php"), &config));
        assert!(!is_relevant_file(root, Path::new("/p/Makefile"), &config));
    }
}
