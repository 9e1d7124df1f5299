use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Syntax check failed for {}: {message}", path.display())]
    Syntax { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backup failed for {}: {message}", path.display())]
    Backup { path: PathBuf, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Test runner failed: {0}")]
    TestRunner(String),

    #[error("Version control error: {0}")]
    Vcs(String),
}

pub type Result<T> = std::result::Result<T, CleanupError>;

impl CleanupError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return CleanupError::FileNotFound(path);
        }
        CleanupError::Io { path, source }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CleanupError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn syntax(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CleanupError::Syntax {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Fatal errors abort a run before any mutation.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CleanupError::Config(_) | CleanupError::Glob(_) | CleanupError::Cancelled
        )
    }
}
