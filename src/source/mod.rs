use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;

use crate::config::CleanupConfig;
use crate::error::{CleanupError, Result};
use crate::model::SkippedFile;

#[derive(Debug, Default)]
pub struct FileListing {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

/// Filesystem access used by every stage; swapped out in tests.
pub trait SourceTree: Send + Sync {
    fn root(&self) -> &Path;

    /// Files under `include_paths` (globs relative to the root, everything
    /// when empty) whose name ends in one of `extensions`.
    fn list_files(&self, include_paths: &[String], extensions: &[String]) -> Result<FileListing>;

    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    fn remove(&self, path: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|e| CleanupError::parse(path, e.to_string()))
    }
}

pub struct FsSourceTree {
    root: PathBuf,
    exclude: GlobSet,
    max_file_size: u64,
}

impl FsSourceTree {
    pub fn new(root: impl Into<PathBuf>, config: &CleanupConfig) -> Result<Self> {
        let mut exclude_builder = GlobSetBuilder::new();
        for pattern in &config.exclude_paths {
            exclude_builder.add(Glob::new(pattern)?);
        }
        let backup_glob = format!("{}/**", config.backup_dir.trim_end_matches('/'));
        exclude_builder.add(Glob::new(&backup_glob)?);

        Ok(Self {
            root: root.into(),
            exclude: exclude_builder.build()?,
            max_file_size: config.max_file_size,
        })
    }
}

impl SourceTree for FsSourceTree {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list_files(&self, include_paths: &[String], extensions: &[String]) -> Result<FileListing> {
        if !self.root.is_dir() {
            return Err(CleanupError::FileNotFound(self.root.clone()));
        }

        let include_set = if include_paths.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in include_paths {
                builder.add(Glob::new(pattern)?);
            }
            Some(builder.build()?)
        };

        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .build();

        let mut listing = FileListing::default();

        for entry in walker.filter_map(std::result::Result::ok) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let relative = path.strip_prefix(&self.root).unwrap_or(path);

            if self.exclude.is_match(relative) {
                continue;
            }

            if let Some(ref include) = include_set {
                if !include.is_match(relative) {
                    continue;
                }
            }

            if !has_extension(path, extensions) {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > self.max_file_size {
                tracing::debug!(path = %relative.display(), size, "skipping oversized file");
                listing.skipped.push(SkippedFile {
                    path: path.to_path_buf(),
                    reason: format!("{} bytes exceeds maxFileSize {}", size, self.max_file_size),
                });
                continue;
            }

            listing.files.push(path.to_path_buf());
        }

        listing.files.sort();
        Ok(listing)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| CleanupError::io(path, e))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        write_atomic(path, bytes)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(|e| CleanupError::io(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Matches compound extensions such as `blade.php` against the file name.
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_lowercase(),
        None => return false,
    };
    extensions.iter().any(|ext| {
        name.len() > ext.len() + 1
            && name.ends_with(ext.as_str())
            && name.as_bytes()[name.len() - ext.len() - 1] == b'.'
    })
}

/// Writes through a sibling temp file and renames it over `path`, so readers
/// see either the old or the new content.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| CleanupError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(&tmp, meta.permissions())?;
        }
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(CleanupError::io(path, e));
    }
    Ok(())
}
