//! Document discovery under the configured root

use crate::error::SearchError;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// A candidate document found on disk. Does not hold file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl DocumentHandle {
    /// File name only
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Path relative to `root`, falling back to the full path.
    pub fn display_name(&self, root: &Path) -> String {
        self.path
            .strip_prefix(root)
            .unwrap_or(&self.path)
            .to_string_lossy()
            .to_string()
    }

    /// Size in KiB, rounded to two decimals
    pub fn size_kb(&self) -> f64 {
        (self.size as f64 / 1024.0 * 100.0).round() / 100.0
    }

    /// Last modified time (RFC 3339)
    pub fn modified_rfc3339(&self) -> Option<String> {
        self.modified
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .and_then(|d| chrono::DateTime::from_timestamp(d.as_secs() as i64, 0))
            .map(|dt| dt.to_rfc3339())
    }
}

/// Walks a directory tree for files with a given extension.
#[derive(Debug, Clone)]
pub struct DocumentScanner {
    root: PathBuf,
    extension: String,
    pattern: Option<glob::Pattern>,
}

impl DocumentScanner {
    /// Scanner for `*.pdf` files (case-insensitive) under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "pdf".to_string(),
            pattern: None,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Only yield files whose name matches this glob pattern.
    pub fn with_pattern(mut self, pattern: Option<glob::Pattern>) -> Self {
        self.pattern = pattern;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a fresh walk of the root. Each call restarts from the top.
    ///
    /// A missing root is an error rather than an empty walk, so callers can
    /// tell a misconfigured path from an empty directory.
    pub fn documents(&self) -> Result<Documents, SearchError> {
        if !self.root.exists() {
            return Err(SearchError::RootNotFound {
                path: self.root.display().to_string(),
            });
        }
        if !self.root.is_dir() {
            return Err(SearchError::NotADirectory {
                path: self.root.display().to_string(),
            });
        }

        Ok(Documents {
            walker: WalkDir::new(&self.root).sort_by_file_name().into_iter(),
            extension: self.extension.clone(),
            pattern: self.pattern.clone(),
        })
    }
}

/// Lazy iterator over the documents under a scanner's root.
pub struct Documents {
    walker: walkdir::IntoIter,
    extension: String,
    pattern: Option<glob::Pattern>,
}

impl Documents {
    fn accepts(&self, path: &Path) -> bool {
        let extension_matches = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case(self.extension.as_str()));
        if !extension_matches {
            return false;
        }

        match &self.pattern {
            Some(pattern) => path
                .file_name()
                .map_or(false, |name| pattern.matches(&name.to_string_lossy())),
            None => true,
        }
    }
}

impl Iterator for Documents {
    type Item = DocumentHandle;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    // Unreadable subdirectories are skipped, not fatal.
                    tracing::debug!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.accepts(entry.path()) {
                continue;
            }

            let metadata = entry.metadata().ok();
            return Some(DocumentHandle {
                path: entry.into_path(),
                size: metadata.as_ref().map(|m| m.len()).unwrap_or(0),
                modified: metadata.and_then(|m| m.modified().ok()),
            });
        }
    }
}
