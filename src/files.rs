// src/files.rs

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

const DEFAULT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx"];

const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "bower_components",
    "dist",
    "build",
    "coverage",
    "vendor",
];

/// Decides which files of a working tree get analyzed.
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: Vec<String>,
    excluded_dirs: Vec<String>,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FileFilter {
    pub fn accepts(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(OsStr::to_str).unwrap_or("");
        if name.ends_with(".min.js") {
            return false;
        }
        path.extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }

    fn prunes(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.excluded_dirs.iter().any(|d| d == name))
    }

    /// Eligible files under `root`, relative to it, in a stable order.
    pub fn collect(&self, root: &Path) -> Vec<PathBuf> {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.prunes(e));

        let mut files = Vec::new();
        for item in walker {
            match item {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.accepts(entry.path()) {
                        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
                        files.push(rel.to_path_buf());
                    }
                }
                Err(e) => warn!("skipping unreadable path during file walk: {e}"),
            }
        }
        files
    }
}
