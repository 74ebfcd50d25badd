// src/error.rs

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures raised by the version-control backend
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("could not resolve the default branch")]
    BranchNotFound,

    #[error("branch {0} not found")]
    UnknownBranch(String),

    #[error("revision {0} not found")]
    RevisionNotFound(String),

    #[error("git: {0}")]
    Git(#[from] git2::Error),
}

/// Per-file analysis failures. Never abort a commit.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },

    #[error("parser produced no tree")]
    NoTree,

    #[error("parser setup failed: {0}")]
    Language(String),

    #[error("analysis did not finish within {0:?}")]
    Timeout(Duration),

    #[error("analyzer panicked: {0}")]
    Panicked(String),

    #[error("analysis thread failed: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {source} (path: {path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("could not persist {path}: {source}")]
    Persist {
        source: tempfile::PersistError,
        path: PathBuf,
    },
}

impl ReportError {
    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ReportError::Io { source, path }
    }
}

/// Run-level failures; these end the process.
#[derive(Debug, Error)]
pub enum MinerError {
    #[error("path {0} does not exist or isn't a directory")]
    InvalidRoot(PathBuf),

    #[error("couldn't find any git folder in {0}")]
    NoProjects(PathBuf),

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Extract a readable message from a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
