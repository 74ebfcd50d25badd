// src/task.rs

use crate::analyzer::{analyze_guarded, Analyzer};
use crate::error::VcsError;
use crate::files::FileFilter;
use crate::model::{ErrorRecord, FeatureCounts, Metric, SampledCommit, Summary};
use crate::vcs::Vcs;
use rayon::prelude::*;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// A file captured from the working tree while the checkout lock was held.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: io::Result<String>,
}

/// Exclusive owner of one project's working tree and VCS handle.
///
/// Reset, checkout, enumeration and file reads all happen inside one
/// critical section, so a task never observes another commit's files.
pub struct WorkingTree {
    root: PathBuf,
    vcs: Mutex<Box<dyn Vcs>>,
    filter: FileFilter,
}

impl WorkingTree {
    pub fn new(root: impl Into<PathBuf>, vcs: Box<dyn Vcs>, filter: FileFilter) -> Self {
        Self {
            root: root.into(),
            vcs: Mutex::new(vcs),
            filter,
        }
    }

    /// Run a read-only query against the VCS under the lock.
    pub fn query<R>(&self, f: impl FnOnce(&dyn Vcs) -> R) -> R {
        let vcs = self.vcs.lock().unwrap_or_else(PoisonError::into_inner);
        f(&**vcs)
    }

    /// Check out `commit` and read every eligible file into memory.
    pub fn snapshot(&self, commit: &SampledCommit) -> Result<Vec<SourceFile>, VcsError> {
        // A poisoned lock is still usable: the hard reset below restores a
        // consistent tree whatever the previous holder left behind.
        let mut vcs = self.vcs.lock().unwrap_or_else(PoisonError::into_inner);
        vcs.reset_hard()?;
        vcs.checkout(commit.hash())?;

        let files = self
            .filter
            .collect(&self.root)
            .into_iter()
            .filter(|path| vcs.is_tracked(path))
            .map(|path| {
                let contents = std::fs::read_to_string(self.root.join(&path));
                SourceFile { path, contents }
            })
            .collect();
        Ok(files)
    }
}

/// Analyzes one sampled commit into one [`Summary`].
pub struct CommitTask<'a> {
    project: String,
    tree: &'a WorkingTree,
    analyzer: Arc<dyn Analyzer>,
    file_timeout: Option<Duration>,
}

impl<'a> CommitTask<'a> {
    pub fn new(
        project: impl Into<String>,
        tree: &'a WorkingTree,
        analyzer: Arc<dyn Analyzer>,
        file_timeout: Option<Duration>,
    ) -> Self {
        Self {
            project: project.into(),
            tree,
            analyzer,
            file_timeout,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Never fails: checkout problems produce a placeholder summary and
    /// per-file problems become error records.
    pub fn run(&self, commit: &SampledCommit) -> Summary {
        let files = match self.tree.snapshot(commit) {
            Ok(files) => files,
            Err(e) => {
                warn!(project = %self.project, revision = %commit.hash(), "checkout failed: {e}");
                return Summary::failed(&self.project, commit, format!("checkout failed: {e}"));
            }
        };
        debug!(
            project = %self.project,
            revision = %commit.hash(),
            files = files.len(),
            "snapshot taken"
        );

        let outcomes: Vec<(PathBuf, Result<FeatureCounts, String>)> = files
            .into_par_iter()
            .map(|file| {
                let outcome = match file.contents {
                    Ok(text) => analyze_guarded(&self.analyzer, text, self.file_timeout)
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(format!("failed to read file: {e}")),
                };
                (file.path, outcome)
            })
            .collect();

        let mut counts = FeatureCounts::new();
        let mut errors = Vec::new();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(file_counts) => {
                    counts.merge(&file_counts);
                    counts.increment(Metric::Files);
                }
                Err(message) => {
                    let path = path.to_string_lossy();
                    warn!(project = %self.project, revision = %commit.hash(), file = %path, "{message}");
                    counts.increment(Metric::Errors);
                    errors.push(ErrorRecord::for_file(&path, commit.hash(), message));
                }
            }
        }

        Summary::new(&self.project, commit, counts, errors)
    }
}
