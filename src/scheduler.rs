// src/scheduler.rs

use crate::error::{panic_message, MinerError};
use crate::model::{SampledCommit, Summary};
use crate::task::CommitTask;
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Runs commit tasks on a bounded worker pool.
pub struct Traversal<'a> {
    task: &'a CommitTask<'a>,
    pool: ThreadPool,
    progress: ProgressBar,
}

impl<'a> Traversal<'a> {
    /// `workers` bounds both in-flight commits and per-file analyses.
    pub fn new(task: &'a CommitTask<'a>, workers: usize) -> Result<Self, MinerError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("js-miner-worker-{i}"))
            .build()?;
        Ok(Self {
            task,
            pool,
            progress: ProgressBar::hidden(),
        })
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// One summary per sample, in no particular order. Blocks until every
    /// task has finished.
    pub fn traverse(&self, samples: &[SampledCommit]) -> Vec<Summary> {
        let project = self.task.project();
        info!(project = %project, groups = samples.len(), "traversing sampled commits");

        self.progress.set_length(samples.len() as u64);
        self.progress.set_message(format!("{project}: analyzing commits"));

        let started = Instant::now();
        let summaries: Vec<Summary> = self.pool.install(|| {
            samples
                .par_iter()
                .progress_with(self.progress.clone())
                .map(|commit| self.run_isolated(commit))
                .collect()
        });
        self.progress.finish_with_message(format!("{project}: done"));

        info!(
            project = %project,
            average = ?average(started.elapsed(), samples.len()),
            "finished traversal"
        );
        summaries
    }

    fn run_isolated(&self, commit: &SampledCommit) -> Summary {
        panic::catch_unwind(AssertUnwindSafe(|| self.task.run(commit))).unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(project = %self.task.project(), revision = %commit.hash(), "commit task crashed: {message}");
            Summary::failed(self.task.project(), commit, format!("analysis crashed: {message}"))
        })
    }
}

fn average(total: Duration, n: usize) -> Duration {
    match u32::try_from(n) {
        Ok(0) | Err(_) => total,
        Ok(n) => total / n,
    }
}
