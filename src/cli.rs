// src/cli.rs

use crate::error::MinerError;
use crate::model::TimeWindow;
use chrono::{NaiveDate, TimeZone, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mine JavaScript feature usage across git history", long_about = None)]
pub struct Args {
    /// Directory whose immediate subdirectories are git projects
    #[arg(short, long)]
    pub path: PathBuf,

    /// Only analyze the project with this directory name
    #[arg(long)]
    pub project: Option<String>,

    /// First day of the analyzed interval (YYYY-MM-DD)
    #[arg(short, long, default_value = "1970-01-01")]
    pub since: NaiveDate,

    /// Last day of the analyzed interval (YYYY-MM-DD), defaults to today
    #[arg(short, long)]
    pub until: Option<NaiveDate>,

    /// Minimum number of days between two analyzed commits
    #[arg(long, default_value_t = 7)]
    pub step: i64,

    /// Worker threads, defaults to the available parallelism
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Analyze only this commit instead of sampling the interval
    #[arg(short, long)]
    pub revision: Option<String>,

    /// Output directory, defaults to `js-miner-out` next to --path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Per-file analysis timeout in seconds (0 disables it)
    #[arg(long, default_value_t = 30)]
    pub file_timeout: u64,

    /// Do not draw progress bars
    #[arg(long)]
    pub no_progress: bool,
}

/// Validated run configuration
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub root: PathBuf,
    pub project: Option<String>,
    pub window: TimeWindow,
    pub step_days: i64,
    pub workers: usize,
    pub revision: Option<String>,
    pub output: Option<PathBuf>,
    pub file_timeout: Option<Duration>,
    pub progress: bool,
}

impl Args {
    pub fn into_config(self) -> Result<MinerConfig, MinerError> {
        let until = self.until.unwrap_or_else(|| Utc::now().date_naive());
        let begin = self.since.and_hms_opt(0, 0, 0).map(|d| Utc.from_utc_datetime(&d));
        let end = until.and_hms_opt(23, 59, 59).map(|d| Utc.from_utc_datetime(&d));
        let window = begin
            .zip(end)
            .and_then(|(begin, end)| TimeWindow::new(begin, end))
            .ok_or_else(|| {
                MinerError::Config(format!("start date {} is after end date {}", self.since, until))
            })?;

        let workers = match self.threads {
            Some(0) => return Err(MinerError::Config("--threads must be at least 1".into())),
            Some(n) => n,
            None => std::thread::available_parallelism().map_or(1, |n| n.get()),
        };

        Ok(MinerConfig {
            root: self.path,
            project: self.project.filter(|p| !p.is_empty()),
            window,
            step_days: self.step,
            workers,
            revision: self.revision,
            output: self.output,
            file_timeout: (self.file_timeout > 0).then(|| Duration::from_secs(self.file_timeout)),
            progress: !self.no_progress,
        })
    }
}
