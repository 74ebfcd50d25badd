// src/orchestrator.rs

use crate::analyzer::{Analyzer, JsAnalyzer};
use crate::cli::MinerConfig;
use crate::error::MinerError;
use crate::files::FileFilter;
use crate::model::{Report, SampledCommit};
use crate::report::{write_report, ResultsWriter};
use crate::sampler::sample;
use crate::scheduler::Traversal;
use crate::task::{CommitTask, WorkingTree};
use crate::vcs::GitRepository;
use anyhow::Context;
use indicatif::ProgressBar;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

const OUTPUT_DIR_NAME: &str = "js-miner-out";
const RESULTS_FILE: &str = "results.csv";

/// A git project found under the root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
}

/// Outcome of a whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output: PathBuf,
    pub projects: usize,
    pub failed: usize,
    pub rows: usize,
}

/// Immediate subdirectories of `root` holding a `.git` directory, sorted by
/// name, optionally restricted to one project name.
pub fn discover_projects(root: &Path, only: Option<&str>) -> Result<Vec<Project>, MinerError> {
    if !root.is_dir() {
        return Err(MinerError::InvalidRoot(root.to_path_buf()));
    }
    let entries = fs::read_dir(root).map_err(|_| MinerError::InvalidRoot(root.to_path_buf()))?;

    let mut projects: Vec<Project> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir() && e.path().join(".git").is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            Some(Project { name, path: e.path() })
        })
        .filter(|p| only.map_or(true, |wanted| p.name == wanted))
        .collect();
    projects.sort_by(|a, b| a.name.cmp(&b.name));

    if projects.is_empty() {
        return Err(MinerError::NoProjects(root.to_path_buf()));
    }
    Ok(projects)
}

/// `js-miner-out` next to the root directory
pub fn default_output_dir(root: &Path) -> Result<PathBuf, MinerError> {
    let root = root
        .canonicalize()
        .map_err(|_| MinerError::InvalidRoot(root.to_path_buf()))?;
    Ok(root.parent().unwrap_or(&root).join(OUTPUT_DIR_NAME))
}

/// Drives sampling, traversal and reporting for every discovered project.
pub struct Orchestrator {
    config: MinerConfig,
    analyzer: Arc<dyn Analyzer>,
}

impl Orchestrator {
    pub fn new(config: MinerConfig) -> Self {
        Self {
            config,
            analyzer: Arc::new(JsAnalyzer),
        }
    }

    pub fn run(&self) -> Result<RunSummary, MinerError> {
        let config = &self.config;
        info!(
            path = %config.root.display(),
            project = config.project.as_deref().unwrap_or("*"),
            steps = config.step_days,
            threads = config.workers,
            begin = %config.window.begin(),
            end = %config.window.end(),
            "initializing git traversal"
        );

        let projects = discover_projects(&config.root, config.project.as_deref())?;

        let output = match &config.output {
            Some(dir) => dir.clone(),
            None => default_output_dir(&config.root)?,
        };
        fs::create_dir_all(&output).map_err(|source| MinerError::OutputDir {
            source,
            path: output.clone(),
        })?;

        let mut results = ResultsWriter::create(&output.join(RESULTS_FILE))?;
        let mut failed = 0;

        for project in &projects {
            info!(project = %project.name, "processing project");

            let report = match self.mine_project(project) {
                Ok(report) => report,
                Err(e) => {
                    error!(project = %project.name, "failed to traverse project: {e:#}");
                    failed += 1;
                    continue;
                }
            };

            match write_report(&report, &output) {
                Ok(files) => info!(
                    project = %project.name,
                    report = %files.csv.display(),
                    errors = %files.errors.display(),
                    rows = report.summaries().len(),
                    "report written"
                ),
                Err(e) => {
                    error!(project = %project.name, "failed to write report/errors file: {e}");
                    failed += 1;
                }
            }
            if let Err(e) = results.append(&report) {
                error!(project = %project.name, "failed to append to {RESULTS_FILE}: {e}");
            }
        }

        let rows = results.finish()?;
        info!(output = %output.display(), rows, "finished");

        Ok(RunSummary {
            output,
            projects: projects.len(),
            failed,
            rows,
        })
    }

    fn mine_project(&self, project: &Project) -> anyhow::Result<Report> {
        let config = &self.config;
        let git = GitRepository::open(&project.path)
            .with_context(|| format!("failed to open repository at {}", project.path.display()))?;
        let tree = WorkingTree::new(&project.path, Box::new(git), FileFilter::default());

        let samples = match &config.revision {
            Some(rev) => {
                let commit = tree
                    .query(|vcs| vcs.resolve_commit(rev))
                    .with_context(|| format!("failed to resolve revision {rev}"))?;
                vec![SampledCommit::from(commit)]
            }
            None => {
                let branch = match tree.query(|vcs| vcs.resolve_default_branch()) {
                    Ok(branch) => branch,
                    Err(e) => {
                        warn!(project = %project.name, "failed to get the project main branch: {e}");
                        return Ok(Report::new(&project.name, vec![]));
                    }
                };
                let history = tree
                    .query(|vcs| vcs.list_commits(&branch, &config.window))
                    .with_context(|| format!("failed to list commits of {branch}"))?;
                let samples = sample(&history, &config.window, config.step_days);
                info!(
                    project = %project.name,
                    branch = %branch,
                    commits = history.len(),
                    groups = samples.len(),
                    "sampled history"
                );
                samples
            }
        };

        let task = CommitTask::new(
            &project.name,
            &tree,
            Arc::clone(&self.analyzer),
            config.file_timeout,
        );
        let progress = if config.progress {
            ProgressBar::new(samples.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        let summaries = Traversal::new(&task, config.workers)?
            .with_progress(progress)
            .traverse(&samples);

        Ok(Report::new(&project.name, summaries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimeWindow;
    use crate::report::ERROR_SEPARATOR;
    use crate::testutil::{day, FixtureRepo};
    use anyhow::Result;
    use chrono::Duration;

    fn config(root: &Path, output: &Path) -> MinerConfig {
        MinerConfig {
            root: root.to_path_buf(),
            project: None,
            window: TimeWindow::new(day(0), day(11) + Duration::hours(23)).unwrap(),
            step_days: 5,
            workers: 2,
            revision: None,
            output: Some(output.to_path_buf()),
            file_timeout: Some(std::time::Duration::from_secs(30)),
            progress: false,
        }
    }

    /// Two projects plus a plain directory that must be ignored.
    fn workspace() -> Result<(tempfile::TempDir, Vec<String>)> {
        let root = tempfile::tempdir()?;

        let alpha = FixtureRepo::named(root.path(), "alpha")?;
        let mut alpha_hashes = Vec::new();
        for (d, body) in [(0, "const a = 1;"), (1, "let b;"), (2, "let c;"), (10, "let d;"), (11, "let e;")] {
            let name = format!("src/day{d}.js");
            alpha_hashes.push(alpha.commit(&[(name.as_str(), body)], day(d))?.to_string());
        }

        let beta = FixtureRepo::named(root.path(), "beta")?;
        beta.commit(
            &[
                ("good.js", "const ok = 1;\nconst alsoOk = () => ok;"),
                ("bad.js", "function broken( {"),
            ],
            day(3),
        )?;

        fs::create_dir_all(root.path().join("notes"))?;
        Ok((root, alpha_hashes))
    }

    #[test]
    fn discovery_finds_git_projects_only() -> Result<()> {
        let (root, _) = workspace()?;
        let names: Vec<_> = discover_projects(root.path(), None)?
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        let only = discover_projects(root.path(), Some("beta"))?;
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].name, "beta");

        assert!(matches!(
            discover_projects(root.path(), Some("gamma")),
            Err(MinerError::NoProjects(_))
        ));
        Ok(())
    }

    #[test]
    fn discovery_rejects_missing_root() {
        let err = discover_projects(Path::new("/definitely/not/here"), None).unwrap_err();
        assert!(matches!(err, MinerError::InvalidRoot(_)));
    }

    #[test]
    fn default_output_sits_next_to_root() -> Result<()> {
        let parent = tempfile::tempdir()?;
        let root = parent.path().join("projects");
        fs::create_dir_all(&root)?;
        assert_eq!(
            default_output_dir(&root)?,
            parent.path().canonicalize()?.join(OUTPUT_DIR_NAME)
        );
        Ok(())
    }

    #[test]
    fn end_to_end_run() -> Result<()> {
        let (root, alpha_hashes) = workspace()?;
        let out = tempfile::tempdir()?;
        let output = out.path().join("reports");

        let summary = Orchestrator::new(config(root.path(), &output)).run()?;
        assert_eq!(summary.projects, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.rows, 3);

        // day 0 and day 10 are sampled with a 5 day step
        let alpha = fs::read_to_string(output.join("alpha.csv"))?;
        let rows: Vec<&str> = alpha.lines().skip(1).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with(&format!("alpha,01-01-2021,{},1,", alpha_hashes[0])));
        assert!(rows[1].starts_with(&format!("alpha,11-01-2021,{},4,", alpha_hashes[3])));
        assert_eq!(fs::read_to_string(output.join("alpha-errors.txt"))?, "");

        let beta = fs::read_to_string(output.join("beta.csv"))?;
        let header: Vec<&str> = beta.lines().next().unwrap_or_default().split(',').collect();
        let row: Vec<&str> = beta.lines().nth(1).unwrap_or_default().split(',').collect();
        assert_eq!(header.len(), row.len());
        let column = |name: &str| row[header.iter().position(|h| *h == name).unwrap()];
        assert_eq!(column("errors"), "1");
        assert_eq!(column("files"), "1");
        assert_eq!(column("const-declarations"), "2");
        assert_eq!(column("arrow-function-declarations"), "1");

        let errors = fs::read_to_string(output.join("beta-errors.txt"))?;
        assert_eq!(errors.matches(ERROR_SEPARATOR).count(), 1);
        assert!(errors.starts_with("bad.js@"));

        let results = fs::read_to_string(output.join(RESULTS_FILE))?;
        assert_eq!(results.lines().count(), 4);
        Ok(())
    }

    #[test]
    fn report_write_failure_skips_only_that_project() -> Result<()> {
        let (root, _) = workspace()?;
        let out = tempfile::tempdir()?;
        // a directory in the way makes the alpha report rename fail
        fs::create_dir_all(out.path().join("alpha.csv"))?;

        let summary = Orchestrator::new(config(root.path(), out.path())).run()?;
        assert_eq!(summary.projects, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.rows, 3);

        let beta = fs::read_to_string(out.path().join("beta.csv"))?;
        assert_eq!(beta.lines().count(), 2);

        let results = fs::read_to_string(out.path().join(RESULTS_FILE))?;
        assert_eq!(results.lines().filter(|l| l.starts_with("beta,")).count(), 1);
        Ok(())
    }

    #[test]
    fn single_revision_mode() -> Result<()> {
        let (root, alpha_hashes) = workspace()?;
        let out = tempfile::tempdir()?;

        let mut config = config(root.path(), out.path());
        config.project = Some("alpha".into());
        config.revision = Some(alpha_hashes[2].clone());

        let summary = Orchestrator::new(config).run()?;
        assert_eq!(summary.rows, 1);
        let alpha = fs::read_to_string(out.path().join("alpha.csv"))?;
        assert!(alpha.lines().nth(1).unwrap_or_default().contains(&alpha_hashes[2]));
        Ok(())
    }

    #[test]
    fn unresolvable_revision_fails_only_that_project() -> Result<()> {
        let (root, _) = workspace()?;
        let out = tempfile::tempdir()?;

        let mut config = config(root.path(), out.path());
        config.revision = Some("does-not-exist".into());

        let summary = Orchestrator::new(config).run()?;
        assert_eq!(summary.projects, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.rows, 0);
        Ok(())
    }
}
