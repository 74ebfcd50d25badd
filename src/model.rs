// src/model.rs

use chrono::{DateTime, Utc};
use std::iter::Sum;
use std::ops::AddAssign;

/// Every numeric column of the report, in header order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Files,
    AsyncDeclarations,
    AwaitDeclarations,
    ConstDeclarations,
    ClassDeclarations,
    ArrowFunctionDeclarations,
    LetDeclarations,
    ExportDeclarations,
    YieldDeclarations,
    ImportStatements,
    PromiseDeclarations,
    PromiseAllAndThen,
    DefaultParameters,
    RestStatements,
    SpreadArguments,
    ArrayDestructuring,
    ObjectDestructuring,
    Errors,
    Statements,
}

impl Metric {
    pub const COUNT: usize = 19;

    pub const ALL: [Metric; Metric::COUNT] = [
        Metric::Files,
        Metric::AsyncDeclarations,
        Metric::AwaitDeclarations,
        Metric::ConstDeclarations,
        Metric::ClassDeclarations,
        Metric::ArrowFunctionDeclarations,
        Metric::LetDeclarations,
        Metric::ExportDeclarations,
        Metric::YieldDeclarations,
        Metric::ImportStatements,
        Metric::PromiseDeclarations,
        Metric::PromiseAllAndThen,
        Metric::DefaultParameters,
        Metric::RestStatements,
        Metric::SpreadArguments,
        Metric::ArrayDestructuring,
        Metric::ObjectDestructuring,
        Metric::Errors,
        Metric::Statements,
    ];

    /// Column name used in the CSV header
    pub fn name(self) -> &'static str {
        match self {
            Metric::Files => "files",
            Metric::AsyncDeclarations => "async-declarations",
            Metric::AwaitDeclarations => "await-declarations",
            Metric::ConstDeclarations => "const-declarations",
            Metric::ClassDeclarations => "class-declarations",
            Metric::ArrowFunctionDeclarations => "arrow-function-declarations",
            Metric::LetDeclarations => "let-declarations",
            Metric::ExportDeclarations => "export-declarations",
            Metric::YieldDeclarations => "yield-declarations",
            Metric::ImportStatements => "import-statements",
            Metric::PromiseDeclarations => "promise-declarations",
            Metric::PromiseAllAndThen => "promise-all-and-then",
            Metric::DefaultParameters => "default-parameters",
            Metric::RestStatements => "rest-statements",
            Metric::SpreadArguments => "spread-arguments",
            Metric::ArrayDestructuring => "array-destructuring",
            Metric::ObjectDestructuring => "object-destructuring",
            Metric::Errors => "errors",
            Metric::Statements => "statements",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Per-file or per-commit tallies, one slot per [`Metric`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureCounts {
    values: [u64; Metric::COUNT],
}

impl FeatureCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: Metric) -> u64 {
        self.values[metric.index()]
    }

    pub fn add(&mut self, metric: Metric, n: u64) {
        self.values[metric.index()] += n;
    }

    pub fn increment(&mut self, metric: Metric) {
        self.add(metric, 1);
    }

    /// Element-wise sum. Order of merging never changes the totals.
    pub fn merge(&mut self, other: &FeatureCounts) {
        for (mine, theirs) in self.values.iter_mut().zip(other.values.iter()) {
            *mine += theirs;
        }
    }

    /// Values in header order.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, u64)> + '_ {
        Metric::ALL.iter().map(move |&m| (m, self.get(m)))
    }
}

impl AddAssign for FeatureCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(&rhs);
    }
}

impl Sum for FeatureCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(FeatureCounts::default(), |mut acc, c| {
            acc += c;
            acc
        })
    }
}

/// Inclusive `[begin, end]` range of commit timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Returns `None` when `begin` is after `end`.
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (begin <= end).then_some(Self { begin, end })
    }

    pub fn begin(&self) -> DateTime<Utc> {
        self.begin
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.begin && ts <= self.end
    }
}

/// A commit as listed by the VCS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub hash: String,
    /// Author time
    pub timestamp: DateTime<Utc>,
    pub merge: bool,
}

/// A commit chosen to represent one sampling bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledCommit {
    pub commit: CommitRef,
}

impl SampledCommit {
    pub fn hash(&self) -> &str {
        &self.commit.hash
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.commit.timestamp
    }
}

impl From<CommitRef> for SampledCommit {
    fn from(commit: CommitRef) -> Self {
        Self { commit }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub key: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn for_file(path: &str, revision: &str, message: impl Into<String>) -> Self {
        Self {
            key: format!("{path}@{revision}"),
            message: message.into(),
        }
    }

    pub fn for_checkout(revision: &str, message: impl Into<String>) -> Self {
        Self {
            key: format!("checkout@{revision}"),
            message: message.into(),
        }
    }
}

/// One row of a project report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub project: String,
    pub date: DateTime<Utc>,
    pub revision: String,
    pub counts: FeatureCounts,
    pub errors: Vec<ErrorRecord>,
}

impl Summary {
    pub fn new(
        project: impl Into<String>,
        commit: &SampledCommit,
        counts: FeatureCounts,
        errors: Vec<ErrorRecord>,
    ) -> Self {
        Self {
            project: project.into(),
            date: commit.timestamp(),
            revision: commit.hash().to_string(),
            counts,
            errors,
        }
    }

    /// Placeholder row for a commit that could not be checked out or crashed.
    pub fn failed(project: impl Into<String>, commit: &SampledCommit, message: impl Into<String>) -> Self {
        let mut counts = FeatureCounts::new();
        counts.increment(Metric::Errors);
        let error = ErrorRecord::for_checkout(commit.hash(), message);
        Self::new(project, commit, counts, vec![error])
    }
}

/// Rows of one project, ascending by commit date
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub project: String,
    summaries: Vec<Summary>,
}

impl Report {
    pub fn new(project: impl Into<String>, mut summaries: Vec<Summary>) -> Self {
        summaries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.revision.cmp(&b.revision)));
        Self {
            project: project.into(),
            summaries,
        }
    }

    pub fn summaries(&self) -> &[Summary] {
        &self.summaries
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.summaries.iter().flat_map(|s| s.errors.iter())
    }
}
