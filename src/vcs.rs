// src/vcs.rs

use crate::error::VcsError;
use crate::model::{CommitRef, TimeWindow};
use chrono::{DateTime, TimeZone, Utc};
use git2::build::CheckoutBuilder;
use git2::{Commit, ObjectType, Oid, Repository, ResetType, Sort, Status};
use std::path::Path;
use tracing::debug;

const ORIGIN_HEAD: &str = "refs/remotes/origin/HEAD";
const ORIGIN_PREFIX: &str = "refs/remotes/origin/";
const LOCAL_PREFIX: &str = "refs/heads/";

/// Version-control operations needed by a traversal.
///
/// `reset_hard` and `checkout` mutate the working tree; callers must hold
/// the project's checkout lock (see [`crate::task::WorkingTree`]).
pub trait Vcs: Send {
    fn resolve_default_branch(&self) -> Result<String, VcsError>;

    /// Non-merge commits reachable from `branch` whose author time falls in
    /// `window`, ascending by time.
    fn list_commits(&self, branch: &str, window: &TimeWindow) -> Result<Vec<CommitRef>, VcsError>;

    fn resolve_commit(&self, rev: &str) -> Result<CommitRef, VcsError>;

    fn reset_hard(&mut self) -> Result<(), VcsError>;

    fn checkout(&mut self, hash: &str) -> Result<(), VcsError>;

    /// Whether `path` (relative to the working tree) belongs to the checked
    /// out commit. Untracked and ignored files are left alone by checkouts
    /// and must not be counted.
    fn is_tracked(&self, _path: &Path) -> bool {
        true
    }
}

/// [`Vcs`] backed by libgit2
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    pub fn open(path: &Path) -> Result<Self, VcsError> {
        let repo = Repository::open(path)?;
        debug!("opened git repository at {:?}", repo.path());
        Ok(Self { repo })
    }

    fn branch_head(&self, branch: &str) -> Result<Oid, VcsError> {
        let local = format!("{LOCAL_PREFIX}{branch}");
        let remote = format!("{ORIGIN_PREFIX}{branch}");
        self.repo
            .refname_to_id(&local)
            .or_else(|_| self.repo.refname_to_id(&remote))
            .map_err(|_| VcsError::UnknownBranch(branch.to_string()))
    }
}

impl Vcs for GitRepository {
    fn resolve_default_branch(&self) -> Result<String, VcsError> {
        if let Ok(origin_head) = self.repo.find_reference(ORIGIN_HEAD) {
            if let Some(target) = origin_head.symbolic_target() {
                if let Some(name) = target.strip_prefix(ORIGIN_PREFIX) {
                    return Ok(name.to_string());
                }
            }
        }

        // Local-only clones have no origin/HEAD; use whatever HEAD names.
        let head = self.repo.find_reference("HEAD").map_err(|_| VcsError::BranchNotFound)?;
        head.symbolic_target()
            .and_then(|t| t.strip_prefix(LOCAL_PREFIX))
            .map(str::to_string)
            .ok_or(VcsError::BranchNotFound)
    }

    fn list_commits(&self, branch: &str, window: &TimeWindow) -> Result<Vec<CommitRef>, VcsError> {
        let head = self.branch_head(branch)?;

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME)?;
        revwalk.push(head)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            if commit.parent_count() > 1 {
                continue;
            }
            let commit = commit_ref(&commit);
            if window.contains(commit.timestamp) {
                commits.push(commit);
            }
        }
        commits.sort_by_key(|c| c.timestamp);

        Ok(commits)
    }

    fn resolve_commit(&self, rev: &str) -> Result<CommitRef, VcsError> {
        let commit = self
            .repo
            .revparse_single(rev)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|_| VcsError::RevisionNotFound(rev.to_string()))?;
        Ok(commit_ref(&commit))
    }

    fn reset_hard(&mut self) -> Result<(), VcsError> {
        let head = self.repo.head()?.peel(ObjectType::Commit)?;
        self.repo
            .reset(&head, ResetType::Hard, Some(CheckoutBuilder::new().force()))?;
        Ok(())
    }

    fn checkout(&mut self, hash: &str) -> Result<(), VcsError> {
        let commit = self
            .repo
            .revparse_single(hash)
            .and_then(|obj| obj.peel_to_commit())
            .map_err(|_| VcsError::RevisionNotFound(hash.to_string()))?;
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        self.repo.set_head_detached(commit.id())?;
        Ok(())
    }

    fn is_tracked(&self, path: &Path) -> bool {
        match self.repo.status_file(path) {
            Ok(status) => !status.intersects(Status::WT_NEW | Status::IGNORED),
            Err(e) => {
                debug!("no status for {}: {e}", path.display());
                true
            }
        }
    }
}

fn commit_ref(commit: &Commit<'_>) -> CommitRef {
    CommitRef {
        hash: commit.id().to_string(),
        timestamp: to_utc(commit.author().when().seconds()),
        merge: commit.parent_count() > 1,
    }
}

fn to_utc(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or_default()
}
