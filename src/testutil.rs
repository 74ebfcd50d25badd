// src/testutil.rs

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use git2::{Oid, Repository, Signature, Time};
use std::path::Path;
use tempfile::TempDir;

/// Midnight UTC of 2021-01-01 plus `n` days
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

/// A throwaway git repository with commits at controlled author times.
pub struct FixtureRepo {
    _dir: Option<TempDir>,
    pub repo: Repository,
}

impl FixtureRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init(dir.path())?;
        Ok(Self { _dir: Some(dir), repo })
    }

    /// Repository at `<parent>/<name>`; `parent` owns the cleanup.
    pub fn named(parent: &Path, name: &str) -> Result<Self> {
        let target = parent.join(name);
        std::fs::create_dir_all(&target)?;
        let repo = Repository::init(&target)?;
        Ok(Self { _dir: None, repo })
    }

    pub fn path(&self) -> &Path {
        self.repo.workdir().unwrap_or_else(|| self.repo.path())
    }

    /// Write `files`, stage them and commit on top of HEAD.
    pub fn commit(&self, files: &[(&str, &str)], when: DateTime<Utc>) -> Result<Oid> {
        let mut index = self.repo.index()?;
        for (name, contents) in files {
            let path = self.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, contents)?;
            index.add_path(Path::new(name))?;
        }
        index.write()?;
        let tree = self.repo.find_tree(index.write_tree()?)?;

        let sig = Signature::new("Test User", "test@example.com", &Time::new(when.timestamp(), 0))?;
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, "fixture commit", &tree, &parents)?;
        Ok(oid)
    }
}
