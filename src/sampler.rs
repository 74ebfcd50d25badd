// src/sampler.rs

use crate::model::{CommitRef, SampledCommit, TimeWindow};
use chrono::{DateTime, Utc};

/// Pick at most one commit per `step_days` bucket.
///
/// History is filtered to the window, merges are dropped, and commits are
/// visited in ascending time order. A commit is selected when it is the
/// first one seen or when at least `step_days` whole days separate it from
/// the last selected commit. With `step_days <= 0` every commit in the
/// window is selected.
pub fn sample(history: &[CommitRef], window: &TimeWindow, step_days: i64) -> Vec<SampledCommit> {
    let mut candidates: Vec<&CommitRef> = history
        .iter()
        .filter(|c| !c.merge && window.contains(c.timestamp))
        .collect();
    candidates.sort_by_key(|c| c.timestamp);

    let mut last_chosen: Option<DateTime<Utc>> = None;
    let mut samples = Vec::new();

    for commit in candidates {
        let selected = match last_chosen {
            None => true,
            Some(previous) => days_between(commit.timestamp, previous) >= step_days,
        };
        if selected {
            last_chosen = Some(commit.timestamp);
            samples.push(SampledCommit::from(commit.clone()));
        }
    }

    samples
}

fn days_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    (a - b).num_days().abs()
}
