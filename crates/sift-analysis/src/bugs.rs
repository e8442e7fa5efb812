use std::collections::HashMap;

use sift_config::BugEntryConfig;
use sift_core::Bug;

/// Source of bug references for tests and jobs. A miss is an empty list.
pub trait BugLookup: Send + Sync {
    fn bugs_for_test(&self, test_name: &str) -> Vec<Bug>;

    fn bugs_for_job(&self, _job_name: &str) -> Vec<Bug> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoBugs;

impl BugLookup for NoBugs {
    fn bugs_for_test(&self, _test_name: &str) -> Vec<Bug> {
        Vec::new()
    }
}

/// Bugs keyed by the exact test or job name they were filed against.
#[derive(Debug, Clone, Default)]
pub struct StaticBugCache {
    by_name: HashMap<String, Vec<Bug>>,
}

impl StaticBugCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[BugEntryConfig]) -> Self {
        let mut cache = Self::new();
        for entry in entries.iter().filter(|entry| !entry.url.is_empty()) {
            cache.insert(
                &entry.test,
                Bug {
                    url: entry.url.clone(),
                    summary: entry.summary.clone(),
                    target_release: entry.target_release.clone(),
                    ..Bug::default()
                },
            );
        }
        cache
    }

    pub fn insert(&mut self, name: &str, bug: Bug) {
        let bugs = self.by_name.entry(name.to_owned()).or_default();
        if !bugs.iter().any(|existing| existing.url == bug.url) {
            bugs.push(bug);
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl BugLookup for StaticBugCache {
    fn bugs_for_test(&self, test_name: &str) -> Vec<Bug> {
        self.by_name.get(test_name).cloned().unwrap_or_default()
    }

    fn bugs_for_job(&self, job_name: &str) -> Vec<Bug> {
        self.bugs_for_test(job_name)
    }
}

/// Splits bugs into those targeting `release` (or any release) and those
/// only associated through other releases.
pub fn split_bugs_by_release(bugs: Vec<Bug>, release: &str) -> (Vec<Bug>, Vec<Bug>) {
    bugs.into_iter().partition(|bug| bug.applies_to(release))
}
