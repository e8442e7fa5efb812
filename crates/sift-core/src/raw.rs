use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::testgrid::TestStatus;

/// Outcome of one phase of a job run. Moves forward only: `Unset` may become
/// either outcome, `Success` may become `Failure`, `Failure` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PhaseStatus {
    #[default]
    #[serde(rename = "")]
    Unset,
    Success,
    Failure,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Success => "Success",
            Self::Failure => "Failure",
        }
    }

    pub fn is_set(self) -> bool {
        self != Self::Unset
    }

    pub fn is_failure(self) -> bool {
        self == Self::Failure
    }

    #[must_use]
    pub fn merge(self, observed: PhaseStatus) -> PhaseStatus {
        match (self, observed) {
            (Self::Failure, _) | (_, Self::Failure) => Self::Failure,
            (Self::Success, _) | (_, Self::Success) => Self::Success,
            _ => Self::Unset,
        }
    }

    pub fn record(&mut self, observed: PhaseStatus) {
        *self = self.merge(observed);
    }
}

/// Overall classification of a job run, derived from its phase fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum JobRunStatus {
    #[serde(rename = "S")]
    Succeeded,
    #[default]
    #[serde(rename = "R")]
    Running,
    #[serde(rename = "N")]
    InfrastructureFailure,
    #[serde(rename = "I")]
    InstallFailure,
    #[serde(rename = "U")]
    UpgradeFailure,
    #[serde(rename = "F")]
    TestFailure,
    #[serde(rename = "n")]
    NoResults,
    #[serde(rename = "f")]
    UnknownFailure,
}

impl JobRunStatus {
    pub fn code(self) -> &'static str {
        match self {
            Self::Succeeded => "S",
            Self::Running => "R",
            Self::InfrastructureFailure => "N",
            Self::InstallFailure => "I",
            Self::UpgradeFailure => "U",
            Self::TestFailure => "F",
            Self::NoResults => "n",
            Self::UnknownFailure => "f",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorState {
    pub name: String,
    pub state: PhaseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJobRunTestResult {
    pub name: String,
    pub status: TestStatus,
}

/// Everything observed about a single run of a job, keyed by its run URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawJobRunResult {
    pub job: String,
    pub job_run_url: String,
    pub test_failures: usize,
    pub failed_test_names: Vec<String>,
    pub test_results: Vec<RawJobRunTestResult>,
    pub failed: bool,
    pub succeeded: bool,

    pub setup_status: PhaseStatus,
    pub install_status: PhaseStatus,
    pub final_operator_states: Vec<OperatorState>,

    pub upgrade_started: bool,
    pub upgrade_for_operators_status: PhaseStatus,
    pub upgrade_for_machine_config_pools_status: PhaseStatus,

    pub openshift_tests_status: PhaseStatus,

    pub overall_status: JobRunStatus,
    pub timestamp: i64,
}

impl RawJobRunResult {
    pub fn new(job: impl Into<String>, job_run_url: impl Into<String>, timestamp: i64) -> Self {
        Self {
            job: job.into(),
            job_run_url: job_run_url.into(),
            timestamp,
            ..Self::default()
        }
    }

    pub fn has_test_result(&self, name: &str) -> bool {
        self.test_results.iter().any(|result| result.name == name)
    }
}

/// Per-job accumulator for one test: in-window counts and the timestamps of
/// the columns that contributed to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawTestResult {
    pub name: String,
    pub timestamps: Vec<i64>,
    pub successes: usize,
    pub failures: usize,
    pub flakes: usize,
}

impl RawTestResult {
    pub fn total(&self) -> usize {
        self.successes + self.failures + self.flakes
    }
}

/// All raw results for one job. Runs are held in an arena indexed by run URL
/// so updates go through an explicit `&mut` borrow instead of copy-out /
/// write-back on a map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawJobResult {
    pub job_name: String,
    pub test_grid_job_url: String,
    pub query: String,
    pub change_lists: Vec<String>,
    runs: Vec<RawJobRunResult>,
    #[serde(skip)]
    run_index: HashMap<String, usize>,
    pub test_results: BTreeMap<String, RawTestResult>,
}

impl RawJobResult {
    pub fn new(
        job_name: impl Into<String>,
        test_grid_job_url: impl Into<String>,
        query: impl Into<String>,
        change_lists: Vec<String>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            test_grid_job_url: test_grid_job_url.into(),
            query: query.into(),
            change_lists,
            ..Self::default()
        }
    }

    /// Returns the run for `job_run_url`, creating it on first sight.
    pub fn run_entry(&mut self, job_run_url: &str, timestamp: i64) -> &mut RawJobRunResult {
        let index = match self.run_index.get(job_run_url) {
            Some(index) => *index,
            None => {
                let index = self.runs.len();
                self.runs.push(RawJobRunResult::new(
                    self.job_name.clone(),
                    job_run_url,
                    timestamp,
                ));
                self.run_index.insert(job_run_url.to_owned(), index);
                index
            }
        };
        &mut self.runs[index]
    }

    pub fn insert_run(&mut self, run: RawJobRunResult) {
        match self.run_index.get(run.job_run_url.as_str()) {
            Some(index) => self.runs[*index] = run,
            None => {
                self.run_index
                    .insert(run.job_run_url.clone(), self.runs.len());
                self.runs.push(run);
            }
        }
    }

    pub fn run(&self, job_run_url: &str) -> Option<&RawJobRunResult> {
        self.run_index
            .get(job_run_url)
            .map(|index| &self.runs[*index])
    }

    pub fn runs(&self) -> &[RawJobRunResult] {
        &self.runs
    }

    pub fn runs_mut(&mut self) -> &mut [RawJobRunResult] {
        &mut self.runs
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Folds counts into the named test; tests with nothing to add are ignored.
    pub fn add_test_result(
        &mut self,
        name: &str,
        successes: usize,
        failures: usize,
        flakes: usize,
        timestamps: &[i64],
    ) {
        if successes + failures + flakes == 0 {
            return;
        }
        let entry = self
            .test_results
            .entry(name.to_owned())
            .or_insert_with(|| RawTestResult {
                name: name.to_owned(),
                ..RawTestResult::default()
            });
        entry.successes += successes;
        entry.failures += failures;
        entry.flakes += flakes;
        entry.timestamps.extend_from_slice(timestamps);
    }

    /// Rebuilds the run-URL index after deserialization.
    pub fn reindex(&mut self) {
        self.run_index = self
            .runs
            .iter()
            .enumerate()
            .map(|(index, run)| (run.job_run_url.clone(), index))
            .collect();
    }
}

/// Raw results for every job in one window, keyed by job name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawData {
    pub job_results: BTreeMap<String, RawJobResult>,
}
