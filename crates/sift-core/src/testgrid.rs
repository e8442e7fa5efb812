use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status code of a single TestGrid cell, collapsed to the values the
/// aggregation pipeline distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum TestStatus {
    NoResult,
    Success,
    Running,
    Failure,
    Flake,
}

impl TestStatus {
    pub fn code(self) -> i64 {
        match self {
            Self::NoResult => 0,
            Self::Success => 1,
            Self::Running => 4,
            Self::Failure => 12,
            Self::Flake => 13,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoResult => "no_result",
            Self::Success => "success",
            Self::Running => "running",
            Self::Failure => "failure",
            Self::Flake => "flake",
        }
    }
}

impl From<i64> for TestStatus {
    fn from(code: i64) -> Self {
        match code {
            1 => Self::Success,
            4 => Self::Running,
            12 => Self::Failure,
            13 => Self::Flake,
            _ => Self::NoResult,
        }
    }
}

impl From<TestStatus> for i64 {
    fn from(status: TestStatus) -> Self {
        status.code()
    }
}

/// One run-length-encoded segment: `count` consecutive columns sharing `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRun {
    pub count: usize,
    pub value: TestStatus,
}

impl StatusRun {
    pub fn new(value: TestStatus, count: usize) -> Self {
        Self { count, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDetails {
    pub name: String,
    #[serde(default)]
    pub statuses: Vec<StatusRun>,
}

impl TestDetails {
    /// Total columns covered by the runs, or `None` when the counts overflow.
    pub fn encoded_columns(&self) -> Option<usize> {
        self.statuses
            .iter()
            .try_fold(0usize, |total, run| total.checked_add(run.count))
    }
}

/// A job's TestGrid tab: column-aligned timestamps and build identifiers plus
/// one run-length-encoded status row per test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetails {
    pub name: String,
    #[serde(default, alias = "testGridURL", alias = "testGridUrl")]
    pub test_grid_url: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub timestamps: Vec<i64>,
    #[serde(default, alias = "changeLists", alias = "change_lists")]
    pub changelists: Vec<String>,
    #[serde(default)]
    pub tests: Vec<TestDetails>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to parse TestGrid job JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parses either a single job document or an array of job documents.
pub fn parse_job_details(raw: &str) -> Result<Vec<JobDetails>, SnapshotError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<JobDetails>),
        One(Box<JobDetails>),
    }

    let parsed: OneOrMany = serde_json::from_str(raw)?;
    Ok(match parsed {
        OneOrMany::Many(jobs) => jobs,
        OneOrMany::One(job) => vec![*job],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_collapsed_values() {
        assert_eq!(TestStatus::from(1), TestStatus::Success);
        assert_eq!(TestStatus::from(12), TestStatus::Failure);
        assert_eq!(TestStatus::from(13), TestStatus::Flake);
        assert_eq!(TestStatus::from(4), TestStatus::Running);
        assert_eq!(TestStatus::from(7), TestStatus::NoResult);
    }

    #[test]
    fn parse_job_details_accepts_single_and_array_documents() {
        let single = r#"{
            "name": "periodic-ci-openshift-release-master-nightly-4.12-e2e-aws",
            "testGridURL": "https://testgrid.k8s.io/redhat#aws",
            "query": "origin-ci-test/logs/periodic-aws",
            "timestamps": [300, 200],
            "changelists": ["1002", "1001"],
            "tests": [
                {"name": "Overall", "statuses": [{"count": 1, "value": 1}, {"count": 1, "value": 12}]}
            ]
        }"#;
        let jobs = parse_job_details(single).expect("parse single");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].changelists, vec!["1002", "1001"]);
        assert_eq!(jobs[0].tests[0].encoded_columns(), Some(2));
        assert_eq!(jobs[0].tests[0].statuses[1].value, TestStatus::Failure);

        let many = format!("[{single}, {single}]");
        let jobs = parse_job_details(&many).expect("parse array");
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn parse_job_details_rejects_malformed_json() {
        assert!(parse_job_details("{\"name\": 3}").is_err());
    }
}
