use serde::{Deserialize, Serialize};
use sift_core::{
    JobDetails, OperatorState, PhaseStatus, RawJobResult, RawJobRunResult, RawJobRunTestResult,
    TestDetails, TestStatus, is_install_step_equivalent, is_machine_config_pools_upgraded_test,
    is_non_predictive_test, is_openshift_test, is_operator_health_test,
    is_operators_upgraded_test, is_overall_test, is_upgrade_started_test, normalize_test_name,
    operator_name_from_test,
};
use thiserror::Error;

pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error(
        "job {job}: test '{test}' encodes {encoded} columns but only {timestamps} timestamps exist"
    )]
    TimestampsTooShort {
        job: String,
        test: String,
        encoded: usize,
        timestamps: usize,
    },
    #[error(
        "job {job}: test '{test}' encodes {encoded} columns but only {changelists} changelists exist"
    )]
    ChangelistsTooShort {
        job: String,
        test: String,
        encoded: usize,
        changelists: usize,
    },
    #[error("job {job}: test '{test}' has run-length counts that overflow")]
    MalformedEncoding { job: String, test: String },
}

/// A window expressed in days relative to a reference point. With a
/// non-negative `start_day` the reference is "now"; a negative `start_day`
/// floats the window to the newest column timestamp instead, and more
/// negative values step further back from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookback {
    pub start_day: i64,
    pub num_days: i64,
}

impl Lookback {
    pub fn new(start_day: i64, num_days: i64) -> Self {
        Self {
            start_day,
            num_days,
        }
    }

    pub fn is_floating(&self) -> bool {
        self.start_day < 0
    }

    pub fn time_window(&self, timestamps: &[i64], now_millis: i64) -> TimeWindow {
        if self.is_floating() {
            let newest = timestamps.iter().copied().max().unwrap_or(0);
            let anchor = newest + (self.start_day + 1) * MILLIS_PER_DAY;
            // The anchor column itself belongs to the window.
            return TimeWindow::new(anchor - self.num_days * MILLIS_PER_DAY + 1, anchor + 1);
        }

        let end = now_millis - self.start_day * MILLIS_PER_DAY;
        TimeWindow::new(end - self.num_days * MILLIS_PER_DAY, end)
    }
}

/// Half-open `[start_millis, end_millis)` range of column timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_millis: i64,
    pub end_millis: i64,
}

impl TimeWindow {
    pub fn new(start_millis: i64, end_millis: i64) -> Self {
        Self {
            start_millis,
            end_millis,
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start_millis && timestamp < self.end_millis
    }

    /// Column range whose timestamps fall inside the window. Timestamps may
    /// be ascending or descending; the range spans the first through last
    /// in-window column.
    pub fn columns(&self, timestamps: &[i64]) -> ColumnRange {
        let first = timestamps.iter().position(|ts| self.contains(*ts));
        let last = timestamps.iter().rposition(|ts| self.contains(*ts));
        match (first, last) {
            (Some(first), Some(last)) => ColumnRange::new(first, last + 1),
            _ => ColumnRange::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnRange {
    pub start: usize,
    pub end: usize,
}

impl ColumnRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    fn overlap(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        let lo = start.max(self.start);
        let hi = end.min(self.end);
        (lo < hi).then_some((lo, hi))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub run_url_prefix: String,
}

impl ExtractOptions {
    pub fn new(run_url_prefix: impl Into<String>) -> Self {
        Self {
            run_url_prefix: run_url_prefix.into(),
        }
    }

    pub fn run_url(&self, query: &str, changelist: &str) -> String {
        format!(
            "{}/{}/{}",
            self.run_url_prefix.trim_end_matches('/'),
            query.trim_matches('/'),
            changelist
        )
    }
}

/// Decodes one job's TestGrid tab into raw per-run and per-test records for
/// the given column range.
pub fn extract_job(
    details: &JobDetails,
    columns: ColumnRange,
    options: &ExtractOptions,
) -> Result<RawJobResult, ExtractError> {
    validate_columns(details)?;

    let mut job = RawJobResult::new(
        details.name.clone(),
        details.test_grid_url.clone(),
        details.query.clone(),
        details.changelists.clone(),
    );

    for test in &details.tests {
        if !is_overall_test(&test.name)
            && !is_install_step_equivalent(&test.name)
            && is_non_predictive_test(&test.name)
        {
            continue;
        }
        extract_test(&mut job, details, test, columns, options);
    }

    tracing::debug!(
        job = %details.name,
        runs = job.run_count(),
        tests = job.test_results.len(),
        start = columns.start,
        end = columns.end,
        "extracted job"
    );
    Ok(job)
}

fn validate_columns(details: &JobDetails) -> Result<(), ExtractError> {
    for test in &details.tests {
        let encoded = test
            .encoded_columns()
            .ok_or_else(|| ExtractError::MalformedEncoding {
                job: details.name.clone(),
                test: test.name.clone(),
            })?;
        if encoded > details.timestamps.len() {
            return Err(ExtractError::TimestampsTooShort {
                job: details.name.clone(),
                test: test.name.clone(),
                encoded,
                timestamps: details.timestamps.len(),
            });
        }
        if encoded > details.changelists.len() {
            return Err(ExtractError::ChangelistsTooShort {
                job: details.name.clone(),
                test: test.name.clone(),
                encoded,
                changelists: details.changelists.len(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestCategory {
    Overall,
    OperatorHealth,
    InstallStep,
    UpgradeStarted,
    OperatorsUpgraded,
    MachineConfigPoolsUpgraded,
    OpenshiftTest,
    Other,
}

impl TestCategory {
    fn of(name: &str) -> Self {
        if is_overall_test(name) {
            Self::Overall
        } else if is_operator_health_test(name) {
            Self::OperatorHealth
        } else if is_install_step_equivalent(name) {
            Self::InstallStep
        } else if is_upgrade_started_test(name) {
            Self::UpgradeStarted
        } else if is_operators_upgraded_test(name) {
            Self::OperatorsUpgraded
        } else if is_machine_config_pools_upgraded_test(name) {
            Self::MachineConfigPoolsUpgraded
        } else if is_openshift_test(name) {
            Self::OpenshiftTest
        } else {
            Self::Other
        }
    }
}

fn extract_test(
    job: &mut RawJobResult,
    details: &JobDetails,
    test: &TestDetails,
    columns: ColumnRange,
    options: &ExtractOptions,
) {
    let category = TestCategory::of(&test.name);
    let normalized = normalize_test_name(&test.name);
    let (mut successes, mut failures, mut flakes) = (0, 0, 0);
    let mut contributing = Vec::new();

    let mut col: usize = 0;
    for run in &test.statuses {
        let run_start = col;
        let Some(run_end) = col.checked_add(run.count) else {
            break;
        };
        col = run_end;
        if run_start >= columns.end {
            break;
        }
        let Some((lo, hi)) = columns.overlap(run_start, col) else {
            continue;
        };
        if !matches!(
            run.value,
            TestStatus::Success | TestStatus::Flake | TestStatus::Failure
        ) {
            continue;
        }

        for index in lo..hi {
            let timestamp = details.timestamps[index];
            let url = options.run_url(&details.query, &details.changelists[index]);
            let job_run = job.run_entry(&url, timestamp);
            contributing.push(timestamp);

            match run.value {
                TestStatus::Success => successes += 1,
                TestStatus::Flake => flakes += 1,
                _ => failures += 1,
            }
            record_outcome(job_run, category, &test.name, &normalized, run.value);
        }
    }

    job.add_test_result(&normalized, successes, failures, flakes, &contributing);
}

fn record_outcome(
    job_run: &mut RawJobRunResult,
    category: TestCategory,
    raw_name: &str,
    normalized: &str,
    status: TestStatus,
) {
    job_run.test_results.push(RawJobRunTestResult {
        name: normalized.to_owned(),
        status,
    });

    let outcome = if status == TestStatus::Failure {
        if category != TestCategory::Overall {
            job_run.failed_test_names.push(normalized.to_owned());
            job_run.test_failures += 1;
        }
        PhaseStatus::Failure
    } else {
        PhaseStatus::Success
    };

    match category {
        TestCategory::Overall => {
            if outcome.is_failure() {
                job_run.failed = true;
            } else {
                job_run.succeeded = true;
                // A passing job implies a successful install even without an install step.
                job_run.install_status.record(PhaseStatus::Success);
            }
        }
        TestCategory::OperatorHealth => job_run.final_operator_states.push(OperatorState {
            name: operator_name_from_test(raw_name),
            state: outcome,
        }),
        TestCategory::InstallStep => {
            job_run.setup_status.record(outcome);
            job_run.install_status.record(outcome);
        }
        TestCategory::UpgradeStarted => job_run.upgrade_started = true,
        TestCategory::OperatorsUpgraded => job_run.upgrade_for_operators_status.record(outcome),
        TestCategory::MachineConfigPoolsUpgraded => {
            job_run.upgrade_for_machine_config_pools_status.record(outcome)
        }
        TestCategory::OpenshiftTest => job_run.openshift_tests_status.record(outcome),
        TestCategory::Other => {}
    }
}

#[cfg(test)]
mod tests {
    use sift_core::{INSTALL_OVERALL_TEST_NAME, StatusRun};

    use super::*;

    fn details(timestamps: Vec<i64>, tests: Vec<TestDetails>) -> JobDetails {
        let changelists = (0..timestamps.len()).map(|i| format!("{}", 1000 + i)).collect();
        JobDetails {
            name: "periodic-e2e-aws".to_owned(),
            test_grid_url: "https://testgrid.example.com/#aws".to_owned(),
            query: "logs/periodic-e2e-aws".to_owned(),
            timestamps,
            changelists,
            tests,
        }
    }

    fn test(name: &str, runs: &[(TestStatus, usize)]) -> TestDetails {
        TestDetails {
            name: name.to_owned(),
            statuses: runs
                .iter()
                .map(|(value, count)| StatusRun::new(*value, *count))
                .collect(),
        }
    }

    fn options() -> ExtractOptions {
        ExtractOptions::new("https://prow.example.com/view/gcs")
    }

    #[test]
    fn window_selects_columns_by_timestamp_in_either_order() {
        let window = TimeWindow::new(150, 351);
        assert_eq!(
            window.columns(&[100, 200, 300, 400, 500]),
            ColumnRange::new(1, 3)
        );
        assert_eq!(
            window.columns(&[500, 400, 300, 200, 100]),
            ColumnRange::new(2, 4)
        );
        assert!(TimeWindow::new(600, 700).columns(&[100, 200]).is_empty());
    }

    #[test]
    fn floating_lookback_is_anchored_at_newest_column() {
        let day = MILLIS_PER_DAY;
        let timestamps = vec![10 * day, 9 * day, 8 * day, 3 * day];

        let current = Lookback::new(-1, 2).time_window(&timestamps, 0);
        assert_eq!(current.columns(&timestamps), ColumnRange::new(0, 2));

        let previous = Lookback::new(-3, 7).time_window(&timestamps, 0);
        assert_eq!(previous.columns(&timestamps), ColumnRange::new(2, 4));
    }

    #[test]
    fn now_relative_lookback_counts_back_from_now() {
        let day = MILLIS_PER_DAY;
        let now = 20 * day;
        let window = Lookback::new(7, 7).time_window(&[], now);
        assert_eq!(window, TimeWindow::new(6 * day, 13 * day));
    }

    #[test]
    fn runs_straddling_window_edges_are_split_per_column() {
        let job = details(
            vec![100, 200, 300, 400, 500],
            vec![test(
                "[sig-network] pods",
                &[(TestStatus::Success, 2), (TestStatus::Failure, 3)],
            )],
        );
        let raw = extract_job(&job, ColumnRange::new(1, 3), &options()).expect("extract");
        let result = &raw.test_results["[sig-network] pods"];
        assert_eq!((result.successes, result.failures, result.flakes), (1, 1, 0));
        assert_eq!(result.timestamps, vec![200, 300]);
        assert_eq!(raw.run_count(), 2);
    }

    #[test]
    fn tests_that_never_ran_in_window_are_dropped() {
        let job = details(
            vec![100, 200, 300],
            vec![test(
                "[sig-network] pods",
                &[(TestStatus::NoResult, 2), (TestStatus::Success, 1)],
            )],
        );
        let raw = extract_job(&job, ColumnRange::new(0, 2), &options()).expect("extract");
        assert!(raw.test_results.is_empty());
        assert_eq!(raw.run_count(), 0);
    }

    #[test]
    fn non_predictive_tests_are_skipped_unless_needed_for_derivation() {
        let job = details(
            vec![100],
            vec![
                test("Monitor cluster while tests execute", &[(TestStatus::Failure, 1)]),
                test("Overall", &[(TestStatus::Failure, 1)]),
                test(
                    &format!("e2e-aws - {INSTALL_OVERALL_TEST_NAME}"),
                    &[(TestStatus::Success, 1)],
                ),
            ],
        );
        let raw = extract_job(&job, ColumnRange::new(0, 1), &options()).expect("extract");
        assert!(
            !raw.test_results
                .contains_key("Monitor cluster while tests execute")
        );
        let run = &raw.runs()[0];
        assert!(run.failed);
        assert_eq!(run.setup_status, PhaseStatus::Success);
        assert_eq!(run.test_failures, 0);
        assert_eq!(
            run.job_run_url,
            "https://prow.example.com/view/gcs/logs/periodic-e2e-aws/1000"
        );
    }

    #[test]
    fn install_failure_stays_failed_after_later_success() {
        let job = details(
            vec![100],
            vec![
                test("e2e-aws container setup", &[(TestStatus::Failure, 1)]),
                test(
                    &format!("e2e-aws - {INSTALL_OVERALL_TEST_NAME}"),
                    &[(TestStatus::Success, 1)],
                ),
            ],
        );
        let raw = extract_job(&job, ColumnRange::new(0, 1), &options()).expect("extract");
        let run = &raw.runs()[0];
        assert_eq!(run.setup_status, PhaseStatus::Failure);
        assert_eq!(run.install_status, PhaseStatus::Failure);
    }

    #[test]
    fn operator_health_and_upgrade_markers_fill_phase_fields() {
        let job = details(
            vec![100],
            vec![
                test("operator conditions etcd", &[(TestStatus::Failure, 1)]),
                test("Operator upgrade dns", &[(TestStatus::Success, 1)]),
                test(
                    "[sig-cluster-lifecycle] Cluster version operator acknowledges upgrade",
                    &[(TestStatus::Success, 1)],
                ),
                test(
                    "[sig-cluster-lifecycle] Cluster completes upgrade",
                    &[(TestStatus::Failure, 1)],
                ),
                test("[sig-network] pods", &[(TestStatus::Flake, 1)]),
            ],
        );
        let raw = extract_job(&job, ColumnRange::new(0, 1), &options()).expect("extract");
        let run = &raw.runs()[0];
        assert_eq!(run.final_operator_states.len(), 1);
        assert_eq!(run.final_operator_states[0].name, "etcd");
        assert!(run.upgrade_started);
        assert_eq!(run.upgrade_for_operators_status, PhaseStatus::Failure);
        assert_eq!(run.openshift_tests_status, PhaseStatus::Success);
        assert!(raw.test_results.contains_key("operator conditions dns"));
        assert_eq!(raw.test_results["[sig-network] pods"].flakes, 1);
    }

    #[test]
    fn short_timestamp_arrays_are_rejected() {
        let mut job = details(
            vec![100, 200],
            vec![test("[sig-network] pods", &[(TestStatus::Success, 3)])],
        );
        job.changelists.push("extra".to_owned());
        let err = extract_job(&job, ColumnRange::new(0, 2), &options()).expect_err("malformed");
        assert!(matches!(err, ExtractError::TimestampsTooShort { encoded: 3, .. }));
    }

    #[test]
    fn overflowing_run_counts_are_rejected() {
        let job = details(
            vec![100],
            vec![test(
                "[sig-network] pods",
                &[(TestStatus::Success, usize::MAX), (TestStatus::Failure, 2)],
            )],
        );
        let err = extract_job(&job, ColumnRange::new(0, 1), &options()).expect_err("malformed");
        assert_eq!(
            err,
            ExtractError::MalformedEncoding {
                job: "periodic-e2e-aws".to_owned(),
                test: "[sig-network] pods".to_owned(),
            }
        );
    }
}
