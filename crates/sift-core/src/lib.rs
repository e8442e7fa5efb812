mod identify;
mod raw;
mod report;
mod testgrid;

pub use identify::{
    FINAL_OPERATOR_HEALTH_TEST_NAME, INFRASTRUCTURE_TEST_NAME, INSTALL_OVERALL_TEST_NAME,
    INSTALL_TEST_NAME, MACHINE_CONFIG_POOLS_UPGRADED_TEST_NAME, OPENSHIFT_TESTS_NAME,
    OPERATOR_FINAL_HEALTH_PREFIX, OPERATOR_INSTALL_PREFIX, OPERATOR_UPGRADE_PREFIX,
    OPERATORS_UPGRADED_TEST_NAME, OVERALL_TEST_NAME, SYNTHETIC_TEST_NAMES,
    UPGRADE_STARTED_TEST_NAME, UPGRADE_TEST_NAME, is_install_step_equivalent,
    is_machine_config_pools_upgraded_test, is_non_predictive_test, is_old_install_operator_test,
    is_old_upgrade_operator_test, is_openshift_test, is_operator_health_test,
    is_operators_upgraded_test, is_overall_test, is_synthetic_test, is_upgrade_started_test,
    normalize_test_name, operator_name_from_test,
};
pub use raw::{
    JobRunStatus, OperatorState, PhaseStatus, RawData, RawJobResult, RawJobRunResult,
    RawJobRunTestResult, RawTestResult,
};
pub use report::{
    Bug, JobResult, JobRunResult, ReportType, Statistics, TestJobBreakdown, TestReport,
    TestResult, TestResultAcrossAllJobs, TopLevelIndicators, VariantHealth, VariantResults,
};
pub use testgrid::{JobDetails, SnapshotError, StatusRun, TestDetails, TestStatus, parse_job_details};

pub type JobName = String;

/// `numerator / denominator * 100`, or 0 when there is nothing to divide by.
pub fn percent(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator as f64 / denominator as f64 * 100.0
}

pub fn pass_percentage(successes: usize, failures: usize, flakes: usize) -> f64 {
    percent(successes, successes + failures + flakes)
}

pub fn nan_to_zero(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value }
}
