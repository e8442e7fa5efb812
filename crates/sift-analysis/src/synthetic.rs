use sift_core::{
    FINAL_OPERATOR_HEALTH_TEST_NAME, INFRASTRUCTURE_TEST_NAME, INSTALL_TEST_NAME, JobRunStatus,
    JobRunStatus::*, OPENSHIFT_TESTS_NAME, PhaseStatus, RawData, RawJobResult, RawJobRunResult,
    RawJobRunTestResult, SYNTHETIC_TEST_NAMES, TestStatus, UPGRADE_TEST_NAME, VariantResults,
};
use sift_variants::PROMOTE_TAG;

use crate::extract::MILLIS_PER_DAY;

const PROMOTION_STALE_MILLIS: i64 = MILLIS_PER_DAY / 2;
const PROMOTION_FAILURE_STREAK: usize = 3;

/// Classifies a run from its accumulated phase fields. Rules are a decision
/// list; the first that applies wins.
pub fn job_run_status(run: &RawJobRunResult) -> JobRunStatus {
    if run.succeeded {
        Succeeded
    } else if !run.failed {
        Running
    } else if run.setup_status.is_failure() && run.final_operator_states.is_empty() {
        InfrastructureFailure
    } else if run.setup_status.is_failure() {
        InstallFailure
    } else if run.upgrade_started
        && (run.upgrade_for_operators_status.is_failure()
            || run.upgrade_for_machine_config_pools_status.is_failure())
    {
        UpgradeFailure
    } else if run.openshift_tests_status.is_failure() {
        TestFailure
    } else if !run.setup_status.is_set() {
        NoResults
    } else {
        UnknownFailure
    }
}

/// Synthetic outcomes for one run, `None` where the run says nothing about
/// that signal.
fn synthetic_outcomes(run: &RawJobRunResult) -> [(&'static str, Option<PhaseStatus>); 5] {
    let status = run.overall_status;

    let infrastructure = if status == InfrastructureFailure {
        Some(PhaseStatus::Failure)
    } else if run.succeeded || run.setup_status.is_set() {
        Some(PhaseStatus::Success)
    } else {
        None
    };

    let install = match status {
        InfrastructureFailure => None,
        InstallFailure => Some(PhaseStatus::Failure),
        _ if run.succeeded || run.install_status == PhaseStatus::Success => {
            Some(PhaseStatus::Success)
        }
        _ => None,
    };

    let upgrade = if !run.upgrade_started {
        None
    } else if status == UpgradeFailure {
        Some(PhaseStatus::Failure)
    } else {
        Some(PhaseStatus::Success)
    };

    let openshift_tests = run
        .openshift_tests_status
        .is_set()
        .then_some(run.openshift_tests_status);

    let operator_health = if run.final_operator_states.is_empty() {
        None
    } else if run
        .final_operator_states
        .iter()
        .any(|state| state.state.is_failure())
    {
        Some(PhaseStatus::Failure)
    } else {
        Some(PhaseStatus::Success)
    };

    [
        (INFRASTRUCTURE_TEST_NAME, infrastructure),
        (INSTALL_TEST_NAME, install),
        (UPGRADE_TEST_NAME, upgrade),
        (OPENSHIFT_TESTS_NAME, openshift_tests),
        (FINAL_OPERATOR_HEALTH_TEST_NAME, operator_health),
    ]
}

/// Derives run statuses and synthetic tests for one job in place. Job-level
/// synthetic counts are rebuilt from the runs, so deriving twice is a no-op.
/// Returns advisory warnings about contradictory run data.
pub fn derive_job(job: &mut RawJobResult) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut totals = SYNTHETIC_TEST_NAMES.map(|name| (name, 0usize, 0usize, Vec::new()));

    for run in job.runs_mut() {
        if run.succeeded && run.failed {
            warnings.push(format!(
                "job run {} reported both success and failure for its overall result",
                run.job_run_url
            ));
        }
        run.overall_status = job_run_status(run);

        for (index, (name, outcome)) in synthetic_outcomes(run).into_iter().enumerate() {
            let Some(outcome) = outcome else {
                continue;
            };
            let failed = outcome.is_failure();
            let (_, successes, failures, timestamps) = &mut totals[index];
            if failed {
                *failures += 1;
            } else {
                *successes += 1;
            }
            timestamps.push(run.timestamp);

            if run.has_test_result(name) {
                continue;
            }
            run.test_results.push(RawJobRunTestResult {
                name: name.to_owned(),
                status: if failed {
                    TestStatus::Failure
                } else {
                    TestStatus::Success
                },
            });
            if failed {
                run.failed_test_names.push(name.to_owned());
                run.test_failures += 1;
            }
        }
    }

    for name in SYNTHETIC_TEST_NAMES {
        job.test_results.remove(name);
    }
    for (name, successes, failures, timestamps) in totals {
        job.add_test_result(name, successes, failures, 0, &timestamps);
    }

    warnings
}

pub fn derive_all(raw: &mut RawData) -> Vec<String> {
    raw.job_results
        .values_mut()
        .flat_map(derive_job)
        .collect()
}

/// Advisory warnings for promotion jobs that went stale or keep failing.
pub fn promotion_warnings(by_variant: &[VariantResults], now_millis: i64) -> Vec<String> {
    let Some(promote) = by_variant
        .iter()
        .find(|variant| variant.variant_name == PROMOTE_TAG)
    else {
        return Vec::new();
    };

    let stale_before = now_millis - PROMOTION_STALE_MILLIS;
    let mut warnings = Vec::new();
    for job in &promote.job_results {
        let Some(latest) = job.all_runs.first() else {
            continue;
        };
        if latest.timestamp < stale_before {
            warnings.push(format!(
                "The last run of {} ({}) was more than 12 hours ago.",
                job.name, latest.url
            ));
        }

        if job.all_runs.len() < PROMOTION_FAILURE_STREAK {
            continue;
        }
        let recent = &job.all_runs[..PROMOTION_FAILURE_STREAK];
        if recent.iter().all(|run| run.overall_result != Succeeded) {
            let links = recent
                .iter()
                .map(|run| run.url.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            warnings.push(format!(
                "The last three promotion jobs for {} failed: {links}",
                job.name
            ));
        }
    }
    warnings
}
