use sift_core::{JobResult, TestJobBreakdown, TestReport, TestResultAcrossAllJobs};
use sift_store::{RollupStore, SqliteRollupStore, rollups_from_reports};
use tempfile::tempdir;

const TEST_NAME: &str = "[sig-network] pods should work";

fn breakdown(job: &str, successes: usize, failures: usize) -> TestJobBreakdown {
    TestJobBreakdown {
        job_name: job.to_owned(),
        successes,
        failures,
        ..TestJobBreakdown::default()
    }
}

fn report(jobs: &[(&str, &[&str])], by_job: Vec<TestJobBreakdown>) -> TestReport {
    TestReport {
        release: "4.12".to_owned(),
        by_job: jobs
            .iter()
            .map(|(name, variants)| JobResult {
                name: (*name).to_owned(),
                variants: variants.iter().map(|variant| (*variant).to_owned()).collect(),
                ..JobResult::default()
            })
            .collect(),
        by_test: vec![TestResultAcrossAllJobs {
            name: TEST_NAME.to_owned(),
            by_job,
            ..TestResultAcrossAllJobs::default()
        }],
        ..TestReport::default()
    }
}

#[test]
fn persisted_report_answers_exclusion_queries() {
    let current = report(
        &[("e2e-aws", &["aws", "ovn"]), ("e2e-gcp", &["gcp", "sdn"])],
        vec![breakdown("e2e-aws", 6, 4), breakdown("e2e-gcp", 10, 0)],
    );
    let previous = report(&[("e2e-aws", &["aws", "ovn"])], vec![breakdown("e2e-aws", 8, 2)]);

    let rows = rollups_from_reports(&current, &previous);
    assert_eq!(rows.len(), 2);
    let gcp = rows
        .iter()
        .find(|row| row.job_name == "e2e-gcp")
        .expect("gcp rollup");
    assert_eq!(gcp.previous_runs(), 0);
    assert_eq!(gcp.variants, vec!["gcp".to_owned(), "sdn".to_owned()]);

    let temp = tempdir().expect("tempdir");
    let mut store = SqliteRollupStore::open(temp.path()).expect("open store");
    assert_eq!(store.replace_release("4.12", &rows).expect("persist"), 2);

    let without_gcp = store
        .test_report_excluding_variants("4.12", TEST_NAME, &["gcp".to_owned()])
        .expect("query")
        .expect("summary");
    assert_eq!(without_gcp.current_runs, 10);
    assert!((without_gcp.current_pass_percentage - 60.0).abs() < 1e-9);
    assert!((without_gcp.net_improvement + 20.0).abs() < 1e-9);

    // Replacing a release drops rows that are no longer reported.
    store
        .replace_release("4.12", &rows[..1])
        .expect("replace");
    assert_eq!(
        store
            .rollups_for_test("4.12", TEST_NAME)
            .expect("rollups")
            .len(),
        1
    );

    let reopened = SqliteRollupStore::open(temp.path()).expect("reopen store");
    assert_eq!(
        reopened
            .rollups_for_test("4.12", TEST_NAME)
            .expect("rollups")
            .len(),
        1
    );
}
