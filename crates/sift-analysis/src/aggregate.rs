use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use sift_core::{
    Bug, FINAL_OPERATOR_HEALTH_TEST_NAME, INFRASTRUCTURE_TEST_NAME, INSTALL_TEST_NAME,
    JobResult, JobRunResult, JobRunStatus, OPENSHIFT_TESTS_NAME, RawData, RawJobResult,
    RawJobRunResult, ReportType, TestJobBreakdown, TestReport, TestResult,
    TestResultAcrossAllJobs, TopLevelIndicators, UPGRADE_TEST_NAME, VariantHealth,
    VariantResults, is_overall_test, is_synthetic_test, nan_to_zero, pass_percentage, percent,
};
use sift_variants::{
    ClusterMetadata, NEVER_STABLE_TAG, TECHPREVIEW_TAG, VariantManager, VariantSet,
};

use crate::bugs::{BugLookup, split_bugs_by_release};
use crate::stats::job_statistics;

/// Infrequent jobs only need this many runs for a test to be listed.
pub const RELAXED_MIN_RUNS: usize = 2;
const VARIANT_SUCCESS_PERCENTAGE: f64 = 80.0;
const VARIANT_UNSTABLE_PERCENTAGE: f64 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOptions {
    pub release: String,
    pub min_runs: usize,
    pub success_threshold: f64,
    /// Negative disables failure grouping.
    pub failure_cluster_threshold: i64,
    pub num_days: u32,
    pub frequent_job_multiplier: f64,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            release: String::new(),
            min_runs: 7,
            success_threshold: 99.99,
            failure_cluster_threshold: 10,
            num_days: 7,
            frequent_job_multiplier: 1.5,
        }
    }
}

/// Decides whether a test is interesting enough for failing-test views: it
/// must have run often enough and not be near-perfect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestResultFilter {
    pub min_runs: usize,
    pub success_threshold: f64,
}

impl TestResultFilter {
    pub fn standard(min_runs: usize, success_threshold: f64) -> Self {
        Self {
            min_runs,
            success_threshold,
        }
    }

    pub fn accepts(&self, runs: usize, pass_percentage: f64) -> bool {
        runs >= self.min_runs && pass_percentage < self.success_threshold
    }

    pub fn accepts_test(&self, test: &TestResult) -> bool {
        self.accepts(test.runs(), test.pass_percentage)
    }

    pub fn accepts_across_jobs(&self, test: &TestResultAcrossAllJobs) -> bool {
        self.accepts(test.runs(), test.pass_percentage)
    }
}

fn by_pass_percentage_then_name(
    left_pct: f64,
    left_name: &str,
    right_pct: f64,
    right_name: &str,
) -> Ordering {
    left_pct
        .partial_cmp(&right_pct)
        .unwrap_or(Ordering::Equal)
        .then_with(|| left_name.cmp(right_name))
}

/// Variant lookup per job, computed once per report.
pub fn classify_jobs(
    raw: &RawData,
    variants: &dyn VariantManager,
    release: &str,
) -> HashMap<String, VariantSet> {
    raw.job_results
        .keys()
        .map(|name| {
            let set = variants.identify_variants(name, release, &ClusterMetadata::default());
            (name.clone(), set)
        })
        .collect::<HashMap<_, _>>()
}

fn is_excluded_from_indicators(set: Option<&VariantSet>) -> bool {
    set.is_some_and(|set| set.is_never_stable() || set.is_techpreview())
}

pub fn convert_job_run(run: &RawJobRunResult) -> JobRunResult {
    JobRunResult {
        job: run.job.clone(),
        url: run.job_run_url.clone(),
        test_failures: run.test_failures,
        failed_test_names: run.failed_test_names.clone(),
        failed: run.failed,
        succeeded: run.succeeded,
        overall_result: run.overall_status,
        timestamp: run.timestamp,
    }
}

fn lookup_test_bugs(bugs: &dyn BugLookup, name: &str, release: &str) -> (Vec<Bug>, Vec<Bug>) {
    split_bugs_by_release(bugs.bugs_for_test(name), release)
}

/// Builds the per-job view of one raw job.
pub fn convert_job(
    raw_job: &RawJobResult,
    variants: &VariantSet,
    bugs: &dyn BugLookup,
    release: &str,
) -> JobResult {
    let mut test_results = raw_job
        .test_results
        .values()
        .filter(|test| !is_overall_test(&test.name))
        .map(|test| {
            let (test_bugs, associated_bugs) = lookup_test_bugs(bugs, &test.name, release);
            TestResult {
                name: test.name.clone(),
                successes: test.successes,
                failures: test.failures,
                flakes: test.flakes,
                pass_percentage: pass_percentage(test.successes, test.failures, test.flakes),
                bugs: test_bugs,
                associated_bugs,
            }
        })
        .collect::<Vec<_>>();
    test_results.sort_by(|left, right| {
        by_pass_percentage_then_name(
            left.pass_percentage,
            &left.name,
            right.pass_percentage,
            &right.name,
        )
    });

    let mut all_runs = raw_job.runs().iter().map(convert_job_run).collect::<Vec<_>>();
    all_runs.sort_by(|left, right| {
        right
            .timestamp
            .cmp(&left.timestamp)
            .then_with(|| left.url.cmp(&right.url))
    });

    let successes = all_runs.iter().filter(|run| run.succeeded).count();
    let failures = all_runs
        .iter()
        .filter(|run| run.failed && !run.succeeded)
        .count();
    let infrastructure_failures = all_runs
        .iter()
        .filter(|run| run.overall_result == JobRunStatus::InfrastructureFailure)
        .count();
    let known_failures = all_runs
        .iter()
        .filter(|run| run.failed && !run.succeeded && is_known_failure(run, bugs, release))
        .count();

    let (job_bugs, associated_bugs) =
        split_bugs_by_release(bugs.bugs_for_job(&raw_job.job_name), release);
    let runs = successes + failures;

    JobResult {
        name: raw_job.job_name.clone(),
        variants: variants.tags(),
        test_grid_url: raw_job.test_grid_job_url.clone(),
        successes,
        failures,
        infrastructure_failures,
        known_failures,
        pass_percentage: percent(successes, runs),
        pass_percentage_without_infrastructure_failures: percent(
            successes + infrastructure_failures,
            runs,
        ),
        pass_percentage_with_known_failures: percent(successes + known_failures, runs),
        test_results,
        all_runs,
        bugs: job_bugs,
        associated_bugs,
    }
}

/// A failed run is "known" when every failed test has an applicable bug.
fn is_known_failure(run: &JobRunResult, bugs: &dyn BugLookup, release: &str) -> bool {
    let mut failed_tests = run
        .failed_test_names
        .iter()
        .filter(|name| !is_synthetic_test(name))
        .peekable();
    failed_tests.peek().is_some()
        && failed_tests.all(|name| {
            bugs.bugs_for_test(name)
                .iter()
                .any(|bug| bug.applies_to(release))
        })
}

/// Folds every job's test results into one record per test name.
pub fn aggregate_tests(
    by_job: &[JobResult],
    bugs: &dyn BugLookup,
    release: &str,
) -> Vec<TestResultAcrossAllJobs> {
    let mut by_name: BTreeMap<String, TestResultAcrossAllJobs> = BTreeMap::new();
    for job in by_job {
        for test in &job.test_results {
            let entry = by_name
                .entry(test.name.clone())
                .or_insert_with(|| TestResultAcrossAllJobs {
                    name: test.name.clone(),
                    ..TestResultAcrossAllJobs::default()
                });
            entry.successes += test.successes;
            entry.failures += test.failures;
            entry.flakes += test.flakes;
            entry.by_job.push(TestJobBreakdown {
                job_name: job.name.clone(),
                test_grid_url: job.test_grid_url.clone(),
                successes: test.successes,
                failures: test.failures,
                flakes: test.flakes,
                pass_percentage: test.pass_percentage,
            });
        }
    }

    let mut results = by_name
        .into_values()
        .map(|mut test| {
            test.pass_percentage = pass_percentage(test.successes, test.failures, test.flakes);
            let (test_bugs, associated_bugs) = lookup_test_bugs(bugs, &test.name, release);
            test.bugs = test_bugs;
            test.associated_bugs = associated_bugs;
            test.by_job.sort_by(|left, right| {
                right
                    .failures
                    .cmp(&left.failures)
                    .then_with(|| left.job_name.cmp(&right.job_name))
            });
            test
        })
        .collect::<Vec<_>>();
    results.sort_by(|left, right| {
        by_pass_percentage_then_name(
            left.pass_percentage,
            &left.name,
            right.pass_percentage,
            &right.name,
        )
    });
    results
}

/// Sums one test across jobs, leaving out never-stable and techpreview jobs.
fn indicator(
    by_job: &[JobResult],
    job_variants: &HashMap<String, VariantSet>,
    test_name: &str,
    bugs: &dyn BugLookup,
    release: &str,
) -> TestResultAcrossAllJobs {
    let eligible = by_job
        .iter()
        .filter(|job| !is_excluded_from_indicators(job_variants.get(&job.name)))
        .filter_map(|job| {
            job.test_results
                .iter()
                .find(|test| test.name == test_name)
                .map(|test| (job, test))
        })
        .map(|(job, test)| JobResult {
            name: job.name.clone(),
            test_grid_url: job.test_grid_url.clone(),
            test_results: vec![test.clone()],
            ..JobResult::default()
        })
        .collect::<Vec<_>>();

    aggregate_tests(&eligible, bugs, release)
        .into_iter()
        .next()
        .unwrap_or_else(|| TestResultAcrossAllJobs {
            name: test_name.to_owned(),
            ..TestResultAcrossAllJobs::default()
        })
}

fn group_by_variant(by_job: &[JobResult], filter: TestResultFilter) -> Vec<VariantResults> {
    let mut groups: BTreeMap<String, Vec<JobResult>> = BTreeMap::new();
    for job in by_job {
        for tag in &job.variants {
            let mut member = job.clone();
            member.test_results.retain(|test| filter.accepts_test(test));
            groups.entry(tag.clone()).or_default().push(member);
        }
    }

    let mut variants = groups
        .into_iter()
        .map(|(variant_name, job_results)| {
            let successes = job_results.iter().map(|job| job.successes).sum::<usize>();
            let failures = job_results.iter().map(|job| job.failures).sum::<usize>();
            let mean = job_results.iter().map(|job| job.pass_percentage).sum::<f64>()
                / job_results.len() as f64;
            VariantResults {
                variant_name,
                job_results,
                successes,
                failures,
                pass_percentage: percent(successes, successes + failures),
                mean_job_pass_percentage: nan_to_zero(mean),
            }
        })
        .collect::<Vec<_>>();
    variants.sort_by(|left, right| {
        by_pass_percentage_then_name(
            left.mean_job_pass_percentage,
            &left.variant_name,
            right.mean_job_pass_percentage,
            &right.variant_name,
        )
    });
    variants
}

fn variant_health(by_variant: &[VariantResults]) -> VariantHealth {
    let mut health = VariantHealth::default();
    for variant in by_variant {
        if variant.variant_name == NEVER_STABLE_TAG || variant.variant_name == TECHPREVIEW_TAG {
            continue;
        }
        if variant.mean_job_pass_percentage > VARIANT_SUCCESS_PERCENTAGE {
            health.success += 1;
        } else if variant.mean_job_pass_percentage > VARIANT_UNSTABLE_PERCENTAGE {
            health.unstable += 1;
        } else {
            health.failed += 1;
        }
    }
    health
}

/// Runs with at least `threshold` failed tests, most failures first.
/// A negative threshold disables grouping.
pub fn failure_groups(raw: &RawData, threshold: i64) -> Vec<JobRunResult> {
    let Ok(threshold) = usize::try_from(threshold) else {
        return Vec::new();
    };

    let mut groups = raw
        .job_results
        .values()
        .flat_map(|job| job.runs())
        .filter(|run| run.test_failures >= threshold)
        .map(convert_job_run)
        .collect::<Vec<_>>();
    groups.sort_by(|left, right| right.test_failures.cmp(&left.test_failures));
    groups
}

/// Attributes each test's failures and flakes in full to every linked bug.
pub fn bugs_by_failure_count(by_test: &[TestResultAcrossAllJobs]) -> Vec<Bug> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, Bug> = HashMap::new();
    for test in by_test {
        for bug in &test.bugs {
            let entry = totals.entry(bug.url.clone()).or_insert_with(|| {
                order.push(bug.url.clone());
                Bug {
                    failure_count: 0,
                    flake_count: 0,
                    ..bug.clone()
                }
            });
            entry.failure_count += test.failures;
            entry.flake_count += test.flakes;
        }
    }

    let mut bugs = order
        .into_iter()
        .filter_map(|url| totals.remove(&url))
        .collect::<Vec<_>>();
    bugs.sort_by(|left, right| right.failure_count.cmp(&left.failure_count));
    bugs
}

fn partition_jobs_by_frequency(
    by_job: &[JobResult],
    options: &AggregateOptions,
    standard: TestResultFilter,
) -> (Vec<JobResult>, Vec<JobResult>) {
    let frequent_runs = f64::from(options.num_days) * options.frequent_job_multiplier;
    let relaxed = TestResultFilter::standard(RELAXED_MIN_RUNS, options.success_threshold);

    let mut frequent = Vec::new();
    let mut infrequent = Vec::new();
    for job in by_job {
        let mut job = job.clone();
        if job.runs() as f64 >= frequent_runs {
            job.test_results.retain(|test| standard.accepts_test(test));
            frequent.push(job);
        } else {
            job.test_results.retain(|test| relaxed.accepts_test(test));
            infrequent.push(job);
        }
    }
    (frequent, infrequent)
}

/// Builds a complete report for one window from derived raw data.
pub fn aggregate(
    report_type: ReportType,
    raw: &RawData,
    variants: &dyn VariantManager,
    bugs: &dyn BugLookup,
    options: &AggregateOptions,
    analysis_warnings: Vec<String>,
    timestamp: i64,
) -> TestReport {
    let job_variants = classify_jobs(raw, variants, &options.release);
    let unclassified = VariantSet::default();

    let mut by_job = raw
        .job_results
        .values()
        .map(|raw_job| {
            let set = job_variants.get(&raw_job.job_name).unwrap_or(&unclassified);
            convert_job(raw_job, set, bugs, &options.release)
        })
        .collect::<Vec<_>>();
    by_job.sort_by(|left, right| {
        by_pass_percentage_then_name(
            left.pass_percentage,
            &left.name,
            right.pass_percentage,
            &right.name,
        )
    });

    let standard = TestResultFilter::standard(options.min_runs, options.success_threshold);
    let by_test = aggregate_tests(&by_job, bugs, &options.release);

    let stable_pass_percentages = by_job
        .iter()
        .filter(|job| !is_excluded_from_indicators(job_variants.get(&job.name)))
        .map(|job| job.pass_percentage)
        .collect::<Vec<_>>();
    let job_statistics = job_statistics(&stable_pass_percentages);

    let by_variant = group_by_variant(&by_job, standard);
    let indicator_for = |test_name: &str| {
        indicator(&by_job, &job_variants, test_name, bugs, &options.release)
    };
    let top_level_indicators = TopLevelIndicators {
        infrastructure: indicator_for(INFRASTRUCTURE_TEST_NAME),
        install: indicator_for(INSTALL_TEST_NAME),
        upgrade: indicator_for(UPGRADE_TEST_NAME),
        tests: indicator_for(OPENSHIFT_TESTS_NAME),
        final_operator_health: indicator_for(FINAL_OPERATOR_HEALTH_TEST_NAME),
        variant: variant_health(&by_variant),
    };

    let (frequent_job_results, infrequent_job_results) =
        partition_jobs_by_frequency(&by_job, options, standard);

    let failing = by_test
        .iter()
        .filter(|test| standard.accepts_across_jobs(test));
    let (top_failing_tests_with_bug, top_failing_tests_without_bug): (Vec<_>, Vec<_>) = failing
        .cloned()
        .partition(|test| !test.bugs.is_empty());

    TestReport {
        report_type,
        release: options.release.clone(),
        timestamp,
        job_statistics,
        top_level_indicators,
        failure_groups: failure_groups(raw, options.failure_cluster_threshold),
        bugs_by_failure_count: bugs_by_failure_count(&by_test),
        by_test,
        by_job,
        by_variant,
        frequent_job_results,
        infrequent_job_results,
        top_failing_tests_with_bug,
        top_failing_tests_without_bug,
        analysis_warnings,
    }
}
