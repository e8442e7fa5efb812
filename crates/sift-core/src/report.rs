use serde::{Deserialize, Serialize};

use crate::raw::JobRunStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    #[default]
    Current,
    Previous,
    TwoDay,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Previous => "previous",
            Self::TwoDay => "two_day",
        }
    }
}

impl std::str::FromStr for ReportType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "current" => Ok(Self::Current),
            "previous" => Ok(Self::Previous),
            "two_day" | "twoDay" => Ok(Self::TwoDay),
            other => Err(format!(
                "invalid report type '{other}', expected one of: current, previous, two_day"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Bug {
    pub url: String,
    pub summary: String,
    #[serde(default)]
    pub target_release: Vec<String>,
    #[serde(default)]
    pub failure_count: usize,
    #[serde(default)]
    pub flake_count: usize,
}

impl Bug {
    /// A bug with no target release applies to every release.
    pub fn applies_to(&self, release: &str) -> bool {
        self.target_release.is_empty()
            || self
                .target_release
                .iter()
                .any(|target| target == release || target == "---")
    }
}

/// A test's results inside a single job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TestResult {
    pub name: String,
    pub successes: usize,
    pub failures: usize,
    pub flakes: usize,
    pub pass_percentage: f64,
    pub bugs: Vec<Bug>,
    pub associated_bugs: Vec<Bug>,
}

impl TestResult {
    pub fn runs(&self) -> usize {
        self.successes + self.failures + self.flakes
    }
}

/// How one job contributed to a test's totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TestJobBreakdown {
    pub job_name: String,
    pub test_grid_url: String,
    pub successes: usize,
    pub failures: usize,
    pub flakes: usize,
    pub pass_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TestResultAcrossAllJobs {
    pub name: String,
    pub successes: usize,
    pub failures: usize,
    pub flakes: usize,
    pub pass_percentage: f64,
    pub bugs: Vec<Bug>,
    pub associated_bugs: Vec<Bug>,
    pub by_job: Vec<TestJobBreakdown>,
}

impl TestResultAcrossAllJobs {
    pub fn runs(&self) -> usize {
        self.successes + self.failures + self.flakes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobRunResult {
    pub job: String,
    pub url: String,
    pub test_failures: usize,
    pub failed_test_names: Vec<String>,
    pub failed: bool,
    pub succeeded: bool,
    pub overall_result: JobRunStatus,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobResult {
    pub name: String,
    pub variants: Vec<String>,
    pub test_grid_url: String,
    pub successes: usize,
    pub failures: usize,
    pub infrastructure_failures: usize,
    pub known_failures: usize,
    pub pass_percentage: f64,
    pub pass_percentage_without_infrastructure_failures: f64,
    pub pass_percentage_with_known_failures: f64,
    pub test_results: Vec<TestResult>,
    /// Most recent run first.
    pub all_runs: Vec<JobRunResult>,
    pub bugs: Vec<Bug>,
    pub associated_bugs: Vec<Bug>,
}

impl JobResult {
    pub fn runs(&self) -> usize {
        self.successes + self.failures
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VariantResults {
    pub variant_name: String,
    pub job_results: Vec<JobResult>,
    pub successes: usize,
    pub failures: usize,
    pub pass_percentage: f64,
    /// Unweighted mean of the member jobs' pass percentages.
    pub mean_job_pass_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VariantHealth {
    pub success: usize,
    pub unstable: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Statistics {
    pub mean: f64,
    pub standard_deviation: f64,
    pub quartiles: Vec<f64>,
    pub p95: f64,
    pub histogram: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TopLevelIndicators {
    pub infrastructure: TestResultAcrossAllJobs,
    pub install: TestResultAcrossAllJobs,
    pub upgrade: TestResultAcrossAllJobs,
    pub tests: TestResultAcrossAllJobs,
    pub final_operator_health: TestResultAcrossAllJobs,
    pub variant: VariantHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TestReport {
    pub report_type: ReportType,
    pub release: String,
    /// Unix millis at which the report was generated.
    pub timestamp: i64,
    pub job_statistics: Statistics,
    pub top_level_indicators: TopLevelIndicators,
    pub by_test: Vec<TestResultAcrossAllJobs>,
    pub by_job: Vec<JobResult>,
    pub by_variant: Vec<VariantResults>,
    pub failure_groups: Vec<JobRunResult>,
    pub frequent_job_results: Vec<JobResult>,
    pub infrequent_job_results: Vec<JobResult>,
    pub bugs_by_failure_count: Vec<Bug>,
    pub top_failing_tests_with_bug: Vec<TestResultAcrossAllJobs>,
    pub top_failing_tests_without_bug: Vec<TestResultAcrossAllJobs>,
    pub analysis_warnings: Vec<String>,
}

impl TestReport {
    pub fn find_job(&self, name: &str) -> Option<&JobResult> {
        self.by_job.iter().find(|job| job.name == name)
    }

    pub fn find_test(&self, name: &str) -> Option<&TestResultAcrossAllJobs> {
        self.by_test.iter().find(|test| test.name == name)
    }

    pub fn find_variant(&self, name: &str) -> Option<&VariantResults> {
        self.by_variant
            .iter()
            .find(|variant| variant.variant_name == name)
    }
}
