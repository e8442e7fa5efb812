use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sift_config::ReportConfig;
use sift_core::{JobDetails, RawData, RawJobResult, ReportType, TestReport};
use sift_variants::VariantManager;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};

use crate::aggregate::{AggregateOptions, aggregate};
use crate::bugs::BugLookup;
use crate::extract::{ExtractError, ExtractOptions, Lookback, extract_job};
use crate::synthetic::{derive_job, promotion_warnings};

const TWO_DAY_WINDOW_DAYS: u32 = 2;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no job data was supplied")]
    NoJobData,
    #[error("extraction semaphore closed")]
    SemaphoreClosed,
}

/// Current, previous and optional two-day reports from one refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReportSet {
    pub generated_at: i64,
    pub current: TestReport,
    pub previous: TestReport,
    pub two_day: Option<TestReport>,
}

impl ReportSet {
    pub fn report(&self, report_type: ReportType) -> Option<&TestReport> {
        match report_type {
            ReportType::Current => Some(&self.current),
            ReportType::Previous => Some(&self.previous),
            ReportType::TwoDay => self.two_day.as_ref(),
        }
    }
}

/// Raw data for one window along with the advisory warnings produced while
/// extracting and deriving it.
#[derive(Debug, Clone, Default)]
pub struct WindowData {
    pub raw: RawData,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct ReportGenerator {
    config: ReportConfig,
    variants: Arc<dyn VariantManager>,
    bugs: Arc<dyn BugLookup>,
    concurrency: usize,
    floating_windows: bool,
}

impl ReportGenerator {
    pub fn new(
        config: ReportConfig,
        variants: Arc<dyn VariantManager>,
        bugs: Arc<dyn BugLookup>,
    ) -> Self {
        Self {
            config,
            variants,
            bugs,
            concurrency: 1,
            floating_windows: false,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Anchors windows at each job's newest column instead of the wall clock.
    pub fn with_floating_windows(mut self, floating: bool) -> Self {
        self.floating_windows = floating;
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn current_lookback(&self) -> Lookback {
        self.lookback(0, self.config.current_days)
    }

    pub fn previous_lookback(&self) -> Lookback {
        self.lookback(self.config.current_days, self.config.previous_days)
    }

    pub fn two_day_lookback(&self) -> Lookback {
        self.lookback(0, TWO_DAY_WINDOW_DAYS)
    }

    fn lookback(&self, start_day: u32, num_days: u32) -> Lookback {
        let start_day = i64::from(start_day);
        if self.floating_windows {
            Lookback::new(-1 - start_day, i64::from(num_days))
        } else {
            Lookback::new(start_day, i64::from(num_days))
        }
    }

    fn aggregate_options(&self, num_days: u32) -> AggregateOptions {
        AggregateOptions {
            release: self.config.release.clone(),
            min_runs: self.config.min_runs,
            success_threshold: self.config.success_threshold,
            failure_cluster_threshold: self.config.failure_cluster_threshold,
            num_days,
            frequent_job_multiplier: self.config.frequent_job_multiplier,
        }
    }

    /// Extracts and derives every job for one window, spreading jobs over a
    /// bounded pool of blocking workers. Jobs that fail to extract are
    /// logged and left out.
    pub async fn extract_window(
        &self,
        jobs: Arc<Vec<JobDetails>>,
        lookback: Lookback,
        now_millis: i64,
    ) -> Result<WindowData, AnalysisError> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let options = Arc::new(ExtractOptions::new(self.config.run_url_prefix.clone()));
        let mut join_set = JoinSet::new();
        let mut task_jobs: HashMap<task::Id, usize> = HashMap::with_capacity(jobs.len());

        for index in 0..jobs.len() {
            let jobs = jobs.clone();
            let options = options.clone();
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| AnalysisError::SemaphoreClosed)?;

            let handle = join_set.spawn_blocking(move || {
                let _permit = permit;
                let details = &jobs[index];
                let columns = lookback
                    .time_window(&details.timestamps, now_millis)
                    .columns(&details.timestamps);
                let extracted = extract_job(details, columns, &options).map(|mut job| {
                    let warnings = derive_job(&mut job);
                    (job, warnings)
                });
                (index, extracted)
            });
            task_jobs.insert(handle.id(), index);
        }

        let mut outcomes: Vec<(usize, Result<(RawJobResult, Vec<String>), String>)> =
            Vec::with_capacity(jobs.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, extracted)) => {
                    let extracted = extracted.map_err(|err: ExtractError| err.to_string());
                    outcomes.push((index, extracted));
                }
                Err(err) => {
                    let Some(&index) = task_jobs.get(&err.id()) else {
                        tracing::warn!(error = %err, "extraction task failed for unknown job");
                        continue;
                    };
                    let job = &jobs[index].name;
                    outcomes.push((index, Err(format!("job {job}: extraction task failed: {err}"))));
                }
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);

        let mut window = WindowData::default();
        for (_, outcome) in outcomes {
            match outcome {
                Ok((job, warnings)) => {
                    window.warnings.extend(warnings);
                    if window.raw.job_results.contains_key(&job.job_name) {
                        tracing::warn!(job = %job.job_name, "duplicate job in input, keeping first");
                        continue;
                    }
                    window.raw.job_results.insert(job.job_name.clone(), job);
                }
                Err(error) => {
                    tracing::warn!(error = %error, "skipping job that failed extraction");
                    window.warnings.push(error);
                }
            }
        }

        Ok(window)
    }

    async fn build_report(
        &self,
        report_type: ReportType,
        jobs: Arc<Vec<JobDetails>>,
        lookback: Lookback,
        num_days: u32,
        now_millis: i64,
    ) -> Result<TestReport, AnalysisError> {
        let WindowData { raw, warnings } = self.extract_window(jobs, lookback, now_millis).await?;
        let mut report = aggregate(
            report_type,
            &raw,
            self.variants.as_ref(),
            self.bugs.as_ref(),
            &self.aggregate_options(num_days),
            warnings,
            now_millis,
        );
        if report_type == ReportType::Current {
            let promotion = promotion_warnings(&report.by_variant, now_millis);
            report.analysis_warnings.extend(promotion);
        }
        tracing::info!(
            report = report_type.as_str(),
            jobs = report.by_job.len(),
            tests = report.by_test.len(),
            warnings = report.analysis_warnings.len(),
            "built report"
        );
        Ok(report)
    }

    pub async fn generate(
        &self,
        jobs: Vec<JobDetails>,
        now_millis: i64,
    ) -> Result<ReportSet, AnalysisError> {
        if jobs.is_empty() {
            return Err(AnalysisError::NoJobData);
        }
        let jobs = Arc::new(jobs);

        let current = self
            .build_report(
                ReportType::Current,
                jobs.clone(),
                self.current_lookback(),
                self.config.current_days,
                now_millis,
            )
            .await?;
        let previous = self
            .build_report(
                ReportType::Previous,
                jobs.clone(),
                self.previous_lookback(),
                self.config.previous_days,
                now_millis,
            )
            .await?;
        let two_day = if self.config.two_day_report {
            Some(
                self.build_report(
                    ReportType::TwoDay,
                    jobs,
                    self.two_day_lookback(),
                    TWO_DAY_WINDOW_DAYS,
                    now_millis,
                )
                .await?,
            )
        } else {
            None
        };

        Ok(ReportSet {
            generated_at: now_millis,
            current,
            previous,
            two_day,
        })
    }
}

/// The report set readers see. Refreshes build a new set off to the side
/// and swap it in only once it is complete.
#[derive(Debug, Default)]
pub struct ReportCache {
    current: RwLock<Arc<ReportSet>>,
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<ReportSet> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, reports: ReportSet) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(reports);
    }

    /// Regenerates from `jobs` and publishes the result. On error the
    /// previously published set stays in place.
    pub async fn refresh(
        &self,
        generator: &ReportGenerator,
        jobs: Vec<JobDetails>,
        now_millis: i64,
    ) -> Result<(), AnalysisError> {
        let reports = generator.generate(jobs, now_millis).await?;
        self.replace(reports);
        Ok(())
    }
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use sift_core::{StatusRun, TestDetails, TestStatus};
    use sift_variants::NoVariants;

    use super::*;
    use crate::bugs::NoBugs;
    use crate::extract::MILLIS_PER_DAY;

    fn generator(config: ReportConfig) -> ReportGenerator {
        ReportGenerator::new(config, Arc::new(NoVariants), Arc::new(NoBugs)).with_concurrency(2)
    }

    fn job(name: &str, timestamps: Vec<i64>, overall: &[(TestStatus, usize)]) -> JobDetails {
        let changelists = (0..timestamps.len()).map(|i| i.to_string()).collect();
        JobDetails {
            name: name.to_owned(),
            test_grid_url: String::new(),
            query: format!("logs/{name}"),
            timestamps,
            changelists,
            tests: vec![TestDetails {
                name: "Overall".to_owned(),
                statuses: overall
                    .iter()
                    .map(|(value, count)| StatusRun::new(*value, *count))
                    .collect(),
            }],
        }
    }

    #[tokio::test]
    async fn windows_split_runs_between_current_and_previous() {
        let now = 30 * MILLIS_PER_DAY;
        let timestamps = vec![
            now - MILLIS_PER_DAY,
            now - 2 * MILLIS_PER_DAY,
            now - 9 * MILLIS_PER_DAY,
        ];
        let jobs = vec![job(
            "job-a",
            timestamps,
            &[(TestStatus::Success, 2), (TestStatus::Failure, 1)],
        )];

        let reports = generator(ReportConfig::default())
            .generate(jobs, now)
            .await
            .expect("generate");

        let current = reports.current.find_job("job-a").expect("current job");
        assert_eq!((current.successes, current.failures), (2, 0));
        let previous = reports.previous.find_job("job-a").expect("previous job");
        assert_eq!((previous.successes, previous.failures), (0, 1));
        assert!(reports.two_day.is_none());
    }

    #[tokio::test]
    async fn malformed_jobs_are_dropped_with_a_warning() {
        let now = 30 * MILLIS_PER_DAY;
        let good = job("job-good", vec![now - 1000], &[(TestStatus::Success, 1)]);
        let bad = job("job-bad", vec![now - 1000], &[(TestStatus::Success, 5)]);

        let mut config = ReportConfig::default();
        config.two_day_report = true;
        let reports = generator(config)
            .generate(vec![good, bad], now)
            .await
            .expect("generate");

        assert!(reports.current.find_job("job-good").is_some());
        assert!(reports.current.find_job("job-bad").is_none());
        assert!(
            reports
                .current
                .analysis_warnings
                .iter()
                .any(|warning| warning.contains("job-bad"))
        );
        let two_day = reports.two_day.expect("two-day report");
        assert_eq!(two_day.report_type, ReportType::TwoDay);
    }

    #[tokio::test]
    async fn overflowing_run_counts_only_drop_that_job() {
        let now = 30 * MILLIS_PER_DAY;
        let good = job("job-good", vec![now - 1000], &[(TestStatus::Success, 1)]);
        let bad = job(
            "job-bad",
            vec![now - 1000],
            &[(TestStatus::Success, usize::MAX), (TestStatus::Failure, 2)],
        );

        let mut config = ReportConfig::default();
        config.two_day_report = true;
        let reports = generator(config)
            .generate(vec![good, bad], now)
            .await
            .expect("generate");

        assert!(reports.current.find_job("job-good").is_some());
        for report in [&reports.current, &reports.previous] {
            assert!(report.find_job("job-bad").is_none());
            assert!(
                report
                    .analysis_warnings
                    .iter()
                    .any(|warning| warning.contains("job-bad") && warning.contains("overflow"))
            );
        }
        let two_day = reports.two_day.expect("two-day report");
        assert!(two_day.find_job("job-good").is_some());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_reports() {
        let cache = ReportCache::new();
        let now = 30 * MILLIS_PER_DAY;
        let generator = generator(ReportConfig::default());

        cache
            .refresh(
                &generator,
                vec![job("job-a", vec![now - 1000], &[(TestStatus::Success, 1)])],
                now,
            )
            .await
            .expect("first refresh");
        let before = cache.snapshot();
        assert_eq!(before.generated_at, now);

        let err = cache
            .refresh(&generator, Vec::new(), now + 1)
            .await
            .expect_err("empty input");
        assert!(matches!(err, AnalysisError::NoJobData));
        assert_eq!(cache.snapshot().generated_at, now);
        assert!(Arc::ptr_eq(&before, &cache.snapshot()));
    }

    #[tokio::test]
    async fn floating_windows_follow_the_newest_column() {
        let newest = 5 * MILLIS_PER_DAY;
        let jobs = vec![job(
            "job-a",
            vec![newest, newest - 8 * MILLIS_PER_DAY],
            &[(TestStatus::Failure, 1), (TestStatus::Success, 1)],
        )];
        let reports = generator(ReportConfig::default())
            .with_floating_windows(true)
            .generate(jobs, 100 * MILLIS_PER_DAY)
            .await
            .expect("generate");

        let current = reports.current.find_job("job-a").expect("current job");
        assert_eq!((current.successes, current.failures), (0, 1));
        let previous = reports.previous.find_job("job-a").expect("previous job");
        assert_eq!((previous.successes, previous.failures), (1, 0));
    }
}
