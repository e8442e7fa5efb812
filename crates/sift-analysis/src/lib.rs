//! Turns decoded TestGrid job tabs into aggregated test reports.
//!
//! Pipeline: [`extract`] slices each job to a time window and decodes its
//! run-length cells, [`synthetic`] derives run statuses and synthetic phase
//! tests, and [`aggregate`] rolls everything up into a [`sift_core::TestReport`].
//! [`generate`] drives the three over current, previous and two-day windows.

pub mod aggregate;
pub mod bugs;
pub mod extract;
pub mod generate;
pub mod stats;
pub mod synthetic;

pub use aggregate::{AggregateOptions, TestResultFilter, aggregate, failure_groups};
pub use bugs::{BugLookup, NoBugs, StaticBugCache, split_bugs_by_release};
pub use extract::{
    ColumnRange, ExtractError, ExtractOptions, Lookback, MILLIS_PER_DAY, TimeWindow, extract_job,
};
pub use generate::{
    AnalysisError, ReportCache, ReportGenerator, ReportSet, WindowData, now_millis,
};
pub use stats::job_statistics;
pub use synthetic::{derive_all, derive_job, job_run_status, promotion_warnings};
