use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sift_core::{Bug, JobResult, TestResultAcrossAllJobs, VariantResults};

use crate::filter::{ColumnType, Filterable};

pub const UPGRADE_TAG: &str = "upgrade";

static BRIEF_NAME_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"periodic-ci-openshift-(multiarch|release)-master-(ci|nightly)-[0-9]+\.[0-9]+-")
        .expect("brief name regex is valid")
});

/// Drops the long periodic prefix so the distinguishing part of a job name
/// fits in a table column.
pub fn brief_name(job_name: &str) -> String {
    BRIEF_NAME_PREFIX.replace_all(job_name, "").into_owned()
}

fn job_tags(job_name: &str) -> Vec<String> {
    if job_name.contains("-upgrade") {
        vec![UPGRADE_TAG.to_owned()]
    } else {
        Vec::new()
    }
}

fn test_tags(test_name: &str) -> Vec<String> {
    if test_name.to_ascii_lowercase().contains(UPGRADE_TAG) {
        vec![UPGRADE_TAG.to_owned()]
    } else {
        Vec::new()
    }
}

fn index_by_name<'a, T>(items: &'a [T], name: impl Fn(&T) -> &str) -> HashMap<&'a str, &'a T> {
    items.iter().map(|item| (name(item), item)).collect::<HashMap<_, _>>()
}

/// A job in the current window paired with its comparison window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobRow {
    pub id: usize,
    pub name: String,
    pub brief_name: String,
    pub variants: Vec<String>,
    pub current_pass_percentage: f64,
    pub current_projected_pass_percentage: f64,
    pub current_runs: usize,
    pub previous_pass_percentage: f64,
    pub previous_projected_pass_percentage: f64,
    pub previous_runs: usize,
    pub net_improvement: f64,
    pub tags: Vec<String>,
    pub test_grid_url: String,
    pub bugs: Vec<Bug>,
    pub associated_bugs: Vec<Bug>,
}

/// Jobs without a comparison record report zero previous runs and no
/// improvement.
pub fn job_rows(current: &[JobResult], previous: &[JobResult]) -> Vec<JobRow> {
    let previous = index_by_name(previous, |job| job.name.as_str());
    current
        .iter()
        .enumerate()
        .map(|(id, job)| {
            let mut row = JobRow {
                id,
                name: job.name.clone(),
                brief_name: brief_name(&job.name),
                variants: job.variants.clone(),
                current_pass_percentage: job.pass_percentage,
                current_projected_pass_percentage: job
                    .pass_percentage_without_infrastructure_failures,
                current_runs: job.runs(),
                tags: job_tags(&job.name),
                test_grid_url: job.test_grid_url.clone(),
                bugs: job.bugs.clone(),
                associated_bugs: job.associated_bugs.clone(),
                ..JobRow::default()
            };
            if let Some(prev) = previous.get(job.name.as_str()) {
                row.previous_pass_percentage = prev.pass_percentage;
                row.previous_projected_pass_percentage =
                    prev.pass_percentage_without_infrastructure_failures;
                row.previous_runs = prev.runs();
                row.net_improvement = job.pass_percentage - prev.pass_percentage;
            }
            row
        })
        .collect()
}

impl Filterable for JobRow {
    fn column_type(field: &str) -> Option<ColumnType> {
        match field {
            "name" | "brief_name" | "briefName" | "test_grid_url" => Some(ColumnType::String),
            "variants" | "tags" => Some(ColumnType::Array),
            "id"
            | "current_pass_percentage"
            | "current_projected_pass_percentage"
            | "current_runs"
            | "previous_pass_percentage"
            | "previous_projected_pass_percentage"
            | "previous_runs"
            | "net_improvement"
            | "bugs"
            | "associated_bugs" => Some(ColumnType::Numerical),
            _ => None,
        }
    }

    fn string_value(&self, field: &str) -> Option<&str> {
        match field {
            "name" => Some(&self.name),
            "brief_name" | "briefName" => Some(&self.brief_name),
            "test_grid_url" => Some(&self.test_grid_url),
            _ => None,
        }
    }

    fn numerical_value(&self, field: &str) -> Option<f64> {
        match field {
            "id" => Some(self.id as f64),
            "current_pass_percentage" => Some(self.current_pass_percentage),
            "current_projected_pass_percentage" => Some(self.current_projected_pass_percentage),
            "current_runs" => Some(self.current_runs as f64),
            "previous_pass_percentage" => Some(self.previous_pass_percentage),
            "previous_projected_pass_percentage" => Some(self.previous_projected_pass_percentage),
            "previous_runs" => Some(self.previous_runs as f64),
            "net_improvement" => Some(self.net_improvement),
            "bugs" => Some(self.bugs.len() as f64),
            "associated_bugs" => Some(self.associated_bugs.len() as f64),
            _ => None,
        }
    }

    fn array_value(&self, field: &str) -> Option<&[String]> {
        match field {
            "variants" => Some(&self.variants),
            "tags" => Some(&self.tags),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TestRow {
    pub id: usize,
    pub name: String,
    pub current_successes: usize,
    pub current_failures: usize,
    pub current_flakes: usize,
    pub current_pass_percentage: f64,
    pub current_runs: usize,
    pub previous_successes: usize,
    pub previous_failures: usize,
    pub previous_flakes: usize,
    pub previous_pass_percentage: f64,
    pub previous_runs: usize,
    pub net_improvement: f64,
    pub tags: Vec<String>,
    pub bugs: Vec<Bug>,
    pub associated_bugs: Vec<Bug>,
}

pub fn test_rows(
    current: &[TestResultAcrossAllJobs],
    previous: &[TestResultAcrossAllJobs],
) -> Vec<TestRow> {
    let previous = index_by_name(previous, |test| test.name.as_str());
    current
        .iter()
        .enumerate()
        .map(|(id, test)| {
            let mut row = TestRow {
                id,
                name: test.name.clone(),
                current_successes: test.successes,
                current_failures: test.failures,
                current_flakes: test.flakes,
                current_pass_percentage: test.pass_percentage,
                current_runs: test.runs(),
                tags: test_tags(&test.name),
                bugs: test.bugs.clone(),
                associated_bugs: test.associated_bugs.clone(),
                ..TestRow::default()
            };
            if let Some(prev) = previous.get(test.name.as_str()) {
                row.previous_successes = prev.successes;
                row.previous_failures = prev.failures;
                row.previous_flakes = prev.flakes;
                row.previous_pass_percentage = prev.pass_percentage;
                row.previous_runs = prev.runs();
                row.net_improvement = test.pass_percentage - prev.pass_percentage;
            }
            row
        })
        .collect()
}

impl Filterable for TestRow {
    fn column_type(field: &str) -> Option<ColumnType> {
        match field {
            "name" => Some(ColumnType::String),
            "tags" => Some(ColumnType::Array),
            "id"
            | "current_successes"
            | "current_failures"
            | "current_flakes"
            | "current_pass_percentage"
            | "current_runs"
            | "previous_successes"
            | "previous_failures"
            | "previous_flakes"
            | "previous_pass_percentage"
            | "previous_runs"
            | "net_improvement"
            | "bugs"
            | "associated_bugs" => Some(ColumnType::Numerical),
            _ => None,
        }
    }

    fn string_value(&self, field: &str) -> Option<&str> {
        (field == "name").then_some(self.name.as_str())
    }

    fn numerical_value(&self, field: &str) -> Option<f64> {
        let value = match field {
            "id" => self.id as f64,
            "current_successes" => self.current_successes as f64,
            "current_failures" => self.current_failures as f64,
            "current_flakes" => self.current_flakes as f64,
            "current_pass_percentage" => self.current_pass_percentage,
            "current_runs" => self.current_runs as f64,
            "previous_successes" => self.previous_successes as f64,
            "previous_failures" => self.previous_failures as f64,
            "previous_flakes" => self.previous_flakes as f64,
            "previous_pass_percentage" => self.previous_pass_percentage,
            "previous_runs" => self.previous_runs as f64,
            "net_improvement" => self.net_improvement,
            "bugs" => self.bugs.len() as f64,
            "associated_bugs" => self.associated_bugs.len() as f64,
            _ => return None,
        };
        Some(value)
    }

    fn array_value(&self, field: &str) -> Option<&[String]> {
        (field == "tags").then_some(self.tags.as_slice())
    }
}

/// Variant-level roll-up paired with the comparison window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VariantRow {
    pub id: usize,
    pub name: String,
    pub jobs: usize,
    pub job_names: Vec<String>,
    pub current_pass_percentage: f64,
    pub current_mean_job_pass_percentage: f64,
    pub current_runs: usize,
    pub previous_pass_percentage: f64,
    pub previous_mean_job_pass_percentage: f64,
    pub previous_runs: usize,
    pub net_improvement: f64,
}

pub fn variant_rows(current: &[VariantResults], previous: &[VariantResults]) -> Vec<VariantRow> {
    let previous = index_by_name(previous, |variant| variant.variant_name.as_str());
    current
        .iter()
        .enumerate()
        .map(|(id, variant)| {
            let mut row = VariantRow {
                id,
                name: variant.variant_name.clone(),
                jobs: variant.job_results.len(),
                job_names: variant
                    .job_results
                    .iter()
                    .map(|job| job.name.clone())
                    .collect(),
                current_pass_percentage: variant.pass_percentage,
                current_mean_job_pass_percentage: variant.mean_job_pass_percentage,
                current_runs: variant.successes + variant.failures,
                ..VariantRow::default()
            };
            if let Some(prev) = previous.get(variant.variant_name.as_str()) {
                row.previous_pass_percentage = prev.pass_percentage;
                row.previous_mean_job_pass_percentage = prev.mean_job_pass_percentage;
                row.previous_runs = prev.successes + prev.failures;
                row.net_improvement = variant.pass_percentage - prev.pass_percentage;
            }
            row
        })
        .collect()
}

impl Filterable for VariantRow {
    fn column_type(field: &str) -> Option<ColumnType> {
        match field {
            "name" => Some(ColumnType::String),
            "job_names" => Some(ColumnType::Array),
            "id"
            | "jobs"
            | "current_pass_percentage"
            | "current_mean_job_pass_percentage"
            | "current_runs"
            | "previous_pass_percentage"
            | "previous_mean_job_pass_percentage"
            | "previous_runs"
            | "net_improvement" => Some(ColumnType::Numerical),
            _ => None,
        }
    }

    fn string_value(&self, field: &str) -> Option<&str> {
        (field == "name").then_some(self.name.as_str())
    }

    fn numerical_value(&self, field: &str) -> Option<f64> {
        let value = match field {
            "id" => self.id as f64,
            "jobs" => self.jobs as f64,
            "current_pass_percentage" => self.current_pass_percentage,
            "current_mean_job_pass_percentage" => self.current_mean_job_pass_percentage,
            "current_runs" => self.current_runs as f64,
            "previous_pass_percentage" => self.previous_pass_percentage,
            "previous_mean_job_pass_percentage" => self.previous_mean_job_pass_percentage,
            "previous_runs" => self.previous_runs as f64,
            "net_improvement" => self.net_improvement,
            _ => return None,
        };
        Some(value)
    }

    fn array_value(&self, field: &str) -> Option<&[String]> {
        (field == "job_names").then_some(self.job_names.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, pass: f64, successes: usize, failures: usize) -> JobResult {
        JobResult {
            name: name.to_owned(),
            pass_percentage: pass,
            pass_percentage_without_infrastructure_failures: pass,
            successes,
            failures,
            ..JobResult::default()
        }
    }

    #[test]
    fn brief_name_strips_periodic_prefix() {
        assert_eq!(
            brief_name("periodic-ci-openshift-release-master-nightly-4.12-e2e-aws-ovn-upgrade"),
            "e2e-aws-ovn-upgrade"
        );
        assert_eq!(
            brief_name("periodic-ci-openshift-multiarch-master-ci-4.11-ocp-e2e-aws-arm64"),
            "ocp-e2e-aws-arm64"
        );
        let unprefixed = "release-openshift-ocp-osd-aws-nightly-4.11";
        assert_eq!(brief_name(unprefixed), unprefixed);
    }

    #[test]
    fn job_rows_pair_with_previous_window() {
        let current = vec![job("e2e-aws-upgrade", 80.0, 8, 2), job("e2e-gcp", 50.0, 1, 1)];
        let previous = vec![job("e2e-aws-upgrade", 90.0, 9, 1)];

        let rows = job_rows(&current, &previous);
        assert_eq!(rows[0].previous_runs, 10);
        assert!((rows[0].net_improvement + 10.0).abs() < 1e-9);
        assert_eq!(rows[0].tags, vec![UPGRADE_TAG.to_owned()]);

        assert_eq!(rows[1].id, 1);
        assert_eq!(rows[1].previous_runs, 0);
        assert_eq!(rows[1].net_improvement, 0.0);
        assert!(rows[1].tags.is_empty());
    }

    #[test]
    fn test_rows_without_previous_record_have_zero_improvement() {
        let current = vec![TestResultAcrossAllJobs {
            name: "[sig-network] pods".to_owned(),
            successes: 3,
            failures: 1,
            pass_percentage: 75.0,
            ..TestResultAcrossAllJobs::default()
        }];
        let rows = test_rows(&current, &[]);
        assert_eq!(rows[0].current_runs, 4);
        assert_eq!(rows[0].previous_runs, 0);
        assert_eq!(rows[0].net_improvement, 0.0);
        assert_eq!(rows[0].numerical_value("current_failures"), Some(1.0));
        assert_eq!(rows[0].numerical_value("owner"), None);
    }

    #[test]
    fn variant_rows_summarise_members() {
        let current = vec![VariantResults {
            variant_name: "aws".to_owned(),
            job_results: vec![job("a", 100.0, 1, 0), job("b", 0.0, 0, 1)],
            successes: 1,
            failures: 1,
            pass_percentage: 50.0,
            mean_job_pass_percentage: 50.0,
        }];
        let previous = vec![VariantResults {
            variant_name: "aws".to_owned(),
            pass_percentage: 40.0,
            successes: 2,
            failures: 3,
            ..VariantResults::default()
        }];
        let rows = variant_rows(&current, &previous);
        assert_eq!(rows[0].jobs, 2);
        assert_eq!(rows[0].previous_runs, 5);
        assert!((rows[0].net_improvement - 10.0).abs() < 1e-9);
        assert_eq!(rows[0].array_value("job_names").map(<[String]>::len), Some(2));
    }
}
