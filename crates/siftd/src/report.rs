use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use sift_analysis::{ReportGenerator, ReportSet, now_millis};
use sift_core::ReportType;

use crate::daemon::{SharedStore, load_jobs, persist_rollups};

pub async fn generate_reports(
    generator: &ReportGenerator,
    snapshot_dir: &Path,
) -> Result<ReportSet> {
    let jobs = load_jobs(snapshot_dir).await?;
    generator
        .generate(jobs, now_millis())
        .await
        .context("failed to generate reports")
}

/// Generates once from `snapshot_dir` and writes `report_type` as pretty JSON.
pub async fn run_report_once(
    generator: &ReportGenerator,
    snapshot_dir: &Path,
    report_type: ReportType,
    store: Option<SharedStore>,
    out: &mut dyn Write,
) -> Result<()> {
    let reports = Arc::new(generate_reports(generator, snapshot_dir).await?);
    if let Some(store) = store {
        let rows = persist_rollups(store, reports.clone()).await?;
        tracing::info!(rows, "persisted test rollups");
    }
    write_report(&reports, report_type, out)
}

pub fn write_report(
    reports: &ReportSet,
    report_type: ReportType,
    out: &mut dyn Write,
) -> Result<()> {
    let report = reports.report(report_type).ok_or_else(|| {
        anyhow!(
            "{} report is not generated; set report.two_day_report = true",
            report_type.as_str()
        )
    })?;
    serde_json::to_writer_pretty(&mut *out, report).context("failed to serialize report")?;
    writeln!(out).context("failed to write report")?;
    Ok(())
}
