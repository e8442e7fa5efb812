//! SQLite-backed store of pre-aggregated per-job test rollups.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::{Deserialize, Serialize};
use sift_core::{TestReport, percent};
use thiserror::Error;

pub const ROLLUP_DB_FILE_NAME: &str = "rollups.sqlite";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Counts for one test within one job and release, for both windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TestRollupRow {
    pub name: String,
    pub release: String,
    pub job_name: String,
    pub variants: Vec<String>,
    pub current_successes: u64,
    pub current_failures: u64,
    pub current_flakes: u64,
    pub previous_successes: u64,
    pub previous_failures: u64,
    pub previous_flakes: u64,
}

impl TestRollupRow {
    pub fn current_runs(&self) -> u64 {
        self.current_successes + self.current_failures + self.current_flakes
    }

    pub fn previous_runs(&self) -> u64 {
        self.previous_successes + self.previous_failures + self.previous_flakes
    }
}

/// Rollup rows summed over jobs, with derived percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TestRollupSummary {
    pub name: String,
    pub release: String,
    /// Set when the summary is one slice of a by-variant breakdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub current_runs: u64,
    pub current_successes: u64,
    pub current_failures: u64,
    pub current_flakes: u64,
    pub current_pass_percentage: f64,
    pub current_failure_percentage: f64,
    pub previous_runs: u64,
    pub previous_successes: u64,
    pub previous_failures: u64,
    pub previous_flakes: u64,
    pub previous_pass_percentage: f64,
    pub previous_failure_percentage: f64,
    pub net_improvement: f64,
}

impl TestRollupSummary {
    fn from_sums(name: String, release: String, variant: Option<String>, sums: [u64; 6]) -> Self {
        let [cs, cf, cfl, ps, pf, pfl] = sums;
        let current_runs = cs + cf + cfl;
        let previous_runs = ps + pf + pfl;
        let current_pass_percentage = ratio(cs, current_runs);
        let previous_pass_percentage = ratio(ps, previous_runs);
        Self {
            name,
            release,
            variant,
            current_runs,
            current_successes: cs,
            current_failures: cf,
            current_flakes: cfl,
            current_pass_percentage,
            current_failure_percentage: ratio(cf, current_runs),
            previous_runs,
            previous_successes: ps,
            previous_failures: pf,
            previous_flakes: pfl,
            previous_pass_percentage,
            previous_failure_percentage: ratio(pf, previous_runs),
            net_improvement: if previous_runs == 0 {
                0.0
            } else {
                current_pass_percentage - previous_pass_percentage
            },
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    percent(numerator as usize, denominator as usize)
}

pub trait RollupStore {
    fn upsert_rollup(&self, row: &TestRollupRow) -> Result<(), StoreError>;
    fn replace_release(
        &mut self,
        release: &str,
        rows: &[TestRollupRow],
    ) -> Result<usize, StoreError>;
    fn rollups_for_test(&self, release: &str, name: &str)
    -> Result<Vec<TestRollupRow>, StoreError>;

    /// One summary for `name` with every job carrying any of
    /// `exclude_variants` left out. `None` when no row survives.
    fn test_report_excluding_variants(
        &self,
        release: &str,
        name: &str,
        exclude_variants: &[String],
    ) -> Result<Option<TestRollupSummary>, StoreError>;

    /// One summary per (test, variant) for tests whose name contains any of
    /// `name_substrings`.
    fn test_reports_by_variant(
        &self,
        release: &str,
        name_substrings: &[String],
    ) -> Result<Vec<TestRollupSummary>, StoreError>;
}

pub struct SqliteRollupStore {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteRollupStore {
    pub fn open(workspace_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let sift_dir = sift_config::sift_dir(workspace_root);
        fs::create_dir_all(&sift_dir)?;
        let db_path = sift_dir.join(ROLLUP_DB_FILE_NAME);

        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;

        Ok(Self { conn, db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

fn insert_rollup(conn: &Connection, row: &TestRollupRow) -> Result<(), StoreError> {
    let variants = serde_json::to_string(&row.variants)?;
    conn.execute(
        r#"
        INSERT INTO test_rollups (
            name, release, job_name, variants,
            current_successes, current_failures, current_flakes,
            previous_successes, previous_failures, previous_flakes
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(name, release, job_name) DO UPDATE SET
            variants = excluded.variants,
            current_successes = excluded.current_successes,
            current_failures = excluded.current_failures,
            current_flakes = excluded.current_flakes,
            previous_successes = excluded.previous_successes,
            previous_failures = excluded.previous_failures,
            previous_flakes = excluded.previous_flakes
        "#,
        params![
            row.name,
            row.release,
            row.job_name,
            variants,
            row.current_successes as i64,
            row.current_failures as i64,
            row.current_flakes as i64,
            row.previous_successes as i64,
            row.previous_failures as i64,
            row.previous_flakes as i64,
        ],
    )?;

    let rollup_id: i64 = conn.query_row(
        "SELECT id FROM test_rollups WHERE name = ?1 AND release = ?2 AND job_name = ?3",
        params![row.name, row.release, row.job_name],
        |r| r.get(0),
    )?;
    conn.execute(
        "DELETE FROM test_rollup_variants WHERE rollup_id = ?1",
        params![rollup_id],
    )?;
    for variant in &row.variants {
        conn.execute(
            "INSERT OR IGNORE INTO test_rollup_variants (rollup_id, variant) VALUES (?1, ?2)",
            params![rollup_id, variant],
        )?;
    }
    Ok(())
}

fn read_rollup(row: &rusqlite::Row<'_>) -> rusqlite::Result<(TestRollupRow, String)> {
    let get_count = |index: usize| row.get::<_, i64>(index).map(|value| value.max(0) as u64);
    Ok((
        TestRollupRow {
            name: row.get(0)?,
            release: row.get(1)?,
            job_name: row.get(2)?,
            variants: Vec::new(),
            current_successes: get_count(4)?,
            current_failures: get_count(5)?,
            current_flakes: get_count(6)?,
            previous_successes: get_count(7)?,
            previous_failures: get_count(8)?,
            previous_flakes: get_count(9)?,
        },
        row.get(3)?,
    ))
}

fn read_sums(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<[u64; 6]> {
    let mut sums = [0u64; 6];
    for (index, sum) in sums.iter_mut().enumerate() {
        *sum = row.get::<_, Option<i64>>(offset + index)?.unwrap_or(0).max(0) as u64;
    }
    Ok(sums)
}

const SUM_COLUMNS: &str = r#"
    SUM(r.current_successes), SUM(r.current_failures), SUM(r.current_flakes),
    SUM(r.previous_successes), SUM(r.previous_failures), SUM(r.previous_flakes)
"#;

impl RollupStore for SqliteRollupStore {
    fn upsert_rollup(&self, row: &TestRollupRow) -> Result<(), StoreError> {
        insert_rollup(&self.conn, row)
    }

    fn replace_release(
        &mut self,
        release: &str,
        rows: &[TestRollupRow],
    ) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM test_rollup_variants \
             WHERE rollup_id IN (SELECT id FROM test_rollups WHERE release = ?1)",
            params![release],
        )?;
        tx.execute("DELETE FROM test_rollups WHERE release = ?1", params![release])?;
        for row in rows {
            insert_rollup(&tx, row)?;
        }
        tx.commit()?;
        tracing::info!(release, rows = rows.len(), "replaced persisted test rollups");
        Ok(rows.len())
    }

    fn rollups_for_test(
        &self,
        release: &str,
        name: &str,
    ) -> Result<Vec<TestRollupRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, release, job_name, variants,
                   current_successes, current_failures, current_flakes,
                   previous_successes, previous_failures, previous_flakes
            FROM test_rollups
            WHERE release = ?1 AND name = ?2
            ORDER BY job_name
            "#,
        )?;
        let rows = stmt.query_map(params![release, name], read_rollup)?;

        let mut records = Vec::new();
        for row in rows {
            let (mut record, variants) = row?;
            record.variants = serde_json::from_str(&variants)?;
            records.push(record);
        }
        Ok(records)
    }

    fn test_report_excluding_variants(
        &self,
        release: &str,
        name: &str,
        exclude_variants: &[String],
    ) -> Result<Option<TestRollupSummary>, StoreError> {
        let exclusion = if exclude_variants.is_empty() {
            String::new()
        } else {
            let placeholders = (0..exclude_variants.len())
                .map(|index| format!("?{}", index + 3))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "AND NOT EXISTS (SELECT 1 FROM test_rollup_variants v \
                 WHERE v.rollup_id = r.id AND v.variant IN ({placeholders}))"
            )
        };
        let sql = format!(
            "SELECT COUNT(*), {SUM_COLUMNS} FROM test_rollups r \
             WHERE r.release = ?1 AND r.name = ?2 {exclusion}"
        );

        let bound = [release, name]
            .into_iter()
            .chain(exclude_variants.iter().map(String::as_str));
        let summary = self
            .conn
            .query_row(&sql, params_from_iter(bound), |row| {
                let matched: i64 = row.get(0)?;
                if matched == 0 {
                    return Ok(None);
                }
                Ok(Some(read_sums(row, 1)?))
            })
            .optional()?
            .flatten()
            .map(|sums| {
                TestRollupSummary::from_sums(name.to_owned(), release.to_owned(), None, sums)
            });

        tracing::debug!(
            release,
            test = name,
            excluded = exclude_variants.len(),
            found = summary.is_some(),
            "loaded test report excluding variants"
        );
        Ok(summary)
    }

    fn test_reports_by_variant(
        &self,
        release: &str,
        name_substrings: &[String],
    ) -> Result<Vec<TestRollupSummary>, StoreError> {
        if name_substrings.is_empty() {
            return Ok(Vec::new());
        }
        let matches_name = (0..name_substrings.len())
            .map(|index| format!("instr(r.name, ?{}) > 0", index + 2))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT r.name, v.variant, {SUM_COLUMNS} \
             FROM test_rollups r JOIN test_rollup_variants v ON v.rollup_id = r.id \
             WHERE r.release = ?1 AND ({matches_name}) \
             GROUP BY r.name, v.variant \
             ORDER BY r.name, v.variant"
        );

        let bound = std::iter::once(release).chain(name_substrings.iter().map(String::as_str));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bound), |row| {
            let name: String = row.get(0)?;
            let variant: String = row.get(1)?;
            Ok((name, variant, read_sums(row, 2)?))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (name, variant, sums) = row?;
            summaries.push(TestRollupSummary::from_sums(
                name,
                release.to_owned(),
                Some(variant),
                sums,
            ));
        }
        Ok(summaries)
    }
}

/// Flattens a report pair into per-(test, job) rollups. Jobs missing from the
/// comparison report contribute zero previous counts.
pub fn rollups_from_reports(current: &TestReport, previous: &TestReport) -> Vec<TestRollupRow> {
    let variants_by_job = current
        .by_job
        .iter()
        .map(|job| (job.name.as_str(), job.variants.as_slice()))
        .collect::<HashMap<_, _>>();
    let previous_counts = previous
        .by_test
        .iter()
        .flat_map(|test| {
            test.by_job.iter().map(move |job| {
                (
                    (test.name.as_str(), job.job_name.as_str()),
                    (job.successes, job.failures, job.flakes),
                )
            })
        })
        .collect::<HashMap<_, _>>();

    let mut rows = Vec::new();
    for test in &current.by_test {
        for job in &test.by_job {
            let (ps, pf, pfl) = previous_counts
                .get(&(test.name.as_str(), job.job_name.as_str()))
                .copied()
                .unwrap_or_default();
            rows.push(TestRollupRow {
                name: test.name.clone(),
                release: current.release.clone(),
                job_name: job.job_name.clone(),
                variants: variants_by_job
                    .get(job.job_name.as_str())
                    .map(|variants| variants.to_vec())
                    .unwrap_or_default(),
                current_successes: job.successes as u64,
                current_failures: job.failures as u64,
                current_flakes: job.flakes as u64,
                previous_successes: ps as u64,
                previous_failures: pf as u64,
                previous_flakes: pfl as u64,
            });
        }
    }
    rows
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS test_rollups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            release TEXT NOT NULL,
            job_name TEXT NOT NULL,
            variants TEXT NOT NULL,
            current_successes INTEGER NOT NULL,
            current_failures INTEGER NOT NULL,
            current_flakes INTEGER NOT NULL,
            previous_successes INTEGER NOT NULL,
            previous_failures INTEGER NOT NULL,
            previous_flakes INTEGER NOT NULL,
            UNIQUE(name, release, job_name)
        );

        CREATE TABLE IF NOT EXISTS test_rollup_variants (
            rollup_id INTEGER NOT NULL REFERENCES test_rollups(id),
            variant TEXT NOT NULL,
            PRIMARY KEY (rollup_id, variant)
        );

        CREATE INDEX IF NOT EXISTS test_rollups_release_name
            ON test_rollups(release, name);
        "#,
    )?;

    Ok(())
}
