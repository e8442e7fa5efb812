use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sift_analysis::{
    BugLookup, NoBugs, ReportCache, ReportGenerator, ReportSet, StaticBugCache, now_millis,
};
use sift_config::SiftConfig;
use sift_store::{RollupStore, SqliteRollupStore, rollups_from_reports};
use sift_variants::variant_manager_from_config;
use tokio::time::MissedTickBehavior;

use crate::api::{AppState, router};
use crate::snapshot::load_snapshot_dir;

pub type SharedStore = Arc<Mutex<SqliteRollupStore>>;

pub fn build_generator(config: &SiftConfig) -> ReportGenerator {
    let variants = variant_manager_from_config(&config.variants);
    let bugs: Arc<dyn BugLookup> = if config.bugs.entries.is_empty() {
        Arc::new(NoBugs)
    } else {
        Arc::new(StaticBugCache::from_entries(&config.bugs.entries))
    };

    ReportGenerator::new(config.report.clone(), variants, bugs)
        .with_concurrency(config.refresh.extraction_concurrency)
        .with_floating_windows(config.report.floating_anchor)
}

pub fn open_store(workspace: &Path) -> Result<SharedStore> {
    let store = SqliteRollupStore::open(workspace).context("failed to open rollup store")?;
    tracing::info!(path = %store.db_path().display(), "opened rollup store");
    Ok(Arc::new(Mutex::new(store)))
}

pub async fn load_jobs(snapshot_dir: &Path) -> Result<Vec<sift_core::JobDetails>> {
    let dir = snapshot_dir.to_path_buf();
    tokio::task::spawn_blocking(move || load_snapshot_dir(&dir))
        .await
        .context("snapshot loader task failed")?
}

/// Writes the current/previous rollups of `reports`, replacing whatever was
/// stored for that release.
pub async fn persist_rollups(store: SharedStore, reports: Arc<ReportSet>) -> Result<usize> {
    tokio::task::spawn_blocking(move || {
        let rows = rollups_from_reports(&reports.current, &reports.previous);
        let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
        store
            .replace_release(&reports.current.release, &rows)
            .context("failed to persist test rollups")
    })
    .await
    .context("rollup persist task failed")?
}

/// One regeneration: load snapshots, rebuild every report, publish, persist.
/// The published set is untouched when loading or generation fails.
pub async fn refresh_once(
    generator: &ReportGenerator,
    cache: &ReportCache,
    snapshot_dir: &Path,
    store: Option<&SharedStore>,
) -> Result<()> {
    let started = Instant::now();
    let jobs = load_jobs(snapshot_dir).await?;
    cache
        .refresh(generator, jobs, now_millis())
        .await
        .context("failed to generate reports")?;

    let reports = cache.snapshot();
    tracing::info!(
        release = %reports.current.release,
        jobs = reports.current.by_job.len(),
        tests = reports.current.by_test.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "published reports"
    );

    if let Some(store) = store {
        let rows = persist_rollups(store.clone(), reports).await?;
        tracing::debug!(rows, "persisted test rollups");
    }
    Ok(())
}

pub struct ServeOptions {
    pub config: SiftConfig,
    pub snapshot_dir: PathBuf,
    pub listen: String,
    pub store: Option<SharedStore>,
}

pub async fn run_server(options: ServeOptions) -> Result<()> {
    let ServeOptions {
        config,
        snapshot_dir,
        listen,
        store,
    } = options;

    let cache = Arc::new(ReportCache::new());
    let generator = build_generator(&config);
    let interval = Duration::from_secs(config.refresh.interval_secs);

    let refresher = tokio::spawn(refresh_loop(
        generator,
        cache.clone(),
        snapshot_dir,
        store.clone(),
        interval,
    ));

    let state = Arc::new(AppState::new(cache, store));
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    tracing::info!(
        listen = %listen,
        interval_secs = interval.as_secs(),
        "serving report API"
    );

    let served = axum::serve(listener, router(state))
        .await
        .context("API server exited with error");
    refresher.abort();
    served
}

async fn refresh_loop(
    generator: ReportGenerator,
    cache: Arc<ReportCache>,
    snapshot_dir: PathBuf,
    store: Option<SharedStore>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = refresh_once(&generator, &cache, &snapshot_dir, store.as_ref()).await {
            let error = format!("{err:#}");
            tracing::warn!(error = %error, "report refresh failed, keeping previous reports");
        }
    }
}
