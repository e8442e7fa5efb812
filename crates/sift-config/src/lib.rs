use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SIFT_DIR_NAME: &str = ".sift";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_RELEASE: &str = "4.12";
pub const DEFAULT_RUN_URL_PREFIX: &str = "https://prow.ci.openshift.org/view/gcs";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_EXTRACTION_CONCURRENCY: usize = 4;
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VariantScheme {
    #[default]
    Openshift,
    None,
}

impl VariantScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openshift => "openshift",
            Self::None => "none",
        }
    }
}

impl std::str::FromStr for VariantScheme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "openshift" => Ok(Self::Openshift),
            "none" => Ok(Self::None),
            other => Err(format!(
                "invalid variant scheme '{other}', expected one of: openshift, none"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SiftConfig {
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub variants: VariantsConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bugs: BugsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_release")]
    pub release: String,
    #[serde(default = "default_current_days")]
    pub current_days: u32,
    #[serde(default = "default_previous_days")]
    pub previous_days: u32,
    #[serde(default)]
    pub two_day_report: bool,
    /// Anchor windows at each job's newest column rather than the wall clock.
    #[serde(default)]
    pub floating_anchor: bool,
    #[serde(default = "default_min_runs")]
    pub min_runs: usize,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,
    #[serde(default = "default_failure_cluster_threshold")]
    pub failure_cluster_threshold: i64,
    #[serde(default = "default_frequent_job_multiplier")]
    pub frequent_job_multiplier: f64,
    #[serde(default = "default_run_url_prefix")]
    pub run_url_prefix: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            release: default_release(),
            current_days: default_current_days(),
            previous_days: default_previous_days(),
            two_day_report: false,
            floating_anchor: false,
            min_runs: default_min_runs(),
            success_threshold: default_success_threshold(),
            failure_cluster_threshold: default_failure_cluster_threshold(),
            frequent_job_multiplier: default_frequent_job_multiplier(),
            run_url_prefix: default_run_url_prefix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VariantsConfig {
    #[serde(default)]
    pub scheme: VariantScheme,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_never_stable: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_extraction_concurrency")]
    pub extraction_concurrency: usize,
    /// The configured interval when it was below the minimum and got raised.
    #[serde(skip)]
    pub interval_raised_from: Option<u64>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval_secs(),
            extraction_concurrency: default_extraction_concurrency(),
            interval_raised_from: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BugsConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<BugEntryConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugEntryConfig {
    pub test: String,
    pub url: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub target_release: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn sift_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(SIFT_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    sift_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(workspace_root: impl AsRef<Path>) -> Result<SiftConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(SiftConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: SiftConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<SiftConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(sift_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = SiftConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

/// Flags values that load fine but will produce surprising reports.
pub fn validate_config(config: &SiftConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if parse_release_version(&config.report.release).is_none() {
        warnings.push(ConfigWarning {
            code: "report.release",
            message: format!(
                "release '{}' is not a <major>.<minor> version; network variants cannot be inferred",
                config.report.release
            ),
        });
    }
    if config.report.success_threshold <= 0.0 {
        warnings.push(ConfigWarning {
            code: "report.success_threshold",
            message: "success_threshold <= 0 excludes every test from failing-test views".to_owned(),
        });
    }
    if config.report.min_runs == 0 {
        warnings.push(ConfigWarning {
            code: "report.min_runs",
            message: "min_runs = 0 includes tests that never ran in failing-test views".to_owned(),
        });
    }
    if let Some(requested) = config.refresh.interval_raised_from {
        warnings.push(ConfigWarning {
            code: "refresh.interval_secs",
            message: format!(
                "refresh interval {requested}s raised to the {MIN_REFRESH_INTERVAL_SECS}s minimum"
            ),
        });
    }
    for entry in &config.bugs.entries {
        if entry.url.trim().is_empty() {
            warnings.push(ConfigWarning {
                code: "bugs.entries",
                message: format!("bug entry for test '{}' has no url and is ignored", entry.test),
            });
        }
    }

    warnings
}

/// Parses `<major>.<minor>` (extra components are ignored).
pub fn parse_release_version(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

fn default_release() -> String {
    DEFAULT_RELEASE.to_owned()
}

fn default_current_days() -> u32 {
    7
}

fn default_previous_days() -> u32 {
    7
}

fn default_min_runs() -> usize {
    7
}

fn default_success_threshold() -> f64 {
    99.99
}

fn default_failure_cluster_threshold() -> i64 {
    10
}

fn default_frequent_job_multiplier() -> f64 {
    1.5
}

fn default_run_url_prefix() -> String {
    DEFAULT_RUN_URL_PREFIX.to_owned()
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_extraction_concurrency() -> usize {
    DEFAULT_EXTRACTION_CONCURRENCY
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_owned()
}

fn normalize_string(input: &str, fallback: fn() -> String) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_owned()
    }
}

fn normalize_config(mut config: SiftConfig) -> SiftConfig {
    config.report.release = normalize_string(&config.report.release, default_release);
    config.report.run_url_prefix = normalize_string(
        config.report.run_url_prefix.trim_end_matches('/'),
        default_run_url_prefix,
    );
    config.report.current_days = config.report.current_days.max(1);
    config.report.previous_days = config.report.previous_days.max(1);
    if !config.report.success_threshold.is_finite() {
        config.report.success_threshold = default_success_threshold();
    }
    config.report.success_threshold = config.report.success_threshold.clamp(0.0, 100.0);
    if !config.report.frequent_job_multiplier.is_finite()
        || config.report.frequent_job_multiplier <= 0.0
    {
        config.report.frequent_job_multiplier = default_frequent_job_multiplier();
    }

    config.variants.extra_never_stable = config
        .variants
        .extra_never_stable
        .iter()
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .collect();

    if config.refresh.interval_secs < MIN_REFRESH_INTERVAL_SECS {
        config.refresh.interval_raised_from = Some(config.refresh.interval_secs);
        config.refresh.interval_secs = MIN_REFRESH_INTERVAL_SECS;
    }
    config.refresh.extraction_concurrency = config.refresh.extraction_concurrency.clamp(1, 64);
    config.server.listen = normalize_string(&config.server.listen, default_listen);

    for entry in &mut config.bugs.entries {
        entry.test = entry.test.trim().to_owned();
        entry.url = entry.url.trim().to_owned();
    }

    config
}
