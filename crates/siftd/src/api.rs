//! JSON views over the published report set.
//!
//! Table endpoints (`/api/jobs`, `/api/tests`, `/api/variants`) pair a
//! report with its comparison window and accept `filter` (JSON),
//! `sortBy`, `sortField`, `sort`, `limit` and `period` query parameters.

use std::sync::{Arc, PoisonError};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sift_analysis::{ReportCache, ReportSet};
use sift_core::{ReportType, TestReport};
use sift_query::{
    Filter, JobRow, Period, QueryError, RowQuery, SortBy, SortDirection, TestRow, VariantRow,
    job_rows, test_rows, variant_rows,
};
use sift_store::{RollupStore, StoreError, TestRollupSummary};
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::daemon::SharedStore;

pub struct AppState {
    pub cache: Arc<ReportCache>,
    pub store: Option<SharedStore>,
}

impl AppState {
    pub fn new(cache: Arc<ReportCache>, store: Option<SharedStore>) -> Self {
        Self { cache, store }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Query(#[from] QueryError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Query(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Query(QueryError::Filter(_)) => "invalid_filter",
            Self::Query(_) | Self::BadRequest(_) => "invalid_parameter",
            Self::NotFound(_) => "not_found",
            Self::Unavailable(_) => "unavailable",
            Self::Store(_) | Self::Join(_) => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "api request failed");
        }
        let body = ErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub release: String,
    pub generated_at: i64,
    pub generated_at_rfc3339: Option<String>,
    pub jobs: usize,
    pub tests: usize,
    pub two_day_available: bool,
}

/// Table view parameters. Everything arrives as text so malformed values
/// surface as `invalid_parameter` rather than a bare rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewParams {
    pub filter: Option<String>,
    pub sort_by: Option<String>,
    pub sort_field: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<String>,
    pub period: Option<String>,
}

impl ViewParams {
    pub fn period(&self) -> Result<Period, ApiError> {
        self.period
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(ApiError::BadRequest)
    }

    pub fn row_query(&self) -> Result<RowQuery, ApiError> {
        let filter = match non_empty(&self.filter) {
            Some(raw) => Some(Filter::from_json(raw).map_err(QueryError::from)?),
            None => None,
        };
        let sort_by = non_empty(&self.sort_by)
            .map(str::parse::<SortBy>)
            .transpose()
            .map_err(ApiError::BadRequest)?;
        let direction = non_empty(&self.sort)
            .map(str::parse::<SortDirection>)
            .transpose()
            .map_err(ApiError::BadRequest)?
            .unwrap_or_default();
        let limit = non_empty(&self.limit)
            .map(|raw| {
                raw.parse::<usize>()
                    .map_err(|_| ApiError::BadRequest(format!("invalid limit '{raw}'")))
            })
            .transpose()?;

        Ok(RowQuery {
            filter,
            sort_by,
            sort_field: non_empty(&self.sort_field).map(str::to_owned),
            direction,
            limit,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

/// The report a view shows and the one it is compared against.
fn comparison(
    reports: &ReportSet,
    period: Period,
) -> Result<(&TestReport, &TestReport), ApiError> {
    match period {
        Period::Default => Ok((&reports.current, &reports.previous)),
        Period::TwoDay => reports
            .two_day
            .as_ref()
            .map(|two_day| (two_day, &reports.current))
            .ok_or_else(|| ApiError::NotFound("two-day report is not enabled".to_owned())),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/report", get(report))
        .route("/api/jobs", get(jobs))
        .route("/api/tests", get(tests))
        .route("/api/tests/excluding", get(tests_excluding))
        .route("/api/tests/by_variant", get(tests_by_variant))
        .route("/api/variants", get(variants))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let reports = state.cache.snapshot();
    let generated_at_rfc3339 = (reports.generated_at > 0)
        .then(|| chrono::DateTime::from_timestamp_millis(reports.generated_at))
        .flatten()
        .map(|at| at.to_rfc3339());

    Json(HealthResponse {
        status: (if reports.generated_at > 0 { "ok" } else { "loading" }).to_owned(),
        release: reports.current.release.clone(),
        generated_at: reports.generated_at,
        generated_at_rfc3339,
        jobs: reports.current.by_job.len(),
        tests: reports.current.by_test.len(),
        two_day_available: reports.two_day.is_some(),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportParams {
    #[serde(rename = "type")]
    pub report_type: Option<String>,
}

async fn report(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> Result<Json<TestReport>, ApiError> {
    let report_type = match non_empty(&params.report_type) {
        Some(raw) => raw.parse::<ReportType>().map_err(ApiError::BadRequest)?,
        None => ReportType::Current,
    };
    let reports = state.cache.snapshot();
    reports
        .report(report_type)
        .cloned()
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!("{} report is not enabled", report_type.as_str()))
        })
}

async fn jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewParams>,
) -> Result<Json<Vec<JobRow>>, ApiError> {
    let query = params.row_query()?;
    let reports = state.cache.snapshot();
    let (current, previous) = comparison(&reports, params.period()?)?;
    Ok(Json(query.apply(job_rows(&current.by_job, &previous.by_job))?))
}

async fn tests(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewParams>,
) -> Result<Json<Vec<TestRow>>, ApiError> {
    let query = params.row_query()?;
    let reports = state.cache.snapshot();
    let (current, previous) = comparison(&reports, params.period()?)?;
    Ok(Json(query.apply(test_rows(&current.by_test, &previous.by_test))?))
}

async fn variants(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewParams>,
) -> Result<Json<Vec<VariantRow>>, ApiError> {
    let query = params.row_query()?;
    let reports = state.cache.snapshot();
    let (current, previous) = comparison(&reports, params.period()?)?;
    Ok(Json(query.apply(variant_rows(
        &current.by_variant,
        &previous.by_variant,
    ))?))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RollupParams {
    pub test: Option<String>,
    pub release: Option<String>,
    pub exclude: Option<String>,
}

impl RollupParams {
    fn release(&self, state: &AppState) -> String {
        non_empty(&self.release)
            .map(str::to_owned)
            .unwrap_or_else(|| state.cache.snapshot().current.release.clone())
    }
}

fn split_list(value: &Option<String>) -> Vec<String> {
    non_empty(value)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn require_store(state: &AppState) -> Result<SharedStore, ApiError> {
    state
        .store
        .clone()
        .ok_or_else(|| ApiError::Unavailable("rollup store is disabled".to_owned()))
}

async fn tests_excluding(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RollupParams>,
) -> Result<Json<TestRollupSummary>, ApiError> {
    let store = require_store(&state)?;
    let test = non_empty(&params.test)
        .map(str::to_owned)
        .ok_or_else(|| ApiError::BadRequest("missing 'test' parameter".to_owned()))?;
    let release = params.release(&state);
    let excluded = split_list(&params.exclude);

    let lookup_test = test.clone();
    let summary = tokio::task::spawn_blocking(move || {
        let store = store.lock().unwrap_or_else(PoisonError::into_inner);
        store.test_report_excluding_variants(&release, &lookup_test, &excluded)
    })
    .await??;

    summary
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no rollups for test '{test}'")))
}

async fn tests_by_variant(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RollupParams>,
) -> Result<Json<Vec<TestRollupSummary>>, ApiError> {
    let store = require_store(&state)?;
    let names = split_list(&params.test);
    if names.is_empty() {
        return Err(ApiError::BadRequest("missing 'test' parameter".to_owned()));
    }
    let release = params.release(&state);

    let summaries = tokio::task::spawn_blocking(move || {
        let store = store.lock().unwrap_or_else(PoisonError::into_inner);
        store.test_reports_by_variant(&release, &names)
    })
    .await??;
    Ok(Json(summaries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ViewParams {
        let mut params = ViewParams::default();
        for (key, value) in pairs {
            let value = Some((*value).to_owned());
            match *key {
                "filter" => params.filter = value,
                "sortBy" => params.sort_by = value,
                "sortField" => params.sort_field = value,
                "sort" => params.sort = value,
                "limit" => params.limit = value,
                "period" => params.period = value,
                other => panic!("unknown parameter {other}"),
            }
        }
        params
    }

    #[test]
    fn empty_parameters_build_the_default_query() {
        let query = params(&[("filter", " "), ("limit", "")])
            .row_query()
            .expect("query");
        assert_eq!(query, RowQuery::default());
    }

    #[test]
    fn parameters_map_onto_the_row_query() {
        let query = params(&[
            ("sortBy", "improvement"),
            ("sortField", "name"),
            ("sort", "desc"),
            ("limit", "5"),
        ])
        .row_query()
        .expect("query");
        assert_eq!(query.sort_by, Some(SortBy::Improvement));
        assert_eq!(query.sort_field.as_deref(), Some("name"));
        assert_eq!(query.direction, SortDirection::Desc);
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn malformed_parameters_are_bad_requests() {
        for pairs in [
            vec![("limit", "ten")],
            vec![("sortBy", "alphabetical")],
            vec![("sort", "sideways")],
            vec![("filter", "{not json")],
        ] {
            let err = params(&pairs).row_query().expect_err("invalid parameter");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{pairs:?}");
        }
        let err = params(&[("period", "weekly")]).period().expect_err("period");
        assert_eq!(err.code(), "invalid_parameter");
    }

    #[test]
    fn two_day_period_compares_against_the_current_window() {
        let mut reports = ReportSet::default();
        reports.current.release = "current".to_owned();
        assert!(matches!(
            comparison(&reports, Period::TwoDay),
            Err(ApiError::NotFound(_))
        ));

        reports.two_day = Some(TestReport {
            release: "two-day".to_owned(),
            ..TestReport::default()
        });
        let (shown, against) = comparison(&reports, Period::TwoDay).expect("two-day comparison");
        assert_eq!(shown.release, "two-day");
        assert_eq!(against.release, "current");
    }
}
