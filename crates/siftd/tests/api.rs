use std::fs;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use sift_analysis::{ReportCache, ReportSet, now_millis};
use sift_config::SiftConfig;
use sift_core::{JobResult, ReportType, TestReport};
use siftd::api::{AppState, ErrorBody, HealthResponse, router};
use siftd::daemon::{build_generator, open_store, refresh_once};
use siftd::snapshot::default_snapshot_dir;
use tempfile::tempdir;
use tower::ServiceExt;

const AWS_JOB: &str = "periodic-ci-openshift-release-master-nightly-4.12-e2e-aws";
const NETWORK_TEST: &str = "[sig-network] pods should work";

fn encode(value: &str) -> String {
    value
        .bytes()
        .map(|byte| {
            if byte.is_ascii_alphanumeric() || b"-_.~".contains(&byte) {
                (byte as char).to_string()
            } else {
                format!("%{byte:02X}")
            }
        })
        .collect()
}

async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    (status, body.to_vec())
}

fn job(name: &str, variants: &[&str], pass: f64, runs: usize) -> JobResult {
    JobResult {
        name: name.to_owned(),
        variants: variants.iter().map(|variant| (*variant).to_owned()).collect(),
        pass_percentage: pass,
        successes: runs,
        ..JobResult::default()
    }
}

fn seeded_state() -> Arc<AppState> {
    let cache = Arc::new(ReportCache::new());
    cache.replace(ReportSet {
        generated_at: 1_700_000_000_000,
        current: TestReport {
            release: "4.12".to_owned(),
            by_job: vec![
                job("e2e-aws-upgrade", &["aws", "upgrade"], 40.0, 10),
                job("e2e-aws-serial", &["aws", "serial"], 90.0, 10),
                job("e2e-gcp", &["gcp"], 70.0, 10),
            ],
            ..TestReport::default()
        },
        previous: TestReport {
            release: "4.12".to_owned(),
            report_type: ReportType::Previous,
            by_job: vec![
                job("e2e-aws-upgrade", &["aws", "upgrade"], 80.0, 10),
                job("e2e-aws-serial", &["aws", "serial"], 85.0, 10),
            ],
            ..TestReport::default()
        },
        two_day: None,
    });
    Arc::new(AppState::new(cache, None))
}

#[tokio::test]
async fn health_reports_loading_until_first_refresh() {
    let state = Arc::new(AppState::new(Arc::new(ReportCache::new()), None));
    let (status, body) = get(state, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body).expect("health json");
    assert_eq!(health.status, "loading");
    assert_eq!(health.generated_at_rfc3339, None);

    let (_, body) = get(seeded_state(), "/api/health").await;
    let health: HealthResponse = serde_json::from_slice(&body).expect("health json");
    assert_eq!(health.status, "ok");
    assert_eq!(health.jobs, 3);
    assert!(!health.two_day_available);
}

#[tokio::test]
async fn jobs_view_filters_sorts_and_limits() {
    let filter = r#"{"items":[{"columnField":"variants","operatorValue":"contains","value":"aws"}]}"#;
    let uri = format!("/api/jobs?filter={}&sortBy=regression&limit=1", encode(filter));
    let (status, body) = get(seeded_state(), &uri).await;
    assert_eq!(status, StatusCode::OK);

    let rows: Vec<Value> = serde_json::from_slice(&body).expect("rows json");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "e2e-aws-upgrade");
    assert_eq!(rows[0]["net_improvement"], -40.0);
    assert_eq!(rows[0]["tags"], serde_json::json!(["upgrade"]));
}

#[tokio::test]
async fn jobs_view_sorts_by_field() {
    let (status, body) = get(
        seeded_state(),
        "/api/jobs?sortField=current_pass_percentage&sort=desc",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows: Vec<Value> = serde_json::from_slice(&body).expect("rows json");
    let names = rows
        .iter()
        .map(|row| row["name"].as_str().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["e2e-aws-serial", "e2e-gcp", "e2e-aws-upgrade"]);
}

#[tokio::test]
async fn bad_filters_are_rejected_with_400() {
    let filter = r#"{"items":[{"columnField":"nope","operatorValue":"contains","value":"x"}]}"#;
    let (status, body) = get(seeded_state(), &format!("/api/jobs?filter={}", encode(filter))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorBody = serde_json::from_slice(&body).expect("error json");
    assert_eq!(error.code, "invalid_filter");
    assert!(error.message.contains("nope"));

    let (status, _) = get(seeded_state(), "/api/tests?sortField=tags").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn two_day_period_requires_a_two_day_report() {
    let (status, body) = get(seeded_state(), "/api/jobs?period=twoDay").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorBody = serde_json::from_slice(&body).expect("error json");
    assert_eq!(error.code, "not_found");

    let (status, _) = get(seeded_state(), "/api/report?type=two_day").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn report_endpoint_selects_the_window() {
    let (status, body) = get(seeded_state(), "/api/report?type=previous").await;
    assert_eq!(status, StatusCode::OK);
    let report: TestReport = serde_json::from_slice(&body).expect("report json");
    assert_eq!(report.report_type, ReportType::Previous);
    assert_eq!(report.by_job.len(), 2);
}

#[tokio::test]
async fn rollup_endpoints_need_a_store() {
    let (status, body) = get(
        seeded_state(),
        &format!("/api/tests/excluding?test={}", encode(NETWORK_TEST)),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error: ErrorBody = serde_json::from_slice(&body).expect("error json");
    assert_eq!(error.code, "unavailable");
}

fn snapshot_json(now: i64) -> String {
    let hour = 60 * 60 * 1000;
    format!(
        r#"{{
            "name": "{AWS_JOB}",
            "query": "logs/{AWS_JOB}",
            "timestamps": [{t0}, {t1}, {t2}, {t3}],
            "changelists": ["4", "3", "2", "1"],
            "tests": [
                {{"name": "Overall", "statuses": [
                    {{"count": 1, "value": 1}}, {{"count": 2, "value": 12}}, {{"count": 1, "value": 1}}
                ]}},
                {{"name": "e2e-aws container setup", "statuses": [
                    {{"count": 2, "value": 1}}, {{"count": 1, "value": 12}}, {{"count": 1, "value": 1}}
                ]}},
                {{"name": "{NETWORK_TEST}", "statuses": [
                    {{"count": 1, "value": 1}}, {{"count": 1, "value": 12}},
                    {{"count": 1, "value": 0}}, {{"count": 1, "value": 1}}
                ]}}
            ]
        }}"#,
        t0 = now - hour,
        t1 = now - 2 * hour,
        t2 = now - 3 * hour,
        t3 = now - 4 * hour,
    )
}

#[tokio::test]
async fn refresh_publishes_and_persists_reports() {
    let temp = tempdir().expect("tempdir");
    let workspace = temp.path();
    let snapshot_dir = default_snapshot_dir(workspace);
    fs::create_dir_all(&snapshot_dir).expect("snapshot dir");
    fs::write(snapshot_dir.join("aws.json"), snapshot_json(now_millis())).expect("write snapshot");

    let config = SiftConfig::default();
    let generator = build_generator(&config);
    let cache = Arc::new(ReportCache::new());
    let store = open_store(workspace).expect("open store");
    refresh_once(&generator, &cache, &snapshot_dir, Some(&store))
        .await
        .expect("refresh");
    assert!(workspace.join(".sift/rollups.sqlite").exists());

    let state = Arc::new(AppState::new(cache, Some(store)));

    let (status, body) = get(state.clone(), "/api/tests").await;
    assert_eq!(status, StatusCode::OK);
    let rows: Vec<Value> = serde_json::from_slice(&body).expect("rows json");
    let network = rows
        .iter()
        .find(|row| row["name"] == NETWORK_TEST)
        .expect("network test row");
    assert_eq!(network["current_runs"], 3);

    let uri = format!(
        "/api/tests/excluding?test={}&exclude=gcp,azure",
        encode(NETWORK_TEST)
    );
    let (status, body) = get(state.clone(), &uri).await;
    assert_eq!(status, StatusCode::OK);
    let summary: Value = serde_json::from_slice(&body).expect("summary json");
    assert_eq!(summary["current_runs"], 3);
    assert_eq!(summary["release"], "4.12");

    let uri = format!("/api/tests/excluding?test={}&exclude=aws", encode(NETWORK_TEST));
    let (status, _) = get(state, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_refresh_keeps_published_reports() {
    let temp = tempdir().expect("tempdir");
    let cache = ReportCache::new();
    let generator = build_generator(&SiftConfig::default());
    let before = cache.snapshot();

    let err = refresh_once(&generator, &cache, &temp.path().join("missing"), None)
        .await
        .expect_err("missing snapshot dir");
    assert!(format!("{err:#}").contains("does not exist"));
    assert_eq!(*cache.snapshot(), *before);
}
