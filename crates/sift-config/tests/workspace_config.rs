use std::fs;

use sift_config::{
    MIN_REFRESH_INTERVAL_SECS, VariantScheme, config_path, load_workspace_config, validate_config,
};
use tempfile::tempdir;

#[test]
fn workspace_config_is_normalized_and_validated() {
    let temp = tempdir().expect("tempdir");
    let workspace = temp.path();
    let path = config_path(workspace);
    fs::create_dir_all(path.parent().expect("config parent")).expect("create .sift");
    fs::write(
        &path,
        r#"
[report]
release = " 4.13 "
current_days = 0
two_day_report = true
floating_anchor = true
run_url_prefix = "https://prow.example.com/view/gcs/"

[variants]
scheme = "none"
extra_never_stable = [" e2e-flaky ", ""]

[refresh]
interval_secs = 1
extraction_concurrency = 0

[[bugs.entries]]
test = "[sig-network] pods should work"
url = " "
"#,
    )
    .expect("write config");

    let config = load_workspace_config(workspace).expect("load config");
    assert_eq!(config.report.release, "4.13");
    assert_eq!(config.report.current_days, 1);
    assert_eq!(config.report.previous_days, 7);
    assert!(config.report.two_day_report);
    assert!(config.report.floating_anchor);
    assert_eq!(
        config.report.run_url_prefix,
        "https://prow.example.com/view/gcs"
    );
    assert_eq!(config.variants.scheme, VariantScheme::None);
    assert_eq!(config.variants.extra_never_stable, vec!["e2e-flaky".to_owned()]);
    assert_eq!(config.refresh.interval_secs, MIN_REFRESH_INTERVAL_SECS);
    assert_eq!(config.refresh.extraction_concurrency, 1);
    assert_eq!(config.server.listen, "127.0.0.1:8080");

    let codes = validate_config(&config)
        .into_iter()
        .map(|warning| warning.code)
        .collect::<Vec<_>>();
    assert_eq!(codes, vec!["refresh.interval_secs", "bugs.entries"]);
}

#[test]
fn malformed_toml_is_an_error() {
    let temp = tempdir().expect("tempdir");
    let path = config_path(temp.path());
    fs::create_dir_all(path.parent().expect("config parent")).expect("create .sift");
    fs::write(&path, "[report\nrelease = 4").expect("write config");

    let err = load_workspace_config(temp.path()).expect_err("parse error");
    assert!(err.to_string().contains("failed to parse config TOML"));
}
