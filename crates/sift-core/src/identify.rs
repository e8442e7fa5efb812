use std::sync::LazyLock;

use regex::Regex;

pub const OVERALL_TEST_NAME: &str = "Overall";
pub const OPERATOR_INSTALL_PREFIX: &str = "operator install ";
pub const OPERATOR_UPGRADE_PREFIX: &str = "Operator upgrade ";
pub const OPERATOR_FINAL_HEALTH_PREFIX: &str = "operator conditions ";

pub const INFRASTRUCTURE_TEST_NAME: &str = "[sig-sippy] infrastructure should work";
pub const INSTALL_TEST_NAME: &str = "[sig-sippy] install should work";
pub const UPGRADE_TEST_NAME: &str = "[sig-sippy] upgrade should work";
pub const OPENSHIFT_TESTS_NAME: &str = "[sig-sippy] openshift-tests should work";
pub const FINAL_OPERATOR_HEALTH_TEST_NAME: &str =
    "[sig-sippy] tests should finish with healthy operators";

pub const SYNTHETIC_TEST_NAMES: [&str; 5] = [
    INFRASTRUCTURE_TEST_NAME,
    INSTALL_TEST_NAME,
    UPGRADE_TEST_NAME,
    OPENSHIFT_TESTS_NAME,
    FINAL_OPERATOR_HEALTH_TEST_NAME,
];

pub const UPGRADE_STARTED_TEST_NAME: &str =
    "[sig-cluster-lifecycle] Cluster version operator acknowledges upgrade";
pub const OPERATORS_UPGRADED_TEST_NAME: &str = "[sig-cluster-lifecycle] Cluster completes upgrade";
pub const MACHINE_CONFIG_POOLS_UPGRADED_TEST_NAME: &str =
    "[sig-mco] Machine config pools complete upgrade";
pub const INSTALL_OVERALL_TEST_NAME: &str = "install should succeed: overall";

const RANDOM_OPERATOR_NAMESPACE_REPLACEMENT: &str = "operator in test namespace";

// Scaffolding steps that carry no predictive value for product health.
static NON_PREDICTIVE_TEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Run multi-stage test|operator.Import the release payload|operator.Import a release payload|operator.Run template|operator.Build image|Monitor cluster while tests execute|Overall|job.initialize|\[sig-arch\]\[Feature:ClusterUpgrade\] Cluster should remain functional during upgrade",
    )
    .expect("non-predictive test regex is valid")
});

static RANDOM_OPERATOR_TEST_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^"Installing "Red Hat Integration"#).expect("random operator prefix is valid")
});

static RANDOM_OPERATOR_NAMESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"operator in test-[a-z]+").expect("random operator namespace regex is valid")
});

/// The overall marker is either the bare `Overall` row or `<tab>.Overall`.
pub fn is_overall_test(name: &str) -> bool {
    name == OVERALL_TEST_NAME || name.ends_with(".Overall")
}

pub fn is_non_predictive_test(name: &str) -> bool {
    NON_PREDICTIVE_TEST.is_match(name)
}

pub fn is_operator_health_test(name: &str) -> bool {
    name.starts_with(OPERATOR_FINAL_HEALTH_PREFIX)
}

pub fn is_old_install_operator_test(name: &str) -> bool {
    name.starts_with(OPERATOR_INSTALL_PREFIX)
}

pub fn is_old_upgrade_operator_test(name: &str) -> bool {
    name.starts_with(OPERATOR_UPGRADE_PREFIX)
}

/// Setup containers and installer steps stand in for "did the cluster come up".
pub fn is_install_step_equivalent(name: &str) -> bool {
    name.ends_with("container setup")
        || name.ends_with(INSTALL_OVERALL_TEST_NAME)
        || name.contains("ipi-install-install")
        || name.contains("upi-install-")
}

pub fn is_upgrade_started_test(name: &str) -> bool {
    name == UPGRADE_STARTED_TEST_NAME
}

pub fn is_operators_upgraded_test(name: &str) -> bool {
    name == OPERATORS_UPGRADED_TEST_NAME
}

pub fn is_machine_config_pools_upgraded_test(name: &str) -> bool {
    name == MACHINE_CONFIG_POOLS_UPGRADED_TEST_NAME
}

pub fn is_synthetic_test(name: &str) -> bool {
    SYNTHETIC_TEST_NAMES.contains(&name)
}

/// e2e tests run by the `openshift-tests` binary.
pub fn is_openshift_test(name: &str) -> bool {
    (name.starts_with("[sig-") || name.starts_with("[Feature:") || name.starts_with("[k8s.io]"))
        && !name.starts_with("[sig-sippy]")
        && !is_upgrade_started_test(name)
        && !is_operators_upgraded_test(name)
        && !is_machine_config_pools_upgraded_test(name)
}

pub fn operator_name_from_test(name: &str) -> String {
    [
        OPERATOR_FINAL_HEALTH_PREFIX,
        OPERATOR_INSTALL_PREFIX,
        OPERATOR_UPGRADE_PREFIX,
    ]
    .iter()
    .find_map(|prefix| name.strip_prefix(prefix))
    .unwrap_or(name)
    .trim()
    .to_owned()
}

/// Canonical aggregation key for a raw TestGrid test name.
pub fn normalize_test_name(name: &str) -> String {
    let renamed = if is_old_install_operator_test(name) || is_old_upgrade_operator_test(name) {
        format!(
            "{OPERATOR_FINAL_HEALTH_PREFIX}{}",
            operator_name_from_test(name)
        )
    } else {
        name.to_owned()
    };

    if RANDOM_OPERATOR_TEST_START.is_match(&renamed) {
        RANDOM_OPERATOR_NAMESPACE
            .replace_all(&renamed, RANDOM_OPERATOR_NAMESPACE_REPLACEMENT)
            .into_owned()
    } else {
        renamed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_marker_matches_bare_and_suffixed_forms() {
        assert!(is_overall_test("Overall"));
        assert!(is_overall_test("periodic-ci-foo.Overall"));
        assert!(!is_overall_test("Overall status"));
    }

    #[test]
    fn old_style_operator_names_are_rewritten_to_final_health_form() {
        assert_eq!(
            normalize_test_name("operator install authentication"),
            "operator conditions authentication"
        );
        assert_eq!(
            normalize_test_name("Operator upgrade etcd"),
            "operator conditions etcd"
        );
        assert_eq!(
            normalize_test_name("[sig-network] pods should run"),
            "[sig-network] pods should run"
        );
    }

    #[test]
    fn random_operator_namespaces_are_replaced() {
        let name = r#""Installing "Red Hat Integration - 3scale" operator in test-abcxyz""#;
        let normalized = normalize_test_name(name);
        assert!(normalized.contains("operator in test namespace"));
        assert!(!normalized.contains("test-abcxyz"));

        let unrelated = "something operator in test-abcxyz";
        assert_eq!(normalize_test_name(unrelated), unrelated);
    }

    #[test]
    fn non_predictive_denylist_covers_scaffolding_steps() {
        assert!(is_non_predictive_test("Run multi-stage test e2e-aws - e2e-aws container test"));
        assert!(is_non_predictive_test("operator.Build image src"));
        assert!(is_non_predictive_test("Monitor cluster while tests execute"));
        assert!(is_non_predictive_test(
            "[sig-arch][Feature:ClusterUpgrade] Cluster should remain functional during upgrade"
        ));
        assert!(!is_non_predictive_test("[sig-network] Services should serve endpoints"));
    }

    #[test]
    fn openshift_tests_exclude_upgrade_markers_and_synthetics() {
        assert!(is_openshift_test("[sig-network] Services should serve endpoints"));
        assert!(!is_openshift_test(UPGRADE_STARTED_TEST_NAME));
        assert!(!is_openshift_test(INSTALL_TEST_NAME));
        assert!(!is_openshift_test("operator conditions etcd"));
    }
}
