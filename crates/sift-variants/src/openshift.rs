use std::collections::{BTreeMap, BTreeSet, HashSet};

use regex::Regex;
use sift_config::parse_release_version;

use crate::{ClusterMetadata, TerminalTag, VariantCategory, VariantFlag, VariantManager, VariantSet};

/// First release in which OVN replaced SDN as the default network.
const OVN_DEFAULT_RELEASE: (u32, u32) = (4, 12);

/// Jobs that are new or near-permafail and kept out of variant statistics
/// until they stabilise.
pub const DEFAULT_NEVER_STABLE_JOBS: &[&str] = &[
    "periodic-ci-openshift-release-master-nightly-4.10-e2e-azurestack-csi",
    "periodic-ci-openshift-release-master-nightly-4.11-e2e-azurestack-csi",
    "periodic-ci-openshift-release-master-ci-4.11-upgrade-from-stable-4.10-e2e-aws-upgrade-infra",
    "periodic-ci-openshift-release-master-ci-4.11-upgrade-from-stable-4.10-e2e-azure-ovn-upgrade",
    "periodic-ci-openshift-release-master-nightly-4.11-upgrade-from-stable-4.10-e2e-metal-ipi-upgrade-ovn-ipv6",
    "periodic-ci-shiftstack-shiftstack-ci-main-periodic-4.11-upgrade-from-stable-4.10-e2e-openstack-upgrade",
    "periodic-ci-openshift-release-master-nightly-4.10-e2e-telco5g",
    "periodic-ci-openshift-release-master-nightly-4.11-e2e-telco5g",
    "periodic-ci-openshift-multiarch-master-nightly-4.10-ocp-e2e-aws-arm64-single-node",
    "periodic-ci-openshift-multiarch-master-nightly-4.11-ocp-e2e-aws-arm64-single-node",
    "periodic-ci-openshift-release-master-ci-4.10-e2e-aws-upgrade-single-node",
    "periodic-ci-openshift-release-master-ci-4.10-e2e-azure-upgrade-single-node",
    "periodic-ci-openshift-release-master-ci-4.11-e2e-aws-upgrade-single-node",
    "periodic-ci-openshift-release-master-ci-4.11-e2e-azure-upgrade-single-node",
    "periodic-ci-openshift-release-master-nightly-4.10-e2e-aws-single-node-serial",
    "periodic-ci-openshift-release-master-nightly-4.11-e2e-aws-single-node-serial",
    "cucushift",
    "periodic-ci-openshift-verification-tests-master-nightly-4.10-upgrade-from-stable-4.9-azure-ipi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.10-e2e-baremetal-ipi",
    "periodic-ci-openshift-verification-tests-master-stable-4.10-e2e-azure-ipi",
    "periodic-ci-openshift-verification-tests-master-stable-4.10-upgrade-from-stable-4.9-azure-ipi",
    "periodic-ci-openshift-verification-tests-master-stable-4.10-e2e-baremetal-ipi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.10-e2e-aws-ipi-destructive",
    "periodic-ci-openshift-verification-tests-master-stable-4.10-upgrade-from-stable-4.9-openstack-ipi",
    "periodic-ci-openshift-verification-tests-master-stable-4.10-e2e-aws-ipi-destructive",
    "periodic-ci-openshift-verification-tests-master-nightly-4.10-upgrade-from-stable-4.9-openstack-ipi",
    "periodic-ci-openshift-verification-tests-master-stable-4.10-upgrade-from-stable-4.9-baremetal-ipi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.10-upgrade-from-stable-4.9-baremetal-ipi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.10-e2e-azure-ipi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-e2e-azure-ipi-proxy",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-e2e-aws-ipi-private",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-e2e-vsphere-ipi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-e2e-aws-ipi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-e2e-azure-ipi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-e2e-vsphere-upi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-e2e-gcp-ipi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-e2e-gcp-upi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-e2e-aws-ipi-proxy",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-e2e-vsphere-ipi-proxy",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-upgrade-from-stable-4.10-aws-ipi",
    "periodic-ci-openshift-verification-tests-master-nightly-4.11-upgrade-from-stable-4.10-azure-ipi",
    "release-openshift-ocp-osd-aws-nightly-4.10",
    "release-openshift-ocp-osd-gcp-nightly-4.10",
    "release-openshift-ocp-osd-aws-nightly-4.11",
    "release-openshift-ocp-osd-gcp-nightly-4.11",
    "release-openshift-ocp-installer-e2e-metal-4.10",
    "release-openshift-ocp-installer-e2e-metal-4.11",
    "release-openshift-ocp-installer-e2e-metal-compact-4.10",
    "release-openshift-ocp-installer-e2e-metal-compact-4.11",
    "release-openshift-ocp-installer-e2e-metal-serial-4.10",
    "release-openshift-ocp-installer-e2e-metal-serial-4.11",
    "periodic-ci-openshift-multiarch-master-nightly-4.10-ocp-e2e-aws-ovn-arm64",
    "periodic-ci-openshift-multiarch-master-nightly-4.10-ocp-e2e-compact-remote-libvirt-ppc64le",
    "periodic-ci-openshift-multiarch-master-nightly-4.10-ocp-e2e-compact-remote-libvirt-s390x",
    "periodic-ci-openshift-multiarch-master-nightly-4.10-upgrade-from-nightly-4.9-ocp-e2e-aws-arm64",
    "periodic-ci-openshift-multiarch-master-nightly-4.11-ocp-e2e-aws-ovn-arm64",
    "periodic-ci-openshift-multiarch-master-nightly-4.11-ocp-e2e-compact-remote-libvirt-ppc64le",
    "periodic-ci-openshift-multiarch-master-nightly-4.11-ocp-e2e-compact-remote-libvirt-s390x",
    "periodic-ci-openshift-multiarch-master-nightly-4.11-upgrade-from-nightly-4.10-ocp-e2e-aws-arm64",
    "periodic-ci-openshift-multiarch-master-nightly-4.9-ocp-e2e-compact-remote-libvirt-s390x",
    "periodic-ci-openshift-multiarch-master-nightly-4.9-ocp-image-ecosystem-remote-libvirt-ppc64le",
    "periodic-ci-openshift-multiarch-master-nightly-4.9-ocp-image-ecosystem-remote-libvirt-s390x",
    "periodic-ci-openshift-multiarch-master-nightly-4.9-upgrade-from-nightly-4.8-ocp-remote-libvirt-ppc64le",
    "periodic-ci-openshift-multiarch-master-nightly-4.9-upgrade-from-nightly-4.8-ocp-remote-libvirt-s390x",
    "periodic-ci-openshift-release-master-ci-4.10-upgrade-from-stable-4.9-e2e-aws-ovn-upgrade-rollback",
    "periodic-ci-openshift-release-master-ci-4.10-upgrade-from-stable-4.9-e2e-aws-upgrade-rollback",
    "periodic-ci-openshift-release-master-ci-4.10-upgrade-from-stable-4.9-e2e-azure-ovn-upgrade",
    "periodic-ci-openshift-release-master-ci-4.10-upgrade-from-stable-4.9-e2e-openstack-upgrade",
    "periodic-ci-openshift-release-master-ci-4.10-upgrade-from-stable-4.9-from-stable-4.8-e2e-aws-upgrade",
    "periodic-ci-openshift-release-master-ci-4.9-upgrade-from-stable-4.8-e2e-aws-uwm",
    "periodic-ci-openshift-release-master-ci-4.9-upgrade-from-stable-4.8-e2e-azure-ovn-upgrade",
    "periodic-ci-openshift-release-master-ci-4.9-upgrade-from-stable-4.8-e2e-gcp-ovn-upgrade",
    "periodic-ci-openshift-release-master-ci-4.9-upgrade-from-stable-4.8-e2e-openstack-upgrade",
    "periodic-ci-openshift-release-master-ci-4.9-upgrade-from-stable-4.8-from-stable-4.7-e2e-aws-upgrade",
    "periodic-ci-openshift-release-master-nightly-4.10-e2e-aws-ovn-local-gateway",
    "periodic-ci-openshift-release-master-nightly-4.10-e2e-gcp-fips",
    "periodic-ci-openshift-release-master-nightly-4.10-e2e-gcp-libvirt-cert-rotation",
    "periodic-ci-openshift-release-master-nightly-4.10-e2e-metal-ipi-serial-compact",
    "periodic-ci-openshift-release-master-nightly-4.10-e2e-vsphere-proxy",
    "periodic-ci-openshift-release-master-nightly-4.10-upgrade-from-stable-4.8-e2e-aws-upgrade-paused",
    "periodic-ci-openshift-release-master-nightly-4.9-e2e-aws-fips-serial",
    "periodic-ci-openshift-release-master-nightly-4.9-e2e-aws-upgrade-rollback-oldest-supported",
    "periodic-ci-openshift-release-master-nightly-4.9-e2e-gcp-libvirt-cert-rotation",
    "periodic-ci-openshift-release-master-nightly-4.9-e2e-metal-ipi-compact",
    "periodic-ci-openshift-release-master-nightly-4.9-e2e-openstack-az",
    "periodic-ci-openshift-release-master-nightly-4.9-e2e-openstack-fips",
    "periodic-ci-openshift-release-master-nightly-4.9-e2e-openstack-proxy",
    "release-openshift-origin-installer-e2e-aws-disruptive-4.9",
    "release-openshift-origin-installer-e2e-aws-disruptive-4.10",
    "release-openshift-origin-installer-e2e-aws-disruptive-4.11",
    "release-openshift-origin-installer-e2e-aws-upgrade-4.6-to-4.7-to-4.8-to-4.9-ci",
    "release-openshift-origin-installer-e2e-aws-upgrade-4.7-to-4.8-to-4.9-to-4.10-ci",
    "periodic-ci-openshift-release-master-nightly-4.9-e2e-aws-workers-rhel7",
    "periodic-ci-openshift-release-master-nightly-4.10-e2e-aws-workers-rhel7",
    "periodic-ci-openshift-release-master-nightly-4.11-e2e-aws-workers-rhel7",
    "periodic-ci-openshift-release-master-ci-4.9-e2e-aws-calico",
    "periodic-ci-openshift-release-master-ci-4.10-e2e-aws-calico",
    "periodic-ci-openshift-release-master-ci-4.11-e2e-aws-calico",
    "periodic-ci-openshift-release-master-ci-4.10-e2e-azure-cilium",
    "periodic-ci-openshift-release-master-ci-4.10-e2e-gcp-cilium",
    "periodic-ci-openshift-release-master-ci-4.11-e2e-azure-cilium",
    "periodic-ci-openshift-release-master-ci-4.11-e2e-gcp-cilium",
    "periodic-ci-openshift-release-master-ci-4.9-e2e-azure-cilium",
    "periodic-ci-openshift-release-master-ci-4.9-e2e-gcp-cilium",
    "periodic-ci-openshift-multiarch-master-nightly-4.9-ocp-e2e-compact-remote-libvirt-ppc64le",
    "periodic-ci-openshift-multiarch-master-nightly-4.9-ocp-e2e-remote-libvirt-ppc64le",
    "periodic-ci-openshift-multiarch-master-nightly-4.9-ocp-e2e-remote-libvirt-s390x",
    "periodic-ci-openshift-release-master-ci-4.9-e2e-aws-network-stress",
    "periodic-ci-openshift-release-master-ci-4.9-e2e-aws-ovn-network-stress",
    "periodic-ci-openshift-release-master-ci-4.10-e2e-aws-network-stress",
    "periodic-ci-openshift-release-master-ci-4.10-e2e-aws-ovn-network-stress",
    "periodic-ci-openshift-release-master-ci-4.11-e2e-aws-network-stress",
    "periodic-ci-openshift-release-master-ci-4.11-e2e-aws-ovn-network-stress",
];

enum Matcher {
    Pattern(Regex),
    AllOf(Vec<Regex>),
    AnyOf(Vec<Matcher>),
}

impl Matcher {
    fn matches(&self, job_name: &str) -> bool {
        match self {
            Self::Pattern(regex) => regex.is_match(job_name),
            Self::AllOf(regexes) => regexes.iter().all(|regex| regex.is_match(job_name)),
            Self::AnyOf(matchers) => matchers.iter().any(|matcher| matcher.matches(job_name)),
        }
    }
}

struct Rule<T> {
    matcher: Matcher,
    value: T,
}

impl<T: Copy> Rule<T> {
    fn new(pattern: &str, value: T) -> Self {
        Self {
            matcher: Matcher::Pattern(compile(pattern)),
            value,
        }
    }

    fn with(matcher: Matcher, value: T) -> Self {
        Self { matcher, value }
    }
}

/// Ordered rules; the first match wins.
struct RuleList<T>(Vec<Rule<T>>);

impl<T: Copy> RuleList<T> {
    fn first_match(&self, job_name: &str) -> Option<T> {
        self.0
            .iter()
            .find(|rule| rule.matcher.matches(job_name))
            .map(|rule| rule.value)
    }

    fn all_matches<'a>(&'a self, job_name: &'a str) -> impl Iterator<Item = T> + 'a {
        self.0
            .iter()
            .filter(move |rule| rule.matcher.matches(job_name))
            .map(|rule| rule.value)
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("variant pattern is valid")
}

/// The OpenShift job-naming taxonomy, compiled once and read-only afterwards.
pub struct OpenshiftVariants {
    never_stable: HashSet<String>,
    terminal: RuleList<TerminalTag>,
    platform: RuleList<&'static str>,
    arch: RuleList<&'static str>,
    network: RuleList<&'static str>,
    upgrade: Regex,
    upgrade_minor: Regex,
    topology: RuleList<&'static str>,
    control_plane: RuleList<&'static str>,
    serial: Regex,
    flags: RuleList<VariantFlag>,
}

impl Default for OpenshiftVariants {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenshiftVariants {
    pub fn new() -> Self {
        Self::with_extra_never_stable(std::iter::empty::<String>())
    }

    pub fn with_extra_never_stable<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut never_stable = DEFAULT_NEVER_STABLE_JOBS
            .iter()
            .map(|job| (*job).to_owned())
            .collect::<HashSet<_>>();
        never_stable.extend(extra.into_iter().map(Into::into));

        Self {
            never_stable,
            // Never-stable is a name lookup and is checked before these.
            terminal: RuleList(vec![
                Rule::new("-techpreview", TerminalTag::Techpreview),
                Rule::new("^promote-", TerminalTag::Promote),
                Rule::new("aggregated-", TerminalTag::Aggregated),
            ]),
            platform: RuleList(vec![
                Rule::new("-alibaba", "alibaba"),
                Rule::new("-aws", "aws"),
                Rule::new("-azure", "azure"),
                Rule::new("-gcp", "gcp"),
                Rule::new("-libvirt", "libvirt"),
                Rule::with(
                    Matcher::AnyOf(vec![
                        Matcher::Pattern(compile("-metal-assisted")),
                        Matcher::AllOf(vec![compile("-metal"), compile("-single-node")]),
                    ]),
                    "metal-assisted",
                ),
                Rule::new("-metal-ipi", "metal-ipi"),
                Rule::new("-metal", "metal-upi"),
                Rule::new("-openstack", "openstack"),
                Rule::new("-ovirt", "ovirt"),
                Rule::new("-vsphere.*-upi", "vsphere-upi"),
                Rule::new("-vsphere", "vsphere-ipi"),
            ]),
            arch: RuleList(vec![
                Rule::new("-arm64", "arm64"),
                Rule::new("-ppc64le", "ppc64le"),
                Rule::new("-s390x", "s390x"),
                Rule::new("-heterogeneous", "heterogeneous"),
            ]),
            network: RuleList(vec![Rule::new("-ovn", "ovn"), Rule::new("-sdn", "sdn")]),
            upgrade: compile("-upgrade"),
            upgrade_minor: compile(r"(-\d+\.\d+-.*-.*-\d+\.\d+)|(-\d+\.\d+-minor)"),
            topology: RuleList(vec![
                Rule::new("-single-node", "single-node"),
                Rule::new("-hypershift", "hypershift"),
                Rule::new("-compact", "compact"),
            ]),
            control_plane: RuleList(vec![
                Rule::new("-hypershift", "hypershift"),
                Rule::new("-microshift", "microshift"),
            ]),
            serial: compile("-serial"),
            flags: RuleList(vec![
                Rule::new("-assisted", VariantFlag::Assisted),
                Rule::new("-etcd-scaling", VariantFlag::EtcdScaling),
                Rule::new("-osd", VariantFlag::Osd),
                Rule::new("-fips", VariantFlag::Fips),
                Rule::new("-rt", VariantFlag::Realtime),
                Rule::new("-proxy", VariantFlag::Proxy),
            ]),
        }
    }

    fn terminal_tag(&self, job_name: &str) -> Option<TerminalTag> {
        if self.is_job_never_stable(job_name) {
            return Some(TerminalTag::NeverStable);
        }
        self.terminal.first_match(job_name)
    }

    fn platform(&self, job_name: &str, cluster: &ClusterMetadata) -> String {
        if let Some(platform) = self.platform.first_match(job_name) {
            return platform.to_owned();
        }
        if let Some(platform) = non_empty(cluster.platform.as_deref()) {
            return platform.to_owned();
        }
        tracing::warn!(job = job_name, "unable to determine platform from job name");
        String::new()
    }

    fn arch(&self, job_name: &str, cluster: &ClusterMetadata) -> String {
        self.arch
            .first_match(job_name)
            .or_else(|| non_empty(cluster.arch.as_deref()))
            .unwrap_or("amd64")
            .to_owned()
    }

    fn network(&self, job_name: &str, release: &str, cluster: &ClusterMetadata) -> String {
        if let Some(network) = self
            .network
            .first_match(job_name)
            .or_else(|| non_empty(cluster.network.as_deref()))
        {
            return network.to_owned();
        }

        match parse_release_version(release) {
            Some(version) if version >= OVN_DEFAULT_RELEASE => "ovn".to_owned(),
            Some(_) => "sdn".to_owned(),
            None => {
                tracing::warn!(
                    job = job_name,
                    release,
                    "could not determine network type"
                );
                String::new()
            }
        }
    }

    fn upgrade(&self, job_name: &str) -> &'static str {
        if !self.upgrade.is_match(job_name) {
            "none"
        } else if self.upgrade_minor.is_match(job_name) {
            "minor"
        } else {
            "micro"
        }
    }

    fn topology(&self, job_name: &str, cluster: &ClusterMetadata) -> String {
        self.topology
            .first_match(job_name)
            .or_else(|| non_empty(cluster.topology.as_deref()))
            .unwrap_or("ha")
            .to_owned()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

impl VariantManager for OpenshiftVariants {
    fn identify_variants(
        &self,
        job_name: &str,
        release: &str,
        cluster: &ClusterMetadata,
    ) -> VariantSet {
        if let Some(tag) = self.terminal_tag(job_name) {
            return VariantSet::terminal(tag);
        }

        let mut categories = BTreeMap::new();
        categories.insert(VariantCategory::Platform, self.platform(job_name, cluster));
        categories.insert(VariantCategory::Arch, self.arch(job_name, cluster));
        categories.insert(
            VariantCategory::Network,
            self.network(job_name, release, cluster),
        );
        categories.insert(VariantCategory::Upgrade, self.upgrade(job_name).to_owned());
        categories.insert(VariantCategory::Topology, self.topology(job_name, cluster));
        if let Some(control_plane) = self.control_plane.first_match(job_name) {
            categories.insert(VariantCategory::ControlPlane, control_plane.to_owned());
        }
        let suite = if self.serial.is_match(job_name) {
            "serial"
        } else {
            "parallel"
        };
        categories.insert(VariantCategory::Suite, suite.to_owned());

        let flags = self.flags.all_matches(job_name).collect::<BTreeSet<_>>();

        VariantSet::Classified { categories, flags }
    }

    fn is_job_never_stable(&self, job_name: &str) -> bool {
        self.never_stable.contains(job_name)
    }
}
