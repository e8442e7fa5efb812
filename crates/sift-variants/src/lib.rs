mod openshift;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sift_config::{VariantScheme, VariantsConfig};

pub use openshift::{DEFAULT_NEVER_STABLE_JOBS, OpenshiftVariants};

pub const NEVER_STABLE_TAG: &str = "never-stable";
pub const TECHPREVIEW_TAG: &str = "techpreview";
pub const PROMOTE_TAG: &str = "promote";
pub const AGGREGATED_TAG: &str = "aggregated";

/// Every flat tag `VariantSet::tags` can produce.
pub const KNOWN_TAGS: &[&str] = &[
    "aggregated",
    "alibaba",
    "amd64",
    "arm64",
    "assisted",
    "aws",
    "azure",
    "compact",
    "etcd-scaling",
    "fips",
    "gcp",
    "ha",
    "heterogeneous",
    "hypershift",
    "libvirt",
    "metal-assisted",
    "metal-ipi",
    "metal-upi",
    "microshift",
    "never-stable",
    "openstack",
    "osd",
    "ovirt",
    "ovn",
    "ppc64le",
    "promote",
    "proxy",
    "realtime",
    "s390x",
    "sdn",
    "serial",
    "single-node",
    "techpreview",
    "upgrade",
    "upgrade-micro",
    "upgrade-minor",
    "vsphere-ipi",
    "vsphere-upi",
];

/// Classifications that exclude a job from every other variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalTag {
    NeverStable,
    Techpreview,
    Promote,
    Aggregated,
}

impl TerminalTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NeverStable => NEVER_STABLE_TAG,
            Self::Techpreview => TECHPREVIEW_TAG,
            Self::Promote => PROMOTE_TAG,
            Self::Aggregated => AGGREGATED_TAG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VariantCategory {
    Platform,
    Arch,
    Network,
    Upgrade,
    Topology,
    ControlPlane,
    Suite,
}

impl VariantCategory {
    pub const ALL: [VariantCategory; 7] = [
        Self::Platform,
        Self::Arch,
        Self::Network,
        Self::Upgrade,
        Self::Topology,
        Self::ControlPlane,
        Self::Suite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Platform => "Platform",
            Self::Arch => "Arch",
            Self::Network => "Network",
            Self::Upgrade => "Upgrade",
            Self::Topology => "Topology",
            Self::ControlPlane => "ControlPlane",
            Self::Suite => "Suite",
        }
    }
}

impl std::str::FromStr for VariantCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| {
                format!(
                    "invalid variant category '{value}', expected one of: Platform, Arch, Network, Upgrade, Topology, ControlPlane, Suite"
                )
            })
    }
}

/// Independent boolean properties; any number may apply to one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariantFlag {
    Assisted,
    EtcdScaling,
    Osd,
    Fips,
    Realtime,
    Proxy,
}

impl VariantFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assisted => "assisted",
            Self::EtcdScaling => "etcd-scaling",
            Self::Osd => "osd",
            Self::Fips => "fips",
            Self::Realtime => "realtime",
            Self::Proxy => "proxy",
        }
    }
}

/// Cluster facts reported by a job run, used where the job name is silent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClusterMetadata {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub topology: Option<String>,
}

/// The variants of one job. A terminal tag carries nothing else; otherwise
/// each category holds at most one value and flags accumulate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariantSet {
    Terminal {
        tag: TerminalTag,
    },
    Classified {
        categories: BTreeMap<VariantCategory, String>,
        flags: BTreeSet<VariantFlag>,
    },
}

impl Default for VariantSet {
    fn default() -> Self {
        Self::Classified {
            categories: BTreeMap::new(),
            flags: BTreeSet::new(),
        }
    }
}

impl VariantSet {
    pub fn terminal(tag: TerminalTag) -> Self {
        Self::Terminal { tag }
    }

    pub fn terminal_tag(&self) -> Option<TerminalTag> {
        match self {
            Self::Terminal { tag } => Some(*tag),
            Self::Classified { .. } => None,
        }
    }

    pub fn is_never_stable(&self) -> bool {
        self.terminal_tag() == Some(TerminalTag::NeverStable)
    }

    pub fn is_techpreview(&self) -> bool {
        self.terminal_tag() == Some(TerminalTag::Techpreview)
    }

    pub fn get(&self, category: VariantCategory) -> Option<&str> {
        match self {
            Self::Terminal { .. } => None,
            Self::Classified { categories, .. } => categories.get(&category).map(String::as_str),
        }
    }

    pub fn has_flag(&self, flag: VariantFlag) -> bool {
        match self {
            Self::Terminal { .. } => false,
            Self::Classified { flags, .. } => flags.contains(&flag),
        }
    }

    /// Category-map projection. Terminal sets are keyed under `Terminal`.
    pub fn categories(&self) -> BTreeMap<String, String> {
        match self {
            Self::Terminal { tag } => {
                BTreeMap::from([("Terminal".to_owned(), tag.as_str().to_owned())])
            }
            Self::Classified { categories, .. } => categories
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(category, value)| (category.as_str().to_owned(), value.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    /// Flat-tag projection, the shape variant buckets are grouped by.
    pub fn tags(&self) -> Vec<String> {
        let (categories, flags) = match self {
            Self::Terminal { tag } => return vec![tag.as_str().to_owned()],
            Self::Classified { categories, flags } => (categories, flags),
        };

        let mut tags: Vec<String> = Vec::new();
        let mut push = |tag: &str| {
            if !tag.is_empty() && !tags.iter().any(|existing| existing == tag) {
                tags.push(tag.to_owned());
            }
        };

        if let Some(platform) = categories.get(&VariantCategory::Platform) {
            push(platform.as_str());
        }
        if let Some(arch) = categories.get(&VariantCategory::Arch) {
            push(arch.as_str());
        }
        match categories
            .get(&VariantCategory::Upgrade)
            .map(String::as_str)
        {
            Some("minor") => {
                push("upgrade");
                push("upgrade-minor");
            }
            Some("micro") => {
                push("upgrade");
                push("upgrade-micro");
            }
            _ => {}
        }
        if let Some(network) = categories.get(&VariantCategory::Network) {
            push(network.as_str());
        }
        if let Some(topology) = categories.get(&VariantCategory::Topology) {
            push(topology.as_str());
        }
        if let Some(control_plane) = categories.get(&VariantCategory::ControlPlane) {
            push(control_plane.as_str());
        }
        if categories
            .get(&VariantCategory::Suite)
            .is_some_and(|suite| suite == "serial")
        {
            push("serial");
        }
        for flag in flags {
            push(flag.as_str());
        }

        tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|candidate| candidate == tag)
    }
}

/// A variant scheme: how job names map to variants.
pub trait VariantManager: Send + Sync {
    fn identify_variants(
        &self,
        job_name: &str,
        release: &str,
        cluster: &ClusterMetadata,
    ) -> VariantSet;

    fn is_job_never_stable(&self, job_name: &str) -> bool;
}

/// Scheme for CI systems without a naming convention: every job is
/// unclassified.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVariants;

impl VariantManager for NoVariants {
    fn identify_variants(
        &self,
        _job_name: &str,
        _release: &str,
        _cluster: &ClusterMetadata,
    ) -> VariantSet {
        VariantSet::default()
    }

    fn is_job_never_stable(&self, _job_name: &str) -> bool {
        false
    }
}

pub fn variant_manager_from_config(config: &VariantsConfig) -> Arc<dyn VariantManager> {
    match config.scheme {
        VariantScheme::Openshift => Arc::new(OpenshiftVariants::with_extra_never_stable(
            config.extra_never_stable.iter().cloned(),
        )),
        VariantScheme::None => Arc::new(NoVariants),
    }
}

/// Convenience entry point for one-off lookups.
pub fn classify_job(
    manager: &dyn VariantManager,
    job_name: &str,
    release: &str,
    cluster: &ClusterMetadata,
) -> VariantSet {
    manager.identify_variants(job_name, release, cluster)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(pairs: &[(VariantCategory, &str)], flags: &[VariantFlag]) -> VariantSet {
        VariantSet::Classified {
            categories: pairs
                .iter()
                .map(|(category, value)| (*category, (*value).to_owned()))
                .collect(),
            flags: flags.iter().copied().collect(),
        }
    }

    #[test]
    fn terminal_sets_project_to_a_single_tag() {
        let set = VariantSet::terminal(TerminalTag::Techpreview);
        assert_eq!(set.tags(), vec!["techpreview"]);
        assert_eq!(set.get(VariantCategory::Platform), None);
        assert!(set.is_techpreview());
    }

    #[test]
    fn tags_projection_expands_upgrade_and_skips_defaults() {
        let set = classified(
            &[
                (VariantCategory::Platform, "aws"),
                (VariantCategory::Arch, "amd64"),
                (VariantCategory::Network, "ovn"),
                (VariantCategory::Upgrade, "minor"),
                (VariantCategory::Topology, "hypershift"),
                (VariantCategory::ControlPlane, "hypershift"),
                (VariantCategory::Suite, "parallel"),
            ],
            &[VariantFlag::Fips],
        );
        assert_eq!(
            set.tags(),
            vec![
                "aws",
                "amd64",
                "upgrade",
                "upgrade-minor",
                "ovn",
                "hypershift",
                "fips"
            ]
        );
        assert!(set.has_tag("upgrade"));
        assert!(!set.has_tag("parallel"));
    }

    #[test]
    fn categories_projection_drops_empty_values() {
        let set = classified(
            &[
                (VariantCategory::Platform, ""),
                (VariantCategory::Arch, "arm64"),
            ],
            &[],
        );
        let categories = set.categories();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories.get("Arch").map(String::as_str), Some("arm64"));
    }

    #[test]
    fn category_names_parse_case_insensitively() {
        assert_eq!(
            "platform".parse::<VariantCategory>(),
            Ok(VariantCategory::Platform)
        );
        assert!("color".parse::<VariantCategory>().is_err());
    }

    #[test]
    fn no_variants_scheme_classifies_nothing() {
        let set = NoVariants.identify_variants("anything-aws", "4.12", &ClusterMetadata::default());
        assert!(set.tags().is_empty());
        assert!(!NoVariants.is_job_never_stable("anything-aws"));
    }

    #[test]
    fn config_selects_scheme() {
        let config = VariantsConfig {
            scheme: VariantScheme::None,
            extra_never_stable: Vec::new(),
        };
        let manager = variant_manager_from_config(&config);
        assert!(
            manager
                .identify_variants("e2e-aws", "4.12", &ClusterMetadata::default())
                .tags()
                .is_empty()
        );
    }
}
