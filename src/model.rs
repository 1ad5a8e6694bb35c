use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Placeholder for clusters that reported nothing for a row.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Deployments,
    CronJobs,
    StatefulSets,
}

impl ResourceKind {
    pub const ALL: [Self; 3] = [Self::Deployments, Self::CronJobs, Self::StatefulSets];

    pub fn title(self) -> &'static str {
        match self {
            Self::Deployments => "Deployments",
            Self::CronJobs => "CronJobs",
            Self::StatefulSets => "StatefulSets",
        }
    }

    /// Singular Kubernetes kind, as used on the update-check wire.
    pub fn api_kind(self) -> &'static str {
        match self {
            Self::Deployments => "Deployment",
            Self::CronJobs => "CronJob",
            Self::StatefulSets => "StatefulSet",
        }
    }

    pub fn short_token(self) -> &'static str {
        match self {
            Self::Deployments => "deploy",
            Self::CronJobs => "cj",
            Self::StatefulSets => "sts",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "deploy" | "deployment" | "deployments" | "dp" => Some(Self::Deployments),
            "cj" | "cronjob" | "cronjobs" | "cron-job" | "cron-jobs" => Some(Self::CronJobs),
            "sts" | "statefulset" | "statefulsets" | "stateful-set" | "stateful-sets" => {
                Some(Self::StatefulSets)
            }
            _ => None,
        }
    }

    pub fn from_api_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.api_kind() == kind)
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// One workload instance as reported by one cluster.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResourceRecord {
    pub name: String,
    pub namespace: String,
    pub cluster_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub ready: Option<i32>,
    #[serde(default)]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub last_run: Option<String>,
    #[serde(default)]
    pub active: Option<u32>,
    #[serde(default)]
    pub suspend: Option<bool>,
}

impl RawResourceRecord {
    pub fn version(&self) -> String {
        self.images
            .first()
            .filter(|image| !image.is_empty())
            .cloned()
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

/// Kind-specific half of a per-cluster snapshot.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SnapshotDetail {
    Workload {
        ready: Option<i32>,
        replicas: Option<i32>,
    },
    CronJob {
        schedule: String,
        #[serde(rename = "lastRun")]
        last_run: Option<String>,
        active: u32,
        suspend: bool,
    },
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ClusterSnapshot {
    pub version: String,
    pub status: String,
    #[serde(flatten)]
    pub detail: SnapshotDetail,
}

impl ClusterSnapshot {
    pub fn from_record(kind: ResourceKind, record: &RawResourceRecord) -> Self {
        let detail = match kind {
            ResourceKind::CronJobs => SnapshotDetail::CronJob {
                schedule: record.schedule.clone().unwrap_or_default(),
                last_run: record.last_run.clone(),
                active: record.active.unwrap_or(0),
                suspend: record.suspend.unwrap_or(false),
            },
            ResourceKind::Deployments | ResourceKind::StatefulSets => SnapshotDetail::Workload {
                ready: record.ready,
                replicas: record.replicas,
            },
        };

        Self {
            version: record.version(),
            status: record.status.clone(),
            detail,
        }
    }

    /// Entry for a selected cluster that reported nothing for the row.
    pub fn missing(kind: ResourceKind) -> Self {
        let detail = match kind {
            ResourceKind::CronJobs => SnapshotDetail::CronJob {
                schedule: NOT_AVAILABLE.to_string(),
                last_run: Some(NOT_AVAILABLE.to_string()),
                active: 0,
                suspend: false,
            },
            ResourceKind::Deployments | ResourceKind::StatefulSets => SnapshotDetail::Workload {
                ready: None,
                replicas: None,
            },
        };

        Self {
            version: NOT_AVAILABLE.to_string(),
            status: NOT_AVAILABLE.to_string(),
            detail,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.version == NOT_AVAILABLE && self.status == NOT_AVAILABLE
    }
}

/// One workload across clusters, identified by namespace and name.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedRow {
    pub name: String,
    pub namespace: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<String>,
    pub cluster_versions: BTreeMap<String, ClusterSnapshot>,
}

impl GroupedRow {
    /// Version of the entry with the smallest cluster id.
    pub fn representative_version(&self) -> &str {
        self.cluster_versions
            .values()
            .next()
            .map(|snapshot| snapshot.version.as_str())
            .unwrap_or("")
    }
}

/// Grouping key of a workload: `{namespace}-{name}`.
pub fn row_key(namespace: &str, name: &str) -> String {
    format!("{namespace}-{name}")
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Loading,
    Success,
    Error,
}

impl ClusterStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterError {
    /// Display name of the cluster, not its id.
    pub cluster: String,
    pub error: String,
}

/// Combined response for all requested clusters.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CombinedResources {
    #[serde(default)]
    pub deployments: Vec<RawResourceRecord>,
    #[serde(default)]
    pub cronjobs: Vec<RawResourceRecord>,
    #[serde(default)]
    pub statefulsets: Vec<RawResourceRecord>,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub errors: Vec<ClusterError>,
}

impl CombinedResources {
    pub fn records(&self, kind: ResourceKind) -> &[RawResourceRecord] {
        match kind {
            ResourceKind::Deployments => &self.deployments,
            ResourceKind::CronJobs => &self.cronjobs,
            ResourceKind::StatefulSets => &self.statefulsets,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct UpdateQuery {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionUpdate {
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub current_version: Option<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    #[serde(default)]
    pub updates: Vec<VersionUpdate>,
}

/// Identity of a version-update entry: kind, namespace and name.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct UpdateKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl UpdateKey {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for UpdateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.kind.api_kind(),
            self.namespace,
            self.name
        )
    }
}

/// Rows of one namespace, split by kind.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct NamespaceBucket<T> {
    pub deployments: Vec<T>,
    pub cronjobs: Vec<T>,
    pub statefulsets: Vec<T>,
}

impl<T> Default for NamespaceBucket<T> {
    fn default() -> Self {
        Self {
            deployments: Vec::new(),
            cronjobs: Vec::new(),
            statefulsets: Vec::new(),
        }
    }
}

impl<T> NamespaceBucket<T> {
    pub fn get(&self, kind: ResourceKind) -> &[T] {
        match kind {
            ResourceKind::Deployments => &self.deployments,
            ResourceKind::CronJobs => &self.cronjobs,
            ResourceKind::StatefulSets => &self.statefulsets,
        }
    }

    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut Vec<T> {
        match kind {
            ResourceKind::Deployments => &mut self.deployments,
            ResourceKind::CronJobs => &mut self.cronjobs,
            ResourceKind::StatefulSets => &mut self.statefulsets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ClusterSnapshot, NOT_AVAILABLE, RawResourceRecord, ResourceKind, SnapshotDetail, UpdateKey,
    };

    #[test]
    fn resource_aliases_map_to_expected_kinds() {
        assert_eq!(
            ResourceKind::from_token("deploy"),
            Some(ResourceKind::Deployments)
        );
        assert_eq!(ResourceKind::from_token("cj"), Some(ResourceKind::CronJobs));
        assert_eq!(
            ResourceKind::from_token(" StatefulSets "),
            Some(ResourceKind::StatefulSets)
        );
        assert_eq!(ResourceKind::from_token("pods"), None);
        assert_eq!(
            ResourceKind::from_api_kind("CronJob"),
            Some(ResourceKind::CronJobs)
        );
        assert_eq!(ResourceKind::from_api_kind("cronjob"), None);
    }

    #[test]
    fn version_falls_back_to_sentinel() {
        let mut record = RawResourceRecord::default();
        assert_eq!(record.version(), NOT_AVAILABLE);

        record.images = vec![String::new()];
        assert_eq!(record.version(), NOT_AVAILABLE);

        record.images = vec!["app:1.0".to_string(), "sidecar:2".to_string()];
        assert_eq!(record.version(), "app:1.0");
    }

    #[test]
    fn cronjob_snapshot_defaults_active_and_suspend() {
        let record = RawResourceRecord {
            name: "backup".to_string(),
            namespace: "ops".to_string(),
            cluster_id: "cluster-dev".to_string(),
            status: "Scheduled".to_string(),
            schedule: Some("0 2 * * *".to_string()),
            ..RawResourceRecord::default()
        };

        let snapshot = ClusterSnapshot::from_record(ResourceKind::CronJobs, &record);
        assert_eq!(
            snapshot.detail,
            SnapshotDetail::CronJob {
                schedule: "0 2 * * *".to_string(),
                last_run: None,
                active: 0,
                suspend: false,
            }
        );
        assert!(!snapshot.is_missing());
        assert!(ClusterSnapshot::missing(ResourceKind::CronJobs).is_missing());
    }

    #[test]
    fn update_key_renders_kind_namespace_name() {
        let key = UpdateKey::new(ResourceKind::StatefulSets, "data", "postgres");
        assert_eq!(key.to_string(), "StatefulSet-data-postgres");
    }
}
