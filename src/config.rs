use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CLUSTER_ID: &str = "cluster-dev";

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub id: String,
    pub name: String,
    /// Kubeconfig context; the current context is used when absent.
    #[serde(default)]
    pub context: Option<String>,
}

/// Static cluster registry: ids, display names and kube contexts.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ClusterRegistry {
    clusters: Vec<ClusterInfo>,
    default_cluster: String,
}

impl Default for ClusterRegistry {
    fn default() -> Self {
        Self {
            clusters: vec![ClusterInfo {
                id: DEFAULT_CLUSTER_ID.to_string(),
                name: "Development".to_string(),
                context: None,
            }],
            default_cluster: DEFAULT_CLUSTER_ID.to_string(),
        }
    }
}

impl ClusterRegistry {
    pub fn new(clusters: Vec<ClusterInfo>, default_cluster: Option<String>) -> Result<Self> {
        if clusters.is_empty() {
            anyhow::bail!("cluster registry must contain at least one cluster");
        }

        let mut seen = HashSet::new();
        for cluster in &clusters {
            if cluster.id.trim().is_empty() {
                anyhow::bail!("cluster '{}' has an empty id", cluster.name);
            }
            if !seen.insert(cluster.id.as_str()) {
                anyhow::bail!("cluster id '{}' is registered twice", cluster.id);
            }
        }

        let default_cluster = match default_cluster {
            Some(id) => {
                if !clusters.iter().any(|cluster| cluster.id == id) {
                    anyhow::bail!("default cluster '{id}' is not registered");
                }
                id
            }
            None if clusters.iter().any(|cluster| cluster.id == DEFAULT_CLUSTER_ID) => {
                DEFAULT_CLUSTER_ID.to_string()
            }
            None => clusters[0].id.clone(),
        };

        Ok(Self {
            clusters,
            default_cluster,
        })
    }

    pub fn clusters(&self) -> &[ClusterInfo] {
        &self.clusters
    }

    pub fn get(&self, id: &str) -> Option<&ClusterInfo> {
        self.clusters.iter().find(|cluster| cluster.id == id)
    }

    /// Display name for an id; unknown ids are shown as-is.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map(|cluster| cluster.name.as_str()).unwrap_or(id)
    }

    pub fn default_cluster(&self) -> &str {
        &self.default_cluster
    }
}

/// Latest known image tags, per image repository and per workload kind.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize)]
pub struct LatestVersions {
    #[serde(default)]
    pub kinds: BTreeMap<String, String>,
    #[serde(default)]
    pub images: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub source: Option<String>,
    pub registry: ClusterRegistry,
    pub latest_versions: LatestVersions,
    pub fetch_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: None,
            registry: ClusterRegistry::default(),
            latest_versions: LatestVersions::default(),
            fetch_timeout: Duration::from_secs(default_fetch_timeout_secs()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct SkewConfigFile {
    #[serde(default)]
    default_cluster: Option<String>,
    #[serde(default = "default_fetch_timeout_secs", alias = "timeout_secs")]
    fetch_timeout_secs: u64,
    #[serde(default)]
    clusters: Vec<ClusterInfo>,
    #[serde(default)]
    latest_versions: LatestVersions,
}

/// Loads settings from `explicit`, or from the first discovered config file.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config_path(),
    };
    let Some(path) = path else {
        return Ok(Settings::default());
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_settings(&raw, Some(path.display().to_string()))
        .with_context(|| format!("failed to parse config {}", path.display()))
}

fn parse_settings(raw: &str, source: Option<String>) -> Result<Settings> {
    let parsed: SkewConfigFile = serde_yaml::from_str(raw)?;
    let registry = if parsed.clusters.is_empty() {
        ClusterRegistry::default()
    } else {
        ClusterRegistry::new(parsed.clusters, parsed.default_cluster)?
    };

    Ok(Settings {
        source,
        registry,
        latest_versions: parsed.latest_versions,
        fetch_timeout: Duration::from_secs(parsed.fetch_timeout_secs.max(1)),
    })
}

fn default_fetch_timeout_secs() -> u64 {
    8
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SKEW_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("skew.yaml"),
        PathBuf::from("skew.yml"),
        PathBuf::from(".skew.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/skew/config.yaml"),
            PathBuf::from(&home).join(".config/skew/config.yml"),
            PathBuf::from(&home).join(".skew.yaml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{ClusterInfo, ClusterRegistry, DEFAULT_CLUSTER_ID, parse_settings};
    use std::time::Duration;

    #[test]
    fn parses_clusters_and_latest_versions() {
        let raw = r#"
default_cluster: cluster-prod
fetch_timeout_secs: 3
clusters:
  - id: cluster-dev
    name: Development
    context: kind-dev
  - id: cluster-prod
    name: Production
latest_versions:
  kinds:
    Deployment: "1.28.0"
  images:
    nginx: "1.27.2"
"#;

        let settings = parse_settings(raw, Some("skew.yaml".to_string())).expect("valid config");

        assert_eq!(settings.registry.default_cluster(), "cluster-prod");
        assert_eq!(settings.registry.clusters().len(), 2);
        assert_eq!(
            settings.registry.get("cluster-dev").and_then(|c| c.context.as_deref()),
            Some("kind-dev")
        );
        assert_eq!(settings.registry.display_name("cluster-prod"), "Production");
        assert_eq!(settings.registry.display_name("unknown"), "unknown");
        assert_eq!(settings.fetch_timeout, Duration::from_secs(3));
        assert_eq!(
            settings.latest_versions.images.get("nginx").map(String::as_str),
            Some("1.27.2")
        );
    }

    #[test]
    fn empty_config_falls_back_to_default_registry() {
        let settings = parse_settings("{}", None).expect("empty config is valid");
        assert_eq!(settings.registry, ClusterRegistry::default());
        assert_eq!(settings.registry.default_cluster(), DEFAULT_CLUSTER_ID);
        assert_eq!(settings.fetch_timeout, Duration::from_secs(8));
    }

    #[test]
    fn duplicate_cluster_ids_are_rejected() {
        let cluster = ClusterInfo {
            id: "a".to_string(),
            name: "A".to_string(),
            context: None,
        };
        let result = ClusterRegistry::new(vec![cluster.clone(), cluster], None);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_default_cluster_is_rejected() {
        let raw = r#"
default_cluster: nope
clusters:
  - id: cluster-a
    name: A
"#;
        assert!(parse_settings(raw, None).is_err());
    }

    #[test]
    fn default_cluster_prefers_dev_then_first() {
        let clusters = vec![
            ClusterInfo {
                id: "cluster-prod".to_string(),
                name: "Production".to_string(),
                context: None,
            },
            ClusterInfo {
                id: DEFAULT_CLUSTER_ID.to_string(),
                name: "Development".to_string(),
                context: None,
            },
        ];
        let registry = ClusterRegistry::new(clusters.clone(), None).expect("valid registry");
        assert_eq!(registry.default_cluster(), DEFAULT_CLUSTER_ID);

        let registry = ClusterRegistry::new(clusters[..1].to_vec(), None).expect("valid registry");
        assert_eq!(registry.default_cluster(), "cluster-prod");
    }
}
