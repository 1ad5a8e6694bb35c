use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{Container, Namespace, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{ClusterInfo, ClusterRegistry};
use crate::model::{ClusterError, CombinedResources, RawResourceRecord};

/// Lists workloads from every registered cluster through its kubeconfig context.
#[derive(Clone)]
pub struct KubeGateway {
    registry: ClusterRegistry,
    fetch_timeout: Duration,
}

#[derive(Debug, Default)]
struct ClusterResources {
    deployments: Vec<RawResourceRecord>,
    cronjobs: Vec<RawResourceRecord>,
    statefulsets: Vec<RawResourceRecord>,
    namespaces: Vec<String>,
}

impl KubeGateway {
    pub fn new(registry: ClusterRegistry, fetch_timeout: Duration) -> Self {
        Self {
            registry,
            fetch_timeout,
        }
    }

    /// Fetches all requested clusters concurrently.
    ///
    /// Failures of single clusters are reported in `errors` under the cluster
    /// display name. Only a missing Kubernetes configuration fails the call.
    pub async fn fetch_all(&self, cluster_ids: &[String]) -> Result<CombinedResources> {
        let kubeconfig = match Kubeconfig::read() {
            Ok(kubeconfig) => Some(kubeconfig),
            Err(error) => {
                let reason = format!("{error:#}");
                warn!(error = %reason, "kubeconfig unreadable, trying in-cluster configuration");
                Config::infer()
                    .await
                    .with_context(|| no_configuration_message(&reason))?;
                None
            }
        };

        let fetches = cluster_ids
            .iter()
            .map(|cluster_id| self.fetch_cluster(cluster_id, kubeconfig.as_ref()));
        let results = join_all(fetches).await;

        let mut combined = CombinedResources::default();
        let mut namespaces = BTreeSet::new();
        for (cluster_id, result) in cluster_ids.iter().zip(results) {
            match result {
                Ok(resources) => {
                    debug!(
                        cluster = %cluster_id,
                        deployments = resources.deployments.len(),
                        cronjobs = resources.cronjobs.len(),
                        statefulsets = resources.statefulsets.len(),
                        "cluster listed"
                    );
                    combined.deployments.extend(resources.deployments);
                    combined.cronjobs.extend(resources.cronjobs);
                    combined.statefulsets.extend(resources.statefulsets);
                    namespaces.extend(resources.namespaces);
                }
                Err(error) => {
                    warn!(cluster = %cluster_id, "cluster fetch failed: {error:#}");
                    combined.errors.push(ClusterError {
                        cluster: self.registry.display_name(cluster_id).to_string(),
                        error: format!("{error:#}"),
                    });
                }
            }
        }
        combined.namespaces = namespaces.into_iter().collect();

        Ok(combined)
    }

    async fn fetch_cluster(
        &self,
        cluster_id: &str,
        kubeconfig: Option<&Kubeconfig>,
    ) -> Result<ClusterResources> {
        let Some(cluster) = self.registry.get(cluster_id) else {
            anyhow::bail!("cluster '{cluster_id}' is not registered");
        };
        let client = client_for(cluster, kubeconfig).await?;

        timeout(self.fetch_timeout, list_cluster(client, cluster_id))
            .await
            .with_context(|| {
                format!(
                    "timed out after {}s listing {}",
                    self.fetch_timeout.as_secs(),
                    cluster.name
                )
            })?
    }
}

async fn client_for(cluster: &ClusterInfo, kubeconfig: Option<&Kubeconfig>) -> Result<Client> {
    let config = match kubeconfig {
        Some(kubeconfig) => {
            let options = KubeConfigOptions {
                context: cluster.context.clone(),
                cluster: None,
                user: None,
            };
            Config::from_custom_kubeconfig(kubeconfig.clone(), &options)
                .await
                .with_context(|| {
                    format!(
                        "failed to load kubeconfig context {}",
                        cluster.context.as_deref().unwrap_or("(current)")
                    )
                })?
        }
        None => {
            if let Some(context) = &cluster.context {
                anyhow::bail!("kubeconfig not found; context '{context}' is unavailable");
            }
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        }
    };

    Client::try_from(config).context("failed to initialize Kubernetes client")
}

async fn list_cluster(client: Client, cluster_id: &str) -> Result<ClusterResources> {
    let deployments: Api<Deployment> = Api::all(client.clone());
    let cronjobs: Api<CronJob> = Api::all(client.clone());
    let statefulsets: Api<StatefulSet> = Api::all(client.clone());
    let namespaces: Api<Namespace> = Api::all(client);
    let params = ListParams::default();

    let (deployments, cronjobs, statefulsets, namespaces) = tokio::try_join!(
        async {
            deployments
                .list(&params)
                .await
                .context("failed to list deployments")
        },
        async {
            cronjobs
                .list(&params)
                .await
                .context("failed to list cronjobs")
        },
        async {
            statefulsets
                .list(&params)
                .await
                .context("failed to list statefulsets")
        },
        async {
            namespaces
                .list(&params)
                .await
                .context("failed to list namespaces")
        },
    )?;

    Ok(ClusterResources {
        deployments: deployments
            .iter()
            .map(|deployment| deployment_record(cluster_id, deployment))
            .collect(),
        cronjobs: cronjobs
            .iter()
            .map(|cronjob| cronjob_record(cluster_id, cronjob))
            .collect(),
        statefulsets: statefulsets
            .iter()
            .map(|statefulset| statefulset_record(cluster_id, statefulset))
            .collect(),
        namespaces: namespaces
            .iter()
            .map(|namespace| namespace.name_any())
            .collect(),
    })
}

fn deployment_record(cluster_id: &str, deployment: &Deployment) -> RawResourceRecord {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);
    let images = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(container_images)
        .unwrap_or_default();

    RawResourceRecord {
        name: deployment.name_any(),
        namespace: deployment.namespace().unwrap_or_default(),
        cluster_id: cluster_id.to_string(),
        status: workload_status(ready, desired).to_string(),
        ready: Some(ready),
        replicas: Some(desired),
        images,
        ..RawResourceRecord::default()
    }
}

fn statefulset_record(cluster_id: &str, statefulset: &StatefulSet) -> RawResourceRecord {
    let desired = statefulset
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(1);
    let ready = statefulset
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);
    let images = statefulset
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(container_images)
        .unwrap_or_default();

    RawResourceRecord {
        name: statefulset.name_any(),
        namespace: statefulset.namespace().unwrap_or_default(),
        cluster_id: cluster_id.to_string(),
        status: workload_status(ready, desired).to_string(),
        ready: Some(ready),
        replicas: Some(desired),
        images,
        ..RawResourceRecord::default()
    }
}

fn cronjob_record(cluster_id: &str, cronjob: &CronJob) -> RawResourceRecord {
    let schedule = cronjob.spec.as_ref().map(|spec| spec.schedule.clone());
    let suspend = cronjob
        .spec
        .as_ref()
        .and_then(|spec| spec.suspend)
        .unwrap_or(false);
    let active = cronjob
        .status
        .as_ref()
        .and_then(|status| status.active.as_ref())
        .map(|entries| entries.len() as u32)
        .unwrap_or(0);
    let last_run = cronjob
        .status
        .as_ref()
        .and_then(|status| status.last_schedule_time.as_ref())
        .and_then(format_time);
    let images = cronjob
        .spec
        .as_ref()
        .and_then(|spec| spec.job_template.spec.as_ref())
        .and_then(|job| job.template.spec.as_ref())
        .map(container_images)
        .unwrap_or_default();

    let status = if suspend {
        "Suspended"
    } else if active > 0 {
        "Active"
    } else {
        "Scheduled"
    };

    RawResourceRecord {
        name: cronjob.name_any(),
        namespace: cronjob.namespace().unwrap_or_default(),
        cluster_id: cluster_id.to_string(),
        status: status.to_string(),
        images,
        schedule,
        last_run,
        active: Some(active),
        suspend: Some(suspend),
        ..RawResourceRecord::default()
    }
}

fn no_configuration_message(kubeconfig_error: &str) -> String {
    format!("kubeconfig unreadable ({kubeconfig_error}) and in-cluster configuration is unavailable")
}

fn workload_status(ready: i32, desired: i32) -> &'static str {
    if desired == 0 {
        "Scaled down"
    } else if ready >= desired {
        "Running"
    } else {
        "Progressing"
    }
}

fn container_images(pod: &PodSpec) -> Vec<String> {
    pod.containers.iter().filter_map(container_image).collect()
}

fn container_image(container: &Container) -> Option<String> {
    container
        .image
        .as_deref()
        .map(short_image_name)
        .filter(|image| !image.is_empty())
}

/// Drops registry path and digest: `reg.io/team/app:1.2@sha256:ab` becomes `app:1.2`.
pub fn short_image_name(image: &str) -> String {
    let without_digest = image.split('@').next().unwrap_or(image);
    without_digest
        .rsplit('/')
        .next()
        .unwrap_or(without_digest)
        .to_string()
}

fn format_time(time: &Time) -> Option<String> {
    DateTime::<Utc>::from_timestamp(time.0.as_second(), 0)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::{
        cronjob_record, deployment_record, no_configuration_message, short_image_name,
        statefulset_record, workload_status,
    };
    use k8s_openapi::api::apps::v1::{
        Deployment, DeploymentSpec, DeploymentStatus, StatefulSet, StatefulSetSpec,
    };
    use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, CronJobStatus, JobSpec, JobTemplateSpec};
    use k8s_openapi::api::core::v1::{Container, ObjectReference, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn meta(namespace: &str, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        }
    }

    fn pod_template(images: &[&str]) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: None,
            spec: Some(PodSpec {
                containers: images
                    .iter()
                    .enumerate()
                    .map(|(idx, image)| Container {
                        name: format!("c{idx}"),
                        image: Some(image.to_string()),
                        ..Container::default()
                    })
                    .collect(),
                ..PodSpec::default()
            }),
        }
    }

    #[test]
    fn short_image_name_strips_registry_and_digest() {
        assert_eq!(
            short_image_name("registry.example.com:5000/team/app:1.2@sha256:abcdef"),
            "app:1.2"
        );
        assert_eq!(short_image_name("nginx"), "nginx");
        assert_eq!(short_image_name("library/redis:7"), "redis:7");
    }

    #[test]
    fn missing_configuration_keeps_kubeconfig_reason() {
        let message = no_configuration_message("failed to parse kubeconfig: invalid type");
        assert!(message.contains("failed to parse kubeconfig: invalid type"));
        assert!(message.contains("in-cluster configuration is unavailable"));
    }

    #[test]
    fn workload_status_reflects_readiness() {
        assert_eq!(workload_status(0, 0), "Scaled down");
        assert_eq!(workload_status(3, 3), "Running");
        assert_eq!(workload_status(1, 3), "Progressing");
    }

    #[test]
    fn deployment_record_takes_images_and_replicas() {
        let deployment = Deployment {
            metadata: meta("prod", "web"),
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                template: pod_template(&["ghcr.io/acme/web:2.0", "envoy:1.30"]),
                ..DeploymentSpec::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(2),
                ..DeploymentStatus::default()
            }),
        };

        let record = deployment_record("cluster-a", &deployment);

        assert_eq!(record.name, "web");
        assert_eq!(record.namespace, "prod");
        assert_eq!(record.cluster_id, "cluster-a");
        assert_eq!(record.images, vec!["web:2.0", "envoy:1.30"]);
        assert_eq!(record.ready, Some(2));
        assert_eq!(record.replicas, Some(3));
        assert_eq!(record.status, "Progressing");
        assert_eq!(record.version(), "web:2.0");
    }

    #[test]
    fn statefulset_without_status_is_not_ready() {
        let statefulset = StatefulSet {
            metadata: meta("data", "db"),
            spec: Some(StatefulSetSpec {
                template: pod_template(&["postgres:16"]),
                ..StatefulSetSpec::default()
            }),
            status: None,
        };

        let record = statefulset_record("cluster-b", &statefulset);

        assert_eq!(record.ready, Some(0));
        assert_eq!(record.replicas, Some(1));
        assert_eq!(record.status, "Progressing");
        assert_eq!(record.images, vec!["postgres:16"]);
    }

    #[test]
    fn cronjob_record_reads_schedule_and_activity() {
        let cronjob = CronJob {
            metadata: meta("ops", "backup"),
            spec: Some(CronJobSpec {
                schedule: "0 3 * * *".to_string(),
                suspend: Some(false),
                job_template: JobTemplateSpec {
                    metadata: None,
                    spec: Some(JobSpec {
                        template: pod_template(&["backup:5"]),
                        ..JobSpec::default()
                    }),
                },
                ..CronJobSpec::default()
            }),
            status: Some(CronJobStatus {
                active: Some(vec![ObjectReference::default()]),
                ..CronJobStatus::default()
            }),
        };

        let record = cronjob_record("cluster-a", &cronjob);

        assert_eq!(record.schedule.as_deref(), Some("0 3 * * *"));
        assert_eq!(record.active, Some(1));
        assert_eq!(record.suspend, Some(false));
        assert_eq!(record.last_run, None);
        assert_eq!(record.status, "Active");
        assert_eq!(record.images, vec!["backup:5"]);
    }
}
