use anyhow::Result;
use std::future::Future;

use crate::catalog::VersionCatalog;
use crate::k8s::KubeGateway;
use crate::model::{CombinedResources, UpdateQuery, UpdateResponse};

/// Remote side of the dashboard: resource listing and update checks.
///
/// Per-cluster failures of `get_all_clusters_resources` are reported in-band
/// through `CombinedResources::errors`; an `Err` means nothing could be fetched.
pub trait DashboardApi {
    fn get_all_clusters_resources(
        &self,
        cluster_ids: &[String],
    ) -> impl Future<Output = Result<CombinedResources>> + Send;

    fn check_for_updates(
        &self,
        resources: &[UpdateQuery],
    ) -> impl Future<Output = Result<UpdateResponse>> + Send;
}

/// Live backend: kube clients for listing, static catalog for updates.
#[derive(Clone)]
pub struct Backend {
    gateway: KubeGateway,
    catalog: VersionCatalog,
}

impl Backend {
    pub fn new(gateway: KubeGateway, catalog: VersionCatalog) -> Self {
        Self { gateway, catalog }
    }
}

impl DashboardApi for Backend {
    async fn get_all_clusters_resources(&self, cluster_ids: &[String]) -> Result<CombinedResources> {
        self.gateway.fetch_all(cluster_ids).await
    }

    async fn check_for_updates(&self, resources: &[UpdateQuery]) -> Result<UpdateResponse> {
        Ok(self.catalog.check(resources))
    }
}
