use anyhow::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::api::DashboardApi;
use crate::config::{ClusterInfo, ClusterRegistry};
use crate::demo;
use crate::group::{group_by_name, has_different_versions};
use crate::model::{
    ClusterStatus, CombinedResources, GroupedRow, NamespaceBucket, ResourceKind, UpdateKey,
    UpdateQuery, UpdateResponse, VersionUpdate,
};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LoadRequest {
    pub generation: u64,
    pub cluster_ids: Vec<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UpdateRequest {
    pub generation: u64,
    pub resources: Vec<UpdateQuery>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ViewCommand {
    Load(LoadRequest),
    CheckUpdates(UpdateRequest),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Some clusters failed, data from the others is shown.
    Partial,
    /// Nothing could be fetched; demonstration data is shown.
    Fatal,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ViewError {
    pub severity: Severity,
    pub message: String,
}

/// Initial selection state.
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub clusters: Vec<String>,
    pub namespaces: Vec<String>,
    pub kinds: Vec<ResourceKind>,
    pub only_divergent: bool,
    pub check_updates: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedRow<'a> {
    #[serde(flatten)]
    pub row: &'a GroupedRow,
    pub has_different_versions: bool,
    pub has_update_available: bool,
    pub latest_version: Option<&'a str>,
}

/// Serializable picture of the current derived state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot<'a> {
    pub selected_clusters: &'a [String],
    pub cluster_statuses: &'a BTreeMap<String, ClusterStatus>,
    pub cluster_errors: &'a BTreeMap<String, String>,
    pub error: Option<&'a ViewError>,
    pub demo_data: bool,
    pub last_refreshed: Option<String>,
    pub total_resources: usize,
    pub namespaces: BTreeMap<String, NamespaceBucket<AnnotatedRow<'a>>>,
}

/// Cross-cluster selection state, loaded rows and derived views.
///
/// Mutation entry points return the follow-up [`ViewCommand`]s the change
/// implies: a reload when the cluster selection changes, an update check when
/// the filtered rows or the update flag change. The driver runs the I/O and
/// hands results back through [`Self::apply_load`] and
/// [`Self::apply_update_check`]. Results of superseded requests are dropped.
pub struct ClusterResourceViewModel {
    registry: ClusterRegistry,

    deployments: Vec<GroupedRow>,
    cronjobs: Vec<GroupedRow>,
    statefulsets: Vec<GroupedRow>,
    namespaces: Vec<String>,
    loading: bool,
    error: Option<ViewError>,
    cluster_statuses: BTreeMap<String, ClusterStatus>,
    cluster_errors: BTreeMap<String, String>,
    demo_data: bool,
    last_refreshed: Option<DateTime<Local>>,

    selected_namespaces: Vec<String>,
    selected_resource_types: Vec<ResourceKind>,
    selected_clusters: Vec<String>,
    show_only_different_versions: bool,
    check_for_updates: bool,
    version_updates: HashMap<UpdateKey, VersionUpdate>,

    load_generation: u64,
    update_generation: u64,
    observed_queries: Vec<UpdateQuery>,
}

impl ClusterResourceViewModel {
    pub fn new(registry: ClusterRegistry, options: ViewOptions) -> Self {
        let clusters = if options.clusters.is_empty() {
            vec![registry.default_cluster().to_string()]
        } else {
            dedup(options.clusters)
        };

        Self {
            registry,
            deployments: Vec::new(),
            cronjobs: Vec::new(),
            statefulsets: Vec::new(),
            namespaces: Vec::new(),
            loading: false,
            error: None,
            cluster_statuses: BTreeMap::new(),
            cluster_errors: BTreeMap::new(),
            demo_data: false,
            last_refreshed: None,
            selected_namespaces: dedup(options.namespaces),
            selected_resource_types: dedup(options.kinds),
            selected_clusters: clusters,
            show_only_different_versions: options.only_divergent,
            check_for_updates: options.check_updates,
            version_updates: HashMap::new(),
            load_generation: 0,
            update_generation: 0,
            observed_queries: Vec::new(),
        }
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    pub fn available_clusters(&self) -> &[ClusterInfo] {
        self.registry.clusters()
    }

    pub fn rows(&self, kind: ResourceKind) -> &[GroupedRow] {
        match kind {
            ResourceKind::Deployments => &self.deployments,
            ResourceKind::CronJobs => &self.cronjobs,
            ResourceKind::StatefulSets => &self.statefulsets,
        }
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&ViewError> {
        self.error.as_ref()
    }

    pub fn cluster_status(&self, cluster_id: &str) -> Option<ClusterStatus> {
        self.cluster_statuses.get(cluster_id).copied()
    }

    pub fn cluster_error(&self, cluster_id: &str) -> Option<&str> {
        self.cluster_errors.get(cluster_id).map(String::as_str)
    }

    pub fn demo_data(&self) -> bool {
        self.demo_data
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Local>> {
        self.last_refreshed
    }

    pub fn selected_clusters(&self) -> &[String] {
        &self.selected_clusters
    }

    pub fn selected_namespaces(&self) -> &[String] {
        &self.selected_namespaces
    }

    pub fn selected_resource_types(&self) -> &[ResourceKind] {
        &self.selected_resource_types
    }

    pub fn show_only_different_versions(&self) -> bool {
        self.show_only_different_versions
    }

    pub fn check_for_updates(&self) -> bool {
        self.check_for_updates
    }

    pub fn version_updates(&self) -> &HashMap<UpdateKey, VersionUpdate> {
        &self.version_updates
    }

    pub fn set_selected_clusters(&mut self, clusters: Vec<String>) -> Vec<ViewCommand> {
        let clusters = dedup(clusters);
        if as_set(&clusters) == as_set(&self.selected_clusters) {
            return Vec::new();
        }

        self.selected_clusters = clusters;
        self.refresh_data()
    }

    pub fn toggle_cluster(&mut self, cluster_id: &str) -> Vec<ViewCommand> {
        let mut clusters = self.selected_clusters.clone();
        if let Some(position) = clusters.iter().position(|id| id == cluster_id) {
            clusters.remove(position);
        } else {
            clusters.push(cluster_id.to_string());
        }
        self.set_selected_clusters(clusters)
    }

    pub fn set_selected_namespaces(&mut self, namespaces: Vec<String>) -> Vec<ViewCommand> {
        self.selected_namespaces = dedup(namespaces);
        self.filters_changed(false)
    }

    pub fn set_selected_resource_types(&mut self, kinds: Vec<ResourceKind>) -> Vec<ViewCommand> {
        self.selected_resource_types = dedup(kinds);
        self.filters_changed(false)
    }

    pub fn set_show_only_different_versions(&mut self, enabled: bool) -> Vec<ViewCommand> {
        self.show_only_different_versions = enabled;
        self.filters_changed(false)
    }

    pub fn set_check_for_updates(&mut self, enabled: bool) -> Vec<ViewCommand> {
        if self.check_for_updates == enabled {
            return Vec::new();
        }
        self.check_for_updates = enabled;
        self.filters_changed(true)
    }

    /// Clears namespace/type filters and the divergence flag and selects the
    /// default cluster. The update-check flag is kept.
    pub fn reset_filters(&mut self) -> Vec<ViewCommand> {
        self.selected_namespaces.clear();
        self.selected_resource_types.clear();
        self.show_only_different_versions = false;

        let default_cluster = self.registry.default_cluster().to_string();
        let mut commands = self.set_selected_clusters(vec![default_cluster]);
        if commands.is_empty() {
            commands = self.filters_changed(false);
        }
        commands
    }

    pub fn refresh_data(&mut self) -> Vec<ViewCommand> {
        let mut commands = Vec::new();
        if let Some(request) = self.begin_load() {
            commands.push(ViewCommand::Load(request));
        }
        commands.extend(self.filters_changed(false));
        commands
    }

    /// Starts a load of the selected clusters.
    ///
    /// With no cluster selected the lists are cleared and no request is made.
    pub fn begin_load(&mut self) -> Option<LoadRequest> {
        if self.selected_clusters.is_empty() {
            self.load_generation += 1;
            self.loading = false;
            self.deployments.clear();
            self.cronjobs.clear();
            self.statefulsets.clear();
            self.namespaces.clear();
            return None;
        }

        self.load_generation += 1;
        self.loading = true;
        self.error = None;
        self.cluster_statuses.clear();
        self.cluster_errors.clear();
        for cluster_id in &self.selected_clusters {
            self.cluster_statuses
                .insert(cluster_id.clone(), ClusterStatus::Loading);
        }

        debug!(
            generation = self.load_generation,
            clusters = ?self.selected_clusters,
            "loading cluster resources"
        );
        Some(LoadRequest {
            generation: self.load_generation,
            cluster_ids: self.selected_clusters.clone(),
        })
    }

    /// Applies the outcome of a load. Returns follow-up commands, or nothing
    /// when the request was superseded.
    pub fn apply_load(
        &mut self,
        request: LoadRequest,
        result: Result<CombinedResources>,
    ) -> Vec<ViewCommand> {
        if request.generation != self.load_generation {
            debug!(
                generation = request.generation,
                current = self.load_generation,
                "discarding superseded load"
            );
            return Vec::new();
        }

        match result {
            Ok(data) => self.store_resources(&request.cluster_ids, data),
            Err(error) => self.store_fallback(&request.cluster_ids, &error),
        }
        self.last_refreshed = Some(Local::now());
        self.loading = false;

        // Every completed load re-runs the update check.
        self.filters_changed(true)
    }

    fn store_resources(&mut self, cluster_ids: &[String], data: CombinedResources) {
        self.group_all(&data, cluster_ids);
        self.namespaces = data.namespaces;
        self.demo_data = false;

        for cluster_id in cluster_ids {
            let display_name = self.registry.display_name(cluster_id);
            match data
                .errors
                .iter()
                .find(|entry| entry.cluster == display_name)
            {
                Some(entry) => {
                    self.cluster_statuses
                        .insert(cluster_id.clone(), ClusterStatus::Error);
                    self.cluster_errors
                        .insert(cluster_id.clone(), entry.error.clone());
                }
                None => {
                    self.cluster_statuses
                        .insert(cluster_id.clone(), ClusterStatus::Success);
                }
            }
        }

        if data.errors.is_empty() {
            info!(
                deployments = self.deployments.len(),
                cronjobs = self.cronjobs.len(),
                statefulsets = self.statefulsets.len(),
                "cluster resources loaded"
            );
            return;
        }

        let failed = data
            .errors
            .iter()
            .map(|entry| entry.cluster.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        warn!(clusters = %failed, "some clusters failed to load");
        self.error = Some(ViewError {
            severity: Severity::Partial,
            message: format!("Unable to load data from some clusters: {failed}"),
        });
    }

    fn store_fallback(&mut self, cluster_ids: &[String], error: &anyhow::Error) {
        let reason = format!("{error:#}");
        warn!(error = %reason, "resource request failed, using demonstration data");

        self.error = Some(ViewError {
            severity: Severity::Fatal,
            message: format!("General error: {reason}"),
        });
        let data = demo::dataset();
        self.group_all(&data, cluster_ids);
        self.namespaces = data.namespaces;
        self.demo_data = true;

        for cluster_id in cluster_ids {
            self.cluster_statuses
                .insert(cluster_id.clone(), ClusterStatus::Error);
            self.cluster_errors.insert(cluster_id.clone(), reason.clone());
        }
    }

    fn group_all(&mut self, data: &CombinedResources, cluster_ids: &[String]) {
        self.deployments = group_by_name(
            ResourceKind::Deployments,
            data.records(ResourceKind::Deployments),
            cluster_ids,
        );
        self.cronjobs = group_by_name(
            ResourceKind::CronJobs,
            data.records(ResourceKind::CronJobs),
            cluster_ids,
        );
        self.statefulsets = group_by_name(
            ResourceKind::StatefulSets,
            data.records(ResourceKind::StatefulSets),
            cluster_ids,
        );
    }

    /// Starts an update check of the filtered rows.
    ///
    /// With update checks disabled the update map is cleared and no request is made.
    pub fn begin_update_check(&mut self) -> Option<UpdateRequest> {
        self.update_generation += 1;
        if !self.check_for_updates {
            self.version_updates.clear();
            return None;
        }

        Some(UpdateRequest {
            generation: self.update_generation,
            resources: self.update_queries(),
        })
    }

    pub fn apply_update_check(&mut self, request: UpdateRequest, result: Result<UpdateResponse>) {
        if request.generation != self.update_generation {
            debug!(
                generation = request.generation,
                current = self.update_generation,
                "discarding superseded update check"
            );
            return;
        }

        match result {
            Ok(response) => {
                self.version_updates = response
                    .updates
                    .into_iter()
                    .filter_map(|update| {
                        let Some(kind) = ResourceKind::from_api_kind(&update.kind) else {
                            debug!(kind = %update.kind, "ignoring update for unknown kind");
                            return None;
                        };
                        let key = UpdateKey::new(kind, &update.namespace, &update.name);
                        debug!(
                            key = %key,
                            latest = update.latest_version.as_deref().unwrap_or(""),
                            "update available"
                        );
                        Some((key, update))
                    })
                    .collect();
                debug!(updates = self.version_updates.len(), "update check finished");
            }
            Err(error) => {
                warn!("update check failed: {error:#}");
                self.version_updates.clear();
            }
        }
    }

    /// Loads the selected clusters and runs every follow-up request.
    pub async fn load_all_data<A: DashboardApi>(&mut self, api: &A) {
        let commands = self.refresh_data();
        self.execute(api, commands).await;
    }

    pub async fn check_for_updates_available<A: DashboardApi>(&mut self, api: &A) {
        if let Some(request) = self.begin_update_check() {
            self.execute(api, vec![ViewCommand::CheckUpdates(request)])
                .await;
        }
    }

    /// Runs commands in order, including the ones they trigger.
    pub async fn execute<A: DashboardApi>(&mut self, api: &A, commands: Vec<ViewCommand>) {
        let mut queue = VecDeque::from(commands);
        while let Some(command) = queue.pop_front() {
            match command {
                ViewCommand::Load(request) => {
                    let result = api.get_all_clusters_resources(&request.cluster_ids).await;
                    queue.extend(self.apply_load(request, result));
                }
                ViewCommand::CheckUpdates(request) => {
                    let result = api.check_for_updates(&request.resources).await;
                    self.apply_update_check(request, result);
                }
            }
        }
    }

    /// Requests an update check when the flag changed (`force`) or the
    /// filtered rows no longer match the last observed set.
    fn filters_changed(&mut self, force: bool) -> Vec<ViewCommand> {
        let queries = self.update_queries();
        if !force && queries == self.observed_queries {
            return Vec::new();
        }
        self.observed_queries = queries;

        self.begin_update_check()
            .map(ViewCommand::CheckUpdates)
            .into_iter()
            .collect()
    }

    fn update_queries(&self) -> Vec<UpdateQuery> {
        ResourceKind::ALL
            .into_iter()
            .flat_map(|kind| {
                self.get_filtered_resources(kind)
                    .into_iter()
                    .map(move |row| UpdateQuery {
                        kind: kind.api_kind().to_string(),
                        name: row.name.clone(),
                        namespace: row.namespace.clone(),
                        version: row.representative_version().to_string(),
                    })
            })
            .collect()
    }

    pub fn get_filtered_resources(&self, kind: ResourceKind) -> Vec<&GroupedRow> {
        self.rows(kind)
            .iter()
            .filter(|row| {
                self.selected_namespaces.is_empty()
                    || self.selected_namespaces.contains(&row.namespace)
            })
            .filter(|row| !self.show_only_different_versions || has_different_versions(row))
            .collect()
    }

    pub fn should_show_resource_type(&self, kind: ResourceKind) -> bool {
        self.selected_resource_types.is_empty() || self.selected_resource_types.contains(&kind)
    }

    pub fn has_different_versions(&self, row: &GroupedRow) -> bool {
        has_different_versions(row)
    }

    pub fn has_update_available(&self, kind: ResourceKind, row: &GroupedRow) -> bool {
        self.get_latest_version(kind, row)
            .is_some_and(|latest| latest != row.representative_version())
    }

    pub fn get_latest_version(&self, kind: ResourceKind, row: &GroupedRow) -> Option<&str> {
        if !self.check_for_updates {
            return None;
        }

        self.version_updates
            .get(&UpdateKey::new(kind, &row.namespace, &row.name))
            .and_then(|update| update.latest_version.as_deref())
            .filter(|latest| !latest.is_empty())
    }

    pub fn group_resources_by_namespace(&self) -> BTreeMap<String, NamespaceBucket<&GroupedRow>> {
        let mut namespaces = BTreeMap::<String, NamespaceBucket<&GroupedRow>>::new();
        for kind in ResourceKind::ALL {
            if !self.should_show_resource_type(kind) {
                continue;
            }
            for row in self.get_filtered_resources(kind) {
                namespaces
                    .entry(row.namespace.clone())
                    .or_default()
                    .get_mut(kind)
                    .push(row);
            }
        }
        namespaces
    }

    pub fn total_resources_count(&self) -> usize {
        ResourceKind::ALL
            .into_iter()
            .filter(|kind| self.should_show_resource_type(*kind))
            .map(|kind| self.get_filtered_resources(kind).len())
            .sum()
    }

    pub fn snapshot(&self) -> ViewSnapshot<'_> {
        let namespaces = self
            .group_resources_by_namespace()
            .into_iter()
            .map(|(namespace, bucket)| {
                let mut annotated = NamespaceBucket::default();
                for kind in ResourceKind::ALL {
                    annotated
                        .get_mut(kind)
                        .extend(bucket.get(kind).iter().copied().map(|row| AnnotatedRow {
                            row,
                            has_different_versions: has_different_versions(row),
                            has_update_available: self.has_update_available(kind, row),
                            latest_version: self.get_latest_version(kind, row),
                        }));
                }
                (namespace, annotated)
            })
            .collect();

        ViewSnapshot {
            selected_clusters: &self.selected_clusters,
            cluster_statuses: &self.cluster_statuses,
            cluster_errors: &self.cluster_errors,
            error: self.error.as_ref(),
            demo_data: self.demo_data,
            last_refreshed: self.last_refreshed.map(|at| at.to_rfc3339()),
            total_resources: self.total_resources_count(),
            namespaces,
        }
    }
}

fn dedup<T: PartialEq>(values: Vec<T>) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn as_set(values: &[String]) -> BTreeSet<&str> {
    values.iter().map(String::as_str).collect()
}
