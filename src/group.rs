use std::collections::{BTreeSet, HashMap};

use crate::model::{
    ClusterSnapshot, GroupedRow, NOT_AVAILABLE, RawResourceRecord, ResourceKind, row_key,
};

/// Merges per-cluster records of one kind into one row per namespace and name.
///
/// Rows keep the order in which their key was first seen. Shared fields come
/// from the first record of a key; every record then writes its own cluster
/// entry, so a duplicate record for the same cluster replaces the earlier one.
/// Each selected cluster missing from a row gets a sentinel entry.
pub fn group_by_name(
    kind: ResourceKind,
    records: &[RawResourceRecord],
    selected_clusters: &[String],
) -> Vec<GroupedRow> {
    let mut rows = Vec::<GroupedRow>::new();
    let mut index = HashMap::<String, usize>::new();

    for record in records {
        let key = row_key(&record.namespace, &record.name);
        let position = *index.entry(key).or_insert_with(|| {
            rows.push(seed_row(kind, record));
            rows.len() - 1
        });

        rows[position].cluster_versions.insert(
            record.cluster_id.clone(),
            ClusterSnapshot::from_record(kind, record),
        );
    }

    for row in &mut rows {
        for cluster_id in selected_clusters {
            row.cluster_versions
                .entry(cluster_id.clone())
                .or_insert_with(|| ClusterSnapshot::missing(kind));
        }
    }

    rows
}

fn seed_row(kind: ResourceKind, record: &RawResourceRecord) -> GroupedRow {
    let mut row = GroupedRow {
        name: record.name.clone(),
        namespace: record.namespace.clone(),
        status: record.status.clone(),
        ..GroupedRow::default()
    };

    match kind {
        ResourceKind::Deployments => {
            row.ready = record.ready;
            row.replicas = record.replicas;
        }
        ResourceKind::CronJobs => {
            row.schedule = record.schedule.clone();
            row.last_run = record.last_run.clone();
        }
        ResourceKind::StatefulSets => {}
    }

    row
}

/// True when at least two clusters run the row and they disagree on the version.
pub fn has_different_versions(row: &GroupedRow) -> bool {
    let valid = row
        .cluster_versions
        .values()
        .map(|snapshot| snapshot.version.as_str())
        .filter(|version| !version.is_empty() && *version != NOT_AVAILABLE)
        .collect::<Vec<_>>();

    if valid.len() < 2 {
        return false;
    }

    valid.into_iter().collect::<BTreeSet<_>>().len() > 1
}

#[cfg(test)]
mod tests {
    use super::{group_by_name, has_different_versions};
    use crate::model::{
        ClusterSnapshot, GroupedRow, NOT_AVAILABLE, RawResourceRecord, ResourceKind,
        SnapshotDetail,
    };
    use std::collections::BTreeSet;

    fn clusters(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn deployment(cluster: &str, namespace: &str, name: &str, image: Option<&str>) -> RawResourceRecord {
        RawResourceRecord {
            name: name.to_string(),
            namespace: namespace.to_string(),
            cluster_id: cluster.to_string(),
            status: "Running".to_string(),
            ready: Some(2),
            replicas: Some(2),
            images: image.map(|image| vec![image.to_string()]).unwrap_or_default(),
            ..RawResourceRecord::default()
        }
    }

    #[test]
    fn same_workload_on_two_clusters_becomes_one_divergent_row() {
        let records = vec![
            deployment("cluster-a", "prod", "web", Some("app:1.0")),
            deployment("cluster-b", "prod", "web", Some("app:1.1")),
        ];

        let rows = group_by_name(
            ResourceKind::Deployments,
            &records,
            &clusters(&["cluster-a", "cluster-b"]),
        );

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.cluster_versions.len(), 2);
        assert_eq!(row.cluster_versions["cluster-a"].version, "app:1.0");
        assert_eq!(row.cluster_versions["cluster-b"].version, "app:1.1");
        assert!(has_different_versions(row));
    }

    #[test]
    fn selected_clusters_without_data_get_sentinel_entries() {
        let records = vec![
            deployment("cluster-a", "prod", "web", Some("app:1.0")),
            deployment("cluster-a", "prod", "api", None),
        ];
        let selected = clusters(&["cluster-a", "cluster-b", "cluster-c"]);

        let rows = group_by_name(ResourceKind::Deployments, &records, &selected);

        assert_eq!(
            rows.iter().map(|row| row.name.as_str()).collect::<Vec<_>>(),
            vec!["web", "api"]
        );
        for row in &rows {
            let keys = row.cluster_versions.keys().cloned().collect::<BTreeSet<_>>();
            assert_eq!(keys, selected.iter().cloned().collect::<BTreeSet<_>>());
            assert_eq!(
                row.cluster_versions["cluster-b"],
                ClusterSnapshot::missing(ResourceKind::Deployments)
            );
        }
        assert_eq!(rows[1].cluster_versions["cluster-a"].version, NOT_AVAILABLE);
    }

    #[test]
    fn cronjob_sentinel_uses_false_and_zero() {
        let record = RawResourceRecord {
            name: "backup".to_string(),
            namespace: "ops".to_string(),
            cluster_id: "cluster-a".to_string(),
            status: "Active".to_string(),
            images: vec!["backup:3".to_string()],
            schedule: Some("*/5 * * * *".to_string()),
            last_run: Some("2024-01-01 10:00:00".to_string()),
            active: Some(1),
            suspend: Some(true),
            ..RawResourceRecord::default()
        };

        let rows = group_by_name(
            ResourceKind::CronJobs,
            &[record],
            &clusters(&["cluster-a", "cluster-b"]),
        );

        let row = &rows[0];
        assert_eq!(row.schedule.as_deref(), Some("*/5 * * * *"));
        assert_eq!(row.last_run.as_deref(), Some("2024-01-01 10:00:00"));
        assert_eq!(
            row.cluster_versions["cluster-a"].detail,
            SnapshotDetail::CronJob {
                schedule: "*/5 * * * *".to_string(),
                last_run: Some("2024-01-01 10:00:00".to_string()),
                active: 1,
                suspend: true,
            }
        );
        match &row.cluster_versions["cluster-b"].detail {
            SnapshotDetail::CronJob { active, suspend, .. } => {
                assert_eq!(*active, 0);
                assert!(!suspend);
            }
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[test]
    fn duplicate_cluster_record_overwrites_silently() {
        let records = vec![
            deployment("cluster-a", "prod", "web", Some("app:1.0")),
            deployment("cluster-a", "prod", "web", Some("app:2.0")),
        ];

        let rows = group_by_name(ResourceKind::Deployments, &records, &clusters(&["cluster-a"]));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cluster_versions["cluster-a"].version, "app:2.0");
    }

    #[test]
    fn same_name_in_different_namespaces_stays_separate() {
        let records = vec![
            deployment("cluster-a", "prod", "web", Some("app:1.0")),
            deployment("cluster-a", "staging", "web", Some("app:1.0")),
        ];

        let rows = group_by_name(ResourceKind::Deployments, &records, &clusters(&["cluster-a"]));

        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn regrouping_flattened_rows_is_idempotent() {
        let selected = clusters(&["cluster-a", "cluster-b", "cluster-c"]);
        let records = vec![
            deployment("cluster-a", "prod", "web", Some("app:1.0")),
            deployment("cluster-b", "prod", "web", Some("app:1.1")),
            deployment("cluster-c", "prod", "worker", Some("worker:7")),
            deployment("cluster-a", "ops", "proxy", None),
        ];
        let rows = group_by_name(ResourceKind::Deployments, &records, &selected);

        let flattened = rows
            .iter()
            .flat_map(|row| {
                row.cluster_versions
                    .iter()
                    .filter(|(_, snapshot)| !snapshot.is_missing())
                    .map(move |(cluster, snapshot)| flatten(row, cluster, snapshot))
            })
            .collect::<Vec<_>>();
        let regrouped = group_by_name(ResourceKind::Deployments, &flattened, &selected);

        assert_eq!(regrouped, rows);
    }

    fn flatten(row: &GroupedRow, cluster: &str, snapshot: &ClusterSnapshot) -> RawResourceRecord {
        let (ready, replicas) = match snapshot.detail {
            SnapshotDetail::Workload { ready, replicas } => (ready, replicas),
            SnapshotDetail::CronJob { .. } => (None, None),
        };
        RawResourceRecord {
            name: row.name.clone(),
            namespace: row.namespace.clone(),
            cluster_id: cluster.to_string(),
            status: snapshot.status.clone(),
            ready,
            replicas,
            images: if snapshot.version == NOT_AVAILABLE {
                Vec::new()
            } else {
                vec![snapshot.version.clone()]
            },
            ..RawResourceRecord::default()
        }
    }

    #[test]
    fn divergence_ignores_sentinels_and_single_deployments() {
        let mut row = GroupedRow::default();
        assert!(!has_different_versions(&row));

        let mut entry = ClusterSnapshot::missing(ResourceKind::Deployments);
        row.cluster_versions.insert("a".to_string(), entry.clone());
        row.cluster_versions.insert("b".to_string(), entry.clone());
        assert!(!has_different_versions(&row));

        entry.version = "app:1.0".to_string();
        row.cluster_versions.insert("a".to_string(), entry.clone());
        assert!(!has_different_versions(&row));

        row.cluster_versions.insert("b".to_string(), entry.clone());
        assert!(!has_different_versions(&row));

        entry.version = "app:1.0.0".to_string();
        row.cluster_versions.insert("c".to_string(), entry);
        assert!(has_different_versions(&row));
    }
}
