use crate::model::{CombinedResources, RawResourceRecord};

const DEV: &str = "cluster-dev";
const STAGING: &str = "cluster-staging";
const PROD: &str = "cluster-prod";

/// Offline dataset shown when no cluster can be reached at all.
pub fn dataset() -> CombinedResources {
    CombinedResources {
        deployments: vec![
            workload(DEV, "frontend", "web", "Running", 2, 2, "web:2.4.0"),
            workload(STAGING, "frontend", "web", "Running", 2, 2, "web:2.3.1"),
            workload(PROD, "frontend", "web", "Running", 4, 4, "web:2.3.1"),
            workload(DEV, "backend", "api", "Running", 1, 1, "api:1.9.0"),
            workload(STAGING, "backend", "api", "Progressing", 1, 2, "api:1.9.0"),
            workload(PROD, "backend", "api", "Running", 3, 3, "api:1.9.0"),
            workload(DEV, "backend", "notifier", "Running", 1, 1, "notifier:0.4.2"),
        ],
        cronjobs: vec![
            cronjob(DEV, "backend", "report", "0 6 * * *", false, "report:1.1.0"),
            cronjob(PROD, "backend", "report", "0 6 * * *", false, "report:1.0.3"),
            cronjob(STAGING, "ops", "db-backup", "30 1 * * *", true, "pgdump:16.2"),
            cronjob(PROD, "ops", "db-backup", "30 1 * * *", false, "pgdump:16.2"),
        ],
        statefulsets: vec![
            workload(DEV, "data", "postgres", "Running", 1, 1, "postgres:16.2"),
            workload(STAGING, "data", "postgres", "Running", 1, 1, "postgres:16.2"),
            workload(PROD, "data", "postgres", "Running", 3, 3, "postgres:15.6"),
            workload(PROD, "data", "redis", "Running", 3, 3, "redis:7.2.4"),
        ],
        namespaces: ["backend", "data", "frontend", "ops"]
            .into_iter()
            .map(str::to_string)
            .collect(),
        errors: Vec::new(),
    }
}

fn workload(
    cluster: &str,
    namespace: &str,
    name: &str,
    status: &str,
    ready: i32,
    replicas: i32,
    image: &str,
) -> RawResourceRecord {
    RawResourceRecord {
        name: name.to_string(),
        namespace: namespace.to_string(),
        cluster_id: cluster.to_string(),
        status: status.to_string(),
        ready: Some(ready),
        replicas: Some(replicas),
        images: vec![image.to_string()],
        ..RawResourceRecord::default()
    }
}

fn cronjob(
    cluster: &str,
    namespace: &str,
    name: &str,
    schedule: &str,
    suspend: bool,
    image: &str,
) -> RawResourceRecord {
    RawResourceRecord {
        name: name.to_string(),
        namespace: namespace.to_string(),
        cluster_id: cluster.to_string(),
        status: if suspend { "Suspended" } else { "Scheduled" }.to_string(),
        images: vec![image.to_string()],
        schedule: Some(schedule.to_string()),
        last_run: Some("2024-05-02 06:00:00".to_string()),
        active: Some(0),
        suspend: Some(suspend),
        ..RawResourceRecord::default()
    }
}
