use std::collections::BTreeMap;

use crate::config::LatestVersions;
use crate::model::{NOT_AVAILABLE, UpdateQuery, UpdateResponse, VersionUpdate};

/// Answers update checks from statically configured latest tags.
///
/// Image repositories win over per-kind defaults. The reported latest version
/// has the same `repository:tag` shape as the queried version, so both sides
/// can be compared as plain strings.
#[derive(Debug, Clone, Default)]
pub struct VersionCatalog {
    kinds: BTreeMap<String, String>,
    images: BTreeMap<String, String>,
}

impl VersionCatalog {
    pub fn new(latest: &LatestVersions) -> Self {
        Self {
            kinds: latest.kinds.clone(),
            images: latest.images.clone(),
        }
    }

    pub fn check(&self, resources: &[UpdateQuery]) -> UpdateResponse {
        let updates = resources
            .iter()
            .filter_map(|resource| self.check_one(resource))
            .collect();
        UpdateResponse { updates }
    }

    fn check_one(&self, resource: &UpdateQuery) -> Option<VersionUpdate> {
        let current = resource.version.trim();
        if current.is_empty() || current == NOT_AVAILABLE {
            return None;
        }

        let (repository, _) = split_image(current);
        let latest_tag = self
            .images
            .get(repository)
            .or_else(|| self.kinds.get(&resource.kind))
            .filter(|tag| !tag.trim().is_empty())?;
        let latest = format!("{repository}:{}", latest_tag.trim());
        if latest == current {
            return None;
        }

        Some(VersionUpdate {
            kind: resource.kind.clone(),
            name: resource.name.clone(),
            namespace: resource.namespace.clone(),
            current_version: Some(current.to_string()),
            latest_version: Some(latest),
        })
    }
}

/// Splits `app:1.2` into repository and tag; untagged images report `latest`.
pub fn split_image(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repository, tag)) if !tag.contains('/') => (repository, tag),
        _ => (image, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::{VersionCatalog, split_image};
    use crate::config::LatestVersions;
    use crate::model::UpdateQuery;

    fn query(kind: &str, name: &str, version: &str) -> UpdateQuery {
        UpdateQuery {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: "prod".to_string(),
            version: version.to_string(),
        }
    }

    fn catalog() -> VersionCatalog {
        let mut latest = LatestVersions::default();
        latest
            .kinds
            .insert("Deployment".to_string(), "1.28.0".to_string());
        latest
            .images
            .insert("nginx".to_string(), "1.27.2".to_string());
        VersionCatalog::new(&latest)
    }

    #[test]
    fn image_tags_override_kind_defaults() {
        let response = catalog().check(&[
            query("Deployment", "web", "nginx:1.25"),
            query("Deployment", "api", "api:1.27.0"),
        ]);

        assert_eq!(response.updates.len(), 2);
        assert_eq!(
            response.updates[0].latest_version.as_deref(),
            Some("nginx:1.27.2")
        );
        assert_eq!(
            response.updates[0].current_version.as_deref(),
            Some("nginx:1.25")
        );
        assert_eq!(response.updates[1].name, "api");
        assert_eq!(
            response.updates[1].latest_version.as_deref(),
            Some("api:1.28.0")
        );
    }

    #[test]
    fn up_to_date_unknown_and_missing_versions_are_skipped() {
        let response = catalog().check(&[
            query("Deployment", "web", "nginx:1.27.2"),
            query("CronJob", "backup", "backup:1"),
            query("Deployment", "ghost", "N/A"),
            query("Deployment", "empty", ""),
        ]);

        assert!(response.updates.is_empty());
    }

    #[test]
    fn split_image_handles_missing_tag() {
        assert_eq!(split_image("app:1.2"), ("app", "1.2"));
        assert_eq!(split_image("app"), ("app", "latest"));
    }
}
