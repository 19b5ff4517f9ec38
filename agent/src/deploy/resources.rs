//! Per-project resource identifiers

/// Label attached to every container, image and compose service of a project
pub const PROJECT_LABEL: &str = "com.last-deploy.project_id";

const NAME_PREFIX: &str = "last-deploy";

/// Docker-level names derived from a project id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub project_id: String,
    pub container: String,
    pub image: String,
    pub compose_project: String,
    pub network_prefix: String,
}

impl ResourceNames {
    pub fn for_project(project_id: &str) -> Self {
        let base = format!("{NAME_PREFIX}-{project_id}");
        Self {
            project_id: project_id.to_string(),
            container: base.clone(),
            image: format!("{NAME_PREFIX}:{project_id}"),
            compose_project: base.clone(),
            network_prefix: base,
        }
    }

    /// `key=value` filter for label-scoped listings
    pub fn label_filter(&self) -> String {
        format!("{PROJECT_LABEL}={}", self.project_id)
    }
}
