//! Explicit operation context.
//!
//! Built once at startup and handed to every operation; there is no
//! process-wide mutable state.

use std::path::PathBuf;
use std::sync::Arc;

use crate::application::semaphore::RetryPolicy;
use crate::application::watcher::WatchSettings;
use crate::domain::id::{DeploymentName, ImageTag};
use crate::domain::reconcile::PipelineMode;
use crate::domain::record::{DeploymentRecord, EnvVar, ImageRef, ResourceRequirements};
use crate::domain::workload::WorkloadSettings;
use crate::port::{ClusterGateway, ImageBuilder, Sleeper, SourceControl};

/// Where and how user-code images are built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSettings {
    /// Registry host images are pushed to.
    pub registry: String,
    /// Optional repository prefix, e.g. `team`.
    pub prefix: Option<String>,
    pub dockerfile: PathBuf,
    /// Build context root.
    pub source_root: PathBuf,
    /// Scheduler version; leading component of generated tags.
    pub version: String,
    pub use_az_login: bool,
}

impl ImageSettings {
    /// Repository path for a deployment: `<prefix>/<name>` or `<name>`.
    #[must_use]
    pub fn image_name(&self, name: &DeploymentName) -> String {
        match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{name}"),
            _ => name.to_string(),
        }
    }
}

/// Names of the config objects shared by every operator of an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentNames {
    /// Config object holding the registry document.
    pub registry: String,
    /// Data key of the registry body inside that object.
    pub registry_key: String,
    /// Config object holding the lock record.
    pub lock: String,
    /// Config object holding the workspace-locations document.
    pub workspace: String,
    /// Data key of the workspace body.
    pub workspace_key: String,
}

/// Environment-level settings for every deployment operation.
#[derive(Debug, Clone)]
pub struct DeploymentSettings {
    pub environment: String,
    pub documents: DocumentNames,
    pub image: ImageSettings,
    pub workload: WorkloadSettings,
    pub resources: ResourceRequirements,
    pub env: Vec<EnvVar>,
    pub node: String,
    /// Pods deleted to make the scheduling service reload its locations.
    pub scheduler_reload_selectors: Vec<String>,
    /// Selectors identifying every object owned by the user-code platform.
    pub ownership_selectors: Vec<String>,
    pub mode: PipelineMode,
    pub lock_retry: RetryPolicy,
    pub watch: WatchSettings,
    /// Base URL of the scheduler UI, if any.
    pub gui_url: Option<String>,
}

impl DeploymentSettings {
    /// Registry record for `name` running `tag`.
    #[must_use]
    pub fn record_for(&self, name: &DeploymentName, tag: &ImageTag) -> DeploymentRecord {
        DeploymentRecord {
            name: name.clone(),
            image: ImageRef {
                registry: self.image.registry.clone(),
                repository: self.image.image_name(name),
                tag: tag.clone(),
            },
            resources: self.resources.clone(),
            env: self.env.clone(),
            node: self.node.clone(),
        }
    }

    /// Link to the deployment's assets in the scheduler UI.
    #[must_use]
    pub fn assets_url(&self, name: &DeploymentName) -> Option<String> {
        self.gui_url
            .as_deref()
            .map(|url| format!("{}/locations/{name}/assets", url.trim_end_matches('/')))
    }
}

/// Adapters and settings shared by all operations of one invocation.
#[derive(Clone)]
pub struct Context {
    pub cluster: Arc<dyn ClusterGateway>,
    pub builder: Arc<dyn ImageBuilder>,
    pub source: Arc<dyn SourceControl>,
    pub sleeper: Arc<dyn Sleeper>,
    pub settings: Arc<DeploymentSettings>,
}

impl Context {
    pub fn new(
        cluster: Arc<dyn ClusterGateway>,
        builder: Arc<dyn ImageBuilder>,
        source: Arc<dyn SourceControl>,
        sleeper: Arc<dyn Sleeper>,
        settings: DeploymentSettings,
    ) -> Self {
        Self {
            cluster,
            builder,
            source,
            sleeper,
            settings: Arc::new(settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(prefix: Option<&str>) -> ImageSettings {
        ImageSettings {
            registry: "registry.example.com".into(),
            prefix: prefix.map(str::to_string),
            dockerfile: "Dockerfile".into(),
            source_root: ".".into(),
            version: "1.9.3".into(),
            use_az_login: false,
        }
    }

    #[test]
    fn image_name_applies_prefix() {
        let name = DeploymentName::parse("feature-x").unwrap();
        assert_eq!(image(None).image_name(&name), "feature-x");
        assert_eq!(image(Some("")).image_name(&name), "feature-x");
        assert_eq!(image(Some("team/")).image_name(&name), "team/feature-x");
    }
}
