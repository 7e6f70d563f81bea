//! Cluster-side shape of a user-code deployment.
//!
//! A registry record is turned into a [`WorkloadSpec`], from which the
//! gateway creates one `Deployment` and one `Service`. Every object carries
//! the `deployment=<name>` label used for selection and cleanup.

use std::collections::BTreeMap;

use super::id::DeploymentName;
use super::record::{DeploymentRecord, EnvVar, ResourceRequirements};

/// Per-deployment selection label.
pub const DEPLOYMENT_LABEL: &str = "deployment";
/// Platform ownership label key.
pub const APP_LABEL: &str = "app";
/// Platform ownership label value for user-code workloads.
pub const APP_VALUE: &str = "dagster-user-deployments";
/// Marks objects created by this tool.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "uc-deploy";
/// Name of the user-code container inside the pod.
pub const CONTAINER_NAME: &str = "user-code";

/// Label selector matching every object of one deployment.
#[must_use]
pub fn selector_for(name: &DeploymentName) -> String {
    format!("{DEPLOYMENT_LABEL}={name}")
}

/// Tag of an image reference such as `registry:5000/dagster/dagster-k8s:1.9.3`.
/// Digests are ignored; untagged references have none.
#[must_use]
pub fn image_tag(image: &str) -> Option<&str> {
    let image = image.split_once('@').map_or(image, |(name, _)| name);
    let last = image.rsplit_once('/').map_or(image, |(_, last)| last);
    last.split_once(':')
        .map(|(_, tag)| tag)
        .filter(|tag| !tag.is_empty())
}

/// Whether an image tag belongs to scheduler `version`: the version itself
/// or the version followed by `-` and a variant.
#[must_use]
pub fn tag_matches_version(tag: &str, version: &str) -> bool {
    tag.strip_prefix(version)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('-'))
}

/// Environment-wide settings applied to every workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSettings {
    /// Port the code server listens on.
    pub grpc_port: u16,
    /// Path of the definitions file inside the image.
    pub code_path: String,
    /// Node label key used to pin pods to the record's node.
    pub node_selector_key: String,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            grpc_port: 3030,
            code_path: "definitions.py".to_string(),
            node_selector_key: "kubernetes.io/hostname".to_string(),
        }
    }
}

/// Everything needed to materialize one user-code workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub name: DeploymentName,
    pub image: String,
    pub port: u16,
    pub args: Vec<String>,
    pub resources: ResourceRequirements,
    pub env: Vec<EnvVar>,
    pub node_selector: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl WorkloadSpec {
    /// Build the workload for a registry record.
    #[must_use]
    pub fn from_record(record: &DeploymentRecord, settings: &WorkloadSettings) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(DEPLOYMENT_LABEL.to_string(), record.name.to_string());
        labels.insert(APP_LABEL.to_string(), APP_VALUE.to_string());
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

        let mut node_selector = BTreeMap::new();
        if !record.node.is_empty() {
            node_selector.insert(settings.node_selector_key.clone(), record.node.clone());
        }

        let args = vec![
            "dagster".to_string(),
            "api".to_string(),
            "grpc".to_string(),
            "-h".to_string(),
            "0.0.0.0".to_string(),
            "-p".to_string(),
            settings.grpc_port.to_string(),
            "-f".to_string(),
            settings.code_path.clone(),
        ];

        Self {
            name: record.name.clone(),
            image: record.image.reference(),
            port: settings.grpc_port,
            args,
            resources: record.resources.clone(),
            env: record.env.clone(),
            node_selector,
            labels,
        }
    }
}

/// An object the gateway can create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    /// Deployment running the code server.
    Deployment(WorkloadSpec),
    /// ClusterIP service exposing the code server under the deployment name.
    Service(WorkloadSpec),
}

impl Manifest {
    /// Deployment and service for a record, in creation order.
    #[must_use]
    pub fn for_record(record: &DeploymentRecord, settings: &WorkloadSettings) -> Vec<Self> {
        let spec = WorkloadSpec::from_record(record, settings);
        vec![Self::Deployment(spec.clone()), Self::Service(spec)]
    }

    #[must_use]
    pub fn spec(&self) -> &WorkloadSpec {
        match self {
            Self::Deployment(spec) | Self::Service(spec) => spec,
        }
    }

    #[must_use]
    pub fn name(&self) -> &DeploymentName {
        &self.spec().name
    }
}
