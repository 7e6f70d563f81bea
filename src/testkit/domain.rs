//! Builders for domain primitives used across tests.

use crate::domain::id::{DeploymentName, ImageTag};
use crate::domain::record::DeploymentRecord;
use crate::domain::registry::RegistryDocument;

/// Parse a deployment name.
pub fn name(raw: &str) -> DeploymentName {
    DeploymentName::parse(raw).expect("valid deployment name")
}

/// Parse an image tag.
pub fn tag(raw: &str) -> ImageTag {
    ImageTag::parse(raw).expect("valid image tag")
}

/// Record for `name:tag` built from the canonical test settings.
pub fn record(deployment: &str, image_tag: &str) -> DeploymentRecord {
    super::config::settings().record_for(&name(deployment), &tag(image_tag))
}

/// Registry holding one record per `(name, tag)` pair.
pub fn registry(entries: &[(&str, &str)]) -> RegistryDocument {
    let mut registry = RegistryDocument::new();
    for (deployment, image_tag) in entries {
        registry
            .insert(record(deployment, image_tag))
            .expect("unique names");
    }
    registry
}
