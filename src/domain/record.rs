//! Deployment records stored in the registry document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::id::{DeploymentName, ImageTag};

/// Fully qualified container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Registry host, e.g. `myregistry.azurecr.io`.
    pub registry: String,
    /// Repository path inside the registry, without the tag.
    pub repository: String,
    /// Image tag.
    pub tag: ImageTag,
}

impl ImageRef {
    /// Render as `<registry>/<repository>:<tag>`.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// Kubernetes-style resource requests and limits (`cpu`, `memory`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

/// Reference to a single key of a cluster secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyRef {
    /// Secret object name.
    pub name: String,
    /// Key inside the secret.
    pub key: String,
}

/// Where an environment variable's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvSource {
    /// Literal value.
    Value(String),
    /// Value read from a secret at pod start.
    SecretRef(SecretKeyRef),
}

/// Environment variable for the user-code container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(flatten)]
    pub source: EnvSource,
}

impl EnvVar {
    /// Plain `name=value` variable.
    pub fn value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::Value(value.into()),
        }
    }

    /// Variable populated from `secret[key]`.
    pub fn secret(
        name: impl Into<String>,
        secret: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::SecretRef(SecretKeyRef {
                name: secret.into(),
                key: key.into(),
            }),
        }
    }
}

/// A single user-code deployment as registered for the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub name: DeploymentName,
    pub image: ImageRef,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub node: String,
}

impl DeploymentRecord {
    /// Copy of this record pointing at a different image tag.
    #[must_use]
    pub fn with_tag(&self, tag: ImageTag) -> Self {
        let mut record = self.clone();
        record.image.tag = tag;
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> DeploymentRecord {
        DeploymentRecord {
            name: DeploymentName::parse("feature-x").unwrap(),
            image: ImageRef {
                registry: "registry.example.com".into(),
                repository: "team/feature-x".into(),
                tag: ImageTag::parse("abc123").unwrap(),
            },
            resources: ResourceRequirements::default(),
            env: vec![
                EnvVar::value("MODE", "dev"),
                EnvVar::secret("DB_URL", "database", "url"),
            ],
            node: "pool-a".into(),
        }
    }

    #[test]
    fn image_reference_format() {
        assert_eq!(
            record().image.reference(),
            "registry.example.com/team/feature-x:abc123"
        );
    }

    #[test]
    fn env_sources_use_flat_yaml_keys() {
        let yaml = serde_yaml::to_string(&record().env).unwrap();
        assert!(yaml.contains("value: dev"));
        assert!(yaml.contains("secretRef:"));

        let parsed: Vec<EnvVar> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, record().env);
    }

    #[test]
    fn with_tag_only_changes_tag() {
        let original = record();
        let updated = original.with_tag(ImageTag::parse("def456").unwrap());
        assert_eq!(updated.image.tag.as_str(), "def456");
        assert_eq!(updated.name, original.name);
        assert_eq!(updated.image.repository, original.image.repository);
    }
}
