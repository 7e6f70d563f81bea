//! The registry document: every active deployment of an environment.
//!
//! Serialized as a single YAML body (`deployments: [...]`) so the whole
//! document is always read and written at once. Order of insertion is kept.

use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::id::DeploymentName;
use super::record::DeploymentRecord;

/// Ordered collection of deployment records keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    deployments: Vec<DeploymentRecord>,
}

impl RegistryDocument {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a stored body. A blank body is an empty registry.
    pub fn parse(body: &str) -> Result<Self, DomainError> {
        if body.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_yaml::from_str(body).map_err(|e| DomainError::MalformedDocument {
            document: "registry",
            reason: e.to_string(),
        })
    }

    /// Serialize to the stored body.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Whether a record with this name exists.
    #[must_use]
    pub fn contains(&self, name: &DeploymentName) -> bool {
        self.get(name).is_some()
    }

    /// Look up a record by name.
    #[must_use]
    pub fn get(&self, name: &DeploymentName) -> Option<&DeploymentRecord> {
        self.deployments.iter().find(|d| &d.name == name)
    }

    /// Append a record. Fails if the name is already present.
    pub fn insert(&mut self, record: DeploymentRecord) -> Result<(), DomainError> {
        if self.contains(&record.name) {
            return Err(DomainError::DuplicateDeployment {
                name: record.name.to_string(),
            });
        }
        self.deployments.push(record);
        Ok(())
    }

    /// Remove a record by name, returning it if it was present.
    pub fn remove(&mut self, name: &DeploymentName) -> Option<DeploymentRecord> {
        let index = self.deployments.iter().position(|d| &d.name == name)?;
        Some(self.deployments.remove(index))
    }

    /// Remove every record. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.deployments.len();
        self.deployments.clear();
        count
    }

    /// Iterate records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &DeploymentRecord> {
        self.deployments.iter()
    }

    /// Names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<&DeploymentName> {
        self.deployments.iter().map(|d| &d.name).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deployments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deployments.is_empty()
    }

    /// Consume into the underlying records.
    #[must_use]
    pub fn into_records(self) -> Vec<DeploymentRecord> {
        self.deployments
    }
}
