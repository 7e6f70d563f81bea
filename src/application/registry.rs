//! Registry store.
//!
//! The registry document lives as one data key of a cluster config object.
//! Every mutation is a whole-document read-modify-write. Writes pin the
//! version observed by the read, so an out-of-band edit between the two
//! fails fast with [`Error::RegistryConflict`] instead of being overwritten.
//! Callers still hold the deployment semaphore for every mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::id::DeploymentName;
use crate::domain::record::DeploymentRecord;
use crate::domain::registry::RegistryDocument;
use crate::error::{Error, Result};
use crate::port::{ClusterGateway, Precondition};

/// Access to the shared registry document.
pub struct RegistryStore {
    cluster: Arc<dyn ClusterGateway>,
    document: String,
    key: String,
}

impl RegistryStore {
    pub fn new(
        cluster: Arc<dyn ClusterGateway>,
        document: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            document: document.into(),
            key: key.into(),
        }
    }

    /// Create an empty registry document if none exists yet.
    ///
    /// Returns `true` when the document was created.
    pub async fn ensure_exists(&self) -> Result<bool> {
        if self.cluster.read_document(&self.document).await?.is_some() {
            return Ok(false);
        }
        match self.store(&RegistryDocument::new(), Precondition::Absent).await {
            Ok(()) => {
                info!(registry = %self.document, "Created empty registry document");
                Ok(true)
            }
            // Another operator created it first.
            Err(Error::RegistryConflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read and parse the registry together with the precondition that pins
    /// the version it was read at.
    pub async fn load(&self) -> Result<(RegistryDocument, Precondition)> {
        let current = self.cluster.read_document(&self.document).await?;
        let precondition = Precondition::from_read(current.as_ref());
        let registry = match current.as_ref().and_then(|doc| doc.data.get(&self.key)) {
            Some(body) => RegistryDocument::parse(body)?,
            None => RegistryDocument::new(),
        };
        Ok((registry, precondition))
    }

    /// Current registry contents.
    pub async fn snapshot(&self) -> Result<RegistryDocument> {
        Ok(self.load().await?.0)
    }

    /// All registered deployment records, in insertion order.
    pub async fn list(&self) -> Result<Vec<DeploymentRecord>> {
        Ok(self.snapshot().await?.into_records())
    }

    pub async fn check_exists(&self, name: &DeploymentName) -> Result<bool> {
        Ok(self.snapshot().await?.contains(name))
    }

    /// Append a record. A record with the same name is never overwritten.
    pub async fn add(&self, record: DeploymentRecord) -> Result<()> {
        let name = record.name.clone();
        let tag = record.image.tag.clone();
        self.mutate(|registry| registry.insert(record).map_err(Error::from))
            .await?;
        info!(deployment = %name, tag = %tag, "Registered deployment");
        Ok(())
    }

    /// Remove a record by name. Returns whether a record was removed; a
    /// missing name leaves the document untouched.
    pub async fn remove(&self, name: &DeploymentName) -> Result<bool> {
        let (mut registry, precondition) = self.load().await?;
        if registry.remove(name).is_none() {
            debug!(deployment = %name, "Deployment not registered, nothing to remove");
            return Ok(false);
        }
        self.store(&registry, precondition).await?;
        info!(deployment = %name, "Removed deployment from registry");
        Ok(true)
    }

    /// Remove every record. Returns how many were removed.
    pub async fn remove_all(&self) -> Result<usize> {
        let (mut registry, precondition) = self.load().await?;
        let removed = registry.clear();
        self.store(&registry, precondition).await?;
        info!(removed, "Cleared registry");
        Ok(removed)
    }

    async fn mutate<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut RegistryDocument) -> Result<()>,
    {
        let (mut registry, precondition) = self.load().await?;
        apply(&mut registry)?;
        self.store(&registry, precondition).await
    }

    async fn store(&self, registry: &RegistryDocument, precondition: Precondition) -> Result<()> {
        let body = registry.to_yaml()?;
        let data = BTreeMap::from([(self.key.clone(), body)]);
        match self
            .cluster
            .write_document(&self.document, data, precondition)
            .await
        {
            Err(e) if e.is_conflict() => Err(Error::RegistryConflict {
                name: self.document.clone(),
            }),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::cluster::InMemoryCluster;
    use crate::testkit::config::{REGISTRY_DOCUMENT, REGISTRY_KEY};
    use crate::testkit::domain::{name, record};

    fn store() -> (Arc<InMemoryCluster>, RegistryStore) {
        let cluster = Arc::new(InMemoryCluster::new());
        let store = RegistryStore::new(cluster.clone(), REGISTRY_DOCUMENT, REGISTRY_KEY);
        (cluster, store)
    }

    #[tokio::test]
    async fn missing_document_reads_as_empty() {
        let (_, store) = store();
        assert!(store.list().await.unwrap().is_empty());
        assert!(!store.check_exists(&name("feature-x")).await.unwrap());
    }

    #[tokio::test]
    async fn ensure_exists_creates_once() {
        let (cluster, store) = store();
        assert!(store.ensure_exists().await.unwrap());
        assert!(!store.ensure_exists().await.unwrap());
        assert_eq!(cluster.document_writes(REGISTRY_DOCUMENT), 1);
    }

    #[tokio::test]
    async fn add_then_remove() {
        let (_, store) = store();
        store.add(record("feature-x", "abc123")).await.unwrap();
        store.add(record("main", "abc123")).await.unwrap();
        assert!(store.check_exists(&name("feature-x")).await.unwrap());

        assert!(store.remove(&name("feature-x")).await.unwrap());
        assert!(!store.remove(&name("feature-x")).await.unwrap());
        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec![name("main")]);
    }

    #[tokio::test]
    async fn duplicate_add_fails_without_writing() {
        let (cluster, store) = store();
        store.add(record("feature-x", "abc123")).await.unwrap();
        let writes = cluster.document_writes(REGISTRY_DOCUMENT);

        let err = store.add(record("feature-x", "def456")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Domain(crate::domain::DomainError::DuplicateDeployment { .. })
        ));
        assert_eq!(cluster.document_writes(REGISTRY_DOCUMENT), writes);
        assert_eq!(store.list().await.unwrap()[0].image.tag.as_str(), "abc123");
    }

    #[tokio::test]
    async fn concurrent_edit_fails_fast() {
        let (cluster, store) = store();
        store.add(record("feature-x", "abc123")).await.unwrap();
        cluster.conflict_next_write(REGISTRY_DOCUMENT);

        let err = store.add(record("main", "abc123")).await.unwrap_err();
        assert!(matches!(err, Error::RegistryConflict { .. }));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_all_counts_records() {
        let (_, store) = store();
        for n in ["a", "b", "c"] {
            store.add(record(n, "abc123")).await.unwrap();
        }
        assert_eq!(store.remove_all().await.unwrap(), 3);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let (cluster, store) = store();
        cluster.put_document(REGISTRY_DOCUMENT, &[(REGISTRY_KEY, "deployments: 12")]);
        let err = store.list().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Domain(crate::domain::DomainError::MalformedDocument { .. })
        ));
    }
}
