//! Cluster gateway port.
//!
//! The minimal set of orchestration primitives the deployment engine needs:
//! label-selected listing, applying and deleting objects, whole-document
//! reads and writes of named config objects, pod logs and readiness waits.
//! All operations are scoped to the gateway's namespace.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::workload::Manifest;
use crate::error::Result;

/// Object kinds the engine manipulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Pod,
    Deployment,
    Service,
    ConfigMap,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pod => "Pod",
            Self::Deployment => "Deployment",
            Self::Service => "Service",
            Self::ConfigMap => "ConfigMap",
        };
        f.write_str(label)
    }
}

/// Summary of a listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterObject {
    pub kind: ResourceKind,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Container images of Pods and Deployments; empty for other kinds.
    pub images: Vec<String>,
}

/// A named config document with its storage version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    pub data: BTreeMap<String, String>,
    /// Opaque version token; `None` if the backend does not version objects.
    pub version: Option<String>,
}

/// Condition a write must satisfy to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional overwrite (creating the document if missing).
    Any,
    /// The document must not exist yet.
    Absent,
    /// The stored version must still equal this token.
    Version(String),
}

impl Precondition {
    /// Precondition that pins the version a document was read at.
    #[must_use]
    pub fn from_read(document: Option<&ConfigDocument>) -> Self {
        match document {
            None => Self::Absent,
            Some(ConfigDocument {
                version: Some(version),
                ..
            }) => Self::Version(version.clone()),
            Some(_) => Self::Any,
        }
    }
}

/// Pod conditions a caller can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodCondition {
    Ready,
}

impl fmt::Display for PodCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("condition=Ready"),
        }
    }
}

/// Lines of a followed pod log.
pub type LogStream = BoxStream<'static, Result<String>>;

/// Orchestration primitives used by the deployment engine.
///
/// Implementations must map a failed [`Precondition`] to
/// [`ClusterError::Conflict`](crate::error::ClusterError::Conflict).
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// List objects of `kind` matching a label selector (`key=value`,
    /// `key` or comma-separated combinations).
    async fn list(&self, kind: ResourceKind, selector: &str) -> Result<Vec<ClusterObject>>;

    /// Create an object, or update the existing one in place to match
    /// the manifest.
    async fn apply(&self, manifest: &Manifest) -> Result<()>;

    /// Delete one object by name. Deleting a missing object is not an error.
    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()>;

    /// Read a named config document.
    async fn read_document(&self, name: &str) -> Result<Option<ConfigDocument>>;

    /// Write a named config document, replacing its whole data.
    async fn write_document(
        &self,
        name: &str,
        data: BTreeMap<String, String>,
        precondition: Precondition,
    ) -> Result<()>;

    /// Follow a pod's log.
    async fn stream_logs(&self, pod: &str) -> Result<LogStream>;

    /// Block until `pod` satisfies `condition` or `timeout` elapses
    /// ([`ClusterError::Timeout`](crate::error::ClusterError::Timeout)).
    async fn wait_for(&self, pod: &str, condition: PodCondition, timeout: Duration) -> Result<()>;

    /// Delete every object of `kind` matching `selector`. Returns how many
    /// objects were deleted.
    async fn delete_matching(&self, kind: ResourceKind, selector: &str) -> Result<usize> {
        let objects = self.list(kind, selector).await?;
        for object in &objects {
            self.delete(kind, &object.name).await?;
        }
        Ok(objects.len())
    }
}
