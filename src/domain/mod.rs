//! Pure domain types: deployment records, the registry and lock
//! documents, workload shapes and the reconciliation decision table.
//!
//! Nothing in this module performs I/O.

pub mod error;
pub mod id;
pub mod lock;
pub mod reconcile;
pub mod record;
pub mod registry;
pub mod workload;
pub mod workspace;

pub use error::DomainError;
pub use id::{DeploymentName, HolderToken, ImageTag};
pub use lock::LockRecord;
pub use reconcile::{CleanupScope, DeploymentState, PipelineMode, ReconcilePlan, ReloadScope};
pub use record::{DeploymentRecord, EnvSource, EnvVar, ImageRef, ResourceRequirements, SecretKeyRef};
pub use registry::RegistryDocument;
pub use workload::{Manifest, WorkloadSettings, WorkloadSpec};
pub use workspace::WorkspaceDocument;
