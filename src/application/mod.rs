//! Application services (use cases).
//!
//! These services combine the pure domain rules with the outbound ports to
//! implement deploy, revive, delete, list and check.

pub mod context;
pub mod deployment;
pub mod reconciler;
pub mod registry;
pub mod semaphore;
pub mod watcher;

pub use context::{Context, DeploymentSettings, DocumentNames, ImageSettings};
pub use deployment::{CheckReport, DeleteAllOutcome, DeployOutcome, DeployRequest, DeploymentService};
pub use reconciler::Reconciler;
pub use registry::RegistryStore;
pub use semaphore::{DistributedSemaphore, RetryPolicy};
pub use watcher::{LogOutcome, Observation, ReadinessOutcome, StatusWatcher, WatchSettings};
