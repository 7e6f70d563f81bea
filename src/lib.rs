//! uc-deploy - isolated user-code deployments on a shared scheduling cluster.
//!
//! Each deployment (usually one per development branch) is a registry
//! record plus a Deployment and a Service in the cluster. Every mutating
//! operation runs under a cluster-wide lock, classifies the current state
//! of the deployment and performs the minimal cleanup and reload for it.
//!
//! # Architecture
//!
//! - [`domain`] - Names, tags, records, the registry and workspace documents,
//!   the lock record and the reconciliation decision table. Pure.
//! - [`port`] - Traits for the cluster, the image builder, source control
//!   and sleeping.
//! - [`application`] - Semaphore, registry store, reconciler, status
//!   watcher and the deployment service tying them together.
//! - [`adapter`] - The CLI and the Kubernetes, podman and git adapters.
//! - [`infrastructure`] - Configuration, logging and bootstrap wiring.
//! - [`error`] - Error types for the crate.
//!
//! # Features
//!
//! - `testkit` - In-memory cluster and scripted doubles for tests

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
