//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports are the seams where the deployment engine meets the outside world.
//! Adapters implement them against Kubernetes, podman and git; the
//! `testkit` feature provides in-memory implementations.
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │      Application        │
//!                    │                         │
//!     ┌──────────────┤  Domain + Port          ├──────────────┐
//!     │              │                         │              │
//!     │              └─────────────────────────┘              │
//!     │                         │                             │
//!     ▼                         ▼                             ▼
//! ┌─────────┐            ┌─────────────┐              ┌───────────┐
//! │ Cluster │            │   Image     │              │  Source   │
//! │ Adapter │            │   Builder   │              │  Control  │
//! └─────────┘            └─────────────┘              └───────────┘
//! ```
//!
//! # Available Ports
//!
//! - [`ClusterGateway`] - Object listing, creation and deletion, config
//!   documents, pod logs and readiness
//! - [`ImageBuilder`] - Build and push user-code images
//! - [`SourceControl`] - Current branch for default deployment names
//! - [`Sleeper`] - Injected delays for retry and polling loops

pub mod outbound;

pub use outbound::builder::{BuildRequest, ImageBuilder};
pub use outbound::cluster::{
    ClusterGateway, ClusterObject, ConfigDocument, LogStream, PodCondition, Precondition,
    ResourceKind,
};
pub use outbound::sleeper::Sleeper;
pub use outbound::source::SourceControl;
