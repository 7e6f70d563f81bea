//! Outbound adapters (driven side).

pub mod git;
pub mod k8s;
pub mod podman;
pub mod sleeper;

pub use git::GitSource;
pub use k8s::KubeGateway;
pub use podman::PodmanBuilder;
pub use sleeper::TokioSleeper;
