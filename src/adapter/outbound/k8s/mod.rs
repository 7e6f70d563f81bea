//! Kubernetes cluster adapter (kube + k8s-openapi).

pub mod gateway;
pub mod manifest;

pub use gateway::KubeGateway;
