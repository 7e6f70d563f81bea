//! Workspace-locations document read by the central scheduling service.

use serde::{Deserialize, Serialize};

use super::registry::RegistryDocument;

/// A code location served over gRPC by a user-code deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcServer {
    pub host: String,
    pub port: u16,
    pub location_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub grpc_server: GrpcServer,
}

/// The `workspace.yaml` body listing every code location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceDocument {
    #[serde(default)]
    pub load_from: Vec<LocationEntry>,
}

impl WorkspaceDocument {
    /// One location per registered deployment, in registry order.
    #[must_use]
    pub fn from_registry(registry: &RegistryDocument, port: u16) -> Self {
        let load_from = registry
            .iter()
            .map(|record| LocationEntry {
                grpc_server: GrpcServer {
                    host: record.name.to_string(),
                    port,
                    location_name: record.name.to_string(),
                },
            })
            .collect();
        Self { load_from }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
