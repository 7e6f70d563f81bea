use thiserror::Error;

use crate::domain::error::DomainError;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("environment '{environment}' is not defined in {path}")]
    UnknownEnvironment { environment: String, path: String },

    #[error("{0}")]
    Other(String),
}

/// Failures reported by the cluster gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("write conflict on config document '{name}'")]
    Conflict { name: String },

    #[error("timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("cluster API error: {0}")]
    Api(String),
}

/// Image build and push failures.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{tool} installation is required to build user-code images")]
    ToolUnavailable { tool: String },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("deployment \"{name}\" already exists")]
    DeploymentExists { name: String },

    #[error("registry document '{name}' was modified concurrently; retry the operation")]
    RegistryConflict { name: String },

    #[error("could not determine git branch: {0}")]
    SourceControl(String),

    #[error("scheduler pod '{pod}' runs {running} but scheduler_version is {configured}")]
    VersionMismatch {
        configured: String,
        running: String,
        pod: String,
    },

    #[error("deployment lock not acquired after {attempts} attempts")]
    LockNotAcquired { attempts: u32 },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the error is a precondition failure on a versioned write.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Cluster(ClusterError::Conflict { .. }))
    }
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        // dialoguer::Error wraps an IO error
        Error::Io(std::io::Error::other(err.to_string()))
    }
}
