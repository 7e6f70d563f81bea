//! User-code deployment configuration loading and validation.
//!
//! One YAML file holds a [`UserCodeConfig`] per environment, keyed by the
//! environment name:
//!
//! ```yaml
//! dev:
//!   environment: dev
//!   namespace: dagster
//!   container_registry: myregistry.azurecr.io
//!   scheduler_version: 1.9.3
//!   requests: { cpu: "1", memory: 1Gi }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use uc_deploy::infrastructure::config::settings::UserCodeConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = UserCodeConfig::load(".config_user_code_deployments.yaml", "dev")?;
//!     config.logging.init();
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use crate::application::context::{DeploymentSettings, DocumentNames, ImageSettings};
use crate::application::semaphore::RetryPolicy;
use crate::application::watcher::WatchSettings;
use crate::domain::id::ImageTag;
use crate::domain::reconcile::PipelineMode;
use crate::domain::record::{EnvSource, EnvVar, ResourceRequirements};
use crate::domain::workload::WorkloadSettings;
use crate::error::{ConfigError, Result};

/// Config file used when `--config-file` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".config_user_code_deployments.yaml";

/// Data key of the workspace-locations body inside its config object.
pub const WORKSPACE_KEY: &str = "workspace.yaml";

/// Settings for deploying user code into one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCodeConfig {
    pub environment: String,
    pub namespace: String,
    /// kubeconfig context; the current context when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_context: Option<String>,
    pub container_registry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prefix: Option<String>,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: PathBuf,
    /// Build context handed to the image builder.
    #[serde(default = "default_root")]
    pub repository_root: PathBuf,
    /// Definitions file loaded by the code server inside the image.
    #[serde(default = "default_code_path")]
    pub code_path: String,
    /// Version of the scheduling platform; leads every generated image tag.
    pub scheduler_version: String,
    /// Node the user-code pods are pinned to. Empty means unpinned.
    #[serde(default)]
    pub node: String,
    #[serde(default = "default_node_selector_key")]
    pub node_selector_key: String,
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    /// Running inside a CI/CD pipeline.
    #[serde(default)]
    pub cicd: bool,
    #[serde(default)]
    pub use_az_login: bool,
    /// Base URL of the scheduler UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gui_url: Option<String>,
    #[serde(default = "default_registry_configmap")]
    pub registry_configmap: String,
    #[serde(default = "default_workspace_configmap")]
    pub workspace_configmap: String,
    #[serde(default = "default_lock_configmap")]
    pub lock_configmap: String,
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default = "default_scheduler_reload_selectors")]
    pub scheduler_reload_selectors: Vec<String>,
    #[serde(default = "default_ownership_selectors")]
    pub ownership_selectors: Vec<String>,
    #[serde(default = "default_lock_retry_secs")]
    pub lock_retry_secs: u64,
    /// Give up on the deployment lock after this many attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_max_attempts: Option<u32>,
    #[serde(default = "default_pod_poll_secs")]
    pub pod_poll_secs: u64,
    #[serde(default = "default_log_timeout_secs")]
    pub log_timeout_secs: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_dockerfile() -> PathBuf {
    PathBuf::from("./Dockerfile")
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_code_path() -> String {
    "definitions.py".into()
}

fn default_node_selector_key() -> String {
    "kubernetes.io/hostname".into()
}

fn default_registry_configmap() -> String {
    "dagster-user-deployments-values-yaml".into()
}

fn default_workspace_configmap() -> String {
    "dagster-workspace-yaml".into()
}

fn default_lock_configmap() -> String {
    "dagster-uc-semaphore".into()
}

fn default_grpc_port() -> u16 {
    3030
}

fn default_scheduler_reload_selectors() -> Vec<String> {
    vec![
        "component=dagster-webserver".into(),
        "component=dagster-daemon".into(),
    ]
}

fn default_ownership_selectors() -> Vec<String> {
    vec![
        "app.kubernetes.io/name=dagster-user-deployments".into(),
        "app=dagster-user-deployments".into(),
        "dagster/code-location".into(),
    ]
}

fn default_lock_retry_secs() -> u64 {
    10
}

fn default_pod_poll_secs() -> u64 {
    2
}

fn default_log_timeout_secs() -> u64 {
    60
}

/// Kubernetes quantity: a decimal number with an optional suffix
/// (`250m`, `1.5`, `2Gi`, `1e3`).
fn is_quantity(value: &str) -> bool {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let split = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(split);
    let number_ok = !number.is_empty()
        && number != "."
        && number.chars().filter(|&c| c == '.').count() <= 1;
    let suffix_ok = match suffix.strip_prefix(['e', 'E']) {
        Some(exponent) if !exponent.is_empty() => exponent.chars().all(|c| c.is_ascii_digit()),
        _ => suffix.chars().all(|c| c.is_ascii_alphabetic()),
    };
    number_ok && suffix_ok
}

impl UserCodeConfig {
    /// Template configuration for `environment`, used by `init-config`.
    #[must_use]
    pub fn template(environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            namespace: "dagster".into(),
            kubernetes_context: None,
            container_registry: String::new(),
            image_prefix: None,
            dockerfile: default_dockerfile(),
            repository_root: default_root(),
            code_path: default_code_path(),
            scheduler_version: String::new(),
            node: String::new(),
            node_selector_key: default_node_selector_key(),
            requests: BTreeMap::from([
                ("cpu".to_string(), "1".to_string()),
                ("memory".to_string(), "1Gi".to_string()),
            ]),
            limits: BTreeMap::from([
                ("cpu".to_string(), "2".to_string()),
                ("memory".to_string(), "2Gi".to_string()),
            ]),
            env: Vec::new(),
            cicd: false,
            use_az_login: false,
            gui_url: None,
            registry_configmap: default_registry_configmap(),
            workspace_configmap: default_workspace_configmap(),
            lock_configmap: default_lock_configmap(),
            grpc_port: default_grpc_port(),
            scheduler_reload_selectors: default_scheduler_reload_selectors(),
            ownership_selectors: default_ownership_selectors(),
            lock_retry_secs: default_lock_retry_secs(),
            lock_max_attempts: None,
            pod_poll_secs: default_pod_poll_secs(),
            log_timeout_secs: default_log_timeout_secs(),
            logging: LoggingConfig::default(),
        }
    }

    /// Parse the configuration of `environment` from YAML content.
    ///
    /// `origin` names the source in error messages.
    pub fn parse_yaml(content: &str, environment: &str, origin: &str) -> Result<Self> {
        let mut file: BTreeMap<String, Self> =
            serde_yaml::from_str(content).map_err(ConfigError::Parse)?;
        let config = file
            .remove(environment)
            .ok_or_else(|| ConfigError::UnknownEnvironment {
                environment: environment.to_string(),
                path: origin.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the configuration of `environment` from a file.
    pub fn load<P: AsRef<Path>>(path: P, environment: &str) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_yaml(&content, environment, &path.display().to_string())
    }

    /// Render as a config file holding only this environment.
    pub fn to_file_yaml(&self) -> Result<String> {
        let file = BTreeMap::from([(self.environment.clone(), self)]);
        Ok(serde_yaml::to_string(&file)?)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("environment", &self.environment),
            ("namespace", &self.namespace),
            ("container_registry", &self.container_registry),
            ("scheduler_version", &self.scheduler_version),
            ("code_path", &self.code_path),
            ("registry_configmap", &self.registry_configmap),
            ("workspace_configmap", &self.workspace_configmap),
            ("lock_configmap", &self.lock_configmap),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField { field }.into());
            }
        }

        if ImageTag::parse(format!("{}-0", self.scheduler_version)).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "scheduler_version",
                reason: "must only contain letters, digits, '_', '.' and '-'".into(),
            }
            .into());
        }

        if self.grpc_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "grpc_port",
                reason: "must be greater than 0".into(),
            }
            .into());
        }

        let durations = [
            ("lock_retry_secs", self.lock_retry_secs),
            ("pod_poll_secs", self.pod_poll_secs),
            ("log_timeout_secs", self.log_timeout_secs),
        ];
        for (field, secs) in durations {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than 0".into(),
                }
                .into());
            }
        }

        if self.lock_max_attempts == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "lock_max_attempts",
                reason: "must be greater than 0 when set".into(),
            }
            .into());
        }

        for (field, values) in [("requests", &self.requests), ("limits", &self.limits)] {
            if let Some((resource, quantity)) = values.iter().find(|(_, q)| !is_quantity(q)) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("'{quantity}' is not a valid quantity for {resource}"),
                }
                .into());
            }
        }

        for var in &self.env {
            if var.name.trim().is_empty() {
                return Err(ConfigError::MissingField { field: "env.name" }.into());
            }
            if let EnvSource::SecretRef(secret) = &var.source {
                if secret.name.is_empty() || secret.key.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "env",
                        reason: format!("secretRef of {} needs a name and a key", var.name),
                    }
                    .into());
                }
            }
        }

        if self
            .scheduler_reload_selectors
            .iter()
            .chain(&self.ownership_selectors)
            .any(|s| s.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                field: "selectors",
                reason: "label selectors must not be empty".into(),
            }
            .into());
        }

        if let Some(url) = &self.gui_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    field: "gui_url",
                    reason: "must be an http(s) URL".into(),
                }
                .into());
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn pipeline_mode(&self) -> PipelineMode {
        if self.cicd {
            PipelineMode::Automated
        } else {
            PipelineMode::Interactive
        }
    }

    /// Settings handed to every deployment operation.
    #[must_use]
    pub fn deployment_settings(&self) -> DeploymentSettings {
        DeploymentSettings {
            environment: self.environment.clone(),
            documents: DocumentNames {
                registry: self.registry_configmap.clone(),
                registry_key: self.environment.clone(),
                lock: self.lock_configmap.clone(),
                workspace: self.workspace_configmap.clone(),
                workspace_key: WORKSPACE_KEY.to_string(),
            },
            image: ImageSettings {
                registry: self.container_registry.clone(),
                prefix: self.image_prefix.clone(),
                dockerfile: self.dockerfile.clone(),
                source_root: self.repository_root.clone(),
                version: self.scheduler_version.clone(),
                use_az_login: self.use_az_login,
            },
            workload: WorkloadSettings {
                grpc_port: self.grpc_port,
                code_path: self.code_path.clone(),
                node_selector_key: self.node_selector_key.clone(),
            },
            resources: ResourceRequirements {
                requests: self.requests.clone(),
                limits: self.limits.clone(),
            },
            env: self.env.clone(),
            node: self.node.clone(),
            scheduler_reload_selectors: self.scheduler_reload_selectors.clone(),
            ownership_selectors: self.ownership_selectors.clone(),
            mode: self.pipeline_mode(),
            lock_retry: RetryPolicy {
                interval: Duration::from_secs(self.lock_retry_secs),
                max_attempts: self.lock_max_attempts,
            },
            watch: WatchSettings {
                poll_interval: Duration::from_secs(self.pod_poll_secs),
                log_timeout: Duration::from_secs(self.log_timeout_secs),
                ..WatchSettings::default()
            },
            gui_url: self.gui_url.clone(),
        }
    }
}
