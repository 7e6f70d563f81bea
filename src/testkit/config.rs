//! Canonical test settings.
//!
//! Single source of truth for the environment every test deploys into.

use std::time::Duration;

use crate::application::context::{DeploymentSettings, DocumentNames, ImageSettings};
use crate::application::semaphore::RetryPolicy;
use crate::application::watcher::WatchSettings;
use crate::domain::reconcile::PipelineMode;
use crate::domain::record::{EnvVar, ResourceRequirements};
use crate::domain::workload::WorkloadSettings;

pub const REGISTRY_DOCUMENT: &str = "uc-registry";
pub const REGISTRY_KEY: &str = "dev";
pub const LOCK_DOCUMENT: &str = "uc-lock";
pub const WORKSPACE_DOCUMENT: &str = "uc-workspace";
pub const WORKSPACE_KEY: &str = "workspace.yaml";

/// Scheduler pods restarted by a full reload.
pub const SCHEDULER_SELECTORS: [&str; 2] = [
    "component=dagster-webserver",
    "component=dagster-daemon",
];

pub fn documents() -> DocumentNames {
    DocumentNames {
        registry: REGISTRY_DOCUMENT.to_string(),
        registry_key: REGISTRY_KEY.to_string(),
        lock: LOCK_DOCUMENT.to_string(),
        workspace: WORKSPACE_DOCUMENT.to_string(),
        workspace_key: WORKSPACE_KEY.to_string(),
    }
}

/// Lock retry that gives up after a few attempts so a stuck test fails
/// instead of hanging.
pub fn lock_retry() -> RetryPolicy {
    RetryPolicy {
        interval: Duration::from_secs(10),
        max_attempts: Some(5),
    }
}

/// Watch settings with a short log follow.
pub fn watch() -> WatchSettings {
    WatchSettings {
        log_timeout: Duration::from_millis(200),
        ..WatchSettings::default()
    }
}

/// Interactive `dev` environment settings.
pub fn settings() -> DeploymentSettings {
    DeploymentSettings {
        environment: "dev".to_string(),
        documents: documents(),
        image: ImageSettings {
            registry: "registry.example.com".to_string(),
            prefix: Some("dagster".to_string()),
            dockerfile: "Dockerfile".into(),
            source_root: ".".into(),
            version: "1.9.3".to_string(),
            use_az_login: false,
        },
        workload: WorkloadSettings::default(),
        resources: ResourceRequirements {
            requests: [("cpu".to_string(), "250m".to_string())].into(),
            limits: [("memory".to_string(), "1Gi".to_string())].into(),
        },
        env: vec![
            EnvVar::value("DAGSTER_ENV", "dev"),
            EnvVar::secret("DB_PASSWORD", "db-credentials", "password"),
        ],
        node: "userpool".to_string(),
        scheduler_reload_selectors: SCHEDULER_SELECTORS.iter().map(|s| s.to_string()).collect(),
        ownership_selectors: vec![
            "app.kubernetes.io/name=dagster-user-deployments".to_string(),
            "app=dagster-user-deployments".to_string(),
            "dagster/code-location".to_string(),
        ],
        mode: PipelineMode::Interactive,
        lock_retry: lock_retry(),
        watch: watch(),
        gui_url: Some("https://dagster.example.com/".to_string()),
    }
}
