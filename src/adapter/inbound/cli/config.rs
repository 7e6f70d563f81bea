//! Handler for `show-config`.

use serde_json::json;

use super::output::Output;
use crate::error::Result;
use crate::infrastructure::config::settings::UserCodeConfig;

fn quantities(values: &std::collections::BTreeMap<String, String>) -> String {
    if values.is_empty() {
        return "(none)".to_string();
    }
    values
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Execute `show-config`.
pub fn execute_show(out: Output, config: &UserCodeConfig) -> Result<()> {
    if out.is_json() {
        out.report(json!({
            "command": "show-config",
            "config": config,
        }));
        return Ok(());
    }

    out.section("Effective Configuration");
    out.field("Environment", out.highlight(&config.environment));
    out.field("Pipeline", if config.cicd { "cicd" } else { "interactive" });

    out.section("Cluster");
    out.field(
        "Context",
        config.kubernetes_context.as_deref().unwrap_or("(current)"),
    );
    out.field("Namespace", &config.namespace);
    out.field("Node", if config.node.is_empty() { "(any)" } else { config.node.as_str() });

    out.section("Images");
    out.field("Registry", &config.container_registry);
    out.field("Prefix", config.image_prefix.as_deref().unwrap_or("(none)"));
    out.field("Dockerfile", config.dockerfile.display());
    out.field("Context", config.repository_root.display());
    out.field("Version", &config.scheduler_version);
    out.field("Azure login", if config.use_az_login { "yes" } else { "no" });

    out.section("Workloads");
    out.field("Code path", &config.code_path);
    out.field("gRPC port", config.grpc_port);
    out.field("Requests", quantities(&config.requests));
    out.field("Limits", quantities(&config.limits));
    if !config.env.is_empty() {
        let names: Vec<&str> = config.env.iter().map(|var| var.name.as_str()).collect();
        out.field("Env", names.join(", "));
    }

    out.section("Documents");
    out.field("Registry", &config.registry_configmap);
    out.field("Workspace", &config.workspace_configmap);
    out.field("Lock", &config.lock_configmap);

    out.section("Runtime");
    out.field("Lock retry", format!("{}s", config.lock_retry_secs));
    out.field(
        "Lock attempts",
        config
            .lock_max_attempts
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
    );
    out.field("Pod poll", format!("{}s", config.pod_poll_secs));
    out.field("Log follow", format!("{}s", config.log_timeout_secs));
    if let Some(url) = &config.gui_url {
        out.field("UI", url);
    }
    Ok(())
}
