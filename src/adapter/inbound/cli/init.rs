//! Interactive `init-config` wizard.
//!
//! Asks for the settings of one environment and writes them as a config
//! file keyed by that environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use dialoguer::{theme::ColorfulTheme, Confirm, Input};

use super::output::Output;
use crate::error::{ConfigError, Result};
use crate::infrastructure::config::settings::UserCodeConfig;

/// Parse a JSON object of resource quantities, e.g. `{"cpu": "1"}`.
fn parse_quantities(field: &'static str, raw: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(raw).map_err(|e| {
        ConfigError::InvalidValue {
            field,
            reason: e.to_string(),
        }
        .into()
    })
}

fn optional(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Validate `config` and write it to `path`.
pub fn write_config(path: &Path, config: &UserCodeConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(ConfigError::InvalidValue {
            field: "file",
            reason: format!("{} already exists (use --force to overwrite)", path.display()),
        }
        .into());
    }
    config.validate()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, config.to_file_yaml()?)?;
    Ok(())
}

/// Run the interactive wizard.
pub fn execute(out: Output, path: &Path, force: bool, environment: &str) -> Result<()> {
    if out.is_json() {
        return Err(ConfigError::InvalidValue {
            field: "json",
            reason: "`init-config` is interactive and cannot run in JSON mode".to_string(),
        }
        .into());
    }
    if path.exists() && !force {
        return Err(ConfigError::InvalidValue {
            field: "file",
            reason: format!("{} already exists (use --force to overwrite)", path.display()),
        }
        .into());
    }

    let theme = ColorfulTheme::default();
    let template = UserCodeConfig::template(environment);

    out.section("Environment");
    let environment: String = Input::with_theme(&theme)
        .with_prompt("Environment")
        .default(template.environment.clone())
        .interact_text()?;
    let kubernetes_context: String = Input::with_theme(&theme)
        .with_prompt("Kubernetes context (empty for the current context)")
        .allow_empty(true)
        .interact_text()?;
    let namespace: String = Input::with_theme(&theme)
        .with_prompt("Namespace")
        .default(template.namespace.clone())
        .interact_text()?;
    let node: String = Input::with_theme(&theme)
        .with_prompt("Node to run user code on (empty for any)")
        .allow_empty(true)
        .interact_text()?;

    out.section("Images");
    let container_registry: String = Input::with_theme(&theme)
        .with_prompt("Container registry")
        .interact_text()?;
    let image_prefix: String = Input::with_theme(&theme)
        .with_prompt("Image prefix")
        .allow_empty(true)
        .interact_text()?;
    let dockerfile: String = Input::with_theme(&theme)
        .with_prompt("Dockerfile")
        .default(template.dockerfile.display().to_string())
        .interact_text()?;
    let repository_root: String = Input::with_theme(&theme)
        .with_prompt("Repository root (build context)")
        .default(template.repository_root.display().to_string())
        .interact_text()?;
    let code_path: String = Input::with_theme(&theme)
        .with_prompt("Path of the definitions file inside the image")
        .default(template.code_path.clone())
        .interact_text()?;
    let scheduler_version: String = Input::with_theme(&theme)
        .with_prompt("Dagster version")
        .interact_text()?;
    let use_az_login = Confirm::with_theme(&theme)
        .with_prompt("Log in to the registry with `az acr login`?")
        .default(false)
        .interact()?;

    out.section("Resources");
    let requests: String = Input::with_theme(&theme)
        .with_prompt("Requests (JSON)")
        .default(serde_json::to_string(&template.requests)?)
        .interact_text()?;
    let limits: String = Input::with_theme(&theme)
        .with_prompt("Limits (JSON)")
        .default(serde_json::to_string(&template.limits)?)
        .interact_text()?;

    out.section("Platform");
    let cicd = Confirm::with_theme(&theme)
        .with_prompt("Is this configuration used in CI/CD?")
        .default(false)
        .interact()?;
    let gui_url: String = Input::with_theme(&theme)
        .with_prompt("Dagster UI URL (optional)")
        .allow_empty(true)
        .interact_text()?;
    let registry_configmap: String = Input::with_theme(&theme)
        .with_prompt("Name of the user-code deployments config map")
        .default(template.registry_configmap.clone())
        .interact_text()?;
    let workspace_configmap: String = Input::with_theme(&theme)
        .with_prompt("Name of the workspace config map")
        .default(template.workspace_configmap.clone())
        .interact_text()?;

    let config = UserCodeConfig {
        environment,
        namespace,
        kubernetes_context: optional(kubernetes_context),
        container_registry,
        image_prefix: optional(image_prefix),
        dockerfile: dockerfile.into(),
        repository_root: repository_root.into(),
        code_path,
        scheduler_version,
        node,
        requests: parse_quantities("requests", &requests)?,
        limits: parse_quantities("limits", &limits)?,
        cicd,
        use_az_login,
        gui_url: optional(gui_url),
        registry_configmap,
        workspace_configmap,
        ..template
    };

    let progress = out.progress("Writing configuration...");
    if let Err(e) = write_config(path, &config, force) {
        progress.fail("Configuration not written");
        return Err(e);
    }
    progress.finish(&format!(
        "Template configuration file generated as '{}'.",
        path.display()
    ));

    let flags = format!("-c {} -e {}", path.display(), config.environment);
    out.section("Next Steps");
    out.field("Review", out.highlight(format!("uc-deploy {flags} show-config")));
    out.field("Deploy", out.highlight(format!("uc-deploy {flags} deployment deploy")));
    Ok(())
}
