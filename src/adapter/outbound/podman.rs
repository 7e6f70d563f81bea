//! Podman image builder.
//!
//! Shells out to `podman build` and `podman push`, optionally through `sudo`.
//! With Azure login enabled the registry credentials come from
//! `az acr login --expose-token` piped into `podman login`.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{BuildError, Result};
use crate::port::{BuildRequest, ImageBuilder};

const TOOL: &str = "podman";

/// Username `az acr login --expose-token` credentials are used with.
const ACR_TOKEN_USER: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Default)]
pub struct PodmanBuilder;

impl PodmanBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn command(use_sudo: bool, args: &[&str]) -> Command {
        let mut command = if use_sudo {
            let mut c = Command::new("sudo");
            c.arg(TOOL);
            c
        } else {
            Command::new(TOOL)
        };
        command.args(args);
        command
    }

    async fn run(mut command: Command, shown: String, stdin: Option<&str>) -> Result<String> {
        debug!(command = %shown, "Running");
        command
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command.spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(BuildError::CommandFailed {
                command: shown,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn az_login(&self, request: &BuildRequest) -> Result<()> {
        let registry_name = request
            .registry
            .split('.')
            .next()
            .unwrap_or(&request.registry);
        let mut az = Command::new("az");
        az.args([
            "acr",
            "login",
            "--name",
            registry_name,
            "--expose-token",
            "--output",
            "tsv",
            "--query",
            "accessToken",
        ]);
        let token = Self::run(az, format!("az acr login --name {registry_name}"), None).await?;

        let login = Self::command(
            request.use_sudo,
            &[
                "login",
                &request.registry,
                "--username",
                ACR_TOKEN_USER,
                "--password-stdin",
            ],
        );
        Self::run(login, format!("{TOOL} login {}", request.registry), Some(&token)).await?;
        info!(registry = %request.registry, "Logged in to registry");
        Ok(())
    }
}

#[async_trait]
impl ImageBuilder for PodmanBuilder {
    fn tool(&self) -> &str {
        TOOL
    }

    async fn is_available(&self) -> bool {
        Command::new(TOOL)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|status| status.success())
    }

    async fn build_and_push(&self, request: &BuildRequest) -> Result<()> {
        if request.use_az_login {
            self.az_login(request).await?;
        }

        let reference = request.reference();
        let dockerfile = request.dockerfile.to_string_lossy();
        let context = request.source_root.to_string_lossy();

        info!(image = %reference, "Building image");
        let build = Self::command(
            request.use_sudo,
            &["build", "-f", &dockerfile, "-t", &reference, &context],
        );
        Self::run(build, format!("{TOOL} build -t {reference}"), None).await?;

        info!(image = %reference, "Pushing image");
        let push = Self::command(request.use_sudo, &["push", &reference]);
        Self::run(push, format!("{TOOL} push {reference}"), None).await?;
        Ok(())
    }
}
