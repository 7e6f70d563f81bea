//! Branch lookup for default deployment names.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::port::SourceControl;

/// Variable CI/CD pipelines expose the branch in.
pub const BRANCH_ENV: &str = "BRANCH_NAME";

/// Reads the checked-out branch with `git`. In pipeline mode the
/// [`BRANCH_ENV`] variable wins, since pipelines usually check out a
/// detached head.
#[derive(Debug, Clone)]
pub struct GitSource {
    pipeline: bool,
}

impl GitSource {
    #[must_use]
    pub fn new(pipeline: bool) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl SourceControl for GitSource {
    async fn current_branch(&self) -> Result<String> {
        if self.pipeline {
            if let Some(branch) = std::env::var(BRANCH_ENV).ok().filter(|b| !b.is_empty()) {
                debug!(branch = %branch, "Using branch from environment");
                return Ok(branch);
            }
        }

        let output = Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::SourceControl(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(branch = %branch, "Using checked-out branch");
        Ok(branch)
    }
}
