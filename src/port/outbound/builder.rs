//! Image builder port.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::id::ImageTag;
use crate::error::Result;

/// Everything needed to build and push one user-code image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Build context root.
    pub source_root: PathBuf,
    /// Dockerfile path, relative to the working directory.
    pub dockerfile: PathBuf,
    /// Registry host the image is pushed to.
    pub registry: String,
    /// Repository path inside the registry.
    pub image_name: String,
    pub tag: ImageTag,
    /// Run the build tool through `sudo`.
    pub use_sudo: bool,
    /// Authenticate with `az acr login` instead of existing credentials.
    pub use_az_login: bool,
}

impl BuildRequest {
    /// Fully qualified image reference.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}/{}:{}", self.registry, self.image_name, self.tag)
    }
}

/// Builds and pushes container images.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Name of the underlying build tool, for error messages.
    fn tool(&self) -> &str;

    /// Whether the build tool can be invoked on this machine.
    async fn is_available(&self) -> bool;

    /// Build the image and push it to the registry.
    async fn build_and_push(&self, request: &BuildRequest) -> Result<()>;
}
