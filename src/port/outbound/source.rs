//! Source control port.

use async_trait::async_trait;

use crate::error::Result;

/// Supplies the branch a default deployment name is derived from.
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn current_branch(&self) -> Result<String>;
}
