//! Composition root: wires concrete adapters into an operation [`Context`].

use std::sync::Arc;

use tracing::debug;

use crate::adapter::outbound::{GitSource, KubeGateway, PodmanBuilder, TokioSleeper};
use crate::application::context::Context;
use crate::error::Result;
use crate::infrastructure::config::settings::UserCodeConfig;

/// Connect to the environment's cluster and build the operation context.
pub async fn build_context(config: &UserCodeConfig) -> Result<Context> {
    debug!(
        environment = %config.environment,
        context = config.kubernetes_context.as_deref().unwrap_or("<current>"),
        namespace = %config.namespace,
        "Connecting to cluster"
    );
    let cluster =
        KubeGateway::connect(config.kubernetes_context.as_deref(), &config.namespace).await?;

    Ok(Context::new(
        Arc::new(cluster),
        Arc::new(PodmanBuilder::new()),
        Arc::new(GitSource::new(config.cicd)),
        Arc::new(TokioSleeper),
        config.deployment_settings(),
    ))
}
