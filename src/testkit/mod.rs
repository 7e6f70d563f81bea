//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`cluster`] - [`InMemoryCluster`](cluster::InMemoryCluster), a
//!   versioned in-memory cluster gateway with an event log.
//! - [`doubles`] - `ScriptedBuilder`, `FixedSource`, `RecordingSleeper`.
//! - [`config`] - Canonical test settings.
//! - [`domain`] - Builders for names, tags, records and registries.

pub mod cluster;
pub mod config;
pub mod domain;
pub mod doubles;

use std::sync::Arc;

use crate::application::context::{Context, DeploymentSettings};
use crate::application::deployment::DeploymentService;
use cluster::InMemoryCluster;
use doubles::{FixedSource, RecordingSleeper, ScriptedBuilder};

/// Branch reported by the default source double.
pub const BRANCH: &str = "feature/X";

/// A context wired to in-memory adapters, with handles to inspect them.
pub struct TestEnv {
    pub cluster: Arc<InMemoryCluster>,
    pub builder: Arc<ScriptedBuilder>,
    pub sleeper: Arc<RecordingSleeper>,
    pub ctx: Context,
}

impl TestEnv {
    /// Canonical settings over an empty cluster.
    pub fn new() -> Self {
        Self::with(InMemoryCluster::new(), ScriptedBuilder::new(), config::settings())
    }

    pub fn with(
        cluster: InMemoryCluster,
        builder: ScriptedBuilder,
        settings: DeploymentSettings,
    ) -> Self {
        Self::with_sleeper(cluster, builder, settings, RecordingSleeper::new())
    }

    pub fn with_sleeper(
        cluster: InMemoryCluster,
        builder: ScriptedBuilder,
        settings: DeploymentSettings,
        sleeper: RecordingSleeper,
    ) -> Self {
        Self::assemble(cluster, builder, settings, sleeper, BRANCH)
    }

    /// Canonical settings with source control reporting `branch`.
    pub fn on_branch(branch: &str) -> Self {
        Self::assemble(
            InMemoryCluster::new(),
            ScriptedBuilder::new(),
            config::settings(),
            RecordingSleeper::new(),
            branch,
        )
    }

    fn assemble(
        cluster: InMemoryCluster,
        builder: ScriptedBuilder,
        settings: DeploymentSettings,
        sleeper: RecordingSleeper,
        branch: &str,
    ) -> Self {
        let cluster = Arc::new(cluster);
        let builder = Arc::new(builder);
        let sleeper = Arc::new(sleeper);
        let ctx = Context::new(
            cluster.clone(),
            builder.clone(),
            Arc::new(FixedSource::new(branch)),
            sleeper.clone(),
            settings,
        );
        Self {
            cluster,
            builder,
            sleeper,
            ctx,
        }
    }

    pub fn service(&self) -> DeploymentService {
        DeploymentService::new(&self.ctx)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
