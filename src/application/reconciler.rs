//! Reconciler: drives the registry and the cluster to a requested state.
//!
//! Classification is delegated to [`DeploymentState::classify`]; this module
//! gathers the observed facts and executes the resulting plan. Callers must
//! hold the deployment semaphore.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::application::context::{Context, DeploymentSettings};
use crate::application::registry::RegistryStore;
use crate::domain::id::DeploymentName;
use crate::domain::reconcile::{CleanupScope, DeploymentState, PipelineMode, ReconcilePlan, ReloadScope};
use crate::domain::record::DeploymentRecord;
use crate::domain::registry::RegistryDocument;
use crate::domain::workload::{selector_for, Manifest};
use crate::domain::workspace::WorkspaceDocument;
use crate::error::Result;
use crate::port::{ClusterGateway, Precondition, ResourceKind};

/// Kinds deleted for each cleanup scope, in deletion order.
#[must_use]
pub fn cleanup_kinds(scope: CleanupScope) -> &'static [ResourceKind] {
    match scope {
        CleanupScope::Pod => &[ResourceKind::Pod],
        CleanupScope::Workload => &[ResourceKind::Deployment, ResourceKind::Pod],
        CleanupScope::All => &[
            ResourceKind::Deployment,
            ResourceKind::Service,
            ResourceKind::Pod,
        ],
    }
}

pub struct Reconciler {
    cluster: Arc<dyn ClusterGateway>,
    registry: RegistryStore,
    settings: Arc<DeploymentSettings>,
}

impl Reconciler {
    pub fn new(ctx: &Context) -> Self {
        let documents = &ctx.settings.documents;
        Self {
            cluster: Arc::clone(&ctx.cluster),
            registry: RegistryStore::new(
                Arc::clone(&ctx.cluster),
                documents.registry.clone(),
                documents.registry_key.clone(),
            ),
            settings: Arc::clone(&ctx.settings),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    /// Whether any pod carries the deployment's selection label.
    pub async fn pod_exists(&self, name: &DeploymentName) -> Result<bool> {
        let pods = self.cluster.list(ResourceKind::Pod, &selector_for(name)).await?;
        Ok(!pods.is_empty())
    }

    /// Observe the registry and live pods and choose a plan.
    pub async fn plan(
        &self,
        name: &DeploymentName,
        force: bool,
        mode: PipelineMode,
    ) -> Result<ReconcilePlan> {
        let record_exists = self.registry.check_exists(name).await?;
        // Pods are only relevant once a record exists.
        let pod_exists = record_exists && self.pod_exists(name).await?;
        let state = DeploymentState::classify(record_exists, pod_exists, force, mode);
        info!(
            deployment = %name,
            record_exists,
            pod_exists,
            force,
            ?mode,
            state = %state,
            "Classified deployment"
        );
        Ok(state.plan())
    }

    /// Plan and execute the reconciliation of `record`.
    pub async fn reconcile(
        &self,
        record: DeploymentRecord,
        force: bool,
        mode: PipelineMode,
    ) -> Result<ReconcilePlan> {
        let plan = self.plan(&record.name, force, mode).await?;
        self.execute(&plan, record).await?;
        Ok(plan)
    }

    /// Apply a plan: swap the registry record, clean up, reload.
    pub async fn execute(&self, plan: &ReconcilePlan, record: DeploymentRecord) -> Result<()> {
        let name = record.name.clone();
        if plan.replace_record {
            self.registry.remove(&name).await?;
        }
        self.registry.add(record).await?;
        self.cleanup(&name, plan.cleanup).await?;
        self.reload(plan.reload).await?;
        info!(
            deployment = %name,
            state = %plan.state,
            full_reload = plan.is_full_reload(),
            "Reconciliation applied"
        );
        Ok(())
    }

    /// Delete the deployment's objects covered by `scope`. Returns how many
    /// objects were deleted.
    pub async fn cleanup(&self, name: &DeploymentName, scope: CleanupScope) -> Result<usize> {
        let selector = selector_for(name);
        let mut deleted = 0;
        for &kind in cleanup_kinds(scope) {
            let count = self.cluster.delete_matching(kind, &selector).await?;
            debug!(deployment = %name, kind = %kind, count, "Deleted objects");
            deleted += count;
        }
        info!(deployment = %name, ?scope, deleted, "Cleaned up deployment objects");
        Ok(deleted)
    }

    /// Bring the cluster in line with the registry.
    ///
    /// Every registered deployment gets its manifests applied. A full reload
    /// additionally republishes the workspace document and signals the
    /// scheduling service.
    pub async fn reload(&self, scope: ReloadScope) -> Result<()> {
        let registry = self.registry.snapshot().await?;
        for record in registry.iter() {
            for manifest in Manifest::for_record(record, &self.settings.workload) {
                self.cluster.apply(&manifest).await?;
            }
        }
        debug!(deployments = registry.len(), "Applied deployment manifests");

        if scope == ReloadScope::Full {
            self.publish_workspace(&registry).await?;
            self.signal_scheduler().await?;
        }
        info!(?scope, deployments = registry.len(), "Reload complete");
        Ok(())
    }

    /// Write the workspace-locations document rendered from `registry`.
    pub async fn publish_workspace(&self, registry: &RegistryDocument) -> Result<()> {
        let documents = &self.settings.documents;
        let body = WorkspaceDocument::from_registry(registry, self.settings.workload.grpc_port)
            .to_yaml()?;
        let data = BTreeMap::from([(documents.workspace_key.clone(), body)]);
        self.cluster
            .write_document(&documents.workspace, data, Precondition::Any)
            .await?;
        info!(
            workspace = %documents.workspace,
            locations = registry.len(),
            "Published workspace locations"
        );
        Ok(())
    }

    /// Restart the scheduling service's pods so they reload the workspace.
    /// Returns how many pods were deleted.
    pub async fn signal_scheduler(&self) -> Result<usize> {
        let mut restarted = 0;
        for selector in &self.settings.scheduler_reload_selectors {
            restarted += self.cluster.delete_matching(ResourceKind::Pod, selector).await?;
        }
        info!(restarted, "Signalled scheduling service to reload");
        Ok(restarted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_scopes_widen() {
        assert_eq!(cleanup_kinds(CleanupScope::Pod), &[ResourceKind::Pod]);
        assert!(cleanup_kinds(CleanupScope::Workload).contains(&ResourceKind::Deployment));
        assert!(!cleanup_kinds(CleanupScope::Workload).contains(&ResourceKind::Service));
        assert!(cleanup_kinds(CleanupScope::All).contains(&ResourceKind::Service));
    }

    #[test]
    fn pods_are_deleted_last() {
        for scope in [CleanupScope::Pod, CleanupScope::Workload, CleanupScope::All] {
            assert_eq!(cleanup_kinds(scope).last(), Some(&ResourceKind::Pod));
        }
    }
}
