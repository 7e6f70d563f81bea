//! Deployment service: the operator-facing entry points.
//!
//! Every operation that mutates the registry runs inside [`DeploymentService::locked`],
//! which acquires the deployment semaphore and releases it on every exit path.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::application::context::Context;
use crate::application::reconciler::{cleanup_kinds, Reconciler};
use crate::application::semaphore::DistributedSemaphore;
use crate::application::watcher::{LogOutcome, Observation, StatusWatcher};
use crate::domain::id::{DeploymentName, ImageTag};
use crate::domain::reconcile::{CleanupScope, DeploymentState, ReconcilePlan, ReloadScope};
use crate::domain::workload::{image_tag, tag_matches_version};
use crate::domain::record::DeploymentRecord;
use crate::error::{BuildError, Error, Result};
use crate::port::{BuildRequest, ResourceKind};

/// Options of a deploy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployRequest {
    /// Explicit deployment name; defaults to the current branch.
    pub name: Option<String>,
    /// Appended to the resolved name.
    pub suffix: Option<String>,
    /// Force a full cycle even when a pod is running.
    pub force: bool,
    /// Reuse an image already pushed under the generated tag.
    pub skip_build: bool,
    /// Clear a stuck deployment lock before claiming it.
    pub reset_lock: bool,
    pub use_sudo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub name: DeploymentName,
    pub tag: ImageTag,
    pub plan: ReconcilePlan,
    /// Link to the deployment in the scheduler UI, when configured.
    pub assets_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteAllOutcome {
    pub records_removed: usize,
    pub resources_removed: usize,
}

/// Result of `deployment check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub name: DeploymentName,
    pub registered: bool,
    pub pods: Vec<String>,
    pub logs: LogOutcome,
}

pub struct DeploymentService {
    ctx: Context,
    reconciler: Reconciler,
    semaphore: DistributedSemaphore,
    watcher: StatusWatcher,
}

impl DeploymentService {
    pub fn new(ctx: &Context) -> Self {
        Self {
            ctx: ctx.clone(),
            reconciler: Reconciler::new(ctx),
            semaphore: DistributedSemaphore::new(
                ctx.cluster.clone(),
                ctx.settings.documents.lock.clone(),
            ),
            watcher: StatusWatcher::new(
                ctx.cluster.clone(),
                ctx.sleeper.clone(),
                ctx.settings.watch,
            ),
        }
    }

    /// Create the registry document if it does not exist yet.
    pub async fn ensure_registry(&self) -> Result<bool> {
        self.reconciler.registry().ensure_exists().await
    }

    /// Check that the scheduler pods run the configured scheduler version,
    /// before anything is built or mutated.
    ///
    /// A pod passes when any of its tagged images matches. Pods with only
    /// untagged images are skipped. Returns the number of pods verified.
    pub async fn verify_scheduler_version(&self) -> Result<usize> {
        let version = &self.ctx.settings.image.version;
        let mut verified = 0usize;
        for selector in &self.ctx.settings.scheduler_reload_selectors {
            for pod in self.ctx.cluster.list(ResourceKind::Pod, selector).await? {
                let tags: Vec<&str> = pod.images.iter().filter_map(|i| image_tag(i)).collect();
                let Some(running) = tags.first() else {
                    debug!(pod = %pod.name, "No tagged scheduler image to verify");
                    continue;
                };
                if !tags.iter().any(|tag| tag_matches_version(tag, version)) {
                    return Err(Error::VersionMismatch {
                        configured: version.clone(),
                        running: (*running).to_string(),
                        pod: pod.name,
                    });
                }
                verified += 1;
            }
        }
        if verified == 0 {
            warn!(version = %version, "No scheduler pods found; scheduler version not verified");
        } else {
            debug!(version = %version, pods = verified, "Scheduler version verified");
        }
        Ok(verified)
    }

    /// Resolve the deployment name. An explicit name is used as given;
    /// otherwise the current branch, optionally suffixed.
    pub async fn resolve_name(
        &self,
        explicit: Option<&str>,
        suffix: Option<&str>,
    ) -> Result<DeploymentName> {
        if let Some(name) = explicit.filter(|n| !n.is_empty()) {
            return Ok(DeploymentName::normalize(name)?);
        }
        let branch = self.ctx.source.current_branch().await?;
        let base = DeploymentName::normalize(&branch)?;
        match suffix.filter(|s| !s.is_empty()) {
            Some(suffix) => Ok(base.with_suffix(suffix)?),
            None => Ok(base),
        }
    }

    /// Build, register and roll out the current code.
    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeployOutcome> {
        if !request.skip_build && !self.ctx.builder.is_available().await {
            return Err(BuildError::ToolUnavailable {
                tool: self.ctx.builder.tool().to_string(),
            }
            .into());
        }

        let settings = &self.ctx.settings;
        let name = self
            .resolve_name(request.name.as_deref(), request.suffix.as_deref())
            .await?;
        let tag = ImageTag::generate(&settings.image.version, Utc::now())?;
        info!(deployment = %name, tag = %tag, environment = %settings.environment, "Deploying");

        let plan = self
            .locked(request.reset_lock, async {
                let registry = self.reconciler.registry().snapshot().await?;
                self.reconciler.publish_workspace(&registry).await?;

                if request.skip_build {
                    info!(deployment = %name, "Skipping image build");
                } else {
                    self.ctx
                        .builder
                        .build_and_push(&self.build_request(&name, &tag, request.use_sudo))
                        .await?;
                }

                let record = settings.record_for(&name, &tag);
                self.reconciler
                    .reconcile(record, request.force, settings.mode)
                    .await
            })
            .await?;

        Ok(DeployOutcome {
            assets_url: settings.assets_url(&name),
            name,
            tag,
            plan,
        })
    }

    /// Register an absent deployment from an already pushed image.
    pub async fn revive(&self, name: &str, tag: &str) -> Result<ReconcilePlan> {
        let name = DeploymentName::normalize(name)?;
        let tag = ImageTag::parse(tag)?;

        self.locked(false, async {
            if self.reconciler.registry().check_exists(&name).await? {
                return Err(Error::DeploymentExists {
                    name: name.to_string(),
                });
            }
            let plan = DeploymentState::NotExists.plan();
            let record = self.ctx.settings.record_for(&name, &tag);
            self.reconciler.execute(&plan, record).await?;
            info!(deployment = %name, tag = %tag, "Revived deployment");
            Ok(plan)
        })
        .await
    }

    /// Remove one deployment: its record, all its objects, then a full
    /// reload. Returns whether a record was registered under the name.
    pub async fn delete(&self, name: Option<&str>) -> Result<(DeploymentName, bool)> {
        let name = self.resolve_name(name, None).await?;

        let removed = self
            .locked(false, async {
                let removed = self.reconciler.registry().remove(&name).await?;
                if !removed {
                    warn!(deployment = %name, "Deployment not registered; deleting its objects anyway");
                }
                self.reconciler.cleanup(&name, CleanupScope::All).await?;
                self.reconciler.reload(ReloadScope::Full).await?;
                Ok::<_, Error>(removed)
            })
            .await?;

        info!(deployment = %name, removed, "Deleted deployment");
        Ok((name, removed))
    }

    /// Remove every record and every object carrying an ownership label,
    /// then reload once.
    pub async fn delete_all(&self) -> Result<DeleteAllOutcome> {
        self.locked(false, async {
            let records_removed = self.reconciler.registry().remove_all().await?;
            let resources_removed = self.delete_owned_objects().await?;
            self.reconciler.reload(ReloadScope::Full).await?;
            info!(records_removed, resources_removed, "Deleted all deployments");
            Ok::<_, Error>(DeleteAllOutcome {
                records_removed,
                resources_removed,
            })
        })
        .await
    }

    pub async fn list(&self) -> Result<Vec<DeploymentRecord>> {
        self.reconciler.registry().list().await
    }

    /// Report a deployment's pods and follow their logs for `timeout`.
    /// Unregistered names are checked anyway.
    pub async fn check<F>(&self, name: Option<&str>, timeout: Duration, sink: F) -> Result<CheckReport>
    where
        F: FnMut(&str, &str),
    {
        let name = self.resolve_name(name, None).await?;
        let registered = self.reconciler.registry().check_exists(&name).await?;
        if !registered {
            warn!(
                deployment = %name,
                environment = %self.ctx.settings.environment,
                "Deployment does not seem to exist; proceeding with status check anyway"
            );
        }
        let pods = self.watcher.current_pods(&name).await;
        let logs = self.watcher.tail_logs(&pods, timeout, sink).await;
        Ok(CheckReport {
            name,
            registered,
            pods,
            logs,
        })
    }

    /// Observe a deployment after reconciliation.
    pub async fn watch<F>(&self, name: &DeploymentName, readiness_timeout: Duration, sink: F) -> Observation
    where
        F: FnMut(&str, &str),
    {
        self.watcher.observe(name, readiness_timeout, sink).await
    }

    /// Run `body` while holding the deployment semaphore.
    ///
    /// The semaphore is released whether `body` succeeds or fails. A body
    /// error takes precedence over a release error.
    pub async fn locked<T, Fut>(&self, reset_lock: bool, body: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        self.semaphore
            .acquire_with_retry(
                reset_lock,
                &self.ctx.settings.lock_retry,
                self.ctx.sleeper.as_ref(),
            )
            .await?;

        let result = body.await;
        let released = self.semaphore.release().await;

        match (result, released) {
            (Err(e), Err(release_err)) => {
                error!(error = %release_err, "Failed to release deployment lock");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    fn build_request(&self, name: &DeploymentName, tag: &ImageTag, use_sudo: bool) -> BuildRequest {
        let image = &self.ctx.settings.image;
        BuildRequest {
            source_root: image.source_root.clone(),
            dockerfile: image.dockerfile.clone(),
            registry: image.registry.clone(),
            image_name: image.image_name(name),
            tag: tag.clone(),
            use_sudo,
            use_az_login: image.use_az_login,
        }
    }

    /// Delete objects matching any ownership selector. Objects matched by
    /// several selectors count once. The tool's own config documents are
    /// never deleted.
    async fn delete_owned_objects(&self) -> Result<usize> {
        let documents = &self.ctx.settings.documents;
        let protected = [
            documents.registry.as_str(),
            documents.lock.as_str(),
            documents.workspace.as_str(),
        ];

        let kinds = cleanup_kinds(CleanupScope::All)
            .iter()
            .chain(&[ResourceKind::ConfigMap]);
        let mut removed = 0;
        // Kind by kind, so workloads are gone before their pods.
        for &kind in kinds {
            let mut targets = BTreeSet::new();
            for selector in &self.ctx.settings.ownership_selectors {
                for object in self.ctx.cluster.list(kind, selector).await? {
                    if kind == ResourceKind::ConfigMap && protected.contains(&object.name.as_str()) {
                        continue;
                    }
                    targets.insert(object.name);
                }
            }
            for name in &targets {
                self.ctx.cluster.delete(kind, name).await?;
            }
            removed += targets.len();
        }
        Ok(removed)
    }
}
