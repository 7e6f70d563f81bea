//! In-memory [`ClusterGateway`] for testing.
//!
//! Keeps objects and versioned config documents in a mutex-guarded map and
//! records every mutation as a [`ClusterEvent`]. Document writes honor
//! [`Precondition`]s exactly like the real gateway, so lock and registry
//! races can be reproduced deterministically.
//!
//! With auto-scheduling enabled (the default) applying a Deployment creates
//! a pod `<name>-<n>`, and deleting such a pod while its Deployment still
//! exists schedules a replacement, mimicking a one-replica rollout.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;

use crate::domain::workload::{Manifest, DEPLOYMENT_LABEL};
use crate::error::{ClusterError, Result};
use crate::port::{
    ClusterGateway, ClusterObject, ConfigDocument, LogStream, PodCondition, Precondition,
    ResourceKind,
};

/// A recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    Applied {
        kind: ResourceKind,
        name: String,
        created: bool,
    },
    Deleted {
        kind: ResourceKind,
        name: String,
    },
    DocumentWritten {
        name: String,
    },
}

#[derive(Debug, Clone)]
struct StoredDocument {
    data: BTreeMap<String, String>,
    version: u64,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<(ResourceKind, String), BTreeMap<String, String>>,
    images: BTreeMap<String, String>,
    /// Images of pods not created from an applied Deployment.
    pod_images: BTreeMap<String, String>,
    documents: BTreeMap<String, StoredDocument>,
    next_version: u64,
    pod_counter: u64,
    events: Vec<ClusterEvent>,
    /// Deployments whose pod appears after the given number of pod lists.
    pending: BTreeMap<String, usize>,
    scheduling_delay: usize,
    auto_schedule: bool,
    unready: BTreeSet<String>,
    logs: BTreeMap<String, Vec<String>>,
    failing_logs: BTreeSet<String>,
    /// Deployments whose log streams stay open after their lines, like a
    /// running server's.
    following: BTreeSet<String>,
    forced_conflicts: BTreeSet<String>,
    readiness_waits: Vec<(String, Duration)>,
}

pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                auto_schedule: true,
                ..State::default()
            }),
        }
    }

    /// Never create pods on their own.
    pub fn without_scheduling(self) -> Self {
        self.state.lock().auto_schedule = false;
        self
    }

    /// Make scheduled pods appear only after `lists` pod listings.
    pub fn with_scheduling_delay(self, lists: usize) -> Self {
        self.state.lock().scheduling_delay = lists;
        self
    }

    /// Insert an arbitrary object.
    pub fn add_object(&self, kind: ResourceKind, name: &str, labels: &[(&str, &str)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        self.state.lock().objects.insert((kind, name.to_string()), labels);
    }

    /// Insert a pod belonging to `deployment`.
    pub fn add_pod(&self, deployment: &str) -> String {
        let mut state = self.state.lock();
        state.schedule_now(deployment)
    }

    pub fn set_logs(&self, deployment: &str, lines: &[&str]) {
        self.state.lock().logs.insert(
            deployment.to_string(),
            lines.iter().map(|l| (*l).to_string()).collect(),
        );
    }

    /// Set the container image a pod reports.
    pub fn set_pod_image(&self, pod: &str, image: &str) {
        self.state
            .lock()
            .pod_images
            .insert(pod.to_string(), image.to_string());
    }

    /// Keep the deployment's log streams open after their lines.
    pub fn follow_logs(&self, deployment: &str) {
        self.state.lock().following.insert(deployment.to_string());
    }

    /// Make log streaming fail for the deployment's pods.
    pub fn fail_logs(&self, deployment: &str) {
        self.state.lock().failing_logs.insert(deployment.to_string());
    }

    /// Make readiness waits time out for the deployment's pods.
    pub fn set_unready(&self, deployment: &str) {
        self.state.lock().unready.insert(deployment.to_string());
    }

    /// Fail the next versioned write of `document` with a conflict, as if
    /// someone edited it in between.
    pub fn conflict_next_write(&self, document: &str) {
        self.state.lock().forced_conflicts.insert(document.to_string());
    }

    /// Write a document out of band, bumping its version.
    pub fn put_document(&self, name: &str, data: &[(&str, &str)]) {
        let data = data
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut state = self.state.lock();
        state.store_document(name, data);
    }

    pub fn document(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.state.lock().documents.get(name).map(|d| d.data.clone())
    }

    pub fn events(&self) -> Vec<ClusterEvent> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Number of successful writes to a document.
    pub fn document_writes(&self, name: &str) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, ClusterEvent::DocumentWritten { name: n } if n == name))
            .count()
    }

    /// Deletions of `kind` recorded so far.
    pub fn deletions(&self, kind: ResourceKind) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                ClusterEvent::Deleted { kind: k, name } if *k == kind => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.state
            .lock()
            .objects
            .contains_key(&(kind, name.to_string()))
    }

    /// Names of the objects of `kind`.
    pub fn objects(&self, kind: ResourceKind) -> Vec<String> {
        self.state
            .lock()
            .objects
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Pods currently running for `deployment`.
    pub fn pods(&self, deployment: &str) -> Vec<String> {
        let selector = format!("{DEPLOYMENT_LABEL}={deployment}");
        self.state.lock().matching(ResourceKind::Pod, &selector)
    }

    /// Image of an applied Deployment.
    pub fn image(&self, deployment: &str) -> Option<String> {
        self.state.lock().images.get(deployment).cloned()
    }

    /// `(pod, timeout)` of every readiness wait.
    pub fn readiness_waits(&self) -> Vec<(String, Duration)> {
        self.state.lock().readiness_waits.clone()
    }
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn matching(&self, kind: ResourceKind, selector: &str) -> Vec<String> {
        self.objects
            .iter()
            .filter(|((k, _), labels)| *k == kind && selector_matches(selector, labels))
            .map(|((_, name), _)| name.clone())
            .collect()
    }

    fn schedule(&mut self, deployment: &str) {
        if self.scheduling_delay == 0 {
            self.schedule_now(deployment);
        } else {
            self.pending
                .insert(deployment.to_string(), self.scheduling_delay);
        }
    }

    fn schedule_now(&mut self, deployment: &str) -> String {
        self.pod_counter += 1;
        let name = format!("{deployment}-{}", self.pod_counter);
        let labels = self
            .objects
            .get(&(ResourceKind::Deployment, deployment.to_string()))
            .cloned()
            .unwrap_or_else(|| {
                BTreeMap::from([(DEPLOYMENT_LABEL.to_string(), deployment.to_string())])
            });
        self.objects.insert((ResourceKind::Pod, name.clone()), labels);
        name
    }

    fn tick_pending(&mut self) {
        let mut ready = Vec::new();
        for (deployment, remaining) in &mut self.pending {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                ready.push(deployment.clone());
            }
        }
        for deployment in ready {
            self.pending.remove(&deployment);
            if self
                .objects
                .contains_key(&(ResourceKind::Deployment, deployment.clone()))
            {
                self.schedule_now(&deployment);
            }
        }
    }

    fn store_document(&mut self, name: &str, data: BTreeMap<String, String>) {
        self.next_version += 1;
        let version = self.next_version;
        self.documents
            .insert(name.to_string(), StoredDocument { data, version });
        self.events.push(ClusterEvent::DocumentWritten {
            name: name.to_string(),
        });
    }

    fn images_of(&self, kind: ResourceKind, name: &str) -> Vec<String> {
        let image = match kind {
            ResourceKind::Deployment => self.images.get(name).cloned(),
            ResourceKind::Pod => self.pod_images.get(name).cloned().or_else(|| {
                self.pod_deployment(name)
                    .and_then(|deployment| self.images.get(&deployment).cloned())
            }),
            ResourceKind::Service | ResourceKind::ConfigMap => None,
        };
        image.into_iter().collect()
    }

    fn pod_deployment(&self, pod: &str) -> Option<String> {
        self.objects
            .get(&(ResourceKind::Pod, pod.to_string()))
            .and_then(|labels| labels.get(DEPLOYMENT_LABEL).cloned())
    }
}

/// Match `key=value`, `key==value`, `key!=value` and bare `key` terms,
/// comma-separated.
fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((key, value)) = term.split_once("!=") {
                labels.get(key.trim()).map(String::as_str) != Some(value.trim())
            } else if let Some((key, value)) = term.split_once('=') {
                let value = value.trim_start_matches('=').trim();
                labels.get(key.trim()).map(String::as_str) == Some(value)
            } else {
                labels.contains_key(term)
            }
        })
}

#[async_trait]
impl ClusterGateway for InMemoryCluster {
    async fn list(&self, kind: ResourceKind, selector: &str) -> Result<Vec<ClusterObject>> {
        let mut state = self.state.lock();
        if kind == ResourceKind::Pod {
            state.tick_pending();
        }
        let state = &*state;
        let objects = state
            .objects
            .iter()
            .filter(|((k, _), labels)| *k == kind && selector_matches(selector, labels))
            .map(|((kind, name), labels)| ClusterObject {
                kind: *kind,
                name: name.clone(),
                labels: labels.clone(),
                images: state.images_of(*kind, name),
            })
            .collect();
        Ok(objects)
    }

    async fn apply(&self, manifest: &Manifest) -> Result<()> {
        let spec = manifest.spec();
        let name = spec.name.to_string();
        let kind = match manifest {
            Manifest::Deployment(_) => ResourceKind::Deployment,
            Manifest::Service(_) => ResourceKind::Service,
        };

        let mut state = self.state.lock();
        let created = state
            .objects
            .insert((kind, name.clone()), spec.labels.clone())
            .is_none();
        if kind == ResourceKind::Deployment {
            state.images.insert(name.clone(), spec.image.clone());
            let selector = format!("{DEPLOYMENT_LABEL}={name}");
            if state.auto_schedule && state.matching(ResourceKind::Pod, &selector).is_empty() {
                state.schedule(&name);
            }
        }
        state.events.push(ClusterEvent::Applied {
            kind,
            name,
            created,
        });
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        let deployment = if kind == ResourceKind::Pod {
            state.pod_deployment(name)
        } else {
            None
        };
        if state.objects.remove(&(kind, name.to_string())).is_none() {
            return Ok(());
        }
        match kind {
            ResourceKind::Deployment => {
                state.images.remove(name);
            }
            ResourceKind::Pod => {
                state.pod_images.remove(name);
            }
            ResourceKind::Service | ResourceKind::ConfigMap => {}
        }
        state.events.push(ClusterEvent::Deleted {
            kind,
            name: name.to_string(),
        });

        if let Some(deployment) = deployment {
            let owner_alive = state
                .objects
                .contains_key(&(ResourceKind::Deployment, deployment.clone()));
            if state.auto_schedule && owner_alive {
                state.schedule(&deployment);
            }
        }
        Ok(())
    }

    async fn read_document(&self, name: &str) -> Result<Option<ConfigDocument>> {
        Ok(self.state.lock().documents.get(name).map(|doc| ConfigDocument {
            data: doc.data.clone(),
            version: Some(doc.version.to_string()),
        }))
    }

    async fn write_document(
        &self,
        name: &str,
        data: BTreeMap<String, String>,
        precondition: Precondition,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let conflict = || ClusterError::Conflict {
            name: name.to_string(),
        };
        let current = state.documents.get(name).map(|d| d.version.to_string());
        match (&precondition, current) {
            (Precondition::Any, _) => {}
            (Precondition::Absent, None) => {}
            (Precondition::Absent, Some(_)) => return Err(conflict().into()),
            (Precondition::Version(expected), Some(actual)) if *expected == actual => {}
            (Precondition::Version(_), _) => return Err(conflict().into()),
        }
        if precondition != Precondition::Any && state.forced_conflicts.remove(name) {
            return Err(conflict().into());
        }
        state.store_document(name, data);
        Ok(())
    }

    async fn stream_logs(&self, pod: &str) -> Result<LogStream> {
        let state = self.state.lock();
        let deployment = state
            .pod_deployment(pod)
            .ok_or_else(|| ClusterError::NotFound {
                kind: ResourceKind::Pod.to_string(),
                name: pod.to_string(),
            })?;
        if state.failing_logs.contains(&deployment) {
            return Err(ClusterError::Api(format!("log stream for {pod} refused")).into());
        }
        let lines = stream::iter(
            state
                .logs
                .get(&deployment)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(Ok),
        );
        if state.following.contains(&deployment) {
            return Ok(lines.chain(stream::pending()).boxed());
        }
        Ok(lines.boxed())
    }

    async fn wait_for(&self, pod: &str, condition: PodCondition, timeout: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.readiness_waits.push((pod.to_string(), timeout));
        let deployment = state
            .pod_deployment(pod)
            .ok_or_else(|| ClusterError::NotFound {
                kind: ResourceKind::Pod.to_string(),
                name: pod.to_string(),
            })?;
        if state.unready.contains(&deployment) {
            return Err(ClusterError::Timeout {
                what: format!("pod {pod} {condition}"),
                seconds: timeout.as_secs(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn selector_terms() {
        let l = labels(&[("app", "dagster-user-deployments"), ("deployment", "x")]);
        assert!(selector_matches("deployment=x", &l));
        assert!(selector_matches("deployment==x,app", &l));
        assert!(!selector_matches("deployment=y", &l));
        assert!(selector_matches("deployment!=y", &l));
        assert!(!selector_matches("dagster/code-location", &l));
    }

    #[tokio::test]
    async fn versioned_write_rejects_stale_version() {
        let cluster = InMemoryCluster::new();
        cluster.put_document("doc", &[("k", "v1")]);
        let read = cluster.read_document("doc").await.unwrap();
        let stale = Precondition::from_read(read.as_ref());

        cluster.put_document("doc", &[("k", "v2")]);
        let err = cluster
            .write_document("doc", BTreeMap::new(), stale)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(cluster.document("doc").unwrap()["k"], "v2");
    }

    #[tokio::test]
    async fn absent_precondition_only_creates() {
        let cluster = InMemoryCluster::new();
        cluster
            .write_document("doc", BTreeMap::new(), Precondition::Absent)
            .await
            .unwrap();
        let err = cluster
            .write_document("doc", BTreeMap::new(), Precondition::Absent)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn deleting_a_pod_reschedules_while_deployment_exists() {
        let cluster = InMemoryCluster::new();
        cluster.add_object(ResourceKind::Deployment, "x", &[("deployment", "x")]);
        let first = cluster.add_pod("x");

        cluster.delete(ResourceKind::Pod, &first).await.unwrap();
        let pods = cluster.pods("x");
        assert_eq!(pods.len(), 1);
        assert_ne!(pods[0], first);

        cluster.delete(ResourceKind::Deployment, "x").await.unwrap();
        cluster.delete(ResourceKind::Pod, &pods[0]).await.unwrap();
        assert!(cluster.pods("x").is_empty());
    }

    #[tokio::test]
    async fn delayed_pods_appear_after_lists() {
        let cluster = InMemoryCluster::new().with_scheduling_delay(2);
        cluster.add_object(ResourceKind::Deployment, "x", &[("deployment", "x")]);
        cluster.state.lock().schedule("x");

        assert!(cluster.list(ResourceKind::Pod, "deployment=x").await.unwrap().is_empty());
        assert_eq!(cluster.list(ResourceKind::Pod, "deployment=x").await.unwrap().len(), 1);
    }
}
