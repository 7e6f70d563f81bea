//! Status watcher.
//!
//! Observes a deployment after reconciliation: waits for a pod to appear,
//! waits for readiness and follows the logs for a while. Nothing here fails
//! the calling operation. Every shortfall is reported as part of the
//! returned [`Observation`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::id::DeploymentName;
use crate::domain::workload::selector_for;
use crate::error::{ClusterError, Error};
use crate::port::{ClusterGateway, PodCondition, ResourceKind, Sleeper};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Delay between pod-existence polls.
    pub poll_interval: Duration,
    /// Pause before the first poll, giving the orchestrator time to react.
    pub settle_delay: Duration,
    /// How long logs are followed.
    pub log_timeout: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            settle_delay: Duration::from_secs(5),
            log_timeout: Duration::from_secs(60),
        }
    }
}

/// Result of waiting for pod readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready,
    TimedOut,
    Failed(String),
    /// Readiness was not waited for (no pods).
    Skipped,
}

/// Result of following pod logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    /// Every stream ended before the timeout.
    Completed { lines: usize },
    /// Following stopped at the timeout; the usual case for a running server.
    TimedOut { lines: usize },
    Failed { lines: usize, reason: String },
    NoPods,
}

/// What the watcher saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub pods: Vec<String>,
    pub readiness: ReadinessOutcome,
    pub logs: LogOutcome,
}

impl Observation {
    /// True when pods became ready and their logs could be followed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.readiness == ReadinessOutcome::Ready
            && matches!(
                self.logs,
                LogOutcome::Completed { .. } | LogOutcome::TimedOut { .. }
            )
    }
}

pub struct StatusWatcher {
    cluster: Arc<dyn ClusterGateway>,
    sleeper: Arc<dyn Sleeper>,
    settings: WatchSettings,
}

impl StatusWatcher {
    pub fn new(
        cluster: Arc<dyn ClusterGateway>,
        sleeper: Arc<dyn Sleeper>,
        settings: WatchSettings,
    ) -> Self {
        Self {
            cluster,
            sleeper,
            settings,
        }
    }

    /// Pods currently matching the deployment. Listing errors yield none.
    pub async fn current_pods(&self, name: &DeploymentName) -> Vec<String> {
        match self.cluster.list(ResourceKind::Pod, &selector_for(name)).await {
            Ok(pods) => pods.into_iter().map(|p| p.name).collect(),
            Err(e) => {
                warn!(deployment = %name, error = %e, "Failed to list pods");
                Vec::new()
            }
        }
    }

    /// Poll until at least one pod matches the deployment. Unbounded.
    pub async fn wait_for_pods(&self, name: &DeploymentName) -> Vec<String> {
        let selector = selector_for(name);
        let mut polls = 0u64;
        loop {
            match self.cluster.list(ResourceKind::Pod, &selector).await {
                Ok(pods) if !pods.is_empty() => {
                    debug!(deployment = %name, polls, "Pods scheduled");
                    return pods.into_iter().map(|p| p.name).collect();
                }
                Ok(_) => {}
                Err(e) => warn!(deployment = %name, error = %e, "Failed to list pods, retrying"),
            }
            polls += 1;
            self.sleeper.sleep(self.settings.poll_interval).await;
        }
    }

    /// Wait for every pod to become ready within `timeout` each.
    pub async fn wait_ready(&self, pods: &[String], timeout: Duration) -> ReadinessOutcome {
        if pods.is_empty() {
            return ReadinessOutcome::Skipped;
        }
        for pod in pods {
            match self.cluster.wait_for(pod, PodCondition::Ready, timeout).await {
                Ok(()) => debug!(pod = %pod, "Pod ready"),
                Err(Error::Cluster(ClusterError::Timeout { .. })) => {
                    warn!(pod = %pod, timeout_secs = timeout.as_secs(), "Pod not ready in time");
                    return ReadinessOutcome::TimedOut;
                }
                Err(e) => {
                    warn!(pod = %pod, error = %e, "Readiness wait failed");
                    return ReadinessOutcome::Failed(e.to_string());
                }
            }
        }
        ReadinessOutcome::Ready
    }

    /// Follow the pods' logs until `duration` has passed in total, passing
    /// `(pod, line)` to `sink`.
    ///
    /// Pods are followed one after another against a single deadline. Lines
    /// a stream already has buffered are still drained once it has passed.
    pub async fn tail_logs<F>(&self, pods: &[String], duration: Duration, mut sink: F) -> LogOutcome
    where
        F: FnMut(&str, &str),
    {
        if pods.is_empty() {
            return LogOutcome::NoPods;
        }
        let deadline = Instant::now() + duration;
        let mut lines = 0usize;
        let mut timed_out = false;
        for pod in pods {
            let mut stream = match self.cluster.stream_logs(pod).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(pod = %pod, error = %e, "Could not follow pod logs");
                    return LogOutcome::Failed {
                        lines,
                        reason: e.to_string(),
                    };
                }
            };
            let follow = async {
                while let Some(line) = stream.next().await {
                    sink(pod, &line?);
                    lines += 1;
                }
                Ok::<(), Error>(())
            };
            match tokio::time::timeout_at(deadline, follow).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(pod = %pod, error = %e, "Log stream failed");
                    return LogOutcome::Failed {
                        lines,
                        reason: e.to_string(),
                    };
                }
                Err(_) => timed_out = true,
            }
        }
        if timed_out {
            LogOutcome::TimedOut { lines }
        } else {
            LogOutcome::Completed { lines }
        }
    }

    /// Full post-reconciliation observation of a deployment.
    pub async fn observe<F>(
        &self,
        name: &DeploymentName,
        readiness_timeout: Duration,
        sink: F,
    ) -> Observation
    where
        F: FnMut(&str, &str),
    {
        self.sleeper.sleep(self.settings.settle_delay).await;
        let pods = self.wait_for_pods(name).await;
        let readiness = self.wait_ready(&pods, readiness_timeout).await;
        let logs = self.tail_logs(&pods, self.settings.log_timeout, sink).await;
        info!(
            deployment = %name,
            pods = pods.len(),
            ?readiness,
            ?logs,
            "Observation finished"
        );
        Observation {
            pods,
            readiness,
            logs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workload::{Manifest, WorkloadSettings};
    use crate::testkit::cluster::InMemoryCluster;
    use crate::testkit::domain::{name, record};
    use crate::testkit::doubles::RecordingSleeper;

    fn watcher(cluster: &Arc<InMemoryCluster>) -> (Arc<RecordingSleeper>, StatusWatcher) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let settings = WatchSettings {
            log_timeout: Duration::from_millis(200),
            ..WatchSettings::default()
        };
        let watcher = StatusWatcher::new(cluster.clone(), sleeper.clone(), settings);
        (sleeper, watcher)
    }

    #[tokio::test]
    async fn polls_until_pod_appears() {
        let cluster = Arc::new(InMemoryCluster::new().with_scheduling_delay(3));
        let manifests = Manifest::for_record(&record("x", "abc123"), &WorkloadSettings::default());
        cluster.apply(&manifests[0]).await.unwrap();

        let (sleeper, watcher) = watcher(&cluster);
        let pods = watcher.wait_for_pods(&name("x")).await;

        assert_eq!(pods.len(), 1);
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn observation_reports_ready_and_logs() {
        let cluster = Arc::new(InMemoryCluster::new());
        cluster.add_pod("x");
        cluster.set_logs("x", &["starting", "serving on 3030"]);
        let (sleeper, watcher) = watcher(&cluster);

        let mut seen = Vec::new();
        let observation = watcher
            .observe(&name("x"), Duration::from_secs(40), |_, line| {
                seen.push(line.to_string())
            })
            .await;

        assert!(observation.is_complete());
        assert_eq!(observation.logs, LogOutcome::Completed { lines: 2 });
        assert_eq!(seen, vec!["starting", "serving on 3030"]);
        assert_eq!(sleeper.sleeps()[0], Duration::from_secs(5));
        assert_eq!(cluster.readiness_waits()[0].1, Duration::from_secs(40));
    }

    #[tokio::test]
    async fn readiness_timeout_is_an_outcome() {
        let cluster = Arc::new(InMemoryCluster::new());
        let pod = cluster.add_pod("x");
        cluster.set_unready("x");
        let (_, watcher) = watcher(&cluster);

        let outcome = watcher.wait_ready(&[pod], Duration::from_secs(240)).await;
        assert_eq!(outcome, ReadinessOutcome::TimedOut);
    }

    #[tokio::test]
    async fn log_failure_is_an_outcome() {
        let cluster = Arc::new(InMemoryCluster::new());
        let pod = cluster.add_pod("x");
        cluster.fail_logs("x");
        let (_, watcher) = watcher(&cluster);

        let outcome = watcher.tail_logs(&[pod], Duration::from_secs(1), |_, _| {}).await;
        assert!(matches!(outcome, LogOutcome::Failed { lines: 0, .. }));
    }

    #[tokio::test]
    async fn following_many_pods_shares_one_deadline() {
        let cluster = Arc::new(InMemoryCluster::new());
        let pods: Vec<String> = ["x", "y", "z"].iter().map(|d| cluster.add_pod(d)).collect();
        for deployment in ["x", "y", "z"] {
            cluster.set_logs(deployment, &["serving"]);
            cluster.follow_logs(deployment);
        }
        let (_, watcher) = watcher(&cluster);
        let timeout = Duration::from_millis(150);

        let started = std::time::Instant::now();
        let mut seen = Vec::new();
        let outcome = watcher
            .tail_logs(&pods, timeout, |pod, line| seen.push(format!("{pod}: {line}")))
            .await;

        assert!(started.elapsed() < timeout * 3, "took {:?}", started.elapsed());
        assert_eq!(outcome, LogOutcome::TimedOut { lines: 3 });
        assert_eq!(seen[0], format!("{}: serving", pods[0]));
    }

    #[test]
    fn no_pods_is_incomplete() {
        let observation = Observation {
            pods: Vec::new(),
            readiness: ReadinessOutcome::Skipped,
            logs: LogOutcome::NoPods,
        };
        assert!(!observation.is_complete());
    }
}
