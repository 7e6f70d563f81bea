//! Reconciliation decision table against the in-memory cluster.

mod support;

use std::time::Duration;

use support::scenario::{add_scheduler_pods, deployed, SCHEDULER_PODS};
use uc_deploy::application::reconciler::Reconciler;
use uc_deploy::domain::reconcile::{CleanupScope, DeploymentState, PipelineMode, ReloadScope};
use uc_deploy::port::{ClusterGateway, ResourceKind};
use uc_deploy::testkit::cluster::{ClusterEvent, InMemoryCluster};
use uc_deploy::testkit::config::{settings, WORKSPACE_DOCUMENT, WORKSPACE_KEY};
use uc_deploy::testkit::domain::{name, record};
use uc_deploy::testkit::doubles::ScriptedBuilder;
use uc_deploy::testkit::TestEnv;

fn workspace(env: &TestEnv) -> String {
    env.cluster
        .document(WORKSPACE_DOCUMENT)
        .and_then(|data| data.get(WORKSPACE_KEY).cloned())
        .unwrap_or_default()
}

#[tokio::test]
async fn new_deployment_registers_and_reloads_everything() {
    let env = TestEnv::new();
    add_scheduler_pods(&env.cluster);

    let plan = Reconciler::new(&env.ctx)
        .reconcile(record("feature-x", "abc123"), false, PipelineMode::Interactive)
        .await
        .unwrap();

    assert_eq!(plan.state, DeploymentState::NotExists);
    assert_eq!(plan.reload, ReloadScope::Full);
    assert_eq!(plan.readiness_timeout, Duration::from_secs(240));

    let reconciler = Reconciler::new(&env.ctx);
    assert!(reconciler.registry().check_exists(&name("feature-x")).await.unwrap());
    assert!(env.cluster.contains(ResourceKind::Deployment, "feature-x"));
    assert!(env.cluster.contains(ResourceKind::Service, "feature-x"));
    assert_eq!(
        env.cluster.image("feature-x").as_deref(),
        Some("registry.example.com/dagster/feature-x:abc123")
    );
    assert_eq!(env.cluster.pods("feature-x").len(), 1);
    assert!(workspace(&env).contains("feature-x"));
    assert_eq!(env.cluster.deletions(ResourceKind::Pod), SCHEDULER_PODS);
}

#[tokio::test]
async fn registered_without_pod_recreates_everything() {
    let env = deployed("feature-x", "abc123").await;
    let pod = env.cluster.pods("feature-x").remove(0);
    env.cluster.delete(ResourceKind::Deployment, "feature-x").await.unwrap();
    env.cluster.delete(ResourceKind::Pod, &pod).await.unwrap();
    env.cluster.clear_events();

    let plan = Reconciler::new(&env.ctx)
        .reconcile(record("feature-x", "def456"), false, PipelineMode::Interactive)
        .await
        .unwrap();

    assert_eq!(plan.state, DeploymentState::ExistsNoPod);
    assert_eq!(plan.readiness_timeout, Duration::from_secs(240));
    assert_eq!(env.cluster.deletions(ResourceKind::Service), ["feature-x"]);
    assert!(env.cluster.events().contains(&ClusterEvent::Applied {
        kind: ResourceKind::Deployment,
        name: "feature-x".into(),
        created: true,
    }));
    assert_eq!(
        env.cluster.image("feature-x").as_deref(),
        Some("registry.example.com/dagster/feature-x:def456")
    );
    assert_eq!(env.cluster.deletions(ResourceKind::Pod), SCHEDULER_PODS);

    let records = Reconciler::new(&env.ctx).registry().list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].image.tag.as_str(), "def456");
}

#[tokio::test]
async fn unscheduled_deployment_is_treated_as_missing_pod() {
    let env = TestEnv::with(
        InMemoryCluster::new().without_scheduling(),
        ScriptedBuilder::new(),
        settings(),
    );
    let reconciler = Reconciler::new(&env.ctx);
    reconciler
        .reconcile(record("feature-x", "abc123"), false, PipelineMode::Interactive)
        .await
        .unwrap();

    let plan = reconciler
        .reconcile(record("feature-x", "def456"), true, PipelineMode::Interactive)
        .await
        .unwrap();

    assert_eq!(plan.state, DeploymentState::ExistsNoPod);
    assert_eq!(env.cluster.deletions(ResourceKind::Deployment), ["feature-x"]);
    assert_eq!(env.cluster.deletions(ResourceKind::Service), ["feature-x"]);
    assert!(env.cluster.contains(ResourceKind::Deployment, "feature-x"));
}

#[tokio::test]
async fn running_deployment_only_restarts_its_pod() {
    let env = deployed("feature-x", "abc123").await;
    let old_pod = env.cluster.pods("feature-x").remove(0);

    let plan = Reconciler::new(&env.ctx)
        .reconcile(record("feature-x", "ghi789"), false, PipelineMode::Interactive)
        .await
        .unwrap();

    assert_eq!(plan.state, DeploymentState::ExistsPodCurrent);
    assert_eq!(plan.reload, ReloadScope::Narrow);
    assert_eq!(plan.readiness_timeout, Duration::from_secs(40));

    assert_eq!(env.cluster.deletions(ResourceKind::Pod), [old_pod.clone()]);
    assert!(env.cluster.deletions(ResourceKind::Deployment).is_empty());
    assert!(env.cluster.deletions(ResourceKind::Service).is_empty());
    assert_eq!(env.cluster.document_writes(WORKSPACE_DOCUMENT), 0);
    for pod in SCHEDULER_PODS {
        assert!(env.cluster.contains(ResourceKind::Pod, pod));
    }

    let pods = env.cluster.pods("feature-x");
    assert_eq!(pods.len(), 1);
    assert_ne!(pods[0], old_pod);
    assert_eq!(
        env.cluster.image("feature-x").as_deref(),
        Some("registry.example.com/dagster/feature-x:ghi789")
    );
}

#[tokio::test]
async fn force_recreates_the_workload_but_keeps_the_service() {
    let env = deployed("feature-x", "abc123").await;

    let plan = Reconciler::new(&env.ctx)
        .reconcile(record("feature-x", "ghi789"), true, PipelineMode::Interactive)
        .await
        .unwrap();

    assert_eq!(plan.state, DeploymentState::ExistsPodStale);
    assert_eq!(plan.reload, ReloadScope::Narrow);
    assert_eq!(plan.readiness_timeout, Duration::from_secs(240));
    assert_eq!(env.cluster.deletions(ResourceKind::Deployment), ["feature-x"]);
    assert!(env.cluster.deletions(ResourceKind::Service).is_empty());
    assert!(env.cluster.events().contains(&ClusterEvent::Applied {
        kind: ResourceKind::Deployment,
        name: "feature-x".into(),
        created: true,
    }));
    for pod in SCHEDULER_PODS {
        assert!(env.cluster.contains(ResourceKind::Pod, pod));
    }
}

#[tokio::test]
async fn automated_pipelines_always_recreate_running_workloads() {
    let env = deployed("feature-x", "abc123").await;

    let plan = Reconciler::new(&env.ctx)
        .reconcile(record("feature-x", "ghi789"), false, PipelineMode::Automated)
        .await
        .unwrap();

    assert_eq!(plan.state, DeploymentState::ExistsPodStale);
    assert_eq!(env.cluster.deletions(ResourceKind::Deployment), ["feature-x"]);
}

#[tokio::test]
async fn reload_reapplies_every_registered_deployment() {
    let env = deployed("feature-x", "abc123").await;

    Reconciler::new(&env.ctx)
        .reconcile(record("main", "abc123"), false, PipelineMode::Interactive)
        .await
        .unwrap();

    let events = env.cluster.events();
    assert!(events.contains(&ClusterEvent::Applied {
        kind: ResourceKind::Deployment,
        name: "feature-x".into(),
        created: false,
    }));
    assert!(events.contains(&ClusterEvent::Applied {
        kind: ResourceKind::Deployment,
        name: "main".into(),
        created: true,
    }));
    let workspace = workspace(&env);
    assert!(workspace.contains("feature-x"));
    assert!(workspace.contains("main"));
}

#[tokio::test]
async fn full_cleanup_deletes_pods_last() {
    let env = deployed("feature-x", "abc123").await;

    let deleted = Reconciler::new(&env.ctx)
        .cleanup(&name("feature-x"), CleanupScope::All)
        .await
        .unwrap();

    assert_eq!(deleted, 3);
    let kinds: Vec<ResourceKind> = env
        .cluster
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ClusterEvent::Deleted { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        [ResourceKind::Deployment, ResourceKind::Service, ResourceKind::Pod]
    );
    assert!(env.cluster.pods("feature-x").is_empty());
}
