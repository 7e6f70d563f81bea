use uc_deploy::application::reconciler::Reconciler;
use uc_deploy::domain::reconcile::PipelineMode;
use uc_deploy::port::ResourceKind;
use uc_deploy::testkit::cluster::InMemoryCluster;
use uc_deploy::testkit::config::SCHEDULER_SELECTORS;
use uc_deploy::testkit::domain::record;
use uc_deploy::testkit::TestEnv;

/// Scheduler pods a full reload is expected to restart.
pub const SCHEDULER_PODS: [&str; 2] = ["dagster-webserver-0", "dagster-daemon-0"];

/// Add the scheduling service's pods so reload signals can be observed.
pub fn add_scheduler_pods(cluster: &InMemoryCluster) {
    for (pod, selector) in SCHEDULER_PODS.iter().zip(SCHEDULER_SELECTORS) {
        let (key, value) = selector.split_once('=').expect("key=value selector");
        cluster.add_object(ResourceKind::Pod, pod, &[(key, value)]);
    }
}

/// An environment where `name` was deployed at `tag` and is running.
pub async fn deployed(name: &str, tag: &str) -> TestEnv {
    let env = TestEnv::new();
    Reconciler::new(&env.ctx)
        .reconcile(record(name, tag), false, PipelineMode::Interactive)
        .await
        .expect("initial deployment");
    add_scheduler_pods(&env.cluster);
    env.cluster.clear_events();
    env
}
