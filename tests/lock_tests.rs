//! Deployment semaphore behavior across concurrent operators.

mod support;

use std::sync::Arc;
use std::time::Duration;

use uc_deploy::application::context::Context;
use uc_deploy::application::deployment::{DeployRequest, DeploymentService};
use uc_deploy::application::semaphore::DistributedSemaphore;
use uc_deploy::domain::id::HolderToken;
use uc_deploy::domain::lock::LockRecord;
use uc_deploy::error::{BuildError, Error};
use uc_deploy::port::ResourceKind;
use uc_deploy::testkit::cluster::InMemoryCluster;
use uc_deploy::testkit::config::{settings, LOCK_DOCUMENT, REGISTRY_DOCUMENT};
use uc_deploy::testkit::doubles::{FixedSource, RecordingSleeper, ScriptedBuilder};
use uc_deploy::testkit::{TestEnv, BRANCH};

fn lock_record(cluster: &InMemoryCluster) -> LockRecord {
    cluster
        .document(LOCK_DOCUMENT)
        .map(|data| LockRecord::from_data(&data))
        .unwrap_or_default()
}

fn semaphore(cluster: &Arc<InMemoryCluster>, token: &str) -> DistributedSemaphore {
    DistributedSemaphore::with_token(cluster.clone(), LOCK_DOCUMENT, HolderToken::new(token))
}

fn skip_build() -> DeployRequest {
    DeployRequest {
        skip_build: true,
        ..DeployRequest::default()
    }
}

#[tokio::test]
async fn concurrent_claims_admit_exactly_one_holder() {
    let cluster = Arc::new(InMemoryCluster::new());
    let first = semaphore(&cluster, "first");
    let second = semaphore(&cluster, "second");

    let (a, b) = tokio::join!(first.acquire(false), second.acquire(false));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a ^ b, "exactly one claim must win: {a} {b}");
    let winner = if a { first.token() } else { second.token() };
    assert!(lock_record(&cluster).is_held_by(winner));
}

#[tokio::test]
async fn claim_that_loses_the_write_race_reports_not_acquired() {
    let cluster = Arc::new(InMemoryCluster::new());
    cluster.put_document(LOCK_DOCUMENT, &[("held", "false")]);
    cluster.conflict_next_write(LOCK_DOCUMENT);

    let acquired = semaphore(&cluster, "late").acquire(false).await.unwrap();

    assert!(!acquired);
    assert!(!lock_record(&cluster).held);
}

#[tokio::test]
async fn force_reset_takes_over_a_held_lock() {
    let cluster = Arc::new(InMemoryCluster::new());
    let stuck = semaphore(&cluster, "stuck");
    let operator = semaphore(&cluster, "operator");
    assert!(stuck.acquire(false).await.unwrap());

    assert!(!operator.acquire(false).await.unwrap());
    assert!(operator.acquire(true).await.unwrap());
    assert!(lock_record(&cluster).is_held_by(operator.token()));
}

#[tokio::test]
async fn deploy_gives_up_after_bounded_retries() {
    let env = TestEnv::new();
    let holder = semaphore(&env.cluster, "other-operator");
    assert!(holder.acquire(false).await.unwrap());

    let err = env.service().deploy(&skip_build()).await.unwrap_err();

    assert!(matches!(err, Error::LockNotAcquired { attempts: 5 }));
    assert_eq!(env.sleeper.sleeps(), vec![Duration::from_secs(10); 4]);
    assert!(env.cluster.document(REGISTRY_DOCUMENT).is_none());
    assert!(lock_record(&env.cluster).is_held_by(holder.token()));
}

#[tokio::test]
async fn reset_lock_deploys_despite_a_stuck_holder() {
    let env = TestEnv::new();
    assert!(semaphore(&env.cluster, "stuck").acquire(false).await.unwrap());

    let request = DeployRequest {
        reset_lock: true,
        ..skip_build()
    };
    let outcome = env.service().deploy(&request).await.unwrap();

    assert_eq!(outcome.name.as_str(), "feature-x");
    assert_eq!(env.sleeper.count(), 0);
    assert!(!lock_record(&env.cluster).held);
}

#[tokio::test]
async fn deploy_proceeds_once_the_holder_releases() {
    let cluster = Arc::new(InMemoryCluster::new());
    cluster.put_document(LOCK_DOCUMENT, &[("held", "true"), ("holder", "other")]);

    let releasing = cluster.clone();
    let sleeper = Arc::new(RecordingSleeper::with_hook(move |call| {
        if call == 2 {
            releasing.put_document(LOCK_DOCUMENT, &[("held", "false")]);
        }
    }));

    let ctx = Context::new(
        cluster.clone(),
        Arc::new(ScriptedBuilder::new()),
        Arc::new(FixedSource::new(BRANCH)),
        sleeper.clone(),
        settings(),
    );
    let outcome = DeploymentService::new(&ctx).deploy(&skip_build()).await.unwrap();

    assert_eq!(sleeper.count(), 2);
    assert_eq!(outcome.name.as_str(), "feature-x");
    assert!(cluster.contains(ResourceKind::Deployment, "feature-x"));
    assert!(!lock_record(&cluster).held);
}

#[tokio::test]
async fn failed_build_releases_the_lock_and_registers_nothing() {
    let env = TestEnv::with(
        InMemoryCluster::new(),
        ScriptedBuilder::failing("unauthorized: authentication required"),
        settings(),
    );

    let err = env
        .service()
        .deploy(&DeployRequest::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Build(BuildError::CommandFailed { .. })));
    assert!(!lock_record(&env.cluster).held);
    assert!(env.service().list().await.unwrap().is_empty());
    assert!(env.cluster.objects(ResourceKind::Deployment).is_empty());
}
