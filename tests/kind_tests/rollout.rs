//! Integration tests for host StatefulSet rollouts
//!
//! These tests run the create and update paths against a real StatefulSet
//! controller: a good image converges, a broken one never does and the
//! failure policy takes over.

use std::time::Duration;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::api::Api;
use kube::Client;
use tokio_util::sync::CancellationToken;

use chi_converge::config::{CreateFailureAction, ReconcileConfig, UpdateFailureAction};
use chi_converge::controller::Context;
use chi_converge::error::RolloutPhase;
use chi_converge::host::{HostHandle, ResourceRef};
use chi_converge::Error;

use super::helpers::{
    create_installation, ensure_test_cluster, fresh_namespace, host_stateful_set, image_of,
    BAD_IMAGE, GOOD_IMAGE,
};

// =============================================================================
// Test Fixtures
// =============================================================================

fn config(create: CreateFailureAction, update: UpdateFailureAction) -> ReconcileConfig {
    ReconcileConfig {
        on_create_failure_action: create,
        on_update_failure_action: update,
        convergence_timeout_seconds: 60,
        convergence_poll_interval_seconds: 2,
        ..Default::default()
    }
}

async fn setup(namespace: &str, config: ReconcileConfig) -> (Client, Context) {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    fresh_namespace(&client, namespace).await;
    create_installation(&client, namespace, "prod").await;
    let ctx = Context::builder(client.clone()).config(config).build();
    (client, ctx)
}

fn host(namespace: &str) -> HostHandle {
    HostHandle::new("0-0", ResourceRef::new(namespace, "prod"))
}

// =============================================================================
// Rollout Stories
// =============================================================================

/// Story: A new host is created and converges
///
/// Expected behavior:
/// - The StatefulSet is created and its pod becomes ready
/// - The installation counts one added host
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_new_host_is_created_and_converges() {
    let namespace = "chi-rollout-create";
    let (client, ctx) = setup(
        namespace,
        config(CreateFailureAction::Abort, UpdateFailureAction::Abort),
    )
    .await;
    let reconciler = ctx.workload_reconciler(ResourceRef::new(namespace, "prod"));

    reconciler
        .reconcile_stateful_set(
            host_stateful_set(namespace, "chi-prod-0-0", GOOD_IMAGE),
            &host(namespace),
            &CancellationToken::new(),
        )
        .await
        .expect("create converges");

    let api: Api<StatefulSet> = Api::namespaced(client, namespace);
    let sts = api.get("chi-prod-0-0").await.expect("StatefulSet exists");
    assert_eq!(sts.status.and_then(|s| s.ready_replicas), Some(1));
    assert_eq!(reconciler.status().snapshot().await.added_hosts_count, 1);
}

/// Story: A create that never converges is deleted under the delete policy
///
/// Expected behavior:
/// - The wait times out on the unpullable image
/// - The StatefulSet is deleted
/// - The pass is told to stop
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_broken_create_is_deleted() {
    let namespace = "chi-rollout-create-delete";
    let mut cfg = config(CreateFailureAction::Delete, UpdateFailureAction::Abort);
    cfg.convergence_timeout_seconds = 20;
    let (client, ctx) = setup(namespace, cfg).await;
    let reconciler = ctx.workload_reconciler(ResourceRef::new(namespace, "prod"));

    let err = reconciler
        .reconcile_stateful_set(
            host_stateful_set(namespace, "chi-prod-0-0", BAD_IMAGE),
            &host(namespace),
            &CancellationToken::new(),
        )
        .await
        .expect_err("broken image never converges");
    assert!(matches!(
        err,
        Error::Halted {
            phase: RolloutPhase::Create,
            ..
        }
    ));

    // Foreground deletion may take a moment to remove the object
    let api: Api<StatefulSet> = Api::namespaced(client, namespace);
    for _ in 0..30 {
        if api.get_opt("chi-prod-0-0").await.expect("lookup").is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("StatefulSet was not deleted after create failure");
}

/// Story: A broken update is rolled back to the previous image
///
/// Expected behavior:
/// - The first spec converges
/// - The update to an unpullable image times out
/// - The StatefulSet is restored to the good image and its pod recycled
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_broken_update_is_rolled_back() {
    let namespace = "chi-rollout-update-rollback";
    let mut cfg = config(CreateFailureAction::Abort, UpdateFailureAction::Rollback);
    cfg.convergence_timeout_seconds = 20;
    let (client, ctx) = setup(namespace, cfg).await;
    let reconciler = ctx.workload_reconciler(ResourceRef::new(namespace, "prod"));
    let cancel = CancellationToken::new();

    reconciler
        .reconcile_stateful_set(
            host_stateful_set(namespace, "chi-prod-0-0", GOOD_IMAGE),
            &host(namespace),
            &cancel,
        )
        .await
        .expect("first rollout converges");

    let err = reconciler
        .reconcile_stateful_set(
            host_stateful_set(namespace, "chi-prod-0-0", BAD_IMAGE),
            &host(namespace),
            &cancel,
        )
        .await
        .expect_err("broken image never converges");
    assert!(matches!(
        err,
        Error::Halted {
            phase: RolloutPhase::Update,
            ..
        }
    ));

    let api: Api<StatefulSet> = Api::namespaced(client, namespace);
    let sts = api.get("chi-prod-0-0").await.expect("StatefulSet exists");
    assert_eq!(image_of(&sts).as_deref(), Some(GOOD_IMAGE));

    let status = reconciler.status().snapshot().await;
    assert_eq!(status.added_hosts_count, 1);
    assert_eq!(status.updated_hosts_count, 1);
}

/// Story: Re-applying an unchanged spec does not wait at all
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_unchanged_spec_is_a_no_op() {
    let namespace = "chi-rollout-noop";
    let (_client, ctx) = setup(
        namespace,
        config(CreateFailureAction::Abort, UpdateFailureAction::Abort),
    )
    .await;
    let reconciler = ctx.workload_reconciler(ResourceRef::new(namespace, "prod"));
    let cancel = CancellationToken::new();
    let desired = host_stateful_set(namespace, "chi-prod-0-0", GOOD_IMAGE);

    reconciler
        .reconcile_stateful_set(desired.clone(), &host(namespace), &cancel)
        .await
        .expect("first rollout converges");

    let start = std::time::Instant::now();
    reconciler
        .reconcile_stateful_set(desired, &host(namespace), &cancel)
        .await
        .expect("unchanged spec succeeds");
    assert!(start.elapsed() < Duration::from_secs(2));
}
