//! Lifecycle controller against Azure resources with a scripted `az`
//!
//! All tests run on a paused clock, so multi-hour bounds resolve instantly.


use azure_test_helpers::*;
use cloudbench_common::{CommandExecutor, CommandOutput, LifecycleState};
use cloudbench_coordinator::error::LifecycleError;
use cloudbench_coordinator::lifecycle::{LifecycleController, TeardownOutcome, WaitConfig};
use cloudbench_coordinator::provider::azure::{AzureCli, AzurePostgresServer, AzureResourceGroup};
use cloudbench_coordinator::provider::build_resources;
use cloudbench_coordinator::resource::Endpoint;
use cloudbench_test_utils::FakeExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn postgres(fake: &Arc<FakeExecutor>) -> LifecycleController {
    let executor: Arc<dyn CommandExecutor> = fake.clone();
    let spec = pgbench_spec(&overrides());
    let server = AzurePostgresServer::new(
        AzureCli::new(executor),
        &run_uri(),
        RESOURCE_GROUP,
        spec.database.as_ref().unwrap(),
    )
    .unwrap();
    LifecycleController::new(Box::new(server))
}

/// Controller for one of the run's resources, left over from an earlier run
fn adopted(fake: &Arc<FakeExecutor>, name: &str) -> LifecycleController {
    let executor: Arc<dyn CommandExecutor> = fake.clone();
    let resource = build_resources(&pgbench_spec(&overrides()), executor)
        .unwrap()
        .into_iter()
        .find(|r| r.name() == name)
        .unwrap_or_else(|| panic!("no resource named {name}"));
    LifecycleController::adopt(resource)
        .with_delete_wait(WaitConfig::deletion().with_timeout(Duration::from_secs(30)))
}

fn resource_group(fake: &Arc<FakeExecutor>) -> AzureResourceGroup {
    let executor: Arc<dyn CommandExecutor> = fake.clone();
    AzureResourceGroup::new(AzureCli::new(executor), &run_uri(), "eastus")
}

#[tokio::test(start_paused = true)]
async fn test_delete_is_noop_when_absent() {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond(&["az", "group", "exists"], CommandOutput::success("false\n"));

    let mut controller = LifecycleController::adopt(Box::new(resource_group(&fake)));
    let outcome = controller.teardown().await.unwrap();

    assert_eq!(outcome, TeardownOutcome::AlreadyAbsent);
    assert_eq!(controller.state(), LifecycleState::Deleted);
    assert_eq!(fake.count(&["az", "group", "delete"]), 0);
}

#[tokio::test(start_paused = true)]
async fn test_not_ready_without_create() {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond(&["az", "postgres", "server", "show"], server_state("Ready"));

    let mut controller = postgres(&fake);
    assert!(!controller.is_ready(&CancellationToken::new()).await);
    assert_eq!(controller.state(), LifecycleState::Uncreated);
    assert_eq!(fake.count(&["az", "postgres", "server", "show"]), 0);
    assert!(controller.endpoint().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_ready_requires_create_and_probe() {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond(&["az", "postgres", "server", "show"], server_state("Ready"));

    let mut controller = postgres(&fake);
    controller.provision(&CancellationToken::new()).await.unwrap();

    assert_eq!(controller.state(), LifecycleState::Ready);
    assert_eq!(
        controller.history(),
        &[
            LifecycleState::Uncreated,
            LifecycleState::Creating,
            LifecycleState::WaitingReady,
            LifecycleState::Ready,
        ]
    );
    assert_eq!(fake.count(&["az", "postgres", "server", "create"]), 1);
    assert_eq!(controller.polls(), 1);

    let Some(Endpoint::Database(db)) = controller.endpoint() else {
        panic!("expected a database endpoint");
    };
    assert_eq!(db.host, DB_HOST);
    assert_eq!(db.port, 5432);
    assert_eq!(db.password, PASSWORD);
}

#[tokio::test(start_paused = true)]
async fn test_polls_until_ready() {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond_sequence(
        &["az", "postgres", "server", "show"],
        vec![
            server_state("Creating"),
            server_state("Creating"),
            server_state("Creating"),
            server_state("Ready"),
        ],
    );

    let mut controller = postgres(&fake);
    let started = tokio::time::Instant::now();
    controller.provision(&CancellationToken::new()).await.unwrap();

    assert_eq!(controller.polls(), 4);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(15));
    assert!(elapsed < Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_readiness_wait_is_bounded() {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond(&["az", "postgres", "server", "show"], server_state("Creating"));

    let mut controller = postgres(&fake)
        .with_ready_wait(WaitConfig::readiness().with_timeout(Duration::from_secs(60)));
    let started = tokio::time::Instant::now();
    let err = controller
        .provision(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::NotReady { .. }));
    assert!(started.elapsed() <= Duration::from_secs(65));
    assert_eq!(controller.polls(), 13);
    assert_eq!(controller.state(), LifecycleState::Failed);
    assert!(controller.needs_teardown());
}

#[tokio::test(start_paused = true)]
async fn test_default_readiness_bound_is_six_hours() {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond(&["az", "postgres", "server", "show"], server_state("Creating"));

    let mut controller = postgres(&fake);
    let started = tokio::time::Instant::now();
    assert!(controller.provision(&CancellationToken::new()).await.is_err());

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(6 * 60 * 60));
    assert!(elapsed <= Duration::from_secs(6 * 60 * 60 + 5));
}

#[tokio::test(start_paused = true)]
async fn test_teardown_after_failed_readiness() {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond_sequence(
        &["az", "postgres", "server", "show"],
        // two readiness polls, the existence check before delete, then the
        // absence check
        vec![
            server_state("Creating"),
            server_state("Creating"),
            server_state("Creating"),
            not_found("Server"),
        ],
    );

    let mut controller = postgres(&fake)
        .with_ready_wait(WaitConfig::readiness().with_timeout(Duration::from_secs(5)));
    assert!(controller.provision(&CancellationToken::new()).await.is_err());

    let outcome = controller.teardown().await.unwrap();
    assert_eq!(outcome, TeardownOutcome::Deleted);
    assert_eq!(fake.count(&["az", "postgres", "server", "delete"]), 1);

    // A second teardown does nothing
    assert_eq!(
        controller.teardown().await.unwrap(),
        TeardownOutcome::AlreadyDeleted
    );
    assert_eq!(fake.count(&["az", "postgres", "server", "delete"]), 1);
}

#[tokio::test(start_paused = true)]
async fn test_delete_retries_throttling() {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond_sequence(
        &["az", "group", "exists"],
        vec![CommandOutput::success("true"), CommandOutput::success("false")],
    );
    fake.respond_sequence(
        &["az", "group", "delete"],
        vec![
            CommandOutput::failure(1, "ERROR: (TooManyRequests) Rate limit exceeded"),
            CommandOutput::success(""),
        ],
    );

    let mut controller = LifecycleController::adopt(Box::new(resource_group(&fake)));
    assert_eq!(controller.teardown().await.unwrap(), TeardownOutcome::Deleted);
    assert_eq!(fake.count(&["az", "group", "delete"]), 2);
}

#[tokio::test(start_paused = true)]
async fn test_still_exists_after_delete_fails_teardown() {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond(&["az", "group", "exists"], CommandOutput::success("true"));

    let mut controller = LifecycleController::adopt(Box::new(resource_group(&fake)))
        .with_delete_wait(WaitConfig::deletion().with_timeout(Duration::from_secs(30)));
    let err = controller.teardown().await.unwrap_err();

    assert!(matches!(err, LifecycleError::StillExists { .. }));
    assert_eq!(controller.state(), LifecycleState::Failed);
}

/// A `show` rejected for lack of access says nothing about existence
async fn assert_unauthorized_show_is_not_absence(name: &str, show: &[&str], delete: &[&str]) {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond(show, auth_failed());

    let mut controller = adopted(&fake, name);
    let err = controller.teardown().await.unwrap_err();

    assert!(matches!(err, LifecycleError::Resource(_)));
    assert_eq!(fake.count(delete), 1);
    assert_eq!(controller.state(), LifecycleState::Failed);
    assert!(controller.needs_teardown());
}

/// A throttled `show` never confirms the delete
async fn assert_throttled_show_is_not_absence(name: &str, show: &[&str], delete: &[&str]) {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond(show, throttled());

    let mut controller = adopted(&fake, name);
    let err = controller.teardown().await.unwrap_err();

    assert!(matches!(err, LifecycleError::StillExists { .. }));
    assert_eq!(fake.count(delete), 1);
    assert_eq!(controller.state(), LifecycleState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_vm_unauthorized_show_still_deletes() {
    assert_unauthorized_show_is_not_absence(VM, &["az", "vm", "show"], &["az", "vm", "delete"]).await;
}

#[tokio::test(start_paused = true)]
async fn test_server_unauthorized_show_still_deletes() {
    assert_unauthorized_show_is_not_absence(
        DATABASE,
        &["az", "postgres", "server", "show"],
        &["az", "postgres", "server", "delete"],
    )
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_vm_throttled_show_still_deletes() {
    assert_throttled_show_is_not_absence(VM, &["az", "vm", "show"], &["az", "vm", "delete"]).await;
}

#[tokio::test(start_paused = true)]
async fn test_server_throttled_show_still_deletes() {
    assert_throttled_show_is_not_absence(
        DATABASE,
        &["az", "postgres", "server", "show"],
        &["az", "postgres", "server", "delete"],
    )
    .await;
}

#[tokio::test(start_paused = true)]
async fn test_throttled_absence_check_keeps_polling() {
    let fake = Arc::new(FakeExecutor::new());
    fake.respond_sequence(
        &["az", "postgres", "server", "show"],
        vec![server_state("Ready"), throttled(), throttled(), not_found("Server")],
    );

    let mut controller = adopted(&fake, DATABASE);
    assert_eq!(controller.teardown().await.unwrap(), TeardownOutcome::Deleted);
    assert_eq!(fake.count(&["az", "postgres", "server", "delete"]), 1);
    assert_eq!(fake.count(&["az", "postgres", "server", "show"]), 4);
}
