//! Multi-shard failure handling: partial failures, timeouts, cancellation.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use shardgate_common::config::RouterConfig;
use shardgate_common::error::GateError;
use shardgate_router::{BindVars, Opcode, Route};

fn scatter_route() -> Route {
    Route::builder(Opcode::SelectScatter, "wide", "select * from t")
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_shard_failure_fails_the_request() {
    let exec = FakeExecutor::new();
    exec.fail_shard("40-80");
    let router = router(&exec);

    let err = router
        .execute_route(&router.new_request(BindVars::new()), &scatter_route(), &BindVars::new())
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert!(matches!(err.root(), GateError::Executor { shard, .. } if shard == "40-80"));
    // Every shard was still tried.
    assert_eq!(exec.calls().len(), 3);
}

#[tokio::test]
async fn test_scatter_timeout() {
    let exec = FakeExecutor::new();
    exec.set_delay(Duration::from_millis(500));
    let mut config = RouterConfig::default();
    config.scatter.timeout_ms = 20;
    let router = router_with_config(&exec, config);

    let err = router
        .execute_route(&router.new_request(BindVars::new()), &scatter_route(), &BindVars::new())
        .await
        .unwrap_err();

    assert!(matches!(err.root(), GateError::Timeout { timeout_ms: 20, .. }));
    assert!(err.is_transient());

    // Outstanding shard calls are abandoned, not left running.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(exec.cancelled.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_dropping_the_request_cancels_shard_calls() {
    let exec = FakeExecutor::new();
    exec.set_delay(Duration::from_millis(500));
    let mut config = RouterConfig::default();
    config.scatter.timeout_ms = 0;
    let router = router_with_config(&exec, config);
    let ctx = router.new_request(BindVars::new());
    let route = scatter_route();

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        router.execute_route(&ctx, &route, &BindVars::new()),
    )
    .await;
    assert!(outcome.is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(exec.calls().len(), 3);
    assert_eq!(exec.cancelled.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_parallelism_cap_still_reaches_every_shard() {
    let exec = FakeExecutor::new();
    let mut config = RouterConfig::default();
    config.scatter.max_parallelism = 1;
    let router = router_with_config(&exec, config);

    router
        .execute_route(&router.new_request(BindVars::new()), &scatter_route(), &BindVars::new())
        .await
        .unwrap();
    assert_eq!(exec.calls().len(), 3);
}
