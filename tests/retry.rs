//! 트랜잭션 함수 재시도 통합 테스트

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::create_driver;
use zeta4g_routing::driver::{DriverError, SessionConfig, DATABASE_UNAVAILABLE_CODE};

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().map(|s| Duration::from_secs(*s)).collect()
}

#[tokio::test]
async fn test_transient_failures_retried_until_success() {
    let (driver, cluster, clock) = create_driver("bolt://db:7687", |b| b);
    cluster.fail_runs("db", DATABASE_UNAVAILABLE_CODE, Some(2));

    let session = driver.session(SessionConfig::new()).unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let server = session
        .write_transaction(move |tx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let records = tx.run("CREATE (n)").await?;
                Ok::<_, DriverError>(records[0].get("server").and_then(|v| v.as_str()).map(str::to_string))
            })
        })
        .await
        .unwrap();

    assert_eq!(server.as_deref(), Some("db"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(clock.sleeps(), secs(&[1, 2]));
}

#[tokio::test]
async fn test_retry_stops_when_budget_exhausted() {
    let (driver, cluster, clock) = create_driver("bolt://db:7687", |b| b);
    cluster.fail_runs("db", DATABASE_UNAVAILABLE_CODE, None);

    let session = driver.session(SessionConfig::new()).unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let err = session
        .read_transaction(move |tx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { tx.run("MATCH (n) RETURN n").await })
        })
        .await
        .unwrap_err();

    // 0 + 1 + 2 + 4 + 8 + 10 = 25초에 여섯 번째 실패, 35초에 일곱 번째 실패 후 예산 초과
    assert_eq!(err.code(), DATABASE_UNAVAILABLE_CODE);
    assert_eq!(attempts.load(Ordering::SeqCst), 7);
    assert_eq!(clock.sleeps(), secs(&[1, 2, 4, 8, 10, 10]));
    assert!(clock.elapsed() >= Duration::from_secs(30));
}

#[tokio::test]
async fn test_shorter_budget_limits_attempts() {
    let (driver, cluster, clock) =
        create_driver("bolt://db:7687", |b| b.with_max_transaction_retry_time(Duration::from_secs(3)));
    cluster.fail_runs("db", DATABASE_UNAVAILABLE_CODE, None);

    let session = driver.session(SessionConfig::new()).unwrap();
    let err = session
        .write_transaction(|tx| Box::pin(async move { tx.run("CREATE (n)").await }))
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(clock.sleeps(), secs(&[1, 2]));
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let (driver, cluster, clock) = create_driver("bolt://db:7687", |b| b);
    cluster.fail_runs("db", "Neo.ClientError.Statement.SyntaxError", None);

    let session = driver.session(SessionConfig::new()).unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let err = session
        .write_transaction(move |tx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { tx.run("CREAT (n)").await })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::Client { .. }));
    assert_eq!(err.code(), "Neo.ClientError.Statement.SyntaxError");
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn test_work_error_not_retried() {
    let (driver, cluster, clock) = create_driver("bolt://db:7687", |b| b);

    let session = driver.session(SessionConfig::new()).unwrap();
    let err = session
        .write_transaction(|tx| {
            Box::pin(async move {
                tx.run("CREATE (n)").await?;
                Err::<(), _>(DriverError::configuration("application rejected result"))
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::Configuration(_)));
    assert!(clock.sleeps().is_empty());
    // 실패한 작업은 커밋되지 않음
    assert!(session.last_bookmarks().is_empty());
    assert_eq!(cluster.runs(), vec!["db"]);
}

#[tokio::test]
async fn test_terminated_transaction_not_retried() {
    let (driver, cluster, clock) = create_driver("bolt://db:7687", |b| b);
    cluster.fail_runs("db", "Neo.TransientError.Transaction.Terminated", None);

    let session = driver.session(SessionConfig::new()).unwrap();
    let err = session
        .write_transaction(|tx| Box::pin(async move { tx.run("CREATE (n)").await }))
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    assert!(clock.sleeps().is_empty());
}
