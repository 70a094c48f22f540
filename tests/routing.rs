//! 라우팅 드라이버 통합 테스트

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use zeta4g_routing::driver::{
    AccessMode, AuthToken, ConnectionProvider, CustomResolver, Driver, DriverError, ServerAddress,
    SessionConfig, NOT_A_LEADER_CODE,
};

use common::{addr, create_driver, table, Cluster, ScriptedConnector};

fn hosts(addresses: &[ServerAddress]) -> Vec<String> {
    addresses.iter().map(|a| a.host().to_string()).collect()
}

#[tokio::test]
async fn test_write_goes_to_writer_without_extra_discovery() {
    let (driver, cluster, _clock) = create_driver("zeta4g://seed:7687", |b| b);
    cluster.reply("seed", table(300, &["r1", "r2"], &["s1", "s2"], &["w1"]));

    let session = driver.session(SessionConfig::new()).unwrap();
    for _ in 0..3 {
        session
            .write_transaction(|tx| Box::pin(async move { tx.run("CREATE (n)").await }))
            .await
            .unwrap();
    }

    assert_eq!(cluster.runs(), vec!["w1", "w1", "w1"]);
    assert_eq!(cluster.route_calls(), vec!["seed"]);
}

#[tokio::test]
async fn test_unreachable_reader_forgotten_and_next_used() {
    let (driver, cluster, clock) = create_driver("zeta4g://seed:7687", |b| b);
    cluster.reply("seed", table(300, &["r1"], &["s1", "s2"], &["w1"]));
    cluster.down("s1");

    let session = driver.session(SessionConfig::builder().with_read_access().build()).unwrap();
    session
        .read_transaction(|tx| Box::pin(async move { tx.run("MATCH (n) RETURN n").await }))
        .await
        .unwrap();

    assert_eq!(cluster.runs(), vec!["s2"]);
    assert_eq!(cluster.route_calls(), vec!["seed"]);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);

    let table = driver.routing_table("").unwrap();
    assert_eq!(hosts(&table.readers), vec!["s2"]);
    assert_eq!(hosts(&table.writers), vec!["w1"]);
}

#[tokio::test]
async fn test_leader_switch_retried_on_new_writer() {
    let (driver, cluster, _clock) = create_driver("zeta4g://seed:7687", |b| b);
    cluster.reply("seed", table(300, &["seed"], &["s1"], &["w1", "w2"]));
    cluster.fail_runs("w1", NOT_A_LEADER_CODE, None);

    let session = driver.session(SessionConfig::new()).unwrap();
    session
        .write_transaction(|tx| Box::pin(async move { tx.run("CREATE (n)").await }))
        .await
        .unwrap();

    assert_eq!(cluster.runs(), vec!["w2"]);
    assert_eq!(hosts(&driver.routing_table("").unwrap().writers), vec!["w2"]);
}

#[tokio::test]
async fn test_closed_writer_connection_reconnects_without_rediscovery() {
    let (driver, cluster, _clock) = create_driver("zeta4g://seed:7687", |b| b);
    cluster.reply("seed", table(300, &["seed"], &["s1"], &["w1"]));

    let conn = driver.provider().acquire_connection("", AccessMode::Write).await.unwrap();
    assert_eq!(conn.address(), &addr("w1"));
    assert_eq!(cluster.opened(), 2);

    // 사용 중에 끊긴 연결은 반환 시 폐기됨
    conn.close_signal().cancel();
    drop(conn);

    let conn = driver.provider().acquire_connection("", AccessMode::Write).await.unwrap();
    assert_eq!(conn.address(), &addr("w1"));
    assert!(conn.is_open());
    assert_eq!(cluster.opened(), 3);
    assert_eq!(cluster.route_calls(), vec!["seed"]);
}

#[tokio::test]
async fn test_empty_resolver_result_is_configuration_error() {
    let cluster = Cluster::new();
    let config = zeta4g_routing::DriverConfig::new("zeta4g://seed:7687", AuthToken::none()).unwrap();
    let driver = Driver::builder(config, ScriptedConnector::new(cluster.clone()))
        .with_resolver(Arc::new(CustomResolver::new(|_: &ServerAddress| {
            futures::future::ready(Ok(Vec::new())).boxed()
        })))
        .build();

    let session = driver.session(SessionConfig::new()).unwrap();
    let err = session
        .read_transaction(|tx| Box::pin(async move { tx.run("RETURN 1").await }))
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::Configuration(_)));
    assert!(cluster.route_calls().is_empty());
}

#[tokio::test]
async fn test_resolver_failure_is_configuration_error() {
    let cluster = Cluster::new();
    let config = zeta4g_routing::DriverConfig::new("zeta4g://seed:7687", AuthToken::none()).unwrap();
    let driver = Driver::builder(config, ScriptedConnector::new(cluster.clone()))
        .with_resolver(Arc::new(CustomResolver::new(|_: &ServerAddress| {
            futures::future::ready(Err(DriverError::service_unavailable("dns down"))).boxed()
        })))
        .build();

    let err = driver.verify_connectivity().await.unwrap_err();
    assert!(matches!(err, DriverError::Configuration(_)));
    assert!(err.message().contains("dns down"));
}

#[tokio::test]
async fn test_resolved_seed_addresses_tried_in_order() {
    let cluster = Cluster::new();
    cluster.down("seed-a");
    cluster.reply("seed-b", table(300, &["seed-b"], &["s1"], &["w1"]));

    let config = zeta4g_routing::DriverConfig::new("zeta4g://seed:7687", AuthToken::none()).unwrap();
    let driver = Driver::builder(config, ScriptedConnector::new(cluster.clone()))
        .with_resolver(Arc::new(CustomResolver::new(|_: &ServerAddress| {
            futures::future::ready(Ok(vec![addr("seed-a"), addr("seed-b")])).boxed()
        })))
        .build();

    driver.verify_connectivity().await.unwrap();

    assert_eq!(cluster.route_calls(), vec!["seed-b"]);
    assert_eq!(hosts(&driver.routing_table("").unwrap().readers), vec!["s1"]);
}

#[tokio::test]
async fn test_seed_used_after_known_routers_fail() {
    let (driver, cluster, clock) = create_driver("zeta4g://seed:7687", |b| b);
    cluster.reply("seed", table(10, &["r1", "r2"], &["s1"], &["w1"]));

    let session = driver.session(SessionConfig::new()).unwrap();
    session
        .read_transaction(|tx| Box::pin(async move { tx.run("RETURN 1").await }))
        .await
        .unwrap();

    cluster.down("r1");
    cluster.down("r2");
    cluster.reply("seed", table(10, &["r3"], &["s2"], &["w1"]));
    clock.advance(Duration::from_secs(11));

    session
        .read_transaction(|tx| Box::pin(async move { tx.run("RETURN 1").await }))
        .await
        .unwrap();

    assert_eq!(cluster.route_calls(), vec!["seed", "seed"]);
    assert_eq!(cluster.runs(), vec!["s1", "s2"]);
    assert_eq!(hosts(&driver.routing_table("").unwrap().routers), vec!["r3"]);
}

#[tokio::test]
async fn test_table_without_writers_prefers_seed_next() {
    let (driver, cluster, _clock) = create_driver("zeta4g://seed:7687", |b| b);
    cluster.reply("seed", table(300, &["r1"], &["s1"], &[]));
    cluster.reply("r1", table(300, &["r1"], &["s1"], &["w-from-router"]));

    let session = driver.session(SessionConfig::new()).unwrap();
    session
        .read_transaction(|tx| Box::pin(async move { tx.run("RETURN 1").await }))
        .await
        .unwrap();

    cluster.reply("seed", table(300, &["r1"], &["s1"], &["w-from-seed"]));
    session
        .write_transaction(|tx| Box::pin(async move { tx.run("CREATE (n)").await }))
        .await
        .unwrap();

    assert_eq!(cluster.route_calls(), vec!["seed", "seed"]);
    assert_eq!(cluster.runs(), vec!["s1", "w-from-seed"]);
}

#[tokio::test]
async fn test_bookmarks_chain_transactions_in_session() {
    let (driver, cluster, _clock) = create_driver("zeta4g://seed:7687", |b| b);
    cluster.reply("seed", table(300, &["seed"], &["s1"], &["w1"]));

    let session = driver.session(SessionConfig::builder().with_database("movies").build()).unwrap();
    session
        .write_transaction(|tx| Box::pin(async move { tx.run("CREATE (n)").await }))
        .await
        .unwrap();
    assert_eq!(session.last_bookmarks().values(), ["bm-1".to_string()]);

    session
        .read_transaction(|tx| Box::pin(async move { tx.run("MATCH (n) RETURN n").await }))
        .await
        .unwrap();
    assert_eq!(session.last_bookmarks().values(), ["bm-2".to_string()]);

    let begins = cluster.begins();
    assert_eq!(begins[0], ("w1".to_string(), Vec::<String>::new()));
    assert_eq!(begins[1], ("s1".to_string(), vec!["bm-1".to_string()]));
    assert_eq!(driver.routing_table("movies").unwrap().database, "movies");
}

#[tokio::test]
async fn test_explicit_transaction_commit_updates_bookmarks() {
    let (driver, cluster, _clock) = create_driver("zeta4g://seed:7687", |b| b);
    cluster.reply("seed", table(300, &["seed"], &["s1"], &["w1"]));

    let session = driver.session(SessionConfig::new()).unwrap();
    let mut tx = session.begin_transaction(Some(AccessMode::Read)).await.unwrap();
    assert_eq!(tx.server(), Some(&addr("s1")));
    tx.run("MATCH (n) RETURN n").await.unwrap();
    let bookmark = tx.commit().await.unwrap();

    assert_eq!(bookmark.as_deref(), Some("bm-1"));
    assert_eq!(session.last_bookmarks().values(), ["bm-1".to_string()]);
}

#[tokio::test]
async fn test_close_force_closes_checked_out_connections() {
    let (driver, cluster, _clock) = create_driver("zeta4g://seed:7687", |b| b);
    cluster.reply("seed", table(300, &["seed"], &["s1"], &["w1"]));

    let session = driver.session(SessionConfig::new()).unwrap();
    let tx = session.begin_transaction(None).await.unwrap();
    assert_eq!(tx.server(), Some(&addr("w1")));
    assert!(cluster.live_connections() > 0);

    driver.close();

    assert!(!driver.is_open());
    assert_eq!(cluster.live_connections(), 0);
    assert!(driver.routing_table("").is_none());
    assert!(matches!(driver.session(SessionConfig::new()), Err(DriverError::PoolClosed)));
    assert!(matches!(session.begin_transaction(None).await, Err(DriverError::PoolClosed)));

    drop(tx);
    driver.close();
}

#[tokio::test]
async fn test_scheme_selects_provider() {
    let cluster = Cluster::new();

    let direct = Driver::new("bolt://db:7687", AuthToken::none(), ScriptedConnector::new(cluster.clone())).unwrap();
    assert!(!direct.is_routing());
    assert!(direct.routing_table("").is_none());
    direct.verify_connectivity().await.unwrap();
    assert!(cluster.route_calls().is_empty());

    let routing = Driver::new(
        "neo4j://seed:7687?region=eu",
        AuthToken::none(),
        ScriptedConnector::new(cluster.clone()),
    )
    .unwrap();
    assert!(routing.is_routing());
    assert_eq!(routing.config().routing_context.get("region"), Some("eu"));

    let err = Driver::new("bolt://db:7687?region=eu", AuthToken::none(), ScriptedConnector::new(cluster)).unwrap_err();
    assert!(matches!(err, DriverError::Configuration(_)));
}

#[tokio::test]
async fn test_metrics_after_transactions() {
    let (driver, cluster, _clock) = create_driver("zeta4g://seed:7687", |b| b);
    cluster.reply("seed", table(300, &["seed"], &["s1"], &["w1"]));

    let session = driver.session(SessionConfig::new()).unwrap();
    session
        .write_transaction(|tx| Box::pin(async move { tx.run("CREATE (n)").await }))
        .await
        .unwrap();

    let metrics = driver.metrics();
    assert_eq!(metrics.routing_table_count, 1);
    assert_eq!(metrics.in_use_connections, 0);
    assert_eq!(metrics.open_connections, metrics.idle_connections);
    assert_eq!(metrics.total_connections_created, cluster.opened() as u64);
}
