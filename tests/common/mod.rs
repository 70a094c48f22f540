//! 통합 테스트용 스크립트 클러스터
//!
//! 호스트별 라우팅 응답, 다운된 호스트, 실패할 쿼리를 미리 정해두고
//! 드라이버가 실제로 어떤 서버와 대화했는지 기록합니다.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use zeta4g_routing::driver::{
    AuthToken, BeginMetadata, Connector, Driver, DriverConfig, DriverConfigBuilder, DriverError,
    DriverResult, IdleObserver, ManualClock, Query, Record, RetryConfig, RoutingContext,
    ServerAddress, Transport, Value,
};

// ============================================================================
// Cluster - 스크립트 클러스터
// ============================================================================

/// 라우팅 프로시저 응답
#[derive(Debug, Clone)]
pub struct TableReply {
    pub ttl: i64,
    pub routers: Vec<String>,
    pub readers: Vec<String>,
    pub writers: Vec<String>,
}

/// 호스트 이름 목록으로 라우팅 응답 생성
pub fn table(ttl: i64, routers: &[&str], readers: &[&str], writers: &[&str]) -> TableReply {
    let owned = |hosts: &[&str]| hosts.iter().map(|h| h.to_string()).collect();
    TableReply {
        ttl,
        routers: owned(routers),
        readers: owned(readers),
        writers: owned(writers),
    }
}

#[derive(Debug, Clone)]
struct RunFailure {
    code: String,
    remaining: Option<usize>,
}

#[derive(Default)]
pub struct Cluster {
    replies: Mutex<HashMap<String, TableReply>>,
    down: Mutex<HashSet<String>>,
    failures: Mutex<HashMap<String, RunFailure>>,
    route_calls: Mutex<Vec<(String, String)>>,
    begins: Mutex<Vec<(String, Vec<String>)>>,
    runs: Mutex<Vec<String>>,
    signals: Mutex<Vec<CancellationToken>>,
    bookmark_seq: AtomicUsize,
}

impl Cluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 호스트의 라우팅 응답 설정
    pub fn reply(&self, host: &str, reply: TableReply) {
        self.replies.lock().insert(host.to_string(), reply);
    }

    /// 호스트를 연결 불가로 설정
    pub fn down(&self, host: &str) {
        self.down.lock().insert(host.to_string());
    }

    /// 호스트의 쿼리를 서버 에러 코드로 실패시킴 (`times`가 None이면 계속)
    pub fn fail_runs(&self, host: &str, code: &str, times: Option<usize>) {
        self.failures.lock().insert(
            host.to_string(),
            RunFailure {
                code: code.to_string(),
                remaining: times,
            },
        );
    }

    /// 라우팅 프로시저를 호출받은 호스트 순서
    pub fn route_calls(&self) -> Vec<String> {
        self.route_calls.lock().iter().map(|(host, _)| host.clone()).collect()
    }

    /// 트랜잭션 시작 기록 (호스트, 전달된 북마크)
    pub fn begins(&self) -> Vec<(String, Vec<String>)> {
        self.begins.lock().clone()
    }

    /// 쿼리를 성공적으로 실행한 호스트 순서
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().clone()
    }

    /// 지금까지 열린 연결 수
    pub fn opened(&self) -> usize {
        self.signals.lock().len()
    }

    /// 열린 연결 중 아직 닫히지 않은 수
    pub fn live_connections(&self) -> usize {
        self.signals.lock().iter().filter(|s| !s.is_cancelled()).count()
    }

    fn take_failure(&self, host: &str) -> Option<DriverError> {
        let mut failures = self.failures.lock();
        let failure = failures.get_mut(host)?;
        match &mut failure.remaining {
            Some(0) => return None,
            Some(n) => *n -= 1,
            None => {}
        }
        Some(DriverError::server(failure.code.clone(), "scripted failure"))
    }
}

fn servers(role: &str, hosts: &[String]) -> Value {
    let mut map = HashMap::new();
    map.insert("role".to_string(), Value::from(role));
    map.insert(
        "addresses".to_string(),
        Value::List(hosts.iter().map(|h| Value::from(format!("{}:7687", h))).collect()),
    );
    Value::Map(map)
}

// ============================================================================
// ScriptedTransport / ScriptedConnector
// ============================================================================

struct ScriptedTransport {
    host: String,
    cluster: Arc<Cluster>,
    signal: CancellationToken,
}

impl Transport for ScriptedTransport {
    fn connect<'a>(&'a mut self, _: &'a str, _: &'a AuthToken) -> BoxFuture<'a, DriverResult<()>> {
        futures::future::ready(Ok(())).boxed()
    }

    fn route<'a>(
        &'a mut self,
        database: &'a str,
        _: &'a RoutingContext,
    ) -> BoxFuture<'a, DriverResult<Vec<Record>>> {
        self.cluster
            .route_calls
            .lock()
            .push((self.host.clone(), database.to_string()));

        let result = match self.cluster.replies.lock().get(&self.host).cloned() {
            Some(reply) => Ok(vec![Record::from_pairs([
                ("ttl", Value::Integer(reply.ttl)),
                (
                    "servers",
                    Value::List(vec![
                        servers("ROUTE", &reply.routers),
                        servers("READ", &reply.readers),
                        servers("WRITE", &reply.writers),
                    ]),
                ),
            ])]),
            None => Err(DriverError::service_unavailable("connection reset by peer")),
        };
        futures::future::ready(result).boxed()
    }

    fn begin<'a>(&'a mut self, metadata: &'a BeginMetadata) -> BoxFuture<'a, DriverResult<()>> {
        self.cluster
            .begins
            .lock()
            .push((self.host.clone(), metadata.bookmarks.values().to_vec()));
        futures::future::ready(Ok(())).boxed()
    }

    fn run<'a>(&'a mut self, _: &'a Query) -> BoxFuture<'a, DriverResult<Vec<Record>>> {
        let result = match self.cluster.take_failure(&self.host) {
            Some(error) => Err(error),
            None => {
                self.cluster.runs.lock().push(self.host.clone());
                Ok(vec![Record::from_pairs([("server", Value::from(self.host.clone()))])])
            }
        };
        futures::future::ready(result).boxed()
    }

    fn commit(&mut self) -> BoxFuture<'_, DriverResult<Option<String>>> {
        let seq = self.cluster.bookmark_seq.fetch_add(1, Ordering::SeqCst) + 1;
        futures::future::ready(Ok(Some(format!("bm-{}", seq)))).boxed()
    }

    fn rollback(&mut self) -> BoxFuture<'_, DriverResult<()>> {
        futures::future::ready(Ok(())).boxed()
    }

    fn reset(&mut self) -> BoxFuture<'_, DriverResult<()>> {
        futures::future::ready(Ok(())).boxed()
    }

    fn is_open(&self) -> bool {
        !self.signal.is_cancelled()
    }

    fn set_idle_observer(&mut self, _: Option<IdleObserver>) {}

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        futures::future::ready(()).boxed()
    }
}

pub struct ScriptedConnector {
    cluster: Arc<Cluster>,
}

impl ScriptedConnector {
    pub fn new(cluster: Arc<Cluster>) -> Arc<Self> {
        Arc::new(Self { cluster })
    }
}

impl Connector for ScriptedConnector {
    fn open(
        &self,
        address: &ServerAddress,
        close_signal: CancellationToken,
    ) -> BoxFuture<'static, DriverResult<Box<dyn Transport>>> {
        let host = address.host().to_string();
        if self.cluster.down.lock().contains(&host) {
            return futures::future::ready(Err(DriverError::service_unavailable(format!(
                "connection refused: {}",
                host
            ))))
            .boxed();
        }

        self.cluster.signals.lock().push(close_signal.clone());
        let transport: Box<dyn Transport> = Box::new(ScriptedTransport {
            host,
            cluster: self.cluster.clone(),
            signal: close_signal,
        });
        futures::future::ready(Ok(transport)).boxed()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 흔들기 없는 재시도 설정 (1, 2, 4, 8, 10, 10 ... 초)
pub fn deterministic_retry() -> RetryConfig {
    RetryConfig::new().with_jitter_factor(0.0)
}

/// 스크립트 클러스터와 수동 시간으로 드라이버 생성
pub fn create_driver(
    uri: &str,
    configure: impl FnOnce(DriverConfigBuilder) -> DriverConfigBuilder,
) -> (Driver, Arc<Cluster>, ManualClock) {
    let cluster = Cluster::new();
    let clock = ManualClock::new();
    let builder = DriverConfig::builder(uri, AuthToken::basic("zeta4g", "password"))
        .expect("valid uri")
        .with_retry(deterministic_retry());
    let config = configure(builder).build();

    let driver = Driver::builder(config, ScriptedConnector::new(cluster.clone()))
        .with_clock(Arc::new(clock.clone()))
        .build();
    (driver, cluster, clock)
}

pub fn addr(host: &str) -> ServerAddress {
    ServerAddress::new(host, 7687)
}
