//! Connection Provider
//!
//! 연결 제공자 트레이트와 단일 서버용 직접 연결 제공자

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::address::ServerAddress;
use super::clock::SharedClock;
use super::config::{AuthToken, DriverConfig};
use super::connection::{Connector, IdleObserver, PooledConnection};
use super::error::{DriverError, DriverResult};
use super::pool::{Pool, PoolHooks, PoolMetrics, Pooled};
use super::types::AccessMode;

/// 풀에서 획득한 연결
pub type Connection = Pooled<PooledConnection>;

// ============================================================================
// ConnectionProvider - 연결 제공자
// ============================================================================

/// 세션/트랜잭션 계층이 사용하는 연결 제공자
pub trait ConnectionProvider: Send + Sync + 'static {
    /// 데이터베이스와 접근 모드에 맞는 연결 획득
    fn acquire_connection<'a>(
        &'a self,
        database: &'a str,
        mode: AccessMode,
    ) -> BoxFuture<'a, DriverResult<Connection>>;

    /// 연결 사용 중 발생한 에러 처리
    ///
    /// 실패한 주소를 라우팅 정보에서 제거하고, 호출자에게 돌려줄 에러를 반환합니다.
    fn handle_connection_error(
        &self,
        address: &ServerAddress,
        database: &str,
        error: DriverError,
    ) -> DriverError;

    /// 주소를 모든 라우팅 정보에서 제거하고 풀 항목 정리
    fn forget(&self, address: &ServerAddress);

    /// 라우팅 테이블 강제 갱신
    fn refresh_routing_table<'a>(&'a self, database: &'a str) -> BoxFuture<'a, DriverResult<()>>;

    /// 연결 확인
    fn verify_connectivity(&self) -> BoxFuture<'_, DriverResult<()>>;

    /// 모든 연결 종료
    fn close(&self);
}

// ============================================================================
// Open Connections Registry - 열린 연결 목록
// ============================================================================

type Registry = Arc<Mutex<HashMap<u64, CancellationToken>>>;

/// 생성 중인 연결의 등록. 완료되지 않고 드롭되면 등록을 취소하고 신호를 보냅니다.
struct Registration {
    registry: Registry,
    id: u64,
    signal: CancellationToken,
    armed: bool,
}

impl Registration {
    fn new(registry: Registry, id: u64, signal: CancellationToken) -> Self {
        registry.lock().insert(id, signal.clone());
        Self {
            registry,
            id,
            signal,
            armed: true,
        }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.armed {
            self.registry.lock().remove(&self.id);
            self.signal.cancel();
        }
    }
}

// ============================================================================
// ConnectionHooks - 연결 수명 주기 훅
// ============================================================================

struct ConnectionHooks {
    connector: Arc<dyn Connector>,
    registry: Registry,
    next_id: AtomicU64,
    user_agent: String,
    auth: AuthToken,
    connection_timeout: Duration,
    max_connection_lifetime: Duration,
    clock: SharedClock,
}

impl PoolHooks<PooledConnection> for ConnectionHooks {
    fn create(&self, key: &ServerAddress) -> BoxFuture<'static, DriverResult<PooledConnection>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let address = key.clone();
        let signal = CancellationToken::new();
        let connector = self.connector.clone();
        let registry = self.registry.clone();
        let user_agent = self.user_agent.clone();
        let auth = self.auth.clone();
        let timeout = self.connection_timeout;
        let clock = self.clock.clone();

        async move {
            let open = connector.open(&address, signal.clone());
            let mut transport = match tokio::time::timeout(timeout, open).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(DriverError::service_unavailable(format!(
                        "Failed to establish connection to {} in {:?}",
                        address, timeout
                    )));
                }
            };

            let registration = Registration::new(registry, id, signal.clone());

            let handshake = match tokio::time::timeout(timeout, transport.connect(&user_agent, &auth)).await {
                Ok(result) => result,
                Err(_) => Err(DriverError::service_unavailable(format!(
                    "Handshake with {} timed out after {:?}",
                    address, timeout
                ))),
            };
            if let Err(e) = handshake {
                debug!(address = %address, id, error = %e, "connection handshake failed");
                drop(registration);
                transport.close().await;
                return Err(e);
            }

            if signal.is_cancelled() {
                drop(registration);
                transport.close().await;
                return Err(DriverError::service_unavailable("Connection provider is closed"));
            }

            registration.keep();
            debug!(address = %address, id, "connection created");
            Ok(PooledConnection::new(id, address, clock.now(), signal, transport))
        }
        .boxed()
    }

    fn validate(&self, conn: &PooledConnection) -> bool {
        let age = self.clock.now().saturating_duration_since(conn.created_at());
        conn.is_open() && age <= self.max_connection_lifetime
    }

    fn destroy(&self, conn: PooledConnection) {
        self.registry.lock().remove(&conn.id());
        conn.close_signal().cancel();
        debug!(address = %conn.address(), id = conn.id(), "connection destroyed");

        let transport = conn.into_transport();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(transport.close());
            }
            Err(_) => drop(transport),
        }
    }

    fn install_idle_observer(&self, conn: &mut PooledConnection) {
        let signal = conn.close_signal().clone();
        let address = conn.address().clone();
        let id = conn.id();
        conn.set_idle_observer(Some(IdleObserver::new(move |error| {
            debug!(address = %address, id, error = %error, "idle connection failed");
            signal.cancel();
        })));
    }

    fn remove_idle_observer(&self, conn: &mut PooledConnection) {
        conn.set_idle_observer(None);
    }
}

// ============================================================================
// DirectConnectionProvider - 직접 연결 제공자
// ============================================================================

/// 고정된 주소로 연결하는 제공자
///
/// 라우팅 제공자도 실제 연결 생성과 풀링은 이 제공자에 위임합니다.
pub struct DirectConnectionProvider {
    address: ServerAddress,
    pool: Pool<PooledConnection>,
    registry: Registry,
}

impl DirectConnectionProvider {
    /// 새 제공자 생성
    pub fn new(config: &DriverConfig, connector: Arc<dyn Connector>, clock: SharedClock) -> Self {
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let hooks = ConnectionHooks {
            connector,
            registry: registry.clone(),
            next_id: AtomicU64::new(1),
            user_agent: config.user_agent.clone(),
            auth: config.auth.clone(),
            connection_timeout: config.connection_timeout,
            max_connection_lifetime: config.max_connection_lifetime,
            clock,
        };

        Self {
            address: config.address.clone(),
            pool: Pool::new(config.pool_config(), Arc::new(hooks)),
            registry,
        }
    }

    /// 기본 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// 지정 주소로 연결 획득
    pub async fn acquire(&self, address: &ServerAddress) -> DriverResult<Connection> {
        self.pool.acquire(address).await
    }

    /// 주소의 풀 항목 정리
    pub fn purge(&self, address: &ServerAddress) {
        self.pool.purge(address);
    }

    /// 주소의 풀 항목 존재 여부
    pub fn has_pool(&self, address: &ServerAddress) -> bool {
        self.pool.has(address)
    }

    /// 주소별 사용 중 연결 수
    pub fn active_count(&self, address: &ServerAddress) -> usize {
        self.pool.active_count(address)
    }

    /// 주소별 유휴 연결 수
    pub fn idle_count(&self, address: &ServerAddress) -> usize {
        self.pool.idle_count(address)
    }

    /// 열린 연결 수 (유휴 + 사용 중)
    pub fn open_connection_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// 풀 메트릭
    pub fn metrics(&self) -> PoolMetrics {
        self.pool.metrics()
    }

    /// 닫힌 상태 여부
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// 지정 주소 연결 확인
    pub async fn verify_connectivity_to(&self, address: &ServerAddress) -> DriverResult<()> {
        let mut conn = self.acquire(address).await?;
        if let Err(e) = conn.transport_mut().reset().await {
            warn!(address = %address, error = %e, "connectivity check failed");
            return Err(e);
        }
        conn.release();
        Ok(())
    }

    /// 풀을 닫고 사용 중인 연결까지 강제 종료
    pub fn close(&self) {
        self.pool.purge_all();

        let signals: Vec<_> = self.registry.lock().drain().map(|(_, s)| s).collect();
        for signal in &signals {
            signal.cancel();
        }
        info!(address = %self.address, forced = signals.len(), "connection provider closed");
    }
}

impl ConnectionProvider for DirectConnectionProvider {
    fn acquire_connection<'a>(
        &'a self,
        _database: &'a str,
        _mode: AccessMode,
    ) -> BoxFuture<'a, DriverResult<Connection>> {
        self.acquire(&self.address).boxed()
    }

    fn handle_connection_error(
        &self,
        _address: &ServerAddress,
        _database: &str,
        error: DriverError,
    ) -> DriverError {
        error
    }

    fn forget(&self, address: &ServerAddress) {
        self.purge(address);
    }

    fn refresh_routing_table<'a>(&'a self, _database: &'a str) -> BoxFuture<'a, DriverResult<()>> {
        futures::future::ready(Ok(())).boxed()
    }

    fn verify_connectivity(&self) -> BoxFuture<'_, DriverResult<()>> {
        self.verify_connectivity_to(&self.address).boxed()
    }

    fn close(&self) {
        DirectConnectionProvider::close(self)
    }
}

impl std::fmt::Debug for DirectConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectConnectionProvider")
            .field("address", &self.address)
            .field("open_connections", &self.open_connection_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
