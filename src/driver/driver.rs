//! Driver
//!
//! URI 스킴에 따라 직접 또는 라우팅 연결 제공자를 고르고 세션을 만드는 진입점

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use super::clock::{SharedClock, SystemClock};
use super::config::{AuthToken, DriverConfig};
use super::connection::Connector;
use super::error::{DriverError, DriverResult};
use super::provider::{ConnectionProvider, DirectConnectionProvider};
use super::resolver::{IdentityResolver, SharedResolver};
use super::retry::TransactionExecutor;
use super::routing::{RoutingConnectionProvider, RoutingTable};
use super::session::{Session, SessionConfig};

// ============================================================================
// DriverBuilder - 드라이버 빌더
// ============================================================================

/// 드라이버 빌더
///
/// 리졸버와 시간 소스를 바꿀 때 사용합니다. 기본값은 [`IdentityResolver`]와 [`SystemClock`]입니다.
pub struct DriverBuilder {
    config: DriverConfig,
    connector: Arc<dyn Connector>,
    resolver: SharedResolver,
    clock: SharedClock,
}

impl DriverBuilder {
    /// 주소 리졸버 설정 (라우팅 드라이버 전용)
    pub fn with_resolver(mut self, resolver: SharedResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// 시간 소스 설정
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// 빌드
    pub fn build(self) -> Driver {
        let config = self.config.sanitize();

        let kind = if config.is_routing() {
            ProviderKind::Routing(RoutingConnectionProvider::new(
                &config,
                self.connector,
                self.resolver,
                self.clock.clone(),
            ))
        } else {
            ProviderKind::Direct(Arc::new(DirectConnectionProvider::new(
                &config,
                self.connector,
                self.clock.clone(),
            )))
        };
        let provider: Arc<dyn ConnectionProvider> = match &kind {
            ProviderKind::Direct(p) => p.clone(),
            ProviderKind::Routing(p) => p.clone(),
        };

        info!(
            address = %config.address,
            routing = config.is_routing(),
            encrypted = config.encrypted,
            "driver created"
        );

        Driver {
            executor: TransactionExecutor::new(config.retry.clone(), self.clock),
            config,
            provider,
            kind,
            open: AtomicBool::new(true),
        }
    }
}

// ============================================================================
// Driver - 드라이버
// ============================================================================

enum ProviderKind {
    Direct(Arc<DirectConnectionProvider>),
    Routing(Arc<RoutingConnectionProvider>),
}

/// 그래프 데이터베이스 드라이버
///
/// `bolt://`는 단일 서버에 직접 연결하고, `zeta4g://`/`neo4j://`는 클러스터 라우팅을 사용합니다.
///
/// # 사용 예제
///
/// ```ignore
/// let driver = Driver::new("zeta4g://cluster:7687", AuthToken::basic("zeta4g", "password"), connector)?;
/// let session = driver.session(SessionConfig::builder().with_read_access().build())?;
/// ```
pub struct Driver {
    config: DriverConfig,
    provider: Arc<dyn ConnectionProvider>,
    kind: ProviderKind,
    executor: TransactionExecutor,
    open: AtomicBool,
}

impl Driver {
    /// URI로 드라이버 생성
    pub fn new(uri: &str, auth: AuthToken, connector: Arc<dyn Connector>) -> DriverResult<Self> {
        let config = DriverConfig::new(uri, auth)?;
        Ok(Self::with_config(config, connector))
    }

    /// 설정으로 드라이버 생성
    pub fn with_config(config: DriverConfig, connector: Arc<dyn Connector>) -> Self {
        Self::builder(config, connector).build()
    }

    /// 빌더 시작
    pub fn builder(config: DriverConfig, connector: Arc<dyn Connector>) -> DriverBuilder {
        DriverBuilder {
            config,
            connector,
            resolver: Arc::new(IdentityResolver),
            clock: Arc::new(SystemClock),
        }
    }

    /// 세션 생성
    pub fn session(&self, config: SessionConfig) -> DriverResult<Session> {
        self.ensure_open()?;
        Ok(Session::new(self.provider.clone(), self.executor.clone(), config))
    }

    /// 기본 설정으로 세션 생성
    pub fn default_session(&self) -> DriverResult<Session> {
        self.session(SessionConfig::default())
    }

    /// 드라이버 설정
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 라우팅 드라이버 여부
    pub fn is_routing(&self) -> bool {
        matches!(self.kind, ProviderKind::Routing(_))
    }

    /// 열린 상태 여부
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// 연결 제공자
    pub fn provider(&self) -> &Arc<dyn ConnectionProvider> {
        &self.provider
    }

    /// 데이터베이스의 라우팅 테이블 스냅샷 (직접 연결이면 None)
    pub fn routing_table(&self, database: &str) -> Option<RoutingTable> {
        match &self.kind {
            ProviderKind::Routing(p) => p.routing_table(database),
            ProviderKind::Direct(_) => None,
        }
    }

    /// 연결 테스트
    pub async fn verify_connectivity(&self) -> DriverResult<()> {
        self.ensure_open()?;
        self.provider.verify_connectivity().await
    }

    /// 드라이버 종료 (사용 중인 연결까지 강제 종료)
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.provider.close();
            info!(address = %self.config.address, "driver closed");
        }
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DriverError::PoolClosed)
        }
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> DriverMetrics {
        let (direct, routing_tables) = match &self.kind {
            ProviderKind::Direct(p) => (p.as_ref(), 0),
            ProviderKind::Routing(p) => (p.direct(), p.databases().len()),
        };
        let pool = direct.metrics();

        DriverMetrics {
            pool_count: pool.keys,
            idle_connections: pool.idle,
            in_use_connections: pool.active,
            open_connections: direct.open_connection_count(),
            total_acquisitions: pool.total_acquisitions,
            total_connections_created: pool.total_created,
            total_acquisition_timeouts: pool.total_timeouts,
            routing_table_count: routing_tables,
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("address", &self.config.address)
            .field("routing", &self.is_routing())
            .field("open", &self.is_open())
            .finish()
    }
}

// ============================================================================
// DriverMetrics - 드라이버 메트릭
// ============================================================================

/// 드라이버 메트릭
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverMetrics {
    /// 풀 항목(주소) 수
    pub pool_count: usize,
    /// 유휴 연결 수
    pub idle_connections: usize,
    /// 사용 중인 연결 수
    pub in_use_connections: usize,
    /// 열린 연결 수 (유휴 + 사용 중)
    pub open_connections: usize,
    /// 총 연결 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성된 연결 수
    pub total_connections_created: u64,
    /// 총 획득 타임아웃 수
    pub total_acquisition_timeouts: u64,
    /// 라우팅 테이블 수
    pub routing_table_count: usize,
}
