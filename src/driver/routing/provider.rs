//! 라우팅 연결 제공자
//!
//! 데이터베이스별 라우팅 테이블을 유지하고, 접근 모드에 맞는 서버를 골라
//! 직접 연결 제공자의 풀에서 연결을 획득합니다.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::policy::ServerSelector;
use super::rediscovery::{LookupFailure, Rediscovery, RoutingInfo};
use super::table::{RoutingTable, ServerRole};
use crate::driver::address::ServerAddress;
use crate::driver::clock::SharedClock;
use crate::driver::config::{DatabaseUnavailablePolicy, DriverConfig};
use crate::driver::connection::Connector;
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::provider::{Connection, ConnectionProvider, DirectConnectionProvider};
use crate::driver::resolver::SharedResolver;
use crate::driver::types::AccessMode;

// ============================================================================
// DatabaseRouting - 데이터베이스별 라우팅 상태
// ============================================================================

struct DatabaseRouting {
    table: Mutex<RoutingTable>,
    /// 같은 데이터베이스의 디스커버리 직렬화
    refresh: tokio::sync::Mutex<()>,
    /// 라이터 없는 테이블을 받은 뒤에는 시드를 먼저 시도
    use_seed_first: AtomicBool,
    /// 디스커버리가 한 번이라도 성공했는지 여부
    initialized: AtomicBool,
    /// 이번 테이블에 대해 백그라운드 갱신을 이미 시도했는지 여부
    proactive_attempted: AtomicBool,
}

impl DatabaseRouting {
    fn new(database: &str, now: Instant) -> Self {
        Self {
            table: Mutex::new(RoutingTable::new(database, now)),
            refresh: tokio::sync::Mutex::new(()),
            use_seed_first: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            proactive_attempted: AtomicBool::new(false),
        }
    }

    fn is_stale_for(&self, mode: AccessMode, now: Instant) -> bool {
        self.table.lock().is_stale_for(mode, now)
    }

    fn known_routers(&self) -> Vec<ServerAddress> {
        self.table.lock().routers.clone()
    }

    fn snapshot(&self) -> RoutingTable {
        self.table.lock().clone()
    }
}

// ============================================================================
// RoutingConnectionProvider - 라우팅 연결 제공자
// ============================================================================

/// 클러스터 라우팅 연결 제공자
///
/// # 사용 예제
///
/// ```ignore
/// let provider = RoutingConnectionProvider::new(&config, connector, resolver, clock);
/// let conn = provider.acquire_connection("movies", AccessMode::Write).await?;
/// ```
pub struct RoutingConnectionProvider {
    seed: ServerAddress,
    direct: Arc<DirectConnectionProvider>,
    resolver: SharedResolver,
    rediscovery: Rediscovery,
    selector: ServerSelector,
    clock: SharedClock,
    databases: Mutex<HashMap<String, Arc<DatabaseRouting>>>,
    purge_delay: Duration,
    proactive_refresh: bool,
    database_unavailable_policy: DatabaseUnavailablePolicy,
    this: Weak<Self>,
}

impl RoutingConnectionProvider {
    /// 새 제공자 생성
    pub fn new(
        config: &DriverConfig,
        connector: Arc<dyn Connector>,
        resolver: SharedResolver,
        clock: SharedClock,
    ) -> Arc<Self> {
        let seed = config.address.clone();
        let direct = Arc::new(DirectConnectionProvider::new(config, connector, clock.clone()));
        let rediscovery = Rediscovery::new(config.routing_context.with_address(&seed));

        Arc::new_cyclic(|this| Self {
            seed,
            direct,
            resolver,
            rediscovery,
            selector: ServerSelector::new(config.load_balancing_strategy),
            clock,
            databases: Mutex::new(HashMap::new()),
            purge_delay: config.routing_table_purge_delay,
            proactive_refresh: config.proactive_routing_refresh,
            database_unavailable_policy: config.database_unavailable_policy,
            this: this.clone(),
        })
    }

    /// 시드 주소
    pub fn seed(&self) -> &ServerAddress {
        &self.seed
    }

    /// 내부 직접 연결 제공자 (풀 조회용)
    pub fn direct(&self) -> &DirectConnectionProvider {
        &self.direct
    }

    /// 데이터베이스의 라우팅 테이블 스냅샷
    pub fn routing_table(&self, database: &str) -> Option<RoutingTable> {
        let routing = self.databases.lock().get(database).cloned()?;
        Some(routing.snapshot())
    }

    /// 라우팅 테이블이 있는 데이터베이스 목록
    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<_> = self.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn routing_for(&self, database: &str) -> Arc<DatabaseRouting> {
        let now = self.clock.now();
        self.databases
            .lock()
            .entry(database.to_string())
            .or_insert_with(|| Arc::new(DatabaseRouting::new(database, now)))
            .clone()
    }

    fn existing_routing(&self, database: &str) -> Option<Arc<DatabaseRouting>> {
        self.databases.lock().get(database).cloned()
    }

    /// 라우팅을 거쳐 연결 획득
    pub async fn acquire(&self, database: &str, mode: AccessMode) -> DriverResult<Connection> {
        if self.direct.is_closed() {
            return Err(DriverError::PoolClosed);
        }

        let routing = self.routing_for(database);
        self.ensure_fresh(&routing, database, mode).await?;
        self.refresh_in_background(&routing, database);

        let address = {
            let mut table = routing.table.lock();
            self.selector
                .select(&mut table, ServerRole::from(mode), |a| self.direct.active_count(a))
                .ok_or_else(|| {
                    DriverError::session_expired(format!(
                        "Failed to obtain connection towards {} server. Known routing table is: {}",
                        mode, table
                    ))
                })?
        };

        match self.direct.acquire(&address).await {
            Ok(conn) => Ok(conn),
            Err(error) if is_connection_failure(&error) => {
                warn!(address = %address, database, error = %error, "server unavailable, forgetting address");
                self.forget_in(&routing, &address);
                Err(DriverError::session_expired(format!(
                    "Server at {} is no longer available: {}",
                    address,
                    error.message()
                )))
            }
            Err(error) => Err(error),
        }
    }

    async fn ensure_fresh(
        &self,
        routing: &Arc<DatabaseRouting>,
        database: &str,
        mode: AccessMode,
    ) -> DriverResult<()> {
        if !routing.is_stale_for(mode, self.clock.now()) {
            return Ok(());
        }

        let _guard = routing.refresh.lock().await;
        // 대기 중 다른 작업이 갱신했을 수 있음
        if !routing.is_stale_for(mode, self.clock.now()) {
            return Ok(());
        }

        self.refresh(routing, database).await?;
        routing.proactive_attempted.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// 라우터가 2개 미만이면 백그라운드에서 한 번 갱신
    fn refresh_in_background(&self, routing: &Arc<DatabaseRouting>, database: &str) {
        if !self.proactive_refresh || !routing.table.lock().is_stale_for_routing() {
            return;
        }
        if routing.proactive_attempted.swap(true, Ordering::SeqCst) {
            return;
        }
        let (Some(this), Ok(handle)) = (self.this.upgrade(), tokio::runtime::Handle::try_current()) else {
            return;
        };

        let routing = routing.clone();
        let database = database.to_string();
        debug!(database = %database, "starting background routing refresh");
        handle.spawn(async move {
            let _guard = routing.refresh.lock().await;
            if let Err(e) = this.refresh(&routing, &database).await {
                debug!(database = %database, error = %e, "background routing refresh failed");
            }
        });
    }

    /// 디스커버리 수행 (호출자가 갱신 락을 보유)
    async fn refresh(&self, routing: &DatabaseRouting, database: &str) -> DriverResult<()> {
        let bootstrap = !routing.initialized.load(Ordering::SeqCst);
        let known = routing.known_routers();

        let info = if routing.use_seed_first.load(Ordering::SeqCst) {
            match self.resolver.resolve(&self.seed).await {
                Ok(seeds) => match self.lookup_on_seed(routing, database, &seeds, bootstrap).await? {
                    Some(info) => Some(info),
                    None => self.lookup_on_known(routing, database, &known, bootstrap).await?,
                },
                // 리졸버 에러는 알려진 라우터도 모두 실패했을 때만 보고
                Err(resolve_error) => {
                    debug!(seed = %self.seed, error = %resolve_error, "seed resolution failed, trying known routers");
                    match self.lookup_on_known(routing, database, &known, bootstrap).await? {
                        Some(info) => Some(info),
                        None => return Err(resolve_error),
                    }
                }
            }
        } else {
            match self.lookup_on_known(routing, database, &known, bootstrap).await? {
                Some(info) => Some(info),
                None => {
                    let seeds = self.resolver.resolve(&self.seed).await?;
                    self.lookup_on_seed(routing, database, &seeds, bootstrap).await?
                }
            }
        };

        match info {
            Some(info) => {
                self.install(routing, database, info);
                Ok(())
            }
            None => Err(DriverError::service_unavailable(format!(
                "Could not perform discovery. No routing servers available. Known routing table: {}",
                routing.snapshot()
            ))),
        }
    }

    async fn lookup_on_known(
        &self,
        routing: &DatabaseRouting,
        database: &str,
        routers: &[ServerAddress],
        bootstrap: bool,
    ) -> DriverResult<Option<RoutingInfo>> {
        for router in routers {
            if let Some(info) = self.lookup_on(routing, database, router, bootstrap, true).await? {
                return Ok(Some(info));
            }
        }
        Ok(None)
    }

    async fn lookup_on_seed(
        &self,
        routing: &DatabaseRouting,
        database: &str,
        seeds: &[ServerAddress],
        bootstrap: bool,
    ) -> DriverResult<Option<RoutingInfo>> {
        for seed in seeds {
            if let Some(info) = self.lookup_on(routing, database, seed, bootstrap, false).await? {
                return Ok(Some(info));
            }
        }
        Ok(None)
    }

    /// 라우터 하나에 조회
    ///
    /// `Ok(None)`이면 다음 후보를 시도합니다. 알려진 라우터는 실패 시 테이블에서
    /// 제거하지만 시드 주소는 제거하지 않습니다.
    async fn lookup_on(
        &self,
        routing: &DatabaseRouting,
        database: &str,
        router: &ServerAddress,
        bootstrap: bool,
        known: bool,
    ) -> DriverResult<Option<RoutingInfo>> {
        let result = match self.direct.acquire(router).await {
            Ok(mut conn) => self.rediscovery.lookup(&mut conn, database, bootstrap).await,
            Err(DriverError::PoolClosed) => return Err(DriverError::PoolClosed),
            Err(e) => Err(e),
        };

        let error = match result {
            Ok(info) => return Ok(Some(info)),
            Err(error) => error,
        };
        let connection_failure = is_connection_failure(&error);

        match LookupFailure::classify(error, router) {
            LookupFailure::Fatal(e) => Err(e),
            LookupFailure::TryNext(e) => {
                warn!(router = %router, database, error = %e, "routing lookup failed, trying next router");
                if known {
                    let mut table = routing.table.lock();
                    if connection_failure {
                        table.forget(router);
                    } else {
                        table.forget_router(router);
                    }
                }
                if connection_failure {
                    self.direct.purge(router);
                }
                Ok(None)
            }
        }
    }

    fn install(&self, routing: &DatabaseRouting, database: &str, info: RoutingInfo) {
        let now = self.clock.now();
        let table = info.into_table(database, now);

        routing.use_seed_first.store(table.writers.is_empty(), Ordering::SeqCst);
        routing.initialized.store(true, Ordering::SeqCst);
        info!(database, table = %table, "routing table updated");

        let previous = std::mem::replace(&mut *routing.table.lock(), table);
        self.purge_unreferenced(previous.all_servers(), now);
    }

    /// 어떤 테이블에도 없는 주소의 풀 항목과 오래 쓰이지 않은 테이블 정리
    fn purge_unreferenced(&self, mut candidates: BTreeSet<ServerAddress>, now: Instant) {
        let referenced = {
            let mut databases = self.databases.lock();
            databases.retain(|name, routing| {
                let table = routing.table.lock();
                let unused = Arc::strong_count(routing) == 1 && table.is_expired_for(self.purge_delay, now);
                if unused {
                    debug!(database = %name, "removing unused routing table");
                    candidates.extend(table.all_servers());
                }
                !unused
            });

            databases
                .values()
                .flat_map(|routing| routing.table.lock().all_servers())
                .collect::<BTreeSet<_>>()
        };

        for address in candidates.difference(&referenced) {
            debug!(address = %address, "purging connections to address no longer in any routing table");
            self.direct.purge(address);
        }
    }

    fn forget_in(&self, routing: &DatabaseRouting, address: &ServerAddress) {
        routing.table.lock().forget(address);
        self.direct.purge(address);
    }

    /// 주소를 모든 라우팅 테이블에서 제거하고 풀 항목 정리
    pub fn forget_everywhere(&self, address: &ServerAddress) {
        let routings: Vec<_> = self.databases.lock().values().cloned().collect();
        for routing in routings {
            routing.table.lock().forget(address);
        }
        self.direct.purge(address);
        debug!(address = %address, "address forgotten");
    }

    /// 연결 사용 중 발생한 에러 처리
    pub fn on_connection_error(
        &self,
        address: &ServerAddress,
        database: &str,
        error: DriverError,
    ) -> DriverError {
        if !error.is_address_failure() {
            return error;
        }
        let routing = self.existing_routing(database);

        if error.is_database_unavailable() {
            match (self.database_unavailable_policy, &routing) {
                (DatabaseUnavailablePolicy::ForgetAddress, Some(routing)) => self.forget_in(routing, address),
                (DatabaseUnavailablePolicy::InvalidateTable, Some(routing)) => {
                    routing.table.lock().invalidate(self.clock.now());
                }
                (_, None) => {}
            }
            return error;
        }

        if let Some(routing) = &routing {
            self.forget_in(routing, address);
        }

        if error.is_write_rejection() {
            warn!(address = %address, database, "server is no longer accepting writes");
            return DriverError::session_expired(format!(
                "Server at {} no longer accepts writes: {}",
                address,
                error.message()
            ));
        }

        DriverError::session_expired(format!(
            "Server at {} is no longer available: {}",
            address,
            error.message()
        ))
    }

    /// 라우팅 테이블 강제 갱신
    pub async fn refresh_table(&self, database: &str) -> DriverResult<()> {
        let routing = self.routing_for(database);
        let _guard = routing.refresh.lock().await;
        self.refresh(&routing, database).await
    }

    /// 기본 데이터베이스의 읽기 서버에 연결 가능한지 확인
    pub async fn verify(&self) -> DriverResult<()> {
        let conn = self.acquire("", AccessMode::Read).await?;
        conn.release();
        Ok(())
    }

    /// 모든 연결과 라우팅 테이블 정리
    pub fn shutdown(&self) {
        self.direct.close();
        let dropped = {
            let mut databases = self.databases.lock();
            let count = databases.len();
            databases.clear();
            count
        };
        info!(seed = %self.seed, routing_tables = dropped, "routing connection provider closed");
    }
}

fn is_connection_failure(error: &DriverError) -> bool {
    matches!(error, DriverError::ServiceUnavailable(_) | DriverError::Io(_))
}

impl ConnectionProvider for RoutingConnectionProvider {
    fn acquire_connection<'a>(
        &'a self,
        database: &'a str,
        mode: AccessMode,
    ) -> BoxFuture<'a, DriverResult<Connection>> {
        self.acquire(database, mode).boxed()
    }

    fn handle_connection_error(
        &self,
        address: &ServerAddress,
        database: &str,
        error: DriverError,
    ) -> DriverError {
        self.on_connection_error(address, database, error)
    }

    fn forget(&self, address: &ServerAddress) {
        self.forget_everywhere(address)
    }

    fn refresh_routing_table<'a>(&'a self, database: &'a str) -> BoxFuture<'a, DriverResult<()>> {
        self.refresh_table(database).boxed()
    }

    fn verify_connectivity(&self) -> BoxFuture<'_, DriverResult<()>> {
        self.verify().boxed()
    }

    fn close(&self) {
        self.shutdown()
    }
}

impl fmt::Debug for RoutingConnectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingConnectionProvider")
            .field("seed", &self.seed)
            .field("databases", &self.databases())
            .field("strategy", &self.selector.strategy())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
