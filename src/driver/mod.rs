//! Driver Module
//!
//! 클러스터 인식 클라이언트 런타임: 연결 풀, 라우팅, 트랜잭션 재시도
//!
//! # 구성
//!
//! - 연결 풀 (`Pool`, `PoolConfig`): 주소별 상한, FIFO 대기, 획득 타임아웃
//! - 직접 연결 제공자 (`DirectConnectionProvider`): 고정 주소, 연결 수명 관리
//! - 라우팅 (`routing`): 데이터베이스별 라우팅 테이블, 디스커버리, 부하 분산
//! - 재시도 (`TransactionExecutor`, `RetryConfig`): 지수 백오프와 재시도 예산
//! - 세션/트랜잭션 (`Session`, `Transaction`): 북마크 전달
//!
//! 실제 소켓과 프로토콜은 [`Connector`]와 [`Transport`] 구현체가 담당합니다.
//!
//! # Example
//!
//! ```ignore
//! use zeta4g_routing::driver::{AuthToken, Driver, SessionConfig};
//!
//! // 라우팅 드라이버 (zeta4g://) - 클러스터용
//! let driver = Driver::new(
//!     "zeta4g://server1:7687?region=eu",
//!     AuthToken::basic("zeta4g", "password"),
//!     connector,
//! )?;
//!
//! // 쓰기 트랜잭션 함수 (리더로 라우팅, 실패 시 재시도)
//! let session = driver.session(SessionConfig::builder().with_database("movies").build())?;
//! session
//!     .write_transaction(|tx| Box::pin(async move {
//!         tx.run("CREATE (n:Person {name: 'Alice'})").await?;
//!         Ok(())
//!     }))
//!     .await?;
//!
//! driver.close();
//! ```

pub mod routing;
mod address;
mod clock;
mod config;
mod connection;
mod driver;
mod error;
mod pool;
mod provider;
mod resolver;
mod retry;
mod session;
mod transaction;
mod types;

// Re-exports
pub use address::{ServerAddress, DEFAULT_PORT};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    AuthToken, DatabaseUnavailablePolicy, DriverConfig, DriverConfigBuilder, RoutingContext,
    TrustStrategy, UriScheme,
};
pub use connection::{BeginMetadata, Connector, IdleObserver, PooledConnection, Transport};
pub use driver::{Driver, DriverBuilder, DriverMetrics};
pub use error::{
    DriverError, DriverResult, DATABASE_NOT_FOUND_CODE, DATABASE_UNAVAILABLE_CODE,
    FORBIDDEN_ON_READ_ONLY_DATABASE_CODE, NOT_A_LEADER_CODE, PROCEDURE_NOT_FOUND_CODE,
    PROTOCOL_ERROR, SERVICE_UNAVAILABLE, SESSION_EXPIRED,
};
pub use pool::{Pool, PoolConfig, PoolConfigBuilder, PoolHooks, PoolMetrics, Pooled};
pub use provider::{Connection, ConnectionProvider, DirectConnectionProvider};
pub use resolver::{
    CustomResolver, HostNameResolver, IdentityResolver, ServerAddressResolver, SharedResolver,
};
pub use retry::{RetryConfig, TransactionExecutor};
pub use session::{Session, SessionConfig, SessionConfigBuilder};
pub use transaction::{Transaction, TransactionState};
pub use types::{AccessMode, Bookmarks, Query, Record, Value};

