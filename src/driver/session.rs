//! Session Management
//!
//! 세션 관리: 데이터베이스, 기본 접근 모드, 북마크를 가진 트랜잭션 작업 단위

use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use super::connection::BeginMetadata;
use super::error::DriverResult;
use super::provider::ConnectionProvider;
use super::retry::TransactionExecutor;
use super::transaction::Transaction;
use super::types::{AccessMode, Bookmarks};

// ============================================================================
// SessionConfig - 세션 설정
// ============================================================================

/// 세션 설정
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// 데이터베이스 이름 (빈 문자열 = 서버 기본 데이터베이스)
    pub database: String,
    /// 기본 접근 모드
    pub default_access_mode: AccessMode,
    /// 초기 북마크
    pub bookmarks: Bookmarks,
}

impl SessionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 시작
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

// ============================================================================
// SessionConfigBuilder - 세션 설정 빌더
// ============================================================================

/// 세션 설정 빌더
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// 읽기 모드로 설정
    pub fn with_read_access(mut self) -> Self {
        self.config.default_access_mode = AccessMode::Read;
        self
    }

    /// 쓰기 모드로 설정
    pub fn with_write_access(mut self) -> Self {
        self.config.default_access_mode = AccessMode::Write;
        self
    }

    /// 북마크 설정
    pub fn with_bookmarks(mut self, bookmarks: Bookmarks) -> Self {
        self.config.bookmarks = bookmarks;
        self
    }

    /// 빌드
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

// ============================================================================
// Session - 세션
// ============================================================================

/// 데이터베이스 세션
///
/// 트랜잭션이 커밋될 때마다 북마크가 새 값으로 교체되므로, 같은 세션의
/// 다음 트랜잭션은 앞선 쓰기를 볼 수 있습니다.
///
/// # 사용 예제
///
/// ```ignore
/// let session = driver.session(SessionConfig::builder().with_database("movies").build());
///
/// let count = session
///     .write_transaction(|tx| {
///         Box::pin(async move {
///             tx.run("CREATE (m:Movie {title: 'Arrival'})").await?;
///             Ok(1)
///         })
///     })
///     .await?;
/// ```
pub struct Session {
    provider: Arc<dyn ConnectionProvider>,
    executor: TransactionExecutor,
    config: SessionConfig,
    bookmarks: Arc<Mutex<Bookmarks>>,
}

impl Session {
    /// 새 세션 생성
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        executor: TransactionExecutor,
        config: SessionConfig,
    ) -> Self {
        let bookmarks = Arc::new(Mutex::new(config.bookmarks.clone()));
        Self {
            provider,
            executor,
            config,
            bookmarks,
        }
    }

    /// 읽기 트랜잭션 함수 (재시도 포함)
    pub async fn read_transaction<T, F>(&self, work: F) -> DriverResult<T>
    where
        F: for<'t> FnMut(&'t mut Transaction) -> BoxFuture<'t, DriverResult<T>>,
    {
        self.execute_transaction(AccessMode::Read, work).await
    }

    /// 쓰기 트랜잭션 함수 (재시도 포함)
    pub async fn write_transaction<T, F>(&self, work: F) -> DriverResult<T>
    where
        F: for<'t> FnMut(&'t mut Transaction) -> BoxFuture<'t, DriverResult<T>>,
    {
        self.execute_transaction(AccessMode::Write, work).await
    }

    /// 지정 모드로 트랜잭션 함수 실행
    pub async fn execute_transaction<T, F>(&self, mode: AccessMode, work: F) -> DriverResult<T>
    where
        F: for<'t> FnMut(&'t mut Transaction) -> BoxFuture<'t, DriverResult<T>>,
    {
        let metadata = BeginMetadata {
            database: self.config.database.clone(),
            mode,
            bookmarks: Bookmarks::empty(),
        };
        self.executor
            .execute(&self.provider, metadata, Some(self.bookmarks.clone()), work)
            .await
    }

    /// 명시적 트랜잭션 시작 (재시도 없음)
    ///
    /// `mode`가 없으면 세션의 기본 접근 모드를 사용합니다.
    pub async fn begin_transaction(&self, mode: Option<AccessMode>) -> DriverResult<Transaction> {
        let metadata = BeginMetadata {
            database: self.config.database.clone(),
            mode: mode.unwrap_or(self.config.default_access_mode),
            bookmarks: self.last_bookmarks(),
        };
        let tx = Transaction::begin(self.provider.clone(), metadata).await?;
        Ok(tx.with_bookmark_sink(self.bookmarks.clone()))
    }

    /// 마지막으로 커밋된 트랜잭션의 북마크 (없으면 초기 북마크)
    pub fn last_bookmarks(&self) -> Bookmarks {
        self.bookmarks.lock().clone()
    }

    /// 데이터베이스 이름
    pub fn database(&self) -> &str {
        &self.config.database
    }

    /// 세션 설정
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.config.database)
            .field("default_access_mode", &self.config.default_access_mode)
            .field("bookmarks", &*self.bookmarks.lock())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
