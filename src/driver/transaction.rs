//! Transaction API
//!
//! 풀에서 획득한 연결 하나를 소유하는 명시적 트랜잭션

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::address::ServerAddress;
use super::connection::BeginMetadata;
use super::error::{DriverError, DriverResult};
use super::provider::{Connection, ConnectionProvider};
use super::types::{AccessMode, Bookmarks, Query, Record};

const TRANSACTION_CLOSED_CODE: &str = "Neo.ClientError.Transaction.TransactionNotFound";

// ============================================================================
// TransactionState - 트랜잭션 상태
// ============================================================================

/// 트랜잭션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// 활성 상태
    Active,
    /// 커밋됨
    Committed,
    /// 롤백됨
    RolledBack,
    /// 실패
    Failed,
}

impl TransactionState {
    /// 완료 상태 여부
    pub fn is_terminated(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

// ============================================================================
// Transaction - 트랜잭션
// ============================================================================

/// 명시적 트랜잭션
///
/// 연결 에러는 제공자에게 보고되어 실패한 주소가 라우팅 테이블에서 제거됩니다.
/// 커밋이나 롤백 없이 드롭되면 백그라운드에서 연결을 초기화한 뒤 풀에 반환합니다.
pub struct Transaction {
    /// 연결 (커밋/롤백 후 풀로 반환되면 None)
    connection: Option<Connection>,
    provider: Arc<dyn ConnectionProvider>,
    database: String,
    mode: AccessMode,
    state: TransactionState,
    /// 커밋 성공 시 새 북마크로 교체할 세션 북마크
    bookmarks: Option<Arc<Mutex<Bookmarks>>>,
}

impl Transaction {
    /// 연결을 획득하고 트랜잭션 시작
    pub async fn begin(
        provider: Arc<dyn ConnectionProvider>,
        metadata: BeginMetadata,
    ) -> DriverResult<Self> {
        let connection = provider
            .acquire_connection(&metadata.database, metadata.mode)
            .await?;

        let mut tx = Self {
            connection: Some(connection),
            provider,
            database: metadata.database.clone(),
            mode: metadata.mode,
            state: TransactionState::Active,
            bookmarks: None,
        };

        let result = match tx.connection.as_mut() {
            Some(conn) => conn.transport_mut().begin(&metadata).await,
            None => Ok(()),
        };
        if let Err(e) = result {
            return Err(tx.fail(e));
        }

        debug!(
            database = %tx.database,
            mode = %tx.mode,
            bookmarks = metadata.bookmarks.len(),
            "transaction started"
        );
        Ok(tx)
    }

    /// 커밋 북마크를 전달받을 세션 북마크 연결
    pub(crate) fn with_bookmark_sink(mut self, bookmarks: Arc<Mutex<Bookmarks>>) -> Self {
        self.bookmarks = Some(bookmarks);
        self
    }

    /// 쿼리 실행
    pub async fn run(&mut self, query: impl Into<Query>) -> DriverResult<Vec<Record>> {
        self.ensure_active()?;
        let query = query.into();

        let result = match self.connection.as_mut() {
            Some(conn) => conn.transport_mut().run(&query).await,
            None => Err(DriverError::session_expired("Transaction has no connection")),
        };
        result.map_err(|e| self.fail(e))
    }

    /// 커밋 (서버가 돌려준 북마크 반환)
    pub async fn commit(mut self) -> DriverResult<Option<String>> {
        self.ensure_active()?;

        let result = match self.connection.as_mut() {
            Some(conn) => conn.transport_mut().commit().await,
            None => Err(DriverError::session_expired("Transaction has no connection")),
        };

        match result {
            Ok(bookmark) => {
                self.state = TransactionState::Committed;
                if let Some(conn) = self.connection.take() {
                    conn.release();
                }
                if let (Some(sink), Some(bookmark)) = (&self.bookmarks, &bookmark) {
                    *sink.lock() = Bookmarks::from_values([bookmark.clone()]);
                }
                debug!(database = %self.database, bookmark = ?bookmark, "transaction committed");
                Ok(bookmark)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// 롤백
    ///
    /// 이미 실패한 트랜잭션은 연결만 초기화하고 성공으로 처리합니다.
    pub async fn rollback(mut self) -> DriverResult<()> {
        match self.state {
            TransactionState::Active => {
                let result = match self.connection.as_mut() {
                    Some(conn) => conn.transport_mut().rollback().await,
                    None => Ok(()),
                };
                match result {
                    Ok(()) => {
                        self.state = TransactionState::RolledBack;
                        if let Some(conn) = self.connection.take() {
                            conn.release();
                        }
                        Ok(())
                    }
                    Err(e) => Err(self.fail(e)),
                }
            }
            TransactionState::Failed => {
                if let Some(mut conn) = self.connection.take() {
                    reset_connection(&mut conn).await;
                }
                Ok(())
            }
            TransactionState::Committed | TransactionState::RolledBack => Ok(()),
        }
    }

    /// 트랜잭션 상태
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// 데이터베이스 (빈 문자열 = 기본 데이터베이스)
    pub fn database(&self) -> &str {
        &self.database
    }

    /// 접근 모드
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// 연결된 서버 주소
    pub fn server(&self) -> Option<&ServerAddress> {
        self.connection.as_ref().map(|conn| conn.address())
    }

    fn ensure_active(&self) -> DriverResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            state => Err(DriverError::server(
                TRANSACTION_CLOSED_CODE,
                format!("Transaction is no longer active: {:?}", state),
            )),
        }
    }

    /// 실패 처리: 상태 전환 후 제공자가 변환한 에러 반환
    fn fail(&mut self, error: DriverError) -> DriverError {
        self.state = TransactionState::Failed;
        match &self.connection {
            Some(conn) => {
                let address = conn.address().clone();
                debug!(address = %address, database = %self.database, error = %error, "transaction failed");
                self.provider.handle_connection_error(&address, &self.database, error)
            }
            None => error,
        }
    }
}

/// 연결 초기화. 실패하면 반환 시 폐기되도록 닫기 신호를 보냄
async fn reset_connection(conn: &mut Connection) {
    if conn.is_open() && conn.transport_mut().reset().await.is_ok() {
        return;
    }
    conn.close_signal().cancel();
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("database", &self.database)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let Some(mut conn) = self.connection.take() else {
            return;
        };

        // 서버 측 트랜잭션이 남아 있을 수 있으므로 초기화 후 반환
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    reset_connection(&mut conn).await;
                });
            }
            Err(_) => conn.close_signal().cancel(),
        }
    }
}
