//! Connection
//!
//! 전송 계층 추상화와 풀링된 연결
//!
//! 와이어 프로토콜은 이 크레이트 밖에 있으며 [`Connector`] / [`Transport`]
//! 트레이트를 통해서만 사용됩니다.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::address::ServerAddress;
use super::config::{AuthToken, RoutingContext};
use super::error::{DriverError, DriverResult};
use super::types::{AccessMode, Bookmarks, Query, Record};

// ============================================================================
// IdleObserver - 유휴 연결 관찰자
// ============================================================================

/// 유휴 연결 관찰자
///
/// 풀에 유휴 상태로 머무는 동안 전송 계층이 보고하는 에러나 종료를
/// 전달받습니다. 연결당 최대 하나만 설치됩니다.
#[derive(Clone)]
pub struct IdleObserver {
    callback: Arc<dyn Fn(&DriverError) + Send + Sync>,
}

impl IdleObserver {
    /// 새 관찰자
    pub fn new(callback: impl Fn(&DriverError) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// 에러 통지
    pub fn notify(&self, error: &DriverError) {
        (self.callback)(error)
    }
}

impl fmt::Debug for IdleObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdleObserver")
    }
}

// ============================================================================
// BeginMetadata - BEGIN 메타데이터
// ============================================================================

/// 트랜잭션 시작 메타데이터
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeginMetadata {
    /// 대상 데이터베이스 (빈 문자열 = 기본 데이터베이스)
    pub database: String,
    /// 접근 모드
    pub mode: AccessMode,
    /// 이전 트랜잭션들의 북마크
    pub bookmarks: Bookmarks,
}

// ============================================================================
// Transport - 전송 계층
// ============================================================================

/// 단일 서버와의 전송 계층 연결
pub trait Transport: Send + 'static {
    /// 핸드셰이크와 인증
    fn connect<'a>(
        &'a mut self,
        user_agent: &'a str,
        auth: &'a AuthToken,
    ) -> BoxFuture<'a, DriverResult<()>>;

    /// 라우팅 프로시저 호출
    fn route<'a>(
        &'a mut self,
        database: &'a str,
        context: &'a RoutingContext,
    ) -> BoxFuture<'a, DriverResult<Vec<Record>>>;

    /// 트랜잭션 시작
    fn begin<'a>(&'a mut self, metadata: &'a BeginMetadata) -> BoxFuture<'a, DriverResult<()>>;

    /// 쿼리 실행
    fn run<'a>(&'a mut self, query: &'a Query) -> BoxFuture<'a, DriverResult<Vec<Record>>>;

    /// 커밋 (새 북마크 반환)
    fn commit(&mut self) -> BoxFuture<'_, DriverResult<Option<String>>>;

    /// 롤백
    fn rollback(&mut self) -> BoxFuture<'_, DriverResult<()>>;

    /// 상태 초기화
    fn reset(&mut self) -> BoxFuture<'_, DriverResult<()>>;

    /// 열린 상태 여부
    fn is_open(&self) -> bool;

    /// 유휴 관찰자 설정/해제
    fn set_idle_observer(&mut self, observer: Option<IdleObserver>);

    /// 연결 종료
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

// ============================================================================
// Connector - 전송 계층 팩토리
// ============================================================================

/// 주소로 전송 계층 연결을 여는 팩토리
///
/// `close_signal`은 연결을 소유한 쪽이 강제로 닫을 때 취소됩니다.
/// 구현체는 이를 감시하여 소켓을 닫아야 합니다.
pub trait Connector: Send + Sync + 'static {
    /// 연결 열기
    fn open(
        &self,
        address: &ServerAddress,
        close_signal: CancellationToken,
    ) -> BoxFuture<'static, DriverResult<Box<dyn Transport>>>;
}

// ============================================================================
// PooledConnection - 풀링된 연결
// ============================================================================

/// 풀링된 연결
pub struct PooledConnection {
    /// 연결 ID
    id: u64,
    /// 서버 주소
    address: ServerAddress,
    /// 생성 시간
    created_at: Instant,
    /// 강제 종료 신호
    close_signal: CancellationToken,
    /// 전송 계층
    transport: Box<dyn Transport>,
}

impl PooledConnection {
    pub(crate) fn new(
        id: u64,
        address: ServerAddress,
        created_at: Instant,
        close_signal: CancellationToken,
        transport: Box<dyn Transport>,
    ) -> Self {
        Self {
            id,
            address,
            created_at,
            close_signal,
            transport,
        }
    }

    /// 연결 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// 생성 시간
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// 열린 상태 여부
    pub fn is_open(&self) -> bool {
        !self.close_signal.is_cancelled() && self.transport.is_open()
    }

    /// 강제 종료 신호
    pub fn close_signal(&self) -> &CancellationToken {
        &self.close_signal
    }

    /// 전송 계층 (가변)
    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    pub(crate) fn set_idle_observer(&mut self, observer: Option<IdleObserver>) {
        self.transport.set_idle_observer(observer);
    }

    pub(crate) fn into_transport(self) -> Box<dyn Transport> {
        self.transport
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("open", &self.is_open())
            .field("age", &self.created_at.elapsed())
            .finish()
    }
}
