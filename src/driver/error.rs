//! Driver Error Types
//!
//! 드라이버 에러 정의

use std::io;
use std::time::Duration;

use thiserror::Error;

// ============================================================================
// Error Codes
// ============================================================================

/// 서비스 불가 코드
pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailable";
/// 세션 만료 코드
pub const SESSION_EXPIRED: &str = "SessionExpired";
/// 프로토콜 에러 코드
pub const PROTOCOL_ERROR: &str = "ProtocolError";

const TRANSIENT_PREFIX: &str = "Neo.TransientError.";
const SECURITY_PREFIX: &str = "Neo.ClientError.Security.";
const DATABASE_PREFIX: &str = "Neo.DatabaseError.";

/// 데이터베이스 일시 불가 (주소 forget 대상)
pub const DATABASE_UNAVAILABLE_CODE: &str = "Neo.TransientError.General.DatabaseUnavailable";
/// 리더가 아닌 서버에 쓰기 시도
pub const NOT_A_LEADER_CODE: &str = "Neo.ClientError.Cluster.NotALeader";
/// 읽기 전용 데이터베이스에 쓰기 시도
pub const FORBIDDEN_ON_READ_ONLY_DATABASE_CODE: &str =
    "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase";
/// 라우팅 프로시저가 없는 서버 (클러스터 아님)
pub const PROCEDURE_NOT_FOUND_CODE: &str = "Neo.ClientError.Procedure.ProcedureNotFound";
/// 존재하지 않는 데이터베이스
pub const DATABASE_NOT_FOUND_CODE: &str = "Neo.ClientError.Database.DatabaseNotFound";

// 트랜지언트로 분류되지만 재시도하면 안 되는 코드
const TERMINATED_CODE: &str = "Neo.TransientError.Transaction.Terminated";
const LOCK_CLIENT_STOPPED_CODE: &str = "Neo.TransientError.Transaction.LockClientStopped";

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 필요한 역할의 서버에 도달할 수 없음
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// 라우팅 테이블이 소진되었거나 세션 도중 무효화됨
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// 잘못된 라우팅 응답 등 프로토콜 위반
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 재시도 가능한 서버 에러
    #[error("{code}: {message}")]
    Transient { code: String, message: String },

    /// 클라이언트 에러 (구문 오류 등)
    #[error("{code}: {message}")]
    Client { code: String, message: String },

    /// 인증/권한 에러
    #[error("{code}: {message}")]
    Security { code: String, message: String },

    /// 서버 내부 데이터베이스 에러
    #[error("{code}: {message}")]
    Database { code: String, message: String },

    /// 연결 획득 타임아웃
    #[error("Connection acquisition timed out in {0:?}")]
    AcquisitionTimeout(Duration),

    /// 닫힌 풀
    #[error("Pool is closed, it is no longer able to acquire connections")]
    PoolClosed,

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// 서비스 불가 에러 생성
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// 세션 만료 에러 생성
    pub fn session_expired(msg: impl Into<String>) -> Self {
        Self::SessionExpired(msg.into())
    }

    /// 프로토콜 에러 생성
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 서버가 보낸 에러 코드를 분류하여 생성
    ///
    /// | 코드 | 분류 |
    /// |------|------|
    /// | `Neo.TransientError.*` | [`DriverError::Transient`] |
    /// | `Neo.ClientError.Security.*` | [`DriverError::Security`] |
    /// | `Neo.DatabaseError.*` | [`DriverError::Database`] |
    /// | 그 외 | [`DriverError::Client`] |
    pub fn server(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();

        if code.starts_with(TRANSIENT_PREFIX) {
            Self::Transient { code, message }
        } else if code.starts_with(SECURITY_PREFIX) {
            Self::Security { code, message }
        } else if code.starts_with(DATABASE_PREFIX) {
            Self::Database { code, message }
        } else {
            Self::Client { code, message }
        }
    }

    /// 안정적인 기계 판독용 코드
    pub fn code(&self) -> &str {
        match self {
            Self::ServiceUnavailable(_) => SERVICE_UNAVAILABLE,
            Self::SessionExpired(_) => SESSION_EXPIRED,
            Self::Protocol(_) => PROTOCOL_ERROR,
            Self::Transient { code, .. }
            | Self::Client { code, .. }
            | Self::Security { code, .. }
            | Self::Database { code, .. } => code,
            Self::AcquisitionTimeout(_) => "AcquisitionTimeout",
            Self::PoolClosed => "PoolClosed",
            Self::Configuration(_) => "ConfigurationError",
            Self::Io(_) => SERVICE_UNAVAILABLE,
        }
    }

    /// 사람이 읽는 메시지 (서버 메시지는 변형하지 않음)
    pub fn message(&self) -> String {
        match self {
            Self::ServiceUnavailable(msg)
            | Self::SessionExpired(msg)
            | Self::Protocol(msg)
            | Self::Configuration(msg) => msg.clone(),
            Self::Transient { message, .. }
            | Self::Client { message, .. }
            | Self::Security { message, .. }
            | Self::Database { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) | Self::SessionExpired(_) => true,
            Self::Transient { code, .. } => {
                code != TERMINATED_CODE && code != LOCK_CLIENT_STOPPED_CODE
            }
            _ => false,
        }
    }

    /// 해당 주소를 라우팅 테이블에서 제거해야 하는 에러인지 여부
    ///
    /// 연결 실패, 서버 불가, 데이터베이스 불가, 리더 아님.
    pub fn is_address_failure(&self) -> bool {
        match self {
            Self::ServiceUnavailable(_) | Self::Io(_) => true,
            Self::Transient { code, .. } => code == DATABASE_UNAVAILABLE_CODE,
            Self::Client { code, .. } => is_write_rejection(code),
            _ => false,
        }
    }

    /// 쓰기 서버가 더 이상 리더가 아님을 나타내는지 여부
    pub fn is_write_rejection(&self) -> bool {
        matches!(self, Self::Client { code, .. } if is_write_rejection(code))
    }

    /// 데이터베이스 불가 에러 여부
    pub fn is_database_unavailable(&self) -> bool {
        matches!(self, Self::Transient { code, .. } if code == DATABASE_UNAVAILABLE_CODE)
    }
}

fn is_write_rejection(code: &str) -> bool {
    code == NOT_A_LEADER_CODE || code == FORBIDDEN_ON_READ_ONLY_DATABASE_CODE
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================
