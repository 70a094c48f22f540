//! Driver Configuration
//!
//! 드라이버 설정, 인증 토큰, URI 파싱

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::address::ServerAddress;
use super::error::{DriverError, DriverResult};
use super::pool::PoolConfig;
use super::retry::RetryConfig;
use super::routing::LoadBalancingStrategy;

/// 기본 연결 풀 최대 크기
pub const DEFAULT_MAX_CONNECTION_POOL_SIZE: usize = 100;
/// 기본 연결 획득 타임아웃
pub const DEFAULT_CONNECTION_ACQUISITION_TIMEOUT: Duration = Duration::from_secs(60);
/// 기본 연결 최대 수명
pub const DEFAULT_MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(60 * 60);
/// 기본 라우팅 테이블 정리 지연
pub const DEFAULT_ROUTING_TABLE_PURGE_DELAY: Duration = Duration::from_secs(30);

// ============================================================================
// AuthToken - 인증 토큰
// ============================================================================

/// 인증 토큰
///
/// 핸드셰이크 시 [`Transport::connect`](super::connection::Transport::connect)로
/// 그대로 전달됩니다.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AuthToken {
    /// 인증 없음
    #[default]
    None,
    /// Basic 인증 (사용자명/비밀번호)
    Basic {
        username: String,
        password: String,
        realm: Option<String>,
    },
    /// Bearer 토큰
    Bearer { token: String },
}

impl AuthToken {
    /// Basic 인증 토큰 생성
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: None,
        }
    }

    /// Basic 인증 토큰 생성 (realm 포함)
    pub fn basic_with_realm(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: Some(realm.into()),
        }
    }

    /// Bearer 토큰 생성
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// 인증 없음
    pub fn none() -> Self {
        Self::None
    }

    /// 인증 스킴
    pub fn scheme(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
        }
    }
}

// 자격 증명은 로그에 남기지 않음
impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("AuthToken::None"),
            Self::Basic { username, realm, .. } => f
                .debug_struct("AuthToken::Basic")
                .field("username", username)
                .field("realm", realm)
                .finish_non_exhaustive(),
            Self::Bearer { .. } => f.debug_struct("AuthToken::Bearer").finish_non_exhaustive(),
        }
    }
}

// ============================================================================
// TrustStrategy - TLS 신뢰 전략
// ============================================================================

/// TLS 신뢰 전략
///
/// `+s` 스킴은 시스템 CA, `+ssc` 스킴은 모든 인증서를 신뢰합니다.
/// 실제 TLS 처리는 [`Connector`](super::connection::Connector) 구현의 몫입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustStrategy {
    /// 시스템 인증서 사용
    #[default]
    TrustSystemCas,
    /// 모든 인증서 신뢰 (자체 서명 인증서)
    TrustAllCertificates,
}

// ============================================================================
// UriScheme - 연결 방식
// ============================================================================

/// URI 스킴이 결정하는 연결 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriScheme {
    /// 단일 서버 직접 연결 (`bolt://`)
    Direct,
    /// 클러스터 라우팅 (`zeta4g://`, `neo4j://`)
    Routing,
}

// ============================================================================
// RoutingContext - 라우팅 컨텍스트
// ============================================================================

/// 라우팅 컨텍스트
///
/// URI 쿼리 파라미터에서 만들어지며 디스커버리 요청에 그대로 실립니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingContext {
    entries: BTreeMap<String, String>,
}

impl RoutingContext {
    /// 빈 컨텍스트
    pub fn new() -> Self {
        Self::default()
    }

    /// 쿼리 문자열 파싱 (`policy=eu&region=west`)
    pub fn parse_query(query: &str) -> DriverResult<Self> {
        let mut entries = BTreeMap::new();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                DriverError::configuration(format!("Invalid parameter: '{}' in query: '{}'", pair, query))
            })?;
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                return Err(DriverError::configuration(format!(
                    "Invalid parameter: '{}' in query: '{}'",
                    pair, query
                )));
            }
            if key == "address" {
                return Err(DriverError::configuration(
                    "The key 'address' is reserved for routing context",
                ));
            }
            if entries.insert(key.to_string(), value.to_string()).is_some() {
                return Err(DriverError::configuration(format!(
                    "Duplicated query parameters with key '{}' in query: '{}'",
                    key, query
                )));
            }
        }

        Ok(Self { entries })
    }

    /// 항목 추가
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// 시드 주소를 `address` 키로 포함한 컨텍스트
    pub fn with_address(&self, address: &ServerAddress) -> Self {
        self.clone().with("address", address.to_string())
    }

    /// 값 조회
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 항목 순회
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ============================================================================
// ParsedUri - URI 파싱 결과
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedUri {
    scheme: UriScheme,
    encrypted: bool,
    trust_strategy: TrustStrategy,
    address: ServerAddress,
    routing_context: RoutingContext,
}

fn parse_uri(uri: &str) -> DriverResult<ParsedUri> {
    let (scheme, rest) = uri
        .trim()
        .split_once("://")
        .ok_or_else(|| DriverError::configuration(format!("Invalid URI: {}", uri)))?;

    let (base, security) = match scheme.split_once('+') {
        Some((base, security)) => (base, Some(security)),
        None => (scheme, None),
    };

    let kind = match base.to_ascii_lowercase().as_str() {
        "bolt" => UriScheme::Direct,
        "zeta4g" | "neo4j" => UriScheme::Routing,
        other => {
            return Err(DriverError::configuration(format!("Unknown scheme: {}", other)));
        }
    };

    let (encrypted, trust_strategy) = match security {
        None => (false, TrustStrategy::default()),
        Some("s") => (true, TrustStrategy::TrustSystemCas),
        Some("ssc") => (true, TrustStrategy::TrustAllCertificates),
        Some(other) => {
            return Err(DriverError::configuration(format!(
                "Unknown scheme security suffix: +{}",
                other
            )));
        }
    };

    let (location, query) = match rest.split_once('?') {
        Some((location, query)) => (location, query),
        None => (rest, ""),
    };
    let authority = location.split('/').next().unwrap_or("");
    let address = ServerAddress::parse(authority)?;

    let routing_context = RoutingContext::parse_query(query)?;
    if kind == UriScheme::Direct && !routing_context.is_empty() {
        return Err(DriverError::configuration(format!(
            "Parameters are not supported with none routing scheme. Given URI: '{}'",
            uri
        )));
    }

    Ok(ParsedUri {
        scheme: kind,
        encrypted,
        trust_strategy,
        address,
        routing_context,
    })
}

// ============================================================================
// DatabaseUnavailablePolicy - 데이터베이스 불가 처리 방식
// ============================================================================

/// 서버가 `DatabaseUnavailable`을 보고했을 때의 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatabaseUnavailablePolicy {
    /// 해당 주소만 라우팅 테이블에서 제거
    #[default]
    ForgetAddress,
    /// 해당 데이터베이스의 라우팅 테이블 전체를 만료 처리
    InvalidateTable,
}

// ============================================================================
// DriverConfig - 드라이버 설정
// ============================================================================

/// 드라이버 설정
///
/// | 필드 | 기본값 |
/// |------|--------|
/// | `max_connection_pool_size` | 100 |
/// | `connection_acquisition_timeout` | 60초 |
/// | `connection_timeout` | 30초 |
/// | `max_connection_lifetime` | 1시간 |
/// | `routing_table_purge_delay` | 30초 |
/// | `retry` | [`RetryConfig::default`] |
/// | `load_balancing_strategy` | RoundRobin |
/// | `proactive_routing_refresh` | false |
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// 시드 서버 주소
    pub address: ServerAddress,
    /// 연결 방식
    pub scheme: UriScheme,
    /// 라우팅 컨텍스트 (URI 쿼리 파라미터)
    pub routing_context: RoutingContext,
    /// 인증 토큰
    pub auth: AuthToken,
    /// TLS 암호화
    pub encrypted: bool,
    /// TLS 신뢰 전략
    pub trust_strategy: TrustStrategy,
    /// 주소별 연결 풀 최대 크기
    pub max_connection_pool_size: usize,
    /// 연결 획득 타임아웃
    pub connection_acquisition_timeout: Duration,
    /// 연결 (소켓 + 핸드셰이크) 타임아웃
    pub connection_timeout: Duration,
    /// 연결 최대 수명
    pub max_connection_lifetime: Duration,
    /// 트랜잭션 재시도 설정
    pub retry: RetryConfig,
    /// User Agent
    pub user_agent: String,
    /// 참조되지 않는 만료 라우팅 테이블 정리 지연
    pub routing_table_purge_delay: Duration,
    /// 부하 분산 전략
    pub load_balancing_strategy: LoadBalancingStrategy,
    /// 라우터가 2개 미만일 때 백그라운드 갱신 여부
    pub proactive_routing_refresh: bool,
    /// 데이터베이스 불가 처리 방식
    pub database_unavailable_policy: DatabaseUnavailablePolicy,
}

impl DriverConfig {
    /// URI로 새 설정 생성
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        let parsed = parse_uri(uri)?;

        Ok(Self {
            address: parsed.address,
            scheme: parsed.scheme,
            routing_context: parsed.routing_context,
            auth,
            encrypted: parsed.encrypted,
            trust_strategy: parsed.trust_strategy,
            ..Self::default()
        })
    }

    /// 빌더 시작
    pub fn builder(uri: &str, auth: AuthToken) -> DriverResult<DriverConfigBuilder> {
        let config = Self::new(uri, auth)?;
        Ok(DriverConfigBuilder { config })
    }

    /// 라우팅 방식 여부
    pub fn is_routing(&self) -> bool {
        self.scheme == UriScheme::Routing
    }

    /// 풀 설정 도출
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.max_connection_pool_size,
            acquisition_timeout: self.connection_acquisition_timeout,
        }
    }

    /// 0으로 지정된 풀 관련 값을 기본값으로 되돌림
    pub fn sanitize(mut self) -> Self {
        if self.max_connection_pool_size == 0 {
            self.max_connection_pool_size = DEFAULT_MAX_CONNECTION_POOL_SIZE;
        }
        if self.connection_acquisition_timeout.is_zero() {
            self.connection_acquisition_timeout = DEFAULT_CONNECTION_ACQUISITION_TIMEOUT;
        }
        if self.max_connection_lifetime.is_zero() {
            self.max_connection_lifetime = DEFAULT_MAX_CONNECTION_LIFETIME;
        }
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            address: ServerAddress::default(),
            scheme: UriScheme::Direct,
            routing_context: RoutingContext::default(),
            auth: AuthToken::default(),
            encrypted: false,
            trust_strategy: TrustStrategy::default(),
            max_connection_pool_size: DEFAULT_MAX_CONNECTION_POOL_SIZE,
            connection_acquisition_timeout: DEFAULT_CONNECTION_ACQUISITION_TIMEOUT,
            connection_timeout: Duration::from_secs(30),
            max_connection_lifetime: DEFAULT_MAX_CONNECTION_LIFETIME,
            retry: RetryConfig::default(),
            user_agent: format!("Zeta4G/{}", env!("CARGO_PKG_VERSION")),
            routing_table_purge_delay: DEFAULT_ROUTING_TABLE_PURGE_DELAY,
            load_balancing_strategy: LoadBalancingStrategy::default(),
            proactive_routing_refresh: false,
            database_unavailable_policy: DatabaseUnavailablePolicy::default(),
        }
    }
}

// ============================================================================
// DriverConfigBuilder - 설정 빌더
// ============================================================================

/// 드라이버 설정 빌더
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// TLS 신뢰 전략 설정
    pub fn with_trust_strategy(mut self, strategy: TrustStrategy) -> Self {
        self.config.trust_strategy = strategy;
        self
    }

    /// 연결 풀 크기 설정
    pub fn with_max_connection_pool_size(mut self, size: usize) -> Self {
        self.config.max_connection_pool_size = size;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn with_connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_acquisition_timeout = timeout;
        self
    }

    /// 연결 타임아웃 설정
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// 연결 최대 수명 설정
    pub fn with_max_connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_connection_lifetime = lifetime;
        self
    }

    /// 최대 트랜잭션 재시도 시간 설정
    pub fn with_max_transaction_retry_time(mut self, time: Duration) -> Self {
        self.config.retry.max_transaction_retry_time = time;
        self
    }

    /// 재시도 설정 전체 교체
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// User Agent 설정
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// 라우팅 테이블 정리 지연 설정
    pub fn with_routing_table_purge_delay(mut self, delay: Duration) -> Self {
        self.config.routing_table_purge_delay = delay;
        self
    }

    /// 부하 분산 전략 설정
    pub fn with_load_balancing_strategy(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.config.load_balancing_strategy = strategy;
        self
    }

    /// 라우터 부족 시 백그라운드 갱신 설정
    pub fn with_proactive_routing_refresh(mut self, enabled: bool) -> Self {
        self.config.proactive_routing_refresh = enabled;
        self
    }

    /// 데이터베이스 불가 처리 방식 설정
    pub fn with_database_unavailable_policy(mut self, policy: DatabaseUnavailablePolicy) -> Self {
        self.config.database_unavailable_policy = policy;
        self
    }

    /// 빌드
    pub fn build(self) -> DriverConfig {
        self.config.sanitize()
    }
}

// ============================================================================
// Tests
// ============================================================================
