//! 라우팅 테이블
//!
//! 데이터베이스 하나에 대한 역할별 서버 목록과 만료 시각을 관리합니다.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use crate::driver::address::ServerAddress;
use crate::driver::types::AccessMode;

/// 만료 시각 계산에 쓰는 최대 TTL (약 100년)
pub(crate) const MAX_ROUTING_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + ttl`. 더하기가 넘치면 표현 가능한 먼 미래로 고정
pub(crate) fn expiration_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(MAX_ROUTING_TTL))
        .or_else(|| now.checked_add(Duration::from_secs(365 * 24 * 60 * 60)))
        .unwrap_or(now)
}

/// 서버 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRole {
    /// 라우팅 테이블 제공자
    Route,
    /// 쓰기 트랜잭션 처리 (리더)
    Write,
    /// 읽기 트랜잭션 처리 (팔로워)
    Read,
}

impl ServerRole {
    /// 문자열에서 역할 파싱
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ROUTE" => Some(Self::Route),
            "WRITE" => Some(Self::Write),
            "READ" => Some(Self::Read),
            _ => None,
        }
    }

    /// 역할을 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Route => "ROUTE",
            Self::Write => "WRITE",
            Self::Read => "READ",
        }
    }
}

impl From<AccessMode> for ServerRole {
    fn from(mode: AccessMode) -> Self {
        match mode {
            AccessMode::Read => Self::Read,
            AccessMode::Write => Self::Write,
        }
    }
}

/// 라우팅 테이블
///
/// 각 목록에는 중복이 없습니다. 성공한 디스커버리마다
/// `expiration = now + ttl`로 통째로 교체됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    /// 데이터베이스 이름 (빈 문자열 = 기본 데이터베이스)
    pub database: String,
    /// 라우터 목록 (라우팅 테이블 조회용)
    pub routers: Vec<ServerAddress>,
    /// 리더 목록 (읽기 트랜잭션용)
    pub readers: Vec<ServerAddress>,
    /// 라이터 목록 (쓰기 트랜잭션용)
    pub writers: Vec<ServerAddress>,
    /// 만료 시각
    pub expiration: Instant,
}

impl RoutingTable {
    /// 비어 있고 이미 만료된 테이블
    pub fn new(database: impl Into<String>, now: Instant) -> Self {
        Self {
            database: database.into(),
            routers: Vec::new(),
            readers: Vec::new(),
            writers: Vec::new(),
            expiration: now,
        }
    }

    /// 역할별 서버 추가 (중복 무시)
    pub fn add_server(&mut self, role: ServerRole, address: ServerAddress) {
        let list = self.list_mut(role);
        if !list.contains(&address) {
            list.push(address);
        }
    }

    fn list_mut(&mut self, role: ServerRole) -> &mut Vec<ServerAddress> {
        match role {
            ServerRole::Route => &mut self.routers,
            ServerRole::Read => &mut self.readers,
            ServerRole::Write => &mut self.writers,
        }
    }

    /// 역할별 서버 목록
    pub fn servers(&self, role: ServerRole) -> &[ServerAddress] {
        match role {
            ServerRole::Route => &self.routers,
            ServerRole::Read => &self.readers,
            ServerRole::Write => &self.writers,
        }
    }

    /// 만료 여부
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expiration
    }

    /// 접근 모드에 대해 갱신이 필요한지 여부 (만료되었거나 해당 목록이 비었음)
    pub fn is_stale_for(&self, mode: AccessMode, now: Instant) -> bool {
        self.is_expired(now) || self.servers(mode.into()).is_empty()
    }

    /// 라우터가 2개 미만인지 여부 (선제적 갱신 힌트)
    pub fn is_stale_for_routing(&self) -> bool {
        self.routers.len() < 2
    }

    /// 만료 후 `delay`가 지났는지 여부 (레지스트리 정리 대상)
    pub fn is_expired_for(&self, delay: Duration, now: Instant) -> bool {
        match self.expiration.checked_add(delay) {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// 맨 앞 주소를 꺼내 맨 뒤로 보냄 (라운드 로빈)
    pub fn rotate(&mut self, role: ServerRole) -> Option<ServerAddress> {
        let list = self.list_mut(role);
        if list.is_empty() {
            return None;
        }
        list.rotate_left(1);
        list.last().cloned()
    }

    /// 특정 주소를 맨 뒤로 보냄
    pub fn move_to_back(&mut self, role: ServerRole, address: &ServerAddress) {
        let list = self.list_mut(role);
        if let Some(pos) = list.iter().position(|a| a == address) {
            let address = list.remove(pos);
            list.push(address);
        }
    }

    /// 주소를 모든 목록에서 제거
    pub fn forget(&mut self, address: &ServerAddress) {
        self.routers.retain(|a| a != address);
        self.readers.retain(|a| a != address);
        self.writers.retain(|a| a != address);
    }

    /// 라우터 목록에서만 제거
    pub fn forget_router(&mut self, address: &ServerAddress) {
        self.routers.retain(|a| a != address);
    }

    /// 즉시 만료 처리
    pub fn invalidate(&mut self, now: Instant) {
        self.expiration = now;
    }

    /// 테이블에 등장하는 모든 주소
    pub fn all_servers(&self) -> BTreeSet<ServerAddress> {
        self.routers
            .iter()
            .chain(&self.readers)
            .chain(&self.writers)
            .cloned()
            .collect()
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RoutingTable[database={}, routers=[{}], readers=[{}], writers=[{}]]",
            if self.database.is_empty() { "<default>" } else { self.database.as_str() },
            join_addresses(&self.routers),
            join_addresses(&self.readers),
            join_addresses(&self.writers),
        )
    }
}

fn join_addresses(list: &[ServerAddress]) -> String {
    list.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
