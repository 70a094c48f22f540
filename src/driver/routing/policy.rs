//! 부하 분산 정책
//!
//! 라우팅 테이블의 역할별 목록에서 서버 하나를 고르는 전략을 정의합니다.

use rand::Rng;

use super::table::{RoutingTable, ServerRole};
use crate::driver::address::ServerAddress;

/// 부하 분산 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadBalancingStrategy {
    /// 라운드 로빈 (기본값): 맨 앞 주소를 고르고 맨 뒤로 보냄
    #[default]
    RoundRobin,
    /// 풀의 사용 중 연결이 가장 적은 주소 (동률이면 라운드 로빈 순서)
    LeastConnected,
    /// 무작위
    Random,
}

/// 서버 선택기
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerSelector {
    strategy: LoadBalancingStrategy,
}

impl ServerSelector {
    /// 새 선택기 생성
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        Self { strategy }
    }

    /// 현재 전략 조회
    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.strategy
    }

    /// 역할 목록에서 하나 선택
    ///
    /// 어떤 전략이든 고른 주소는 목록 맨 뒤로 이동합니다.
    /// `active`는 주소별 사용 중 연결 수를 돌려줍니다.
    pub fn select(
        &self,
        table: &mut RoutingTable,
        role: ServerRole,
        active: impl Fn(&ServerAddress) -> usize,
    ) -> Option<ServerAddress> {
        let servers = table.servers(role);
        if servers.is_empty() {
            return None;
        }

        let chosen = match self.strategy {
            LoadBalancingStrategy::RoundRobin => return table.rotate(role),
            LoadBalancingStrategy::LeastConnected => servers
                .iter()
                .min_by_key(|s| active(*s))
                .cloned(),
            LoadBalancingStrategy::Random => {
                let index = rand::thread_rng().gen_range(0..servers.len());
                servers.get(index).cloned()
            }
        }?;

        table.move_to_back(role, &chosen);
        Some(chosen)
    }
}
