//! 라우팅 모듈
//!
//! 클러스터 환경에서 자동 라우팅을 지원합니다.
//!
//! # 개요
//!
//! `zeta4g://` (또는 `neo4j://`) 스킴을 사용하면 라우팅 연결 제공자가 만들어집니다.
//! 데이터베이스마다 라우팅 테이블을 유지하며, 읽기 트랜잭션은 리더(READ) 목록으로,
//! 쓰기 트랜잭션은 라이터(WRITE) 목록으로 라우팅됩니다.
//!
//! 테이블이 만료되었거나 필요한 목록이 비어 있으면 알려진 라우터, 그 다음
//! 시드 주소 순서로 디스커버리를 수행합니다.
//!
//! # 예시
//!
//! ```ignore
//! use zeta4g_routing::driver::routing::RoutingConnectionProvider;
//! use zeta4g_routing::driver::{AccessMode, ConnectionProvider};
//!
//! let provider = RoutingConnectionProvider::new(&config, connector, resolver, clock);
//!
//! // 쓰기 연결 (라이터로 라우팅)
//! let conn = provider.acquire_connection("movies", AccessMode::Write).await?;
//! ```

mod policy;
mod provider;
mod rediscovery;
mod table;

pub use policy::{LoadBalancingStrategy, ServerSelector};
pub use provider::RoutingConnectionProvider;
pub use rediscovery::{LookupFailure, Rediscovery, RoutingInfo};
pub use table::{RoutingTable, ServerRole};
