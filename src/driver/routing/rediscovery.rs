//! 디스커버리
//!
//! 라우터에 라우팅 프로시저를 호출하고 응답을 검증하여 라우팅 테이블을 만듭니다.

use std::time::{Duration, Instant};

use tracing::debug;

use super::table::{expiration_after, RoutingTable, ServerRole};
use crate::driver::address::ServerAddress;
use crate::driver::config::RoutingContext;
use crate::driver::connection::PooledConnection;
use crate::driver::error::{
    DriverError, DriverResult, DATABASE_NOT_FOUND_CODE, PROCEDURE_NOT_FOUND_CODE,
};
use crate::driver::types::{Record, Value};

// ============================================================================
// RoutingInfo - 라우팅 응답
// ============================================================================

/// 검증된 라우팅 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingInfo {
    /// 유효 시간
    pub ttl: Duration,
    /// 라우터 목록
    pub routers: Vec<ServerAddress>,
    /// 리더 목록
    pub readers: Vec<ServerAddress>,
    /// 라이터 목록
    pub writers: Vec<ServerAddress>,
}

impl RoutingInfo {
    /// 라우팅 프로시저 결과 레코드 파싱
    ///
    /// 레코드는 정확히 하나여야 하며 `ttl`(정수)과 `servers`
    /// (`{addresses: [..], role: ROUTE|READ|WRITE}` 목록)를 가져야 합니다.
    /// 라우터가 없으면 거부하고, 리더가 없으면 `bootstrap`이 아닐 때만 거부합니다.
    /// 라이터가 없는 응답(읽기 전용 클러스터)은 허용됩니다.
    pub fn from_records(
        records: &[Record],
        router: &ServerAddress,
        bootstrap: bool,
    ) -> DriverResult<Self> {
        let record = match records {
            [] => {
                return Err(DriverError::protocol(format!(
                    "Received no records from router {}",
                    router
                )));
            }
            [record] => record,
            _ => {
                return Err(DriverError::protocol(format!(
                    "Illegal response from router {}. Received {} records but expected only one",
                    router,
                    records.len()
                )));
            }
        };

        let ttl = match record.get("ttl") {
            None => {
                return Err(DriverError::protocol(format!(
                    "TTL is missing in routing response from router {}",
                    router
                )));
            }
            Some(value) => value.as_int().ok_or_else(|| {
                DriverError::protocol(format!(
                    "Unable to parse TTL entry from router {} from record: {}",
                    router, value
                ))
            })?,
        };

        let servers = record
            .get("servers")
            .and_then(Value::as_list)
            .ok_or_else(|| {
                DriverError::protocol(format!(
                    "Unable to parse servers entry from router {}",
                    router
                ))
            })?;

        let mut info = RoutingInfo {
            ttl: Duration::from_secs(ttl.max(0) as u64),
            routers: Vec::new(),
            readers: Vec::new(),
            writers: Vec::new(),
        };

        for server in servers {
            let (role, addresses) = parse_server_entry(server).ok_or_else(|| {
                DriverError::protocol(format!(
                    "Unable to parse servers entry from router {}: {}",
                    router, server
                ))
            })?;

            let list = match role {
                ServerRole::Route => &mut info.routers,
                ServerRole::Read => &mut info.readers,
                ServerRole::Write => &mut info.writers,
            };
            for address in addresses {
                if !list.contains(&address) {
                    list.push(address);
                }
            }
        }

        if info.routers.is_empty() {
            return Err(DriverError::protocol(format!(
                "Received no routers from router {}",
                router
            )));
        }
        if info.readers.is_empty() && !bootstrap {
            return Err(DriverError::protocol(format!(
                "Received no readers from router {}",
                router
            )));
        }

        Ok(info)
    }

    /// 라우팅 테이블로 변환 (`expiration = now + ttl`)
    pub fn into_table(self, database: impl Into<String>, now: Instant) -> RoutingTable {
        RoutingTable {
            database: database.into(),
            routers: self.routers,
            readers: self.readers,
            writers: self.writers,
            expiration: expiration_after(now, self.ttl),
        }
    }
}

fn parse_server_entry(server: &Value) -> Option<(ServerRole, Vec<ServerAddress>)> {
    let map = server.as_map()?;
    let role = ServerRole::parse(map.get("role")?.as_str()?)?;
    let addresses = map
        .get("addresses")?
        .as_list()?
        .iter()
        .map(|a| a.as_str().and_then(|s| ServerAddress::parse(s).ok()))
        .collect::<Option<Vec<_>>>()?;
    Some((role, addresses))
}

// ============================================================================
// LookupFailure - 디스커버리 실패 분류
// ============================================================================

/// 라우터 하나에 대한 디스커버리 실패
#[derive(Debug)]
pub enum LookupFailure {
    /// 다른 라우터를 시도해도 소용없음 (즉시 호출자에게 보고)
    Fatal(DriverError),
    /// 다음 후보 라우터를 시도
    TryNext(DriverError),
}

impl LookupFailure {
    /// 라우터가 보고한 에러 분류
    ///
    /// 라우팅 프로시저가 없는 서버는 클러스터가 아니므로 `ServiceUnavailable`로,
    /// 존재하지 않는 데이터베이스와 인증 에러는 그대로 즉시 보고합니다.
    pub fn classify(error: DriverError, router: &ServerAddress) -> Self {
        let fatal = match &error {
            DriverError::Client { code, .. } if code == PROCEDURE_NOT_FOUND_CODE => {
                return Self::Fatal(DriverError::service_unavailable(format!(
                    "Server at {} can't perform routing. Make sure you are connecting to a causal cluster",
                    router
                )));
            }
            DriverError::Client { code, .. } => code == DATABASE_NOT_FOUND_CODE,
            DriverError::Security { .. } | DriverError::Configuration(_) => true,
            _ => false,
        };

        if fatal {
            Self::Fatal(error)
        } else {
            Self::TryNext(error)
        }
    }
}

// ============================================================================
// Rediscovery - 디스커버리 요청
// ============================================================================

/// 라우터 하나에 대한 디스커버리 요청
#[derive(Debug, Clone)]
pub struct Rediscovery {
    context: RoutingContext,
}

impl Rediscovery {
    /// 라우팅 컨텍스트로 생성
    pub fn new(context: RoutingContext) -> Self {
        Self { context }
    }

    /// 라우터에서 라우팅 정보 조회
    pub async fn lookup(
        &self,
        conn: &mut PooledConnection,
        database: &str,
        bootstrap: bool,
    ) -> DriverResult<RoutingInfo> {
        let router = conn.address().clone();
        let records = conn.transport_mut().route(database, &self.context).await?;

        let info = RoutingInfo::from_records(&records, &router, bootstrap)?;
        debug!(
            router = %router,
            database,
            ttl = ?info.ttl,
            routers = info.routers.len(),
            readers = info.readers.len(),
            writers = info.writers.len(),
            "routing table received"
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn router() -> ServerAddress {
        ServerAddress::new("router", 7687)
    }

    fn server(role: &str, addresses: &[&str]) -> Value {
        let mut map = HashMap::new();
        map.insert("role".to_string(), Value::from(role));
        map.insert(
            "addresses".to_string(),
            Value::List(addresses.iter().map(|a| Value::from(*a)).collect()),
        );
        Value::Map(map)
    }

    fn record(ttl: Value, servers: Vec<Value>) -> Record {
        Record::from_pairs([("ttl", ttl), ("servers", Value::List(servers))])
    }

    fn full_record(ttl: i64) -> Record {
        record(
            Value::Integer(ttl),
            vec![
                server("ROUTE", &["r1:7687", "r2:7687"]),
                server("READ", &["a:7687", "b:7687"]),
                server("WRITE", &["w1:7687"]),
            ],
        )
    }

    #[test]
    fn test_parse_valid_response() {
        let info = RoutingInfo::from_records(&[full_record(300)], &router(), false).unwrap();
        assert_eq!(info.ttl, Duration::from_secs(300));
        assert_eq!(info.routers.len(), 2);
        assert_eq!(info.readers[1], ServerAddress::new("b", 7687));
        assert_eq!(info.writers, vec![ServerAddress::new("w1", 7687)]);

        let now = Instant::now();
        let table = info.into_table("db", now);
        assert_eq!(table.expiration, now + Duration::from_secs(300));
        assert_eq!(table.database, "db");
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let info = RoutingInfo::from_records(&[full_record(i64::MAX)], &router(), false).unwrap();
        assert_eq!(info.ttl, Duration::from_secs(i64::MAX as u64));

        let now = Instant::now();
        let table = info.into_table("", now);
        assert!(table.expiration > now + Duration::from_secs(300));
        assert!(!table.is_expired(now));
        assert!(!table.is_expired_for(Duration::MAX, now));
    }

    #[test]
    fn test_negative_ttl_is_clamped() {
        let info = RoutingInfo::from_records(&[full_record(-5)], &router(), false).unwrap();
        assert_eq!(info.ttl, Duration::ZERO);
    }

    #[test]
    fn test_reject_record_count() {
        let err = RoutingInfo::from_records(&[], &router(), false).unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));

        let err = RoutingInfo::from_records(&[full_record(1), full_record(1)], &router(), false)
            .unwrap_err();
        assert!(matches!(err, DriverError::Protocol(_)));
    }

    #[test]
    fn test_reject_bad_ttl() {
        let missing = Record::from_pairs([("servers", Value::List(vec![server("ROUTE", &["r1"])]))]);
        assert!(RoutingInfo::from_records(&[missing], &router(), true).is_err());

        let unparsable = record(Value::from("soon"), vec![server("ROUTE", &["r1"])]);
        let err = RoutingInfo::from_records(&[unparsable], &router(), true).unwrap_err();
        assert!(err.message().contains("Unable to parse TTL"));
    }

    #[test]
    fn test_reject_bad_servers() {
        let missing = Record::from_pairs([("ttl", Value::Integer(1))]);
        assert!(RoutingInfo::from_records(&[missing], &router(), true).is_err());

        let not_a_map = record(Value::Integer(1), vec![Value::from("r1:7687")]);
        assert!(RoutingInfo::from_records(&[not_a_map], &router(), true).is_err());

        let bad_role = record(Value::Integer(1), vec![server("LEADER", &["r1"])]);
        assert!(RoutingInfo::from_records(&[bad_role], &router(), true).is_err());

        let bad_address = record(Value::Integer(1), vec![server("ROUTE", &["r1:notaport"])]);
        assert!(RoutingInfo::from_records(&[bad_address], &router(), true).is_err());
    }

    #[test]
    fn test_reject_zero_routers() {
        let no_routers = record(
            Value::Integer(300),
            vec![server("READ", &["a"]), server("WRITE", &["w"])],
        );
        let err = RoutingInfo::from_records(&[no_routers], &router(), true).unwrap_err();
        assert!(err.message().contains("no routers"));
    }

    #[test]
    fn test_zero_readers_only_allowed_for_bootstrap() {
        let no_readers = record(
            Value::Integer(300),
            vec![server("ROUTE", &["r1"]), server("WRITE", &["w"])],
        );
        assert!(RoutingInfo::from_records(&[no_readers.clone()], &router(), false).is_err());
        assert!(RoutingInfo::from_records(&[no_readers], &router(), true).is_ok());
    }

    #[test]
    fn test_classify_lookup_failures() {
        let failure = LookupFailure::classify(
            DriverError::server(PROCEDURE_NOT_FOUND_CODE, "no such procedure"),
            &router(),
        );
        assert!(matches!(failure, LookupFailure::Fatal(DriverError::ServiceUnavailable(_))));

        let failure = LookupFailure::classify(
            DriverError::server(DATABASE_NOT_FOUND_CODE, "unknown database"),
            &router(),
        );
        assert!(matches!(failure, LookupFailure::Fatal(DriverError::Client { .. })));

        let failure = LookupFailure::classify(
            DriverError::server("Neo.ClientError.Security.Unauthorized", "denied"),
            &router(),
        );
        assert!(matches!(failure, LookupFailure::Fatal(DriverError::Security { .. })));

        let failure = LookupFailure::classify(DriverError::service_unavailable("down"), &router());
        assert!(matches!(failure, LookupFailure::TryNext(_)));

        let failure = LookupFailure::classify(DriverError::protocol("no routers"), &router());
        assert!(matches!(failure, LookupFailure::TryNext(_)));
    }

    #[test]
    fn test_zero_writers_accepted() {
        let read_only = record(
            Value::Integer(300),
            vec![server("ROUTE", &["r1"]), server("READ", &["a"])],
        );
        let info = RoutingInfo::from_records(&[read_only], &router(), false).unwrap();
        assert!(info.writers.is_empty());
    }
}
