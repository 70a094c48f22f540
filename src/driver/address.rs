//! Server Address
//!
//! 서버 주소 (host:port)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{DriverError, DriverResult};

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
///
/// 호스트는 소문자로 정규화되고 IPv6 대괄호는 제거된 상태로 저장됩니다.
/// 동등성과 해시는 정규화된 `host:port` 기준이므로 풀 키, 라우팅 테이블
/// 멤버십, 리졸버 입출력에 그대로 사용할 수 있습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        let host = host
            .as_ref()
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_ascii_lowercase();
        Self { host, port }
    }

    /// `host`, `host:port`, `[ipv6]`, `[ipv6]:port` 형식 파싱
    pub fn parse(s: &str) -> DriverResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DriverError::configuration("Empty server address"));
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| DriverError::configuration(format!("Invalid server address: {}", s)))?;
            let port = match tail {
                "" => DEFAULT_PORT,
                _ => parse_port(
                    tail.strip_prefix(':')
                        .ok_or_else(|| DriverError::configuration(format!("Invalid server address: {}", s)))?,
                )?,
            };
            return Ok(Self::new(host, port));
        }

        match s.matches(':').count() {
            0 => Ok(Self::new(s, DEFAULT_PORT)),
            1 => {
                let (host, port) = s.split_once(':').unwrap_or((s, ""));
                if host.is_empty() {
                    return Err(DriverError::configuration(format!("Invalid server address: {}", s)));
                }
                Ok(Self::new(host, parse_port(port)?))
            }
            // 대괄호 없는 IPv6는 포트 없이 호스트만으로 취급
            _ => Ok(Self::new(s, DEFAULT_PORT)),
        }
    }

    /// 호스트
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 포트
    pub fn port(&self) -> u16 {
        self.port
    }

    /// IPv6 호스트 여부
    pub fn is_ipv6(&self) -> bool {
        self.host.contains(':')
    }

    /// 소켓 주소 문자열 (`TcpStream::connect` 등에 사용)
    pub fn to_socket_addr(&self) -> String {
        self.to_string()
    }
}

fn parse_port(s: &str) -> DriverResult<u16> {
    s.parse()
        .map_err(|_| DriverError::configuration(format!("Invalid port: {}", s)))
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv6() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ServerAddress {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}
