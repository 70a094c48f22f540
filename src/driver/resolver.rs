//! Server Address Resolver
//!
//! 시드 주소를 실제 주소 목록으로 확장

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use super::address::ServerAddress;
use super::error::{DriverError, DriverResult};

// ============================================================================
// ServerAddressResolver - 주소 리졸버
// ============================================================================

/// 시드 주소 리졸버
pub trait ServerAddressResolver: Send + Sync + 'static {
    /// 시드 주소를 하나 이상의 주소로 확장
    fn resolve(&self, seed: &ServerAddress) -> BoxFuture<'static, DriverResult<Vec<ServerAddress>>>;
}

/// 공유 리졸버
pub type SharedResolver = Arc<dyn ServerAddressResolver>;

// ============================================================================
// IdentityResolver - 기본 리졸버
// ============================================================================

/// 시드 주소를 그대로 돌려주는 기본 리졸버
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl ServerAddressResolver for IdentityResolver {
    fn resolve(&self, seed: &ServerAddress) -> BoxFuture<'static, DriverResult<Vec<ServerAddress>>> {
        futures::future::ready(Ok(vec![seed.clone()])).boxed()
    }
}

// ============================================================================
// CustomResolver - 사용자 정의 리졸버
// ============================================================================

/// 사용자 함수로 주소를 확장하는 리졸버
///
/// 함수가 실패하거나 빈 목록을 돌려주면 설정 에러로 보고합니다.
pub struct CustomResolver<F> {
    resolve_fn: F,
}

impl<F> CustomResolver<F>
where
    F: Fn(&ServerAddress) -> BoxFuture<'static, DriverResult<Vec<ServerAddress>>> + Send + Sync + 'static,
{
    /// 새 리졸버
    pub fn new(resolve_fn: F) -> Self {
        Self { resolve_fn }
    }
}

impl<F> ServerAddressResolver for CustomResolver<F>
where
    F: Fn(&ServerAddress) -> BoxFuture<'static, DriverResult<Vec<ServerAddress>>> + Send + Sync + 'static,
{
    fn resolve(&self, seed: &ServerAddress) -> BoxFuture<'static, DriverResult<Vec<ServerAddress>>> {
        let seed = seed.clone();
        let resolved = (self.resolve_fn)(&seed);

        async move {
            match resolved.await {
                Ok(addresses) if addresses.is_empty() => Err(DriverError::configuration(format!(
                    "Resolver returned no addresses for {}",
                    seed
                ))),
                Ok(addresses) => {
                    debug!(seed = %seed, resolved = addresses.len(), "seed address resolved");
                    Ok(addresses)
                }
                Err(e) => Err(DriverError::configuration(format!(
                    "Resolver failed for {}: {}",
                    seed, e
                ))),
            }
        }
        .boxed()
    }
}

impl<F> fmt::Debug for CustomResolver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomResolver")
    }
}

// ============================================================================
// HostNameResolver - DNS 리졸버
// ============================================================================

/// 호스트 이름을 DNS로 조회하여 IP 주소 목록으로 확장하는 리졸버
#[derive(Debug, Clone, Copy, Default)]
pub struct HostNameResolver;

impl ServerAddressResolver for HostNameResolver {
    fn resolve(&self, seed: &ServerAddress) -> BoxFuture<'static, DriverResult<Vec<ServerAddress>>> {
        let seed = seed.clone();

        async move {
            let resolved = tokio::net::lookup_host(seed.to_socket_addr())
                .await
                .map_err(|e| {
                    DriverError::service_unavailable(format!("Failed to resolve {}: {}", seed, e))
                })?;

            let mut addresses: Vec<ServerAddress> = Vec::new();
            for socket in resolved {
                let address = ServerAddress::new(socket.ip().to_string(), socket.port());
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }

            if addresses.is_empty() {
                // 조회 결과가 없으면 시드를 그대로 사용
                addresses.push(seed);
            }
            Ok(addresses)
        }
        .boxed()
    }
}
