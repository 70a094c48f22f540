//! Transaction Retry
//!
//! 트랜잭션 함수를 지수 백오프로 재시도하는 실행기

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use super::clock::SharedClock;
use super::connection::BeginMetadata;
use super::error::DriverResult;
use super::provider::ConnectionProvider;
use super::transaction::Transaction;
use super::types::Bookmarks;

// ============================================================================
// RetryConfig - 재시도 설정
// ============================================================================

/// 재시도 설정
///
/// | 필드 | 기본값 |
/// |------|--------|
/// | `initial_retry_delay` | 1초 |
/// | `multiplier` | 2.0 |
/// | `jitter_factor` | 0.2 |
/// | `max_retry_delay` | 10초 |
/// | `max_transaction_retry_time` | 30초 |
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// 첫 재시도 전 대기
    pub initial_retry_delay: Duration,
    /// 시도마다 대기 시간에 곱하는 배수
    pub multiplier: f64,
    /// 대기 시간 흔들기 비율 (±)
    pub jitter_factor: f64,
    /// 대기 시간 상한
    pub max_retry_delay: Duration,
    /// 전체 재시도 예산 (첫 시도부터의 경과 시간)
    pub max_transaction_retry_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter_factor: 0.2,
            max_retry_delay: Duration::from_secs(10),
            max_transaction_retry_time: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 첫 재시도 대기 설정
    pub fn with_initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }

    /// 배수 설정
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// 흔들기 비율 설정
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// 대기 시간 상한 설정
    pub fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    /// 전체 재시도 예산 설정
    pub fn with_max_transaction_retry_time(mut self, time: Duration) -> Self {
        self.max_transaction_retry_time = time;
        self
    }

    /// 이전 대기 시간에서 다음 기본 대기 시간 계산 (흔들기 전)
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let next = delay.as_secs_f64() * multiplier;
        if next >= self.max_retry_delay.as_secs_f64() {
            self.max_retry_delay
        } else {
            Duration::from_secs_f64(next)
        }
    }

    /// 기본 대기 시간에 흔들기 적용
    pub fn jittered(&self, delay: Duration) -> Duration {
        let base = delay.as_secs_f64();
        let jitter = base * self.jitter_factor.clamp(0.0, 1.0);
        if jitter.is_nan() || jitter <= 0.0 {
            return delay;
        }
        let offset = rand::thread_rng().gen_range(-jitter..=jitter);
        Duration::from_secs_f64((base + offset).max(0.0))
    }
}

// ============================================================================
// TransactionExecutor - 재시도 실행기
// ============================================================================

/// 트랜잭션 함수 실행기
///
/// 매 시도마다 연결을 새로 획득하고 트랜잭션을 시작한 뒤 작업을 실행하고 커밋합니다.
/// 재시도 가능한 에러는 예산이 남아 있는 동안 백오프 후 다시 시도하며,
/// 그 외 에러는 즉시 반환합니다. 실행기 자체에는 시도 간 공유 상태가 없습니다.
#[derive(Clone)]
pub struct TransactionExecutor {
    config: RetryConfig,
    clock: SharedClock,
}

impl TransactionExecutor {
    /// 새 실행기 생성
    pub fn new(config: RetryConfig, clock: SharedClock) -> Self {
        Self { config, clock }
    }

    /// 재시도 설정
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 작업 실행
    ///
    /// `bookmarks`는 매 시도의 BEGIN에 전달되고, 커밋이 성공하면 새 북마크로 교체됩니다.
    pub async fn execute<T, F>(
        &self,
        provider: &Arc<dyn ConnectionProvider>,
        metadata: BeginMetadata,
        bookmarks: Option<Arc<Mutex<Bookmarks>>>,
        mut work: F,
    ) -> DriverResult<T>
    where
        F: for<'t> FnMut(&'t mut Transaction) -> BoxFuture<'t, DriverResult<T>>,
    {
        let start = self.clock.now();
        let mut delay = self.config.initial_retry_delay;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let mut begin = metadata.clone();
            if let Some(bookmarks) = &bookmarks {
                begin.bookmarks = bookmarks.lock().clone();
            }

            let error = match self
                .attempt(provider, begin, bookmarks.clone(), &mut work)
                .await
            {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "transaction succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                debug!(attempt, error = %error, "transaction failed with non-retryable error");
                return Err(error);
            }

            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= self.config.max_transaction_retry_time {
                warn!(
                    attempt,
                    elapsed = ?elapsed,
                    error = %error,
                    "transaction retry time exhausted"
                );
                return Err(error);
            }

            let sleep = self.config.jittered(delay);
            warn!(attempt, delay = ?sleep, error = %error, "transaction failed, retrying");
            self.clock.sleep(sleep).await;
            delay = self.config.next_delay(delay);
        }
    }

    async fn attempt<T, F>(
        &self,
        provider: &Arc<dyn ConnectionProvider>,
        metadata: BeginMetadata,
        bookmarks: Option<Arc<Mutex<Bookmarks>>>,
        work: &mut F,
    ) -> DriverResult<T>
    where
        F: for<'t> FnMut(&'t mut Transaction) -> BoxFuture<'t, DriverResult<T>>,
    {
        let mut tx = Transaction::begin(provider.clone(), metadata).await?;
        if let Some(bookmarks) = bookmarks {
            tx = tx.with_bookmark_sink(bookmarks);
        }

        let outcome = work(&mut tx).await;
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    debug!(error = %rollback, "rollback after failed work also failed");
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for TransactionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionExecutor")
            .field("config", &self.config)
            .finish()
    }
}
