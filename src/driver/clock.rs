//! Clock
//!
//! 시간 소스 추상화 (재시도 백오프, 라우팅 테이블 만료, 연결 수명)

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

// ============================================================================
// Clock - 시간 소스
// ============================================================================

/// 시간 소스
pub trait Clock: Send + Sync + 'static {
    /// 현재 시각
    fn now(&self) -> Instant;

    /// 지정 시간 대기
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// 공유 시간 소스
pub type SharedClock = Arc<dyn Clock>;

/// 실제 시간 (tokio 타이머)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

// ============================================================================
// ManualClock - 수동 시간
// ============================================================================

/// 수동으로 진행하는 시간
///
/// `sleep`은 즉시 완료되며 요청된 시간만큼 시각을 앞당기고 기록합니다.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    base: Instant,
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    /// 새 수동 시간
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState {
                base: Instant::now(),
                offset: Duration::ZERO,
                sleeps: Vec::new(),
            })),
        }
    }

    /// 시간 진행
    pub fn advance(&self, duration: Duration) {
        self.inner.lock().offset += duration;
    }

    /// 생성 이후 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().offset
    }

    /// 지금까지 요청된 sleep 목록
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner.lock().sleeps.clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let state = self.inner.lock();
        state.base + state.offset
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        {
            let mut state = self.inner.lock();
            state.offset += duration;
            state.sleeps.push(duration);
        }
        futures::future::ready(()).boxed()
    }
}
