//! Resource Pool
//!
//! 주소별 키 기반 리소스 풀
//!
//! 리소스의 생성/검증/폐기는 [`PoolHooks`]가 담당하고, 풀은 주소별 유휴 큐,
//! 사용 중 카운트, FIFO 대기열만 관리합니다. 주소 하나의 상태는 자신의
//! 락 안에서만 변경되므로 주소 A의 작업이 주소 B를 막지 않습니다.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use super::address::ServerAddress;
use super::error::{DriverError, DriverResult};

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_size` | 100 | 주소별 최대 리소스 수 (유휴 + 사용 중) |
/// | `acquisition_timeout` | 60초 | 대기열에서 기다리는 최대 시간 |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 주소별 최대 리소스 수
    pub max_size: usize,
    /// 획득 대기 타임아웃
    pub acquisition_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            acquisition_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// 빌더 패턴으로 풀 설정 생성
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// 최대 리소스 수 설정
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// 획득 타임아웃 설정
    pub fn acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquisition_timeout = timeout;
        self
    }

    /// 설정 빌드
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

// ============================================================================
// PoolHooks - 리소스 수명 주기 훅
// ============================================================================

/// 리소스 수명 주기 훅
pub trait PoolHooks<R>: Send + Sync + 'static {
    /// 새 리소스 생성
    fn create(&self, key: &ServerAddress) -> BoxFuture<'static, DriverResult<R>>;

    /// 재사용 가능 여부
    fn validate(&self, resource: &R) -> bool;

    /// 리소스 폐기 (멱등)
    fn destroy(&self, resource: R);

    /// 유휴 큐에 들어갈 때 호출
    fn install_idle_observer(&self, _resource: &mut R) {}

    /// 유휴 큐에서 나올 때 호출
    fn remove_idle_observer(&self, _resource: &mut R) {}
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// 등록된 주소 수
    pub keys: usize,
    /// 유휴 리소스 수
    pub idle: usize,
    /// 사용 중 + 생성 중 리소스 수
    pub active: usize,
    /// 대기 중인 획득 요청 수
    pub pending: usize,
    /// 총 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 총 폐기 횟수
    pub total_destroyed: u64,
    /// 총 타임아웃 횟수
    pub total_timeouts: u64,
}

// ============================================================================
// Key State - 주소별 상태
// ============================================================================

/// 대기자에게 전달되는 것
enum Grant<R> {
    /// 반환된 리소스
    Resource(R),
    /// 새 리소스를 만들 수 있는 슬롯
    Slot,
}

struct KeyInner<R> {
    idle: VecDeque<R>,
    active: usize,
    waiters: VecDeque<oneshot::Sender<Grant<R>>>,
    purged: bool,
}

impl<R> KeyInner<R> {
    fn is_unused(&self) -> bool {
        self.idle.is_empty() && self.active == 0 && self.waiters.is_empty()
    }

    /// 가장 오래된 대기자에게 전달 (받은 대기자가 없으면 되돌려줌)
    fn offer(&mut self, mut grant: Grant<R>) -> Option<Grant<R>> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.send(grant) {
                Ok(()) => return None,
                Err(returned) => grant = returned,
            }
        }
        Some(grant)
    }
}

struct KeyState<R> {
    key: ServerAddress,
    inner: Mutex<KeyInner<R>>,
}

impl<R> KeyState<R> {
    fn new(key: ServerAddress) -> Self {
        Self {
            key,
            inner: Mutex::new(KeyInner {
                idle: VecDeque::new(),
                active: 0,
                waiters: VecDeque::new(),
                purged: false,
            }),
        }
    }
}

enum Step<R> {
    Ready(R),
    Create,
    Wait(oneshot::Receiver<Grant<R>>),
    Retry,
}

// ============================================================================
// Shared - 풀 공유 상태
// ============================================================================

struct Shared<R> {
    config: PoolConfig,
    hooks: Arc<dyn PoolHooks<R>>,
    keys: Mutex<HashMap<ServerAddress, Arc<KeyState<R>>>>,
    closed: AtomicBool,
    total_acquisitions: AtomicU64,
    total_created: AtomicU64,
    total_destroyed: AtomicU64,
    total_timeouts: AtomicU64,
}

impl<R: Send + 'static> Shared<R> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn state_for(&self, key: &ServerAddress) -> Arc<KeyState<R>> {
        self.keys
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeyState::new(key.clone())))
            .clone()
    }

    fn try_acquire(&self, state: &KeyState<R>) -> (Step<R>, Vec<R>) {
        let mut invalid = Vec::new();
        let mut inner = state.inner.lock();

        if inner.purged {
            return (Step::Retry, invalid);
        }

        while let Some(mut resource) = inner.idle.pop_front() {
            if self.hooks.validate(&resource) {
                self.hooks.remove_idle_observer(&mut resource);
                inner.active += 1;
                return (Step::Ready(resource), invalid);
            }
            invalid.push(resource);
        }

        if inner.idle.len() + inner.active < self.config.max_size {
            inner.active += 1;
            return (Step::Create, invalid);
        }

        let (tx, rx) = oneshot::channel();
        inner.waiters.push_back(tx);
        (Step::Wait(rx), invalid)
    }

    fn destroy(&self, resource: R) {
        self.total_destroyed.fetch_add(1, Ordering::Relaxed);
        self.hooks.destroy(resource);
    }

    fn destroy_all(&self, resources: Vec<R>) {
        for resource in resources {
            self.destroy(resource);
        }
    }

    /// 사용이 끝난 리소스 반환
    fn release(&self, state: &Arc<KeyState<R>>, mut resource: R) {
        self.hooks.remove_idle_observer(&mut resource);
        let valid = !self.is_closed() && self.hooks.validate(&resource);

        let discarded = {
            let mut inner = state.inner.lock();
            if inner.purged || !valid {
                Some(resource)
            } else {
                match inner.offer(Grant::Resource(resource)) {
                    None => None,
                    Some(Grant::Resource(mut resource)) => {
                        inner.active -= 1;
                        self.hooks.install_idle_observer(&mut resource);
                        inner.idle.push_back(resource);
                        None
                    }
                    Some(Grant::Slot) => None,
                }
            }
        };

        if let Some(resource) = discarded {
            self.destroy(resource);
            self.release_slot(state);
        }
    }

    /// 사용 중 슬롯 하나를 반납하고 대기자에게 넘김
    fn release_slot(&self, state: &Arc<KeyState<R>>) {
        let unused = {
            let mut inner = state.inner.lock();
            if inner.offer(Grant::Slot).is_some() {
                inner.active = inner.active.saturating_sub(1);
            }
            inner.is_unused()
        };

        if unused {
            self.prune(state);
        }
    }

    /// 아무것도 없는 주소 항목 제거 (락 순서: 맵 → 주소)
    fn prune(&self, state: &Arc<KeyState<R>>) {
        let mut keys = self.keys.lock();
        let is_current = keys
            .get(&state.key)
            .map(|current| Arc::ptr_eq(current, state))
            .unwrap_or(false);
        if !is_current {
            return;
        }

        let mut inner = state.inner.lock();
        if inner.is_unused() {
            inner.purged = true;
            keys.remove(&state.key);
        }
    }

    fn purge(&self, key: &ServerAddress) {
        let Some(state) = self.keys.lock().remove(key) else {
            return;
        };

        let (idle, waiters) = {
            let mut inner = state.inner.lock();
            inner.purged = true;
            (
                std::mem::take(&mut inner.idle),
                std::mem::take(&mut inner.waiters),
            )
        };

        debug!(address = %key, idle = idle.len(), waiters = waiters.len(), "pool entry purged");

        // 대기자는 채널이 닫히면 새 항목으로 다시 시도
        drop(waiters);
        self.destroy_all(idle.into_iter().collect());
    }

    fn checked_out(self: &Arc<Self>, state: Arc<KeyState<R>>, resource: R) -> Pooled<R> {
        self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
        Pooled {
            resource: Some(resource),
            state,
            shared: self.clone(),
        }
    }
}

// ============================================================================
// Reservation / Waiter - 취소 안전 가드
// ============================================================================

/// 생성 중인 슬롯. 생성이 실패하거나 취소되면 슬롯을 반납합니다.
struct Reservation<R: Send + 'static> {
    shared: Arc<Shared<R>>,
    state: Arc<KeyState<R>>,
    armed: bool,
}

impl<R: Send + 'static> Reservation<R> {
    fn complete(mut self) {
        self.armed = false;
    }
}

impl<R: Send + 'static> Drop for Reservation<R> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.release_slot(&self.state);
        }
    }
}

/// 대기 중인 획득 요청. 타임아웃이나 취소 시 경합으로 도착한 할당을 되돌립니다.
struct Waiter<R: Send + 'static> {
    rx: oneshot::Receiver<Grant<R>>,
    shared: Arc<Shared<R>>,
    state: Arc<KeyState<R>>,
    done: bool,
}

impl<R: Send + 'static> Drop for Waiter<R> {
    fn drop(&mut self) {
        if self.done {
            return;
        }

        self.rx.close();
        match self.rx.try_recv() {
            Ok(Grant::Resource(resource)) => self.shared.release(&self.state, resource),
            Ok(Grant::Slot) => self.shared.release_slot(&self.state),
            Err(_) => {
                let unused = {
                    let mut inner = self.state.inner.lock();
                    inner.waiters.retain(|waiter| !waiter.is_closed());
                    inner.is_unused()
                };
                if unused {
                    self.shared.prune(&self.state);
                }
            }
        }
    }
}

// ============================================================================
// Pooled - 획득한 리소스
// ============================================================================

/// 풀에서 획득한 리소스
///
/// 드롭되거나 [`Pooled::release`]가 호출되면 자신을 만든 주소 항목으로
/// 돌아갑니다. 그 항목이 이미 정리(purge)되었다면 폐기됩니다.
pub struct Pooled<R: Send + 'static> {
    resource: Option<R>,
    state: Arc<KeyState<R>>,
    shared: Arc<Shared<R>>,
}

impl<R: Send + 'static> Pooled<R> {
    /// 리소스가 속한 주소
    pub fn key(&self) -> &ServerAddress {
        &self.state.key
    }

    /// 풀로 반환
    pub fn release(self) {
        drop(self)
    }
}

impl<R: Send + 'static> Deref for Pooled<R> {
    type Target = R;

    fn deref(&self) -> &R {
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource is only taken on drop"),
        }
    }
}

impl<R: Send + 'static> DerefMut for Pooled<R> {
    fn deref_mut(&mut self) -> &mut R {
        match &mut self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource is only taken on drop"),
        }
    }
}

impl<R: Send + 'static> Drop for Pooled<R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.shared.release(&self.state, resource);
        }
    }
}

impl<R: Send + fmt::Debug + 'static> fmt::Debug for Pooled<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("key", &self.state.key)
            .field("resource", &self.resource)
            .finish()
    }
}

// ============================================================================
// Pool - 리소스 풀
// ============================================================================

/// 주소별 키 기반 리소스 풀
pub struct Pool<R: Send + 'static> {
    shared: Arc<Shared<R>>,
}

impl<R: Send + 'static> Clone for Pool<R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<R: Send + 'static> Pool<R> {
    /// 새 풀 생성
    pub fn new(config: PoolConfig, hooks: Arc<dyn PoolHooks<R>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                hooks,
                keys: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                total_acquisitions: AtomicU64::new(0),
                total_created: AtomicU64::new(0),
                total_destroyed: AtomicU64::new(0),
                total_timeouts: AtomicU64::new(0),
            }),
        }
    }

    /// 풀 설정
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// 리소스 획득
    ///
    /// 유효한 유휴 리소스를 먼저 재사용하고, 없으면 용량 안에서 새로 만들며,
    /// 용량이 찼으면 FIFO로 대기합니다.
    pub async fn acquire(&self, key: &ServerAddress) -> DriverResult<Pooled<R>> {
        let timeout = self.shared.config.acquisition_timeout;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.shared.is_closed() {
                return Err(DriverError::PoolClosed);
            }

            let state = self.shared.state_for(key);
            let (step, invalid) = self.shared.try_acquire(&state);
            self.shared.destroy_all(invalid);

            match step {
                Step::Retry => continue,
                Step::Ready(resource) => return Ok(self.shared.checked_out(state, resource)),
                Step::Create => return self.create(state).await,
                Step::Wait(rx) => {
                    let mut waiter = Waiter {
                        rx,
                        shared: self.shared.clone(),
                        state: state.clone(),
                        done: false,
                    };

                    match tokio::time::timeout_at(deadline, &mut waiter.rx).await {
                        Ok(Ok(grant)) => {
                            waiter.done = true;
                            match grant {
                                Grant::Resource(resource) => {
                                    return Ok(self.shared.checked_out(state, resource));
                                }
                                Grant::Slot => return self.create(state).await,
                            }
                        }
                        // 항목이 정리됨: 새 항목으로 재시도
                        Ok(Err(_)) => {
                            waiter.done = true;
                            continue;
                        }
                        Err(_) => {
                            drop(waiter);
                            self.shared.total_timeouts.fetch_add(1, Ordering::Relaxed);
                            debug!(address = %key, ?timeout, "pool acquisition timed out");
                            return Err(DriverError::AcquisitionTimeout(timeout));
                        }
                    }
                }
            }
        }
    }

    async fn create(&self, state: Arc<KeyState<R>>) -> DriverResult<Pooled<R>> {
        let reservation = Reservation {
            shared: self.shared.clone(),
            state: state.clone(),
            armed: true,
        };

        let resource = self.shared.hooks.create(&state.key).await?;
        // 생성 중에 풀이 닫혔으면 넘겨주지 않고 폐기 (슬롯은 예약 가드가 반납)
        if self.shared.is_closed() {
            self.shared.destroy(resource);
            return Err(DriverError::PoolClosed);
        }
        reservation.complete();
        self.shared.total_created.fetch_add(1, Ordering::Relaxed);

        Ok(self.shared.checked_out(state, resource))
    }

    /// 주소 항목 정리
    ///
    /// 유휴 리소스는 즉시 폐기되고, 사용 중인 리소스는 반환될 때 폐기됩니다.
    pub fn purge(&self, key: &ServerAddress) {
        self.shared.purge(key);
    }

    /// 모든 항목을 정리하고 풀을 닫음
    pub fn purge_all(&self) {
        self.shared.closed.store(true, Ordering::Release);

        loop {
            let next = self.shared.keys.lock().keys().next().cloned();
            match next {
                Some(key) => self.shared.purge(&key),
                None => break,
            }
        }
    }

    /// 닫힌 상태 여부
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// 주소 항목 존재 여부
    pub fn has(&self, key: &ServerAddress) -> bool {
        self.shared.keys.lock().contains_key(key)
    }

    /// 주소별 유휴 리소스 수
    pub fn idle_count(&self, key: &ServerAddress) -> usize {
        self.with_state(key, |inner| inner.idle.len())
    }

    /// 주소별 사용 중 리소스 수 (생성 중 포함)
    pub fn active_count(&self, key: &ServerAddress) -> usize {
        self.with_state(key, |inner| inner.active)
    }

    /// 주소별 대기 중인 요청 수
    pub fn pending_count(&self, key: &ServerAddress) -> usize {
        self.with_state(key, |inner| {
            inner.waiters.iter().filter(|w| !w.is_closed()).count()
        })
    }

    /// 등록된 주소 목록
    pub fn keys(&self) -> Vec<ServerAddress> {
        self.shared.keys.lock().keys().cloned().collect()
    }

    fn with_state<T: Default>(&self, key: &ServerAddress, f: impl FnOnce(&KeyInner<R>) -> T) -> T {
        let state = self.shared.keys.lock().get(key).cloned();
        state.map(|state| f(&state.inner.lock())).unwrap_or_default()
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> PoolMetrics {
        let states: Vec<_> = self.shared.keys.lock().values().cloned().collect();
        let mut metrics = PoolMetrics {
            keys: states.len(),
            total_acquisitions: self.shared.total_acquisitions.load(Ordering::Relaxed),
            total_created: self.shared.total_created.load(Ordering::Relaxed),
            total_destroyed: self.shared.total_destroyed.load(Ordering::Relaxed),
            total_timeouts: self.shared.total_timeouts.load(Ordering::Relaxed),
            ..PoolMetrics::default()
        };

        for state in states {
            let inner = state.inner.lock();
            metrics.idle += inner.idle.len();
            metrics.active += inner.active;
            metrics.pending += inner.waiters.iter().filter(|w| !w.is_closed()).count();
        }

        metrics
    }
}

impl<R: Send + 'static> fmt::Debug for Pool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.shared.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
