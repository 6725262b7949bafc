//! 재시도 정책과 취소 토큰
//!
//! - 지수 백오프 (상한 있음)
//! - 청크당 시도 횟수 제한
//! - 모든 대기 지점에서 취소 확인

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::{Error, Result};

/// 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 첫 실패 후 대기 시간
    pub initial_backoff: Duration,

    /// 대기 시간 상한
    pub max_backoff: Duration,

    /// 실패마다 곱해지는 배수
    pub multiplier: u32,

    /// 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// `failures`번 실패한 뒤의 대기 시간
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let factor = self.multiplier.max(1).saturating_pow(exp);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// 시도 횟수가 남았는지
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// 전송 취소 토큰
///
/// 복제본끼리 상태를 공유한다.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 취소 요청
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// 취소될 때까지 대기
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// 취소되었으면 `Error::Cancelled`
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// 취소 가능한 sleep
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled() => Err(Error::Cancelled),
        }
    }
}
