//! 테스트용 채널

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::channel::{DataChannel, ReadyState};
use crate::error::SendError;

/// 상태/버퍼/실패를 테스트에서 직접 조작하는 채널
pub struct ScriptedChannel {
    pub state: Mutex<ReadyState>,
    pub buffered: AtomicUsize,
    /// 남은 강제 실패 횟수
    pub failures: AtomicU32,
    pub attempts: AtomicU32,
    pub sent: Mutex<Vec<Bytes>>,
    pub low: Notify,
    pub with_notify: bool,
}

impl ScriptedChannel {
    pub fn open() -> Self {
        Self::with_state(ReadyState::Open)
    }

    pub fn with_state(state: ReadyState) -> Self {
        Self {
            state: Mutex::new(state),
            buffered: AtomicUsize::new(0),
            failures: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
            low: Notify::new(),
            with_notify: false,
        }
    }

    pub fn failing(times: u32) -> Self {
        let channel = Self::open();
        channel.failures.store(times, Ordering::SeqCst);
        channel
    }

    pub fn set_buffered(&self, amount: usize) {
        self.buffered.store(amount, Ordering::SeqCst);
        if self.with_notify {
            self.low.notify_waiters();
        }
    }

    pub fn set_state(&self, state: ReadyState) {
        *self.state.lock() = state;
        if self.with_notify {
            self.low.notify_waiters();
        }
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }
}

impl DataChannel for ScriptedChannel {
    fn ready_state(&self) -> ReadyState {
        *self.state.lock()
    }

    fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    fn send(&self, data: Bytes) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SendError::Other("scripted failure".into()));
        }
        self.sent.lock().push(data);
        Ok(())
    }

    fn buffered_amount_low(&self) -> Option<&Notify> {
        self.with_notify.then_some(&self.low)
    }
}

/// paused 시계 기준 경과 시간 확인 (타이머 해상도 오차 허용)
#[track_caller]
pub fn assert_elapsed(start: tokio::time::Instant, expected_ms: u64) {
    let elapsed = start.elapsed();
    let expected = std::time::Duration::from_millis(expected_ms);
    assert!(
        elapsed >= expected && elapsed < expected + std::time::Duration::from_millis(10),
        "elapsed {:?}, expected ~{:?}",
        elapsed,
        expected
    );
}
