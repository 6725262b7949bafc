//! 전송 채널 추상화
//!
//! 메시지 단위, 비신뢰, 송신 버퍼를 가진 채널 (WebRTC DataChannel과 유사).
//! 채널 수립 절차(offer/answer, ICE)는 이 크레이트 밖의 일이다.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::SendError;

/// 채널 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// 송신측 채널 인터페이스
pub trait DataChannel: Send + Sync {
    /// 현재 상태
    fn ready_state(&self) -> ReadyState;

    /// 아직 전송되지 않은 버퍼 바이트 수
    fn buffered_amount(&self) -> usize;

    /// 메시지 전송 (동기 거부 가능)
    fn send(&self, data: Bytes) -> std::result::Result<(), SendError>;

    /// 버퍼가 줄었을 때 깨워주는 알림 (없으면 폴링만 사용)
    fn buffered_amount_low(&self) -> Option<&Notify> {
        None
    }

    fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }
}

/// 루프백 링크 설정
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// 송신 버퍼 최대 크기 (초과 시 send 거부)
    pub max_buffered: usize,

    /// 틱당 배출 바이트
    pub bytes_per_tick: usize,

    /// 배출 주기 (밀리초)
    pub tick_ms: u64,

    /// 메시지 손실 비율 (0.0 ~ 1.0)
    pub loss_ratio: f64,

    /// 이 값 이하로 버퍼가 줄면 알림
    pub low_threshold: usize,

    /// 수신 큐 크기
    pub inbound_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_buffered: 32 * 1024 * 1024,  // 32MB
            bytes_per_tick: 4 * 1024 * 1024, // 4MB
            tick_ms: 10,
            loss_ratio: 0.0,
            low_threshold: 8 * 1024 * 1024, // 8MB
            inbound_capacity: 1024,
        }
    }
}

struct LinkState {
    ready: ReadyState,
    queue: VecDeque<Bytes>,
    buffered: usize,
}

struct Shared {
    state: Mutex<LinkState>,
    low: Notify,
    lost: AtomicU64,
}

/// 인프로세스 루프백 채널 (송신측)
///
/// 배출 태스크가 틱마다 버퍼를 비워 수신측 mpsc로 넘긴다.
#[derive(Clone)]
pub struct MemoryChannel {
    shared: Arc<Shared>,
    max_buffered: usize,
}

impl MemoryChannel {
    /// open 상태의 채널과 수신 스트림 생성 (tokio 런타임 필요)
    ///
    /// 배출 태스크는 채널이 닫혀 비워지거나, 모든 채널 핸들 또는 수신 스트림이
    /// drop되면 끝난다.
    pub fn pair(config: LinkConfig) -> (Self, mpsc::Receiver<Bytes>) {
        let (channel, rx, _pump) = Self::spawn(config);
        (channel, rx)
    }

    fn spawn(config: LinkConfig) -> (Self, mpsc::Receiver<Bytes>, JoinHandle<()>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(LinkState {
                ready: ReadyState::Open,
                queue: VecDeque::new(),
                buffered: 0,
            }),
            low: Notify::new(),
            lost: AtomicU64::new(0),
        });
        let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));

        let channel = Self {
            shared: shared.clone(),
            max_buffered: config.max_buffered,
        };

        let pump = tokio::spawn(pump(Arc::downgrade(&shared), config, tx));
        info!("루프백 채널 open");

        (channel, rx, pump)
    }

    /// 채널 닫기 (남은 버퍼는 배출 후 수신 스트림 종료)
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.ready != ReadyState::Closed {
            state.ready = ReadyState::Closed;
            info!("루프백 채널 closed: {} bytes 대기 중", state.buffered);
        }
    }

    /// 손실 처리된 메시지 수
    pub fn lost_messages(&self) -> u64 {
        self.shared.lost.load(Ordering::Relaxed)
    }
}

impl DataChannel for MemoryChannel {
    fn ready_state(&self) -> ReadyState {
        self.shared.state.lock().ready
    }

    fn buffered_amount(&self) -> usize {
        self.shared.state.lock().buffered
    }

    fn send(&self, data: Bytes) -> std::result::Result<(), SendError> {
        let mut state = self.shared.state.lock();
        if state.ready != ReadyState::Open {
            return Err(SendError::InvalidState);
        }
        if state.buffered + data.len() > self.max_buffered {
            return Err(SendError::BufferFull {
                buffered: state.buffered,
                limit: self.max_buffered,
            });
        }
        state.buffered += data.len();
        state.queue.push_back(data);
        Ok(())
    }

    fn buffered_amount_low(&self) -> Option<&Notify> {
        Some(&self.shared.low)
    }
}

/// 배출 태스크
async fn pump(link: Weak<Shared>, config: LinkConfig, tx: mpsc::Sender<Bytes>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let loss_ratio = config.loss_ratio.clamp(0.0, 1.0);

    loop {
        ticker.tick().await;

        if tx.is_closed() {
            debug!("수신 스트림 닫힘, 루프백 배출 태스크 종료");
            return;
        }
        let Some(shared) = link.upgrade() else {
            debug!("채널 해제, 루프백 배출 태스크 종료");
            return;
        };

        let (batch, closed, buffered) = {
            let mut state = shared.state.lock();
            let mut budget = config.bytes_per_tick;
            let mut batch = Vec::new();
            while budget > 0 {
                match state.queue.pop_front() {
                    Some(msg) => {
                        budget = budget.saturating_sub(msg.len());
                        state.buffered -= msg.len();
                        batch.push(msg);
                    }
                    None => break,
                }
            }
            (batch, state.ready == ReadyState::Closed, state.buffered)
        };

        if !batch.is_empty() && buffered <= config.low_threshold {
            shared.low.notify_waiters();
        }

        let drained = batch.is_empty();
        for msg in batch {
            let lost = loss_ratio > 0.0 && rand::thread_rng().gen_bool(loss_ratio);
            if lost {
                shared.lost.fetch_add(1, Ordering::Relaxed);
                debug!("메시지 손실: {} bytes", msg.len());
                continue;
            }
            if tx.send(msg).await.is_err() {
                return;
            }
        }

        if closed && drained {
            debug!("루프백 배출 태스크 종료");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_loopback_delivers_in_order() {
        let (channel, mut rx) = MemoryChannel::pair(LinkConfig::default());
        assert!(channel.is_open());

        for i in 0..5u8 {
            channel.send(Bytes::from(vec![i; 10])).unwrap();
        }
        assert_eq!(channel.buffered_amount(), 50);

        for i in 0..5u8 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.as_ref(), &[i; 10]);
        }
        assert_eq!(channel.buffered_amount(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_rejected_when_buffer_full() {
        let config = LinkConfig {
            max_buffered: 100,
            ..LinkConfig::default()
        };
        let (channel, _rx) = MemoryChannel::pair(config);

        channel.send(Bytes::from(vec![0u8; 80])).unwrap();
        let err = channel.send(Bytes::from(vec![0u8; 30])).unwrap_err();
        assert_eq!(
            err,
            SendError::BufferFull {
                buffered: 80,
                limit: 100
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_ends_stream() {
        let (channel, mut rx) = MemoryChannel::pair(LinkConfig::default());
        channel.send(Bytes::from_static(b"last")).unwrap();
        channel.close();

        assert_eq!(channel.ready_state(), ReadyState::Closed);
        assert_eq!(
            channel.send(Bytes::from_static(b"late")),
            Err(SendError::InvalidState)
        );

        assert_eq!(rx.recv().await.unwrap().as_ref(), b"last");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_loss() {
        let config = LinkConfig {
            loss_ratio: 1.0,
            ..LinkConfig::default()
        };
        let (channel, mut rx) = MemoryChannel::pair(config);
        for _ in 0..3 {
            channel.send(Bytes::from_static(b"gone")).unwrap();
        }
        channel.close();

        assert!(rx.recv().await.is_none());
        assert_eq!(channel.lost_messages(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_ends_when_channel_dropped() {
        let (channel, mut rx, pump) = MemoryChannel::spawn(LinkConfig::default());
        let copy = channel.clone();
        drop(channel);
        drop(copy);

        let ended = tokio::time::timeout(Duration::from_secs(3600), rx.recv()).await;
        assert!(matches!(ended, Ok(None)));
        tokio::time::timeout(Duration::from_secs(3600), pump)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_ends_when_receiver_dropped() {
        let (channel, rx, pump) = MemoryChannel::spawn(LinkConfig::default());
        drop(rx);

        tokio::time::timeout(Duration::from_secs(3600), pump)
            .await
            .unwrap()
            .unwrap();
        assert!(channel.is_open());
    }
}
