//! 수신자
//!
//! - 채널이 전달한 순서 그대로 수신 버퍼에 추가
//! - 중복 제거, 순서 보정, 크기 검증 없음
//! - 수신 버퍼의 유일한 writer

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::reassembly::Reassembler;
use crate::retry::CancelToken;
use crate::stats::TransferStats;

/// 도착 순서대로 쌓이는 수신 버퍼
///
/// 복제본은 같은 버퍼를 가리킨다. 쓰기는 Receiver만 한다.
#[derive(Debug, Clone, Default)]
pub struct ReceivedBuffer {
    chunks: Arc<RwLock<Vec<Bytes>>>,
}

impl ReceivedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, data: Bytes) {
        self.chunks.write().push(data);
    }

    fn clear(&self) {
        self.chunks.write().clear();
    }

    /// 수신된 버퍼 수
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// 수신된 총 바이트
    pub fn total_bytes(&self) -> usize {
        self.chunks.read().iter().map(|c| c.len()).sum()
    }

    /// 현재 내용의 스냅샷 (Bytes 복제라 데이터 복사 없음)
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.chunks.read().clone()
    }
}

/// 수신자
pub struct Receiver {
    buffer: ReceivedBuffer,
    stats: Arc<TransferStats>,
}

impl Receiver {
    pub fn new(stats: Arc<TransferStats>) -> Self {
        Self {
            buffer: ReceivedBuffer::new(),
            stats,
        }
    }

    /// 수신 메시지 처리
    pub fn on_message(&mut self, data: Bytes) {
        let len = data.len();
        self.buffer.push(data);
        self.stats.record_received(len);
        debug!(
            "청크 수신: {} bytes (총 {}개)",
            len,
            self.stats.chunks_received()
        );
    }

    pub fn buffer(&self) -> &ReceivedBuffer {
        &self.buffer
    }

    /// 새 수신 세션 시작 (수신 버퍼와 수신측 카운터를 함께 비움)
    pub fn reset(&mut self) {
        reset_session(&self.buffer, &self.stats);
    }

    /// 수신 버퍼를 읽는 재조립기
    pub fn reassembler(&self) -> Reassembler {
        Reassembler::new(self.buffer.clone())
    }

    /// 수신 스트림을 소비하는 태스크 시작
    pub fn spawn(self, inbound: mpsc::Receiver<Bytes>) -> ReceiverHandle {
        let stop = CancelToken::new();
        let reassembler = self.reassembler();
        let buffer = self.buffer.clone();
        let stats = self.stats.clone();
        let task = tokio::spawn(run(self, inbound, stop.clone()));

        ReceiverHandle {
            stop,
            task: Some(task),
            buffer,
            reassembler,
            stats,
        }
    }
}

fn reset_session(buffer: &ReceivedBuffer, stats: &TransferStats) {
    let dropped = buffer.len();
    buffer.clear();
    stats.reset_received();
    debug!("수신 세션 초기화: {} 청크 폐기", dropped);
}

async fn run(mut receiver: Receiver, mut inbound: mpsc::Receiver<Bytes>, stop: CancelToken) {
    info!("수신 시작");
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            msg = inbound.recv() => match msg {
                Some(data) => receiver.on_message(data),
                None => break,
            },
        }
    }
    info!(
        "수신 종료: {} 청크, {} bytes",
        receiver.buffer.len(),
        receiver.buffer.total_bytes()
    );
}

/// 태스크 종료 대기 (비정상 종료면 false)
async fn wait_task(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            warn!("수신 태스크 비정상 종료: {}", e);
            false
        }
    }
}

/// 수신 태스크 핸들 (외부에서 제어용)
pub struct ReceiverHandle {
    stop: CancelToken,
    task: Option<JoinHandle<()>>,
    buffer: ReceivedBuffer,
    reassembler: Reassembler,
    stats: Arc<TransferStats>,
}

impl ReceiverHandle {
    /// 수신 중지 요청
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// 수신 태스크 종료 대기 (스트림이 닫히거나 stop 이후)
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            wait_task(task).await;
        }
    }

    /// 새 수신 세션 시작
    ///
    /// 다음 전송 전에 호출한다. 수신 중인 메시지와 겹치면 그 메시지도 비워질 수 있다.
    pub fn reset(&self) {
        reset_session(&self.buffer, &self.stats);
    }

    pub fn reassembler(&self) -> Reassembler {
        self.reassembler.clone()
    }

    pub fn stats(&self) -> &Arc<TransferStats> {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}
