//! 송신자
//!
//! - 청크 생산 순서대로 엄격히 순차 전송
//! - 송신 전 흐름 제어 (소스 종류별 정책)
//! - 일시적 거부 시 지수 백오프 재시도 (횟수 제한, 취소 가능)
//! - 채널이 닫혀 있으면 청크를 조용히 버림 (진행률은 그대로 증가)

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::capture::{CaptureDevice, CaptureStream};
use crate::channel::DataChannel;
use crate::chunk::{ByteSource, Chunk, ChunkIndex, ChunkReader, FileSource};
use crate::config::{AdmissionPolicy, SourceKind};
use crate::flow::FlowController;
use crate::retry::{CancelToken, RetryPolicy};
use crate::stats::{StatusReport, TransferStats};
use crate::{Config, Error, Result};

/// 청크 하나의 전송 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// 채널이 받아들임 (수신 보장은 아님)
    Accepted { attempts: u32 },

    /// 버려짐
    Dropped(DropReason),
}

/// 청크가 버려진 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    ChannelNotOpen,
    RetriesExhausted { attempts: u32 },
}

impl DropReason {
    /// 해당 청크의 에러로 변환
    pub fn into_error(self, index: ChunkIndex) -> Error {
        match self {
            DropReason::ChannelNotOpen => Error::ChannelNotOpen,
            DropReason::RetriesExhausted { attempts } => {
                Error::RetriesExhausted { index, attempts }
            }
        }
    }
}

/// 송신자
pub struct Sender<C> {
    config: Config,
    channel: Arc<C>,
    flow: FlowController<C>,
    retry: RetryPolicy,
    stats: Arc<TransferStats>,
    cancel: CancelToken,
}

impl<C: DataChannel> Sender<C> {
    /// 새 송신자 생성
    pub fn new(config: Config, channel: Arc<C>, stats: Arc<TransferStats>) -> Self {
        Self {
            flow: FlowController::new(channel.clone(), &config),
            retry: config.retry_policy(),
            config,
            channel,
            stats,
            cancel: CancelToken::new(),
        }
    }

    /// 외부 취소 토큰 사용
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 취소 토큰 (복제본으로 전송 중단 가능)
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> &Arc<TransferStats> {
        &self.stats
    }

    pub fn flow(&self) -> &FlowController<C> {
        &self.flow
    }

    /// 파일 전송
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<StatusReport> {
        let source = FileSource::open(path).await?;
        self.send_source(ChunkReader::new(source, self.config.chunk_size))
            .await
    }

    /// 크기가 정해진 입력 전송
    ///
    /// 읽기 실패(`SourceUnavailable`)나 취소 시 그 지점에서 중단한다.
    pub async fn send_source<S: ByteSource>(
        &self,
        mut reader: ChunkReader<S>,
    ) -> Result<StatusReport> {
        let total_size = reader.total_size();
        let policy = self.config.admission_for(SourceKind::File);
        self.stats.reset(total_size);

        info!(
            "전송 시작: {} bytes, {} 청크 예상, policy={:?}",
            total_size,
            reader.expected_chunks(),
            policy
        );

        loop {
            self.cancel.check()?;
            let chunk = match reader.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    warn!("소스 읽기 실패, 전송 중단: {}", e);
                    return Err(e);
                }
            };
            self.offer(chunk, policy).await?;
        }

        let report = self.stats.report();
        info!("전송 완료: {}", report.summary());
        Ok(report)
    }

    /// 캡처 스트림 전송 (중지될 때까지)
    pub async fn stream_capture<D: CaptureDevice>(
        &self,
        stream: &mut CaptureStream<D>,
    ) -> Result<StatusReport> {
        let policy = self.config.admission_for(SourceKind::Capture);
        self.stats.reset(0);
        info!("캡처 전송 시작: policy={:?}", policy);

        loop {
            // 청크를 꺼내기 전에 취소 확인
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                chunk = stream.next_chunk() => chunk,
            };
            let Some(chunk) = chunk else { break };
            self.offer(chunk, policy).await?;
        }

        let report = self.stats.report();
        info!("캡처 전송 종료: {}", report.summary());
        Ok(report)
    }

    /// 청크 하나 전송
    ///
    /// 진행률은 결과와 상관없이 먼저 집계된다. 채널 수준 실패는 `Ok(Dropped)`로
    /// 흡수되며, `Err`는 취소뿐이다.
    pub async fn offer(&self, chunk: Chunk, policy: AdmissionPolicy) -> Result<SendOutcome> {
        let len = chunk.len();
        self.stats.record_produced(len);
        debug!("청크 #{} 생산: {} bytes", chunk.index, len);

        let mut attempts = 0u32;
        loop {
            if !self.channel.is_open() {
                let reason = DropReason::ChannelNotOpen;
                debug!(
                    "채널 {:?}: 청크 #{} 버림 ({})",
                    self.channel.ready_state(),
                    chunk.index,
                    reason.into_error(chunk.index)
                );
                self.stats.record_dropped();
                return Ok(SendOutcome::Dropped(reason));
            }

            self.flow.admit(policy, &self.cancel).await?;
            // 대기 중에 닫혔을 수 있음
            if !self.channel.is_open() {
                continue;
            }

            attempts += 1;
            match self.channel.send(chunk.data.clone()) {
                Ok(()) => {
                    self.stats.record_accepted(len);
                    trace!("청크 #{} 전송: attempts={}", chunk.index, attempts);
                    return Ok(SendOutcome::Accepted { attempts });
                }
                Err(e) if self.retry.allows(attempts) => {
                    self.stats.record_retry();
                    let backoff = self.retry.backoff(attempts);
                    warn!(
                        "청크 #{} {}, {}ms 후 재시도",
                        chunk.index,
                        Error::TransientSendFailure(e),
                        backoff.as_millis()
                    );
                    self.cancel.sleep(backoff).await?;
                }
                Err(e) => {
                    let reason = DropReason::RetriesExhausted { attempts };
                    warn!("{}: {}", reason.into_error(chunk.index), e);
                    self.stats.record_dropped();
                    return Ok(SendOutcome::Dropped(reason));
                }
            }
        }
    }
}
