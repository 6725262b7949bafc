//! 실시간 캡처 소스
//!
//! 캡처 장치(인코더)가 일정 주기로 가변 크기 버퍼를 내보내면
//! CaptureStream이 순번을 붙여 청크로 만든다. 청크 크기는 인코더가 결정한다.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::chunk::{Chunk, ChunkIndex};
use crate::retry::CancelToken;
use crate::{Error, Result};

/// 캡처 장치 인터페이스
pub trait CaptureDevice: Send {
    /// `interval` 주기로 버퍼를 `sink`에 내보내기 시작
    fn start(&mut self, interval: Duration, sink: mpsc::Sender<Bytes>) -> Result<()>;

    /// 캡처 중지
    fn stop(&mut self);
}

/// 캡처 중지 핸들
#[derive(Debug, Clone)]
pub struct CaptureStopper {
    token: CancelToken,
}

impl CaptureStopper {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// 캡처 버퍼를 청크 시퀀스로 변환
pub struct CaptureStream<D: CaptureDevice> {
    device: D,
    rx: mpsc::Receiver<Bytes>,
    stop: CancelToken,
    next_index: ChunkIndex,
    finished: bool,
}

impl<D: CaptureDevice> CaptureStream<D> {
    /// 장치를 시작하고 스트림 생성
    ///
    /// 장치가 시작을 거부하면 `SourceUnavailable`.
    pub fn start(mut device: D, interval: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel(64);
        device.start(interval, tx).map_err(|e| match e {
            Error::SourceUnavailable { .. } => e,
            other => Error::source_unavailable(other.to_string()),
        })?;
        info!("캡처 시작: interval={}ms", interval.as_millis());

        Ok(Self {
            device,
            rx,
            stop: CancelToken::new(),
            next_index: 0,
            finished: false,
        })
    }

    /// 다른 태스크에서 중지할 수 있는 핸들
    pub fn stopper(&self) -> CaptureStopper {
        CaptureStopper {
            token: self.stop.clone(),
        }
    }

    /// 생산된 청크 수
    pub fn produced(&self) -> u64 {
        self.next_index
    }

    /// 다음 청크 (중지되거나 장치가 끝나면 None)
    ///
    /// 길이 0인 버퍼는 건너뛰며 순번을 소비하지 않는다.
    pub async fn next_chunk(&mut self) -> Option<Chunk> {
        loop {
            if self.finished {
                return None;
            }

            let data = tokio::select! {
                biased;
                _ = self.stop.cancelled() => None,
                data = self.rx.recv() => data,
            };

            let Some(data) = data else {
                self.finish();
                return None;
            };
            if data.is_empty() {
                continue;
            }

            let chunk = Chunk::new(self.next_index, data);
            self.next_index += 1;
            return Some(chunk);
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.device.stop();
            info!("캡처 종료: {} 청크", self.next_index);
        }
    }
}

impl<D: CaptureDevice> Drop for CaptureStream<D> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// 합성 캡처 장치
///
/// 주기마다 `min_size..=max_size` 범위의 임의 크기 버퍼를 만든다.
pub struct SyntheticCapture {
    min_size: usize,
    max_size: usize,
    running: Option<CancelToken>,
}

impl SyntheticCapture {
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            min_size: min_size.min(max_size),
            max_size: max_size.max(min_size),
            running: None,
        }
    }
}

impl CaptureDevice for SyntheticCapture {
    fn start(&mut self, interval: Duration, sink: mpsc::Sender<Bytes>) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::source_unavailable("capture already running"));
        }
        if interval.is_zero() {
            return Err(Error::source_unavailable("capture interval must be > 0"));
        }

        let token = CancelToken::new();
        self.running = Some(token.clone());
        let (min_size, max_size) = (self.min_size, self.max_size);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 첫 틱은 즉시 발생하므로 건너뛴다 (첫 버퍼는 한 주기 뒤)
            ticker.tick().await;
            let mut frame: u64 = 0;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let size = rand::thread_rng().gen_range(min_size..=max_size);
                let data = Bytes::from(vec![(frame % 256) as u8; size]);
                frame += 1;

                if sink.send(data).await.is_err() {
                    break;
                }
            }
            debug!("합성 캡처 태스크 종료: {} 프레임", frame);
        });

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(token) = self.running.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::assert_elapsed;

    /// 미리 정한 버퍼를 내보내고 끝나는 장치
    struct ScriptedDevice {
        buffers: Vec<Bytes>,
        deny: bool,
    }

    impl CaptureDevice for ScriptedDevice {
        fn start(&mut self, _interval: Duration, sink: mpsc::Sender<Bytes>) -> Result<()> {
            if self.deny {
                return Err(Error::source_unavailable("permission denied"));
            }
            let buffers = std::mem::take(&mut self.buffers);
            tokio::spawn(async move {
                for buf in buffers {
                    if sink.send(buf).await.is_err() {
                        break;
                    }
                }
            });
            Ok(())
        }

        fn stop(&mut self) {}
    }

    #[tokio::test]
    async fn test_skips_empty_buffers() {
        let device = ScriptedDevice {
            buffers: vec![
                Bytes::from_static(b"ab"),
                Bytes::new(),
                Bytes::from_static(b"cde"),
            ],
            deny: false,
        };
        let mut stream = CaptureStream::start(device, Duration::from_millis(1000)).unwrap();

        let first = stream.next_chunk().await.unwrap();
        assert_eq!((first.index, first.data.as_ref()), (0, &b"ab"[..]));
        let second = stream.next_chunk().await.unwrap();
        assert_eq!((second.index, second.data.as_ref()), (1, &b"cde"[..]));
        assert!(stream.next_chunk().await.is_none());
        assert_eq!(stream.produced(), 2);
    }

    #[tokio::test]
    async fn test_denied_device() {
        let device = ScriptedDevice {
            buffers: Vec::new(),
            deny: true,
        };
        let result = CaptureStream::start(device, Duration::from_millis(1000));
        assert!(matches!(result, Err(Error::SourceUnavailable { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_cadence_and_stop() {
        let device = SyntheticCapture::new(100, 200);
        let mut stream = CaptureStream::start(device, Duration::from_millis(1000)).unwrap();
        let stopper = stream.stopper();

        let start = tokio::time::Instant::now();
        for expected in 0..3u64 {
            let chunk = stream.next_chunk().await.unwrap();
            assert_eq!(chunk.index, expected);
            assert!((100..=200).contains(&chunk.len()));
        }
        assert_elapsed(start, 3000);

        stopper.stop();
        assert!(stopper.is_stopped());
        assert!(stream.next_chunk().await.is_none());
        assert_eq!(stream.produced(), 3);
    }

    #[tokio::test]
    async fn test_synthetic_rejects_double_start() {
        let mut device = SyntheticCapture::new(1, 1);
        let (tx, _rx) = mpsc::channel(1);
        device.start(Duration::from_millis(10), tx.clone()).unwrap();
        assert!(device.start(Duration::from_millis(10), tx).is_err());
        device.stop();
    }
}
