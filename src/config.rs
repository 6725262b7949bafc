//! 프로토콜 설정

use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::{
    Error, Result, DEFAULT_CAPTURE_INTERVAL_MS, DEFAULT_CHUNK_SIZE, DEFAULT_HIGH_WATER_MARK,
};

/// 송신 전 흐름 제어 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// 버퍼가 low water mark 아래로 내려갈 때까지 대기
    Blocking,

    /// high water mark 초과 시 한 번만 대기한 뒤 그대로 전송
    BestEffort,
}

/// 소스 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// 크기가 정해진 파일/바이트 입력
    File,

    /// 실시간 캡처 스트림
    Capture,
}

/// CTP 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 청크 크기 (바이트)
    pub chunk_size: usize,

    /// 채널 버퍼 상한 (바이트)
    pub high_water_mark: usize,

    /// 버퍼 상태 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,

    /// 과부하 시 단일 대기 시간 (밀리초)
    pub throttle_delay_ms: u64,

    /// 첫 재시도 대기 시간 (밀리초)
    pub retry_backoff_ms: u64,

    /// 재시도 대기 상한 (밀리초)
    pub retry_max_backoff_ms: u64,

    /// 청크당 최대 전송 시도 횟수
    pub retry_max_attempts: u32,

    /// 캡처 주기 (밀리초)
    pub capture_interval_ms: u64,

    /// 파일 전송 흐름 제어 방식
    pub file_admission: AdmissionPolicy,

    /// 캡처 전송 흐름 제어 방식
    pub capture_admission: AdmissionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            poll_interval_ms: 50,
            throttle_delay_ms: 50,
            retry_backoff_ms: 100,
            retry_max_backoff_ms: 3200,
            retry_max_attempts: 8,
            capture_interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
            file_admission: AdmissionPolicy::BestEffort,
            capture_admission: AdmissionPolicy::BestEffort,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// low water mark (high / 2)
    pub fn low_water_mark(&self) -> usize {
        self.high_water_mark / 2
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    /// 소스 종류별 흐름 제어 방식
    pub fn admission_for(&self, kind: SourceKind) -> AdmissionPolicy {
        match kind {
            SourceKind::File => self.file_admission,
            SourceKind::Capture => self.capture_admission,
        }
    }

    /// 재시도 정책
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
            multiplier: 2,
            max_attempts: self.retry_max_attempts,
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".into()));
        }
        if self.high_water_mark < 2 {
            return Err(Error::InvalidConfig("high_water_mark must be >= 2".into()));
        }
        if self.chunk_size > self.high_water_mark {
            return Err(Error::InvalidConfig(format!(
                "chunk_size {} exceeds high_water_mark {}",
                self.chunk_size, self.high_water_mark
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("poll_interval_ms must be > 0".into()));
        }
        if self.retry_max_attempts == 0 {
            return Err(Error::InvalidConfig("retry_max_attempts must be > 0".into()));
        }
        if self.capture_interval_ms == 0 {
            return Err(Error::InvalidConfig("capture_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    /// 저지연 설정 (실시간 캡처 위주)
    pub fn low_latency() -> Self {
        Self {
            chunk_size: 64 * 1024,            // 64KB
            high_water_mark: 4 * 1024 * 1024, // 4MB
            poll_interval_ms: 10,
            throttle_delay_ms: 10,
            retry_backoff_ms: 20,
            retry_max_backoff_ms: 320,
            retry_max_attempts: 5,
            capture_interval_ms: 250,
            file_admission: AdmissionPolicy::BestEffort,
            capture_admission: AdmissionPolicy::BestEffort,
        }
    }

    /// 대용량 전송 설정 (처리량 위주)
    pub fn bulk() -> Self {
        Self {
            chunk_size: 256 * 1024,
            high_water_mark: 64 * 1024 * 1024, // 64MB
            poll_interval_ms: 50,
            throttle_delay_ms: 50,
            retry_backoff_ms: 100,
            retry_max_backoff_ms: 6400,
            retry_max_attempts: 16,
            capture_interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
            file_admission: AdmissionPolicy::Blocking,
            capture_admission: AdmissionPolicy::Blocking,
        }
    }
}
