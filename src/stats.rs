//! 전송 통계
//!
//! 송신측 카운터는 Sender만, 수신측 카운터는 Receiver만 갱신한다.
//! - offered: 생산 즉시 집계 (진행률 표시용, 전달 보장 아님)
//! - accepted: 채널이 거부 없이 받아들인 것
//! - received: 수신측에서 실제로 관측된 것

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 전송 세션 카운터
#[derive(Debug)]
pub struct TransferStats {
    started_at: Mutex<Instant>,

    total_size_bytes: AtomicU64,
    chunks_produced: AtomicU64,
    bytes_offered: AtomicU64,
    chunks_accepted: AtomicU64,
    bytes_accepted: AtomicU64,
    chunks_dropped: AtomicU64,
    send_retries: AtomicU64,

    chunks_received: AtomicU64,
    bytes_received: AtomicU64,
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            started_at: Mutex::new(Instant::now()),
            total_size_bytes: AtomicU64::new(0),
            chunks_produced: AtomicU64::new(0),
            bytes_offered: AtomicU64::new(0),
            chunks_accepted: AtomicU64::new(0),
            bytes_accepted: AtomicU64::new(0),
            chunks_dropped: AtomicU64::new(0),
            send_retries: AtomicU64::new(0),
            chunks_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    /// 새 전송 시작 (캡처는 total_size = 0)
    ///
    /// 송신측 카운터만 초기화한다. 수신측 카운터는 수신 버퍼와 함께
    /// `reset_received()`로 초기화해야 한다.
    pub fn reset(&self, total_size_bytes: u64) {
        *self.started_at.lock() = Instant::now();
        self.total_size_bytes.store(total_size_bytes, Ordering::Relaxed);
        for counter in [
            &self.chunks_produced,
            &self.bytes_offered,
            &self.chunks_accepted,
            &self.bytes_accepted,
            &self.chunks_dropped,
            &self.send_retries,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// 수신측 카운터 초기화
    pub fn reset_received(&self) {
        self.chunks_received.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
    }

    /// 청크 생산 (offered 집계 포함)
    pub fn record_produced(&self, len: usize) {
        self.chunks_produced.fetch_add(1, Ordering::Relaxed);
        self.bytes_offered.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_accepted(&self, len: usize) {
        self.chunks_accepted.fetch_add(1, Ordering::Relaxed);
        self.bytes_accepted.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.send_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self, len: usize) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn chunks_produced(&self) -> u64 {
        self.chunks_produced.load(Ordering::Relaxed)
    }

    pub fn chunks_received(&self) -> u64 {
        self.chunks_received.load(Ordering::Relaxed)
    }

    /// 현재 카운터 스냅샷
    pub fn report(&self) -> StatusReport {
        StatusReport {
            elapsed: self.started_at.lock().elapsed(),
            total_size_bytes: self.total_size_bytes.load(Ordering::Relaxed),
            chunks_produced: self.chunks_produced.load(Ordering::Relaxed),
            bytes_offered: self.bytes_offered.load(Ordering::Relaxed),
            chunks_accepted: self.chunks_accepted.load(Ordering::Relaxed),
            bytes_accepted: self.bytes_accepted.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            send_retries: self.send_retries.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// 통계 스냅샷 (파생 값 계산용, 상태 없음)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    pub elapsed: Duration,
    pub total_size_bytes: u64,
    pub chunks_produced: u64,
    pub bytes_offered: u64,
    pub chunks_accepted: u64,
    pub bytes_accepted: u64,
    pub chunks_dropped: u64,
    pub send_retries: u64,
    pub chunks_received: u64,
    pub bytes_received: u64,
}

impl StatusReport {
    /// 손실률 = (produced - received) / produced
    ///
    /// 생산된 청크가 없으면 None. 전송 도중 리셋되면 음수가 나올 수 있다.
    pub fn loss_rate(&self) -> Option<f64> {
        if self.chunks_produced == 0 {
            return None;
        }
        let produced = self.chunks_produced as f64;
        Some((produced - self.chunks_received as f64) / produced)
    }

    /// 송신 진행률 (offered 기준, 전체 크기를 모르면 None)
    pub fn send_progress(&self) -> Option<f64> {
        ratio(self.bytes_offered, self.total_size_bytes)
    }

    /// 수신 진행률
    pub fn receive_progress(&self) -> Option<f64> {
        ratio(self.bytes_received, self.total_size_bytes)
    }

    /// 수신 처리율 (bytes/sec)
    pub fn receive_throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes_received as f64 / secs
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        let loss = match self.loss_rate() {
            Some(rate) => format!("{:.2}%", rate * 100.0),
            None => "-".to_string(),
        };
        format!(
            "Elapsed: {:.2}s | Chunks: {}/{} recv | Offered: {} | Accepted: {} | Received: {} | Dropped: {} | Retries: {} | Loss: {}",
            self.elapsed.as_secs_f64(),
            self.chunks_received,
            self.chunks_produced,
            self.bytes_offered,
            self.bytes_accepted,
            self.bytes_received,
            self.chunks_dropped,
            self.send_retries,
            loss,
        )
    }
}

fn ratio(done: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(done as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_rate_undefined_without_production() {
        let stats = TransferStats::new();
        assert_eq!(stats.report().loss_rate(), None);
    }

    #[test]
    fn test_loss_rate() {
        let stats = TransferStats::new();
        for _ in 0..4 {
            stats.record_produced(100);
        }
        stats.record_received(100);
        assert_eq!(stats.report().loss_rate(), Some(0.75));

        for _ in 0..3 {
            stats.record_received(100);
        }
        assert_eq!(stats.report().loss_rate(), Some(0.0));
    }

    #[test]
    fn test_negative_loss_after_reset_is_reported_as_is() {
        let stats = TransferStats::new();
        stats.record_produced(10);
        stats.record_received(10);

        // 수신측은 이전 전송 값을 유지
        stats.reset(0);
        stats.record_produced(10);
        stats.record_received(10);
        assert_eq!(stats.report().loss_rate(), Some(-1.0));
    }

    #[test]
    fn test_progress() {
        let stats = TransferStats::new();
        stats.reset(1000);
        stats.record_produced(250);
        stats.record_received(100);

        let report = stats.report();
        assert_eq!(report.send_progress(), Some(0.25));
        assert_eq!(report.receive_progress(), Some(0.1));

        // 캡처 (전체 크기 모름)
        stats.reset(0);
        stats.record_produced(250);
        assert_eq!(stats.report().send_progress(), None);
    }

    #[test]
    fn test_reset_clears_counters() {
        let stats = TransferStats::new();
        stats.record_produced(10);
        stats.record_accepted(10);
        stats.record_dropped();
        stats.record_retry();
        stats.record_received(10);

        stats.reset(42);
        let report = stats.report();
        assert_eq!(report.total_size_bytes, 42);
        assert_eq!(report.chunks_produced, 0);
        assert_eq!(report.bytes_offered, 0);
        assert_eq!(report.chunks_accepted, 0);
        assert_eq!(report.chunks_dropped, 0);
        assert_eq!(report.send_retries, 0);
        assert_eq!(report.chunks_received, 1);
        assert_eq!(report.bytes_received, 10);

        stats.reset_received();
        let report = stats.report();
        assert_eq!(report.chunks_received, 0);
        assert_eq!(report.bytes_received, 0);
        assert_eq!(report.total_size_bytes, 42);
    }

    #[test]
    fn test_summary_without_loss() {
        let summary = TransferStats::new().report().summary();
        assert!(summary.contains("Loss: -"));
    }
}
