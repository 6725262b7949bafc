//! # CTP (Chunked Transfer Protocol)
//!
//! 메시지 기반 비신뢰 채널 위의 청크 전송 엔진 (WebRTC DataChannel 류)
//!
//! ## 핵심 특징
//! - **청크 분할**: 파일은 고정 크기, 실시간 캡처는 인코더가 정한 크기
//! - **백프레셔**: 채널 송신 버퍼 기준 high/low water mark 흐름 제어
//! - **재시도**: 일시적 거부 시 지수 백오프, 횟수 제한, 취소 가능
//! - **손실 관측**: 생산/수신 청크 수로 손실률 계산 (복구는 하지 않음)
//! - **재조립**: 수신 순서대로 이어 붙인 결과물 생성
//!
//! 청크에 순번을 실어 보내지 않으므로 채널이 순서를 바꾸면 수신측은 알 수 없다.

pub mod capture;
pub mod channel;
pub mod chunk;
pub mod config;
pub mod error;
pub mod flow;
pub mod reassembly;
pub mod receiver;
pub mod retry;
pub mod sender;
pub mod stats;

#[cfg(test)]
mod testing;

pub use capture::{CaptureDevice, CaptureStopper, CaptureStream, SyntheticCapture};
pub use channel::{DataChannel, LinkConfig, MemoryChannel, ReadyState};
pub use chunk::{ByteSource, Chunk, ChunkIndex, ChunkReader, FileSource, MemorySource};
pub use config::{AdmissionPolicy, Config, SourceKind};
pub use error::{Error, Result, SendError};
pub use flow::FlowController;
pub use reassembly::{Artifact, Reassembler};
pub use receiver::{ReceivedBuffer, Receiver, ReceiverHandle};
pub use retry::{CancelToken, RetryPolicy};
pub use sender::{DropReason, SendOutcome, Sender};
pub use stats::{StatusReport, TransferStats};

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024; // 256KB

/// 기본 high water mark (바이트)
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024 * 1024; // 16MB

/// 기본 캡처 주기 (밀리초)
pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 1000;

/// 결과물 미디어 타입
pub const ARTIFACT_MIME_TYPE: &str = "video/webm";

/// 결과물 기본 파일명
pub const ARTIFACT_FILE_NAME: &str = "rebuilt_video.webm";
