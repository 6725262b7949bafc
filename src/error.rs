//! 에러 타입 정의

use thiserror::Error;

use crate::chunk::ChunkIndex;

/// CTP 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 입력 소스를 열거나 읽을 수 없음 (전송 중단)
    #[error("소스 사용 불가: {reason}")]
    SourceUnavailable { reason: String },

    /// 채널이 open 상태가 아님 (청크는 조용히 버려짐)
    #[error("채널이 열려있지 않음")]
    ChannelNotOpen,

    /// 채널이 전송을 거부함 (로컬 재시도로 복구)
    #[error("일시적 전송 실패: {0}")]
    TransientSendFailure(#[from] SendError),

    /// 재시도 한도 초과
    #[error("재시도 한도 초과: chunk={index}, attempts={attempts}")]
    RetriesExhausted { index: ChunkIndex, attempts: u32 },

    /// 수신된 청크 없이 재조립 요청
    #[error("수신된 청크가 없음")]
    EmptyInput,

    /// 전송 취소
    #[error("전송 취소됨")]
    Cancelled,

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// 소스 에러 생성 헬퍼
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Error::SourceUnavailable {
            reason: reason.into(),
        }
    }
}

/// 채널의 동기 전송 거부 사유
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("송신 버퍼 가득 참: buffered={buffered}, limit={limit}")]
    BufferFull { buffered: usize, limit: usize },

    #[error("채널 상태 불일치")]
    InvalidState,

    #[error("{0}")]
    Other(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
