//! 재조립
//!
//! 수신 버퍼를 도착 순서대로 이어 붙여 하나의 결과물을 만든다.
//! 전송 도중 호출하면 부분 결과물이 나온다 (미리보기/진단용).

use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use crate::receiver::ReceivedBuffer;
use crate::{Error, Result, ARTIFACT_FILE_NAME, ARTIFACT_MIME_TYPE};

/// 재조립기 (수신 버퍼는 읽기만 한다)
#[derive(Debug, Clone)]
pub struct Reassembler {
    buffer: ReceivedBuffer,
    mime_type: String,
    file_name: String,
}

impl Reassembler {
    pub fn new(buffer: ReceivedBuffer) -> Self {
        Self {
            buffer,
            mime_type: ARTIFACT_MIME_TYPE.to_string(),
            file_name: ARTIFACT_FILE_NAME.to_string(),
        }
    }

    /// 결과물 미디어 타입 변경
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// 결과물 기본 파일명 변경
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// 현재까지 수신된 청크로 결과물 생성
    ///
    /// 수신된 청크가 없으면 `EmptyInput` (빈 결과물을 만들지 않는다).
    pub fn rebuild(&self) -> Result<Artifact> {
        let chunks = self.buffer.snapshot();
        if chunks.is_empty() {
            info!("재조립 요청 무시: 수신된 청크 없음");
            return Err(Error::EmptyInput);
        }

        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut data = BytesMut::with_capacity(total);
        for chunk in &chunks {
            data.extend_from_slice(chunk);
        }

        debug!("재조립: {} 청크, {} bytes", chunks.len(), total);

        Ok(Artifact {
            data: data.freeze(),
            chunk_count: chunks.len(),
            mime_type: self.mime_type.clone(),
            file_name: self.file_name.clone(),
        })
    }
}

/// 재조립 결과물
#[derive(Debug, Clone)]
pub struct Artifact {
    data: Bytes,
    chunk_count: usize,
    mime_type: String,
    file_name: String,
}

impl Artifact {
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 결과물을 구성한 청크 수
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// CRC32 체크섬 (원본과 비교용)
    pub fn crc32(&self) -> u32 {
        crc32fast::hash(&self.data)
    }

    /// 재생용 스트림 (데이터 복사 없음)
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.data.clone())
    }

    /// `dir`에 기본 파일명으로 저장
    pub async fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        self.save_as(&path).await?;
        Ok(path)
    }

    /// 지정 경로에 저장
    pub async fn save_as(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        tokio::fs::write(path, &self.data).await?;
        info!(
            "결과물 저장: {} ({} bytes, {})",
            path.display(),
            self.data.len(),
            self.mime_type
        );
        Ok(())
    }
}
