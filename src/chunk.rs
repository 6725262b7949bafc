//! 청크와 청크 소스 정의
//!
//! - Chunk: 채널 메시지 1개에 해당하는 불변 바이트 버퍼
//! - ByteSource: 크기를 알고 임의 위치를 읽을 수 있는 입력 (파일, 메모리)
//! - ChunkReader: ByteSource를 고정 크기 청크 시퀀스로 지연 분할

use std::future::Future;
use std::io::SeekFrom;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::{Error, Result};

/// 청크 순번 (생산 시점에 단조 증가로 부여)
pub type ChunkIndex = u64;

/// 청크
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 순번
    pub index: ChunkIndex,

    /// 실제 데이터
    pub data: Bytes,
}

impl Chunk {
    pub fn new(index: ChunkIndex, data: Bytes) -> Self {
        Self { index, data }
    }

    /// 바이트 길이
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 크기가 정해진 임의 접근 입력
pub trait ByteSource: Send {
    /// 전체 크기 (바이트)
    fn size(&self) -> u64;

    /// `offset`부터 `len` 바이트 읽기
    fn read_slice(&mut self, offset: u64, len: usize) -> impl Future<Output = Result<Bytes>> + Send;
}

/// 메모리 입력
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl ByteSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_slice(&mut self, offset: u64, len: usize) -> Result<Bytes> {
        let start = offset as usize;
        let end = start.saturating_add(len);
        if end > self.data.len() {
            return Err(Error::source_unavailable(format!(
                "slice {}..{} out of range (size {})",
                start,
                end,
                self.data.len()
            )));
        }
        Ok(self.data.slice(start..end))
    }
}

/// 디스크 파일 입력
#[derive(Debug)]
pub struct FileSource {
    file: File,
    size: u64,
}

impl FileSource {
    /// 파일 열기
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|e| {
            Error::source_unavailable(format!("{}: {}", path.display(), e))
        })?;
        let size = file
            .metadata()
            .await
            .map_err(|e| Error::source_unavailable(format!("{}: {}", path.display(), e)))?
            .len();

        debug!("파일 소스 열림: {} ({} bytes)", path.display(), size);
        Ok(Self { file, size })
    }
}

impl ByteSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_slice(&mut self, offset: u64, len: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(len);
        self.file
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| Error::source_unavailable(format!("seek {}: {}", offset, e)))?;
        self.file
            .read_exact(&mut buf)
            .await
            .map_err(|e| Error::source_unavailable(format!("read {}+{}: {}", offset, len, e)))?;
        Ok(buf.freeze())
    }
}

/// ByteSource를 청크 시퀀스로 분할
pub struct ChunkReader<S> {
    source: S,
    chunk_size: usize,
    offset: u64,
    next_index: ChunkIndex,
}

impl<S: ByteSource> ChunkReader<S> {
    pub fn new(source: S, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
            offset: 0,
            next_index: 0,
        }
    }

    /// 전체 입력 크기
    pub fn total_size(&self) -> u64 {
        self.source.size()
    }

    /// 예상 청크 수 = ceil(S / C)
    pub fn expected_chunks(&self) -> u64 {
        self.source.size().div_ceil(self.chunk_size as u64)
    }

    /// 다음 청크 읽기 (입력 끝이면 None)
    ///
    /// 읽기 실패는 해당 구간에 대해 최종 실패이며 오프셋은 전진하지 않는다.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        let size = self.source.size();
        if self.offset >= size {
            return Ok(None);
        }

        let len = (size - self.offset).min(self.chunk_size as u64) as usize;
        let data = self.source.read_slice(self.offset, len).await?;

        let chunk = Chunk::new(self.next_index, data);
        self.offset += len as u64;
        self.next_index += 1;
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn collect<S: ByteSource>(reader: &mut ChunkReader<S>) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_split_one_megabyte() {
        let data: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = ChunkReader::new(MemorySource::new(data.clone()), 262_144);
        assert_eq!(reader.expected_chunks(), 4);

        let chunks = collect(&mut reader).await;
        let lens: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![262_144, 262_144, 262_144, 213_568]);

        let indices: Vec<ChunkIndex> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);

        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.data.iter().copied()).collect();
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn test_chunk_count_matches_ceil() {
        for (size, chunk_size) in [(1usize, 1usize), (10, 3), (9, 3), (4096, 1000), (999, 1000)] {
            let mut reader = ChunkReader::new(MemorySource::new(vec![7u8; size]), chunk_size);
            let chunks = collect(&mut reader).await;
            assert_eq!(chunks.len(), size.div_ceil(chunk_size));
            assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), size);
            // 마지막 청크를 제외하면 모두 chunk_size
            for chunk in &chunks[..chunks.len() - 1] {
                assert_eq!(chunk.len(), chunk_size);
            }
        }
    }

    #[tokio::test]
    async fn test_evenly_divisible_last_chunk_is_full() {
        let mut reader = ChunkReader::new(MemorySource::new(vec![0u8; 300]), 100);
        let chunks = collect(&mut reader).await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 100);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let mut reader = ChunkReader::new(MemorySource::new(Bytes::new()), 100);
        assert_eq!(reader.expected_chunks(), 0);
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_source() {
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let source = FileSource::open(file.path()).await.unwrap();
        assert_eq!(source.size(), 2500);

        let mut reader = ChunkReader::new(source, 1024);
        let chunks = collect(&mut reader).await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 452);

        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.data.iter().copied()).collect();
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn test_missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileSource::open(dir.path().join("missing.webm")).await;
        assert!(matches!(result, Err(Error::SourceUnavailable { .. })));
    }
}
