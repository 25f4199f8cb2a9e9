// 上传分片切分
//
// 把一个输入流按固定大小切成若干分片，按输入顺序逐个产出：
// - 除最后一个外每个分片都恰好 chunk_size 字节
// - 输入为空时不产出任何分片
// - 分片在内存中缓冲，大小受 MAX_CHUNK_SIZE 限制

use crate::error::UploadError;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// 单个分片的大小上限: 256MB
pub const MAX_CHUNK_SIZE: u64 = 256 * 1024 * 1024;

/// 单次预分配的缓冲区上限: 8MB
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

/// 一个分片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkStream {
    /// 在原始输入中的位置（从 0 开始）
    pub index: usize,
    /// 分片数据
    pub data: Bytes,
}

impl ChunkStream {
    pub fn new(index: usize, data: impl Into<Bytes>) -> Self {
        Self {
            index,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 分片切分器
pub struct ChunkSplitter<R> {
    reader: R,
    chunk_size: u64,
    next_index: usize,
    finished: bool,
}

impl<R: AsyncRead + Unpin> ChunkSplitter<R> {
    /// 创建切分器
    ///
    /// `chunk_size` 必须大于 0 且不超过 `MAX_CHUNK_SIZE`
    pub fn new(reader: R, chunk_size: u64) -> Result<Self, UploadError> {
        if chunk_size == 0 {
            return Err(UploadError::InvalidOptions(
                "分片大小必须大于 0".to_string(),
            ));
        }
        if chunk_size > MAX_CHUNK_SIZE {
            return Err(UploadError::InvalidOptions(format!(
                "分片大小 {} 超过上限 {}",
                chunk_size, MAX_CHUNK_SIZE
            )));
        }

        Ok(Self {
            reader,
            chunk_size,
            next_index: 0,
            finished: false,
        })
    }

    /// 读取下一个分片，输入结束时返回 `None`
    pub async fn next_chunk(&mut self) -> Result<Option<ChunkStream>, UploadError> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = Vec::with_capacity(self.chunk_size.min(MAX_PREALLOC) as usize);
        (&mut self.reader)
            .take(self.chunk_size)
            .read_to_end(&mut buf)
            .await?;

        if buf.is_empty() {
            self.finished = true;
            return Ok(None);
        }

        // 不足一个分片说明已经读到末尾
        if (buf.len() as u64) < self.chunk_size {
            self.finished = true;
        }

        let chunk = ChunkStream::new(self.next_index, buf);
        self.next_index += 1;
        debug!("切出分片 #{}: {} bytes", chunk.index, chunk.len());
        Ok(Some(chunk))
    }

    /// 读取全部分片
    pub async fn collect_all(mut self) -> Result<Vec<ChunkStream>, UploadError> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

/// 不切分，整个输入作为一个分片
///
/// 输入超过 `MAX_CHUNK_SIZE` 时返回 `InvalidOptions`
pub async fn read_single<R: AsyncRead + Unpin>(reader: R) -> Result<ChunkStream, UploadError> {
    read_single_capped(reader, MAX_CHUNK_SIZE).await
}

pub(crate) async fn read_single_capped<R: AsyncRead + Unpin>(
    reader: R,
    cap: u64,
) -> Result<ChunkStream, UploadError> {
    // 多读一个字节用来判断是否超限
    let mut buf = Vec::new();
    reader.take(cap.saturating_add(1)).read_to_end(&mut buf).await?;
    if buf.len() as u64 > cap {
        return Err(UploadError::InvalidOptions(format!(
            "输入超过单个分片上限 {} bytes，请设置 chunkSize 切分上传",
            cap
        )));
    }
    Ok(ChunkStream::new(0, buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    async fn split(data: &[u8], chunk_size: u64) -> Vec<ChunkStream> {
        ChunkSplitter::new(data, chunk_size)
            .unwrap()
            .collect_all()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_split_with_remainder() {
        let chunks = split(b"0123456789", 4).await;
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(&chunks[0].data[..], b"0123");
        assert_eq!(&chunks[2].data[..], b"89");
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_empty_tail() {
        let chunks = split(b"abcdefgh", 4).await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 4));
    }

    #[tokio::test]
    async fn test_empty_input_yields_nothing() {
        let mut splitter = ChunkSplitter::new(&b""[..], 4).unwrap();
        assert!(splitter.next_chunk().await.unwrap().is_none());
        // 结束后继续调用仍然返回 None
        assert!(splitter.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chunk_larger_than_input() {
        let chunks = split(b"abc", 1024).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0].data[..], b"abc");
    }

    #[test]
    fn test_chunk_size_limits() {
        assert!(matches!(
            ChunkSplitter::new(&b"x"[..], 0),
            Err(UploadError::InvalidOptions(_))
        ));
        assert!(matches!(
            ChunkSplitter::new(&b"x"[..], MAX_CHUNK_SIZE + 1),
            Err(UploadError::InvalidOptions(_))
        ));
        assert!(ChunkSplitter::new(&b"x"[..], MAX_CHUNK_SIZE).is_ok());
    }

    #[tokio::test]
    async fn test_read_single() {
        let chunk = read_single(&b"0123456789"[..]).await.unwrap();
        assert_eq!(chunk.index, 0);
        assert_eq!(chunk.len(), 10);

        let empty = read_single(&b""[..]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_read_single_rejects_oversized_input() {
        let exact = read_single_capped(&b"01234567"[..], 8).await.unwrap();
        assert_eq!(exact.len(), 8);

        let err = read_single_capped(&b"0123456789"[..], 8).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidOptions(_)), "{:?}", err);
    }

    proptest! {
        #[test]
        fn prop_split_reassembles_input(
            data in prop::collection::vec(any::<u8>(), 0..2048),
            chunk_size in 1u64..300
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let chunks = runtime.block_on(split(&data, chunk_size));

            let expected = (data.len() as u64 + chunk_size - 1) / chunk_size;
            prop_assert_eq!(chunks.len() as u64, expected);
            prop_assert!(chunks.iter().all(|c| c.len() as u64 <= chunk_size));

            let joined: Vec<u8> = chunks.iter().flat_map(|c| c.data.iter().copied()).collect();
            prop_assert_eq!(joined, data);
        }
    }
}
