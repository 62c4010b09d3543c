//! Hashed upload spooling.
//!
//! `HashedBuffer` consumes a byte stream once, computing the full digest
//! set and byte count on the way through, and yields a seekable handle to
//! the spooled bytes. Small payloads stay in memory; anything over the
//! configured threshold spills to an anonymous temp file, so arbitrarily
//! large artifacts never reside in memory at once.

use crate::error::{StorageError, StorageResult};
use crate::traits::ByteStream;
use bytes::Bytes;
use depot_core::{DigestSet, MultiHasher, DEFAULT_SPOOL_MEMORY_LIMIT};
use futures::StreamExt;
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::SpooledTempFile;

/// Chunk size for draining a spool back out as a stream (64 KiB).
const DRAIN_CHUNK_SIZE: usize = 64 * 1024;

/// A seekable spool of uploaded bytes with digests computed in one pass.
pub struct HashedBuffer {
    file: SpooledTempFile,
    hasher: MultiHasher,
    size: u64,
}

impl HashedBuffer {
    /// Create an empty spool with the default in-memory threshold.
    pub fn new() -> Self {
        Self::with_memory_limit(DEFAULT_SPOOL_MEMORY_LIMIT)
    }

    /// Create an empty spool that spills to disk beyond `memory_limit`.
    pub fn with_memory_limit(memory_limit: usize) -> Self {
        Self {
            file: SpooledTempFile::new(memory_limit),
            hasher: MultiHasher::new(),
            size: 0,
        }
    }

    /// Append a chunk, updating all digests.
    pub fn write_chunk(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.file.write_all(data)?;
        self.hasher.update(data);
        self.size += data.len() as u64;
        Ok(())
    }

    /// Total bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Digest set of everything written so far.
    pub fn digests(&self) -> DigestSet {
        self.hasher.snapshot()
    }

    /// Seek back to the start for reading.
    pub fn rewind(&mut self) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Spool an entire blocking reader. Used by extractors that carve an
    /// inner artifact out of the upload envelope, and by tests.
    pub fn from_reader(mut reader: impl Read, memory_limit: usize) -> std::io::Result<Self> {
        let mut buf = Self::with_memory_limit(memory_limit);
        let mut chunk = vec![0u8; DRAIN_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            buf.write_chunk(&chunk[..n])?;
        }
        buf.rewind()?;
        Ok(buf)
    }

    /// Spool an async byte stream without blocking the runtime.
    ///
    /// The stream is consumed on the async side while a blocking task owns
    /// the spool; a bounded channel bridges the two. Exceeding `max_size`
    /// aborts the transfer with `TooLarge` and nothing is handed onward.
    pub async fn from_stream(
        mut stream: ByteStream,
        memory_limit: usize,
        max_size: u64,
    ) -> StorageResult<Self> {
        let (tx, rx) = std::sync::mpsc::sync_channel::<Bytes>(8);
        let writer = tokio::task::spawn_blocking(move || -> StorageResult<HashedBuffer> {
            let mut buf = HashedBuffer::with_memory_limit(memory_limit);
            while let Ok(chunk) = rx.recv() {
                buf.write_chunk(&chunk)?;
            }
            buf.rewind()?;
            Ok(buf)
        });

        let mut total: u64 = 0;
        let mut source_error = None;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    total += chunk.len() as u64;
                    if total > max_size {
                        source_error = Some(StorageError::TooLarge {
                            size: total,
                            limit: max_size,
                        });
                        break;
                    }
                    if tx.send(chunk).is_err() {
                        // Writer died; its join result carries the cause.
                        break;
                    }
                }
                Err(e) => {
                    source_error = Some(e);
                    break;
                }
            }
        }
        drop(tx);

        let buf = writer
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(format!("spool task failed: {e}"))))??;
        if let Some(e) = source_error {
            return Err(e);
        }
        Ok(buf)
    }

    /// Drain the spooled bytes back out as an async byte stream.
    ///
    /// Reads happen on a blocking task; the stream yields fixed-size
    /// chunks until exhausted.
    pub fn into_byte_stream(mut self) -> ByteStream {
        let (tx, rx) = tokio::sync::mpsc::channel::<StorageResult<Bytes>>(8);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = self.rewind() {
                let _ = tx.blocking_send(Err(StorageError::Io(e)));
                return;
            }
            let mut chunk = vec![0u8; DRAIN_CHUNK_SIZE];
            loop {
                match self.file.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(Ok(Bytes::copy_from_slice(&chunk[..n]))).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(Err(StorageError::Io(e)));
                        break;
                    }
                }
            }
        });

        let stream = async_stream::stream! {
            let mut rx = rx;
            while let Some(item) = rx.recv().await {
                yield item;
            }
        };
        Box::pin(stream)
    }
}

impl Default for HashedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for HashedBuffer {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for HashedBuffer {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_of(chunks: Vec<&'static [u8]>) -> ByteStream {
        Box::pin(futures::stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    #[test]
    fn test_digests_match_content() {
        let mut buf = HashedBuffer::new();
        buf.write_chunk(b"hello ").unwrap();
        buf.write_chunk(b"world").unwrap();
        assert_eq!(buf.size(), 11);
        assert_eq!(buf.digests(), DigestSet::compute(b"hello world"));

        buf.rewind().unwrap();
        let mut out = Vec::new();
        buf.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_spills_to_disk_beyond_limit() {
        let mut buf = HashedBuffer::with_memory_limit(16);
        let data = vec![7u8; 1024];
        buf.write_chunk(&data).unwrap();
        assert!(buf.file.is_rolled());
        assert_eq!(buf.digests(), DigestSet::compute(&data));

        buf.rewind().unwrap();
        let mut out = Vec::new();
        buf.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_from_stream_roundtrip() {
        let buf = HashedBuffer::from_stream(
            stream_of(vec![b"one ", b"two ", b"three"]),
            1024,
            u64::MAX,
        )
        .await
        .unwrap();
        assert_eq!(buf.size(), 13);
        assert_eq!(buf.digests(), DigestSet::compute(b"one two three"));
    }

    #[tokio::test]
    async fn test_from_stream_enforces_size_limit() {
        let result =
            HashedBuffer::from_stream(stream_of(vec![b"0123456789"]), 1024, 5).await;
        assert!(matches!(result, Err(StorageError::TooLarge { size: 10, limit: 5 })));
    }

    #[tokio::test]
    async fn test_from_stream_propagates_source_errors() {
        let stream: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ok")),
            Err(StorageError::Io(std::io::Error::other("connection reset"))),
        ]));
        let result = HashedBuffer::from_stream(stream, 1024, u64::MAX).await;
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[tokio::test]
    async fn test_into_byte_stream_roundtrip() {
        let mut buf = HashedBuffer::with_memory_limit(8);
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        buf.write_chunk(&data).unwrap();

        let mut stream = buf.into_byte_stream();
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(out, data);
    }
}
