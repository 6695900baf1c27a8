use std::ops::Range;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::types::{ChunkDescriptor, Direction, FileSource, Strategy};
use crate::{DEFAULT_CHUNK_SIZE, DEFAULT_MULTIPART_THRESHOLD, TransferError};

/// Decides between simple and chunked transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    /// Uploads of at least this many bytes go multipart.
    pub multipart_threshold: u64,
    pub chunk_size: u64,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunkPolicy {
    /// Picks the strategy for a file of `size` bytes.
    ///
    /// Only uploads are chunked; downloads always use one request.
    pub fn strategy_for(&self, direction: Direction, size: u64) -> Strategy {
        if direction == Direction::Upload && size >= self.multipart_threshold {
            Strategy::Chunked {
                chunk_size: self.chunk_size,
                chunks: plan_chunks(size, self.chunk_size),
            }
        } else {
            Strategy::Simple
        }
    }
}

/// Splits `size` bytes into consecutive parts of `chunk_size` bytes.
///
/// The last part carries the remainder. Part numbers start at 1.
/// A `chunk_size` of 0 falls back to [`DEFAULT_CHUNK_SIZE`].
pub fn plan_chunks(size: u64, chunk_size: u64) -> Vec<ChunkDescriptor> {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };

    let mut chunks = Vec::with_capacity(size.div_ceil(chunk_size) as usize);
    let mut offset = 0;
    let mut part_number = 1;
    while offset < size {
        let length = chunk_size.min(size - offset);
        chunks.push(ChunkDescriptor {
            part_number,
            offset,
            length,
            completed: false,
            etag: None,
        });
        offset += length;
        part_number += 1;
    }
    chunks
}

/// Reads the bytes in `range` from a local source.
pub async fn read_range(source: &FileSource, range: Range<u64>) -> Result<Vec<u8>, TransferError> {
    if range.end < range.start {
        return Err(TransferError::InvalidInput(format!(
            "inverted range {}..{}",
            range.start, range.end
        )));
    }
    let len = (range.end - range.start) as usize;

    match source {
        FileSource::Memory(data) => {
            let (start, end) = (range.start as usize, range.end as usize);
            data.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
                TransferError::InvalidInput(format!(
                    "range {start}..{end} outside buffer of {} bytes",
                    data.len()
                ))
            })
        }
        FileSource::Path(path) => {
            let mut file = tokio::fs::File::open(path).await?;
            file.seek(std::io::SeekFrom::Start(range.start)).await?;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf).await?;
            Ok(buf)
        }
    }
}

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
