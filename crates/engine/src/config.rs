//! Engine tuning knobs.

use std::time::Duration;

use bulkferry_transfer::{
    ChunkPolicy, DEFAULT_CHUNK_SIZE, DEFAULT_MULTIPART_THRESHOLD, Direction, TransferError,
};
use serde::{Deserialize, Serialize};

/// Concurrency limits, multipart thresholds, and sampling cadence.
///
/// Every field has a default, so partial configs deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub max_concurrent_uploads: usize,
    pub max_concurrent_downloads: usize,
    /// Uploads of at least this many bytes use multipart.
    pub multipart_threshold: u64,
    pub chunk_size: u64,
    /// Parts in flight per chunked task.
    pub max_concurrent_chunks: usize,
    pub progress_interval_ms: u64,
    pub speed_interval_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: 3,
            max_concurrent_downloads: 3,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_chunks: 3,
            progress_interval_ms: 500,
            speed_interval_ms: 2000,
        }
    }
}

impl TransferConfig {
    /// Rejects zero limits and intervals.
    pub fn validate(&self) -> Result<(), TransferError> {
        let checks = [
            ("max_concurrent_uploads", self.max_concurrent_uploads as u64),
            ("max_concurrent_downloads", self.max_concurrent_downloads as u64),
            ("chunk_size", self.chunk_size),
            ("max_concurrent_chunks", self.max_concurrent_chunks as u64),
            ("progress_interval_ms", self.progress_interval_ms),
            ("speed_interval_ms", self.speed_interval_ms),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(TransferError::InvalidInput(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    /// Active-slot bound for the given direction.
    pub fn max_concurrent(&self, direction: Direction) -> usize {
        match direction {
            Direction::Upload => self.max_concurrent_uploads,
            Direction::Download => self.max_concurrent_downloads,
        }
    }

    pub fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy {
            multipart_threshold: self.multipart_threshold,
            chunk_size: self.chunk_size,
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn speed_interval(&self) -> Duration {
        Duration::from_millis(self.speed_interval_ms)
    }
}
