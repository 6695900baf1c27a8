use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::chunked::ChunkPolicy;
use crate::progress::{eta_seconds, percent};
use crate::validation::object_key;
use crate::TransferError;

/// Opaque identifier of a transfer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which way bytes flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("upload"),
            Direction::Download => f.write_str("download"),
        }
    }
}

/// Lifecycle state of a task.
///
/// `Completed`, `Error` and `Canceled` are terminal until an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Error,
    Canceled,
}

impl TaskStatus {
    /// Returns `true` for `Completed`, `Error` and `Canceled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Canceled
        )
    }
}

/// Where a file's bytes live on the local side.
///
/// For uploads this is the source; for downloads, the destination.
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Arc<[u8]>),
}

/// Handle to the local content of one transfer.
#[derive(Debug, Clone, Serialize)]
pub struct FileRef {
    pub name: String,
    pub size: u64,
    #[serde(skip)]
    pub source: FileSource,
}

impl FileRef {
    /// Builds a reference to a local file, reading its size from disk.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await?;
        if meta.is_dir() {
            return Err(TransferError::InvalidInput(format!(
                "not a file: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            size: meta.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Wraps an in-memory buffer.
    pub fn in_memory(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    /// Describes a remote object of known size to be written to `dest`.
    pub fn download_target(name: impl Into<String>, size: u64, dest: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            size,
            source: FileSource::Path(dest.into()),
        }
    }
}

/// One part of a chunked upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkDescriptor {
    /// 1-based part number.
    pub part_number: u32,
    /// Byte offset within the file.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
    pub completed: bool,
    /// Remote etag, set once the part is acknowledged.
    pub etag: Option<String>,
}

impl ChunkDescriptor {
    /// Byte range covered by this chunk.
    pub fn range(&self) -> std::ops::Range<u64> {
        self.offset..self.offset + self.length
    }
}

/// How a task moves its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Strategy {
    Simple,
    Chunked {
        chunk_size: u64,
        chunks: Vec<ChunkDescriptor>,
    },
}

impl Strategy {
    pub fn is_chunked(&self) -> bool {
        matches!(self, Strategy::Chunked { .. })
    }
}

/// One file's transfer lifecycle record.
#[derive(Debug, Clone, Serialize)]
pub struct TransferTask {
    pub id: TaskId,
    pub direction: Direction,
    pub file: FileRef,
    /// Remote directory.
    pub path: String,
    /// Remote object key (`path` joined with the file name).
    pub key: String,
    pub status: TaskStatus,
    pub bytes_transferred: u64,
    /// Bytes per second from the last speed sample.
    pub transfer_speed: f64,
    /// Seconds remaining at the current speed.
    pub estimated_time_remaining: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub strategy: Strategy,
    /// Multipart upload id of the current attempt.
    #[serde(skip)]
    pub upload_id: Option<String>,
    /// Incremented on every admission; results from older attempts are stale.
    #[serde(skip)]
    pub attempt: u32,
}

impl TransferTask {
    /// Creates a pending task.
    ///
    /// Rejects empty files and names or keys that would escape the bucket root.
    pub fn new(
        direction: Direction,
        file: FileRef,
        path: impl Into<String>,
        policy: &ChunkPolicy,
    ) -> Result<Self, TransferError> {
        if file.size == 0 {
            return Err(TransferError::InvalidInput(format!(
                "empty file: {}",
                file.name
            )));
        }
        if file.name.is_empty() || file.name.contains('/') {
            return Err(TransferError::InvalidInput(format!(
                "invalid file name: {:?}",
                file.name
            )));
        }

        let path = path.into();
        let key = object_key(&path, &file.name)?;
        let strategy = policy.strategy_for(direction, file.size);

        Ok(Self {
            id: TaskId::new(),
            direction,
            file,
            path,
            key,
            status: TaskStatus::Pending,
            bytes_transferred: 0,
            transfer_speed: 0.0,
            estimated_time_remaining: None,
            created_at: Utc::now(),
            start_time: None,
            end_time: None,
            error: None,
            strategy,
            upload_id: None,
            attempt: 0,
        })
    }

    pub fn size(&self) -> u64 {
        self.file.size
    }

    /// Completion percentage in `[0, 100]`.
    pub fn progress(&self) -> f64 {
        percent(self.bytes_transferred, self.file.size)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the task into `Active` and returns the new attempt number.
    pub fn mark_active(&mut self) -> u32 {
        self.status = TaskStatus::Active;
        if self.start_time.is_none() {
            self.start_time = Some(Utc::now());
        }
        self.attempt += 1;
        self.attempt
    }

    /// Records a progress report of `loaded` bytes.
    ///
    /// Ignored unless active; never moves backwards. The last byte is only
    /// counted once the task completes, so 100% means confirmed.
    pub fn record_progress(&mut self, loaded: u64) {
        if self.status != TaskStatus::Active {
            return;
        }
        let loaded = loaded.min(self.in_flight_cap());
        if loaded > self.bytes_transferred {
            self.bytes_transferred = loaded;
        }
    }

    /// Marks a chunk as acknowledged with its remote etag.
    ///
    /// Returns `false` if the part is unknown or was already acknowledged.
    pub fn acknowledge_chunk(&mut self, part_number: u32, etag: String) -> bool {
        if self.status != TaskStatus::Active {
            return false;
        }
        let Strategy::Chunked { chunks, .. } = &mut self.strategy else {
            return false;
        };
        let Some(chunk) = chunks.iter_mut().find(|c| c.part_number == part_number) else {
            return false;
        };
        if chunk.completed {
            return false;
        }
        chunk.completed = true;
        chunk.etag = Some(etag);
        self.bytes_transferred =
            (self.bytes_transferred + chunk.length).min(self.in_flight_cap());
        true
    }

    fn in_flight_cap(&self) -> u64 {
        self.file.size.saturating_sub(1)
    }

    /// Returns `true` when every chunk of a chunked task is acknowledged.
    pub fn all_chunks_acknowledged(&self) -> bool {
        match &self.strategy {
            Strategy::Simple => false,
            Strategy::Chunked { chunks, .. } => chunks.iter().all(|c| c.completed),
        }
    }

    /// Updates the sampled speed and the derived ETA.
    pub fn set_speed(&mut self, bytes_per_second: f64) {
        self.transfer_speed = bytes_per_second;
        let remaining = self.file.size.saturating_sub(self.bytes_transferred);
        self.estimated_time_remaining = eta_seconds(remaining, bytes_per_second);
    }

    pub fn mark_completed(&mut self) {
        self.status = TaskStatus::Completed;
        self.bytes_transferred = self.file.size;
        self.finish();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Error;
        self.error = Some(error.into());
        self.finish();
    }

    pub fn mark_canceled(&mut self) {
        self.status = TaskStatus::Canceled;
        self.finish();
    }

    /// Resets a terminal task so it can be queued again.
    pub fn reset_for_retry(&mut self) {
        self.status = TaskStatus::Pending;
        self.bytes_transferred = 0;
        self.transfer_speed = 0.0;
        self.estimated_time_remaining = None;
        self.start_time = None;
        self.end_time = None;
        self.error = None;
        self.upload_id = None;
        if let Strategy::Chunked { chunks, .. } = &mut self.strategy {
            for chunk in chunks {
                chunk.completed = false;
                chunk.etag = None;
            }
        }
    }

    fn finish(&mut self) {
        self.end_time = Some(Utc::now());
        self.transfer_speed = 0.0;
        self.estimated_time_remaining = None;
    }
}
