//! Transfer task model with chunk planning and speed estimation.
//!
//! This crate holds the data side of the transfer engine: the per-file
//! [`TransferTask`] lifecycle, the multipart chunk plan, byte-range reads
//! from a [`FileRef`], and the sampled speed/ETA math. Scheduling and
//! network I/O live in `bulkferry-engine`.

mod chunked;
mod progress;
mod types;
mod validation;

pub use chunked::{ChunkPolicy, checksum_bytes, plan_chunks, read_range};
pub use progress::{SpeedSampler, eta_seconds, percent};
pub use types::{
    ChunkDescriptor, Direction, FileRef, FileSource, Strategy, TaskId, TaskStatus, TransferTask,
};
pub use validation::{object_key, validate_object_key};

/// Default size at and above which uploads switch to multipart: 100 MiB.
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Default multipart chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Errors produced by transfers.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("cancelled")]
    Canceled,

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Message stored on a failed task.
    ///
    /// Server messages are passed through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            TransferError::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Returns `true` for failures worth a manual retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransferError::Network(_) | TransferError::Io(_))
    }
}
