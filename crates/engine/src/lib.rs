//! Concurrent transfer manager for object storage.
//!
//! This crate implements the **scheduling logic** for bulk uploads and
//! downloads. It is a library crate with no transport dependencies: the
//! caller provides an [`ObjectStore`] implementation that talks to the
//! actual storage API.
//!
//! # Lifecycle
//!
//! 1. **Submit**: each file becomes a `pending` task in a FIFO queue
//! 2. **Admit**: up to `max_concurrent` tasks become `active`
//! 3. **Execute**: one request, or multipart parts for large uploads
//! 4. **Settle**: the task ends `completed`, `error` or `canceled`, its
//!    slot goes to the next queued task
//! 5. **Aggregate**: totals are recomputed and callbacks fire; the
//!    completion callback fires once per submitted batch, when all of its
//!    tasks have settled

pub mod aggregate;
pub mod config;
mod executor;
pub mod manager;
mod sampler;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod mock;

// Re-export primary types for convenience.
pub use aggregate::{OverallStatus, TransferManagerState};
pub use config::TransferConfig;
pub use manager::{StateCallback, TransferManager};
pub use scheduler::AdmissionQueue;
pub use store::{
    CompletedPart, MultipartUpload, ObjectStore, PartReceipt, ProgressFn, RemoteEntry,
    StoreFuture,
};

pub use bulkferry_transfer::{
    Direction, FileRef, FileSource, Strategy, TaskId, TaskStatus, TransferError, TransferTask,
};
