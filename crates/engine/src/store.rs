//! Object-storage collaborator trait.
//!
//! `ObjectStore` is implemented by whatever talks to the remote API.
//! Using a trait keeps scheduling logic decoupled from transport and
//! testable with mocks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bulkferry_transfer::{Direction, FileRef, TransferError};
use serde::Serialize;

/// Boxed future returned by [`ObjectStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// Progress callback handed to simple transfers: `(loaded, total)` bytes.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Handle of a multipart upload created on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUpload {
    pub upload_id: String,
    pub key: String,
}

/// Acknowledgement of one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartReceipt {
    pub etag: String,
}

/// A part reference sent when completing a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Remote object-storage API consumed by the transfer engine.
pub trait ObjectStore: Send + Sync {
    /// Moves a whole file in one request.
    ///
    /// Uploads read from `file.source`; downloads write the object at
    /// `path/file.name` into it. `on_progress` may be called any number of
    /// times with cumulative byte counts.
    fn transfer_simple<'a>(
        &'a self,
        direction: Direction,
        file: &'a FileRef,
        path: &'a str,
        on_progress: ProgressFn,
    ) -> StoreFuture<'a, ()>;

    /// Starts a multipart upload for `file` under `path`.
    fn multipart_create<'a>(
        &'a self,
        file: &'a FileRef,
        path: &'a str,
    ) -> StoreFuture<'a, MultipartUpload>;

    /// Uploads one part and returns its etag.
    fn multipart_upload_part<'a>(
        &'a self,
        upload: &'a MultipartUpload,
        part_number: u32,
        bytes: Vec<u8>,
    ) -> StoreFuture<'a, PartReceipt>;

    /// Assembles the uploaded parts, given in part-number order.
    fn multipart_complete<'a>(
        &'a self,
        upload: &'a MultipartUpload,
        parts: &'a [CompletedPart],
    ) -> StoreFuture<'a, ()>;

    /// Best-effort cancellation of a multipart upload.
    fn abort<'a>(&'a self, upload: &'a MultipartUpload) -> StoreFuture<'a, ()>;

    /// Lists the entries directly under `path`.
    fn list_files<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Vec<RemoteEntry>>;
}
