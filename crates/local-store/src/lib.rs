//! Filesystem-backed object store.
//!
//! [`LocalStore`] maps object keys to files under a root directory. It
//! supports simple transfers in both directions and staged multipart
//! uploads, which makes it usable as a real target for the CLI and as the
//! store behind end-to-end tests.

mod copy;
mod listing;
mod multipart;

use std::path::{Path, PathBuf};

use bulkferry_engine::{
    CompletedPart, MultipartUpload, ObjectStore, PartReceipt, ProgressFn, RemoteEntry,
    StoreFuture,
};
use bulkferry_transfer::{
    Direction, FileRef, FileSource, TransferError, checksum_bytes, object_key,
    validate_object_key,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::copy::{PartialFile, copy_with_progress, ensure_parent};
use crate::multipart::{STAGING_DIR, assemble, part_path, staging_dir};

/// Error for a key or directory that does not exist.
pub(crate) fn not_found(key: &str) -> TransferError {
    TransferError::Server {
        status: 404,
        message: format!("not found: {key}"),
    }
}

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Creates a store over `root` without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a store over `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let store = Self::new(root);
        tokio::fs::create_dir_all(&store.root).await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of an object key.
    fn object_path(&self, key: &str) -> Result<PathBuf, TransferError> {
        validate_object_key(key)?;
        Ok(self.root.join(key))
    }

    /// Filesystem path of a remote directory; empty and `/` mean the root.
    fn dir_path(&self, dir: &str) -> Result<PathBuf, TransferError> {
        let dir = dir.trim_matches('/');
        if dir.is_empty() {
            return Ok(self.root.clone());
        }
        self.object_path(dir)
    }

    async fn upload(
        &self,
        file: &FileRef,
        key: &str,
        on_progress: &ProgressFn,
    ) -> Result<(), TransferError> {
        let dest = self.object_path(key)?;
        ensure_parent(&dest).await?;
        let partial = PartialFile::for_dest(&dest);

        let mut out = tokio::fs::File::create(partial.path()).await?;
        let copied = match &file.source {
            FileSource::Path(path) => {
                let mut src = tokio::fs::File::open(path).await?;
                copy_with_progress(&mut src, &mut out, file.size, on_progress).await?
            }
            FileSource::Memory(data) => {
                let mut src = &data[..];
                copy_with_progress(&mut src, &mut out, file.size, on_progress).await?
            }
        };
        drop(out);

        if copied != file.size {
            return Err(TransferError::InvalidInput(format!(
                "{} changed size during upload: expected {} bytes, read {copied}",
                file.name, file.size
            )));
        }

        partial.persist(&dest).await?;
        debug!(key, bytes = copied, "object written");
        Ok(())
    }

    async fn download(
        &self,
        file: &FileRef,
        key: &str,
        on_progress: &ProgressFn,
    ) -> Result<(), TransferError> {
        let FileSource::Path(dest) = &file.source else {
            return Err(TransferError::InvalidInput(format!(
                "download target for {} must be a local path",
                file.name
            )));
        };

        let src_path = self.object_path(key)?;
        let mut src = match tokio::fs::File::open(&src_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found(key)),
            Err(e) => return Err(e.into()),
        };
        let total = src.metadata().await?.len();

        ensure_parent(dest).await?;
        let partial = PartialFile::for_dest(dest);
        let mut out = tokio::fs::File::create(partial.path()).await?;
        let copied = copy_with_progress(&mut src, &mut out, total, on_progress).await?;
        drop(out);

        partial.persist(dest).await?;
        debug!(key, bytes = copied, dest = %dest.display(), "object downloaded");
        Ok(())
    }

    async fn create_upload(
        &self,
        file: &FileRef,
        path: &str,
    ) -> Result<MultipartUpload, TransferError> {
        let key = object_key(path, &file.name)?;
        let upload_id = Uuid::new_v4().to_string();
        tokio::fs::create_dir_all(staging_dir(&self.root, &upload_id)?).await?;
        info!(%key, %upload_id, "multipart upload started");
        Ok(MultipartUpload { upload_id, key })
    }

    async fn store_part(
        &self,
        upload: &MultipartUpload,
        part_number: u32,
        bytes: Vec<u8>,
    ) -> Result<PartReceipt, TransferError> {
        if part_number == 0 {
            return Err(TransferError::InvalidInput("part numbers start at 1".into()));
        }
        let staging = staging_dir(&self.root, &upload.upload_id)?;
        if !tokio::fs::try_exists(&staging).await? {
            return Err(not_found(&upload.upload_id));
        }

        let etag = checksum_bytes(&bytes);
        tokio::fs::write(part_path(&staging, part_number), &bytes).await?;
        debug!(upload_id = %upload.upload_id, part_number, size = bytes.len(), "part stored");
        Ok(PartReceipt { etag })
    }

    async fn complete_upload(
        &self,
        upload: &MultipartUpload,
        parts: &[CompletedPart],
    ) -> Result<(), TransferError> {
        let staging = staging_dir(&self.root, &upload.upload_id)?;
        if !tokio::fs::try_exists(&staging).await? {
            return Err(not_found(&upload.upload_id));
        }

        let dest = self.object_path(&upload.key)?;
        ensure_parent(&dest).await?;
        let partial = PartialFile::for_dest(&dest);

        let mut out = tokio::fs::File::create(partial.path()).await?;
        let written = assemble(&staging, parts, &mut out).await?;
        drop(out);

        partial.persist(&dest).await?;
        tokio::fs::remove_dir_all(&staging).await?;
        info!(
            key = %upload.key,
            upload_id = %upload.upload_id,
            parts = parts.len(),
            bytes = written,
            "multipart upload completed"
        );
        Ok(())
    }

    async fn abort_upload(&self, upload: &MultipartUpload) -> Result<(), TransferError> {
        let staging = staging_dir(&self.root, &upload.upload_id)?;
        match tokio::fs::remove_dir_all(&staging).await {
            Ok(()) => {
                info!(upload_id = %upload.upload_id, "multipart upload aborted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl ObjectStore for LocalStore {
    fn transfer_simple<'a>(
        &'a self,
        direction: Direction,
        file: &'a FileRef,
        path: &'a str,
        on_progress: ProgressFn,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let key = object_key(path, &file.name)?;
            match direction {
                Direction::Upload => self.upload(file, &key, &on_progress).await,
                Direction::Download => self.download(file, &key, &on_progress).await,
            }
        })
    }

    fn multipart_create<'a>(
        &'a self,
        file: &'a FileRef,
        path: &'a str,
    ) -> StoreFuture<'a, MultipartUpload> {
        Box::pin(self.create_upload(file, path))
    }

    fn multipart_upload_part<'a>(
        &'a self,
        upload: &'a MultipartUpload,
        part_number: u32,
        bytes: Vec<u8>,
    ) -> StoreFuture<'a, PartReceipt> {
        Box::pin(self.store_part(upload, part_number, bytes))
    }

    fn multipart_complete<'a>(
        &'a self,
        upload: &'a MultipartUpload,
        parts: &'a [CompletedPart],
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.complete_upload(upload, parts))
    }

    fn abort<'a>(&'a self, upload: &'a MultipartUpload) -> StoreFuture<'a, ()> {
        Box::pin(self.abort_upload(upload))
    }

    fn list_files<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Vec<RemoteEntry>> {
        Box::pin(async move {
            let dir = self.dir_path(path)?;
            listing::list_dir(&dir, path).await
        })
    }
}
