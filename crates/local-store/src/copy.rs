//! Buffered copies that report progress.

use std::path::{Path, PathBuf};

use bulkferry_engine::ProgressFn;
use bulkferry_transfer::TransferError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Buffer size for file copies.
pub(crate) const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Copies `reader` into `writer`, reporting cumulative bytes after every
/// write. Returns the number of bytes copied.
pub(crate) async fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    total: u64,
    on_progress: &ProgressFn,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied: u64 = 0;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        copied += n as u64;
        on_progress(copied, total);
    }

    writer.flush().await?;
    Ok(copied)
}

/// Temporary sibling that a file is written to before being renamed into
/// place. Hidden, so listings skip it.
pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.partial"))
}

/// A `.partial` file that is removed on drop unless persisted.
///
/// Covers writes abandoned by an error or by the caller dropping the
/// transfer future mid-copy.
pub(crate) struct PartialFile {
    path: PathBuf,
    persisted: bool,
}

impl PartialFile {
    pub(crate) fn for_dest(dest: &Path) -> Self {
        Self {
            path: partial_path(dest),
            persisted: false,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the partial file over `dest`.
    pub(crate) async fn persist(mut self, dest: &Path) -> Result<(), TransferError> {
        tokio::fs::rename(&self.path, dest).await?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Creates the parent directory of `path` if needed.
pub(crate) async fn ensure_parent(path: &Path) -> Result<(), TransferError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}
