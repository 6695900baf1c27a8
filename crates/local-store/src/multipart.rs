//! Staging area for multipart uploads.
//!
//! Each upload gets `<root>/.multipart/<upload id>/`, holding one file per
//! part. Completion concatenates the parts in order into the final object.

use std::path::{Path, PathBuf};

use bulkferry_engine::CompletedPart;
use bulkferry_transfer::{TransferError, checksum_bytes};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Directory under the store root that holds staged parts.
pub(crate) const STAGING_DIR: &str = ".multipart";

/// Staging directory of one upload.
pub(crate) fn staging_dir(root: &Path, upload_id: &str) -> Result<PathBuf, TransferError> {
    let id = Uuid::parse_str(upload_id)
        .map_err(|_| TransferError::InvalidInput(format!("malformed upload id: {upload_id}")))?;
    Ok(root.join(STAGING_DIR).join(id.to_string()))
}

pub(crate) fn part_path(staging: &Path, part_number: u32) -> PathBuf {
    staging.join(format!("part-{part_number:05}"))
}

/// Checks that parts are non-empty and strictly ascending.
pub(crate) fn check_part_order(parts: &[CompletedPart]) -> Result<(), TransferError> {
    if parts.is_empty() {
        return Err(TransferError::InvalidInput("no parts to complete".into()));
    }
    if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
        return Err(TransferError::InvalidInput(
            "parts must be in ascending order".into(),
        ));
    }
    Ok(())
}

/// Concatenates staged parts into `writer`, verifying each etag.
pub(crate) async fn assemble<W>(
    staging: &Path,
    parts: &[CompletedPart],
    writer: &mut W,
) -> Result<u64, TransferError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    check_part_order(parts)?;

    let mut written = 0;
    for part in parts {
        let bytes = match tokio::fs::read(part_path(staging, part.part_number)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::Server {
                    status: 400,
                    message: format!("part {} was never uploaded", part.part_number),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if checksum_bytes(&bytes) != part.etag {
            return Err(TransferError::Server {
                status: 400,
                message: format!("etag mismatch for part {}", part.part_number),
            });
        }
        writer.write_all(&bytes).await?;
        written += bytes.len() as u64;
    }
    writer.flush().await?;
    Ok(written)
}
