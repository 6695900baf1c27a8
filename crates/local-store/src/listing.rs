//! Directory listings for remote browsing.

use std::path::Path;

use bulkferry_engine::RemoteEntry;
use bulkferry_transfer::TransferError;

use crate::not_found;

/// Lists the entries directly under `dir`.
///
/// Hidden entries (starting with `.`) are excluded, which also hides
/// multipart staging and partial writes. Sorted case-insensitively.
pub(crate) async fn list_dir(dir: &Path, display: &str) -> Result<Vec<RemoteEntry>, TransferError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found(display)),
        Err(e) => return Err(e.into()),
    };

    let mut result = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        result.push(RemoteEntry {
            name,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            is_dir: metadata.is_dir(),
        });
    }

    result.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(result)
}
