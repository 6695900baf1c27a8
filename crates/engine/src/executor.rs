//! Drives one admitted task through the object store.

use std::sync::Arc;

use bulkferry_transfer::{
    ChunkDescriptor, Strategy, TaskId, TransferError, TransferTask, read_range,
};
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::manager::Shared;
use crate::store::{CompletedPart, MultipartUpload, ProgressFn};

/// Runs one attempt of a task to a terminal outcome.
///
/// Cancellation drops the in-flight store call at its next suspension
/// point. Creating a multipart upload is not interrupted, so an upload the
/// store has handed out is always known here and is aborted best-effort
/// when the attempt fails or is cancelled.
pub(crate) async fn run(shared: Arc<Shared>, id: TaskId, attempt: u32, cancel: CancellationToken) {
    let Some(task) = shared.active_task(id, attempt) else {
        return;
    };

    let upload = if task.strategy.is_chunked() {
        match create_upload(&shared, &task, attempt).await {
            Ok(upload) => Some(upload),
            Err(e) => {
                shared.finish(id, attempt, Err(e));
                return;
            }
        }
    } else {
        None
    };

    // A token cancelled during create wins the biased select immediately.
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Canceled),
        result = drive(&shared, &task, attempt, upload.as_ref()) => result,
    };

    let failed = outcome.is_err();
    shared.finish(id, attempt, outcome);

    if failed && let Some(upload) = &upload {
        if let Err(e) = shared.store.abort(upload).await {
            warn!(task = %id, upload_id = %upload.upload_id, error = %e, "multipart abort failed");
        } else {
            debug!(task = %id, upload_id = %upload.upload_id, "multipart upload aborted");
        }
    }
}

async fn create_upload(
    shared: &Arc<Shared>,
    task: &TransferTask,
    attempt: u32,
) -> Result<MultipartUpload, TransferError> {
    let upload = shared.store.multipart_create(&task.file, &task.path).await?;
    let parts = match &task.strategy {
        Strategy::Chunked { chunks, .. } => chunks.len(),
        Strategy::Simple => 0,
    };
    debug!(
        task = %task.id,
        upload_id = %upload.upload_id,
        parts,
        "multipart upload created"
    );
    shared.with_active_task(task.id, attempt, |t| {
        t.upload_id = Some(upload.upload_id.clone());
    });
    Ok(upload)
}

async fn drive(
    shared: &Arc<Shared>,
    task: &TransferTask,
    attempt: u32,
    upload: Option<&MultipartUpload>,
) -> Result<(), TransferError> {
    match (&task.strategy, upload) {
        (Strategy::Chunked { chunks, .. }, Some(upload)) => {
            transfer_chunked(shared, task, attempt, chunks, upload).await
        }
        _ => transfer_simple(shared, task, attempt).await,
    }
}

async fn transfer_simple(
    shared: &Arc<Shared>,
    task: &TransferTask,
    attempt: u32,
) -> Result<(), TransferError> {
    let on_progress: ProgressFn = {
        let shared = Arc::downgrade(shared);
        let id = task.id;
        Arc::new(move |loaded, _total| {
            if let Some(shared) = shared.upgrade() {
                shared.with_active_task(id, attempt, |t| t.record_progress(loaded));
            }
        })
    };

    shared
        .store
        .transfer_simple(task.direction, &task.file, &task.path, on_progress)
        .await
}

async fn transfer_chunked(
    shared: &Arc<Shared>,
    task: &TransferTask,
    attempt: u32,
    chunks: &[ChunkDescriptor],
    upload: &MultipartUpload,
) -> Result<(), TransferError> {
    let pending: Vec<ChunkDescriptor> = chunks.iter().filter(|c| !c.completed).cloned().collect();

    let mut parts = stream::iter(pending)
        .map(|chunk| {
            let store = Arc::clone(&shared.store);
            let source = task.file.source.clone();
            let upload = upload.clone();
            async move {
                let bytes = read_range(&source, chunk.range()).await?;
                let receipt = store
                    .multipart_upload_part(&upload, chunk.part_number, bytes)
                    .await?;
                Ok::<_, TransferError>((chunk.part_number, receipt.etag))
            }
        })
        .buffer_unordered(shared.config.max_concurrent_chunks.max(1))
        .boxed();

    while let Some(result) = parts.next().await {
        let (part_number, etag) = result?;
        debug!(task = %task.id, part_number, "part acknowledged");
        shared.with_active_task(task.id, attempt, |t| t.acknowledge_chunk(part_number, etag));
    }
    drop(parts);

    let completed = shared
        .with_active_task(task.id, attempt, |t| completed_parts(t))
        .ok_or(TransferError::Canceled)?;
    let Some(completed) = completed else {
        return Err(TransferError::InvalidInput(format!(
            "upload {} has unacknowledged parts",
            upload.upload_id
        )));
    };

    shared.store.multipart_complete(upload, &completed).await
}

/// Part list for completion, in part-number order, or `None` while any
/// chunk is unacknowledged.
fn completed_parts(task: &TransferTask) -> Option<Vec<CompletedPart>> {
    let Strategy::Chunked { chunks, .. } = &task.strategy else {
        return None;
    };
    let mut parts = chunks
        .iter()
        .map(|c| {
            Some(CompletedPart {
                part_number: c.part_number,
                etag: c.etag.clone().filter(|_| c.completed)?,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    parts.sort_by_key(|p| p.part_number);
    Some(parts)
}
