//! Scriptable in-memory `ObjectStore` for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use bulkferry_transfer::{Direction, FileRef, TransferError};
use tokio::sync::oneshot;

use crate::store::{
    CompletedPart, MultipartUpload, ObjectStore, PartReceipt, ProgressFn, RemoteEntry, StoreFuture,
};

type Outcome = Result<(), TransferError>;

#[derive(Default)]
pub(crate) struct MockStore {
    /// Simple transfers wait for `release` instead of finishing on their own.
    hold: bool,
    /// Parts never finish.
    hold_parts: bool,
    /// `multipart_create` waits for `release_create`.
    hold_create: bool,
    fail_names: HashSet<String>,
    fail_part: Option<u32>,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    started: Vec<String>,
    waiters: HashMap<String, oneshot::Sender<Outcome>>,
    create_waiter: Option<oneshot::Sender<()>>,
    in_flight: usize,
    max_in_flight: usize,
    uploads_created: usize,
    parts_in_flight: usize,
    max_parts_in_flight: usize,
    parts_uploaded: Vec<u32>,
    completes: Vec<(String, Vec<CompletedPart>)>,
    aborts: usize,
}

pub(crate) fn server_error(message: &str) -> TransferError {
    TransferError::Server {
        status: 500,
        message: message.to_string(),
    }
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn holding(mut self) -> Self {
        self.hold = true;
        self
    }

    pub(crate) fn holding_parts(mut self) -> Self {
        self.hold_parts = true;
        self
    }

    pub(crate) fn holding_create(mut self) -> Self {
        self.hold_create = true;
        self
    }

    pub(crate) fn failing(mut self, name: &str) -> Self {
        self.fail_names.insert(name.to_string());
        self
    }

    pub(crate) fn failing_part(mut self, part_number: u32) -> Self {
        self.fail_part = Some(part_number);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Finishes a held transfer of `name`. Returns `false` if none is waiting.
    pub(crate) fn release(&self, name: &str, outcome: Outcome) -> bool {
        match self.lock().waiters.remove(name) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Lets a held `multipart_create` return.
    pub(crate) fn release_create(&self) -> bool {
        match self.lock().create_waiter.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub(crate) fn is_creating(&self) -> bool {
        self.lock().create_waiter.is_some()
    }

    /// Names of simple transfers in the order they started.
    pub(crate) fn started(&self) -> Vec<String> {
        self.lock().started.clone()
    }

    pub(crate) fn is_waiting(&self, name: &str) -> bool {
        self.lock().waiters.contains_key(name)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }

    pub(crate) fn uploads_created(&self) -> usize {
        self.lock().uploads_created
    }

    pub(crate) fn max_parts_in_flight(&self) -> usize {
        self.lock().max_parts_in_flight
    }

    pub(crate) fn parts_uploaded(&self) -> Vec<u32> {
        self.lock().parts_uploaded.clone()
    }

    pub(crate) fn completes(&self) -> Vec<(String, Vec<CompletedPart>)> {
        self.lock().completes.clone()
    }

    pub(crate) fn aborts(&self) -> usize {
        self.lock().aborts
    }
}

/// Decrements an in-flight counter when the call finishes or is dropped.
struct InFlight<'a> {
    store: &'a MockStore,
    part: bool,
}

impl<'a> InFlight<'a> {
    fn enter(store: &'a MockStore, part: bool) -> Self {
        let mut state = store.lock();
        if part {
            state.parts_in_flight += 1;
            state.max_parts_in_flight = state.max_parts_in_flight.max(state.parts_in_flight);
        } else {
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        Self { store, part }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.store.lock();
        if self.part {
            state.parts_in_flight -= 1;
        } else {
            state.in_flight -= 1;
        }
    }
}

impl ObjectStore for MockStore {
    fn transfer_simple<'a>(
        &'a self,
        _direction: Direction,
        file: &'a FileRef,
        _path: &'a str,
        on_progress: ProgressFn,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let _guard = InFlight::enter(self, false);
            let waiter = {
                let mut state = self.lock();
                state.started.push(file.name.clone());
                if self.hold {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.insert(file.name.clone(), tx);
                    Some(rx)
                } else {
                    None
                }
            };

            on_progress(file.size / 2, file.size);

            match waiter {
                Some(rx) => rx.await.unwrap_or(Err(TransferError::Canceled)),
                None => {
                    tokio::task::yield_now().await;
                    if self.fail_names.contains(&file.name) {
                        return Err(server_error("Internal Server Error"));
                    }
                    on_progress(file.size, file.size);
                    Ok(())
                }
            }
        })
    }

    fn multipart_create<'a>(
        &'a self,
        _file: &'a FileRef,
        path: &'a str,
    ) -> StoreFuture<'a, MultipartUpload> {
        Box::pin(async move {
            if self.hold_create {
                let (tx, rx) = oneshot::channel();
                self.lock().create_waiter = Some(tx);
                let _ = rx.await;
            }
            let mut state = self.lock();
            state.uploads_created += 1;
            Ok(MultipartUpload {
                upload_id: format!("upload-{}", state.uploads_created),
                key: path.to_string(),
            })
        })
    }

    fn multipart_upload_part<'a>(
        &'a self,
        _upload: &'a MultipartUpload,
        part_number: u32,
        _bytes: Vec<u8>,
    ) -> StoreFuture<'a, PartReceipt> {
        Box::pin(async move {
            let _guard = InFlight::enter(self, true);
            if self.hold_parts {
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            if self.fail_part == Some(part_number) {
                return Err(server_error("part rejected"));
            }
            self.lock().parts_uploaded.push(part_number);
            Ok(PartReceipt {
                etag: format!("etag-{part_number}"),
            })
        })
    }

    fn multipart_complete<'a>(
        &'a self,
        upload: &'a MultipartUpload,
        parts: &'a [CompletedPart],
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.lock()
                .completes
                .push((upload.upload_id.clone(), parts.to_vec()));
            Ok(())
        })
    }

    fn abort<'a>(&'a self, _upload: &'a MultipartUpload) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.lock().aborts += 1;
            Ok(())
        })
    }

    fn list_files<'a>(&'a self, _path: &'a str) -> StoreFuture<'a, Vec<RemoteEntry>> {
        Box::pin(async move { Ok(Vec::new()) })
    }
}

/// Yields to the runtime until `cond` holds.
pub(crate) async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
