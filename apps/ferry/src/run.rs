//! Command execution.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, bail};
use bulkferry_engine::{
    Direction, FileRef, ObjectStore, TaskStatus, TransferConfig, TransferManager,
    TransferManagerState,
};
use bulkferry_local_store::LocalStore;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::{Cli, Command, DownloadArgs, LsArgs, UploadArgs};
use crate::config::FerryConfig;

/// Runs a parsed command. Returns `false` when some transfer did not
/// complete.
pub async fn execute(cli: Cli) -> anyhow::Result<bool> {
    let mut config = match &cli.config {
        Some(path) => FerryConfig::load_from(path)?,
        None => match FerryConfig::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to load config, using defaults");
                FerryConfig::default()
            }
        },
    };
    if let Some(store) = &cli.store {
        config.store_root = store.clone();
    }

    let store = LocalStore::open(&config.store_root)
        .await
        .with_context(|| format!("failed to open store {}", config.store_root.display()))?;
    info!(root = %store.root().display(), "store opened");

    match cli.command {
        Command::Upload(args) => upload(&config, store, args, cli.json).await,
        Command::Download(args) => download(&config, store, args, cli.json).await,
        Command::Ls(args) => ls(store, args, cli.json).await.map(|()| true),
    }
}

fn with_jobs(config: &FerryConfig, jobs: Option<usize>) -> TransferConfig {
    let mut transfers = config.transfers.clone();
    if let Some(jobs) = jobs {
        transfers.max_concurrent_uploads = jobs;
        transfers.max_concurrent_downloads = jobs;
    }
    transfers
}

async fn upload(
    config: &FerryConfig,
    store: LocalStore,
    args: UploadArgs,
    json: bool,
) -> anyhow::Result<bool> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = FileRef::open(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        files.push(file);
    }

    let manager = TransferManager::new(
        Direction::Upload,
        with_jobs(config, args.jobs),
        Arc::new(store),
    )?;
    run_batch(manager, files, &args.to, json).await
}

async fn download(
    config: &FerryConfig,
    store: LocalStore,
    args: DownloadArgs,
    json: bool,
) -> anyhow::Result<bool> {
    let listing = store.list_files(&args.from).await?;
    let files = download_targets(&listing, &args.names, &args.into)?;

    let manager = TransferManager::new(
        Direction::Download,
        with_jobs(config, args.jobs),
        Arc::new(store),
    )?;
    run_batch(manager, files, &args.from, json).await
}

/// Builds download targets for `names`, sized from the remote listing.
fn download_targets(
    listing: &[bulkferry_engine::RemoteEntry],
    names: &[String],
    into: &Path,
) -> anyhow::Result<Vec<FileRef>> {
    names
        .iter()
        .map(|name| {
            let Some(entry) = listing.iter().find(|e| !e.is_dir && &e.name == name) else {
                bail!("no such remote file: {name}");
            };
            Ok(FileRef::download_target(name.clone(), entry.size, into.join(name)))
        })
        .collect()
}

/// Submits one batch and waits for it to settle. Ctrl-C cancels everything
/// still running.
async fn run_batch(
    manager: TransferManager,
    files: Vec<FileRef>,
    path: &str,
    json: bool,
) -> anyhow::Result<bool> {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    manager.on_complete(move |state| {
        let _ = done_tx.send(state.clone());
    });

    let last_percent = AtomicU64::new(u64::MAX);
    manager.on_progress(move |state| {
        let percent = state.overall_progress.floor() as u64;
        if last_percent.swap(percent, Ordering::Relaxed) != percent {
            info!(
                percent,
                active = state.active_files,
                completed = state.completed_files,
                failed = state.failed_files,
                total = state.total_files,
                "progress"
            );
        }
    });

    let ids = manager.submit(files, path)?;
    if ids.is_empty() {
        return Ok(true);
    }

    let state = tokio::select! {
        state = done_rx.recv() => state,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling transfers");
            manager.cancel_all();
            done_rx.recv().await
        }
    };
    let state = state.context("transfer manager stopped unexpectedly")?;

    print_summary(&state, json)?;
    Ok(state.failed_files == 0 && state.canceled_files == 0)
}

fn print_summary(state: &TransferManagerState, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }

    for task in &state.tasks {
        let status = match task.status {
            TaskStatus::Completed => "ok",
            TaskStatus::Error => "failed",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Pending | TaskStatus::Active => "unfinished",
        };
        match &task.error {
            Some(error) => println!("{status:<10} {}  ({error})", task.key),
            None => println!("{status:<10} {}  {} bytes", task.key, task.size()),
        }
    }
    println!(
        "{} completed, {} failed, {} canceled, {}/{} bytes",
        state.completed_files,
        state.failed_files,
        state.canceled_files,
        state.transferred_bytes,
        state.total_bytes
    );
    Ok(())
}

async fn ls(store: LocalStore, args: LsArgs, json: bool) -> anyhow::Result<()> {
    let entries = store.list_files(&args.dir).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in entries {
        if entry.is_dir {
            println!("{:>12}  {}/", "-", entry.name);
        } else {
            println!("{:>12}  {}", entry.size, entry.name);
        }
    }
    Ok(())
}
