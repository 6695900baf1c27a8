//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ferry",
    version,
    about = "Bulk transfers to and from an object store",
    propagate_version = true
)]
pub struct Cli {
    /// Config file to use instead of the per-user one.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Store directory, overriding the configured one.
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload local files into a remote directory.
    #[command(alias = "up")]
    Upload(UploadArgs),
    /// Download remote files into a local directory.
    #[command(alias = "down")]
    Download(DownloadArgs),
    /// List a remote directory.
    #[command(name = "ls", alias = "list")]
    Ls(LsArgs),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Remote directory.
    #[arg(long, default_value = "/")]
    pub to: String,

    /// Active uploads at once.
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Remote directory.
    #[arg(long, default_value = "/")]
    pub from: String,

    /// Local directory to write into.
    #[arg(long, default_value = ".")]
    pub into: PathBuf,

    /// Active downloads at once.
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    #[arg(required = true)]
    pub names: Vec<String>,
}

#[derive(Debug, Args)]
pub struct LsArgs {
    #[arg(default_value = "/")]
    pub dir: String,
}
