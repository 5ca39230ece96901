use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blobkeep",
    about = "blobkeep -- content-addressed blob storage",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "blobkeep.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the version
    Version,
    /// Store files, verifying each against its content ref
    Put(PutArgs),
    /// Write a stored blob to stdout or a file
    Get(GetArgs),
    /// Show the size of stored blobs
    Stat(StatArgs),
    /// List stored blobs in ref order
    List(ListArgs),
    /// Remove stored blobs
    Rm(RmArgs),
    /// Delete temporary files left by interrupted writes
    Sweep,
}

#[derive(Args)]
pub struct PutArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    pub blob_ref: String,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct StatArgs {
    #[arg(required = true)]
    pub refs: Vec<String>,
}

#[derive(Args)]
pub struct ListArgs {
    /// Only list refs that sort after this one
    #[arg(long, default_value = "")]
    pub after: String,
    /// Maximum number of refs (0 = all)
    #[arg(short = 'n', long, default_value = "0")]
    pub limit: usize,
}

#[derive(Args)]
pub struct RmArgs {
    #[arg(required = true)]
    pub refs: Vec<String>,
}
