use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Translate and narrate a chapter page, reusing stored results.
    Translate(TranslateArgs),
    /// Print a stored chapter without calling any external service.
    Replay(ReplayArgs),
    /// List stored chapters.
    List(ListArgs),
    /// Delete every stored chapter, audio file and the index.
    Wipe(WipeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct StorageArgs {
    /// Base URL of a running novelvoice-server. Storage is local when omitted.
    #[arg(long)]
    pub server: Option<String>,

    /// Data directory used when no server is given.
    #[arg(long, default_value = "novelvoice-data", conflicts_with = "server")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Args)]
pub struct TranslateArgs {
    /// Chapter page URL (must be http/https).
    #[arg(long)]
    pub url: String,

    #[command(flatten)]
    pub storage: StorageArgs,

    /// Prefix for audio links. Defaults to `{server}/audio` or the local audio directory.
    #[arg(long)]
    pub audio_base_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Chapter slug (the last path segment of its URL).
    #[arg(long)]
    pub slug: String,

    #[command(flatten)]
    pub storage: StorageArgs,

    #[arg(long)]
    pub audio_base_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub storage: StorageArgs,
}

#[derive(Debug, Args)]
pub struct WipeArgs {
    /// Confirm the deletion.
    #[arg(long)]
    pub yes: bool,

    #[command(flatten)]
    pub storage: StorageArgs,
}
