//! CLI for the bulkdl bulk media downloader.

mod commands;
mod progress;

use anyhow::Result;
use bulkdl_core::config::{self, FetchBackend};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use commands::{run_completions, run_download};

/// Top-level CLI. Without a subcommand it downloads.
#[derive(Debug, Parser)]
#[command(name = "bulkdl", version)]
#[command(about = "Download media in bulk with a fixed number of workers, optionally converting each file", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<CliCommand>,

    #[command(flatten)]
    pub download: DownloadArgs,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// What to download and how.
#[derive(Debug, Clone, Default, Args)]
pub struct DownloadArgs {
    /// URL of a single item.
    #[arg(conflicts_with_all = ["json", "list"])]
    pub url: Option<String>,

    /// Output path for the single item (default: name from metadata).
    #[arg(requires = "url")]
    pub target: Option<PathBuf>,

    /// JSON file with an array of {"url", "output"?, "convert"?} jobs.
    #[arg(short, long, value_name = "FILE", conflicts_with = "list")]
    pub json: Option<PathBuf>,

    /// Text file with one URL per line.
    #[arg(short, long, value_name = "FILE")]
    pub list: Option<PathBuf>,

    /// Base directory for relative outputs (default: current directory).
    #[arg(short = 'o', long, value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    /// Convert to this format (e.g. mp3). For batches, applies to jobs without their own.
    #[arg(short, long, value_name = "FORMAT")]
    pub convert: Option<String>,

    /// Number of concurrent downloads (default from config).
    #[arg(short = 'b', long, visible_alias = "bulk", value_name = "N")]
    pub workers: Option<usize>,

    /// Re-download items whose destination already exists.
    #[arg(long)]
    pub overwrite: bool,

    /// Fetch backend (default from config).
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Do not draw progress bars.
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Ytdlp,
    Http,
}

impl From<BackendArg> for FetchBackend {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Ytdlp => FetchBackend::Ytdlp,
            BackendArg::Http => FetchBackend::Http,
        }
    }
}

impl Cli {
    /// Parses arguments and runs. `Ok(false)` means some items failed.
    pub async fn run_from_args() -> Result<bool> {
        let cli = Cli::parse();

        match cli.command {
            Some(CliCommand::Completions { shell }) => {
                run_completions(shell);
                Ok(true)
            }
            None => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_download(cli.download, cfg).await
            }
        }
    }
}

#[cfg(test)]
mod tests;
