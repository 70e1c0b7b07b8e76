//! CLI parse and command helper tests.

use super::{Cli, CliCommand, DownloadArgs};
use clap::Parser;

pub(super) fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

pub(super) fn download_args(args: &[&str]) -> DownloadArgs {
    let cli = parse(args);
    assert!(cli.command.is_none(), "expected the download command");
    cli.download
}
