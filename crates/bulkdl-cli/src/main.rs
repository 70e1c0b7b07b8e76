use bulkdl_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    // The log file keeps tracing output off the progress bars; stderr is the fallback.
    if let Err(e) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("log file unavailable, logging to stderr: {e:#}");
    }

    match Cli::run_from_args().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("bulkdl error: {:#}", err);
            std::process::exit(1);
        }
    }
}
