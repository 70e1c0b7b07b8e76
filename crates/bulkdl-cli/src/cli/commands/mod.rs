//! CLI command handlers.

mod completions;
pub(crate) mod download;

pub use completions::run_completions;
pub use download::run_download;
