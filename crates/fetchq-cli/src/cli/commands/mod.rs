//! CLI command handlers, one per file.

mod completions;
mod config;
mod get;
mod man;

pub use completions::run_completions;
pub use config::run_config;
pub use get::{run_get, GetOptions};
pub use man::run_man;
