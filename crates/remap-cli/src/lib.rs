pub mod cli;
pub mod config;
pub mod exit;

pub use cli::{Cli, Commands, OutputFormat, ThreadCount};
pub use config::{load_config, RemapConfig};
pub use exit::run_guarded;
