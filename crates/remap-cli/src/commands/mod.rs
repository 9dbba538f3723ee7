pub mod inspect;
pub mod transpose;
pub mod util;
pub mod verify;

use anyhow::Result;
use remap_algo::Validator;
use remap_cli::{Commands, RemapConfig};

pub fn run(command: &Commands, config: &RemapConfig) -> Result<()> {
    match command {
        Commands::Transpose {
            input,
            output,
            nocheck,
            checkmono,
        } => transpose::handle(input, output, *nocheck, *checkmono, config),
        Commands::Verify {
            input,
            checkmono,
            format,
        } => verify::handle(input, *checkmono, *format, config),
        Commands::Inspect { input, format } => inspect::handle(input, *format),
    }
}

/// Validator configured from the config file.
fn validator(config: &RemapConfig, checkmono: bool) -> Validator {
    Validator::new(config.tolerances)
        .with_monotonicity(checkmono)
        .with_parallel(config.validation.parallel)
}
