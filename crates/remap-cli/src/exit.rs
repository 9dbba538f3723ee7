//! Process exit codes.

use std::panic::{self, AssertUnwindSafe};
use tracing::error;

pub const SUCCESS: u8 = 0;
/// A command returned an error: bad input, failed check, I/O.
pub const FAILURE: u8 = 1;
/// A command panicked.
pub const CRASH: u8 = 2;

/// Run `command` and map its outcome to an exit code, logging any failure.
pub fn run_guarded<F>(command: F) -> u8
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(command)) {
        Ok(Ok(())) => SUCCESS,
        Ok(Err(e)) => {
            error!("{:#}", e);
            FAILURE
        }
        Err(_) => {
            error!("remap terminated unexpectedly");
            CRASH
        }
    }
}
