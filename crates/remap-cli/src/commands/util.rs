use anyhow::{Context, Result};
use rayon::ThreadPoolBuilder;
use tracing::debug;

use remap_cli::cli::ThreadCount;

/// Size the global rayon pool. Fails if the pool was already built.
pub fn configure_threads(threads: ThreadCount) -> Result<()> {
    let count = threads.get();
    ThreadPoolBuilder::new()
        .num_threads(count)
        .build_global()
        .with_context(|| format!("configuring {count} worker threads ({threads})"))?;
    debug!(threads = count, "configured worker pool");
    Ok(())
}
