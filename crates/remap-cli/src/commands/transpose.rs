use anyhow::{Context, Result};
use remap_algo::transpose;
use remap_cli::RemapConfig;
use remap_core::RemapError;
use remap_io::{save_operator, OperatorDirectoryReader, SourceInfo};
use std::path::Path;
use tracing::{debug, info};

pub fn handle(
    input: &Path,
    output: &Path,
    nocheck: bool,
    checkmono: bool,
    config: &RemapConfig,
) -> Result<()> {
    info!("Loading operator from {}", input.display());
    let reader = OperatorDirectoryReader::open(input)
        .with_context(|| format!("opening operator {}", input.display()))?;
    let op = reader
        .read_operator()
        .with_context(|| format!("reading operator {}", input.display()))?;
    debug!(
        source_count = op.source_count(),
        target_count = op.target_count(),
        nnz = op.nnz(),
        "operator loaded"
    );

    info!("Transposing {}x{} operator", op.source_count(), op.target_count());
    let transposed = transpose(&op).context("transposing operator")?;

    if nocheck {
        info!("Skipping checks on the transposed operator");
    } else {
        info!("Verifying transposed operator");
        super::validator(config, checkmono)
            .run(&transposed)
            .into_result()
            .map_err(RemapError::from)
            .context("verifying transposed operator")?;
    }

    let source_info = SourceInfo {
        path: input.display().to_string(),
        operation: "transpose".to_string(),
        manifest_hash: reader.manifest_sha256()?,
    };

    info!("Writing transposed operator to {}", output.display());
    save_operator(&transposed, output, Some(source_info))
        .with_context(|| format!("writing operator {}", output.display()))?;

    info!("Transpose complete");
    Ok(())
}
