//! Operator directory writer with atomic commit.
//!
//! Tables and the manifest are staged in a hidden sibling directory
//! `.<name>.tmp` next to the output and swapped into place once everything is
//! on disk. The staging name is derived from the full output file name, so it
//! never coincides with the output itself or with an unrelated `<stem>.tmp`.
//! A staging directory that was never committed is removed on drop.

use anyhow::{bail, Context, Result};
use polars::prelude::{DataFrame, IpcWriter, NamedFrom, SerWriter, Series};
use remap_core::{GridDescriptor, SparseOperator};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::manifest::{
    compute_sha256, OperatorInfo, OperatorManifest, SourceInfo, TableInfo, ENTRIES_TABLE,
    MANIFEST_FILE, SOURCE_CELLS_TABLE, TARGET_CELLS_TABLE,
};

/// Hidden sibling used to stage `output` before the swap.
pub fn staging_path(output: &Path) -> Result<PathBuf> {
    let Some(name) = output.file_name() else {
        bail!("output path {} has no final component", output.display());
    };
    let mut staged = std::ffi::OsString::from(".");
    staged.push(name);
    staged.push(".tmp");
    Ok(output.with_file_name(staged))
}

pub struct OperatorDirectoryWriter {
    staging: PathBuf,
    output: PathBuf,
    committed: bool,
}

impl OperatorDirectoryWriter {
    /// Prepare an empty staging directory for `output`.
    pub fn new(output: impl AsRef<Path>) -> Result<Self> {
        let output = output.as_ref().to_path_buf();
        let staging = staging_path(&output)?;
        debug_assert_ne!(staging, output);

        if staging.exists() {
            warn!(path = %staging.display(), "removing leftover staging directory");
            fs::remove_dir_all(&staging)
                .with_context(|| format!("removing leftover staging directory {}", staging.display()))?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("creating staging directory {}", staging.display()))?;

        Ok(Self {
            staging,
            output,
            committed: false,
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    pub fn output_dir(&self) -> &Path {
        &self.output
    }

    /// Stage all tables, then the manifest, then swap the result into place.
    pub fn write_operator(
        mut self,
        op: &SparseOperator,
        source_info: Option<SourceInfo>,
    ) -> Result<()> {
        let info = OperatorInfo::new(
            op.source_count(),
            op.target_count(),
            op.nnz(),
            op.source().dims().to_vec(),
            op.target().dims().to_vec(),
            op.fill_value(),
        );
        let mut manifest =
            OperatorManifest::new(env!("CARGO_PKG_VERSION").to_string(), info, source_info);

        let mut entries = entries_frame(op)?;
        self.stage_table(ENTRIES_TABLE, &mut entries, &mut manifest)?;
        let mut source = cells_frame(op.source())?;
        self.stage_table(SOURCE_CELLS_TABLE, &mut source, &mut manifest)?;
        let mut target = cells_frame(op.target())?;
        self.stage_table(TARGET_CELLS_TABLE, &mut target, &mut manifest)?;

        let manifest_path = self.staging.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&manifest).context("serializing manifest")?;
        fs::write(&manifest_path, json)
            .with_context(|| format!("writing {}", manifest_path.display()))?;

        self.commit()
    }

    fn stage_table(
        &self,
        name: &str,
        df: &mut DataFrame,
        manifest: &mut OperatorManifest,
    ) -> Result<()> {
        let path = self.staging.join(format!("{name}.arrow"));
        let mut file =
            fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        IpcWriter::new(&mut file)
            .finish(df)
            .with_context(|| format!("writing table {name}"))?;
        drop(file);

        let info = TableInfo {
            sha256: compute_sha256(&path)?,
            row_count: df.height() as u64,
            file_size_bytes: fs::metadata(&path)?.len(),
        };
        debug!(table = name, rows = info.row_count, bytes = info.file_size_bytes, "staged table");
        manifest.add_table(name, info);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.output.exists() {
            fs::remove_dir_all(&self.output)
                .with_context(|| format!("replacing {}", self.output.display()))?;
        }
        fs::rename(&self.staging, &self.output).with_context(|| {
            format!(
                "moving {} into place at {}",
                self.staging.display(),
                self.output.display()
            )
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for OperatorDirectoryWriter {
    fn drop(&mut self) {
        if !self.committed && self.staging.exists() {
            if let Err(e) = fs::remove_dir_all(&self.staging) {
                warn!(path = %self.staging.display(), "could not remove staging directory: {e}");
            }
        }
    }
}

fn entries_frame(op: &SparseOperator) -> Result<DataFrame> {
    let (mut sources, mut targets, mut weights) = (
        Vec::with_capacity(op.nnz()),
        Vec::with_capacity(op.nnz()),
        Vec::with_capacity(op.nnz()),
    );
    for entry in op.entries() {
        sources.push(entry.source as i64);
        targets.push(entry.target as i64);
        weights.push(entry.weight);
    }

    Ok(DataFrame::new(vec![
        Series::new("source_index", sources),
        Series::new("target_index", targets),
        Series::new("weight", weights),
    ])?)
}

/// Areas always; mask and centers only when the grid has them.
fn cells_frame(grid: &GridDescriptor) -> Result<DataFrame> {
    let mut columns = vec![Series::new("area", grid.areas())];
    if let Some(mask) = grid.mask() {
        columns.push(Series::new("mask", mask));
    }
    if let Some(centers) = grid.centers() {
        columns.push(Series::new("center_lon", centers.lon.as_slice()));
        columns.push(Series::new("center_lat", centers.lat.as_slice()));
    }
    Ok(DataFrame::new(columns)?)
}

/// Write an operator to `output_dir`, replacing whatever is there.
///
/// Nothing at `output_dir` is touched unless every table and the manifest
/// were staged successfully.
pub fn save_operator(
    op: &SparseOperator,
    output_dir: impl AsRef<Path>,
    source_info: Option<SourceInfo>,
) -> Result<()> {
    OperatorDirectoryWriter::new(output_dir)?.write_operator(op, source_info)
}
