//! Operator directory reader.
//!
//! Opening a directory validates the manifest (schema version, required
//! tables, checksums) before any table is decoded. Loading then checks every
//! column for presence, type and nulls and hands the result to
//! [`SparseOperator::new`], which enforces the structural invariants.
//!
//! Failures surface as `anyhow` errors wrapping a typed [`RemapError`]:
//! `NotFound` for a missing directory or table file, `Malformed` for
//! everything else.

use anyhow::{Context, Result};
use polars::io::ipc::IpcReader;
use polars::prelude::{DataFrame, SerReader};
use remap_core::{
    CellCenters, Dimension, GridDescriptor, MalformedOperatorError, MapEntry, RemapError,
    SparseOperator,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::manifest::{
    compute_sha256, OperatorManifest, ENTRIES_TABLE, MANIFEST_FILE, SOURCE_CELLS_TABLE,
    TARGET_CELLS_TABLE,
};

fn malformed(message: impl Into<String>) -> anyhow::Error {
    RemapError::Malformed(MalformedOperatorError::Table(message.into())).into()
}

/// Flatten an untyped failure into a `Malformed` error, keeping typed ones.
fn as_malformed(err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<RemapError>().is_some() {
        err
    } else {
        malformed(format!("{err:#}"))
    }
}

#[derive(Debug)]
pub struct OperatorDirectoryReader {
    base_path: PathBuf,
    manifest: OperatorManifest,
}

impl OperatorDirectoryReader {
    /// Open and validate an operator directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();

        if !base_path.is_dir() {
            return Err(RemapError::NotFound(base_path).into());
        }

        let manifest = Self::load_manifest(&base_path)?;

        manifest
            .is_compatible()
            .context("checking schema compatibility")
            .map_err(as_malformed)?;
        manifest
            .verify_all_tables()
            .context("verifying required tables")
            .map_err(as_malformed)?;

        for table in OperatorManifest::required_tables() {
            let path = base_path.join(format!("{}.arrow", table));
            if !path.is_file() {
                return Err(RemapError::NotFound(path).into());
            }
        }

        manifest
            .validate_checksums(&base_path)
            .context("validating file checksums")
            .map_err(as_malformed)?;

        Ok(Self {
            base_path,
            manifest,
        })
    }

    fn load_manifest(base_path: &Path) -> Result<OperatorManifest> {
        let manifest_path = base_path.join(MANIFEST_FILE);

        if !manifest_path.exists() {
            return Err(malformed(format!(
                "{} not found in {} (incomplete write?)",
                MANIFEST_FILE,
                base_path.display()
            )));
        }

        let file = File::open(&manifest_path)
            .with_context(|| format!("opening manifest: {}", manifest_path.display()))?;

        serde_json::from_reader(file)
            .map_err(|e| malformed(format!("parsing {}: {}", MANIFEST_FILE, e)))
    }

    pub fn manifest(&self) -> &OperatorManifest {
        &self.manifest
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// SHA256 of `manifest.json`, recorded as provenance by derived operators.
    pub fn manifest_sha256(&self) -> Result<String> {
        compute_sha256(&self.base_path.join(MANIFEST_FILE))
    }

    fn read_table(&self, name: &str) -> Result<DataFrame> {
        let path = self.base_path.join(format!("{}.arrow", name));
        let file = File::open(&path)
            .with_context(|| format!("opening table file {}", path.display()))?;
        let df = IpcReader::new(file)
            .finish()
            .map_err(|e| malformed(format!("reading table {}: {}", name, e)))?;

        if let Some(expected) = self.manifest.row_count(name) {
            if df.height() as u64 != expected {
                return Err(malformed(format!(
                    "table {} has {} rows but the manifest records {}",
                    name,
                    df.height(),
                    expected
                )));
            }
        }

        debug!(table = name, rows = df.height(), "read table");
        Ok(df)
    }

    fn read_grid(&self, name: &str, dims: &[Dimension]) -> Result<GridDescriptor> {
        let df = self.read_table(name)?;

        let mut grid =
            GridDescriptor::from_areas(f64_column(&df, name, "area")?).with_dims(dims.to_vec());

        if let Some(mask) = optional_bool_column(&df, name, "mask")? {
            grid = grid.with_mask(mask);
        }

        let lon = optional_f64_column(&df, name, "center_lon")?;
        let lat = optional_f64_column(&df, name, "center_lat")?;
        match (lon, lat) {
            (Some(lon), Some(lat)) => grid = grid.with_centers(CellCenters { lon, lat }),
            (None, None) => {}
            _ => {
                return Err(malformed(format!(
                    "table {} must carry both center_lon and center_lat or neither",
                    name
                )))
            }
        }

        Ok(grid)
    }

    fn read_entries(&self) -> Result<Vec<MapEntry>> {
        let df = self.read_table(ENTRIES_TABLE)?;

        let sources = index_column(&df, ENTRIES_TABLE, "source_index")?;
        let targets = index_column(&df, ENTRIES_TABLE, "target_index")?;
        let weights = f64_column(&df, ENTRIES_TABLE, "weight")?;

        Ok(sources
            .into_iter()
            .zip(targets)
            .zip(weights)
            .map(|((source, target), weight)| MapEntry::new(source, target, weight))
            .collect())
    }

    /// Decode all tables into an operator.
    pub fn read_operator(&self) -> Result<SparseOperator> {
        let info = &self.manifest.operator;

        let entries = self.read_entries()?;
        let source = self.read_grid(SOURCE_CELLS_TABLE, &info.source_dims)?;
        let target = self.read_grid(TARGET_CELLS_TABLE, &info.target_dims)?;

        if entries.len() != info.nnz
            || source.len() != info.source_count
            || target.len() != info.target_count
        {
            return Err(malformed(format!(
                "tables describe a {}x{} operator with {} entries, manifest records {}x{} with {}",
                source.len(),
                target.len(),
                entries.len(),
                info.source_count,
                info.target_count,
                info.nnz
            )));
        }

        let op = SparseOperator::new(entries, source, target)?.with_fill_value(info.fill());
        Ok(op)
    }
}

/// Load an operator directory written by [`crate::save_operator`].
pub fn load_operator(path: impl AsRef<Path>) -> Result<SparseOperator> {
    let path = path.as_ref();
    let reader = OperatorDirectoryReader::open(path)?;
    let op = reader.read_operator()?;
    debug!(
        path = %path.display(),
        source_count = op.source_count(),
        target_count = op.target_count(),
        nnz = op.nnz(),
        "loaded operator"
    );
    Ok(op)
}

fn f64_column(df: &DataFrame, table: &str, name: &str) -> Result<Vec<f64>> {
    let ca = df
        .column(name)
        .map_err(|_| malformed(format!("missing '{}' column in table {}", name, table)))?
        .f64()
        .map_err(|_| malformed(format!("'{}' column in table {} must be float64", name, table)))?;

    ca.into_iter()
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| malformed(format!("'{}' column in table {} has nulls", name, table)))
}

fn index_column(df: &DataFrame, table: &str, name: &str) -> Result<Vec<usize>> {
    let ca = df
        .column(name)
        .map_err(|_| malformed(format!("missing '{}' column in table {}", name, table)))?
        .i64()
        .map_err(|_| malformed(format!("'{}' column in table {} must be int64", name, table)))?;

    ca.into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(index) if index >= 0 => Ok(index as usize),
            Some(index) => Err(malformed(format!(
                "negative {} {} at row {} of table {}",
                name, index, row, table
            ))),
            None => Err(malformed(format!(
                "'{}' column in table {} has nulls",
                name, table
            ))),
        })
        .collect()
}

fn optional_f64_column(df: &DataFrame, table: &str, name: &str) -> Result<Option<Vec<f64>>> {
    if df.column(name).is_err() {
        return Ok(None);
    }
    f64_column(df, table, name).map(Some)
}

fn optional_bool_column(df: &DataFrame, table: &str, name: &str) -> Result<Option<Vec<bool>>> {
    let Ok(series) = df.column(name) else {
        return Ok(None);
    };
    let ca = series
        .bool()
        .map_err(|_| malformed(format!("'{}' column in table {} must be boolean", name, table)))?;

    ca.into_iter()
        .collect::<Option<Vec<bool>>>()
        .map(Some)
        .ok_or_else(|| malformed(format!("'{}' column in table {} has nulls", name, table)))
}
