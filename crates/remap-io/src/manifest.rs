//! Manifest for operator directories with version tracking and integrity checks.
//!
//! Each operator directory contains a `manifest.json` file that:
//! - Tracks the schema version for migration support
//! - Stores SHA256 checksums of all table files
//! - Records the operator's shape metadata and fill value
//! - Records provenance (which operator this one was derived from)

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use remap_core::Dimension;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Current schema version (semver)
pub const CURRENT_SCHEMA_VERSION: &str = "1.0.0";

/// Manifest file name inside an operator directory
pub const MANIFEST_FILE: &str = "manifest.json";

pub const ENTRIES_TABLE: &str = "entries";
pub const SOURCE_CELLS_TABLE: &str = "source_cells";
pub const TARGET_CELLS_TABLE: &str = "target_cells";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorManifest {
    /// Schema version for migration support (e.g., "1.0.0")
    pub schema_version: String,

    /// Timestamp when the directory was written
    pub created_at: DateTime<Utc>,

    /// remap version that wrote this directory
    pub remap_version: String,

    /// Where this operator came from, when it was derived from another one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceInfo>,

    /// Shape metadata that does not fit the cell tables
    pub operator: OperatorInfo,

    /// Metadata for each table file
    pub tables: BTreeMap<String, TableInfo>,
}

/// Provenance of a derived operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Input operator directory
    pub path: String,

    /// Operation that produced this operator (e.g., "transpose")
    pub operation: String,

    /// SHA256 of the input's manifest.json
    pub manifest_hash: String,
}

/// Operator-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorInfo {
    pub source_count: usize,
    pub target_count: usize,
    pub nnz: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_dims: Vec<Dimension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_dims: Vec<Dimension>,
    /// Fill value for display. JSON has no NaN or infinity, so a non-finite
    /// fill value is written as `null` here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_value: Option<f64>,
    /// Exact bit pattern of the fill value; takes precedence when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_value_bits: Option<u64>,
}

impl OperatorInfo {
    pub fn new(
        source_count: usize,
        target_count: usize,
        nnz: usize,
        source_dims: Vec<Dimension>,
        target_dims: Vec<Dimension>,
        fill_value: Option<f64>,
    ) -> Self {
        Self {
            source_count,
            target_count,
            nnz,
            source_dims,
            target_dims,
            fill_value,
            fill_value_bits: fill_value.map(f64::to_bits),
        }
    }

    /// The recorded fill value, bit-exact when the bits were written.
    pub fn fill(&self) -> Option<f64> {
        self.fill_value_bits
            .map(f64::from_bits)
            .or(self.fill_value)
    }
}

/// Metadata for a single Arrow table file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    /// SHA256 checksum of the .arrow file
    pub sha256: String,

    /// Number of rows in the table
    pub row_count: u64,

    /// File size in bytes
    pub file_size_bytes: u64,
}

impl OperatorManifest {
    pub fn new(remap_version: String, operator: OperatorInfo, source: Option<SourceInfo>) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            created_at: Utc::now(),
            remap_version,
            source,
            operator,
            tables: BTreeMap::new(),
        }
    }

    pub fn add_table(&mut self, name: impl Into<String>, info: TableInfo) {
        self.tables.insert(name.into(), info);
    }

    /// Check if this manifest's schema version is compatible with current code
    pub fn is_compatible(&self) -> Result<()> {
        use semver::Version;

        let manifest_version = Version::parse(&self.schema_version)
            .map_err(|e| anyhow!("Invalid schema version in manifest: {}", e))?;

        let current_version = Version::parse(CURRENT_SCHEMA_VERSION)?;

        // Same major version reads fine; a newer major may have moved columns
        if manifest_version.major > current_version.major {
            bail!(
                "Schema v{} is too new (this version supports up to v{})",
                self.schema_version,
                CURRENT_SCHEMA_VERSION
            );
        }

        Ok(())
    }

    /// Validate checksums of all table files
    pub fn validate_checksums(&self, base_path: &Path) -> Result<()> {
        for (table_name, info) in &self.tables {
            let file_path = base_path.join(format!("{}.arrow", table_name));

            if !file_path.exists() {
                bail!("Table file not found: {}", file_path.display());
            }

            let actual_hash = compute_sha256(&file_path)?;

            if actual_hash != info.sha256 {
                bail!(
                    "Checksum mismatch for table '{}': expected {}, got {}",
                    table_name,
                    info.sha256,
                    actual_hash
                );
            }
        }

        Ok(())
    }

    pub fn required_tables() -> &'static [&'static str] {
        &[ENTRIES_TABLE, SOURCE_CELLS_TABLE, TARGET_CELLS_TABLE]
    }

    pub fn verify_all_tables(&self) -> Result<()> {
        for required in Self::required_tables() {
            if !self.tables.contains_key(*required) {
                bail!("Missing required table: {}", required);
            }
        }
        Ok(())
    }

    /// Row count the manifest promises for a table.
    pub fn row_count(&self, table: &str) -> Option<u64> {
        self.tables.get(table).map(|info| info.row_count)
    }
}

/// Compute SHA256 hash of a file
pub fn compute_sha256(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use std::fs::File;
    use std::io::Read;

    let mut file = File::open(path)
        .map_err(|e| anyhow!("Failed to open file for hashing {}: {}", path.display(), e))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| anyhow!("Failed to read file for hashing {}: {}", path.display(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> OperatorInfo {
        OperatorInfo::new(
            4,
            2,
            5,
            vec![Dimension::new("lat", 2), Dimension::new("lon", 2)],
            Vec::new(),
            None,
        )
    }

    fn table(row_count: u64) -> TableInfo {
        TableInfo {
            sha256: "abc123".to_string(),
            row_count,
            file_size_bytes: 1024,
        }
    }

    #[test]
    fn test_manifest_creation() {
        let manifest = OperatorManifest::new(env!("CARGO_PKG_VERSION").to_string(), info(), None);

        assert_eq!(manifest.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(manifest.remap_version, env!("CARGO_PKG_VERSION"));
        assert!(manifest.tables.is_empty());
    }

    #[test]
    fn test_version_compatibility_minor_newer() {
        let mut manifest = OperatorManifest::new("0.1.0".to_string(), info(), None);
        manifest.schema_version = "1.3.0".to_string();
        assert!(manifest.is_compatible().is_ok());
    }

    #[test]
    fn test_version_compatibility_major_newer() {
        let mut manifest = OperatorManifest::new("0.1.0".to_string(), info(), None);
        manifest.schema_version = "2.0.0".to_string();
        assert!(manifest.is_compatible().is_err());
    }

    #[test]
    fn test_version_unparseable() {
        let mut manifest = OperatorManifest::new("0.1.0".to_string(), info(), None);
        manifest.schema_version = "one".to_string();
        assert!(manifest.is_compatible().is_err());
    }

    #[test]
    fn test_required_tables() {
        let mut manifest = OperatorManifest::new("0.1.0".to_string(), info(), None);
        assert!(manifest.verify_all_tables().is_err());

        for name in OperatorManifest::required_tables() {
            manifest.add_table(*name, table(3));
        }
        assert!(manifest.verify_all_tables().is_ok());
        assert_eq!(manifest.row_count(ENTRIES_TABLE), Some(3));
    }

    #[test]
    fn test_manifest_serialization() {
        let source = SourceInfo {
            path: "maps/ne30_to_fv1.9x2.5".to_string(),
            operation: "transpose".to_string(),
            manifest_hash: "def456".to_string(),
        };
        let mut manifest = OperatorManifest::new("0.1.0".to_string(), info(), Some(source));
        manifest.add_table(ENTRIES_TABLE, table(5));

        let json = serde_json::to_string_pretty(&manifest).unwrap();
        assert!(json.contains("\"lat\""));
        assert!(json.contains("transpose"));
        assert!(!json.contains("fill_value"));
        assert!(!json.contains("target_dims"));

        let restored: OperatorManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.operator, info());
        assert_eq!(restored.tables.len(), 1);
    }

    #[test]
    fn test_non_finite_fill_value_survives_json() {
        for fill in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e20] {
            let operator = OperatorInfo::new(1, 1, 0, Vec::new(), Vec::new(), Some(fill));

            let json = serde_json::to_string(&operator).unwrap();
            let restored: OperatorInfo = serde_json::from_str(&json).unwrap();
            assert_eq!(restored.fill().map(f64::to_bits), Some(fill.to_bits()));
        }
    }

    #[test]
    fn test_fill_value_without_bits_still_reads() {
        let json = r#"{"source_count":1,"target_count":1,"nnz":0,"fill_value":-999.0}"#;
        let restored: OperatorInfo = serde_json::from_str(json).unwrap();
        assert_eq!(restored.fill(), Some(-999.0));
    }
}
