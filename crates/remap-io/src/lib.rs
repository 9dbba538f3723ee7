//! # remap-io: Operator Directory Persistence
//!
//! Reads and writes [`remap_core::SparseOperator`]s as *operator
//! directories*: three Arrow IPC tables plus a `manifest.json` holding the
//! schema version, table checksums and provenance.
//!
//! ```text
//! map/
//!   manifest.json
//!   entries.arrow        source_index, target_index, weight
//!   source_cells.arrow   area [, mask] [, center_lon, center_lat]
//!   target_cells.arrow   area [, mask] [, center_lon, center_lat]
//! ```
//!
//! Writes are atomic (temp directory plus rename). Reads verify checksums
//! before decoding and report failures as typed
//! [`remap_core::RemapError`]s inside the `anyhow` chain.

pub mod manifest;
pub mod reader;
pub mod writer;

pub use manifest::{OperatorManifest, SourceInfo};
pub use reader::{load_operator, OperatorDirectoryReader};
pub use writer::{save_operator, OperatorDirectoryWriter};
