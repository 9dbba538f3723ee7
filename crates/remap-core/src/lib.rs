//! # remap-core: Sparse Remapping Operators
//!
//! Data structures for offline remapping maps: sparse linear operators that
//! interpolate a scalar field from a source discretization onto a target
//! discretization.
//!
//! ## Design Philosophy
//!
//! An operator is an immutable bipartite weighted mapping:
//! - **Rows**: source cells, each with an area
//! - **Columns**: target cells, each with an area
//! - **Entries**: `(source, target, weight)` triples, at most one per pair
//!
//! Construction validates everything that can be checked locally (index
//! ranges, finite weights, non-negative areas, shape metadata). Numerical
//! properties that depend on the whole operator (consistency, conservation,
//! monotonicity) are checked by `remap-algo`.
//!
//! ## Quick Start
//!
//! ```rust
//! use remap_core::{GridDescriptor, MapEntry, SparseOperator};
//!
//! let op = SparseOperator::new(
//!     vec![
//!         MapEntry::new(0, 0, 0.6),
//!         MapEntry::new(0, 1, 0.4),
//!         MapEntry::new(1, 1, 1.0),
//!     ],
//!     GridDescriptor::unit(2),
//!     GridDescriptor::unit(2),
//! )?;
//!
//! let row_sum: f64 = op.coefficients_for_source_row(0).map(|(_, w)| w).sum();
//! assert!((row_sum - 1.0).abs() < 1e-12);
//! # Ok::<(), remap_core::RemapError>(())
//! ```
//!
//! ## Modules
//!
//! - [`operator`] - [`SparseOperator`], [`MapEntry`], [`OperatorSummary`]
//! - [`grid`] - per-side cell metadata ([`GridDescriptor`])
//! - [`error`] - error taxonomy shared by all remap crates

pub mod error;
pub mod grid;
pub mod operator;

pub use error::{
    ConservationError, MalformedOperatorError, RemapError, RemapResult, Side, ValidationError,
};
pub use grid::{CellCenters, Dimension, GridDescriptor};
pub use operator::{MapEntry, OperatorSummary, SparseOperator};
