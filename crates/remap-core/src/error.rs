//! Error taxonomy for remapping operators.
//!
//! Every failure carries the index and the observed value that caused it so a
//! regression test can assert on the exact entry that broke. Failures are
//! grouped in three layers:
//!
//! - [`MalformedOperatorError`]: the operator could not be built (bad indices,
//!   non-finite weights, inconsistent shapes, unreadable tables)
//! - [`RemapError::DegenerateArea`]: transpose would divide by a zero area
//! - [`ValidationError`]: a built operator failed one of the numerical checks
//!
//! [`RemapError`] wraps all of them for callers that just propagate with `?`.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Which side of an operator a cell belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

impl Side {
    /// The opposite side, used when roles are swapped by a transpose.
    pub fn flipped(self) -> Self {
        match self {
            Side::Source => Side::Target,
            Side::Target => Side::Source,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Target => write!(f, "target"),
        }
    }
}

/// The operator data is structurally invalid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedOperatorError {
    #[error("{side} index {index} out of range (count {count}) in entry {entry}")]
    IndexOutOfRange {
        side: Side,
        entry: usize,
        index: usize,
        count: usize,
    },

    #[error("duplicate entry for (source {source_index}, target {target_index})")]
    DuplicateEntry {
        source_index: usize,
        target_index: usize,
    },

    #[error("non-finite weight {weight} at (source {source_index}, target {target_index})")]
    NonFiniteWeight {
        source_index: usize,
        target_index: usize,
        weight: f64,
    },

    #[error("{side} cell {index} has invalid area {area}")]
    InvalidArea { side: Side, index: usize, area: f64 },

    #[error("{side} {field} has {found} values, expected {expected}")]
    LengthMismatch {
        side: Side,
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{side} shape {dims:?} describes {product} cells, but the grid has {count}")]
    ShapeMismatch {
        side: Side,
        dims: Vec<usize>,
        product: usize,
        count: usize,
    },

    #[error("{0}")]
    Table(String),
}

/// Area-weighted conservation failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConservationError {
    #[error(
        "global imbalance {imbalance:.15e} exceeds {tolerance:e} relative to total target area {total_area:.15e}"
    )]
    Global {
        imbalance: f64,
        total_area: f64,
        tolerance: f64,
    },

    #[error(
        "column {column} carries mass {mass:.15e} for area {area:.15e} (tolerance {tolerance:e}, {violations} column(s) failing)"
    )]
    Column {
        column: usize,
        mass: f64,
        area: f64,
        tolerance: f64,
        violations: usize,
    },
}

impl ConservationError {
    /// Signed difference between the observed mass and the expected area.
    pub fn imbalance(&self) -> f64 {
        match self {
            ConservationError::Global { imbalance, .. } => *imbalance,
            ConservationError::Column { mass, area, .. } => mass - area,
        }
    }
}

/// A built operator failed one of the numerical checks.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error(
        "operator is not consistent in row {row}: sum {observed:.15e} (tolerance {tolerance:e}, {violations} row(s) failing)"
    )]
    InconsistentRow {
        row: usize,
        observed: f64,
        tolerance: f64,
        violations: usize,
    },

    #[error("operator is not conservative: {0}")]
    Conservation(ConservationError),

    #[error(
        "operator is not monotone at (source {source_index}, target {target_index}): {weight:.15e} (tolerance {tolerance:e}, {violations} entries failing)"
    )]
    Monotonicity {
        source_index: usize,
        target_index: usize,
        weight: f64,
        tolerance: f64,
        violations: usize,
    },

    #[error("{side} areas sum to {total:e}; conservation is undefined")]
    DegenerateAreas { side: Side, total: f64 },

    #[error("{check} tolerance must be finite and non-negative, got {tolerance}")]
    InvalidTolerance { check: &'static str, tolerance: f64 },
}

/// Top-level error for operator construction, transposition and validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemapError {
    #[error("operator not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("malformed operator: {0}")]
    Malformed(#[from] MalformedOperatorError),

    #[error("target cell {cell} has zero area but is referenced by {references} entries")]
    DegenerateArea { cell: usize, references: usize },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl RemapError {
    /// True for failures that mean the input could not be read as an operator.
    pub fn is_malformed(&self) -> bool {
        matches!(self, RemapError::Malformed(_))
    }
}

impl From<ConservationError> for ValidationError {
    fn from(err: ConservationError) -> Self {
        ValidationError::Conservation(err)
    }
}

/// Convenience alias for results in the remap crates.
pub type RemapResult<T> = Result<T, RemapError>;
